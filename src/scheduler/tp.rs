/*!
 * Temporal Partitioning
 *
 * A TP schedule is a contiguous sequence of windows repeating every cycle,
 * each window granting the CPU to one partition (or to nobody, for idle
 * holes). Schedules are immutable once built and shared through `Arc`: a
 * reader holding a reference keeps the table alive after it was replaced.
 */

use crate::core::errors::{CoreError, CoreResult};
use crate::core::limits::TP_IDLE_PARTITION;
use crate::core::types::PartitionId;
use log::debug;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Caller-side description of one window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpWindowSpec {
    pub offset: Duration,
    pub duration: Duration,
    /// Partition owning the window, or -1 for idle time
    pub partition: PartitionId,
}

impl TpWindowSpec {
    pub fn new(offset: Duration, duration: Duration, partition: PartitionId) -> Self {
        Self {
            offset,
            duration,
            partition,
        }
    }

    /// Idle hole
    pub fn idle(offset: Duration, duration: Duration) -> Self {
        Self::new(offset, duration, TP_IDLE_PARTITION)
    }
}

/// Installed window; its duration is implied by the next offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpWindow {
    pub offset: Duration,
    pub partition: PartitionId,
}

/// Immutable schedule table
#[derive(Debug)]
pub struct TpSchedule {
    windows: Vec<TpWindow>,
    cycle: Duration,
}

impl TpSchedule {
    /// Validate and build a table; nothing is kept on error
    pub fn build(specs: &[TpWindowSpec], nr_partitions: usize) -> CoreResult<Arc<Self>> {
        if specs.is_empty() {
            return Err(CoreError::invalid("TP schedule needs at least one window"));
        }

        let mut windows = Vec::with_capacity(specs.len());
        let mut next_offset = Duration::ZERO;

        for (idx, spec) in specs.iter().enumerate() {
            if spec.offset != next_offset {
                return Err(CoreError::invalid(format!(
                    "TP window {} starts at {:?}, expected {:?}",
                    idx, spec.offset, next_offset
                )));
            }
            if spec.duration.is_zero() {
                return Err(CoreError::invalid(format!("TP window {} has no duration", idx)));
            }
            if spec.partition < TP_IDLE_PARTITION || spec.partition >= nr_partitions as PartitionId {
                return Err(CoreError::invalid(format!(
                    "TP window {} names partition {} outside [-1, {})",
                    idx, spec.partition, nr_partitions
                )));
            }
            windows.push(TpWindow {
                offset: spec.offset,
                partition: spec.partition,
            });
            next_offset = spec
                .offset
                .checked_add(spec.duration)
                .ok_or_else(|| CoreError::invalid("TP cycle overflows"))?;
        }

        Ok(Arc::new(Self {
            windows,
            cycle: next_offset,
        }))
    }

    /// Total length of one rotation
    #[inline]
    pub fn cycle(&self) -> Duration {
        self.cycle
    }

    pub fn windows(&self) -> &[TpWindow] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// End of window `idx`: the next offset, or the cycle end for the last
    fn window_end(&self, idx: usize) -> Duration {
        self.windows
            .get(idx + 1)
            .map_or(self.cycle, |next| next.offset)
    }

    /// Read-only copy with durations reconstructed from the offsets
    pub fn snapshot(&self) -> TpScheduleInfo {
        let windows = self
            .windows
            .iter()
            .enumerate()
            .map(|(idx, w)| TpWindowSpec {
                offset: w.offset,
                duration: self.window_end(idx) - w.offset,
                partition: w.partition,
            })
            .collect();
        TpScheduleInfo {
            windows,
            cycle: self.cycle,
        }
    }
}

impl Drop for TpSchedule {
    fn drop(&mut self) {
        debug!(
            "Released TP schedule ({} windows, cycle {:?})",
            self.windows.len(),
            self.cycle
        );
    }
}

/// Snapshot returned by `tp_schedule`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpScheduleInfo {
    pub windows: Vec<TpWindowSpec>,
    pub cycle: Duration,
}

/// Window currently granted on a CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TpActiveWindow {
    pub index: usize,
    pub partition: PartitionId,
    /// Time left before the next window starts
    pub remaining: Duration,
}

/// Per-CPU TP state: the installed table and the rotating window index
#[derive(Debug, Default)]
pub struct TpCpuState {
    schedule: Option<Arc<TpSchedule>>,
    armed_at: Option<Instant>,
    window: usize,
}

impl TpCpuState {
    /// Swap in a new table (or none) and re-arm rotation at `now`
    ///
    /// Returns the superseded table so the caller can drop it outside the lock.
    pub fn install(&mut self, schedule: Option<Arc<TpSchedule>>, now: Instant) -> Option<Arc<TpSchedule>> {
        self.armed_at = schedule.as_ref().map(|_| now);
        self.window = 0;
        std::mem::replace(&mut self.schedule, schedule)
    }

    /// Reference on the live table
    pub fn schedule(&self) -> Option<Arc<TpSchedule>> {
        self.schedule.clone()
    }

    /// Advance the rotating index to the window covering `now`
    pub fn active_window(&mut self, now: Instant) -> Option<TpActiveWindow> {
        let schedule = self.schedule.as_ref()?;
        let armed_at = self.armed_at?;

        let cycle_ns = schedule.cycle.as_nanos();
        let position_ns = now.saturating_duration_since(armed_at).as_nanos() % cycle_ns;
        let position = duration_from_nanos(position_ns)?;

        // Windows only move forward; restart from 0 when the cycle wrapped
        let mut idx = if schedule.windows[self.window].offset <= position {
            self.window
        } else {
            0
        };
        while idx + 1 < schedule.len() && schedule.windows[idx + 1].offset <= position {
            idx += 1;
        }
        self.window = idx;

        Some(TpActiveWindow {
            index: idx,
            partition: schedule.windows[idx].partition,
            remaining: schedule.window_end(idx) - position,
        })
    }
}

/// Exact conversion back from `Duration::as_nanos`
fn duration_from_nanos(nanos: u128) -> Option<Duration> {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let secs = u64::try_from(nanos / NANOS_PER_SEC).ok()?;
    let subsec = u32::try_from(nanos % NANOS_PER_SEC).ok()?;
    Some(Duration::new(secs, subsec))
}
