/*!
 * Quota Groups
 *
 * Per-CPU bandwidth groups. Each group carries a quota and a peak, both in
 * percent of the accounting period. The aggregate across a CPU may exceed
 * 100%: over-commitment is reported to callers, never refused.
 */

use crate::core::errors::{CoreError, CoreResult};
use crate::core::limits::QUOTA_FULL_PERCENT;
use crate::core::types::{CpuId, GroupId, Pid, ThreadId};
use ahash::AHashSet;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Which processes can see a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaScope {
    /// Visible to every process
    Shared,
    /// Visible to the creating process only
    Private(Pid),
}

impl QuotaScope {
    pub fn new(pid: Pid, shared: bool) -> Self {
        if shared {
            Self::Shared
        } else {
            Self::Private(pid)
        }
    }

    #[inline]
    pub fn visible_to(&self, pid: Pid) -> bool {
        match self {
            Self::Shared => true,
            Self::Private(owner) => *owner == pid,
        }
    }
}

#[derive(Debug)]
pub struct QuotaGroup {
    id: GroupId,
    quota: i32,
    quota_peak: i32,
    scope: QuotaScope,
    members: AHashSet<ThreadId>,
}

impl QuotaGroup {
    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn scope(&self) -> QuotaScope {
        self.scope
    }

    pub fn members(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.members.iter().copied()
    }

    pub fn is_busy(&self) -> bool {
        !self.members.is_empty()
    }
}

/// Group state plus the CPU aggregate after the operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaInfo {
    pub group: GroupId,
    pub cpu: CpuId,
    pub quota: i32,
    pub quota_peak: i32,
    /// Sum of every group's quota on the CPU; may exceed 100
    pub quota_sum: i32,
    pub members: usize,
    /// Quota as run time per accounting period
    pub budget: Duration,
    pub peak_budget: Duration,
}

/// Out-of-range percentages fall back to full bandwidth
fn clamp_percent(value: i32) -> i32 {
    if (0..=QUOTA_FULL_PERCENT).contains(&value) {
        value
    } else {
        QUOTA_FULL_PERCENT
    }
}

/// Quota groups living on one CPU
#[derive(Debug)]
pub struct QuotaRegistry {
    cpu: CpuId,
    period: Duration,
    max_groups: usize,
    groups: BTreeMap<GroupId, QuotaGroup>,
}

impl QuotaRegistry {
    pub fn new(cpu: CpuId, period: Duration, max_groups: usize) -> Self {
        Self {
            cpu,
            period,
            max_groups,
            groups: BTreeMap::new(),
        }
    }

    pub fn cpu(&self) -> CpuId {
        self.cpu
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Aggregate quota across every group
    pub fn sum(&self) -> i32 {
        self.groups.values().map(|g| g.quota).sum()
    }

    /// Register a group under a caller-allocated id
    pub fn add(&mut self, id: GroupId, scope: QuotaScope, quota: i32, quota_peak: i32) -> CoreResult<QuotaInfo> {
        if self.groups.len() >= self.max_groups {
            return Err(CoreError::no_memory(format!(
                "CPU {} already holds {} quota groups",
                self.cpu, self.max_groups
            )));
        }
        // Every later budget is a fraction of this one
        self.budget(QUOTA_FULL_PERCENT)?;
        let quota = clamp_percent(quota);
        self.groups.insert(
            id,
            QuotaGroup {
                id,
                quota,
                quota_peak: clamp_percent(quota_peak).max(quota),
                scope,
                members: AHashSet::new(),
            },
        );
        let info = self.info_of(id)?;
        info!(
            "Quota group {} created on CPU {} ({}%/{}%, sum {}%)",
            id, self.cpu, info.quota, info.quota_peak, info.quota_sum
        );
        Ok(info)
    }

    /// Look a group up, re-validating the caller's scope
    pub fn find(&self, id: GroupId, pid: Pid) -> CoreResult<&QuotaGroup> {
        self.groups
            .get(&id)
            .filter(|g| g.scope.visible_to(pid))
            .ok_or_else(|| CoreError::no_entity(format!("quota group {} on CPU {}", id, self.cpu)))
    }

    fn find_mut(&mut self, id: GroupId, pid: Pid) -> CoreResult<&mut QuotaGroup> {
        let cpu = self.cpu;
        self.groups
            .get_mut(&id)
            .filter(|g| g.scope.visible_to(pid))
            .ok_or_else(|| CoreError::no_entity(format!("quota group {} on CPU {}", id, cpu)))
    }

    pub fn set_limit(&mut self, id: GroupId, pid: Pid, quota: i32, quota_peak: i32) -> CoreResult<QuotaInfo> {
        let group = self.find_mut(id, pid)?;
        group.quota = clamp_percent(quota);
        group.quota_peak = clamp_percent(quota_peak).max(group.quota);
        debug!(
            "Quota group {} limits set to {}%/{}%",
            id, group.quota, group.quota_peak
        );
        self.info_of(id)
    }

    /// Remove a group
    ///
    /// A busy group is only removed when forced; its former members are
    /// returned so the caller can move them to another class.
    pub fn remove(&mut self, id: GroupId, pid: Pid, force: bool) -> CoreResult<(QuotaInfo, Vec<ThreadId>)> {
        let group = self.find(id, pid)?;
        if group.is_busy() && !force {
            return Err(CoreError::invalid(format!(
                "quota group {} is busy ({} members)",
                id,
                group.members.len()
            )));
        }
        let mut info = self.info_of(id)?;
        let group = self
            .groups
            .remove(&id)
            .ok_or_else(|| CoreError::no_entity(format!("quota group {}", id)))?;
        info.quota_sum = self.sum();
        info.members = 0;

        let drained: Vec<ThreadId> = group.members.into_iter().collect();
        info!(
            "Quota group {} removed from CPU {} ({} members drained, sum {}%)",
            id,
            self.cpu,
            drained.len(),
            info.quota_sum
        );
        Ok((info, drained))
    }

    pub fn info(&self, id: GroupId, pid: Pid) -> CoreResult<QuotaInfo> {
        self.find(id, pid)?;
        self.info_of(id)
    }

    fn info_of(&self, id: GroupId) -> CoreResult<QuotaInfo> {
        let group = self
            .groups
            .get(&id)
            .ok_or_else(|| CoreError::no_entity(format!("quota group {}", id)))?;
        Ok(QuotaInfo {
            group: id,
            cpu: self.cpu,
            quota: group.quota,
            quota_peak: group.quota_peak,
            quota_sum: self.sum(),
            members: group.members.len(),
            budget: self.budget(group.quota)?,
            peak_budget: self.budget(group.quota_peak)?,
        })
    }

    /// Share of the quota period granted at `percent`
    fn budget(&self, percent: i32) -> CoreResult<Duration> {
        let percent = u32::try_from(percent.clamp(0, QUOTA_FULL_PERCENT)).unwrap_or(0);
        self.period
            .checked_mul(percent)
            .map(|scaled| scaled / QUOTA_FULL_PERCENT as u32)
            .ok_or_else(|| CoreError::invalid(format!("quota period {:?} too long to scale", self.period)))
    }

    pub(crate) fn join(&mut self, id: GroupId, thread: ThreadId) {
        if let Some(group) = self.groups.get_mut(&id) {
            group.members.insert(thread);
        }
    }

    pub(crate) fn leave(&mut self, id: GroupId, thread: ThreadId) {
        if let Some(group) = self.groups.get_mut(&id) {
            group.members.remove(&thread);
        }
    }

    /// Private groups owned by `pid`
    pub fn private_groups_of(&self, pid: Pid) -> Vec<GroupId> {
        self.groups
            .values()
            .filter(|g| g.scope == QuotaScope::Private(pid))
            .map(|g| g.id)
            .collect()
    }
}
