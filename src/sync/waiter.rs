/*!
 * Waiter Records
 * One blocked thread, its request and the result slot written by the granter
 */

use crate::core::types::WeightedPriority;
use crate::thread::ThreadContext;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI32, Ordering};

/// Waiter identifier, unique within its queue
pub type WaiterId = u64;

/// Lifecycle of a waiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStatus {
    Blocked,
    Granted,
    Abandoned,
    TimedOut,
    Interrupted,
}

enum Slot<R> {
    Blocked,
    /// The result is taken exactly once by the resuming waiter
    Granted(Option<R>),
    Abandoned,
    TimedOut,
    Interrupted,
}

/// A thread blocked on a wait queue
///
/// The slot mutex is a leaf lock: it is only taken with the owning nucleus
/// lock held, so it never contends.
pub struct Waiter<W, R> {
    id: WaiterId,
    thread: ThreadContext,
    priority: AtomicI32,
    request: W,
    slot: Mutex<Slot<R>>,
}

impl<W, R> Waiter<W, R> {
    pub(crate) fn new(id: WaiterId, thread: ThreadContext, request: W) -> Self {
        let priority = thread.weighted_priority();
        Self {
            id,
            thread,
            priority: AtomicI32::new(priority),
            request,
            slot: Mutex::new(Slot::Blocked),
        }
    }

    #[inline]
    pub fn id(&self) -> WaiterId {
        self.id
    }

    #[inline]
    pub fn thread(&self) -> &ThreadContext {
        &self.thread
    }

    /// Weighted priority the waiter is ordered by
    ///
    /// Sampled when queued and refreshed by `WaitQueue::requeue`.
    #[inline]
    pub fn priority(&self) -> WeightedPriority {
        self.priority.load(Ordering::Acquire)
    }

    pub(crate) fn set_priority(&self, priority: WeightedPriority) {
        self.priority.store(priority, Ordering::Release);
    }

    #[inline]
    pub fn request(&self) -> &W {
        &self.request
    }

    pub fn status(&self) -> WaitStatus {
        match &*self.slot.lock() {
            Slot::Blocked => WaitStatus::Blocked,
            Slot::Granted(_) => WaitStatus::Granted,
            Slot::Abandoned => WaitStatus::Abandoned,
            Slot::TimedOut => WaitStatus::TimedOut,
            Slot::Interrupted => WaitStatus::Interrupted,
        }
    }

    /// Write the result, then wake the thread
    pub(crate) fn grant(&self, result: R) {
        *self.slot.lock() = Slot::Granted(Some(result));
        self.thread.wake_token().notify_one();
    }

    pub(crate) fn abandon(&self) {
        *self.slot.lock() = Slot::Abandoned;
        self.thread.wake_token().notify_one();
    }

    /// Record a cancellation observed by the waiter itself
    pub(crate) fn cancel(&self, status: WaitStatus) {
        let mut slot = self.slot.lock();
        *slot = match status {
            WaitStatus::Interrupted => Slot::Interrupted,
            _ => Slot::TimedOut,
        };
    }

    /// Take the grant if one was delivered
    ///
    /// Returns `None` while blocked, `Some(Ok(result))` once granted and
    /// `Some(Err(status))` if the queue went away.
    pub(crate) fn take_outcome(&self) -> Option<Result<R, WaitStatus>> {
        let mut slot = self.slot.lock();
        match &mut *slot {
            Slot::Blocked => None,
            Slot::Granted(result) => result.take().map(Ok),
            Slot::Abandoned => Some(Err(WaitStatus::Abandoned)),
            Slot::TimedOut => Some(Err(WaitStatus::TimedOut)),
            Slot::Interrupted => Some(Err(WaitStatus::Interrupted)),
        }
    }
}
