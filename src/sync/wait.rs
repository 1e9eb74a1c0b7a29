/*!
 * Wait Queue
 *
 * Priority- or FIFO-ordered set of threads blocked on a resource.
 *
 * # Design: Lock-Agnostic Queue, Lock-Owning Caller
 *
 * The queue holds no lock of its own. It lives inside whatever state the
 * caller protects with a `parking_lot::Mutex`, and `wait_on` suspends on the
 * waiting thread's wake token paired with that same mutex. The caller's lock
 * is therefore released exactly for the duration of the suspension and is
 * held again when the waiter inspects its outcome.
 */

use super::waiter::{WaitStatus, Waiter, WaiterId};
use crate::core::clock::Deadline;
use crate::core::errors::{CoreError, CoreResult};
use crate::thread::ThreadContext;
use parking_lot::MutexGuard;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};

/// Ordering discipline, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitOrder {
    /// Arrival order
    #[default]
    Fifo,
    /// Descending weighted priority, FIFO among equals
    Priority,
}

/// Queue of blocked waiters
///
/// - `W`: what each waiter asked for (inspected by granters)
/// - `R`: what the granter hands back
pub struct WaitQueue<W = (), R = ()> {
    order: WaitOrder,
    waiters: VecDeque<Arc<Waiter<W, R>>>,
    next_id: WaiterId,
    destroyed: bool,
}

impl<W, R> WaitQueue<W, R> {
    pub fn new(order: WaitOrder) -> Self {
        Self {
            order,
            waiters: VecDeque::new(),
            next_id: 1,
            destroyed: false,
        }
    }

    #[inline]
    pub fn order(&self) -> WaitOrder {
        self.order
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.waiters.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Highest-ordered waiter, left in place
    pub fn peek(&self) -> Option<&Waiter<W, R>> {
        self.waiters.front().map(|w| w.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Waiter<W, R>> {
        self.waiters.iter().map(|w| w.as_ref())
    }

    /// Queue a waiter for `thread`
    pub(crate) fn enqueue(&mut self, thread: &ThreadContext, request: W) -> Arc<Waiter<W, R>> {
        let id = self.next_id;
        self.next_id += 1;
        let waiter = Arc::new(Waiter::new(id, thread.clone(), request));
        self.insert(Arc::clone(&waiter));

        trace!(
            waiter = id,
            thread = thread.id(),
            prio = waiter.priority(),
            depth = self.waiters.len(),
            "Waiter queued"
        );
        waiter
    }

    fn insert(&mut self, waiter: Arc<Waiter<W, R>>) {
        match self.order {
            WaitOrder::Fifo => self.waiters.push_back(waiter),
            WaitOrder::Priority => {
                // Behind every waiter of equal or higher priority
                let prio = waiter.priority();
                let pos = self
                    .waiters
                    .iter()
                    .position(|w| w.priority() < prio)
                    .unwrap_or(self.waiters.len());
                self.waiters.insert(pos, waiter);
            }
        }
    }

    /// Re-read the weighted priority of `thread` if it waits here
    ///
    /// On a priority queue the waiter moves behind the waiters already at
    /// its new priority. Returns false if the thread is not queued.
    pub fn requeue(&mut self, thread: &ThreadContext) -> bool {
        let Some(pos) = self.waiters.iter().position(|w| w.thread().same_thread(thread)) else {
            return false;
        };
        let prio = thread.weighted_priority();
        if self.waiters[pos].priority() == prio {
            return true;
        }
        match self.order {
            WaitOrder::Fifo => self.waiters[pos].set_priority(prio),
            WaitOrder::Priority => {
                if let Some(waiter) = self.waiters.remove(pos) {
                    waiter.set_priority(prio);
                    self.insert(waiter);
                }
            }
        }
        trace!(thread = thread.id(), prio, "Waiter requeued");
        true
    }

    /// Drop a waiter that gave up on its own
    pub(crate) fn remove(&mut self, id: WaiterId) -> bool {
        match self.waiters.iter().position(|w| w.id() == id) {
            Some(pos) => {
                self.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Grant the head waiter
    ///
    /// The result is stored before the waiter is woken; it cannot observe the
    /// grant until the caller releases the lock.
    pub fn grant_one(&mut self, result: R) -> Option<Arc<Waiter<W, R>>> {
        let waiter = self.waiters.pop_front()?;
        waiter.grant(result);
        Some(waiter)
    }

    /// Grant one specific waiter
    pub fn grant_to(&mut self, id: WaiterId, result: R) -> bool {
        match self.waiters.iter().position(|w| w.id() == id) {
            Some(pos) => {
                if let Some(waiter) = self.waiters.remove(pos) {
                    waiter.grant(result);
                }
                true
            }
            None => false,
        }
    }

    /// Grant every waiter, in queue order
    pub fn grant_all<F>(&mut self, mut result: F) -> usize
    where
        F: FnMut(&Waiter<W, R>) -> R,
    {
        let granted = self.waiters.len();
        for waiter in self.waiters.drain(..) {
            let value = result(&waiter);
            waiter.grant(value);
        }
        granted
    }

    /// Grant every waiter whose request matches
    pub fn grant_matching<P, F>(&mut self, matches: P, mut result: F) -> usize
    where
        P: Fn(&W) -> bool,
        F: FnMut(&Waiter<W, R>) -> R,
    {
        let mut granted = 0;
        let mut kept = VecDeque::with_capacity(self.waiters.len());
        for waiter in self.waiters.drain(..) {
            if matches(waiter.request()) {
                let value = result(&waiter);
                waiter.grant(value);
                granted += 1;
            } else {
                kept.push_back(waiter);
            }
        }
        self.waiters = kept;
        granted
    }

    /// Abandon every waiter; the queue accepts no new waiters afterwards
    pub fn destroy(&mut self) -> usize {
        self.destroyed = true;
        let abandoned = self.waiters.len();
        for waiter in self.waiters.drain(..) {
            waiter.abandon();
        }
        if abandoned > 0 {
            debug!(abandoned, "Wait queue destroyed with waiters");
        }
        abandoned
    }
}

impl<W, R> Default for WaitQueue<W, R> {
    fn default() -> Self {
        Self::new(WaitOrder::default())
    }
}

/// Block `thread` on the queue selected by `queue` until granted
///
/// `guard` must be the lock protecting that queue. It is released while the
/// thread sleeps and held again on return. `queue` is re-evaluated after each
/// wakeup and may return `None` once the owning object is gone.
pub fn wait_on<S, W, R, F>(
    guard: &mut MutexGuard<'_, S>,
    thread: &ThreadContext,
    deadline: Deadline,
    request: W,
    mut queue: F,
) -> CoreResult<R>
where
    F: FnMut(&mut S) -> Option<&mut WaitQueue<W, R>>,
{
    if !thread.can_block() {
        return Err(CoreError::InvalidContext(format!(
            "{} cannot block from an atomic section",
            thread.name()
        )));
    }
    if deadline.is_poll() {
        return Err(CoreError::WouldBlock);
    }

    let waiter = {
        let wq = queue(&mut **guard).ok_or(CoreError::Abandoned)?;
        if wq.is_destroyed() {
            return Err(CoreError::Abandoned);
        }
        wq.enqueue(thread, request)
    };

    thread.set_blocked(true);
    let outcome = loop {
        if let Some(outcome) = waiter.take_outcome() {
            break outcome;
        }

        let cancelled = if thread.take_interrupt() {
            Some(WaitStatus::Interrupted)
        } else if deadline.has_elapsed(Instant::now()) {
            Some(WaitStatus::TimedOut)
        } else {
            None
        };

        if let Some(status) = cancelled {
            if let Some(wq) = queue(&mut **guard) {
                wq.remove(waiter.id());
            }
            waiter.cancel(status);
            break Err(status);
        }

        match deadline.instant() {
            Some(at) => {
                thread.wake_token().wait_until(guard, at);
            }
            None => thread.wake_token().wait(guard),
        }
    };
    thread.set_blocked(false);
    // An unblock racing with a grant is dropped with the grant
    thread.take_interrupt();

    outcome.map_err(|status| match status {
        WaitStatus::Abandoned => CoreError::Abandoned,
        WaitStatus::Interrupted => CoreError::Interrupted,
        _ => CoreError::TimedOut,
    })
}

/// Interrupt a blocked thread
///
/// Must be called with the lock the thread is waiting under. Returns false if
/// the thread is not blocked.
pub fn unblock<S>(_guard: &MutexGuard<'_, S>, thread: &ThreadContext) -> bool {
    if !thread.is_blocked() {
        return false;
    }
    thread.raise_interrupt();
    thread.wake_token().notify_one();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadAttr;
    use parking_lot::Mutex;
    use std::thread;
    use std::time::Duration;

    fn thread_at(prio: i32) -> ThreadContext {
        ThreadContext::new(ThreadAttr::new(prio))
    }

    #[test]
    fn test_priority_order_with_fifo_ties() {
        let mut wq: WaitQueue<i32, ()> = WaitQueue::new(WaitOrder::Priority);
        for (tag, prio) in [(1, 3), (2, 5), (3, 3), (4, 1)] {
            wq.enqueue(&thread_at(prio), tag);
        }

        let mut granted = Vec::new();
        while let Some(w) = wq.grant_one(()) {
            granted.push(*w.request());
        }
        assert_eq!(granted, vec![2, 1, 3, 4]);
    }

    #[test]
    fn test_fifo_order_ignores_priority() {
        let mut wq: WaitQueue<i32, ()> = WaitQueue::new(WaitOrder::Fifo);
        for (tag, prio) in [(1, 3), (2, 5), (3, 1)] {
            wq.enqueue(&thread_at(prio), tag);
        }
        let order: Vec<i32> = wq.iter().map(|w| *w.request()).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_requeue_follows_priority_change() {
        let mut wq: WaitQueue<i32, ()> = WaitQueue::new(WaitOrder::Priority);
        let low = thread_at(10);
        let mid = thread_at(20);
        let peer = thread_at(90);
        wq.enqueue(&low, 1);
        wq.enqueue(&peer, 2);
        wq.enqueue(&mid, 3);

        // Boosted to an already occupied level: queued behind the peer
        low.set_weighted_priority(peer.weighted_priority());
        assert!(wq.requeue(&low));
        let order: Vec<i32> = wq.iter().map(|w| *w.request()).collect();
        assert_eq!(order, vec![2, 1, 3]);
        assert_eq!(wq.peek().map(|w| w.priority()), Some(peer.weighted_priority()));

        mid.set_weighted_priority(peer.weighted_priority() + 1);
        assert!(wq.requeue(&mid));
        let order: Vec<i32> = wq.iter().map(|w| *w.request()).collect();
        assert_eq!(order, vec![3, 2, 1]);

        assert!(!wq.requeue(&thread_at(5)));
    }

    #[test]
    fn test_grant_to_and_matching() {
        let mut wq: WaitQueue<&'static str, u32> = WaitQueue::new(WaitOrder::Fifo);
        let a = wq.enqueue(&thread_at(1), "a");
        let b = wq.enqueue(&thread_at(1), "b");
        wq.enqueue(&thread_at(1), "a");

        assert!(wq.grant_to(b.id(), 7));
        assert_eq!(b.status(), WaitStatus::Granted);
        assert!(!wq.grant_to(b.id(), 7));

        assert_eq!(wq.grant_matching(|r| *r == "a", |_| 1), 2);
        assert_eq!(a.status(), WaitStatus::Granted);
        assert!(wq.is_empty());
    }

    #[test]
    fn test_destroy_abandons() {
        let mut wq: WaitQueue<(), ()> = WaitQueue::default();
        let w = wq.enqueue(&thread_at(1), ());
        assert_eq!(wq.destroy(), 1);
        assert_eq!(w.status(), WaitStatus::Abandoned);
        assert!(wq.is_destroyed());
    }

    #[test]
    fn test_wait_rejects_atomic_and_poll() {
        let lock = Mutex::new(WaitQueue::<(), ()>::default());
        let me = thread_at(1);
        let mut guard = lock.lock();

        let err = wait_on(&mut guard, &me, Deadline::NonBlocking, (), |q| Some(q)).unwrap_err();
        assert_eq!(err, CoreError::WouldBlock);

        let _atomic = me.enter_atomic();
        let err = wait_on(&mut guard, &me, Deadline::Infinite, (), |q| Some(q)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidContext(_)));
        assert!(guard.is_empty());
    }

    #[test]
    fn test_wait_times_out_and_dequeues() {
        let lock = Mutex::new(WaitQueue::<(), ()>::default());
        let me = thread_at(1);
        let mut guard = lock.lock();

        let deadline = Deadline::after(Duration::from_millis(30));
        let err = wait_on(&mut guard, &me, deadline, (), |q| Some(q)).unwrap_err();
        assert_eq!(err, CoreError::TimedOut);
        assert!(guard.is_empty());
        assert!(!me.is_blocked());
    }

    #[test]
    fn test_grant_wakes_blocked_thread() {
        let lock = Arc::new(Mutex::new(WaitQueue::<(), u32>::default()));
        let waiter_lock = Arc::clone(&lock);

        let handle = thread::spawn(move || {
            let me = thread_at(1);
            let mut guard = waiter_lock.lock();
            wait_on(&mut guard, &me, Deadline::after(Duration::from_secs(5)), (), |q| Some(q))
        });

        while lock.lock().is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(lock.lock().grant_one(42).is_some());
        assert_eq!(handle.join().unwrap(), Ok(42));
    }

    #[test]
    fn test_unblock_interrupts() {
        let lock = Arc::new(Mutex::new(WaitQueue::<(), ()>::default()));
        let sleeper = thread_at(1);

        let waiter_lock = Arc::clone(&lock);
        let me = sleeper.clone();
        let handle = thread::spawn(move || {
            let mut guard = waiter_lock.lock();
            wait_on(&mut guard, &me, Deadline::Infinite, (), |q| Some(q))
        });

        while lock.lock().is_empty() {
            thread::sleep(Duration::from_millis(1));
        }
        {
            let guard = lock.lock();
            assert!(unblock(&guard, &sleeper));
        }
        assert_eq!(handle.join().unwrap(), Err(CoreError::Interrupted));
        assert!(lock.lock().is_empty());

        let guard = lock.lock();
        assert!(!unblock(&guard, &sleeper));
    }
}
