/*!
 * Wait Queue Tests
 * Ordering, grants, timeouts, interrupts and abandonment across host threads
 */

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use rt_nucleus::sync::{unblock, wait_on};
use rt_nucleus::{CoreError, Deadline, ThreadAttr, ThreadContext, WaitOrder, WaitQueue};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type Shared = Arc<Mutex<WaitQueue<u32, u32>>>;

fn wait_for_count(queue: &Shared, count: usize) {
    let start = Instant::now();
    while queue.lock().count() < count {
        assert!(start.elapsed() < Duration::from_secs(5), "waiters never queued");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Block a new thread at `prio` on the queue; it returns (tag, result)
fn spawn_waiter(queue: &Shared, prio: i32, tag: u32) -> (ThreadContext, JoinHandle<(u32, Result<u32, CoreError>)>) {
    let ctx = ThreadContext::new(ThreadAttr::new(prio));
    let handle = {
        let queue = Arc::clone(queue);
        let ctx = ctx.clone();
        thread::spawn(move || {
            let mut guard = queue.lock();
            let result = wait_on(&mut guard, &ctx, Deadline::Infinite, tag, |q| Some(q));
            (tag, result)
        })
    };
    (ctx, handle)
}

#[test]
fn test_priority_grants_follow_priority_then_fifo() {
    let queue: Shared = Arc::new(Mutex::new(WaitQueue::new(WaitOrder::Priority)));
    let mut handles = Vec::new();
    for (idx, prio) in [3, 5, 3, 1].into_iter().enumerate() {
        let (_ctx, handle) = spawn_waiter(&queue, prio, idx as u32);
        handles.push(handle);
        wait_for_count(&queue, idx + 1);
    }

    let order: Vec<u32> = queue.lock().iter().map(|w| *w.request()).collect();
    assert_eq!(order, vec![1, 0, 2, 3]);

    let mut granted = Vec::new();
    for value in 0..4 {
        let waiter = queue.lock().grant_one(value).unwrap();
        granted.push(*waiter.request());
    }
    assert_eq!(granted, vec![1, 0, 2, 3]);

    for handle in handles {
        let (tag, result) = handle.join().unwrap();
        let expected = granted.iter().position(|t| *t == tag).unwrap() as u32;
        assert_eq!(result, Ok(expected));
    }
}

#[test]
fn test_grant_all_wakes_everyone() {
    let queue: Shared = Arc::new(Mutex::new(WaitQueue::new(WaitOrder::Fifo)));
    let handles: Vec<_> = (0..3)
        .map(|tag| {
            let (_ctx, handle) = spawn_waiter(&queue, 10, tag);
            wait_for_count(&queue, tag as usize + 1);
            handle
        })
        .collect();

    assert_eq!(queue.lock().grant_all(|w| *w.request() * 10), 3);
    for handle in handles {
        let (tag, result) = handle.join().unwrap();
        assert_eq!(result, Ok(tag * 10));
    }
    assert!(queue.lock().is_empty());
}

#[test]
fn test_destroy_abandons_waiters() {
    let queue: Shared = Arc::new(Mutex::new(WaitQueue::new(WaitOrder::Priority)));
    let (_ctx, handle) = spawn_waiter(&queue, 10, 7);
    wait_for_count(&queue, 1);

    assert_eq!(queue.lock().destroy(), 1);
    assert_eq!(handle.join().unwrap().1, Err(CoreError::Abandoned));

    // No new waiters on a destroyed queue
    let ctx = ThreadContext::new(ThreadAttr::new(10));
    let mut guard = queue.lock();
    let late = wait_on(&mut guard, &ctx, Deadline::Infinite, 1, |q| Some(q));
    assert_eq!(late, Err(CoreError::Abandoned));
}

#[test]
fn test_unblock_interrupts_waiter() {
    let queue: Shared = Arc::new(Mutex::new(WaitQueue::new(WaitOrder::Fifo)));
    let (ctx, handle) = spawn_waiter(&queue, 10, 1);
    wait_for_count(&queue, 1);

    {
        let guard = queue.lock();
        assert!(unblock(&guard, &ctx));
    }
    assert_eq!(handle.join().unwrap().1, Err(CoreError::Interrupted));
    assert_eq!(queue.lock().count(), 0);

    let guard = queue.lock();
    assert!(!unblock(&guard, &ctx));
}

#[test]
fn test_timed_wait_expires() {
    let queue: Shared = Arc::new(Mutex::new(WaitQueue::new(WaitOrder::Fifo)));
    let ctx = ThreadContext::new(ThreadAttr::new(10));
    let start = Instant::now();
    let mut guard = queue.lock();
    let result = wait_on(&mut guard, &ctx, Deadline::after(Duration::from_millis(30)), 0, |q| Some(q));
    assert_eq!(result, Err(CoreError::TimedOut));
    assert!(start.elapsed() >= Duration::from_millis(30));
    assert_eq!(guard.count(), 0);
}

#[test]
fn test_atomic_section_rejects_blocking() {
    let queue: Shared = Arc::new(Mutex::new(WaitQueue::new(WaitOrder::Fifo)));
    let ctx = ThreadContext::new(ThreadAttr::new(10));
    let _atomic = ctx.enter_atomic();
    let mut guard = queue.lock();
    let result = wait_on(&mut guard, &ctx, Deadline::Infinite, 0, |q| Some(q));
    assert!(matches!(result, Err(CoreError::InvalidContext(_))));
    assert_eq!(guard.count(), 0);
}
