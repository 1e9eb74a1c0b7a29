/*!
 * Thread Context
 * Identity, priority and wake token of a nucleus thread
 */

use crate::core::limits::{CLASS_WEIGHT_FACTOR, RT_CLASS_LEVEL};
use crate::core::types::{CpuId, Pid, Priority, ThreadId, WeightedPriority};
use parking_lot::Condvar;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Attributes used to create a thread context
#[derive(Debug, Clone)]
pub struct ThreadAttr {
    pub name: String,
    pub pid: Pid,
    pub cpu: CpuId,
    /// Base FIFO priority
    pub priority: Priority,
}

impl Default for ThreadAttr {
    fn default() -> Self {
        Self {
            name: String::new(),
            pid: std::process::id(),
            cpu: 0,
            priority: 1,
        }
    }
}

impl ThreadAttr {
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn on_cpu(mut self, cpu: CpuId) -> Self {
        self.cpu = cpu;
        self
    }

    pub fn in_process(mut self, pid: Pid) -> Self {
        self.pid = pid;
        self
    }
}

struct Inner {
    id: ThreadId,
    name: String,
    pid: Pid,
    cpu: CpuId,
    wprio: AtomicI32,
    atomic_depth: AtomicU32,
    blocked: AtomicBool,
    interrupted: AtomicBool,
    wake: Condvar,
}

/// Handle on a nucleus thread
///
/// Cheap to clone; all clones designate the same thread. The wake token is
/// only ever waited on or notified with the owning lock held.
#[derive(Clone)]
pub struct ThreadContext {
    inner: Arc<Inner>,
}

impl ThreadContext {
    pub fn new(attr: ThreadAttr) -> Self {
        let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        let name = if attr.name.is_empty() {
            format!("thread@{}", id)
        } else {
            attr.name
        };
        Self {
            inner: Arc::new(Inner {
                id,
                name,
                pid: attr.pid,
                cpu: attr.cpu,
                wprio: AtomicI32::new(attr.priority + RT_CLASS_LEVEL * CLASS_WEIGHT_FACTOR),
                atomic_depth: AtomicU32::new(0),
                blocked: AtomicBool::new(false),
                interrupted: AtomicBool::new(false),
                wake: Condvar::new(),
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> ThreadId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.inner.pid
    }

    #[inline]
    pub fn cpu(&self) -> CpuId {
        self.inner.cpu
    }

    /// Weighted priority used to order priority wait queues
    #[inline]
    pub fn weighted_priority(&self) -> WeightedPriority {
        self.inner.wprio.load(Ordering::Acquire)
    }

    pub(crate) fn set_weighted_priority(&self, wprio: WeightedPriority) {
        self.inner.wprio.store(wprio, Ordering::Release);
    }

    /// Enter a non-suspendable section; blocking services fail until the guard drops
    pub fn enter_atomic(&self) -> AtomicSection<'_> {
        self.inner.atomic_depth.fetch_add(1, Ordering::AcqRel);
        AtomicSection { thread: self }
    }

    #[inline]
    pub fn can_block(&self) -> bool {
        self.inner.atomic_depth.load(Ordering::Acquire) == 0
    }

    pub fn is_blocked(&self) -> bool {
        self.inner.blocked.load(Ordering::Acquire)
    }

    pub(crate) fn set_blocked(&self, blocked: bool) {
        self.inner.blocked.store(blocked, Ordering::Release);
    }

    pub(crate) fn raise_interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::Release);
    }

    pub(crate) fn take_interrupt(&self) -> bool {
        self.inner.interrupted.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn wake_token(&self) -> &Condvar {
        &self.inner.wake
    }

    pub fn same_thread(&self, other: &ThreadContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadContext")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("pid", &self.inner.pid)
            .field("cpu", &self.inner.cpu)
            .field("wprio", &self.weighted_priority())
            .finish()
    }
}

/// RAII guard for a non-suspendable section
pub struct AtomicSection<'a> {
    thread: &'a ThreadContext,
}

impl Drop for AtomicSection<'_> {
    fn drop(&mut self) {
        self.thread.inner.atomic_depth.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_section_nests() {
        let thread = ThreadContext::new(ThreadAttr::new(10));
        assert!(thread.can_block());
        {
            let _outer = thread.enter_atomic();
            let _inner = thread.enter_atomic();
            assert!(!thread.can_block());
        }
        assert!(thread.can_block());
    }

    #[test]
    fn test_default_weighted_priority_is_rt() {
        let thread = ThreadContext::new(ThreadAttr::new(10));
        assert_eq!(thread.weighted_priority(), 10 + 4 * 1024);
        assert!(thread.name().starts_with("thread@"));
    }
}
