/*!
 * Nucleus
 *
 * Owner of the one coarse lock and of everything it protects: per-CPU
 * scheduler state, the thread admission table, the queue table and the name
 * registry. Cheap to clone; clones share the same state.
 */

mod sched;

use crate::core::config::NucleusConfig;
use crate::core::errors::CoreResult;
use crate::ipc::IpcState;
use crate::scheduler::SchedState;
use crate::sync;
use crate::thread::{ThreadAttr, ThreadContext};
use log::info;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Everything guarded by the nucleus lock
pub struct NucleusState {
    pub(crate) sched: SchedState,
    pub(crate) ipc: IpcState,
}

impl NucleusState {
    /// Re-position `thread` in whichever wait queue holds it
    pub(crate) fn requeue_waiter(&mut self, thread: &ThreadContext) -> bool {
        if self.ipc.registry.binders_mut().requeue(thread) {
            return true;
        }
        self.ipc.queues.values_mut().any(|queue| queue.requeue_receiver(thread))
    }
}

struct Inner {
    config: NucleusConfig,
    state: Mutex<NucleusState>,
}

#[derive(Clone)]
pub struct Nucleus {
    inner: Arc<Inner>,
}

impl Nucleus {
    pub fn new(config: NucleusConfig) -> CoreResult<Self> {
        config.validate()?;
        info!(
            "Nucleus started: {} CPUs, {} TP partitions, quota period {:?}",
            config.cpus,
            config.tp_partitions,
            config.quota_period()
        );
        let state = NucleusState {
            sched: SchedState::new(&config),
            ipc: IpcState::new(),
        };
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn config(&self) -> &NucleusConfig {
        &self.inner.config
    }

    /// Take the nucleus lock
    pub(crate) fn lock(&self) -> MutexGuard<'_, NucleusState> {
        self.inner.state.lock()
    }

    /// Create a thread context and admit it under FIFO at its base priority
    pub fn spawn_thread(&self, attr: ThreadAttr) -> CoreResult<ThreadContext> {
        let priority = attr.priority;
        let thread = ThreadContext::new(attr);
        self.lock().sched.attach(&thread, priority)?;
        Ok(thread)
    }

    /// Interrupt `thread` if it is blocked in a nucleus service
    ///
    /// The thread's wait fails with Interrupted. Returns false if it was not
    /// blocked.
    pub fn unblock(&self, thread: &ThreadContext) -> bool {
        let guard = self.lock();
        sync::unblock(&guard, thread)
    }
}

impl std::fmt::Debug for Nucleus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nucleus")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
