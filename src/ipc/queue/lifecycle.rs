/*!
 * Queue Lifecycle Operations
 * Create, bind, unbind and delete
 */

use super::pool::MessagePool;
use super::types::QueueAttr;
use super::{MessageQueue, QueueState};
use crate::core::clock::Deadline;
use crate::core::errors::{CoreError, CoreResult};
use crate::nucleus::Nucleus;
use crate::sync::{wait_on, WaitQueue};
use crate::thread::ThreadContext;
use std::collections::VecDeque;
use tracing::{debug, info};

impl MessageQueue {
    /// Create a queue and register its name
    ///
    /// Fails with AlreadyExists if the name is taken, InvalidArgument for a
    /// zero pool size and InvalidContext from an atomic section.
    pub fn create(nucleus: &Nucleus, thread: &ThreadContext, attr: QueueAttr) -> CoreResult<Self> {
        if !thread.can_block() {
            return Err(CoreError::InvalidContext(
                "queues cannot be created from an atomic section".into(),
            ));
        }

        let pool = MessagePool::new(attr.pool_size, attr.limit)?;
        let layout = pool.layout();

        let mut guard = nucleus.lock();
        let ipc = &mut guard.ipc;
        let name = ipc.registry.make_name(attr.name.as_deref())?;
        if ipc.registry.lookup(&name).is_some() {
            return Err(CoreError::AlreadyExists(format!("queue '{}'", name)));
        }

        let id = ipc.allocate_id();
        ipc.queues.insert(
            id,
            QueueState {
                name: name.clone(),
                owner: thread.pid(),
                limit: attr.limit,
                pool,
                pending: VecDeque::new(),
                waiters: WaitQueue::new(attr.order),
            },
        );
        let woken = ipc.registry.register(&name, id)?;
        drop(guard);

        info!(
            pid = thread.pid(),
            queue = id,
            name = %name,
            layout = ?layout,
            binders_woken = woken,
            "Queue created"
        );
        Ok(Self {
            nucleus: nucleus.clone(),
            id,
            name: name.into(),
            pid: thread.pid(),
        })
    }

    /// Look a queue up by name, waiting until `deadline` for it to appear
    pub fn bind(nucleus: &Nucleus, thread: &ThreadContext, name: &str, deadline: Deadline) -> CoreResult<Self> {
        let mut guard = nucleus.lock();
        let id = match guard.ipc.registry.lookup(name) {
            Some(id) => id,
            None => {
                debug!(name, thread = thread.id(), "Waiting for name");
                wait_on(&mut guard, thread, deadline, name.to_string(), |state| {
                    Some(state.ipc.registry.binders_mut())
                })?
            }
        };
        if !guard.ipc.queues.contains_key(&id) {
            return Err(CoreError::no_entity(format!("queue '{}' was deleted", name)));
        }
        drop(guard);

        Ok(Self {
            nucleus: nucleus.clone(),
            id,
            name: name.into(),
            pid: thread.pid(),
        })
    }

    /// Drop this handle; the queue stays alive
    pub fn unbind(self) {
        debug!(queue = self.id, pid = self.pid, "Queue handle unbound");
    }

    /// Destroy the queue
    ///
    /// Every blocked receiver wakes with Abandoned; pending messages are
    /// released. Other handles on the queue fail with NoSuchEntity from then on.
    pub fn delete(self, thread: &ThreadContext) -> CoreResult<()> {
        if !thread.can_block() {
            return Err(CoreError::InvalidContext(
                "queues cannot be deleted from an atomic section".into(),
            ));
        }

        let mut guard = self.nucleus.lock();
        let mut queue = guard.ipc.queues.remove(&self.id).ok_or_else(|| self.missing())?;
        guard.ipc.registry.unregister(&queue.name);

        let abandoned = queue.waiters.destroy();
        let flushed = queue.drain_pending();
        drop(guard);

        info!(
            pid = thread.pid(),
            owner = queue.owner,
            queue = self.id,
            abandoned,
            flushed,
            "Queue deleted"
        );
        Ok(())
    }
}
