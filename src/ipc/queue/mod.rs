/*!
 * Message Queues
 *
 * A queue combines a message pool, a list of undelivered messages and a
 * wait queue of blocked receivers, all under the nucleus lock. Senders hand
 * buffers straight to waiting receivers when there are any; otherwise the
 * message is kept pending until someone receives it.
 */

mod lifecycle;
mod operations;
pub mod pool;
pub mod types;

use crate::core::errors::{CoreError, CoreResult};
use crate::core::types::{Pid, QueueId};
use crate::nucleus::{Nucleus, NucleusState};
use crate::sync::WaitQueue;
use crate::thread::ThreadContext;
use pool::{MessageCell, MessagePool};
use std::collections::VecDeque;
use std::sync::Arc;
use types::{Delivery, ReadRequest};

// Re-export public API
pub use pool::{MessageBuf, PoolLayout};
pub use types::{QueueAttr, QueueInfo, QueueLimit, SendMode};

/// Queue state kept in the nucleus table
pub(crate) struct QueueState {
    name: String,
    owner: Pid,
    limit: QueueLimit,
    pool: MessagePool,
    pending: VecDeque<Arc<MessageCell>>,
    waiters: WaitQueue<ReadRequest, Delivery>,
}

impl QueueState {
    /// Release every pending message; returns how many there were
    fn drain_pending(&mut self) -> usize {
        let count = self.pending.len();
        for cell in self.pending.drain(..) {
            self.pool.release(&cell);
        }
        count
    }

    /// Re-sort a blocked receiver after its priority changed
    pub(crate) fn requeue_receiver(&mut self, thread: &ThreadContext) -> bool {
        self.waiters.requeue(thread)
    }
}

/// Handle on a message queue
///
/// Handles are bound to the process of the thread that created or bound
/// them; that process id selects the direct-copy path in `write`.
#[derive(Clone)]
pub struct MessageQueue {
    nucleus: Nucleus,
    id: QueueId,
    name: Arc<str>,
    pid: Pid,
}

impl MessageQueue {
    pub fn id(&self) -> QueueId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Process this handle was bound from
    pub fn pid(&self) -> Pid {
        self.pid
    }

    fn missing(&self) -> CoreError {
        CoreError::no_entity(format!("queue '{}' ({})", self.name, self.id))
    }

    /// Run `f` on the queue state with the nucleus lock held
    fn with_state<T>(&self, f: impl FnOnce(&mut QueueState) -> CoreResult<T>) -> CoreResult<T> {
        let mut guard = self.nucleus.lock();
        let queue = guard.ipc.queues.get_mut(&self.id).ok_or_else(|| self.missing())?;
        f(queue)
    }

    fn state_mut<'a>(&self, state: &'a mut NucleusState) -> CoreResult<&'a mut QueueState> {
        state.ipc.queues.get_mut(&self.id).ok_or_else(|| self.missing())
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageQueue")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pid", &self.pid)
            .finish()
    }
}
