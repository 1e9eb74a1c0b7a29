/*!
 * IPC Module
 * Message queues with zero-copy delivery, and the name registry they bind through
 */

pub mod queue;
pub mod registry;

use crate::core::types::QueueId;
use ahash::AHashMap;
use queue::QueueState;
use registry::Registry;

// Re-export for convenience
pub use queue::{MessageBuf, MessageQueue, PoolLayout, QueueAttr, QueueInfo, QueueLimit, SendMode};

/// IPC half of the nucleus state
pub(crate) struct IpcState {
    pub(crate) queues: AHashMap<QueueId, QueueState>,
    pub(crate) registry: Registry,
    next_id: QueueId,
}

impl IpcState {
    pub(crate) fn new() -> Self {
        Self {
            queues: AHashMap::new(),
            registry: Registry::new(),
            next_id: 1,
        }
    }

    /// Queue ids are never reused, so stale handles always miss
    pub(crate) fn allocate_id(&mut self) -> QueueId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
