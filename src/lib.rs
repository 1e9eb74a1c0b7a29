/*!
 * RT Nucleus Library
 * Real-time scheduling classes and message-queue IPC built on one wait/wake primitive
 */

pub mod core;
pub mod ipc;
pub mod nucleus;
pub mod scheduler;
pub mod sync;
pub mod thread;

// Re-exports
pub use crate::core::errors::{CoreError, CoreResult};
pub use crate::core::tracer::init_tracing;
pub use crate::core::{Deadline, NucleusConfig};
pub use ipc::{MessageBuf, MessageQueue, QueueAttr, QueueInfo, QueueLimit, SendMode};
pub use nucleus::Nucleus;
pub use scheduler::{
    ParamEx, Policy, QuotaInfo, SchedClass, SchedParam, ThreadPolicy, TpActiveWindow,
    TpScheduleInfo, TpWindowSpec,
};
pub use sync::{WaitOrder, WaitQueue, WaitStatus};
pub use thread::{ThreadAttr, ThreadContext};
