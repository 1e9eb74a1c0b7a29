/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Nucleus operation result
///
/// # Must Use
/// Scheduling and IPC operations can fail and must be handled; none are swallowed
pub type CoreResult<T> = Result<T, CoreError>;

/// Unified nucleus error type with miette diagnostics
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(rename_all = "snake_case", tag = "error", content = "details")]
pub enum CoreError {
    /// Bad priority range, non-contiguous windows, zero pool size, double free
    #[error("Invalid argument: {0}")]
    #[diagnostic(
        code(nucleus::invalid_argument),
        help("A parameter is outside its accepted range or the request is inconsistent. Nothing was changed.")
    )]
    InvalidArgument(String),

    /// Unknown group or queue, or an object outside the caller's namespace
    #[error("No such entity: {0}")]
    #[diagnostic(
        code(nucleus::no_such_entity),
        help("The object does not exist or is not visible from the caller's process.")
    )]
    NoSuchEntity(String),

    /// Duplicate name on create
    #[error("Already exists: {0}")]
    #[diagnostic(
        code(nucleus::already_exists),
        help("Another object is registered under this name. Pick another name or bind to the existing one.")
    )]
    AlreadyExists(String),

    /// Allocation or capacity exhaustion
    #[error("Out of memory: {0}")]
    #[diagnostic(
        code(nucleus::no_memory),
        help("The pool or the queue limit is exhausted. Free buffers, flush the queue or enlarge the pool.")
    )]
    NoMemory(String),

    /// Blocking call from a non-suspendable context
    #[error("Invalid context: {0}")]
    #[diagnostic(
        code(nucleus::invalid_context),
        help("Blocking services cannot be called from an atomic section. Use a non-blocking deadline.")
    )]
    InvalidContext(String),

    #[error("Operation timed out")]
    #[diagnostic(code(nucleus::timed_out))]
    TimedOut,

    /// Zero-deadline poll with nothing available
    #[error("Operation would block")]
    #[diagnostic(code(nucleus::would_block))]
    WouldBlock,

    /// External unblock request
    #[error("Wait was interrupted")]
    #[diagnostic(code(nucleus::interrupted))]
    Interrupted,

    /// Resource deleted while waiting. Terminal: the handle must be discarded.
    #[error("Object deleted while waiting")]
    #[diagnostic(
        code(nucleus::abandoned),
        help("The object this thread was waiting on has been deleted. Discard the handle.")
    )]
    Abandoned,
}

impl CoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn no_entity(msg: impl Into<String>) -> Self {
        Self::NoSuchEntity(msg.into())
    }

    pub fn no_memory(msg: impl Into<String>) -> Self {
        Self::NoMemory(msg.into())
    }

    /// POSIX error code reported to co-kernel callers
    pub const fn errno(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => 22, // EINVAL
            Self::NoSuchEntity(_) => 3,     // ESRCH
            Self::AlreadyExists(_) => 17,   // EEXIST
            Self::NoMemory(_) => 12,        // ENOMEM
            Self::InvalidContext(_) => 1,   // EPERM
            Self::TimedOut => 110,          // ETIMEDOUT
            Self::WouldBlock => 11,         // EWOULDBLOCK
            Self::Interrupted => 4,         // EINTR
            Self::Abandoned => 43,          // EIDRM
        }
    }

    /// True for the outcomes a blocked waiter can observe on wakeup
    pub fn is_wait_outcome(&self) -> bool {
        matches!(
            self,
            Self::TimedOut | Self::Interrupted | Self::Abandoned | Self::WouldBlock
        )
    }
}
