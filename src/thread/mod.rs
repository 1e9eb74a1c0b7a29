/*!
 * Thread Module
 * The thread collaborator: identity, priority, context and wake token
 */

mod context;

pub use context::{AtomicSection, ThreadAttr, ThreadContext};
