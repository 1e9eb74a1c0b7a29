/*!
 * Synchronization Module
 *
 * The synchronous wait/wake primitive underlying every blocking service:
 * ordered waiters, direct grants carrying a result, timed waits, external
 * interruption and abandonment when the owning object is deleted.
 */

mod wait;
mod waiter;

pub use wait::{unblock, wait_on, WaitOrder, WaitQueue};
pub use waiter::{WaitStatus, Waiter, WaiterId};
