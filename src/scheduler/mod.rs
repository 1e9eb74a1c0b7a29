/*!
 * Scheduler Module
 * Scheduling classes, policy resolution, temporal partitions and quota groups
 */

pub mod class;
pub mod policy;
pub mod quota;
pub mod state;
pub mod tp;
pub mod types;

// Re-export public API
pub use class::{priority_range, SchedClass};
pub use policy::{PolicyResolver, Resolved};
pub use quota::{QuotaGroup, QuotaInfo, QuotaRegistry, QuotaScope};
pub use state::{SchedState, ThreadPolicy};
pub use tp::{TpActiveWindow, TpCpuState, TpSchedule, TpScheduleInfo, TpWindow, TpWindowSpec};
pub use types::{ParamEx, Policy, SchedParam, SporadicParam};
