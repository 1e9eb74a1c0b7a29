/*!
 * System Limits and Constants
 *
 * Centralized location for scheduling windows, class weights and IPC
 * accounting constants. Organized by domain.
 */

use std::time::Duration;

// =============================================================================
// PRIORITY WINDOWS
// =============================================================================

/// Lowest priority of the core class (extended range, reserved levels below FIFO)
pub const CORE_MIN_PRIO: i32 = 0;

/// Highest priority of the core class (three levels above FIFO max)
pub const CORE_MAX_PRIO: i32 = 259;

/// FIFO window, shared by round-robin, sporadic, TP and quota policies
pub const FIFO_MIN_PRIO: i32 = 1;
pub const FIFO_MAX_PRIO: i32 = 256;

/// Weak class window
pub const WEAK_MIN_PRIO: i32 = 0;
pub const WEAK_MAX_PRIO: i32 = 99;

// =============================================================================
// CLASS WEIGHTS
// =============================================================================

/// Weight step between scheduling classes
/// Larger than any class-local priority window, so weighted priorities never overlap
pub const CLASS_WEIGHT_FACTOR: i32 = 1024;

pub const WEAK_CLASS_LEVEL: i32 = 1;
pub const TP_CLASS_LEVEL: i32 = 2;
pub const SPORADIC_CLASS_LEVEL: i32 = 3;
pub const QUOTA_CLASS_LEVEL: i32 = 3;
pub const RT_CLASS_LEVEL: i32 = 4;

// =============================================================================
// SPORADIC SERVER
// =============================================================================

/// Maximum number of pending replenishments per sporadic thread
pub const SPORADIC_MAX_REPL: u32 = 32;

// =============================================================================
// TEMPORAL PARTITIONING
// =============================================================================

/// Pseudo-partition marking idle time in a TP schedule
pub const TP_IDLE_PARTITION: i32 = -1;

/// Default number of TP partitions per CPU
pub const DEFAULT_TP_PARTITIONS: usize = 4;

// =============================================================================
// QUOTA GROUPS
// =============================================================================

/// Default quota accounting period (1 second)
pub const DEFAULT_QUOTA_PERIOD: Duration = Duration::from_secs(1);

/// Default maximum number of quota groups per CPU
pub const DEFAULT_MAX_QUOTA_GROUPS: usize = 1024;

/// Full CPU bandwidth, in percent
pub const QUOTA_FULL_PERCENT: i32 = 100;

// =============================================================================
// MESSAGE QUEUES
// =============================================================================

/// Per-message bookkeeping charged against an arena pool
pub const MSG_HEADER_SIZE: usize = 16;

/// Arena pools reserve pool_size / ARENA_OVERHEAD_DIVISOR extra bytes (~5%)
pub const ARENA_OVERHEAD_DIVISOR: usize = 20;

/// Maximum length of a registered object name
pub const MAX_OBJECT_NAME_LEN: usize = 31;

/// Prefix used when generating names for anonymous queues
pub const QUEUE_NAME_PREFIX: &str = "queue";

// =============================================================================
// CPUS
// =============================================================================

/// Default number of CPUs managed by a nucleus
pub const DEFAULT_NR_CPUS: usize = 4;

/// Hard upper bound on managed CPUs
pub const MAX_NR_CPUS: usize = 256;
