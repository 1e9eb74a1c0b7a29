/*!
 * Core Types
 * Common types used across the nucleus
 */

/// Process ID type (owner of threads, private quota groups and queues)
pub type Pid = u32;

/// Nucleus thread identifier
pub type ThreadId = u64;

/// CPU index
pub type CpuId = usize;

/// Numeric scheduling priority (signed: negative values have a policy meaning)
pub type Priority = i32;

/// Weighted priority: class weight plus class-local priority
pub type WeightedPriority = i32;

/// Temporal partition identifier (-1 is the idle pseudo-partition)
pub type PartitionId = i32;

/// Quota group identifier
pub type GroupId = u32;

/// Message queue identifier
pub type QueueId = u64;

/// Size type for pool accounting
pub type Size = usize;
