/*!
 * Nucleus Scheduling Services
 * Thread policies, TP schedules and quota groups
 */

use super::Nucleus;
use crate::core::errors::CoreResult;
use crate::core::types::{CpuId, GroupId, Pid, Priority, WeightedPriority};
use crate::scheduler::{
    ParamEx, Policy, QuotaInfo, ThreadPolicy, TpActiveWindow, TpScheduleInfo, TpWindowSpec,
};
use crate::thread::ThreadContext;
use std::time::Instant;

impl Nucleus {
    // =========================================================================
    // Thread policies
    // =========================================================================

    /// Move `thread` to `policy`; nothing changes on error
    ///
    /// A thread blocked in a nucleus service is re-sorted in the queue it
    /// sleeps on, so grants honour its new priority.
    pub fn set_thread_policy(&self, thread: &ThreadContext, policy: Policy, param: &ParamEx) -> CoreResult<ThreadPolicy> {
        let mut state = self.lock();
        let updated = state.sched.set_policy(thread, policy, param)?;
        if thread.is_blocked() {
            state.requeue_waiter(thread);
        }
        Ok(updated)
    }

    pub fn thread_policy(&self, thread: &ThreadContext) -> CoreResult<ThreadPolicy> {
        self.lock().sched.policy_of(thread)
    }

    /// Remove `thread` from the admission table and from its quota group
    pub fn detach_thread(&self, thread: &ThreadContext) -> CoreResult<ThreadPolicy> {
        self.lock().sched.detach(thread)
    }

    pub fn min_priority(&self, policy: Policy) -> Priority {
        self.lock().sched.resolver().min_priority(policy)
    }

    pub fn max_priority(&self, policy: Policy) -> Priority {
        self.lock().sched.resolver().max_priority(policy)
    }

    pub fn weighted_priority(&self, policy: Policy, param: &ParamEx) -> CoreResult<WeightedPriority> {
        self.lock().sched.resolver().weighted_priority(policy, param)
    }

    // =========================================================================
    // Temporal partitioning
    // =========================================================================

    /// Install a TP schedule on `cpu`; an empty list uninstalls it
    ///
    /// A rejected table leaves the previous schedule active.
    pub fn set_tp_schedule(&self, cpu: CpuId, windows: &[TpWindowSpec]) -> CoreResult<()> {
        let previous = self.lock().sched.set_tp_schedule(cpu, windows)?;
        // Released outside the lock
        drop(previous);
        Ok(())
    }

    /// Snapshot of the schedule installed on `cpu`, if any
    pub fn tp_schedule(&self, cpu: CpuId) -> CoreResult<Option<TpScheduleInfo>> {
        let schedule = self.lock().sched.tp_schedule(cpu)?;
        Ok(schedule.map(|s| s.snapshot()))
    }

    pub fn tp_active_window(&self, cpu: CpuId) -> CoreResult<Option<TpActiveWindow>> {
        self.lock().sched.tp_active_window(cpu, Instant::now())
    }

    // =========================================================================
    // Quota groups
    // =========================================================================

    /// Create a group at full quota on `cpu`
    pub fn quota_add_group(&self, caller: &ThreadContext, cpu: CpuId, shared: bool) -> CoreResult<QuotaInfo> {
        self.lock().sched.quota_add_default(caller.pid(), cpu, shared)
    }

    /// Create a group with its limits set in the same step
    pub fn quota_add_group_with_limit(
        &self,
        caller: &ThreadContext,
        cpu: CpuId,
        shared: bool,
        quota: i32,
        quota_peak: i32,
    ) -> CoreResult<QuotaInfo> {
        self.lock()
            .sched
            .quota_add(caller.pid(), cpu, shared, quota, quota_peak)
    }

    /// Remove a group; members of a forced removal fall back to RT
    pub fn quota_remove_group(&self, caller: &ThreadContext, group: GroupId, force: bool) -> CoreResult<QuotaInfo> {
        self.lock().sched.quota_remove(caller.pid(), group, force)
    }

    pub fn quota_set_limit(
        &self,
        caller: &ThreadContext,
        group: GroupId,
        quota: i32,
        quota_peak: i32,
    ) -> CoreResult<QuotaInfo> {
        self.lock()
            .sched
            .quota_set_limit(caller.pid(), group, quota, quota_peak)
    }

    pub fn quota_group_info(&self, caller: &ThreadContext, group: GroupId) -> CoreResult<QuotaInfo> {
        self.lock().sched.quota_info(caller.pid(), group)
    }

    /// Drop every private group of an exiting process; returns how many
    pub fn quota_cleanup(&self, pid: Pid) -> usize {
        self.lock().sched.quota_cleanup(pid)
    }
}
