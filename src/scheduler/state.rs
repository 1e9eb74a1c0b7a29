/*!
 * Scheduler State
 *
 * Thread admission table plus the per-CPU TP and quota state. Lives inside
 * the nucleus lock; every method assumes it is held.
 */

use super::class::SchedClass;
use super::policy::{PolicyResolver, Resolved};
use super::quota::{QuotaInfo, QuotaRegistry, QuotaScope};
use super::tp::{TpActiveWindow, TpCpuState, TpSchedule, TpWindowSpec};
use super::types::{ParamEx, Policy, SchedParam};
use crate::core::config::NucleusConfig;
use crate::core::errors::{CoreError, CoreResult};
use crate::core::limits::QUOTA_FULL_PERCENT;
use crate::core::types::{CpuId, GroupId, Pid, Priority, ThreadId, WeightedPriority};
use crate::thread::ThreadContext;
use ahash::AHashMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Scheduling record of an admitted thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPolicy {
    pub policy: Policy,
    pub class: SchedClass,
    pub param: SchedParam,
    pub time_slice: Option<Duration>,
    pub weighted_priority: WeightedPriority,
}

struct ThreadSched {
    thread: ThreadContext,
    policy: ThreadPolicy,
}

impl ThreadSched {
    fn apply(&mut self, resolved: Resolved) {
        self.policy = ThreadPolicy {
            policy: resolved.policy,
            class: resolved.class,
            param: resolved.param,
            time_slice: resolved.slice.or(self.policy.time_slice),
            weighted_priority: resolved.weighted_priority(),
        };
        self.thread.set_weighted_priority(self.policy.weighted_priority);
    }
}

pub struct SchedState {
    resolver: PolicyResolver,
    tp_partitions: usize,
    threads: AHashMap<ThreadId, ThreadSched>,
    tp: Vec<TpCpuState>,
    quota: Vec<QuotaRegistry>,
    group_cpu: AHashMap<GroupId, CpuId>,
    next_group: GroupId,
}

impl SchedState {
    pub fn new(config: &NucleusConfig) -> Self {
        Self {
            resolver: PolicyResolver::new(config),
            tp_partitions: config.tp_partitions,
            threads: AHashMap::new(),
            tp: (0..config.cpus).map(|_| TpCpuState::default()).collect(),
            quota: (0..config.cpus)
                .map(|cpu| QuotaRegistry::new(cpu, config.quota_period(), config.max_quota_groups))
                .collect(),
            group_cpu: AHashMap::new(),
            next_group: 1,
        }
    }

    pub fn resolver(&self) -> &PolicyResolver {
        &self.resolver
    }

    fn check_cpu(&self, cpu: CpuId) -> CoreResult<()> {
        if cpu >= self.tp.len() {
            return Err(CoreError::invalid(format!(
                "CPU {} outside [0, {})",
                cpu,
                self.tp.len()
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Thread admission
    // =========================================================================

    /// Admit a thread under FIFO at `priority`
    pub fn attach(&mut self, thread: &ThreadContext, priority: Priority) -> CoreResult<ThreadPolicy> {
        self.check_cpu(thread.cpu())?;
        if self.threads.contains_key(&thread.id()) {
            return Err(CoreError::AlreadyExists(format!("thread {}", thread.id())));
        }
        let resolved = self.resolver.resolve(Policy::Fifo, &ParamEx::priority(priority), None)?;

        let mut sched = ThreadSched {
            thread: thread.clone(),
            policy: ThreadPolicy {
                policy: resolved.policy,
                class: resolved.class,
                param: resolved.param,
                time_slice: None,
                weighted_priority: resolved.weighted_priority(),
            },
        };
        sched.apply(resolved);
        let policy = sched.policy;
        self.threads.insert(thread.id(), sched);

        debug!(
            "Thread {} admitted on CPU {} ({} prio {})",
            thread.name(),
            thread.cpu(),
            policy.policy.as_str(),
            priority
        );
        Ok(policy)
    }

    /// Move a thread to another policy
    ///
    /// Everything is validated before the first mutation; on error the
    /// thread keeps its previous record and group membership.
    pub fn set_policy(&mut self, thread: &ThreadContext, policy: Policy, param: &ParamEx) -> CoreResult<ThreadPolicy> {
        let current = self
            .threads
            .get(&thread.id())
            .map(|s| s.policy)
            .ok_or_else(|| CoreError::no_entity(format!("thread {} not admitted", thread.id())))?;

        let resolved = self.resolver.resolve(policy, param, current.time_slice)?;
        resolved.class.check_param(&resolved.param)?;

        if let Some(group) = resolved.param.quota_group() {
            self.quota[thread.cpu()].find(group, thread.pid())?;
        }

        if let Some(old) = current.param.quota_group() {
            self.quota[thread.cpu()].leave(old, thread.id());
        }
        if let Some(group) = resolved.param.quota_group() {
            self.quota[thread.cpu()].join(group, thread.id());
        }

        let sched = self
            .threads
            .get_mut(&thread.id())
            .ok_or_else(|| CoreError::no_entity(format!("thread {} not admitted", thread.id())))?;
        sched.apply(resolved);

        info!(
            "Thread {} policy {} -> {} (class {}, wprio {})",
            thread.name(),
            current.policy.as_str(),
            sched.policy.policy.as_str(),
            sched.policy.class.name(),
            sched.policy.weighted_priority
        );
        Ok(sched.policy)
    }

    pub fn policy_of(&self, thread: &ThreadContext) -> CoreResult<ThreadPolicy> {
        self.threads
            .get(&thread.id())
            .map(|s| s.policy)
            .ok_or_else(|| CoreError::no_entity(format!("thread {} not admitted", thread.id())))
    }

    pub fn detach(&mut self, thread: &ThreadContext) -> CoreResult<ThreadPolicy> {
        let sched = self
            .threads
            .remove(&thread.id())
            .ok_or_else(|| CoreError::no_entity(format!("thread {} not admitted", thread.id())))?;
        if let Some(group) = sched.policy.param.quota_group() {
            self.quota[thread.cpu()].leave(group, thread.id());
        }
        debug!("Thread {} detached", thread.name());
        Ok(sched.policy)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    // =========================================================================
    // Temporal partitioning
    // =========================================================================

    /// Install a schedule (or clear it with an empty list)
    ///
    /// Returns the superseded table; the caller drops it after unlocking.
    pub fn set_tp_schedule(&mut self, cpu: CpuId, windows: &[TpWindowSpec]) -> CoreResult<Option<Arc<TpSchedule>>> {
        self.check_cpu(cpu)?;
        let schedule = if windows.is_empty() {
            None
        } else {
            Some(TpSchedule::build(windows, self.tp_partitions)?)
        };
        match &schedule {
            Some(s) => info!(
                "TP schedule installed on CPU {} ({} windows, cycle {:?})",
                cpu,
                s.len(),
                s.cycle()
            ),
            None => info!("TP schedule cleared on CPU {}", cpu),
        }
        Ok(self.tp[cpu].install(schedule, Instant::now()))
    }

    pub fn tp_schedule(&self, cpu: CpuId) -> CoreResult<Option<Arc<TpSchedule>>> {
        self.check_cpu(cpu)?;
        Ok(self.tp[cpu].schedule())
    }

    pub fn tp_active_window(&mut self, cpu: CpuId, now: Instant) -> CoreResult<Option<TpActiveWindow>> {
        self.check_cpu(cpu)?;
        Ok(self.tp[cpu].active_window(now))
    }

    // =========================================================================
    // Quota groups
    // =========================================================================

    pub fn quota_add(&mut self, pid: Pid, cpu: CpuId, shared: bool, quota: i32, quota_peak: i32) -> CoreResult<QuotaInfo> {
        self.check_cpu(cpu)?;
        let id = self.next_group;
        let info = self.quota[cpu].add(id, QuotaScope::new(pid, shared), quota, quota_peak)?;
        self.next_group += 1;
        self.group_cpu.insert(id, cpu);
        Ok(info)
    }

    pub fn quota_add_default(&mut self, pid: Pid, cpu: CpuId, shared: bool) -> CoreResult<QuotaInfo> {
        self.quota_add(pid, cpu, shared, QUOTA_FULL_PERCENT, QUOTA_FULL_PERCENT)
    }

    fn quota_cpu(&self, id: GroupId) -> CoreResult<CpuId> {
        self.group_cpu
            .get(&id)
            .copied()
            .ok_or_else(|| CoreError::no_entity(format!("quota group {}", id)))
    }

    pub fn quota_set_limit(&mut self, pid: Pid, id: GroupId, quota: i32, quota_peak: i32) -> CoreResult<QuotaInfo> {
        let cpu = self.quota_cpu(id)?;
        self.quota[cpu].set_limit(id, pid, quota, quota_peak)
    }

    pub fn quota_info(&self, pid: Pid, id: GroupId) -> CoreResult<QuotaInfo> {
        let cpu = self.quota_cpu(id)?;
        self.quota[cpu].info(id, pid)
    }

    /// Remove a group; forced removal moves its members back to RT
    pub fn quota_remove(&mut self, pid: Pid, id: GroupId, force: bool) -> CoreResult<QuotaInfo> {
        let cpu = self.quota_cpu(id)?;
        let (info, drained) = self.quota[cpu].remove(id, pid, force)?;
        self.group_cpu.remove(&id);

        for tid in drained {
            let Some(sched) = self.threads.get_mut(&tid) else {
                continue;
            };
            let priority = sched.policy.param.priority();
            match self.resolver.resolve(Policy::Core, &ParamEx::priority(priority), None) {
                Ok(resolved) => sched.apply(resolved),
                Err(e) => warn!("Thread {} left quota group {} unscheduled: {}", tid, id, e),
            }
        }
        Ok(info)
    }

    /// Force-remove the private groups of an exiting process
    pub fn quota_cleanup(&mut self, pid: Pid) -> usize {
        let owned: Vec<GroupId> = self
            .quota
            .iter()
            .flat_map(|reg| reg.private_groups_of(pid))
            .collect();
        let mut removed = 0;
        for id in owned {
            match self.quota_remove(pid, id, true) {
                Ok(_) => removed += 1,
                Err(e) => warn!("Failed to clean up quota group {} of PID {}: {}", id, pid, e),
            }
        }
        if removed > 0 {
            info!("Removed {} quota groups owned by PID {}", removed, pid);
        }
        removed
    }

    pub fn quota_sum(&self, cpu: CpuId) -> CoreResult<i32> {
        self.check_cpu(cpu)?;
        Ok(self.quota[cpu].sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadAttr;

    fn state() -> SchedState {
        SchedState::new(&NucleusConfig::default())
    }

    #[test]
    fn test_attach_sets_rt_weight() {
        let mut state = state();
        let thread = ThreadContext::new(ThreadAttr::new(20));
        let policy = state.attach(&thread, 20).unwrap();
        assert_eq!(policy.class, SchedClass::Rt);
        assert_eq!(thread.weighted_priority(), 4 * 1024 + 20);
        assert!(matches!(state.attach(&thread, 20), Err(CoreError::AlreadyExists(_))));
    }

    #[test]
    fn test_rejected_policy_leaves_record() {
        let mut state = state();
        let thread = ThreadContext::new(ThreadAttr::new(20));
        let before = state.attach(&thread, 20).unwrap();

        assert!(state.set_policy(&thread, Policy::Fifo, &ParamEx::priority(999)).is_err());
        assert!(state
            .set_policy(&thread, Policy::Quota, &ParamEx::priority(5).with_quota_group(42))
            .is_err());
        assert_eq!(state.policy_of(&thread).unwrap(), before);
        assert_eq!(thread.weighted_priority(), before.weighted_priority);
    }

    #[test]
    fn test_quota_membership_follows_policy() {
        let mut state = state();
        let thread = ThreadContext::new(ThreadAttr::new(20).in_process(5));
        state.attach(&thread, 20).unwrap();
        let group = state.quota_add_default(5, 0, false).unwrap().group;

        state
            .set_policy(&thread, Policy::Quota, &ParamEx::priority(8).with_quota_group(group))
            .unwrap();
        assert_eq!(state.quota_info(5, group).unwrap().members, 1);
        assert!(state.quota_remove(5, group, false).is_err());

        state.set_policy(&thread, Policy::Fifo, &ParamEx::priority(8)).unwrap();
        assert_eq!(state.quota_info(5, group).unwrap().members, 0);
        assert!(state.quota_remove(5, group, false).is_ok());
    }

    #[test]
    fn test_forced_removal_drains_to_rt() {
        let mut state = state();
        let thread = ThreadContext::new(ThreadAttr::new(20).in_process(5));
        state.attach(&thread, 20).unwrap();
        let group = state.quota_add_default(5, 0, true).unwrap().group;
        state
            .set_policy(&thread, Policy::Quota, &ParamEx::priority(8).with_quota_group(group))
            .unwrap();
        assert_eq!(thread.weighted_priority(), 3 * 1024 + 8);

        state.quota_remove(5, group, true).unwrap();
        let policy = state.policy_of(&thread).unwrap();
        assert_eq!(policy.class, SchedClass::Rt);
        assert_eq!(policy.param, SchedParam::Core { priority: 8 });
        assert_eq!(thread.weighted_priority(), 4 * 1024 + 8);
    }

    #[test]
    fn test_cleanup_removes_private_groups_only() {
        let mut state = state();
        state.quota_add_default(7, 0, false).unwrap();
        state.quota_add_default(7, 1, false).unwrap();
        let shared = state.quota_add_default(7, 1, true).unwrap().group;
        state.quota_add_default(8, 0, false).unwrap();

        assert_eq!(state.quota_cleanup(7), 2);
        assert!(state.quota_info(7, shared).is_ok());
        assert_eq!(state.quota_sum(0).unwrap(), 100);
    }
}
