/*!
 * Policy Resolution
 * Map a requested policy and extended parameters onto a class and its parameters
 */

use super::class::{priority_range, SchedClass};
use super::types::{ParamEx, Policy, SchedParam, SporadicParam};
use crate::core::config::NucleusConfig;
use crate::core::errors::{CoreError, CoreResult};
use crate::core::types::{Priority, WeightedPriority};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of a successful resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolved {
    /// Policy actually applied (differs from the request for negative FIFO/RR priorities)
    pub policy: Policy,
    pub class: SchedClass,
    pub param: SchedParam,
    /// Round-robin slice to remember for the thread
    pub slice: Option<Duration>,
}

impl Resolved {
    pub fn weighted_priority(&self) -> WeightedPriority {
        self.class.weighted(self.param.priority())
    }
}

/// Validates policy requests
///
/// Resolution is pure: it never touches thread or registry state, so a
/// rejected request leaves everything unchanged.
#[derive(Debug, Clone, Copy)]
pub struct PolicyResolver {
    tp_partitions: usize,
}

impl PolicyResolver {
    pub fn new(config: &NucleusConfig) -> Self {
        Self {
            tp_partitions: config.tp_partitions,
        }
    }

    pub fn resolve(
        &self,
        policy: Policy,
        param: &ParamEx,
        current_slice: Option<Duration>,
    ) -> CoreResult<Resolved> {
        let mut policy = policy;
        let mut prio = param.priority;

        // FIFO/RR with a negative priority means weak at |prio|
        if prio < 0 && matches!(policy, Policy::Fifo | Policy::RoundRobin) {
            prio = prio.checked_neg().ok_or_else(|| out_of_range(policy, prio))?;
            policy = Policy::Weak;
        }

        check_range(policy, prio)?;

        let (class, sched_param, slice) = match policy {
            Policy::Normal | Policy::Weak => (SchedClass::Weak, SchedParam::Weak { priority: prio }, None),
            Policy::Fifo | Policy::Core => (SchedClass::Rt, SchedParam::Core { priority: prio }, None),
            Policy::RoundRobin => {
                let slice = param
                    .rr_quantum
                    .or(current_slice)
                    .filter(|s| !s.is_zero())
                    .ok_or_else(|| CoreError::invalid("Round-robin requires a finite, non-zero time slice"))?;
                (
                    SchedClass::Rt,
                    SchedParam::RoundRobin {
                        priority: prio,
                        slice,
                    },
                    Some(slice),
                )
            }
            Policy::Sporadic => (
                SchedClass::Sporadic,
                SchedParam::Sporadic(SporadicParam {
                    normal_priority: prio,
                    low_priority: param.ss_low_priority,
                    init_budget: param.ss_init_budget,
                    repl_period: param.ss_repl_period,
                    max_repl: param.ss_max_repl,
                }),
                None,
            ),
            Policy::Tp => {
                let partition = param.tp_partition;
                if partition < 0 || partition as usize >= self.tp_partitions {
                    return Err(CoreError::invalid(format!(
                        "TP partition {} outside [0, {})",
                        partition, self.tp_partitions
                    )));
                }
                (
                    SchedClass::Tp,
                    SchedParam::TemporalPartition {
                        priority: prio,
                        partition,
                    },
                    None,
                )
            }
            Policy::Quota => (
                SchedClass::Quota,
                SchedParam::QuotaGroup {
                    priority: prio,
                    group: param.quota_group,
                },
                None,
            ),
        };

        Ok(Resolved {
            policy,
            class,
            param: sched_param,
            slice,
        })
    }

    /// Lowest priority accepted by `policy`
    pub fn min_priority(&self, policy: Policy) -> Priority {
        priority_range(policy).0
    }

    /// Highest priority accepted by `policy`
    pub fn max_priority(&self, policy: Policy) -> Priority {
        priority_range(policy).1
    }

    /// |priority| plus the weight of the class the request resolves to
    pub fn weighted_priority(&self, policy: Policy, param: &ParamEx) -> CoreResult<WeightedPriority> {
        let resolved = self.resolve(policy, param, None).or_else(|err| {
            // The slice does not affect the weight; evaluate RR as FIFO when none is known
            if policy == Policy::RoundRobin && param.rr_quantum.is_none() {
                self.resolve(Policy::Fifo, param, None)
            } else {
                Err(err)
            }
        })?;
        Ok(param.priority.abs() + resolved.class.weight())
    }
}

fn check_range(policy: Policy, prio: Priority) -> CoreResult<()> {
    let (min, max) = priority_range(policy);
    if prio < min || prio > max {
        return Err(out_of_range(policy, prio));
    }
    Ok(())
}

#[cold]
#[inline(never)]
fn out_of_range(policy: Policy, prio: Priority) -> CoreError {
    let (min, max) = priority_range(policy);
    CoreError::invalid(format!(
        "Priority {} outside [{}, {}] for policy {}",
        prio,
        min,
        max,
        policy.as_str()
    ))
}
