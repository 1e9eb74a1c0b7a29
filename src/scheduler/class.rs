/*!
 * Scheduling Classes
 * Priority windows, weights and class-level parameter checks
 */

use super::types::{Policy, SchedParam};
use crate::core::errors::{CoreError, CoreResult};
use crate::core::limits::*;
use crate::core::types::{Priority, WeightedPriority};
use serde::{Deserialize, Serialize};

/// Scheduling class a thread is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedClass {
    Weak,
    Tp,
    Sporadic,
    Quota,
    /// Core, FIFO and round-robin threads
    Rt,
}

impl SchedClass {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Weak => "weak",
            Self::Tp => "tp",
            Self::Sporadic => "pss",
            Self::Quota => "quota",
            Self::Rt => "rt",
        }
    }

    const fn level(&self) -> i32 {
        match self {
            Self::Weak => WEAK_CLASS_LEVEL,
            Self::Tp => TP_CLASS_LEVEL,
            Self::Sporadic => SPORADIC_CLASS_LEVEL,
            Self::Quota => QUOTA_CLASS_LEVEL,
            Self::Rt => RT_CLASS_LEVEL,
        }
    }

    /// Base added to class-local priorities
    #[inline(always)]
    pub const fn weight(&self) -> WeightedPriority {
        self.level() * CLASS_WEIGHT_FACTOR
    }

    /// Weighted priority of a class-local priority
    #[inline]
    pub fn weighted(&self, priority: Priority) -> WeightedPriority {
        self.weight() + priority
    }

    /// Class-level admission check, run after resolution
    pub fn check_param(&self, param: &SchedParam) -> CoreResult<()> {
        match (self, param) {
            (Self::Sporadic, SchedParam::Sporadic(ss)) => {
                if ss.low_priority < FIFO_MIN_PRIO || ss.low_priority > ss.normal_priority {
                    return Err(CoreError::invalid(format!(
                        "Sporadic low priority {} must be within [{}, {}]",
                        ss.low_priority, FIFO_MIN_PRIO, ss.normal_priority
                    )));
                }
                if ss.init_budget.is_zero() {
                    return Err(CoreError::invalid("Sporadic initial budget must be non-zero"));
                }
                if ss.repl_period < ss.init_budget {
                    return Err(CoreError::invalid(format!(
                        "Replenishment period {:?} shorter than budget {:?}",
                        ss.repl_period, ss.init_budget
                    )));
                }
                if ss.max_repl == 0 || ss.max_repl > SPORADIC_MAX_REPL {
                    return Err(CoreError::invalid(format!(
                        "Sporadic max replenishments {} must be within [1, {}]",
                        ss.max_repl, SPORADIC_MAX_REPL
                    )));
                }
                Ok(())
            }
            (Self::Sporadic, _) => Err(CoreError::invalid("Sporadic class needs sporadic parameters")),
            _ => Ok(()),
        }
    }
}

/// Priority window of a policy, inclusive
pub const fn priority_range(policy: Policy) -> (Priority, Priority) {
    match policy {
        Policy::Fifo | Policy::RoundRobin | Policy::Sporadic | Policy::Tp | Policy::Quota => {
            (FIFO_MIN_PRIO, FIFO_MAX_PRIO)
        }
        Policy::Core => (CORE_MIN_PRIO, CORE_MAX_PRIO),
        Policy::Weak => (WEAK_MIN_PRIO, WEAK_MAX_PRIO),
        Policy::Normal => (0, 0),
    }
}
