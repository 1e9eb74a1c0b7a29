/*!
 * Scheduler Types
 * Policies, extended parameters and the per-class parameter union
 */

use crate::core::types::{GroupId, PartitionId, Priority};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

/// Scheduling policy requested by a thread
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    /// Non real-time; only priority 0, handled by the weak class
    Normal,
    /// Weak real-time
    Weak,
    /// Strict priority, FIFO among equals
    Fifo,
    /// Strict priority with time slicing among equals
    RoundRobin,
    /// FIFO over the extended core priority range
    Core,
    /// Budget server with periodic replenishment
    Sporadic,
    /// Temporal partitioning
    Tp,
    /// CPU bandwidth groups
    Quota,
}

impl Policy {
    pub const ALL: [Policy; 8] = [
        Self::Normal,
        Self::Weak,
        Self::Fifo,
        Self::RoundRobin,
        Self::Core,
        Self::Sporadic,
        Self::Tp,
        Self::Quota,
    ];

    /// Parse from string representation
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "normal" | "other" => Ok(Self::Normal),
            "weak" => Ok(Self::Weak),
            "fifo" => Ok(Self::Fifo),
            "round_robin" | "roundrobin" | "rr" => Ok(Self::RoundRobin),
            "core" | "cobalt" => Ok(Self::Core),
            "sporadic" | "ss" => Ok(Self::Sporadic),
            "tp" => Ok(Self::Tp),
            "quota" => Ok(Self::Quota),
            _ => Err(format!(
                "Policy '{}' not supported. Valid: normal, weak, fifo, round_robin, core, sporadic, tp, quota",
                s
            )),
        }
    }

    /// Convert to string representation
    #[inline(always)]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Weak => "weak",
            Self::Fifo => "fifo",
            Self::RoundRobin => "round_robin",
            Self::Core => "core",
            Self::Sporadic => "sporadic",
            Self::Tp => "tp",
            Self::Quota => "quota",
        }
    }
}

impl Serialize for Policy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Policy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Extended scheduling parameters, as supplied by callers
///
/// Only the fields relevant to the requested policy are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamEx {
    pub priority: Priority,
    /// Round-robin quantum; `None` keeps the caller's current slice
    pub rr_quantum: Option<Duration>,
    pub ss_low_priority: Priority,
    pub ss_init_budget: Duration,
    pub ss_repl_period: Duration,
    pub ss_max_repl: u32,
    pub tp_partition: PartitionId,
    pub quota_group: GroupId,
}

impl ParamEx {
    pub fn priority(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    pub fn with_rr_quantum(mut self, quantum: Duration) -> Self {
        self.rr_quantum = Some(quantum);
        self
    }

    pub fn with_partition(mut self, partition: PartitionId) -> Self {
        self.tp_partition = partition;
        self
    }

    pub fn with_quota_group(mut self, group: GroupId) -> Self {
        self.quota_group = group;
        self
    }

    pub fn with_sporadic(
        mut self,
        low_priority: Priority,
        init_budget: Duration,
        repl_period: Duration,
        max_repl: u32,
    ) -> Self {
        self.ss_low_priority = low_priority;
        self.ss_init_budget = init_budget;
        self.ss_repl_period = repl_period;
        self.ss_max_repl = max_repl;
        self
    }
}

/// Sporadic server parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SporadicParam {
    pub normal_priority: Priority,
    pub low_priority: Priority,
    pub init_budget: Duration,
    pub repl_period: Duration,
    pub max_repl: u32,
}

/// Validated class-specific parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "class")]
pub enum SchedParam {
    Core { priority: Priority },
    RoundRobin { priority: Priority, slice: Duration },
    Sporadic(SporadicParam),
    TemporalPartition { priority: Priority, partition: PartitionId },
    QuotaGroup { priority: Priority, group: GroupId },
    Weak { priority: Priority },
}

impl SchedParam {
    /// Class-local priority the thread runs at
    pub fn priority(&self) -> Priority {
        match self {
            Self::Core { priority }
            | Self::RoundRobin { priority, .. }
            | Self::TemporalPartition { priority, .. }
            | Self::QuotaGroup { priority, .. }
            | Self::Weak { priority } => *priority,
            Self::Sporadic(ss) => ss.normal_priority,
        }
    }

    pub fn quota_group(&self) -> Option<GroupId> {
        match self {
            Self::QuotaGroup { group, .. } => Some(*group),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_parsing() {
        assert_eq!(Policy::from_str("rr").unwrap(), Policy::RoundRobin);
        assert_eq!(Policy::from_str("FIFO").unwrap(), Policy::Fifo);
        assert!(Policy::from_str("deadline").is_err());
        for policy in Policy::ALL {
            assert_eq!(Policy::from_str(policy.as_str()).unwrap(), policy);
        }
    }

    #[test]
    fn test_param_priority() {
        let param = SchedParam::RoundRobin {
            priority: 12,
            slice: Duration::from_millis(5),
        };
        assert_eq!(param.priority(), 12);
        assert_eq!(param.quota_group(), None);
        assert_eq!(
            SchedParam::QuotaGroup { priority: 3, group: 9 }.quota_group(),
            Some(9)
        );
    }
}
