/*!
 * Nucleus Configuration
 *
 * Runtime configuration: CPU count, TP partitions, quota accounting.
 * Loaded from defaults, JSON, or environment variables.
 */

use super::errors::{CoreError, CoreResult};
use super::limits::{
    DEFAULT_MAX_QUOTA_GROUPS, DEFAULT_NR_CPUS, DEFAULT_QUOTA_PERIOD, DEFAULT_TP_PARTITIONS,
    MAX_NR_CPUS,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Nucleus configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NucleusConfig {
    /// Number of CPUs with their own scheduler state
    pub cpus: usize,
    /// Number of temporal partitions per CPU
    pub tp_partitions: usize,
    /// Quota accounting period in microseconds
    pub quota_period_us: u64,
    /// Maximum quota groups per CPU
    pub max_quota_groups: usize,
}

impl Default for NucleusConfig {
    fn default() -> Self {
        Self {
            cpus: DEFAULT_NR_CPUS,
            tp_partitions: DEFAULT_TP_PARTITIONS,
            quota_period_us: DEFAULT_QUOTA_PERIOD.as_micros() as u64,
            max_quota_groups: DEFAULT_MAX_QUOTA_GROUPS,
        }
    }
}

impl NucleusConfig {
    /// Single-CPU configuration, handy for deterministic setups
    pub fn single_cpu() -> Self {
        Self {
            cpus: 1,
            ..Self::default()
        }
    }

    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CoreError::invalid(format!("Malformed nucleus config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Build from environment variables, falling back to defaults
    ///
    /// - RT_NUCLEUS_CPUS
    /// - RT_NUCLEUS_TP_PARTITIONS
    /// - RT_NUCLEUS_QUOTA_PERIOD_US
    /// - RT_NUCLEUS_MAX_QUOTA_GROUPS
    pub fn from_env() -> CoreResult<Self> {
        let defaults = Self::default();
        let config = Self {
            cpus: env_or("RT_NUCLEUS_CPUS", defaults.cpus)?,
            tp_partitions: env_or("RT_NUCLEUS_TP_PARTITIONS", defaults.tp_partitions)?,
            quota_period_us: env_or("RT_NUCLEUS_QUOTA_PERIOD_US", defaults.quota_period_us)?,
            max_quota_groups: env_or("RT_NUCLEUS_MAX_QUOTA_GROUPS", defaults.max_quota_groups)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.cpus == 0 || self.cpus > MAX_NR_CPUS {
            return Err(CoreError::invalid(format!(
                "cpus must be within 1..={} (got {})",
                MAX_NR_CPUS, self.cpus
            )));
        }
        if self.quota_period_us == 0 {
            return Err(CoreError::invalid("quota period must be non-zero"));
        }
        Ok(())
    }

    pub fn quota_period(&self) -> Duration {
        Duration::from_micros(self.quota_period_us)
    }
}

fn env_or<T>(key: &str, default: T) -> CoreResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| CoreError::invalid(format!("{}={:?}: {}", key, raw, e))),
        Err(_) => Ok(default),
    }
}
