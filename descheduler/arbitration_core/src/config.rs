//! Migration controller configuration.
//!
//! These knobs are populated by the descheduler's configuration loader;
//! this module only defines their shape, defaults, and the shared
//! absolute-or-percentage resolution used by the per-workload caps.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use migration_shared_types::LabelSelector;

/// Default per-workload migration budget when none is configured.
const DEFAULT_MAX_MIGRATING_PERCENT: u32 = 10;

/// Default sleep between arbitration cycles.
const DEFAULT_ARBITRATION_INTERVAL: Duration = Duration::from_millis(500);

/// An absolute count or a percentage of the workload's expected replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntOrPercent {
    Count(u32),
    Percent(u32),
}

impl IntOrPercent {
    /// Resolve against the expected replica count: percentages round up,
    /// and the result is clamped to `[1, expected_replicas]`.
    pub fn resolve(&self, expected_replicas: u32) -> u32 {
        if expected_replicas == 0 {
            return 0;
        }
        let raw = match self {
            IntOrPercent::Count(n) => u64::from(*n),
            IntOrPercent::Percent(p) => {
                (u64::from(expected_replicas) * u64::from(*p)).div_ceil(100)
            }
        };
        raw.clamp(1, u64::from(expected_replicas)) as u32
    }
}

/// Resolve an optional cap; `None` means the full replica count (no cap).
pub fn resolve_or_unlimited(value: Option<&IntOrPercent>, expected_replicas: u32) -> u32 {
    match value {
        Some(v) => v.resolve(expected_replicas),
        None => expected_replicas,
    }
}

/// Migration job execution mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum JobMode {
    #[default]
    EvictDirectly,
    /// Migration reserves capacity before evicting; requires the pod to use
    /// one of the whitelisted schedulers.
    ReservationFirst,
}

/// Scope of an object limiter entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitObject {
    Workload,
}

/// Token-bucket parameters for one limit scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectLimiterArgs {
    /// Rate window; zero disables the limiter.
    pub duration: Duration,
    /// Migration budget within the window; falls back to
    /// `max_migrating_per_workload` when unset.
    pub max_migrating: Option<IntOrPercent>,
}

/// Namespace allow/deny lists applied before the evictability checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSelector {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// Pass-through configuration for the baseline evictability checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultEvictorConfig {
    /// Require the pod to still fit somewhere before eviction.
    pub node_fit: bool,
    pub node_selector: Option<LabelSelector>,
    pub label_selector: Option<LabelSelector>,
    /// Pods at or above this priority are protected.
    pub priority_threshold: Option<i32>,
    pub evict_local_storage_pods: bool,
    pub evict_system_critical_pods: bool,
    pub ignore_pvc_pods: bool,
    pub evict_failed_bare_pods: bool,
}

/// Top-level configuration of the arbitration subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationControllerConfig {
    /// Cap on concurrent migrations per node; `None` or zero means
    /// unlimited.
    pub max_migrating_per_node: Option<u32>,
    /// Analogous cap per namespace.
    pub max_migrating_per_namespace: Option<u32>,
    /// Cap per owning workload, absolute or percentage.
    pub max_migrating_per_workload: Option<IntOrPercent>,
    /// Unavailability budget per workload, including in-flight migrations.
    pub max_unavailable_per_workload: Option<IntOrPercent>,
    /// Disable the guard that refuses migration when the replica count
    /// equals 1, the migration cap, or the unavailability budget.
    pub skip_check_expected_replicas: bool,
    pub default_job_mode: JobMode,
    /// Scheduler whitelist consulted in `ReservationFirst` mode.
    pub scheduler_names: Vec<String>,
    pub object_limiters: HashMap<LimitObject, ObjectLimiterArgs>,
    pub namespaces: Option<NamespaceSelector>,
    pub evictor: DefaultEvictorConfig,
    pub arbitration_interval: Duration,
}

impl Default for MigrationControllerConfig {
    fn default() -> Self {
        Self {
            max_migrating_per_node: Some(2),
            max_migrating_per_namespace: None,
            max_migrating_per_workload: Some(IntOrPercent::Percent(
                DEFAULT_MAX_MIGRATING_PERCENT,
            )),
            max_unavailable_per_workload: Some(IntOrPercent::Percent(
                DEFAULT_MAX_MIGRATING_PERCENT,
            )),
            skip_check_expected_replicas: false,
            default_job_mode: JobMode::default(),
            scheduler_names: Vec::new(),
            object_limiters: HashMap::new(),
            namespaces: None,
            evictor: DefaultEvictorConfig::default(),
            arbitration_interval: DEFAULT_ARBITRATION_INTERVAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_count() {
        assert_eq!(IntOrPercent::Count(3).resolve(10), 3);
        // Clamped to the replica count.
        assert_eq!(IntOrPercent::Count(20).resolve(10), 10);
        // Never below one replica.
        assert_eq!(IntOrPercent::Count(0).resolve(10), 1);
        assert_eq!(IntOrPercent::Count(3).resolve(0), 0);
    }

    #[test]
    fn test_resolve_percent_rounds_up() {
        assert_eq!(IntOrPercent::Percent(10).resolve(10), 1);
        assert_eq!(IntOrPercent::Percent(25).resolve(10), 3);
        assert_eq!(IntOrPercent::Percent(1).resolve(3), 1);
        assert_eq!(IntOrPercent::Percent(100).resolve(7), 7);
        assert_eq!(IntOrPercent::Percent(200).resolve(7), 7);
    }

    #[test]
    fn test_resolve_or_unlimited() {
        assert_eq!(resolve_or_unlimited(None, 8), 8);
        assert_eq!(
            resolve_or_unlimited(Some(&IntOrPercent::Percent(50)), 8),
            4
        );
    }

    #[test]
    fn test_default_config() {
        let config = MigrationControllerConfig::default();
        assert_eq!(config.default_job_mode, JobMode::EvictDirectly);
        assert!(!config.skip_check_expected_replicas);
        assert_eq!(
            config.max_migrating_per_workload,
            Some(IntOrPercent::Percent(10))
        );
        assert!(config.object_limiters.is_empty());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let mut config = MigrationControllerConfig::default();
        config.object_limiters.insert(
            LimitObject::Workload,
            ObjectLimiterArgs {
                duration: Duration::from_secs(300),
                max_migrating: Some(IntOrPercent::Count(2)),
            },
        );
        let encoded = serde_json::to_string(&config).unwrap();
        let decoded: MigrationControllerConfig = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, config);
    }
}
