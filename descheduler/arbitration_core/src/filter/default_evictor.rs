//! Baseline evictability checks.
//!
//! These are the standard safety predicates every candidate must clear
//! before any migration-specific policy applies: bare pods, system-critical
//! priority, node-local storage, PVC usage, and label selection.

use tracing::debug;

use crate::config::DefaultEvictorConfig;
use migration_shared_types::{Pod, PodPhase, VolumeSource};

/// Priority at or above which a pod counts as system critical.
pub const SYSTEM_CRITICAL_PRIORITY: i32 = 2_000_000_000;

#[derive(Debug, Clone)]
pub struct DefaultEvictor {
    config: DefaultEvictorConfig,
}

impl DefaultEvictor {
    pub fn new(config: DefaultEvictorConfig) -> Self {
        Self { config }
    }

    /// Whether the pod is evictable at all.
    pub fn filter(&self, pod: &Pod) -> bool {
        if pod.owner_references.is_empty() {
            // Bare pods are only evictable as failed cleanup, and only when
            // explicitly enabled.
            if !(self.config.evict_failed_bare_pods && pod.phase == PodPhase::Failed) {
                debug!(pod = %pod.namespaced_name(), "bare pod is not evictable");
                return false;
            }
        }

        if !self.config.evict_system_critical_pods {
            if let Some(priority) = pod.priority {
                if priority >= SYSTEM_CRITICAL_PRIORITY {
                    debug!(pod = %pod.namespaced_name(), priority, "system critical pod");
                    return false;
                }
                if let Some(threshold) = self.config.priority_threshold {
                    if priority >= threshold {
                        debug!(
                            pod = %pod.namespaced_name(),
                            priority,
                            threshold,
                            "pod priority above eviction threshold"
                        );
                        return false;
                    }
                }
            }
        }

        if !self.config.evict_local_storage_pods && uses_local_storage(pod) {
            debug!(pod = %pod.namespaced_name(), "pod uses node-local storage");
            return false;
        }

        if self.config.ignore_pvc_pods && uses_pvc(pod) {
            debug!(pod = %pod.namespaced_name(), "pod uses a persistent volume claim");
            return false;
        }

        if let Some(selector) = &self.config.label_selector {
            if !selector.matches(&pod.labels) {
                debug!(pod = %pod.namespaced_name(), "pod labels outside eviction selector");
                return false;
            }
        }

        true
    }

    /// Final check right before the eviction is executed. Re-runs the
    /// evictability checks and, when node fit is required, insists the pod
    /// still has a node assignment to migrate away from.
    pub fn pre_eviction_filter(&self, pod: &Pod) -> bool {
        if !self.filter(pod) {
            return false;
        }
        if self.config.node_fit && pod.node_name.is_empty() {
            debug!(pod = %pod.namespaced_name(), "pod has no node assignment");
            return false;
        }
        true
    }
}

fn uses_local_storage(pod: &Pod) -> bool {
    pod.volumes
        .iter()
        .any(|v| matches!(v.source, VolumeSource::EmptyDir))
}

fn uses_pvc(pod: &Pod) -> bool {
    pod.volumes
        .iter()
        .any(|v| matches!(v.source, VolumeSource::PersistentVolumeClaim { .. }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use migration_shared_types::{LabelSelector, OwnerReference, Volume};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn owned_pod() -> Pod {
        Pod {
            namespace: "default".to_string(),
            name: "test-pod".to_string(),
            uid: Uuid::new_v4(),
            node_name: "test-node".to_string(),
            scheduler_name: "default-scheduler".to_string(),
            priority: Some(0),
            labels: HashMap::new(),
            annotations: HashMap::new(),
            owner_references: vec![OwnerReference {
                api_version: "apps/v1".to_string(),
                kind: "ReplicaSet".to_string(),
                name: "test-rs".to_string(),
                uid: Uuid::new_v4(),
                controller: true,
            }],
            volumes: Vec::new(),
            phase: PodPhase::Running,
            ready: true,
            deletion_timestamp: None,
            creation_timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_owned_pod_is_evictable() {
        let evictor = DefaultEvictor::new(DefaultEvictorConfig::default());
        assert!(evictor.filter(&owned_pod()));
    }

    #[test]
    fn test_bare_pod_rejected() {
        let evictor = DefaultEvictor::new(DefaultEvictorConfig::default());
        let mut pod = owned_pod();
        pod.owner_references.clear();
        assert!(!evictor.filter(&pod));
    }

    #[test]
    fn test_failed_bare_pod_evictable_when_enabled() {
        let evictor = DefaultEvictor::new(DefaultEvictorConfig {
            evict_failed_bare_pods: true,
            ..Default::default()
        });
        let mut pod = owned_pod();
        pod.owner_references.clear();
        assert!(!evictor.filter(&pod));
        pod.phase = PodPhase::Failed;
        assert!(evictor.filter(&pod));
    }

    #[test]
    fn test_system_critical_pod() {
        let evictor = DefaultEvictor::new(DefaultEvictorConfig::default());
        let mut pod = owned_pod();
        pod.priority = Some(SYSTEM_CRITICAL_PRIORITY);
        assert!(!evictor.filter(&pod));

        let permissive = DefaultEvictor::new(DefaultEvictorConfig {
            evict_system_critical_pods: true,
            ..Default::default()
        });
        assert!(permissive.filter(&pod));
    }

    #[test]
    fn test_priority_threshold() {
        let evictor = DefaultEvictor::new(DefaultEvictorConfig {
            priority_threshold: Some(1000),
            ..Default::default()
        });
        let mut pod = owned_pod();
        pod.priority = Some(999);
        assert!(evictor.filter(&pod));
        pod.priority = Some(1000);
        assert!(!evictor.filter(&pod));
    }

    #[test]
    fn test_local_storage_pod() {
        let evictor = DefaultEvictor::new(DefaultEvictorConfig::default());
        let mut pod = owned_pod();
        pod.volumes.push(Volume {
            name: "scratch".to_string(),
            source: VolumeSource::EmptyDir,
        });
        assert!(!evictor.filter(&pod));

        let permissive = DefaultEvictor::new(DefaultEvictorConfig {
            evict_local_storage_pods: true,
            ..Default::default()
        });
        assert!(permissive.filter(&pod));
    }

    #[test]
    fn test_pvc_pod_ignored_when_configured() {
        let mut pod = owned_pod();
        pod.volumes.push(Volume {
            name: "data".to_string(),
            source: VolumeSource::PersistentVolumeClaim {
                claim_name: "data-claim".to_string(),
            },
        });

        let evictor = DefaultEvictor::new(DefaultEvictorConfig::default());
        assert!(evictor.filter(&pod));

        let strict = DefaultEvictor::new(DefaultEvictorConfig {
            ignore_pvc_pods: true,
            ..Default::default()
        });
        assert!(!strict.filter(&pod));
    }

    #[test]
    fn test_label_selector() {
        let mut selector = LabelSelector::default();
        selector
            .match_labels
            .insert("migratable".to_string(), "true".to_string());
        let evictor = DefaultEvictor::new(DefaultEvictorConfig {
            label_selector: Some(selector),
            ..Default::default()
        });

        let mut pod = owned_pod();
        assert!(!evictor.filter(&pod));
        pod.labels
            .insert("migratable".to_string(), "true".to_string());
        assert!(evictor.filter(&pod));
    }

    #[test]
    fn test_pre_eviction_requires_node_when_node_fit() {
        let evictor = DefaultEvictor::new(DefaultEvictorConfig {
            node_fit: true,
            ..Default::default()
        });
        let mut pod = owned_pod();
        assert!(evictor.pre_eviction_filter(&pod));
        pod.node_name.clear();
        assert!(!evictor.pre_eviction_filter(&pod));
    }
}
