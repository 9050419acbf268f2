//! Mock controller finder for testing.
//!
//! Workloads are registered up front; lookups resolve through the pod's
//! controller owner reference.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use migration_shared_types::{LabelSelector, OwnerReference, Pod, Result, Uid};

use crate::{ControllerFinder, FinderError};

#[derive(Debug, Clone)]
struct WorkloadEntry {
    pods: Vec<Pod>,
    expected_replicas: u32,
}

#[derive(Debug, Default)]
pub struct MockControllerFinder {
    workloads: RwLock<HashMap<Uid, WorkloadEntry>>,
    /// When set, every lookup fails; used to exercise fail-closed paths.
    fail_lookups: RwLock<bool>,
}

impl MockControllerFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workload's pods and expected replica count (for testing).
    pub async fn register_workload(&self, owner_uid: Uid, pods: Vec<Pod>, expected_replicas: u32) {
        self.workloads.write().await.insert(
            owner_uid,
            WorkloadEntry {
                pods,
                expected_replicas,
            },
        );
    }

    /// Make all subsequent lookups fail (for testing).
    pub async fn set_fail_lookups(&self, fail: bool) {
        *self.fail_lookups.write().await = fail;
    }

    async fn check_lookups(&self) -> Result<()> {
        if *self.fail_lookups.read().await {
            return Err(FinderError::InternalError("injected lookup failure".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl ControllerFinder for MockControllerFinder {
    async fn get_pods_for_ref(
        &self,
        owner: &OwnerReference,
        namespace: &str,
        label_selector: Option<&LabelSelector>,
        _include_sub_owners: bool,
    ) -> Result<(Vec<Pod>, u32)> {
        self.check_lookups().await?;
        let workloads = self.workloads.read().await;
        let entry = workloads
            .get(&owner.uid)
            .ok_or_else(|| FinderError::WorkloadNotFound(owner.name.clone()))?;

        let pods: Vec<Pod> = entry
            .pods
            .iter()
            .filter(|pod| pod.namespace == namespace)
            .filter(|pod| {
                label_selector
                    .map(|s| s.matches(&pod.labels))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        Ok((pods, entry.expected_replicas))
    }

    async fn get_expected_scale_for_pod(&self, pod: &Pod) -> Result<u32> {
        self.check_lookups().await?;
        let owner = pod
            .controller_of()
            .ok_or_else(|| FinderError::WorkloadNotFound(pod.name.clone()))?;
        let workloads = self.workloads.read().await;
        let entry = workloads
            .get(&owner.uid)
            .ok_or_else(|| FinderError::ScaleLookupFailed(owner.name.clone()))?;
        Ok(entry.expected_replicas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use migration_shared_types::PodPhase;
    use uuid::Uuid;

    fn make_owner(uid: Uid) -> OwnerReference {
        OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "StatefulSet".to_string(),
            name: "test-workload".to_string(),
            uid,
            controller: true,
        }
    }

    fn make_pod(name: &str, namespace: &str, owner: Option<&OwnerReference>) -> Pod {
        Pod {
            namespace: namespace.to_string(),
            name: name.to_string(),
            uid: Uuid::new_v4(),
            node_name: "test-node".to_string(),
            scheduler_name: "default-scheduler".to_string(),
            priority: None,
            labels: HashMap::new(),
            annotations: HashMap::new(),
            owner_references: owner.map(|o| vec![o.clone()]).unwrap_or_default(),
            volumes: Vec::new(),
            phase: PodPhase::Running,
            ready: true,
            deletion_timestamp: None,
            creation_timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_get_pods_for_ref() {
        let finder = MockControllerFinder::new();
        let owner = make_owner(Uuid::new_v4());
        let pods = vec![
            make_pod("pod-a", "default", Some(&owner)),
            make_pod("pod-b", "default", Some(&owner)),
            make_pod("pod-c", "other", Some(&owner)),
        ];
        finder.register_workload(owner.uid, pods, 3).await;

        let (found, replicas) = finder
            .get_pods_for_ref(&owner, "default", None, false)
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(replicas, 3);
    }

    #[tokio::test]
    async fn test_get_pods_for_ref_label_selector() {
        let finder = MockControllerFinder::new();
        let owner = make_owner(Uuid::new_v4());
        let mut labeled = make_pod("pod-a", "default", Some(&owner));
        labeled
            .labels
            .insert("app".to_string(), "web".to_string());
        let unlabeled = make_pod("pod-b", "default", Some(&owner));
        finder
            .register_workload(owner.uid, vec![labeled, unlabeled], 2)
            .await;

        let mut selector = LabelSelector::default();
        selector
            .match_labels
            .insert("app".to_string(), "web".to_string());
        let (found, _) = finder
            .get_pods_for_ref(&owner, "default", Some(&selector), false)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "pod-a");
    }

    #[tokio::test]
    async fn test_get_expected_scale_for_pod() {
        let finder = MockControllerFinder::new();
        let owner = make_owner(Uuid::new_v4());
        let pod = make_pod("pod-a", "default", Some(&owner));
        finder
            .register_workload(owner.uid, vec![pod.clone()], 5)
            .await;

        assert_eq!(finder.get_expected_scale_for_pod(&pod).await.unwrap(), 5);

        let bare = make_pod("bare", "default", None);
        assert!(finder.get_expected_scale_for_pod(&bare).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_workload() {
        let finder = MockControllerFinder::new();
        let owner = make_owner(Uuid::new_v4());
        assert!(finder
            .get_pods_for_ref(&owner, "default", None, false)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let finder = MockControllerFinder::new();
        let owner = make_owner(Uuid::new_v4());
        finder.register_workload(owner.uid, Vec::new(), 3).await;
        finder.set_fail_lookups(true).await;
        assert!(finder
            .get_pods_for_ref(&owner, "default", None, false)
            .await
            .is_err());
    }
}
