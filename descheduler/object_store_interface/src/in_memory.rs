//! In-memory object store for testing and development.
//!
//! Serves the field-indexed list queries by filtering over the full maps,
//! which keeps the selector semantics identical to an indexed backend
//! without the bookkeeping.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use migration_shared_types::{MigrationJob, NamespacedName, Pod, Result};

use crate::{JobFieldSelector, ObjectStore, StoreError};

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    pods: RwLock<HashMap<NamespacedName, Pod>>,
    jobs: RwLock<HashMap<NamespacedName, MigrationJob>>,
    /// When set, every read fails; used to exercise fail-closed paths.
    fail_reads: RwLock<bool>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_pod(&self, pod: Pod) {
        self.pods.write().await.insert(pod.namespaced_name(), pod);
    }

    pub async fn remove_pod(&self, key: &NamespacedName) {
        self.pods.write().await.remove(key);
    }

    pub async fn put_job(&self, job: MigrationJob) {
        self.jobs.write().await.insert(job.namespaced_name(), job);
    }

    pub async fn remove_job(&self, key: &NamespacedName) {
        self.jobs.write().await.remove(key);
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }

    /// Make all subsequent reads fail (for testing).
    pub async fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.write().await = fail;
    }

    async fn check_reads(&self) -> Result<()> {
        if *self.fail_reads.read().await {
            return Err(StoreError::ListFailed("injected read failure".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn list_jobs(&self, selector: &JobFieldSelector) -> Result<Vec<MigrationJob>> {
        self.check_reads().await?;
        let jobs = self.jobs.read().await;
        let mut matched: Vec<MigrationJob> = jobs
            .values()
            .filter(|job| selector.matches(job))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.namespaced_name().cmp(&b.namespaced_name()));
        Ok(matched)
    }

    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>> {
        self.check_reads().await?;
        let pods = self.pods.read().await;
        let mut matched: Vec<Pod> = pods
            .values()
            .filter(|pod| pod.node_name == node_name)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.namespaced_name().cmp(&b.namespaced_name()));
        Ok(matched)
    }

    async fn get_pod(&self, key: &NamespacedName) -> Result<Option<Pod>> {
        self.check_reads().await?;
        Ok(self.pods.read().await.get(key).cloned())
    }

    async fn get_job(&self, key: &NamespacedName) -> Result<Option<MigrationJob>> {
        self.check_reads().await?;
        Ok(self.jobs.read().await.get(key).cloned())
    }

    async fn update_job(&self, job: &MigrationJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let key = job.namespaced_name();
        if !jobs.contains_key(&key) {
            return Err(StoreError::NotFound(key.to_string()).into());
        }
        jobs.insert(key, job.clone());
        Ok(())
    }
}
