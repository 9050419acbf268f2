use async_trait::async_trait;
use migration_shared_types::{
    MigrationError, MigrationJob, NamespacedName, Pod, Result, Uid,
};
use thiserror::Error;

/// Errors specific to object store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("List failed: {0}")]
    ListFailed(String),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<StoreError> for MigrationError {
    fn from(err: StoreError) -> Self {
        MigrationError::StoreError(err.to_string())
    }
}

/// Field-indexed selector for migration job list queries.
///
/// The backing store is expected to serve these from field indexes rather
/// than full scans; the in-memory implementation simply filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobFieldSelector {
    /// Jobs whose pod reference carries this UID.
    ByPodUid(Uid),
    /// Jobs whose pod reference matches this namespace/name pair.
    ByPodNamespacedName(NamespacedName),
    /// Jobs whose pod reference lives in this namespace.
    ByPodNamespace(String),
    /// Every job.
    All,
}

impl JobFieldSelector {
    pub fn matches(&self, job: &MigrationJob) -> bool {
        match self {
            JobFieldSelector::All => true,
            JobFieldSelector::ByPodUid(uid) => job
                .pod_ref
                .as_ref()
                .map(|r| r.uid == Some(*uid))
                .unwrap_or(false),
            JobFieldSelector::ByPodNamespacedName(nn) => job
                .pod_ref
                .as_ref()
                .map(|r| r.namespace == nn.namespace && r.name == nn.name)
                .unwrap_or(false),
            JobFieldSelector::ByPodNamespace(namespace) => job
                .pod_ref
                .as_ref()
                .map(|r| &r.namespace == namespace)
                .unwrap_or(false),
        }
    }
}

/// Read/write access to pod and migration-job records.
///
/// Implementations may disable deep copies on reads as an optimization;
/// callers must treat returned objects as snapshots and never mutate them
/// in place expecting the store to observe the change.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List migration jobs matching the field selector.
    async fn list_jobs(&self, selector: &JobFieldSelector) -> Result<Vec<MigrationJob>>;

    /// List pods currently bound to the given node.
    async fn list_pods_on_node(&self, node_name: &str) -> Result<Vec<Pod>>;

    /// Get a pod by namespace/name.
    async fn get_pod(&self, key: &NamespacedName) -> Result<Option<Pod>>;

    /// Get a migration job by namespace/name.
    async fn get_job(&self, key: &NamespacedName) -> Result<Option<MigrationJob>>;

    /// Persist phase, reason, and annotation changes on an existing job.
    async fn update_job(&self, job: &MigrationJob) -> Result<()>;
}

#[cfg(feature = "in-memory")]
pub mod in_memory;

#[cfg(feature = "in-memory")]
pub use in_memory::InMemoryObjectStore;
