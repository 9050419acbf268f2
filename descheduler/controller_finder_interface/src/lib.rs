use async_trait::async_trait;
use migration_shared_types::{
    LabelSelector, MigrationError, OwnerReference, Pod, Result,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FinderError {
    #[error("Workload not found: {0}")]
    WorkloadNotFound(String),

    #[error("Scale lookup failed: {0}")]
    ScaleLookupFailed(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<FinderError> for MigrationError {
    fn from(err: FinderError) -> Self {
        MigrationError::ControllerFinderError(err.to_string())
    }
}

/// Resolves pods back to the workload object that owns them.
///
/// Backed by the cluster API in production; the mock implementation keeps a
/// registry keyed by owner UID.
#[async_trait]
pub trait ControllerFinder: Send + Sync {
    /// All pods managed by the referenced workload in the given namespace,
    /// plus the workload's expected replica count.
    async fn get_pods_for_ref(
        &self,
        owner: &OwnerReference,
        namespace: &str,
        label_selector: Option<&LabelSelector>,
        include_sub_owners: bool,
    ) -> Result<(Vec<Pod>, u32)>;

    /// Expected replica count of the workload owning the pod.
    async fn get_expected_scale_for_pod(&self, pod: &Pod) -> Result<u32>;
}

pub mod mock;

pub use mock::MockControllerFinder;
