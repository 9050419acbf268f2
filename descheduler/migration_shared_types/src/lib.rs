use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Object UID as assigned by the cluster API server.
pub type Uid = Uuid;

/// Annotation written by the arbitrator once a migration job has cleared
/// admission; the eviction executor only acts on jobs carrying it.
pub const ANNOTATION_PASSED_ARBITRATION: &str = "scheduling.koordinator.sh/passed-arbitration";

/// Per-pod eviction cost annotation. A cost of `i32::MAX` marks the pod as
/// non-evictable.
pub const ANNOTATION_EVICTION_COST: &str = "scheduling.koordinator.sh/eviction-cost";

/// User-set annotation requesting immediate eviction, bypassing the
/// retryable admission checks.
pub const ANNOTATION_EVICT_POD: &str = "descheduler.alpha.kubernetes.io/evict";

/// Terminal reason recorded on jobs rejected by a non-retryable filter.
pub const REASON_FORBIDDEN_MIGRATE_POD: &str = "ForbiddenMigratePod";

/// Terminal reason recorded on jobs whose target pod no longer exists.
pub const REASON_POD_NOT_FOUND: &str = "PodNotFound";

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Object store error: {0}")]
    StoreError(String),
    #[error("Controller finder error: {0}")]
    ControllerFinderError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    InternalError(String),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

/// Namespace/name pair identifying an object within the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamespacedName {
    pub namespace: String,
    pub name: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Reference from a pod back to the workload object that manages it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: Uid,
    /// True for the managing controller; a pod has at most one such owner.
    pub controller: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub source: VolumeSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeSource {
    /// Node-local scratch storage, lost on eviction.
    EmptyDir,
    PersistentVolumeClaim { claim_name: String },
    Other,
}

/// A workload replica as observed through the object store.
///
/// This is the subset of the pod object the admission filter and arbitrator
/// act on; the full pod spec stays with the API server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pod {
    pub namespace: String,
    pub name: String,
    pub uid: Uid,
    /// Node the pod is currently bound to; empty when unscheduled.
    pub node_name: String,
    pub scheduler_name: String,
    pub priority: Option<i32>,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub owner_references: Vec<OwnerReference>,
    pub volumes: Vec<Volume>,
    pub phase: PodPhase,
    /// Ready condition as reported by the kubelet.
    pub ready: bool,
    pub deletion_timestamp: Option<DateTime<Utc>>,
    pub creation_timestamp: DateTime<Utc>,
}

impl Pod {
    pub fn namespaced_name(&self) -> NamespacedName {
        NamespacedName::new(self.namespace.clone(), self.name.clone())
    }

    /// The controller owner reference, if any.
    pub fn controller_of(&self) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|r| r.controller)
    }

    /// A pod is active while it has not finished and is not being deleted.
    pub fn is_active(&self) -> bool {
        !matches!(self.phase, PodPhase::Succeeded | PodPhase::Failed)
            && self.deletion_timestamp.is_none()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// True when the user explicitly requested eviction on this pod.
    pub fn has_evict_annotation(&self) -> bool {
        self.annotations.contains_key(ANNOTATION_EVICT_POD)
    }
}

/// Lifecycle phase of a migration job. An unset phase on the stored object
/// is read as `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum MigrationPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Reference from a migration job to the pod it targets.
///
/// The UID can be absent when the job was created against a pod that has
/// since been re-created; queries fall back to the namespaced name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodRef {
    pub uid: Option<Uid>,
    pub namespace: String,
    pub name: String,
}

impl PodRef {
    pub fn from_pod(pod: &Pod) -> Self {
        Self {
            uid: Some(pod.uid),
            namespace: pod.namespace.clone(),
            name: pod.name.clone(),
        }
    }

    pub fn namespaced_name(&self) -> NamespacedName {
        NamespacedName::new(self.namespace.clone(), self.name.clone())
    }
}

/// A persistent request that a specific pod be evicted and re-scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationJob {
    pub uid: Uid,
    pub namespace: String,
    pub name: String,
    pub creation_timestamp: DateTime<Utc>,
    pub annotations: HashMap<String, String>,
    pub pod_ref: Option<PodRef>,
    /// `None` on freshly created jobs; treated as `Pending` everywhere.
    pub phase: Option<MigrationPhase>,
    pub reason: Option<String>,
}

impl MigrationJob {
    pub fn namespaced_name(&self) -> NamespacedName {
        NamespacedName::new(self.namespace.clone(), self.name.clone())
    }

    pub fn phase_or_pending(&self) -> MigrationPhase {
        self.phase.unwrap_or(MigrationPhase::Pending)
    }

    pub fn has_passed_arbitration(&self) -> bool {
        self.annotations
            .get(ANNOTATION_PASSED_ARBITRATION)
            .map(String::as_str)
            == Some("true")
    }
}

/// Simple label-based selector; all listed labels must match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSelector {
    pub match_labels: HashMap<String, String>,
}

impl LabelSelector {
    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.match_labels
            .iter()
            .all(|(k, v)| labels.get(k) == Some(v))
    }
}
