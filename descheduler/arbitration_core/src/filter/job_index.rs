//! Queries over migration jobs currently active for a pod, node, namespace,
//! or workload.
//!
//! "Active" is a (phase, required annotations) pair. Two canonical sets are
//! used: the broad `{Running, Pending}` set when probing for any existing
//! job, and the stricter `{Running, Pending + passed-arbitration}` set when
//! counting toward admission caps.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use migration_shared_types::{
    MigrationJob, MigrationPhase, Pod, Result, ANNOTATION_PASSED_ARBITRATION,
};
use object_store_interface::{JobFieldSelector, ObjectStore};

/// Phase plus required annotation subset selecting "active" jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseAndAnnotation {
    pub phase: MigrationPhase,
    /// Annotations the job must carry; `None` matches any.
    pub annotations: Option<HashMap<String, String>>,
}

impl PhaseAndAnnotation {
    pub fn new(phase: MigrationPhase, annotations: Option<HashMap<String, String>>) -> Self {
        Self { phase, annotations }
    }

    pub fn matches(&self, job: &MigrationJob) -> bool {
        job.phase_or_pending() == self.phase
            && annotations_contain(&job.annotations, self.annotations.as_ref())
    }

    /// Broad active set: any Running or Pending job.
    pub fn active_default() -> Vec<Self> {
        vec![
            Self::new(MigrationPhase::Running, None),
            Self::new(MigrationPhase::Pending, None),
        ]
    }

    /// Admission-counting set: Running, or Pending that already passed
    /// arbitration.
    pub fn active_admission() -> Vec<Self> {
        let mut passed = HashMap::new();
        passed.insert(ANNOTATION_PASSED_ARBITRATION.to_string(), "true".to_string());
        vec![
            Self::new(MigrationPhase::Running, None),
            Self::new(MigrationPhase::Pending, Some(passed)),
        ]
    }
}

/// True iff every required key/value pair is present in `annotations`.
fn annotations_contain(
    annotations: &HashMap<String, String>,
    required: Option<&HashMap<String, String>>,
) -> bool {
    match required {
        None => true,
        Some(required) => required
            .iter()
            .all(|(k, v)| annotations.get(k) == Some(v)),
    }
}

/// Field-indexed queries over active migration jobs.
#[derive(Clone)]
pub struct JobIndex {
    store: Arc<dyn ObjectStore>,
}

impl JobIndex {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Visit jobs matching the selector and any of the predicates, until
    /// the visitor returns `false`. Store errors propagate to the caller.
    pub async fn for_each_active_job<F>(
        &self,
        selector: &JobFieldSelector,
        predicates: &[PhaseAndAnnotation],
        mut visit: F,
    ) -> Result<()>
    where
        F: FnMut(&MigrationJob) -> bool,
    {
        let jobs = self.store.list_jobs(selector).await?;
        let default = PhaseAndAnnotation::active_default();
        let predicates = if predicates.is_empty() {
            default.as_slice()
        } else {
            predicates
        };
        for job in &jobs {
            if predicates.iter().any(|p| p.matches(job)) && !visit(job) {
                break;
            }
        }
        Ok(())
    }

    /// Whether any active job already targets this pod.
    ///
    /// Matches by pod UID first, then falls back to the namespaced name
    /// because the UID on a job's pod reference can be absent once the pod
    /// has been re-created. Store errors are treated as absence: the store
    /// is authoritative and a duplicate create is rejected there.
    pub async fn existing_pod_migration_job(
        &self,
        pod: &Pod,
        predicates: &[PhaseAndAnnotation],
    ) -> bool {
        let mut existing = false;
        let by_uid = self
            .for_each_active_job(
                &JobFieldSelector::ByPodUid(pod.uid),
                predicates,
                |job| {
                    if let Some(pod_ref) = &job.pod_ref {
                        if pod_ref.uid == Some(pod.uid) {
                            existing = true;
                        }
                    }
                    !existing
                },
            )
            .await;
        if let Err(err) = by_uid {
            warn!(pod = %pod.namespaced_name(), %err, "listing jobs by pod uid failed");
        }

        if !existing {
            let by_name = self
                .for_each_active_job(
                    &JobFieldSelector::ByPodNamespacedName(pod.namespaced_name()),
                    predicates,
                    |job| {
                        if let Some(pod_ref) = &job.pod_ref {
                            if pod_ref.namespace == pod.namespace && pod_ref.name == pod.name {
                                existing = true;
                            }
                        }
                        !existing
                    },
                )
                .await;
            if let Err(err) = by_name {
                warn!(pod = %pod.namespaced_name(), %err, "listing jobs by pod name failed");
            }
        }
        existing
    }
}
