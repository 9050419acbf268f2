//! Admission filtering for pod migration.
//!
//! Predicates are grouped into two chains evaluated short-circuit:
//!
//! - **Non-retryable** — a failure means the job must be aborted: eviction
//!   cost, namespace allow/deny, baseline evictability, the
//!   expected-replicas guard, and the reservation-mode scheduler check.
//! - **Retryable** — a failure means "not now", the job stays queued for a
//!   later cycle: the workload rate limiter and the per-node,
//!   per-namespace, and per-workload concurrency caps.
//!
//! Store errors during retryable checks fail closed (the job waits);
//! the duplicate-job probe fails open because the store is authoritative
//! and duplicate creates are rejected there.

pub mod default_evictor;
pub mod job_index;
pub mod limiter;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::config::{resolve_or_unlimited, JobMode, MigrationControllerConfig};
use controller_finder_interface::ControllerFinder;
use migration_shared_types::{
    MigrationError, NamespacedName, Pod, Result, ANNOTATION_EVICTION_COST,
};
use object_store_interface::{JobFieldSelector, ObjectStore};

use default_evictor::DefaultEvictor;
use job_index::{JobIndex, PhaseAndAnnotation};
use limiter::WorkloadRateLimiter;

/// Capabilities exposed to descheduling plugins.
#[async_trait]
pub trait MigrationFilter: Send + Sync {
    /// Whether a migration job may currently be created for this pod.
    async fn filter(&self, pod: &Pod) -> bool;

    /// Final check right before the eviction executes.
    async fn pre_eviction_filter(&self, pod: &Pod) -> bool;

    /// Record a completed eviction against the workload rate limiter.
    async fn track_evicted_pod(&self, pod: &Pod);
}

/// The two predicate chains consumed by the arbitrator.
#[async_trait]
pub trait ArbitrationFilter: Send + Sync {
    /// False means the job must be aborted.
    async fn non_retryable_pod_filter(&self, pod: &Pod) -> bool;

    /// False means the job should wait for a later cycle.
    async fn retryable_pod_filter(&self, pod: &Pod) -> bool;
}

pub struct AdmissionFilter {
    config: MigrationControllerConfig,
    store: Arc<dyn ObjectStore>,
    controller_finder: Arc<dyn ControllerFinder>,
    job_index: JobIndex,
    default_evictor: DefaultEvictor,
    limiter: WorkloadRateLimiter,
}

impl AdmissionFilter {
    /// Build the filter; configuration errors surface here rather than at
    /// first use.
    pub fn new(
        config: MigrationControllerConfig,
        store: Arc<dyn ObjectStore>,
        controller_finder: Arc<dyn ControllerFinder>,
    ) -> Result<Self> {
        if config.default_job_mode == JobMode::ReservationFirst
            && config.scheduler_names.is_empty()
        {
            return Err(MigrationError::ConfigError(
                "ReservationFirst mode requires at least one scheduler name".to_string(),
            ));
        }
        if let Some(namespaces) = &config.namespaces {
            if !namespaces.include.is_empty() && !namespaces.exclude.is_empty() {
                return Err(MigrationError::ConfigError(
                    "namespaces.include and namespaces.exclude are mutually exclusive"
                        .to_string(),
                ));
            }
        }

        let job_index = JobIndex::new(store.clone());
        let default_evictor = DefaultEvictor::new(config.evictor.clone());
        let limiter = WorkloadRateLimiter::new(&config);
        Ok(Self {
            config,
            store,
            controller_finder,
            job_index,
            default_evictor,
            limiter,
        })
    }

    /// Whether any active job (Running or Pending) already targets the pod.
    pub async fn existing_pod_migration_job(&self, pod: &Pod) -> bool {
        self.job_index.existing_pod_migration_job(pod, &[]).await
    }

    // ----- non-retryable chain -----

    /// Pods whose eviction cost is pinned at the maximum are never
    /// migrated; an unparsable cost does not constrain.
    fn filter_max_eviction_cost(&self, pod: &Pod) -> bool {
        let cost = pod
            .annotations
            .get(ANNOTATION_EVICTION_COST)
            .and_then(|raw| raw.trim().parse::<i32>().ok());
        if cost == Some(i32::MAX) {
            debug!(pod = %pod.namespaced_name(), "pod pinned by max eviction cost");
            return false;
        }
        true
    }

    fn filter_namespaces(&self, pod: &Pod) -> bool {
        let Some(namespaces) = &self.config.namespaces else {
            return true;
        };
        if !namespaces.include.is_empty() && !namespaces.include.contains(&pod.namespace) {
            debug!(pod = %pod.namespaced_name(), "namespace not included for migration");
            return false;
        }
        if namespaces.exclude.contains(&pod.namespace) {
            debug!(pod = %pod.namespaced_name(), "namespace excluded from migration");
            return false;
        }
        true
    }

    /// Refuse migration when the workload is too small for its own
    /// defenses: a single replica, or a cap equal to the replica count,
    /// would let migration take the whole workload down.
    async fn filter_expected_replicas(&self, pod: &Pod) -> bool {
        let Some(owner) = pod.controller_of() else {
            return true;
        };
        let expected_replicas = match self
            .controller_finder
            .get_pods_for_ref(owner, &pod.namespace, None, false)
            .await
        {
            Ok((_, expected)) => expected,
            Err(err) => {
                error!(pod = %pod.namespaced_name(), %err, "resolving workload replicas failed");
                return false;
            }
        };

        let max_migrating = resolve_or_unlimited(
            self.config.max_migrating_per_workload.as_ref(),
            expected_replicas,
        );
        let max_unavailable = resolve_or_unlimited(
            self.config.max_unavailable_per_workload.as_ref(),
            expected_replicas,
        );

        if !self.config.skip_check_expected_replicas
            && (expected_replicas == 1
                || expected_replicas == max_migrating
                || expected_replicas == max_unavailable)
        {
            warn!(
                pod = %pod.namespaced_name(),
                workload = %owner.name,
                expected_replicas,
                max_migrating,
                max_unavailable,
                "migration budget covers the whole workload, refusing to migrate"
            );
            return false;
        }
        true
    }

    /// In ReservationFirst mode the pod must use one of the configured
    /// schedulers, otherwise capacity cannot be reserved for it.
    fn reservation_filter(&self, pod: &Pod) -> bool {
        if self.config.default_job_mode != JobMode::ReservationFirst {
            return true;
        }
        if self
            .config
            .scheduler_names
            .iter()
            .any(|name| name == &pod.scheduler_name)
        {
            return true;
        }
        error!(
            pod = %pod.namespaced_name(),
            scheduler = %pod.scheduler_name,
            allowed = ?self.config.scheduler_names,
            "pod cannot be migrated by reservation: scheduler not whitelisted"
        );
        false
    }

    // ----- retryable chain -----

    fn filter_limited_object(&self, pod: &Pod) -> bool {
        let Some(owner) = pod.controller_of() else {
            return true;
        };
        self.limiter.allows(owner.uid, &owner.name)
    }

    async fn filter_max_migrating_per_node(&self, pod: &Pod) -> bool {
        let max_migrating = match self.config.max_migrating_per_node {
            Some(max) if max > 0 => max as usize,
            _ => return true,
        };
        if pod.node_name.is_empty() {
            return true;
        }

        let neighbors = match self.store.list_pods_on_node(&pod.node_name).await {
            Ok(pods) => pods,
            Err(err) => {
                warn!(pod = %pod.namespaced_name(), %err, "listing node pods failed, holding job");
                return false;
            }
        };
        if neighbors.is_empty() {
            return true;
        }

        let predicates = PhaseAndAnnotation::active_admission();
        let mut count = 0usize;
        for neighbor in &neighbors {
            if neighbor.uid != pod.uid
                && neighbor.node_name == pod.node_name
                && self
                    .job_index
                    .existing_pod_migration_job(neighbor, &predicates)
                    .await
            {
                count += 1;
            }
        }

        let exceeded = count >= max_migrating;
        if exceeded {
            debug!(
                pod = %pod.namespaced_name(),
                node = %pod.node_name,
                count,
                max_migrating,
                "node migration cap reached"
            );
        }
        !exceeded
    }

    async fn filter_max_migrating_per_namespace(&self, pod: &Pod) -> bool {
        let max_migrating = match self.config.max_migrating_per_namespace {
            Some(max) if max > 0 => max as usize,
            _ => return true,
        };

        let mut count = 0usize;
        let listed = self
            .job_index
            .for_each_active_job(
                &JobFieldSelector::ByPodNamespace(pod.namespace.clone()),
                &PhaseAndAnnotation::active_admission(),
                |job| {
                    if let Some(pod_ref) = &job.pod_ref {
                        if pod_ref.uid != Some(pod.uid) && pod_ref.namespace == pod.namespace {
                            count += 1;
                        }
                    }
                    true
                },
            )
            .await;
        if let Err(err) = listed {
            warn!(pod = %pod.namespaced_name(), %err, "listing namespace jobs failed, holding job");
            return false;
        }

        let exceeded = count >= max_migrating;
        if exceeded {
            debug!(
                pod = %pod.namespaced_name(),
                namespace = %pod.namespace,
                count,
                max_migrating,
                "namespace migration cap reached"
            );
        }
        !exceeded
    }

    async fn filter_max_migrating_or_unavailable_per_workload(&self, pod: &Pod) -> bool {
        let Some(owner) = pod.controller_of() else {
            return true;
        };
        let (workload_pods, expected_replicas) = match self
            .controller_finder
            .get_pods_for_ref(owner, &pod.namespace, None, false)
            .await
        {
            Ok(found) => found,
            Err(err) => {
                warn!(pod = %pod.namespaced_name(), %err, "resolving workload pods failed, holding job");
                return false;
            }
        };

        let max_migrating = resolve_or_unlimited(
            self.config.max_migrating_per_workload.as_ref(),
            expected_replicas,
        ) as usize;
        let max_unavailable = resolve_or_unlimited(
            self.config.max_unavailable_per_workload.as_ref(),
            expected_replicas,
        ) as usize;

        // Jobs in the namespace that target other pods of the same owner.
        let mut candidate_refs: Vec<NamespacedName> = Vec::new();
        let listed = self
            .job_index
            .for_each_active_job(
                &JobFieldSelector::ByPodNamespace(pod.namespace.clone()),
                &PhaseAndAnnotation::active_admission(),
                |job| {
                    if let Some(pod_ref) = &job.pod_ref {
                        if pod_ref.uid != Some(pod.uid) {
                            candidate_refs.push(pod_ref.namespaced_name());
                        }
                    }
                    true
                },
            )
            .await;
        if let Err(err) = listed {
            warn!(pod = %pod.namespaced_name(), %err, "listing workload jobs failed, holding job");
            return false;
        }

        let mut migrating_pods: HashSet<NamespacedName> = HashSet::new();
        for candidate in candidate_refs {
            match self.store.get_pod(&candidate).await {
                Ok(Some(candidate_pod)) => {
                    if candidate_pod.controller_of().map(|o| o.uid) == Some(owner.uid) {
                        migrating_pods.insert(candidate);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(pod = %candidate, %err, "fetching migrating pod failed");
                }
            }
        }

        if !migrating_pods.is_empty() && migrating_pods.len() >= max_migrating {
            debug!(
                pod = %pod.namespaced_name(),
                workload = %owner.name,
                migrating = migrating_pods.len(),
                max_migrating,
                "workload migration cap reached"
            );
            return false;
        }

        let mut unavailable: HashSet<NamespacedName> = workload_pods
            .iter()
            .filter(|p| !(p.is_active() && p.is_ready()))
            .map(|p| p.namespaced_name())
            .collect();
        unavailable.extend(migrating_pods);

        if unavailable.len() >= max_unavailable {
            debug!(
                pod = %pod.namespaced_name(),
                workload = %owner.name,
                unavailable = unavailable.len(),
                max_unavailable,
                "workload unavailability budget reached"
            );
            return false;
        }
        true
    }
}

#[async_trait]
impl ArbitrationFilter for AdmissionFilter {
    async fn non_retryable_pod_filter(&self, pod: &Pod) -> bool {
        self.filter_max_eviction_cost(pod)
            && self.filter_namespaces(pod)
            && self.default_evictor.filter(pod)
            && self.filter_expected_replicas(pod).await
            && self.reservation_filter(pod)
    }

    async fn retryable_pod_filter(&self, pod: &Pod) -> bool {
        if pod.has_evict_annotation() {
            return true;
        }
        self.filter_limited_object(pod)
            && self.filter_max_migrating_per_node(pod).await
            && self.filter_max_migrating_per_namespace(pod).await
            && self
                .filter_max_migrating_or_unavailable_per_workload(pod)
                .await
    }
}

#[async_trait]
impl MigrationFilter for AdmissionFilter {
    async fn filter(&self, pod: &Pod) -> bool {
        if self.existing_pod_migration_job(pod).await {
            return false;
        }
        if !self.reservation_filter(pod) {
            return false;
        }
        self.non_retryable_pod_filter(pod).await && self.retryable_pod_filter(pod).await
    }

    async fn pre_eviction_filter(&self, pod: &Pod) -> bool {
        self.default_evictor.pre_eviction_filter(pod)
    }

    async fn track_evicted_pod(&self, pod: &Pod) {
        let Some(owner) = pod.controller_of() else {
            return;
        };
        if self.limiter.is_disabled() {
            return;
        }
        let expected_replicas = match self
            .controller_finder
            .get_expected_scale_for_pod(pod)
            .await
        {
            Ok(expected) => expected,
            Err(err) => {
                warn!(pod = %pod.namespaced_name(), %err, "resolving workload scale failed");
                return;
            }
        };
        let max_migrating_replicas = self
            .limiter
            .max_migrating_replicas(&self.config, expected_replicas);
        if max_migrating_replicas == 0 {
            return;
        }
        self.limiter
            .track(owner.uid, &owner.name, max_migrating_replicas);
    }
}
