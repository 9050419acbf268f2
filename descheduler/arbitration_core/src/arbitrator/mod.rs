//! The arbitrator: a batched sort-filter-dispatch loop over pending
//! migration jobs.
//!
//! Producers hand jobs in through `add` (or the event intake); each cycle
//! snapshots the waiting collection, resolves the target pods, orders the
//! batch through the configured sorters, and dispatches every job exactly
//! one way: aborted (non-retryable reject), left waiting (retryable
//! reject), or admitted — the passed-arbitration annotation is persisted
//! before the job reference is pushed onto the work queue, so a queue
//! reader always observes the annotation on re-read.

pub mod sort;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::events::{EventKind, EventRecorder, ObjectRef};
use crate::filter::ArbitrationFilter;
use crate::work_queue::{Request, WorkQueue};
use migration_shared_types::{
    MigrationJob, MigrationPhase, Pod, Uid, ANNOTATION_PASSED_ARBITRATION,
    REASON_FORBIDDEN_MIGRATE_POD, REASON_POD_NOT_FOUND,
};
use object_store_interface::ObjectStore;
use sort::{PodOfJob, SortFn};

const ACTION_ARBITRATE: &str = "Arbitrate";

#[derive(Default)]
struct ArbitratorState {
    /// Jobs added but not yet admitted or aborted, keyed by job UID.
    waiting: HashMap<Uid, MigrationJob>,
    /// Captured from the first create event; cycle dispatch pushes here.
    work_queue: Option<Arc<WorkQueue>>,
}

pub struct Arbitrator {
    store: Arc<dyn ObjectStore>,
    filter: Arc<dyn ArbitrationFilter>,
    sorts: Vec<SortFn>,
    event_recorder: Arc<dyn EventRecorder>,
    interval: Duration,
    state: Mutex<ArbitratorState>,
}

impl Arbitrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        filter: Arc<dyn ArbitrationFilter>,
        sorts: Vec<SortFn>,
        event_recorder: Arc<dyn EventRecorder>,
        interval: Duration,
        work_queue: Option<Arc<WorkQueue>>,
    ) -> Self {
        Self {
            store,
            filter,
            sorts,
            event_recorder,
            interval,
            state: Mutex::new(ArbitratorState {
                waiting: HashMap::new(),
                work_queue,
            }),
        }
    }

    /// Queue a job for the next arbitration cycle.
    pub fn add(&self, job: MigrationJob) {
        let mut state = self.state.lock().expect("arbitrator lock poisoned");
        state.waiting.insert(job.uid, job);
    }

    /// Number of jobs currently waiting (for testing and introspection).
    pub fn waiting_len(&self) -> usize {
        self.state
            .lock()
            .expect("arbitrator lock poisoned")
            .waiting
            .len()
    }

    /// UIDs of the jobs currently waiting.
    pub fn waiting_uids(&self) -> Vec<Uid> {
        self.state
            .lock()
            .expect("arbitrator lock poisoned")
            .waiting
            .keys()
            .copied()
            .collect()
    }

    /// Run cycles until the stop channel signals, honoring the stop only at
    /// cycle boundaries; an in-flight cycle always completes.
    pub async fn run(&self, mut stop: watch::Receiver<bool>) {
        loop {
            if *stop.borrow() {
                return;
            }
            self.arbitrate_once().await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// One full arbitration cycle: snapshot, hydrate, sort, filter,
    /// dispatch. Per-job errors are logged and never abort the cycle.
    pub async fn arbitrate_once(&self) {
        let snapshot: Vec<MigrationJob> = {
            let state = self.state.lock().expect("arbitrator lock poisoned");
            state.waiting.values().cloned().collect()
        };
        if snapshot.is_empty() {
            return;
        }

        let mut pod_of_job = PodOfJob::new();
        let mut batch = Vec::with_capacity(snapshot.len());
        for job in snapshot {
            match self.pod_for_job(&job).await {
                Ok(Some(pod)) => {
                    pod_of_job.insert(job.uid, pod);
                    batch.push(job);
                }
                Ok(None) => {
                    // The target pod is gone; the job can never succeed.
                    self.update_failed_job(job, REASON_POD_NOT_FOUND, None).await;
                }
                Err(err) => {
                    // Transient read failure: leave the job for the next cycle.
                    warn!(job = %job.namespaced_name(), %err, "resolving pod failed, job stays waiting");
                }
            }
        }

        let batch = self.sort(batch, &pod_of_job);
        self.filter_and_dispatch(batch, &pod_of_job).await;
        debug!("arbitration cycle completed");
    }

    fn sort(&self, mut jobs: Vec<MigrationJob>, pod_of_job: &PodOfJob) -> Vec<MigrationJob> {
        for sorter in &self.sorts {
            jobs = sorter(jobs, pod_of_job);
        }
        jobs
    }

    async fn filter_and_dispatch(&self, jobs: Vec<MigrationJob>, pod_of_job: &PodOfJob) {
        for job in jobs {
            let Some(pod) = pod_of_job.get(&job.uid) else {
                continue;
            };
            if !self.filter.non_retryable_pod_filter(pod).await {
                self.update_failed_job(job, REASON_FORBIDDEN_MIGRATE_POD, Some(pod))
                    .await;
                continue;
            }
            if !self.filter.retryable_pod_filter(pod).await {
                self.event_recorder.event(
                    &ObjectRef::from_job(&job),
                    Some(&ObjectRef::from_pod(pod)),
                    EventKind::Normal,
                    "Requeued",
                    ACTION_ARBITRATE,
                    "held by a retryable admission check, will retry next cycle",
                );
                continue;
            }
            self.update_passed_job(job, pod).await;
        }
    }

    async fn pod_for_job(
        &self,
        job: &MigrationJob,
    ) -> migration_shared_types::Result<Option<Pod>> {
        let Some(pod_ref) = &job.pod_ref else {
            return Ok(None);
        };
        self.store.get_pod(&pod_ref.namespaced_name()).await
    }

    /// Abort the job: persist the failure, then drop it from the waiting
    /// collection. A failed write keeps the job waiting for a retry.
    async fn update_failed_job(&self, mut job: MigrationJob, reason: &str, pod: Option<&Pod>) {
        job.phase = Some(MigrationPhase::Failed);
        job.reason = Some(reason.to_string());
        if let Err(err) = self.store.update_job(&job).await {
            error!(job = %job.namespaced_name(), %err, "persisting failed job status");
            return;
        }

        {
            let mut state = self.state.lock().expect("arbitrator lock poisoned");
            state.waiting.remove(&job.uid);
        }
        self.event_recorder.event(
            &ObjectRef::from_job(&job),
            pod.map(ObjectRef::from_pod).as_ref(),
            EventKind::Warning,
            reason,
            ACTION_ARBITRATE,
            "rejected by a non-retryable admission check",
        );
    }

    /// Admit the job: persist the passed-arbitration annotation, drop it
    /// from the waiting collection, and enqueue it for the executor.
    async fn update_passed_job(&self, mut job: MigrationJob, pod: &Pod) {
        job.annotations.insert(
            ANNOTATION_PASSED_ARBITRATION.to_string(),
            "true".to_string(),
        );
        if let Err(err) = self.store.update_job(&job).await {
            error!(job = %job.namespaced_name(), %err, "persisting passed-arbitration annotation");
            return;
        }

        let queue = {
            let mut state = self.state.lock().expect("arbitrator lock poisoned");
            state.waiting.remove(&job.uid);
            state.work_queue.clone()
        };
        match queue {
            Some(queue) => queue.add(Request::from_job(&job)),
            None => warn!(job = %job.namespaced_name(), "no work queue captured, admitted job not enqueued"),
        }
        self.event_recorder.event(
            &ObjectRef::from_job(&job),
            Some(&ObjectRef::from_pod(pod)),
            EventKind::Normal,
            "PassedArbitration",
            ACTION_ARBITRATE,
            "admitted and handed to the eviction executor",
        );
    }

    // ----- event intake -----

    /// A job was created. Jobs that already carry the passed-arbitration
    /// annotation (created directly by an operator) go straight to the
    /// queue; everything else waits for a cycle. The first call captures
    /// the queue reference used by cycle dispatch.
    pub fn on_create(&self, job: &MigrationJob, queue: &Arc<WorkQueue>) {
        let enqueue_directly = {
            let mut state = self.state.lock().expect("arbitrator lock poisoned");
            if state.work_queue.is_none() {
                state.work_queue = Some(queue.clone());
            }
            if job.has_passed_arbitration() {
                true
            } else {
                state.waiting.insert(job.uid, job.clone());
                false
            }
        };
        if enqueue_directly {
            queue.add(Request::from_job(job));
        }
    }

    /// Lifecycle change on an already-admitted job.
    pub fn on_update(&self, job: &MigrationJob, queue: &Arc<WorkQueue>) {
        queue.add(Request::from_job(job));
    }

    pub fn on_delete(&self, job: &MigrationJob, queue: &Arc<WorkQueue>) {
        queue.add(Request::from_job(job));
    }

    pub fn on_generic(&self, job: &MigrationJob, queue: &Arc<WorkQueue>) {
        queue.add(Request::from_job(job));
    }
}
