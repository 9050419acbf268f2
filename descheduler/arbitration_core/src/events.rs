//! Structured event recording for arbitration outcomes.

use migration_shared_types::{MigrationJob, Pod};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

/// Lightweight reference to the object an event is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn from_job(job: &MigrationJob) -> Self {
        Self {
            kind: "PodMigrationJob".to_string(),
            namespace: job.namespace.clone(),
            name: job.name.clone(),
        }
    }

    pub fn from_pod(pod: &Pod) -> Self {
        Self {
            kind: "Pod".to_string(),
            namespace: pod.namespace.clone(),
            name: pod.name.clone(),
        }
    }
}

/// Sink for user-visible lifecycle events.
pub trait EventRecorder: Send + Sync {
    fn event(
        &self,
        regarding: &ObjectRef,
        related: Option<&ObjectRef>,
        kind: EventKind,
        reason: &str,
        action: &str,
        note: &str,
    );
}

/// Recorder that emits events through the tracing subscriber.
#[derive(Debug, Default)]
pub struct TracingEventRecorder;

impl EventRecorder for TracingEventRecorder {
    fn event(
        &self,
        regarding: &ObjectRef,
        related: Option<&ObjectRef>,
        kind: EventKind,
        reason: &str,
        action: &str,
        note: &str,
    ) {
        let related = related
            .map(|r| format!("{}/{}", r.namespace, r.name))
            .unwrap_or_default();
        match kind {
            EventKind::Normal => info!(
                kind = %regarding.kind,
                object = %format!("{}/{}", regarding.namespace, regarding.name),
                %related,
                reason,
                action,
                note,
                "event"
            ),
            EventKind::Warning => warn!(
                kind = %regarding.kind,
                object = %format!("{}/{}", regarding.namespace, regarding.name),
                %related,
                reason,
                action,
                note,
                "event"
            ),
        }
    }
}

/// One recorded event, kept by the testing recorder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub regarding: ObjectRef,
    pub related: Option<ObjectRef>,
    pub kind: EventKind,
    pub reason: String,
    pub action: String,
    pub note: String,
}

/// Recorder that captures events in memory (for testing).
#[derive(Debug, Default)]
pub struct RecordingEventRecorder {
    events: std::sync::Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().expect("recorder lock poisoned").clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

impl EventRecorder for RecordingEventRecorder {
    fn event(
        &self,
        regarding: &ObjectRef,
        related: Option<&ObjectRef>,
        kind: EventKind,
        reason: &str,
        action: &str,
        note: &str,
    ) {
        self.events
            .lock()
            .expect("recorder lock poisoned")
            .push(RecordedEvent {
                regarding: regarding.clone(),
                related: related.cloned(),
                kind,
                reason: reason.to_string(),
                action: action.to_string(),
                note: note.to_string(),
            });
    }
}
