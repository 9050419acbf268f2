//! Migration arbitration and admission.
//!
//! This crate decides *whether* and *in what order* proposed pod migrations
//! may proceed. Descheduling plugins propose migrations as jobs; the
//! [`Arbitrator`] collects them, orders each batch through pluggable
//! sorters, and runs every candidate through the [`AdmissionFilter`]'s
//! retryable and non-retryable predicate chains. Admitted jobs are marked
//! with the passed-arbitration annotation and handed to the eviction
//! executor through a rate-limited [`WorkQueue`]; rejected jobs are either
//! aborted or retried on a later cycle.

pub mod arbitrator;
pub mod config;
pub mod events;
pub mod filter;
pub mod rate;
pub mod work_queue;

pub use arbitrator::sort::{sort_jobs_by_creation_timestamp, PodOfJob, SortFn};
pub use arbitrator::Arbitrator;
pub use config::{
    DefaultEvictorConfig, IntOrPercent, JobMode, LimitObject, MigrationControllerConfig,
    NamespaceSelector, ObjectLimiterArgs,
};
pub use events::{EventKind, EventRecorder, ObjectRef, RecordingEventRecorder, TracingEventRecorder};
pub use filter::{AdmissionFilter, ArbitrationFilter, MigrationFilter};
pub use work_queue::{Request, WorkQueue};
