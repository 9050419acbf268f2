//! Job ordering for the arbitration cycle.
//!
//! Sorters are applied in sequence and must each be stable, so earlier
//! sorters act as tie-breakers for later ones: the last sorter dominates
//! the final order. An empty sorter list preserves insertion order.

use std::collections::HashMap;

use migration_shared_types::{MigrationJob, Pod, Uid};

/// Pods resolved for the jobs of one cycle, keyed by job UID.
pub type PodOfJob = HashMap<Uid, Pod>;

/// One ordering pass over the cycle's jobs.
pub type SortFn = Box<dyn Fn(Vec<MigrationJob>, &PodOfJob) -> Vec<MigrationJob> + Send + Sync>;

/// Default sorter: oldest job first.
pub fn sort_jobs_by_creation_timestamp() -> SortFn {
    Box::new(|mut jobs, _| {
        jobs.sort_by_key(|job| job.creation_timestamp);
        jobs
    })
}
