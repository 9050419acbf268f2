//! Per-workload migration rate limiting.
//!
//! Each workload gets a token bucket refilling at its migration budget per
//! rate window, with a burst of one. `track` draws a token after a
//! successful eviction; `allows` is the prospective probe used by the
//! retryable filter chain and never consumes. Entries expire 1.5 windows
//! after their last eviction; pruning happens under the same mutex that
//! serializes every other limiter access.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::{resolve_or_unlimited, LimitObject, MigrationControllerConfig, ObjectLimiterArgs};
use crate::rate::TokenBucket;
use migration_shared_types::Uid;

#[derive(Debug, Default)]
struct LimiterState {
    limiters: HashMap<Uid, TokenBucket>,
    deadlines: HashMap<Uid, Instant>,
}

#[derive(Debug)]
pub struct WorkloadRateLimiter {
    /// Workload-scope limiter arguments, when configured with a non-zero
    /// window.
    args: Option<ObjectLimiterArgs>,
    /// Entry lifetime; 1.5 times the rate window.
    ttl: Duration,
    state: Mutex<LimiterState>,
}

impl WorkloadRateLimiter {
    pub fn new(config: &MigrationControllerConfig) -> Self {
        let args = config
            .object_limiters
            .get(&LimitObject::Workload)
            .filter(|args| !args.duration.is_zero())
            .cloned();
        let ttl = args
            .as_ref()
            .map(|args| args.duration + args.duration / 2)
            .unwrap_or_default();
        Self {
            args,
            ttl,
            state: Mutex::new(LimiterState::default()),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.args.is_none()
    }

    /// The configured per-workload budget, falling back to the global
    /// per-workload cap, resolved against the expected replica count.
    pub fn max_migrating_replicas(
        &self,
        config: &MigrationControllerConfig,
        expected_replicas: u32,
    ) -> u32 {
        let Some(args) = &self.args else {
            return 0;
        };
        let budget = args
            .max_migrating
            .as_ref()
            .or(config.max_migrating_per_workload.as_ref());
        resolve_or_unlimited(budget, expected_replicas)
    }

    /// Record one eviction against the workload's bucket, creating or
    /// re-rating it as needed. Denial only logs; the prospective check in
    /// the filter chain is what actually holds migrations back.
    pub fn track(&self, owner_uid: Uid, owner_name: &str, max_migrating_replicas: u32) {
        let Some(args) = &self.args else {
            return;
        };
        if max_migrating_replicas == 0 {
            return;
        }
        let now = Instant::now();
        let limit = f64::from(max_migrating_replicas) / args.duration.as_secs_f64();

        let mut state = self.state.lock().expect("limiter lock poisoned");
        prune_expired(&mut state, now);

        let bucket = state
            .limiters
            .entry(owner_uid)
            .or_insert_with(|| TokenBucket::new(limit, 1.0));
        if bucket.limit() != limit {
            bucket.set_limit(limit, now);
        }
        if !bucket.allow_n(now, 1.0) {
            info!(
                workload = owner_name,
                "workload descheduled too frequently, holding further migrations"
            );
        }
        state.deadlines.insert(owner_uid, now + self.ttl);
    }

    /// Prospective check: would drawing one more token overdraw the
    /// workload's bucket? Does not consume.
    pub fn allows(&self, owner_uid: Uid, owner_name: &str) -> bool {
        if self.args.is_none() {
            return true;
        }
        let now = Instant::now();
        let mut state = self.state.lock().expect("limiter lock poisoned");
        prune_expired(&mut state, now);

        if let Some(bucket) = state.limiters.get_mut(&owner_uid) {
            if bucket.tokens(now) - 1.0 < 0.0 {
                debug!(workload = owner_name, "workload migration rate limited");
                return false;
            }
        }
        true
    }

    /// Number of live limiter entries (for testing).
    pub fn entry_count(&self) -> usize {
        let mut state = self.state.lock().expect("limiter lock poisoned");
        prune_expired(&mut state, Instant::now());
        state.limiters.len()
    }
}

fn prune_expired(state: &mut LimiterState, now: Instant) {
    let expired: Vec<Uid> = state
        .deadlines
        .iter()
        .filter(|(_, deadline)| **deadline <= now)
        .map(|(uid, _)| *uid)
        .collect();
    for uid in expired {
        state.deadlines.remove(&uid);
        state.limiters.remove(&uid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntOrPercent;
    use uuid::Uuid;

    fn limiter_config(window: Duration, max_migrating: Option<IntOrPercent>) -> MigrationControllerConfig {
        let mut config = MigrationControllerConfig::default();
        config.object_limiters.insert(
            LimitObject::Workload,
            ObjectLimiterArgs {
                duration: window,
                max_migrating,
            },
        );
        config
    }

    #[test]
    fn test_disabled_without_config() {
        let limiter = WorkloadRateLimiter::new(&MigrationControllerConfig::default());
        assert!(limiter.is_disabled());
        assert!(limiter.allows(Uuid::new_v4(), "any"));
    }

    #[test]
    fn test_zero_window_disables() {
        let config = limiter_config(Duration::ZERO, Some(IntOrPercent::Count(1)));
        let limiter = WorkloadRateLimiter::new(&config);
        assert!(limiter.is_disabled());
    }

    #[test]
    fn test_track_then_deny() {
        let config = limiter_config(Duration::from_secs(600), Some(IntOrPercent::Count(1)));
        let limiter = WorkloadRateLimiter::new(&config);
        let uid = Uuid::new_v4();

        assert!(limiter.allows(uid, "workload"));
        limiter.track(uid, "workload", 1);
        // The single burst token is gone and refill is far away.
        assert!(!limiter.allows(uid, "workload"));
    }

    #[test]
    fn test_untracked_workloads_unaffected() {
        let config = limiter_config(Duration::from_secs(600), Some(IntOrPercent::Count(1)));
        let limiter = WorkloadRateLimiter::new(&config);
        let limited = Uuid::new_v4();
        let other = Uuid::new_v4();

        limiter.track(limited, "limited", 1);
        assert!(!limiter.allows(limited, "limited"));
        assert!(limiter.allows(other, "other"));
    }

    #[test]
    fn test_track_zero_budget_is_noop() {
        let config = limiter_config(Duration::from_secs(600), Some(IntOrPercent::Count(1)));
        let limiter = WorkloadRateLimiter::new(&config);
        let uid = Uuid::new_v4();
        limiter.track(uid, "workload", 0);
        assert_eq!(limiter.entry_count(), 0);
        assert!(limiter.allows(uid, "workload"));
    }

    #[test]
    fn test_budget_resolution_falls_back_to_workload_cap() {
        let config = limiter_config(Duration::from_secs(600), None);
        let limiter = WorkloadRateLimiter::new(&config);
        // Default cap is 10%: ceil(10% of 20) = 2.
        assert_eq!(limiter.max_migrating_replicas(&config, 20), 2);

        let explicit = limiter_config(Duration::from_secs(600), Some(IntOrPercent::Count(5)));
        let limiter = WorkloadRateLimiter::new(&explicit);
        assert_eq!(limiter.max_migrating_replicas(&explicit, 20), 5);
    }

    #[test]
    fn test_entries_expire_after_ttl() {
        // Tiny window so the 1.5x TTL elapses within the test.
        let config = limiter_config(Duration::from_millis(10), Some(IntOrPercent::Count(1)));
        let limiter = WorkloadRateLimiter::new(&config);
        let uid = Uuid::new_v4();

        limiter.track(uid, "workload", 1);
        assert_eq!(limiter.entry_count(), 1);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(limiter.entry_count(), 0);
        assert!(limiter.allows(uid, "workload"));
    }

    #[test]
    fn test_rerate_on_changed_budget() {
        let config = limiter_config(Duration::from_secs(1), Some(IntOrPercent::Count(1)));
        let limiter = WorkloadRateLimiter::new(&config);
        let uid = Uuid::new_v4();

        limiter.track(uid, "workload", 1);
        assert!(!limiter.allows(uid, "workload"));

        // A larger budget refills fast enough to pass again shortly.
        limiter.track(uid, "workload", 100);
        std::thread::sleep(Duration::from_millis(50));
        assert!(limiter.allows(uid, "workload"));
    }
}
