//! Rate-limited FIFO of admitted migration jobs.
//!
//! The arbitrator pushes a `Request` per admitted job; the eviction
//! executor drains the queue. Consumption is paced by a token bucket so a
//! large admission batch does not translate into an eviction storm.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::rate::TokenBucket;
use migration_shared_types::{MigrationJob, NamespacedName};

/// Work item naming a migration job to execute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Request {
    pub namespace: String,
    pub name: String,
}

impl Request {
    pub fn from_job(job: &MigrationJob) -> Self {
        Self {
            namespace: job.namespace.clone(),
            name: job.name.clone(),
        }
    }

    pub fn namespaced_name(&self) -> NamespacedName {
        NamespacedName::new(self.namespace.clone(), self.name.clone())
    }
}

#[derive(Debug)]
pub struct WorkQueue {
    items: Mutex<VecDeque<Request>>,
    limiter: Mutex<TokenBucket>,
    notify: Notify,
}

impl WorkQueue {
    /// Queue draining at `rate` items per second with the given burst.
    pub fn new(rate: f64, burst: f64) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            limiter: Mutex::new(TokenBucket::new(rate, burst)),
            notify: Notify::new(),
        }
    }

    pub fn add(&self, request: Request) {
        self.items
            .lock()
            .expect("work queue lock poisoned")
            .push_back(request);
        self.notify.notify_one();
    }

    /// Pop the next request, waiting for one to arrive and for the rate
    /// limiter to release it.
    pub async fn get(&self) -> Request {
        loop {
            let notified = self.notify.notified();
            let popped = self
                .items
                .lock()
                .expect("work queue lock poisoned")
                .pop_front();
            if let Some(request) = popped {
                let delay = self
                    .limiter
                    .lock()
                    .expect("work queue limiter lock poisoned")
                    .reserve(Instant::now());
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                return request;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().expect("work queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
