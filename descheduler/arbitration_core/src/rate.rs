//! Token bucket with continuous refill.
//!
//! Tokens accrue at `limit` per second up to `burst`; `reserve` may drive
//! the balance negative and reports how long the caller must wait, which is
//! what the work queue uses for pacing. `allow_n` never overdraws.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct TokenBucket {
    /// Tokens per second.
    limit: f64,
    burst: f64,
    tokens: f64,
    last: Instant,
}

impl TokenBucket {
    /// A full bucket refilling at `limit` tokens per second.
    pub fn new(limit: f64, burst: f64) -> Self {
        Self {
            limit,
            burst,
            tokens: burst,
            last: Instant::now(),
        }
    }

    fn advance(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last);
        self.tokens = (self.tokens + elapsed.as_secs_f64() * self.limit).min(self.burst);
        self.last = now;
    }

    /// Take `n` tokens if the balance covers them; never overdraws.
    pub fn allow_n(&mut self, now: Instant, n: f64) -> bool {
        self.advance(now);
        if self.tokens >= n {
            self.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Current balance without consuming.
    pub fn tokens(&mut self, now: Instant) -> f64 {
        self.advance(now);
        self.tokens
    }

    /// Unconditionally take one token; the returned delay is how long the
    /// caller must wait before acting on it.
    pub fn reserve(&mut self, now: Instant) -> Duration {
        self.advance(now);
        self.tokens -= 1.0;
        if self.tokens >= 0.0 || self.limit <= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.limit)
        }
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    /// Change the refill rate, settling the balance at the old rate first.
    pub fn set_limit(&mut self, limit: f64, now: Instant) {
        self.advance(now);
        self.limit = limit;
    }
}
