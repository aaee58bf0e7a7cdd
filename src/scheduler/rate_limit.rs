//! Per-worker rate limit penalties.
//!
//! When the remote service throttles an IP, every worker behind that proxy is
//! kept out of new requests until the penalty expires. The main worker is
//! exempt from proxy-wide penalties because replies are routed through it.

use std::collections::HashMap;

/// Penalty expiry per worker, in milliseconds since epoch.
#[derive(Debug, Default, Clone)]
pub struct RateLimitState {
    /// Worker index -> time at which the penalty ends.
    pub penalized_until: HashMap<usize, u64>,
    /// Number of rate limit responses recorded since start.
    pub total_hits: u64,
}

impl RateLimitState {
    /// Create an empty rate limit state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Penalize a single worker until `until`. Never shortens an existing penalty.
    pub fn penalize(&mut self, worker: usize, until: u64) {
        let entry = self.penalized_until.entry(worker).or_insert(until);
        *entry = (*entry).max(until);
    }

    /// Record a rate limit on a proxy shared by `workers`.
    ///
    /// Returns the workers that were actually penalized.
    pub fn record_proxy_rate_limit(&mut self, workers: &[usize], until: u64) -> Vec<usize> {
        self.total_hits += 1;
        let penalized: Vec<usize> = workers.iter().copied().filter(|&w| w != 0).collect();
        for &worker in &penalized {
            self.penalize(worker, until);
        }

        tracing::warn!(
            workers = ?penalized,
            until = until,
            total_hits = self.total_hits,
            "Proxy rate limited, penalizing workers"
        );
        penalized
    }

    /// Check if a worker is currently penalized.
    pub fn is_penalized(&self, worker: usize, now: u64) -> bool {
        self.penalized_until.get(&worker).is_some_and(|&until| now < until)
    }

    /// Drop expired penalties.
    pub fn prune(&mut self, now: u64) {
        self.penalized_until.retain(|_, until| now < *until);
    }
}
