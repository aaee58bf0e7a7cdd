//! In-memory table of active and recently finished requests.
//!
//! The map itself sits behind one mutex; every entry has its own mutex so a
//! running request can update its bookkeeping without blocking availability
//! checks for other targets. Guards must never be held across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::{ActiveRequest, RequestStatus};
use crate::scheduler::rate_limit::RateLimitState;

/// Handle to one registry entry
pub type SharedRequest = Arc<Mutex<ActiveRequest>>;

/// Lock a request entry, recovering the data if a holder panicked
pub fn lock_request(request: &SharedRequest) -> MutexGuard<'_, ActiveRequest> {
    request.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Everything guarded by the registry lock
#[derive(Debug, Default)]
pub struct RegistryState {
    /// Target id -> request entry
    pub entries: HashMap<String, SharedRequest>,
    /// Per-worker rate limit penalties
    pub rate_limits: RateLimitState,
    /// When the most recent request was accepted
    pub last_request_started: Option<u64>,
}

impl RegistryState {
    /// Register a request, replacing any finished entry for the same target
    pub fn insert(&mut self, request: ActiveRequest) -> SharedRequest {
        let key = request.target.id.clone();
        let shared = Arc::new(Mutex::new(request));
        self.entries.insert(key, shared.clone());
        shared
    }

    /// Delete entries whose lease plus the worker cooldown window has passed.
    ///
    /// Active entries are kept even when they overrun their lease.
    pub fn prune_expired(&mut self, now: u64, cooldown_window_ms: u64) -> usize {
        let before = self.entries.len();
        self.entries.retain(|target, entry| {
            let req = lock_request(entry);
            let keep = req.status.is_active() || now < req.until + cooldown_window_ms;
            if !keep {
                tracing::debug!(target = %target, request = %req.id, "Pruning expired request");
            }
            keep
        });
        self.rate_limits.prune(now);
        before - self.entries.len()
    }
}

/// Shared registry of requests, passed by `Arc` to everything that needs it
#[derive(Debug, Default)]
pub struct RequestRegistry {
    state: Mutex<RegistryState>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, target_id: &str) -> Option<SharedRequest> {
        self.lock().entries.get(target_id).cloned()
    }

    /// Whether `request` is still the registered entry for its target
    pub fn is_current(&self, target_id: &str, request: &SharedRequest) -> bool {
        self.lock()
            .entries
            .get(target_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, request))
    }

    /// Mark the active request for a target as aborted.
    ///
    /// The run notices at its next iteration; a call already in flight still completes.
    pub fn abort(&self, target_id: &str) -> bool {
        let Some(entry) = self.get(target_id) else {
            return false;
        };
        let mut req = lock_request(&entry);
        if !req.status.is_active() {
            return false;
        }
        req.status = RequestStatus::Aborted;
        tracing::info!(target = %target_id, request = %req.id, "Request aborted");
        true
    }

    pub fn remove(&self, target_id: &str) -> Option<SharedRequest> {
        self.lock().entries.remove(target_id)
    }

    pub fn snapshot(&self, target_id: &str) -> Option<ActiveRequest> {
        self.get(target_id).map(|entry| lock_request(&entry).clone())
    }

    pub fn snapshots(&self) -> Vec<ActiveRequest> {
        let entries: Vec<SharedRequest> = self.lock().entries.values().cloned().collect();
        let mut snapshots: Vec<ActiveRequest> = entries.iter().map(|e| lock_request(e).clone()).collect();
        snapshots.sort_by_key(|r| r.created_at);
        snapshots
    }

    /// Penalize the workers sharing a rate-limited proxy
    pub fn penalize_proxy(&self, workers: &[usize], until: u64) -> Vec<usize> {
        self.lock().rate_limits.record_proxy_rate_limit(workers, until)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}
