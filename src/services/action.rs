//! The remote "post comment" call and its error taxonomy

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::domain::{Target, WorkerAccount};

/// Performs the rate-limited action on behalf of one worker.
///
/// Implementations own the network session of each worker; the scheduler only
/// sees success or an error string.
#[async_trait]
pub trait ActionClient: Send + Sync {
    async fn post_comment(&self, worker: &WorkerAccount, target: &Target, quote: &str) -> Result<(), ActionError>;
}

/// Error string returned by the remote service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ActionError {
    pub message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ActionErrorKind {
        ActionErrorKind::classify(&self.message)
    }
}

/// Failure classes, grouped by how the scheduler has to react
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionErrorKind {
    /// The egress IP was throttled; every worker behind the proxy is affected
    IpRateLimited,
    /// The account itself was throttled
    AccountRateLimited,
    /// The remote service returned a 5xx
    UpstreamUnavailable,
    /// The target's privacy settings forbid the action
    TargetNotEligible,
    /// The worker lacks a required security feature
    AccountIneligible,
    Unknown,
}

/// What an error does to cooldown bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyScope {
    None,
    /// Extend the request lease only
    Request,
    /// Extend the request lease and penalize every worker on the failing proxy
    Proxy,
}

const UPSTREAM_CODES: [&str; 4] = ["HTTP error 500", "HTTP error 502", "HTTP error 503", "HTTP error 504"];

impl ActionErrorKind {
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if message.contains("HTTP error 429") || lower.contains("too many requests") {
            ActionErrorKind::IpRateLimited
        } else if lower.contains("posting too frequently") {
            ActionErrorKind::AccountRateLimited
        } else if UPSTREAM_CODES.iter().any(|code| message.contains(code)) {
            ActionErrorKind::UpstreamUnavailable
        } else if lower.contains("settings on this account do not allow") {
            ActionErrorKind::TargetNotEligible
        } else if lower.contains("steam guard") {
            ActionErrorKind::AccountIneligible
        } else {
            ActionErrorKind::Unknown
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ActionErrorKind::IpRateLimited => {
                "This IP has sent too many requests. Skipping every account on this proxy for the rest of the run."
            }
            ActionErrorKind::AccountRateLimited => "This account is posting too frequently. It needs a break.",
            ActionErrorKind::UpstreamUnavailable => "The remote service may be down or having issues right now.",
            ActionErrorKind::TargetNotEligible => "The target's privacy settings do not allow comments.",
            ActionErrorKind::AccountIneligible => "This account needs Steam Guard enabled before it can comment.",
            ActionErrorKind::Unknown => "Unknown error. Please try again later.",
        }
    }

    pub fn penalty_scope(&self) -> PenaltyScope {
        match self {
            ActionErrorKind::IpRateLimited => PenaltyScope::Proxy,
            ActionErrorKind::AccountRateLimited => PenaltyScope::Request,
            _ => PenaltyScope::None,
        }
    }
}

/// One call observed by [`MockActionClient`]
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub worker_index: usize,
    pub target: String,
    pub quote: String,
    pub at: tokio::time::Instant,
}

/// Scripted action client for tests
///
/// Failures and latencies are keyed by call number (0-based, in arrival
/// order); failures can also be keyed by worker.
#[derive(Debug, Default)]
pub struct MockActionClient {
    calls: Mutex<Vec<RecordedCall>>,
    failing_calls: Mutex<HashMap<usize, String>>,
    failing_workers: Mutex<HashMap<usize, String>>,
    call_latency: Mutex<HashMap<usize, Duration>>,
    latency: Duration,
}

impl MockActionClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the nth call fail with `message`
    pub fn fail_call(&self, call: usize, message: &str) {
        self.failing_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(call, message.to_string());
    }

    /// Make the nth call take `latency` instead of the default
    pub fn delay_call(&self, call: usize, latency: Duration) {
        self.call_latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(call, latency);
    }

    /// Make every call by this worker fail with `message`
    pub fn fail_worker(&self, worker_index: usize, message: &str) {
        self.failing_workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(worker_index, message.to_string());
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[async_trait]
impl ActionClient for MockActionClient {
    async fn post_comment(&self, worker: &WorkerAccount, target: &Target, quote: &str) -> Result<(), ActionError> {
        let call = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.push(RecordedCall {
                worker_index: worker.index,
                target: target.id.clone(),
                quote: quote.to_string(),
                at: tokio::time::Instant::now(),
            });
            calls.len() - 1
        };

        let latency = self
            .call_latency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&call)
            .copied()
            .unwrap_or(self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let scripted = self
            .failing_calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&call)
            .cloned()
            .or_else(|| {
                self.failing_workers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .get(&worker.index)
                    .cloned()
            });

        match scripted {
            Some(message) => Err(ActionError::new(message)),
            None => Ok(()),
        }
    }
}

/// Action client that only logs, used by `botqueue simulate`
#[derive(Debug, Clone)]
pub struct DryRunActionClient {
    latency: Duration,
}

impl DryRunActionClient {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

#[async_trait]
impl ActionClient for DryRunActionClient {
    async fn post_comment(&self, worker: &WorkerAccount, target: &Target, quote: &str) -> Result<(), ActionError> {
        tokio::time::sleep(self.latency).await;
        tracing::info!(
            worker = %worker.name,
            proxy = worker.proxy_index,
            target = %target,
            quote = quote,
            "Dry run: would post comment"
        );
        Ok(())
    }
}
