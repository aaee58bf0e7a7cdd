//! Comment requests and their in-flight state

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::domain::failure::FailureEntry;
use crate::id::{generate_request_id, now_ms};

/// What kind of entity a request comments on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Profile,
    Group,
}

/// The profile or group a request acts on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub kind: TargetKind,
}

impl Target {
    pub fn profile(id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: TargetKind::Profile,
        }
    }

    pub fn group(id: &str) -> Self {
        Self {
            id: id.to_string(),
            kind: TargetKind::Group,
        }
    }

    /// Limited accounts cannot comment in groups at all
    pub fn excludes_limited(&self) -> bool {
        self.kind == TargetKind::Group
    }

    /// Limited accounts may comment on profiles they are friends with
    pub fn requires_friendship(&self) -> bool {
        self.kind == TargetKind::Profile
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TargetKind::Profile => write!(f, "profile {}", self.id),
            TargetKind::Group => write!(f, "group {}", self.id),
        }
    }
}

/// A validated request handed to the scheduler
#[derive(Debug, Clone)]
pub struct CommentRequest {
    /// Identity of the requesting user
    pub requester: String,
    pub target: Target,
    pub amount: u32,
    /// Comment texts to pick from
    pub quotes: Arc<[String]>,
}

impl CommentRequest {
    pub fn new(requester: &str, target: Target, amount: u32, quotes: Vec<String>) -> Self {
        Self {
            requester: requester.to_string(),
            target,
            amount,
            quotes: quotes.into(),
        }
    }
}

/// Lifecycle of a registry entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Iterations are still being issued
    Active,
    /// Finished normally; workers stay reserved until the lease expires
    Cooldown,
    /// Stopped by an unrecoverable failure
    Error,
    /// Cancelled from outside
    Aborted,
}

impl RequestStatus {
    pub fn is_active(&self) -> bool {
        *self == RequestStatus::Active
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// One in-flight or recently finished bulk request, keyed by target in the registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveRequest {
    pub id: String,
    pub status: RequestStatus,
    pub target: Target,
    pub requester: String,
    /// Amount originally requested
    pub requested: u32,
    /// Iterations scheduled so far, including retry rounds
    pub amount: u32,
    /// Planned worker order; rewritten at each lap when randomized
    pub accounts: Vec<usize>,
    /// Iteration of the current sub-run; None until the first one fires
    pub this_iteration: Option<u32>,
    pub retry_attempt: u32,
    /// Comments posted so far, across retry rounds
    pub successful: u32,
    /// Millisecond timestamp at which this request's workers become free again
    pub until: u64,
    /// Failures of the current sub-run, keyed by iteration
    pub failed: BTreeMap<u32, FailureEntry>,
    pub created_at: u64,
}

impl ActiveRequest {
    pub fn new(request: &CommentRequest, accounts: Vec<usize>, action_delay_ms: u64) -> Self {
        let now = now_ms();
        Self {
            id: generate_request_id(),
            status: RequestStatus::Active,
            target: request.target.clone(),
            requester: request.requester.clone(),
            requested: request.amount,
            amount: request.amount,
            accounts,
            this_iteration: None,
            retry_attempt: 0,
            successful: 0,
            until: now + request.amount as u64 * action_delay_ms,
            failed: BTreeMap::new(),
            created_at: now,
        }
    }

    /// Extend the lease by `ms`, never leaving it in the past
    pub fn extend_until(&mut self, ms: u64) {
        self.until = self.until.max(now_ms()) + ms;
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }

    /// Whether the run reached its first iteration yet
    pub fn has_started(&self) -> bool {
        self.this_iteration.is_some()
    }
}
