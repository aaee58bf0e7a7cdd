//! Per-iteration failure records

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::services::ActionErrorKind;

/// Why an iteration did not produce a comment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum FailureReason {
    /// The remote call returned an error
    Action { kind: ActionErrorKind, message: String },
    /// An earlier iteration on the same proxy was rate limited
    SkippedRateLimited { proxy_index: usize },
    /// The request was aborted before this iteration ran
    SkippedAborted,
    /// The planned worker is no longer in the pool
    WorkerMissing,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Action { kind, message } => write!(f, "{} ({})", message, kind.describe()),
            FailureReason::SkippedRateLimited { proxy_index } => {
                write!(f, "Skipped because of a previous rate limit on proxy {}", proxy_index)
            }
            FailureReason::SkippedAborted => write!(f, "Skipped because the request was aborted"),
            FailureReason::WorkerMissing => write!(f, "Skipped because the worker left the pool"),
        }
    }
}

/// One failed iteration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub iteration: u32,
    pub worker_index: usize,
    pub proxy_index: usize,
    pub reason: FailureReason,
}

impl FailureEntry {
    pub fn new(iteration: u32, worker_index: usize, proxy_index: usize, reason: FailureReason) -> Self {
        Self {
            iteration,
            worker_index,
            proxy_index,
            reason,
        }
    }

    /// Short label used in summaries: `i3 w1 p0`
    pub fn label(&self) -> String {
        format!("i{} w{} p{}", self.iteration, self.worker_index, self.proxy_index)
    }

    /// A real IP-level rate limit, the only failure that taints a proxy
    pub fn is_ip_rate_limit(&self) -> bool {
        matches!(
            self.reason,
            FailureReason::Action {
                kind: ActionErrorKind::IpRateLimited,
                ..
            }
        )
    }

    pub fn is_skip(&self) -> bool {
        !matches!(self.reason, FailureReason::Action { .. })
    }
}

impl fmt::Display for FailureEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.label(), self.reason)
    }
}
