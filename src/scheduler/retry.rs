//! Bulk retry of failed iterations after a run.
//!
//! Failed iterations are never retried inline. Once a run has issued all its
//! iterations, the coordinator decides whether to schedule one more sub-run
//! covering only the failed count, up to `max_attempts` rounds.

use std::time::Duration;

use crate::config::RetryConfig;
use crate::domain::{ActiveRequest, RequestStatus};
use crate::id::humanize_ms;

/// Result of inspecting a finished run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Send the finished summary now
    Finish,
    /// Suppress the summary and rerun `failed` iterations after `delay`
    Retry { failed: u32, attempt: u32, delay: Duration },
}

#[derive(Debug, Clone)]
pub struct RetryCoordinator {
    config: RetryConfig,
    action_delay_ms: u64,
}

impl RetryCoordinator {
    pub fn new(config: RetryConfig, action_delay_ms: u64) -> Self {
        Self {
            config,
            action_delay_ms,
        }
    }

    /// Decide what happens after a run. Increments the attempt counter when retrying.
    pub fn decide(&self, request: &mut ActiveRequest) -> RetryDecision {
        if !self.config.enabled
            || request.status != RequestStatus::Active
            || request.retry_attempt >= self.config.max_attempts
            || request.failed.is_empty()
        {
            return RetryDecision::Finish;
        }

        request.retry_attempt += 1;
        RetryDecision::Retry {
            failed: request.failed.len() as u32,
            attempt: request.retry_attempt,
            delay: self.config.delay(),
        }
    }

    /// Message announcing a scheduled retry
    pub fn notice(&self, request: &ActiveRequest, failed: u32, attempt: u32) -> String {
        format!(
            "{} of the comments on {} failed. Retrying them in {} (attempt {}/{}).",
            failed,
            request.target,
            humanize_ms(self.config.delay_ms),
            attempt,
            self.config.max_attempts
        )
    }

    /// Prepare the request for a sub-run of `failed` iterations.
    ///
    /// Called after the retry delay: grows `amount`, pushes the lease forward
    /// and clears the failures of the previous run.
    pub fn prepare(&self, request: &mut ActiveRequest, failed: u32) {
        request.amount += failed;
        request.extend_until(failed as u64 * self.action_delay_ms + self.config.delay_ms);
        request.failed.clear();
        request.this_iteration = None;
    }
}
