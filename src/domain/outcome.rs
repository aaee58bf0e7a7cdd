//! Request outcome types.
//!
//! This module defines why a request was refused and how a run ended.

use std::fmt;

use crate::id::humanize_ms;

/// Why a request was refused before any worker was reserved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Another request started too recently
    GlobalCooldown { remaining_ms: u64 },
    /// The requester is still cooling down from their last request
    UserCooldown { remaining_ms: u64 },
    /// The target already has an active request
    TargetBusy { target: String },
    /// Not enough free workers; `free_in_ms` estimates when enough will be
    NotEnoughWorkers {
        needed: usize,
        available: usize,
        free_in_ms: Option<u64>,
    },
    /// Enough workers are free, but too many of them are limited
    LimitedAccounts { needed: usize, eligible: usize },
    /// Limited workers in the plan must befriend the target first
    FriendRequired { profiles: Vec<String> },
}

impl Rejection {
    pub fn http_status(&self) -> u16 {
        match self {
            Rejection::GlobalCooldown { .. } | Rejection::UserCooldown { .. } => 429,
            Rejection::TargetBusy { .. } => 409,
            Rejection::NotEnoughWorkers { .. } => 503,
            Rejection::LimitedAccounts { .. } | Rejection::FriendRequired { .. } => 403,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::GlobalCooldown { remaining_ms } => write!(
                f,
                "Another request was started moments ago. Please wait {} before starting a new one.",
                humanize_ms(*remaining_ms)
            ),
            Rejection::UserCooldown { remaining_ms } => write!(
                f,
                "You requested comments recently. Please wait {} before requesting again.",
                humanize_ms(*remaining_ms)
            ),
            Rejection::TargetBusy { target } => {
                write!(f, "There is already a request running for {}. Please wait for it to finish.", target)
            }
            Rejection::NotEnoughWorkers {
                needed,
                available,
                free_in_ms,
            } => {
                write!(f, "Only {} of the {} needed accounts are available right now.", available, needed)?;
                match free_in_ms {
                    Some(ms) => write!(f, " Please try again in {}.", humanize_ms(*ms)),
                    None => write!(f, " Please try again later."),
                }
            }
            Rejection::LimitedAccounts { needed, eligible } => write!(
                f,
                "Only {} of the {} needed accounts are allowed to comment here; limited accounts cannot be used for this target.",
                eligible, needed
            ),
            Rejection::FriendRequired { profiles } => {
                write!(
                    f,
                    "Limited accounts can only comment on profiles they are friends with. Please add these accounts as friends first:"
                )?;
                for profile in profiles {
                    write!(f, "\n - {}", profile)?;
                }
                Ok(())
            }
        }
    }
}

/// How a request run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every scheduled iteration ran; `failed` survived all retry rounds
    Finished { failed: usize },
    /// The first iteration failed and the run was halted
    Failed(String),
    /// Every proxy in the plan was rate limited
    Exhausted { failed: usize },
    /// Cancelled from outside; `skipped` iterations never ran
    Aborted { skipped: usize },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Finished { failed: 0 })
    }
}
