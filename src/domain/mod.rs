//! Domain types for botqueue
//!
//! This module contains all core domain types:
//! - WorkerAccount / WorkerPool: the controlled accounts and their proxies
//! - Target, CommentRequest, ActiveRequest: what is requested and its in-flight state
//! - FailureEntry: one failed or skipped iteration
//! - Rejection / RunOutcome: how a request was refused or how its run ended

pub mod failure;
pub mod outcome;
pub mod request;
pub mod worker;

pub use failure::{FailureEntry, FailureReason};
pub use outcome::{Rejection, RunOutcome};
pub use request::{ActiveRequest, CommentRequest, RequestStatus, Target, TargetKind};
pub use worker::{WorkerAccount, WorkerPool, WorkerStatus};
