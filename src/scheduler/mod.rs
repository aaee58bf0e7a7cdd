//! Scheduler module for admitting and executing bulk comment requests.
//!
//! This module provides:
//! - **Availability**: cooldown checks and the set of free workers for a request.
//! - **Ordering**: which workers a request uses and in what order, lap by lap.
//! - **Registry**: the shared table of active requests and worker penalties.
//! - **Execution**: fixed-rate iteration with proxy-aware failure correlation.
//! - **Retry**: bulk re-runs of failed iterations after a run completes.
//! - **RequestScheduler**: the entry point tying the above together.
//!
//! # Architecture
//!
//! 1. RequestScheduler checks cooldowns and availability under the registry lock
//! 2. The request is registered and a RequestRun is spawned for it
//! 3. The run fires one iteration per action delay and records failures
//! 4. The retry coordinator either schedules a sub-run or sends the summary
//!
//! # Example
//!
//! ```ignore
//! use botqueue::scheduler::RequestScheduler;
//!
//! let scheduler = RequestScheduler::new(config, workers, action, store);
//! scheduler.submit(request, responder).await?;
//! ```

mod availability;
mod executor;
mod manager;
mod order;
mod proxy;
mod quotes;
mod rate_limit;
mod registry;
mod retry;

pub use availability::{Availability, check_availability, check_cooldowns};
pub use executor::RequestRun;
pub use manager::{RequestScheduler, SubmitOutcome};
pub use order::{get_account_order, plan_iterations};
pub use proxy::{Assignment, ProxySkipState, mark_and_cascade, should_skip};
pub use quotes::QuoteSelector;
pub use rate_limit::RateLimitState;
pub use registry::{RegistryState, RequestRegistry, SharedRequest, lock_request};
pub use retry::{RetryCoordinator, RetryDecision};
