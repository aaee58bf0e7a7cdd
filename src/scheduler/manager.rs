//! Request scheduler for admitting and running bulk comment requests.
//!
//! The RequestScheduler is the single entry point for new requests:
//! 1. Validates the request shape
//! 2. Checks global and per-user cooldowns
//! 3. Checks worker availability and orders the workers
//! 4. Registers the request and spawns its run as an async task
//!
//! Steps 2-4 happen under one registry lock, so two concurrent submissions
//! can never both reserve the same workers or the same target.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::GlobalConfig;
use crate::domain::{ActiveRequest, CommentRequest, Rejection, RunOutcome, WorkerPool};
use crate::error::{BotqueueError, Result};
use crate::id::now_ms;
use crate::scheduler::availability::{check_availability, check_cooldowns};
use crate::scheduler::executor::RequestRun;
use crate::scheduler::order::get_account_order;
use crate::scheduler::registry::{RequestRegistry, SharedRequest, lock_request};
use crate::services::{ActionClient, DataStore, Responder};

/// Result of submitting a request.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The request was registered and its run spawned.
    Started {
        request_id: String,
        handle: JoinHandle<RunOutcome>,
    },
    /// The request was refused; the requester has already been told why.
    Rejected(Rejection),
}

impl SubmitOutcome {
    pub fn is_started(&self) -> bool {
        matches!(self, SubmitOutcome::Started { .. })
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            SubmitOutcome::Rejected(rejection) => Some(rejection),
            SubmitOutcome::Started { .. } => None,
        }
    }
}

/// RequestScheduler admits requests and owns the shared registry.
pub struct RequestScheduler<A, D>
where
    A: ActionClient,
    D: DataStore,
{
    /// Configuration.
    config: Arc<GlobalConfig>,
    /// Active and recently finished requests, plus penalties.
    registry: Arc<RequestRegistry>,
    /// The controlled accounts.
    workers: Arc<WorkerPool>,
    /// Remote action client.
    action: Arc<A>,
    /// Cooldown and statistics storage.
    store: Arc<D>,
}

impl<A, D> RequestScheduler<A, D>
where
    A: ActionClient + 'static,
    D: DataStore + 'static,
{
    /// Create a new RequestScheduler.
    pub fn new(config: GlobalConfig, workers: Arc<WorkerPool>, action: Arc<A>, store: Arc<D>) -> Self {
        Self {
            config: Arc::new(config),
            registry: Arc::new(RequestRegistry::new()),
            workers,
            action,
            store,
        }
    }

    /// Get a reference to the shared registry.
    pub fn registry(&self) -> Arc<RequestRegistry> {
        self.registry.clone()
    }

    /// Get a reference to the worker pool.
    pub fn workers(&self) -> Arc<WorkerPool> {
        self.workers.clone()
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Submit a request.
    ///
    /// Rejections are reported through `responder` with an HTTP status and
    /// returned as [`SubmitOutcome::Rejected`]. Only malformed requests and
    /// store failures are errors.
    pub async fn submit(&self, request: CommentRequest, responder: Arc<dyn Responder>) -> Result<SubmitOutcome> {
        if request.amount == 0 {
            return Err(BotqueueError::InvalidRequest("amount must be at least 1".to_string()));
        }
        if request.quotes.is_empty() {
            return Err(BotqueueError::InvalidRequest("no comment texts to pick from".to_string()));
        }

        let user_cooldown = self.store.user_cooldown(&request.requester).await?;

        let shared = match self.admit(&request, user_cooldown) {
            Ok(shared) => shared,
            Err(rejection) => {
                tracing::info!(
                    target = %request.target,
                    user = %request.requester,
                    reason = %rejection,
                    "Request rejected"
                );
                responder.respond(Some(rejection.http_status()), &rejection.to_string());
                return Ok(SubmitOutcome::Rejected(rejection));
            }
        };

        let request_id = lock_request(&shared).id.clone();
        tracing::info!(
            request = %request_id,
            target = %request.target,
            user = %request.requester,
            amount = request.amount,
            "Request accepted"
        );

        let run = RequestRun::new(
            shared,
            self.registry.clone(),
            self.workers.clone(),
            self.action.clone(),
            self.store.clone(),
            responder,
            request.quotes.clone(),
            self.config.clone(),
        );
        let handle = tokio::spawn(run.execute());

        Ok(SubmitOutcome::Started { request_id, handle })
    }

    /// Run every admission check and register the request, all under the registry lock
    fn admit(&self, request: &CommentRequest, user_cooldown: Option<u64>) -> std::result::Result<SharedRequest, Rejection> {
        let config = &self.config.scheduler;
        let workers = self.workers.snapshot();
        let now = now_ms();

        let mut state = self.registry.lock();
        check_cooldowns(&state, user_cooldown, now, config)?;

        let availability = check_availability(
            &mut state,
            &workers,
            &request.target,
            request.amount,
            request.target.excludes_limited(),
            now,
            config,
        )?;

        let accounts = get_account_order(
            &workers,
            &availability.available,
            availability.needed,
            request.target.requires_friendship(),
            config.randomize_accounts,
            &request.target,
        )?;

        state.last_request_started = Some(now);
        Ok(state.insert(ActiveRequest::new(request, accounts, config.action_delay_ms)))
    }

    /// Abort the active request for a target.
    pub fn abort(&self, target_id: &str) -> Result<()> {
        if !self.registry.abort(target_id) {
            return Err(BotqueueError::RequestNotFound(target_id.to_string()));
        }
        tracing::info!(target = target_id, "Request aborted");
        Ok(())
    }

    /// Snapshot of the registry entry for a target.
    pub fn status(&self, target_id: &str) -> Option<ActiveRequest> {
        self.registry.snapshot(target_id)
    }

    /// Snapshots of every request still issuing iterations.
    pub fn active_requests(&self) -> Vec<ActiveRequest> {
        self.registry
            .snapshots()
            .into_iter()
            .filter(|r| r.status.is_active())
            .collect()
    }

    /// Snapshots of every registry entry, oldest first.
    pub fn requests(&self) -> Vec<ActiveRequest> {
        self.registry.snapshots()
    }
}
