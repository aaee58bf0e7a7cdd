//! Execution of one accepted request.
//!
//! A `RequestRun` issues the request's iterations at a fixed rate anchored to
//! the start of each sub-run: iteration `i` fires at `start + delay * i`, no
//! matter how long earlier calls take. Iteration 0 of the original run is
//! awaited inline so its outcome can be reported to the requester; every
//! other iteration is spawned and completes out of order.
//!
//! After a sub-run, the [`RetryCoordinator`] decides whether the failed
//! iterations get another round or the finished summary goes out.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::GlobalConfig;
use crate::domain::{
    FailureEntry, FailureReason, RequestStatus, RunOutcome, Target, WorkerAccount, WorkerPool,
};
use crate::id::{format_timestamp, humanize_ms, now_ms};
use crate::scheduler::order::plan_iterations;
use crate::scheduler::proxy::{Assignment, ProxySkipState, mark_and_cascade, should_skip};
use crate::scheduler::quotes::QuoteSelector;
use crate::scheduler::registry::{RequestRegistry, SharedRequest, lock_request};
use crate::scheduler::retry::{RetryCoordinator, RetryDecision};
use crate::services::{ActionClient, ActionError, DataStore, PenaltyScope, Responder};

/// How a sub-run ended
#[derive(Debug)]
enum SubRun {
    /// All iterations were issued and have completed
    Completed,
    /// The request is over; no retry round follows
    Halted(RunOutcome),
}

/// Drives one registered request from its first iteration to its summary
pub struct RequestRun<A, D>
where
    A: ActionClient,
    D: DataStore,
{
    request: SharedRequest,
    target: Target,
    registry: Arc<RequestRegistry>,
    workers: Arc<WorkerPool>,
    action: Arc<A>,
    store: Arc<D>,
    responder: Arc<dyn Responder>,
    quotes: Arc<[String]>,
    config: Arc<GlobalConfig>,
}

// Derive would demand A: Clone and D: Clone
impl<A, D> Clone for RequestRun<A, D>
where
    A: ActionClient,
    D: DataStore,
{
    fn clone(&self) -> Self {
        Self {
            request: self.request.clone(),
            target: self.target.clone(),
            registry: self.registry.clone(),
            workers: self.workers.clone(),
            action: self.action.clone(),
            store: self.store.clone(),
            responder: self.responder.clone(),
            quotes: self.quotes.clone(),
            config: self.config.clone(),
        }
    }
}

impl<A, D> RequestRun<A, D>
where
    A: ActionClient + 'static,
    D: DataStore + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request: SharedRequest,
        registry: Arc<RequestRegistry>,
        workers: Arc<WorkerPool>,
        action: Arc<A>,
        store: Arc<D>,
        responder: Arc<dyn Responder>,
        quotes: Arc<[String]>,
        config: Arc<GlobalConfig>,
    ) -> Self {
        let target = lock_request(&request).target.clone();
        Self {
            request,
            target,
            registry,
            workers,
            action,
            store,
            responder,
            quotes,
            config,
        }
    }

    /// Run the request to completion, including any retry rounds.
    ///
    /// Exactly one terminal message is sent to the requester.
    pub async fn execute(self) -> RunOutcome {
        let retry = RetryCoordinator::new(self.config.retry.clone(), self.config.scheduler.action_delay_ms);
        let mut run_len = lock_request(&self.request).amount;

        loop {
            if let SubRun::Halted(outcome) = self.run_once(run_len).await {
                return outcome;
            }

            let decision = retry.decide(&mut lock_request(&self.request));
            match decision {
                RetryDecision::Finish => return self.finish(),
                RetryDecision::Retry { failed, attempt, delay } => {
                    let notice = retry.notice(&lock_request(&self.request), failed, attempt);
                    tracing::info!(target = %self.target, failed, attempt, "Scheduling retry round");
                    self.responder.respond(None, &notice);

                    tokio::time::sleep(delay).await;
                    retry.prepare(&mut lock_request(&self.request), failed);
                    run_len = failed;
                }
            }
        }
    }

    /// Issue `run_len` iterations at the configured rate
    async fn run_once(&self, run_len: u32) -> SubRun {
        let randomize = self.config.scheduler.randomize_accounts;
        let (planned, first_run) = {
            let mut req = lock_request(&self.request);
            let planned = plan_iterations(&mut req.accounts, run_len, randomize);
            (planned, req.retry_attempt == 0)
        };

        let pool = self.workers.snapshot();
        let find = |index: usize| pool.iter().find(|w| w.index == index);
        let schedule: Vec<Assignment> = planned
            .iter()
            .map(|&worker| Assignment {
                worker,
                proxy: find(worker).map(|w| w.proxy_index).unwrap_or_default(),
            })
            .collect();

        let mut skip = ProxySkipState::for_schedule(&schedule);
        let mut quotes = QuoteSelector::new(self.config.scheduler.quote_history);
        let mut in_flight = JoinSet::new();
        let delay = self.config.scheduler.action_delay();
        let mut start = Instant::now();

        tracing::info!(
            target = %self.target,
            iterations = run_len,
            proxies = skip.total(),
            retry = !first_run,
            "Starting run"
        );

        for (i, assignment) in schedule.iter().enumerate() {
            let iteration = i as u32;
            tokio::time::sleep_until(start + delay * iteration).await;

            if !self.is_live() {
                let skipped = self.record_aborted(iteration, &schedule);
                drain(&mut in_flight).await;
                self.respond_aborted(skipped);
                return SubRun::Halted(RunOutcome::Aborted { skipped });
            }
            lock_request(&self.request).this_iteration = Some(iteration);

            if self.skip_for_proxy(iteration, assignment, &schedule, &mut skip) {
                if skip.is_exhausted() {
                    drain(&mut in_flight).await;
                    let failed = self.respond_exhausted();
                    return SubRun::Halted(RunOutcome::Exhausted { failed });
                }
                continue;
            }

            let Some(worker) = find(assignment.worker).cloned() else {
                self.record_missing_worker(iteration, assignment);
                if iteration == 0 && first_run {
                    return SubRun::Halted(self.fail_missing_first(assignment.worker));
                }
                continue;
            };
            let quote = quotes.next(&self.quotes).unwrap_or_default();

            if iteration == 0 && first_run {
                let result = self.action.post_comment(&worker, &self.target, &quote).await;
                if let Some(outcome) = self.complete_first(&worker, result).await {
                    return SubRun::Halted(outcome);
                }
                // A slow first call pushes the rest of the schedule back
                let resumed = Instant::now();
                if resumed > start + delay {
                    start = resumed - delay;
                }
            } else {
                let run = self.clone();
                in_flight.spawn(async move { run.complete_iteration(iteration, worker, quote).await });
            }
        }

        drain(&mut in_flight).await;
        SubRun::Completed
    }

    /// Whether the run may keep issuing iterations
    fn is_live(&self) -> bool {
        self.registry.is_current(&self.target.id, &self.request)
            && lock_request(&self.request).status != RequestStatus::Aborted
    }

    /// Skip the iteration when its proxy is rate limited, cascading on first sight
    fn skip_for_proxy(
        &self,
        iteration: u32,
        assignment: &Assignment,
        schedule: &[Assignment],
        skip: &mut ProxySkipState,
    ) -> bool {
        let proxy = assignment.proxy;
        let mut req = lock_request(&self.request);
        if !skip.is_tainted(proxy) && !should_skip(proxy, &req.failed) {
            return false;
        }

        if skip.mark(proxy) {
            let added = mark_and_cascade(proxy, iteration, schedule, &mut req.failed);
            tracing::warn!(
                target = %self.target,
                proxy,
                iteration,
                skipped = added,
                tainted = skip.tainted_count(),
                total = skip.total(),
                "Proxy rate limited, skipping its remaining iterations"
            );
        } else {
            req.failed.entry(iteration).or_insert_with(|| {
                FailureEntry::new(
                    iteration,
                    assignment.worker,
                    proxy,
                    FailureReason::SkippedRateLimited { proxy_index: proxy },
                )
            });
        }
        true
    }

    /// Handle iteration 0 of the original run. Returns an outcome if the run ends here.
    async fn complete_first(&self, worker: &WorkerAccount, result: Result<(), ActionError>) -> Option<RunOutcome> {
        if let Err(err) = result {
            self.record_failure(0, worker, &err);
            let last = match self.store.last_successful_action().await {
                Ok(last) => last,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read last successful action");
                    None
                }
            };
            lock_request(&self.request).status = RequestStatus::Error;

            let message = format!(
                "Error while commenting on {}: {}\n{}\n\nLast successful comment: {}",
                self.target,
                err,
                err.kind().describe(),
                last.map(format_timestamp).unwrap_or_else(|| "unknown".to_string())
            );
            tracing::error!(target = %self.target, worker = worker.index, error = %err, "First iteration failed, halting");
            self.responder.respond(Some(500), &message);
            return Some(RunOutcome::Failed(err.message));
        }

        self.record_success().await;

        let (amount, accounts, requester) = {
            let req = lock_request(&self.request);
            (req.amount, req.accounts.len(), req.requester.clone())
        };
        let delay_ms = self.config.scheduler.action_delay_ms;
        let cooldown_at = now_ms() + (amount as u64).saturating_sub(1) * delay_ms;
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.persist_user_cooldown(&requester, cooldown_at).await {
                tracing::warn!(user = %requester, error = %e, "Failed to persist user cooldown");
            }
        });

        if amount == 1 {
            lock_request(&self.request).status = RequestStatus::Cooldown;
            self.responder
                .respond(Some(200), &format!("Okay, I commented on {}!", self.target));
            return Some(RunOutcome::Finished { failed: 0 });
        }

        self.responder.respond(
            Some(200),
            &format!(
                "Okay, I will comment {} times on {} using {} accounts. This will take about {}.",
                amount,
                self.target,
                accounts,
                humanize_ms((amount as u64 - 1) * delay_ms)
            ),
        );
        None
    }

    async fn complete_iteration(&self, iteration: u32, worker: WorkerAccount, quote: String) {
        match self.action.post_comment(&worker, &self.target, &quote).await {
            Ok(()) => {
                tracing::debug!(target = %self.target, iteration, worker = worker.index, "Comment posted");
                self.record_success().await;
            }
            Err(err) => {
                tracing::warn!(
                    target = %self.target,
                    iteration,
                    worker = worker.index,
                    proxy = worker.proxy_index,
                    error = %err,
                    hint = err.kind().describe(),
                    "Comment failed"
                );
                self.record_failure(iteration, &worker, &err);
            }
        }
    }

    async fn record_success(&self) {
        lock_request(&self.request).successful += 1;
        if let Err(e) = self.store.record_successful_action(now_ms()).await {
            tracing::warn!(error = %e, "Failed to record successful action");
        }
    }

    /// Record a failed call and apply the penalty its error class carries
    fn record_failure(&self, iteration: u32, worker: &WorkerAccount, err: &ActionError) {
        let kind = err.kind();
        let penalty_ms = self.config.scheduler.rate_limit_penalty_ms;
        {
            let mut req = lock_request(&self.request);
            req.failed.insert(
                iteration,
                FailureEntry::new(
                    iteration,
                    worker.index,
                    worker.proxy_index,
                    FailureReason::Action {
                        kind,
                        message: err.message.clone(),
                    },
                ),
            );
            if kind.penalty_scope() != PenaltyScope::None {
                req.until += penalty_ms;
            }
        }

        // Entry guard is released; the registry lock is always taken first
        if kind.penalty_scope() == PenaltyScope::Proxy {
            let sharing: Vec<usize> = self
                .workers
                .snapshot()
                .iter()
                .filter(|w| w.proxy_index == worker.proxy_index)
                .map(|w| w.index)
                .collect();
            self.registry.penalize_proxy(&sharing, now_ms() + penalty_ms);
        }
    }

    fn record_missing_worker(&self, iteration: u32, assignment: &Assignment) {
        tracing::warn!(target = %self.target, worker = assignment.worker, iteration, "Planned worker left the pool");
        lock_request(&self.request).failed.insert(
            iteration,
            FailureEntry::new(iteration, assignment.worker, assignment.proxy, FailureReason::WorkerMissing),
        );
    }

    /// Halt when the worker planned for the first iteration is gone
    fn fail_missing_first(&self, worker: usize) -> RunOutcome {
        lock_request(&self.request).status = RequestStatus::Error;
        let reason = format!("worker {} is no longer in the pool", worker);
        tracing::error!(target = %self.target, worker, "First iteration has no worker, halting");
        self.responder.respond(
            Some(500),
            &format!("Error while commenting on {}: {}", self.target, reason),
        );
        RunOutcome::Failed(reason)
    }

    /// Fail every remaining iteration of the sub-run as aborted
    fn record_aborted(&self, from: u32, schedule: &[Assignment]) -> usize {
        let mut req = lock_request(&self.request);
        for (i, assignment) in schedule.iter().enumerate().skip(from as usize) {
            let iteration = i as u32;
            req.failed.entry(iteration).or_insert_with(|| {
                FailureEntry::new(iteration, assignment.worker, assignment.proxy, FailureReason::SkippedAborted)
            });
        }
        schedule.len().saturating_sub(from as usize)
    }

    fn respond_aborted(&self, skipped: usize) {
        let posted = lock_request(&self.request).successful;
        tracing::info!(target = %self.target, posted, skipped, "Run aborted");
        self.responder.respond(
            None,
            &format!(
                "Aborted commenting on {}. {} comments were posted, {} were skipped.",
                self.target, posted, skipped
            ),
        );
    }

    fn respond_exhausted(&self) -> usize {
        let (message, failed) = {
            let mut req = lock_request(&self.request);
            req.status = RequestStatus::Error;
            let mut message = format!(
                "Stopped commenting on {}: every proxy is rate limited. {} comments were posted, {} failed.",
                self.target,
                req.successful,
                req.failed_count()
            );
            append_failures(&mut message, &req.failed);
            (message, req.failed_count())
        };
        tracing::error!(target = %self.target, failed, "All proxies rate limited, halting");
        self.responder.respond(None, &message);
        failed
    }

    /// Send the finished summary and release the request into cooldown
    fn finish(&self) -> RunOutcome {
        let (message, failed) = {
            let mut req = lock_request(&self.request);
            if req.status.is_active() {
                req.status = RequestStatus::Cooldown;
            }
            let mut message = format!(
                "Finished commenting {} times on {}. {} of them failed.",
                req.requested,
                self.target,
                req.failed_count()
            );
            append_failures(&mut message, &req.failed);
            (message, req.failed_count())
        };
        tracing::info!(target = %self.target, failed, "Run finished");
        self.responder.respond(None, &message);
        RunOutcome::Finished { failed }
    }
}

fn append_failures(message: &mut String, failed: &BTreeMap<u32, FailureEntry>) {
    for entry in failed.values() {
        message.push('\n');
        message.push_str(&entry.to_string());
    }
}

/// Wait for every spawned iteration
async fn drain(in_flight: &mut JoinSet<()>) {
    while let Some(result) = in_flight.join_next().await {
        if let Err(e) = result {
            tracing::error!(error = %e, "Iteration task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryConfig, SchedulerConfig};
    use crate::domain::{ActiveRequest, CommentRequest};
    use crate::services::{MemoryDataStore, MockActionClient, RecordingResponder};
    use std::time::Duration;

    struct Harness {
        registry: Arc<RequestRegistry>,
        action: Arc<MockActionClient>,
        store: Arc<MemoryDataStore>,
        responder: Arc<RecordingResponder>,
        request: SharedRequest,
        run: RequestRun<MockActionClient, MemoryDataStore>,
    }

    fn config(retry: RetryConfig) -> GlobalConfig {
        GlobalConfig {
            scheduler: SchedulerConfig {
                action_delay_ms: 1_000,
                ..SchedulerConfig::default()
            },
            retry,
            ..GlobalConfig::default()
        }
    }

    fn harness(workers: Vec<WorkerAccount>, amount: u32, retry: RetryConfig) -> Harness {
        harness_with(workers, amount, retry, MockActionClient::new())
    }

    fn harness_with(workers: Vec<WorkerAccount>, amount: u32, retry: RetryConfig, action: MockActionClient) -> Harness {
        let pool = Arc::new(WorkerPool::new(workers));
        let accounts: Vec<usize> = pool.snapshot().iter().map(|w| w.index).collect();
        let comment = CommentRequest::new("alice", Target::profile("target"), amount, vec!["a".into(), "b".into()]);
        let registry = Arc::new(RequestRegistry::new());
        let request = registry
            .lock()
            .insert(ActiveRequest::new(&comment, accounts, 1_000));
        let action = Arc::new(action);
        let store = Arc::new(MemoryDataStore::new());
        let responder = Arc::new(RecordingResponder::new());
        let run = RequestRun::new(
            request.clone(),
            registry.clone(),
            pool,
            action.clone(),
            store.clone(),
            responder.clone(),
            comment.quotes.clone(),
            Arc::new(config(retry)),
        );
        Harness {
            registry,
            action,
            store,
            responder,
            request,
            run,
        }
    }

    fn workers(n: usize) -> Vec<WorkerAccount> {
        (0..n).map(|i| WorkerAccount::new(i, &format!("bot{}", i), 0)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_comment() {
        let h = harness(workers(3), 1, RetryConfig::default());
        let outcome = h.run.clone().execute().await;

        assert_eq!(outcome, RunOutcome::Finished { failed: 0 });
        assert_eq!(h.action.call_count(), 1);
        assert_eq!(lock_request(&h.request).status, RequestStatus::Cooldown);
        assert_eq!(
            h.responder.messages(),
            vec![(Some(200), "Okay, I commented on profile target!".to_string())]
        );
        assert!(h.store.last_successful_action().await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_iterations_fire_at_fixed_rate() {
        let h = harness(workers(3), 5, RetryConfig::default());
        let start = Instant::now();
        let outcome = h.run.clone().execute().await;

        assert_eq!(outcome, RunOutcome::Finished { failed: 0 });
        let calls = h.action.calls();
        let workers: Vec<usize> = calls.iter().map(|c| c.worker_index).collect();
        assert_eq!(workers, vec![0, 1, 2, 0, 1]);
        for (i, call) in calls.iter().enumerate() {
            assert_eq!(call.at - start, Duration::from_secs(i as u64));
        }
        assert_eq!(lock_request(&h.request).successful, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_first_call_delays_rest_of_schedule() {
        let action = MockActionClient::new().with_latency(Duration::from_millis(2_500));
        let h = harness_with(workers(3), 5, RetryConfig::default(), action);
        let start = Instant::now();
        let outcome = h.run.clone().execute().await;

        assert_eq!(outcome, RunOutcome::Finished { failed: 0 });
        let issued: Vec<Duration> = h.action.calls().iter().map(|c| c.at - start).collect();
        assert_eq!(
            issued,
            [0, 2_500, 3_500, 4_500, 5_500].map(Duration::from_millis).to_vec()
        );
        for gap in issued.windows(2) {
            assert!(gap[1] - gap[0] >= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_worker_recorded_as_failure() {
        let h = harness(workers(2), 3, RetryConfig::default());
        lock_request(&h.request).accounts = vec![0, 7];

        let outcome = h.run.clone().execute().await;

        assert_eq!(outcome, RunOutcome::Finished { failed: 1 });
        assert_eq!(h.action.call_count(), 2);
        let req = lock_request(&h.request);
        assert_eq!(req.failed[&1].reason, FailureReason::WorkerMissing);
        assert_eq!(req.failed[&1].worker_index, 7);
        assert!(h.responder.texts().last().unwrap().contains("1 of them failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_first_worker_halts() {
        let h = harness(workers(2), 3, RetryConfig::default());
        lock_request(&h.request).accounts = vec![7, 0];

        let outcome = h.run.clone().execute().await;

        assert_eq!(outcome, RunOutcome::Failed("worker 7 is no longer in the pool".to_string()));
        assert_eq!(h.action.call_count(), 0);
        let req = lock_request(&h.request);
        assert_eq!(req.status, RequestStatus::Error);
        assert_eq!(req.failed[&0].reason, FailureReason::WorkerMissing);
        let messages = h.responder.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, Some(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_iteration_error_halts() {
        let h = harness(workers(3), 4, RetryConfig::default());
        h.action.fail_call(0, "HTTP error 503");

        let outcome = h.run.clone().execute().await;

        assert_eq!(outcome, RunOutcome::Failed("HTTP error 503".to_string()));
        assert_eq!(h.action.call_count(), 1);
        assert_eq!(lock_request(&h.request).status, RequestStatus::Error);
        let messages = h.responder.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, Some(500));
        assert!(messages[0].1.contains("Last successful comment: unknown"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_account_rate_limit_extends_lease() {
        let h = harness(workers(2), 3, RetryConfig::default());
        h.action.fail_call(1, "You've been posting too frequently");
        let until_before = lock_request(&h.request).until;

        let outcome = h.run.clone().execute().await;

        assert_eq!(outcome, RunOutcome::Finished { failed: 1 });
        let req = lock_request(&h.request);
        assert!(req.until >= until_before + SchedulerConfig::default().rate_limit_penalty_ms);
        assert!(!req.failed[&1].is_skip());
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_proxies_rate_limited_stops_run() {
        let h = harness(workers(2), 6, RetryConfig::default());
        h.action.fail_call(1, "HTTP error 429");

        let outcome = h.run.clone().execute().await;

        // Every worker shares proxy 0, so one rate limit exhausts the plan
        assert_eq!(outcome, RunOutcome::Exhausted { failed: 5 });
        assert_eq!(h.action.call_count(), 2);
        assert_eq!(lock_request(&h.request).status, RequestStatus::Error);
        let last = h.responder.texts().pop().unwrap();
        assert!(last.contains("every proxy is rate limited"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_removed_entry_stops_run() {
        let h = harness(workers(2), 4, RetryConfig::default());
        let registry = h.registry.clone();
        let handle = tokio::spawn(h.run.clone().execute());

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        registry.remove("target");

        assert_eq!(handle.await.unwrap(), RunOutcome::Aborted { skipped: 2 });
        assert_eq!(h.action.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_round_recovers_failure() {
        let retry = RetryConfig {
            enabled: true,
            max_attempts: 2,
            delay_ms: 60_000,
        };
        let h = harness(workers(2), 3, retry);
        h.action.fail_call(2, "HTTP error 500");

        let outcome = h.run.clone().execute().await;

        assert_eq!(outcome, RunOutcome::Finished { failed: 0 });
        assert_eq!(h.action.call_count(), 4);
        let req = lock_request(&h.request);
        assert_eq!(req.retry_attempt, 1);
        assert_eq!(req.amount, 4);
        assert_eq!(req.successful, 3);
        let texts = h.responder.texts();
        assert!(texts.iter().any(|t| t.contains("attempt 1/2")));
        assert!(texts.last().unwrap().contains("0 of them failed"));
    }
}
