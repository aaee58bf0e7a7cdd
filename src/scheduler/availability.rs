//! Availability checks for new requests.
//!
//! Decides whether a request may start right now and which workers are free
//! for it. Expired registry entries are pruned as a side effect.

use std::collections::HashMap;

use crate::config::SchedulerConfig;
use crate::domain::{Rejection, Target, WorkerAccount};
use crate::scheduler::registry::{RegistryState, lock_request};

/// Workers free for a new request and how many of them it needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    /// Free worker indices, in pool order
    pub available: Vec<usize>,
    /// `min(amount, total workers)`
    pub needed: usize,
}

/// Check the global and per-user cooldowns.
///
/// `user_cooldown` is the stored timestamp of the requester's last expected action.
pub fn check_cooldowns(
    state: &RegistryState,
    user_cooldown: Option<u64>,
    now: u64,
    config: &SchedulerConfig,
) -> Result<(), Rejection> {
    if let Some(last) = state.last_request_started {
        let ends = last + config.global_cooldown_ms;
        if now < ends {
            return Err(Rejection::GlobalCooldown { remaining_ms: ends - now });
        }
    }

    if let Some(last) = user_cooldown {
        let ends = last + config.user_cooldown_ms;
        if now < ends {
            return Err(Rejection::UserCooldown { remaining_ms: ends - now });
        }
    }

    Ok(())
}

/// Compute the free workers for a request against `target`.
///
/// Rejects when the target already has an active request, when limited
/// workers are the only reason for a shortfall, or when too few workers are
/// free (with an estimate of when enough will be).
pub fn check_availability(
    state: &mut RegistryState,
    workers: &[WorkerAccount],
    target: &Target,
    amount: u32,
    exclude_limited: bool,
    now: u64,
    config: &SchedulerConfig,
) -> Result<Availability, Rejection> {
    let pruned = state.prune_expired(now, config.worker_cooldown_ms);
    if pruned > 0 {
        tracing::debug!(pruned = pruned, "Pruned expired requests");
    }

    if let Some(existing) = state.entries.get(&target.id)
        && lock_request(existing).status.is_active()
    {
        return Err(Rejection::TargetBusy {
            target: target.to_string(),
        });
    }

    let needed = (amount as usize).min(workers.len());
    if needed == 0 {
        return Err(Rejection::NotEnoughWorkers {
            needed: amount as usize,
            available: 0,
            free_in_ms: None,
        });
    }

    // Worker -> time its last reservation (lease + cooldown window) or penalty ends
    let mut blocked_until: HashMap<usize, u64> = HashMap::new();
    for entry in state.entries.values() {
        let req = lock_request(entry);
        let release = req.until + config.worker_cooldown_ms;
        for &worker in &req.accounts {
            let slot = blocked_until.entry(worker).or_insert(release);
            *slot = (*slot).max(release);
        }
    }
    for (&worker, &until) in &state.rate_limits.penalized_until {
        if now < until {
            let slot = blocked_until.entry(worker).or_insert(until);
            *slot = (*slot).max(until);
        }
    }

    let online: Vec<&WorkerAccount> = workers.iter().filter(|w| w.is_online()).collect();
    let mut available: Vec<usize> = online
        .iter()
        .filter(|w| !blocked_until.contains_key(&w.index))
        .map(|w| w.index)
        .collect();

    if exclude_limited {
        let unfiltered = available.len();
        available.retain(|&i| online.iter().any(|w| w.index == i && !w.limited));
        if available.len() < needed && unfiltered >= needed {
            return Err(Rejection::LimitedAccounts {
                needed,
                eligible: available.len(),
            });
        }
    }

    if available.len() < needed {
        let mut releases: Vec<u64> = online
            .iter()
            .filter(|w| !(exclude_limited && w.limited))
            .filter_map(|w| blocked_until.get(&w.index).copied())
            .collect();
        releases.sort_unstable();

        let missing = needed - available.len();
        let free_in_ms = releases.get(missing - 1).map(|&t| t.saturating_sub(now));

        tracing::info!(
            target = %target,
            needed = needed,
            available = available.len(),
            free_in_ms = ?free_in_ms,
            "Not enough workers available"
        );
        return Err(Rejection::NotEnoughWorkers {
            needed,
            available: available.len(),
            free_in_ms,
        });
    }

    Ok(Availability { available, needed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActiveRequest, CommentRequest, RequestStatus, WorkerStatus};
    use crate::id::now_ms;

    fn pool(n: usize) -> Vec<WorkerAccount> {
        (0..n).map(|i| WorkerAccount::new(i, &format!("bot{}", i), 0)).collect()
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            worker_cooldown_ms: 10_000,
            ..Default::default()
        }
    }

    fn reserve(state: &mut RegistryState, target: &str, accounts: Vec<usize>, until: u64, status: RequestStatus) {
        let request = CommentRequest::new("bob", Target::profile(target), accounts.len() as u32, vec!["x".into()]);
        let mut active = ActiveRequest::new(&request, accounts, 1_000);
        active.until = until;
        active.status = status;
        state.insert(active);
    }

    #[test]
    fn test_needed_is_capped_by_worker_count() {
        let workers = pool(3);
        let target = Target::profile("t");
        let now = now_ms();

        for amount in 1..=3u32 {
            let mut state = RegistryState::default();
            let result = check_availability(&mut state, &workers, &target, amount, false, now, &config()).unwrap();
            assert_eq!(result.needed, amount as usize);
        }

        let mut state = RegistryState::default();
        let result = check_availability(&mut state, &workers, &target, 10, false, now, &config()).unwrap();
        assert_eq!(result.needed, 3);
        assert_eq!(result.available, vec![0, 1, 2]);
    }

    #[test]
    fn test_active_target_is_busy() {
        let workers = pool(6);
        let now = now_ms();
        let mut state = RegistryState::default();
        reserve(&mut state, "t", vec![0, 1], now + 5_000, RequestStatus::Active);

        let err = check_availability(&mut state, &workers, &Target::profile("t"), 1, false, now, &config()).unwrap_err();
        assert!(matches!(err, Rejection::TargetBusy { .. }));
    }

    #[test]
    fn test_cooldown_entry_for_same_target_is_not_busy() {
        let workers = pool(4);
        let now = now_ms();
        let mut state = RegistryState::default();
        reserve(&mut state, "t", vec![0, 1], now, RequestStatus::Cooldown);

        let result = check_availability(&mut state, &workers, &Target::profile("t"), 2, false, now, &config()).unwrap();
        assert_eq!(result.available, vec![2, 3]);
    }

    #[test]
    fn test_held_workers_are_subtracted() {
        let workers = pool(4);
        let now = now_ms();
        let mut state = RegistryState::default();
        reserve(&mut state, "other", vec![1, 3], now + 5_000, RequestStatus::Active);

        let result = check_availability(&mut state, &workers, &Target::profile("t"), 2, false, now, &config()).unwrap();
        assert_eq!(result.available, vec![0, 2]);
    }

    #[test]
    fn test_expired_entries_are_pruned() {
        let workers = pool(2);
        let now = now_ms();
        let mut state = RegistryState::default();
        reserve(&mut state, "old", vec![0, 1], now - 20_000, RequestStatus::Cooldown);

        let result = check_availability(&mut state, &workers, &Target::profile("t"), 2, false, now, &config()).unwrap();
        assert_eq!(result.available, vec![0, 1]);
        assert!(!state.entries.contains_key("old"));
    }

    #[test]
    fn test_capacity_rejection_reports_wait() {
        let workers = pool(3);
        let now = now_ms();
        let mut state = RegistryState::default();
        reserve(&mut state, "a", vec![0], now + 1_000, RequestStatus::Active);
        reserve(&mut state, "b", vec![1], now + 30_000, RequestStatus::Active);

        let err = check_availability(&mut state, &workers, &Target::profile("t"), 2, false, now, &config()).unwrap_err();
        match err {
            Rejection::NotEnoughWorkers {
                needed,
                available,
                free_in_ms,
            } => {
                assert_eq!(needed, 2);
                assert_eq!(available, 1);
                // Worker 0 frees first: lease 1s + cooldown window 10s
                assert_eq!(free_in_ms, Some(11_000));
            }
            other => panic!("unexpected rejection: {:?}", other),
        }
    }

    #[test]
    fn test_penalized_and_offline_workers_unavailable() {
        let mut workers = pool(3);
        workers[2] = workers[2].clone().with_status(WorkerStatus::Offline);
        let now = now_ms();
        let mut state = RegistryState::default();
        state.rate_limits.penalize(1, now + 60_000);

        let result = check_availability(&mut state, &workers, &Target::profile("t"), 1, false, now, &config()).unwrap();
        assert_eq!(result.available, vec![0]);
    }

    #[test]
    fn test_limited_filter_is_eligibility_problem() {
        let mut workers = pool(3);
        workers[1] = workers[1].clone().with_limited(true);
        let now = now_ms();
        let mut state = RegistryState::default();

        let err = check_availability(&mut state, &workers, &Target::group("g"), 3, true, now, &config()).unwrap_err();
        assert_eq!(err, Rejection::LimitedAccounts { needed: 3, eligible: 2 });

        // Same pool without the filter is fine
        let result = check_availability(&mut state, &workers, &Target::profile("p"), 3, false, now, &config()).unwrap();
        assert_eq!(result.available.len(), 3);
    }

    #[test]
    fn test_limited_filter_removes_limited_workers() {
        let mut workers = pool(4);
        workers[0] = workers[0].clone().with_limited(true);
        let now = now_ms();
        let mut state = RegistryState::default();

        let result = check_availability(&mut state, &workers, &Target::group("g"), 2, true, now, &config()).unwrap();
        assert_eq!(result.available, vec![1, 2, 3]);
    }

    #[test]
    fn test_global_cooldown() {
        let now = now_ms();
        let mut state = RegistryState::default();
        state.last_request_started = Some(now - 2_000);
        let config = SchedulerConfig {
            global_cooldown_ms: 10_000,
            ..Default::default()
        };

        let err = check_cooldowns(&state, None, now, &config).unwrap_err();
        assert_eq!(err, Rejection::GlobalCooldown { remaining_ms: 8_000 });

        state.last_request_started = Some(now - 10_000);
        assert!(check_cooldowns(&state, None, now, &config).is_ok());
    }

    #[test]
    fn test_user_cooldown() {
        let now = now_ms();
        let state = RegistryState::default();
        let config = SchedulerConfig {
            user_cooldown_ms: 60_000,
            ..Default::default()
        };

        // Last action still in the future counts from there
        let err = check_cooldowns(&state, Some(now + 5_000), now, &config).unwrap_err();
        assert_eq!(err, Rejection::UserCooldown { remaining_ms: 65_000 });
        assert!(check_cooldowns(&state, Some(now - 60_000), now, &config).is_ok());
    }
}
