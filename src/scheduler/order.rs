//! Worker ordering for a request.
//!
//! `get_account_order` fixes which workers a request uses; `plan_iterations`
//! expands that order into one worker per iteration, lap by lap.

use rand::seq::SliceRandom;

use crate::domain::{Rejection, Target, WorkerAccount};

fn find(workers: &[WorkerAccount], index: usize) -> Option<&WorkerAccount> {
    workers.iter().find(|w| w.index == index)
}

/// Pick and order the workers for a request.
///
/// With `check_friends`, workers able to act on the target are moved ahead of
/// limited non-friends before truncating to `needed`. If limited non-friends
/// remain in the plan, the whole plan is rejected with their profile links.
pub fn get_account_order(
    workers: &[WorkerAccount],
    available: &[usize],
    needed: usize,
    check_friends: bool,
    randomize: bool,
    target: &Target,
) -> Result<Vec<usize>, Rejection> {
    let mut order = available.to_vec();
    if randomize {
        order.shuffle(&mut rand::rng());
    }

    let can_act = |index: &usize| find(workers, *index).is_some_and(|w| w.can_act_on(&target.id));

    if check_friends {
        // Stable, so a randomized order stays random within each group
        order.sort_by_key(|i| !can_act(i));
    }
    order.truncate(needed);

    if check_friends {
        let profiles: Vec<String> = order
            .iter()
            .copied()
            .filter(|i| !can_act(i))
            .filter_map(|i| find(workers, i))
            .map(|w| w.profile_url())
            .collect();
        if !profiles.is_empty() {
            tracing::info!(target = %target, missing = profiles.len(), "Limited workers must befriend target");
            return Err(Rejection::FriendRequired { profiles });
        }
    }

    Ok(order)
}

/// Expand a worker order into one worker per iteration.
///
/// Laps repeat the order. With `randomize`, each new lap is reshuffled and the
/// worker that closed the previous lap never opens the next one. `order` is
/// left holding the order of the last lap.
pub fn plan_iterations(order: &mut [usize], run_len: u32, randomize: bool) -> Vec<usize> {
    let mut schedule = Vec::with_capacity(run_len as usize);
    if order.is_empty() {
        return schedule;
    }

    let mut rng = rand::rng();
    for i in 0..run_len as usize {
        let pos = i % order.len();
        if pos == 0 && i > 0 && randomize && order.len() > 1 {
            let last_used = order[order.len() - 1];
            order.shuffle(&mut rng);
            if order[0] == last_used {
                order.rotate_left(1);
            }
        }
        schedule.push(order[pos]);
    }
    schedule
}
