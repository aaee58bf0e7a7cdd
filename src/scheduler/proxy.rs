//! Proxy-scoped failure correlation.
//!
//! The remote service rate limits by IP, so once one worker behind a proxy is
//! throttled, every later iteration on that proxy is doomed for the rest of
//! the run. Those iterations are failed up front instead of being attempted.

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::{FailureEntry, FailureReason};

/// Worker planned for one iteration, with the proxy it sends through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub worker: usize,
    pub proxy: usize,
}

/// Proxies tainted during the current run
#[derive(Debug, Clone, Default)]
pub struct ProxySkipState {
    tainted: BTreeSet<usize>,
    total: usize,
}

impl ProxySkipState {
    /// Track the distinct proxies used by a run's schedule
    pub fn for_schedule(schedule: &[Assignment]) -> Self {
        let total = schedule.iter().map(|a| a.proxy).collect::<BTreeSet<_>>().len();
        Self {
            tainted: BTreeSet::new(),
            total,
        }
    }

    /// Record a tainted proxy. Returns true if it was not tainted before.
    pub fn mark(&mut self, proxy: usize) -> bool {
        self.tainted.insert(proxy)
    }

    pub fn is_tainted(&self, proxy: usize) -> bool {
        self.tainted.contains(&proxy)
    }

    /// Every proxy in the run is tainted; nothing further can succeed
    pub fn is_exhausted(&self) -> bool {
        self.total > 0 && self.tainted.len() >= self.total
    }

    pub fn tainted_count(&self) -> usize {
        self.tainted.len()
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

/// Whether an earlier iteration of this run hit an IP rate limit on `proxy`
pub fn should_skip(proxy: usize, failed: &BTreeMap<u32, FailureEntry>) -> bool {
    failed.values().any(|e| e.proxy_index == proxy && e.is_ip_rate_limit())
}

/// Fail every iteration from `from_iteration` on that is planned on `proxy`.
///
/// Existing entries are left alone. Returns the number of entries added.
pub fn mark_and_cascade(
    proxy: usize,
    from_iteration: u32,
    schedule: &[Assignment],
    failed: &mut BTreeMap<u32, FailureEntry>,
) -> usize {
    let mut added = 0;
    for (i, assignment) in schedule.iter().enumerate().skip(from_iteration as usize) {
        if assignment.proxy != proxy {
            continue;
        }
        let iteration = i as u32;
        failed.entry(iteration).or_insert_with(|| {
            added += 1;
            FailureEntry::new(
                iteration,
                assignment.worker,
                proxy,
                FailureReason::SkippedRateLimited { proxy_index: proxy },
            )
        });
    }
    added
}
