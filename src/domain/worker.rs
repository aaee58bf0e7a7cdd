//! Worker accounts and the shared pool that holds them

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Base of the 64-bit profile ids handed out by [`WorkerAccount::new`]
const PROFILE_ID_BASE: u64 = 76561197960265728;

/// Connection state of a worker's session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Online,
    Offline,
    Error,
}

/// One controlled account able to perform the rate-limited action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerAccount {
    /// Stable index; index 0 is the main worker
    pub index: usize,
    pub name: String,
    /// Public profile id, shown to users who need to befriend this worker
    pub profile_id: String,
    pub status: WorkerStatus,
    /// Limited accounts cannot comment on non-friends or in groups
    pub limited: bool,
    /// Egress proxy this worker logged in through
    pub proxy_index: usize,
    #[serde(default)]
    pub friends: HashSet<String>,
}

impl WorkerAccount {
    /// Create an online, unlimited worker with no friends
    pub fn new(index: usize, name: &str, proxy_index: usize) -> Self {
        Self {
            index,
            name: name.to_string(),
            profile_id: (PROFILE_ID_BASE + index as u64).to_string(),
            status: WorkerStatus::Online,
            limited: false,
            proxy_index,
            friends: HashSet::new(),
        }
    }

    pub fn with_limited(mut self, limited: bool) -> Self {
        self.limited = limited;
        self
    }

    pub fn with_friend(mut self, target_id: &str) -> Self {
        self.friends.insert(target_id.to_string());
        self
    }

    pub fn with_status(mut self, status: WorkerStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_main(&self) -> bool {
        self.index == 0
    }

    pub fn is_online(&self) -> bool {
        self.status == WorkerStatus::Online
    }

    pub fn is_friend_with(&self, target_id: &str) -> bool {
        self.friends.contains(target_id)
    }

    /// Whether this worker may act on a profile without befriending it first
    pub fn can_act_on(&self, target_id: &str) -> bool {
        !self.limited || self.is_friend_with(target_id)
    }

    pub fn profile_url(&self) -> String {
        format!("https://steamcommunity.com/profiles/{}", self.profile_id)
    }
}

/// The fixed set of workers, shared between the scheduler and the session layer
///
/// The session layer updates status and friendships; the scheduler only reads
/// snapshots.
#[derive(Debug, Default)]
pub struct WorkerPool {
    workers: RwLock<Vec<WorkerAccount>>,
}

impl WorkerPool {
    /// Workers are re-indexed by position so `index` always matches the slot
    pub fn new(mut workers: Vec<WorkerAccount>) -> Self {
        for (i, worker) in workers.iter_mut().enumerate() {
            worker.index = i;
        }
        Self {
            workers: RwLock::new(workers),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<WorkerAccount>> {
        self.workers.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<WorkerAccount>> {
        self.workers.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> Vec<WorkerAccount> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<WorkerAccount> {
        self.read().get(index).cloned()
    }

    pub fn set_status(&self, index: usize, status: WorkerStatus) -> bool {
        match self.write().get_mut(index) {
            Some(worker) => {
                worker.status = status;
                true
            }
            None => false,
        }
    }

    pub fn add_friend(&self, index: usize, target_id: &str) -> bool {
        match self.write().get_mut(index) {
            Some(worker) => worker.friends.insert(target_id.to_string()),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_worker_defaults() {
        let w = WorkerAccount::new(3, "bot3", 1);
        assert_eq!(w.index, 3);
        assert_eq!(w.proxy_index, 1);
        assert!(w.is_online());
        assert!(!w.limited);
        assert!(!w.is_main());
        assert_eq!(w.profile_id, "76561197960265731");
        assert!(w.profile_url().ends_with("/76561197960265731"));
    }

    #[test]
    fn test_limited_worker_needs_friendship() {
        let w = WorkerAccount::new(1, "bot1", 0).with_limited(true);
        assert!(!w.can_act_on("target"));

        let w = w.with_friend("target");
        assert!(w.is_friend_with("target"));
        assert!(w.can_act_on("target"));
    }

    #[test]
    fn test_pool_reindexes_workers() {
        let pool = WorkerPool::new(vec![WorkerAccount::new(7, "a", 0), WorkerAccount::new(9, "b", 0)]);
        let snapshot = pool.snapshot();
        assert_eq!(snapshot[0].index, 0);
        assert_eq!(snapshot[1].index, 1);
        assert!(snapshot[0].is_main());
    }

    #[test]
    fn test_pool_updates() {
        let pool = WorkerPool::new(vec![WorkerAccount::new(0, "a", 0)]);
        assert!(pool.set_status(0, WorkerStatus::Offline));
        assert!(!pool.set_status(5, WorkerStatus::Offline));
        assert!(pool.add_friend(0, "target"));
        assert!(!pool.add_friend(0, "target"));

        let w = pool.get(0).unwrap();
        assert_eq!(w.status, WorkerStatus::Offline);
        assert!(w.is_friend_with("target"));
        assert_eq!(pool.len(), 1);
    }
}
