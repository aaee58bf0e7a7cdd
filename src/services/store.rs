//! Durable user cooldowns and action statistics

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::error::Result;

/// Persistent data the scheduler reads and writes.
///
/// Cooldown timestamps mark when a requester's last action is expected to run;
/// the configured user cooldown counts from there.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn user_cooldown(&self, user: &str) -> Result<Option<u64>>;

    async fn persist_user_cooldown(&self, user: &str, timestamp_ms: u64) -> Result<()>;

    async fn last_successful_action(&self) -> Result<Option<u64>>;

    async fn record_successful_action(&self, timestamp_ms: u64) -> Result<()>;
}

/// In-memory store for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    cooldowns: Mutex<HashMap<String, u64>>,
    last_success: Mutex<Option<u64>>,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn user_cooldown(&self, user: &str) -> Result<Option<u64>> {
        let cooldowns = self.cooldowns.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(cooldowns.get(user).copied())
    }

    async fn persist_user_cooldown(&self, user: &str, timestamp_ms: u64) -> Result<()> {
        let mut cooldowns = self.cooldowns.lock().unwrap_or_else(PoisonError::into_inner);
        cooldowns.insert(user.to_string(), timestamp_ms);
        Ok(())
    }

    async fn last_successful_action(&self) -> Result<Option<u64>> {
        Ok(*self.last_success.lock().unwrap_or_else(PoisonError::into_inner))
    }

    async fn record_successful_action(&self, timestamp_ms: u64) -> Result<()> {
        let mut last = self.last_success.lock().unwrap_or_else(PoisonError::into_inner);
        *last = Some(last.map_or(timestamp_ms, |prev| prev.max(timestamp_ms)));
        Ok(())
    }
}
