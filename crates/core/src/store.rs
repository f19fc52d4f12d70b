//! Watchlist persistence boundary.

use crate::{StoreError, WatchEntry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Loads and saves a user's watchlist.
#[async_trait]
pub trait WatchlistStore: Send + Sync {
    /// Load the watchlist saved for `user_key`. Unknown users have an empty list.
    async fn load(&self, user_key: &str) -> Result<Vec<WatchEntry>, StoreError>;

    /// Replace the watchlist saved for `user_key`.
    async fn save(&self, user_key: &str, entries: &[WatchEntry]) -> Result<(), StoreError>;
}

/// Process-local store, used by tests and when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryWatchlistStore {
    lists: RwLock<HashMap<String, Vec<WatchEntry>>>,
}

impl MemoryWatchlistStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WatchlistStore for MemoryWatchlistStore {
    async fn load(&self, user_key: &str) -> Result<Vec<WatchEntry>, StoreError> {
        let lists = self
            .lists
            .read()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(lists.get(user_key).cloned().unwrap_or_default())
    }

    async fn save(&self, user_key: &str, entries: &[WatchEntry]) -> Result<(), StoreError> {
        let mut lists = self
            .lists
            .write()
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        lists.insert(user_key.to_string(), entries.to_vec());
        Ok(())
    }
}
