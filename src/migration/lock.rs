// Per-token exclusion. Two layers:
//
// - an in-process set, checked-and-inserted under one mutex guard, so two
//   tasks in the same process can never both observe "unlocked";
// - a persisted flag plus lease timestamp on the row, so a restarted process
//   honors a live holder and reclaims a crashed one after the lease expires.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::store::{StoreError, TokenStore};
use crate::token::{Mint, Token, TokenPatch};

pub struct MigrationLockManager {
    store: Arc<dyn TokenStore>,
    in_flight: Mutex<HashSet<Mint>>,
    lease: chrono::Duration,
}

impl MigrationLockManager {
    pub fn new(store: Arc<dyn TokenStore>, lease: chrono::Duration) -> Self {
        MigrationLockManager {
            store,
            in_flight: Mutex::new(HashSet::new()),
            lease,
        }
    }

    /// Try to take exclusive ownership of `token`. Returns the re-persisted
    /// row on success, `None` if another holder is live. A persisted lock
    /// whose lease has expired belongs to a crashed worker and is reclaimed.
    pub async fn acquire(&self, token: &Token) -> Result<Option<Token>, StoreError> {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if in_flight.contains(&token.mint) {
                return Ok(None);
            }
            if token.migration.lock_is_held(self.lease) {
                return Ok(None);
            }
            in_flight.insert(token.mint.clone());
        }

        if token.migration.lock_is_stale(self.lease) {
            warn!(mint = %token.mint, "Reclaiming stale migration lock");
        }

        let mut migration = token.migration.clone();
        migration.lock = true;
        migration.locked_at = Some(chrono::Utc::now());

        match self
            .store
            .update(&token.mint, TokenPatch::migration(migration))
            .await
        {
            Ok(updated) => {
                info!(mint = %token.mint, "Acquired migration lock");
                Ok(Some(updated))
            }
            Err(err) => {
                self.forget(&token.mint);
                Err(err)
            }
        }
    }

    /// Clear both layers unconditionally. Safe to call when not held.
    pub async fn release(&self, token: &Token) -> Result<(), StoreError> {
        self.forget(&token.mint);

        let mut migration = token.migration.clone();
        migration.lock = false;
        migration.locked_at = None;
        self.store
            .update(&token.mint, TokenPatch::migration(migration))
            .await?;
        info!(mint = %token.mint, "Released migration lock");
        Ok(())
    }

    /// Drop only the in-process guard. Used by callers that persist the
    /// cleared flag themselves as part of a larger write.
    pub fn forget(&self, mint: &Mint) {
        self.in_flight.lock().unwrap().remove(mint);
    }

    pub fn holds_in_process(&self, mint: &Mint) -> bool {
        self.in_flight.lock().unwrap().contains(mint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTokenStore;

    fn lease() -> chrono::Duration {
        chrono::Duration::seconds(300)
    }

    async fn seeded_store() -> (Arc<MemoryTokenStore>, Token) {
        let store = Arc::new(MemoryTokenStore::new());
        let token = Token::new("MintA", "Token A", "TKA", "creator-1");
        store.insert(token.clone()).await.unwrap();
        (store, token)
    }

    #[tokio::test]
    async fn acquire_then_second_acquire_fails() {
        let (store, token) = seeded_store().await;
        let manager = MigrationLockManager::new(store, lease());

        let held = manager.acquire(&token).await.unwrap().unwrap();
        assert!(held.migration.lock);
        assert!(held.migration.locked_at.is_some());
        assert!(manager.holds_in_process(&token.mint));

        assert!(manager.acquire(&held).await.unwrap().is_none());
        // The original pre-acquire snapshot is equally refused.
        assert!(manager.acquire(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn release_allows_reacquire() {
        let (store, token) = seeded_store().await;
        let manager = MigrationLockManager::new(store.clone(), lease());

        let held = manager.acquire(&token).await.unwrap().unwrap();
        manager.release(&held).await.unwrap();
        assert!(!manager.holds_in_process(&token.mint));

        let reloaded = store.get(&token.mint).await.unwrap().unwrap();
        assert!(!reloaded.migration.lock);
        assert!(manager.acquire(&reloaded).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn stale_persisted_lock_is_reclaimed() {
        let (store, mut token) = seeded_store().await;
        // Simulate a crashed worker: persisted flag held, lease long expired,
        // no in-process guard.
        token.migration.lock = true;
        token.migration.locked_at = Some(chrono::Utc::now() - chrono::Duration::hours(2));
        store.insert(token.clone()).await.unwrap();

        let manager = MigrationLockManager::new(store, lease());
        let held = manager.acquire(&token).await.unwrap();
        assert!(held.is_some());
    }

    #[tokio::test]
    async fn fresh_persisted_lock_is_honored_across_managers() {
        let (store, token) = seeded_store().await;
        let first = MigrationLockManager::new(store.clone(), lease());
        let held = first.acquire(&token).await.unwrap().unwrap();

        // A different manager (fresh process) sees the persisted lease.
        let second = MigrationLockManager::new(store, lease());
        assert!(second.acquire(&held).await.unwrap().is_none());
    }
}
