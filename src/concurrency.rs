//! Concurrency core (C10): cancellation tokens and the per-account FIFO
//! sync mutex.
//!
//! The global "current sync" token and the per-account mutex map are held
//! as process-wide singletons the same way `native/src/state.rs` holds
//! `NODE`/`SEED`/`STORAGE`: a `static state::Storage<RwLock<T>>`, set lazily
//! on first use and cloned out to callers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use state::Storage;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken as RawToken;

use crate::error::Cancelled;

/// Wraps `tokio_util`'s token with the `throwIfCancelled` convenience
/// spec.md §4.10 names. Cloning shares the same underlying flag, so every
/// holder observes the same cancellation.
#[derive(Debug, Clone)]
pub struct CancellationToken(RawToken);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(RawToken::new())
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    pub fn throw_if_cancelled(&self) -> Result<(), Cancelled> {
        if self.0.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    pub async fn cancelled(&self) {
        self.0.cancelled().await
    }

    /// Named to mirror spec.md's `CancellationController.cancel()`; on
    /// `tokio_util`'s token the two roles collapse into one type since any
    /// clone can cancel the shared flag.
    pub fn cancel(&self) {
        self.0.cancel();
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

static CURRENT_SYNC_TOKEN: Storage<RwLock<CancellationToken>> = Storage::new();

/// Cancels whatever sync is in flight and returns a fresh token for the new
/// one, per spec.md §4.10/§5: "calling `startNewSync` cancels the prior
/// sync".
pub fn start_new_sync() -> CancellationToken {
    let fresh = CancellationToken::new();
    match CURRENT_SYNC_TOKEN.try_get() {
        Some(slot) => {
            let mut guard = slot.write();
            guard.cancel();
            *guard = fresh.clone();
        }
        None => {
            CURRENT_SYNC_TOKEN.set(RwLock::new(fresh.clone()));
        }
    }
    fresh
}

/// Races a timer against `token`'s cancellation signal; returns `Err`
/// without sleeping the full duration if cancelled first.
pub async fn cancellable_delay(duration: std::time::Duration, token: &CancellationToken) -> Result<(), Cancelled> {
    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = token.cancelled() => Err(Cancelled),
    }
}

/// Per-account FIFO writer serialisation (spec.md §4.10, §5): two accounts
/// may sync concurrently, but two syncs of the same account queue behind
/// one another in arrival order — the guarantee `tokio::sync::Mutex`
/// already provides for its waiters.
static ACCOUNT_MUTEXES: Storage<RwLock<HashMap<i64, Arc<AsyncMutex<()>>>>> = Storage::new();

fn account_mutex(account_id: i64) -> Arc<AsyncMutex<()>> {
    if ACCOUNT_MUTEXES.try_get().is_none() {
        ACCOUNT_MUTEXES.set(RwLock::new(HashMap::new()));
    }
    let map = ACCOUNT_MUTEXES.get();

    if let Some(existing) = map.read().get(&account_id) {
        return existing.clone();
    }
    let mut write = map.write();
    write
        .entry(account_id)
        .or_insert_with(|| Arc::new(AsyncMutex::new(())))
        .clone()
}

/// A held per-account lock. Dropping it releases the next waiter in FIFO
/// order.
pub struct SyncGuard {
    _permit: tokio::sync::OwnedMutexGuard<()>,
}

/// `SyncMutex::acquire()` from spec.md §4.10.
pub async fn acquire_sync_lock(account_id: i64) -> SyncGuard {
    let mutex = account_mutex(account_id);
    let permit = mutex.lock_owned().await;
    SyncGuard { _permit: permit }
}

/// `isSyncInProgress(accountId?)` — a non-blocking probe. With no
/// `account_id` it reports whether any account currently holds its mutex.
pub fn is_sync_in_progress(account_id: Option<i64>) -> bool {
    let Some(map) = ACCOUNT_MUTEXES.try_get() else {
        return false;
    };
    let guard = map.read();
    match account_id {
        Some(id) => guard.get(&id).map(|m| m.try_lock().is_err()).unwrap_or(false),
        None => guard.values().any(|m| m.try_lock().is_err()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancellable_delay_returns_err_when_cancelled_first() {
        let token = CancellationToken::new();
        let cancel_token = token.clone();
        tokio::spawn(async move {
            cancel_token.cancel();
        });
        let result = cancellable_delay(Duration::from_secs(10), &token).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancellable_delay_completes_when_not_cancelled() {
        let token = CancellationToken::new();
        let result = cancellable_delay(Duration::from_millis(1), &token).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn sync_lock_serialises_same_account() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let order_a = order.clone();
        let task_a = tokio::spawn(async move {
            let _guard = acquire_sync_lock(42).await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            order_a.lock().push("a");
        });

        tokio::time::sleep(Duration::from_millis(5)).await;

        let order_b = order.clone();
        let task_b = tokio::spawn(async move {
            let _guard = acquire_sync_lock(42).await;
            order_b.lock().push("b");
        });

        task_a.await.unwrap();
        task_b.await.unwrap();

        assert_eq!(*order.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn different_accounts_do_not_block_each_other() {
        let guard_a = acquire_sync_lock(1).await;
        let acquired = tokio::time::timeout(Duration::from_millis(50), acquire_sync_lock(2)).await;
        assert!(acquired.is_ok());
        drop(guard_a);
    }

    #[test]
    fn start_new_sync_cancels_the_previous_token() {
        let first = start_new_sync();
        assert!(!first.is_cancelled());
        let _second = start_new_sync();
        assert!(first.is_cancelled());
    }
}
