//! Pending-spend engine (C5): the three-state (unspent/pending/spent)
//! machine around broadcast, built on top of [`crate::store::Store`]'s raw
//! CAS updates.
//!
//! `Store` already enforces the CAS semantics at the SQL layer (`UPDATE ...
//! WHERE spending_status = 'unspent'`); this module adds the
//! conflict-detection contract spec.md §4.5 requires of the caller: if any
//! outpoint fails to transition, the whole batch is a
//! [`crate::error::BuilderError::CoinSelectionConflict`] and the caller must
//! abort before broadcasting.

use crate::error::{BuilderError, StoreError};
use crate::store::models::{SpentTxid, Utxo};
use crate::store::Store;

/// Five minutes, in milliseconds — the window after which a pending row with
/// no confirmation is assumed to belong to a crashed broadcast (spec.md
/// §3, §4.5).
pub const STUCK_PENDING_TIMEOUT_MS: i64 = 5 * 60 * 1000;

pub type Outpoint = (String, u32);

/// `markPending` from spec.md §4.5. Returns `Ok(())` only if every outpoint
/// transitioned; otherwise the already-transitioned rows are rolled back
/// before returning the conflict, so a failed call never leaves a partial
/// pending set behind.
pub fn mark_pending(
    store: &Store,
    account_id: i64,
    outpoints: &[Outpoint],
    pending_txid: &str,
    now_ms: i64,
) -> Result<(), BuilderError> {
    let updated = store
        .mark_pending(account_id, outpoints, pending_txid, now_ms)
        .map_err(store_err_to_builder)?;

    if updated != outpoints.len() {
        store
            .rollback_pending(account_id, outpoints)
            .map_err(store_err_to_builder)?;

        let (txid, vout) = outpoints
            .first()
            .cloned()
            .unwrap_or_else(|| ("unknown".to_string(), 0));
        tracing::warn!(accountId = account_id, pendingTxid = pending_txid, "coin selection conflict");
        return Err(BuilderError::CoinSelectionConflict { txid, vout });
    }

    Ok(())
}

/// `confirmSpent` from spec.md §4.5: `pending -> spent`.
pub fn confirm_spent(
    store: &Store,
    account_id: i64,
    outpoints: &[Outpoint],
    spending_txid: &str,
    now_ms: i64,
) -> Result<(), StoreError> {
    store.confirm_spent(account_id, outpoints, spending_txid, now_ms)
}

/// `rollback` from spec.md §4.5: `pending -> unspent`, touching only rows
/// still pending.
pub fn rollback(store: &Store, account_id: i64, outpoints: &[Outpoint]) -> Result<(), StoreError> {
    store.rollback_pending(account_id, outpoints)
}

/// Stuck-pending recovery, run at the start of every sync (spec.md §3,
/// §4.5): any row pending since before `now_ms - STUCK_PENDING_TIMEOUT_MS`
/// is rolled back to unspent.
pub fn recover_stuck_pending(store: &Store, account_id: i64, now_ms: i64) -> Result<usize, StoreError> {
    let cutoff = now_ms - STUCK_PENDING_TIMEOUT_MS;
    let rolled_back = store.rollback_stuck_pending(account_id, cutoff)?;
    if rolled_back > 0 {
        tracing::info!(accountId = account_id, rolled_back, "recovered stuck-pending UTXOs");
    }
    Ok(rolled_back)
}

/// `getSpendableUTXOs` from spec.md §4.5 — the sole coin-selection entry
/// point; every call site that selects inputs for a new transaction must go
/// through this.
pub fn spendable_utxos(store: &Store, account_id: i64) -> Result<Vec<Utxo>, StoreError> {
    store.get_spendable_utxos(account_id)
}

/// Marks a UTXO spent with the "unknown" sentinel when reconciliation
/// observed it disappear but can't attribute the spend to a txid (spec.md
/// §9 open question).
pub fn mark_spent_unknown(store: &Store, utxo_id: i64, now_ms: i64) -> Result<(), StoreError> {
    store.mark_utxo_spent(utxo_id, &SpentTxid::Unknown, now_ms)
}

fn store_err_to_builder(e: StoreError) -> BuilderError {
    BuilderError::BroadcastRejected(format!("store error during pending-spend transition: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::Basket;

    fn store_with_utxo() -> Store {
        let store = Store::open_in_memory().unwrap();
        store
            .insert_utxo(1, "abc", 0, 1_000, "", "addr1", Basket::Default, &[], 0)
            .unwrap();
        store
    }

    #[test]
    fn mark_pending_then_confirm_removes_from_spendable_set() {
        let store = store_with_utxo();
        let outpoints = vec![("abc".to_string(), 0u32)];
        mark_pending(&store, 1, &outpoints, "tx1", 0).unwrap();
        confirm_spent(&store, 1, &outpoints, "tx1", 10).unwrap();
        assert!(spendable_utxos(&store, 1).unwrap().is_empty());
    }

    #[test]
    fn conflicting_outpoint_rolls_back_the_whole_batch() {
        let store = store_with_utxo();
        let outpoints = vec![("abc".to_string(), 0u32), ("missing".to_string(), 1u32)];
        let result = mark_pending(&store, 1, &outpoints, "tx1", 0);
        assert!(matches!(result, Err(BuilderError::CoinSelectionConflict { .. })));
        // The real outpoint must not be left pending after the conflict.
        assert_eq!(spendable_utxos(&store, 1).unwrap().len(), 1);
    }

    #[test]
    fn rollback_restores_spendability() {
        let store = store_with_utxo();
        let outpoints = vec![("abc".to_string(), 0u32)];
        mark_pending(&store, 1, &outpoints, "tx1", 0).unwrap();
        rollback(&store, 1, &outpoints).unwrap();
        assert_eq!(spendable_utxos(&store, 1).unwrap().len(), 1);
    }

    #[test]
    fn stuck_pending_older_than_timeout_is_recovered() {
        let store = store_with_utxo();
        let outpoints = vec![("abc".to_string(), 0u32)];
        mark_pending(&store, 1, &outpoints, "tx1", 1_000).unwrap();
        let now = 1_000 + STUCK_PENDING_TIMEOUT_MS + 1;
        let rolled = recover_stuck_pending(&store, 1, now).unwrap();
        assert_eq!(rolled, 1);
        assert_eq!(spendable_utxos(&store, 1).unwrap().len(), 1);
    }

    #[test]
    fn fresh_pending_is_not_recovered() {
        let store = store_with_utxo();
        let outpoints = vec![("abc".to_string(), 0u32)];
        mark_pending(&store, 1, &outpoints, "tx1", 1_000).unwrap();
        let rolled = recover_stuck_pending(&store, 1, 1_000 + 1_000).unwrap();
        assert_eq!(rolled, 0);
    }
}
