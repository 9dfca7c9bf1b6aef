//! Sync engine (C7): per-address UTXO reconciliation, transaction history
//! ingestion, amount reconstruction and timelock lock/unlock bookkeeping.
//!
//! `txDetailCache` is threaded through explicitly as a plain `HashMap`
//! bound to one [`sync_wallet`] call rather than kept as a module-level
//! cache, per the ad-hoc-cache redesign: every long-lived cache becomes an
//! explicit value scoped to its session instead of a process-wide binding.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use bitcoin::secp256k1::PublicKey;
use bitcoin::Network;

use crate::api_client::{ApiClient, TxDetail};
use crate::concurrency::{self, CancellationToken};
use crate::error::Cancelled;
use crate::keys;
use crate::pending_spend;
use crate::script;
use crate::store::models::{Basket, SpentTxid, TransactionStatus};
use crate::store::Store;

/// Per-address transaction-history page size, per spec.md §4.7.
pub const MAX_HISTORY_ENTRIES: usize = 30;

/// Default pause between reconciliation batches (spec.md §5's
/// `addressSyncDelay`).
const ADDRESS_SYNC_DELAY: Duration = Duration::from_millis(250);

/// A transaction counts as an unlock once its locktime clears BSV's
/// block-height/timestamp boundary and at least one input opts into
/// locktime enforcement (spec.md §4.7).
const UNLOCK_LOCKTIME_THRESHOLD: u32 = 500_000;
const UNLOCK_SEQUENCE: u32 = 0xffff_fffe;

/// `syncWallet(walletAddr, ordAddr, identityAddr, accountId, walletPubKey)`
/// from spec.md §4.7. Cancellation unwinds silently, per spec.md §7 — it is
/// never surfaced as a user-visible error.
pub async fn sync_wallet(
    store: &Store,
    api: &ApiClient,
    wallet_address: &str,
    ord_address: &str,
    identity_address: &str,
    account_id: i64,
    wallet_pub_key: &PublicKey,
    network: Network,
    now_ms: i64,
) -> anyhow::Result<()> {
    let _guard = concurrency::acquire_sync_lock(account_id).await;
    let token = concurrency::start_new_sync();

    match run(
        store,
        api,
        wallet_address,
        ord_address,
        identity_address,
        account_id,
        wallet_pub_key,
        network,
        now_ms,
        &token,
    )
    .await
    {
        Ok(()) => Ok(()),
        Err(e) if e.downcast_ref::<Cancelled>().is_some() => {
            tracing::debug!(accountId = account_id, "sync cancelled by a newer sync request");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[allow(clippy::too_many_arguments)]
async fn run(
    store: &Store,
    api: &ApiClient,
    wallet_address: &str,
    ord_address: &str,
    identity_address: &str,
    account_id: i64,
    wallet_pub_key: &PublicKey,
    network: Network,
    now_ms: i64,
    token: &CancellationToken,
) -> anyhow::Result<()> {
    pending_spend::recover_stuck_pending(store, account_id, now_ms)?;

    let derived = store.get_derived_addresses(account_id)?;
    let pending_txids: HashSet<String> = store.get_pending_txids(account_id)?.into_iter().collect();
    let block_height = api.get_block_height_safe().await.ok();

    let mut wallet_addresses: HashSet<String> = HashSet::new();
    wallet_addresses.insert(wallet_address.to_string());
    wallet_addresses.insert(ord_address.to_string());
    wallet_addresses.insert(identity_address.to_string());
    for d in &derived {
        wallet_addresses.insert(d.address.clone());
    }

    // Derived addresses first, then the three principal addresses, per
    // spec.md §4.7's ordering.
    let mut targets: Vec<(String, Basket)> =
        derived.iter().map(|d| (d.address.clone(), Basket::Derived)).collect();
    targets.push((wallet_address.to_string(), Basket::Default));
    targets.push((ord_address.to_string(), Basket::Ordinals));
    targets.push((identity_address.to_string(), Basket::Identity));

    let mut reported: HashSet<String> = HashSet::new();
    for chunk in targets.chunks(crate::api_client::DEFAULT_BATCH_CONCURRENCY) {
        token.throw_if_cancelled()?;

        let results = futures::future::join_all(chunk.iter().map(|(address, basket)| {
            sync_address(store, api, account_id, address, *basket, &pending_txids, block_height, now_ms)
        }))
        .await;

        for ((address, _), ok) in chunk.iter().zip(results) {
            if ok {
                reported.insert(address.clone());
            }
        }

        concurrency::cancellable_delay(ADDRESS_SYNC_DELAY, token).await?;
    }

    token.throw_if_cancelled()?;

    let mut history_addresses = vec![wallet_address.to_string()];
    history_addresses.extend(derived.iter().map(|d| d.address.clone()));

    let mut txids_seen: HashSet<String> = HashSet::new();
    for address in &history_addresses {
        let history = match api.get_transaction_history_safe(address).await {
            Ok(history) => history,
            Err(e) => {
                tracing::warn!(%address, error = %e, "skipping history fetch for address");
                continue;
            }
        };
        for entry in history.into_iter().take(MAX_HISTORY_ENTRIES) {
            txids_seen.insert(entry.tx_hash);
        }
    }

    let txids: Vec<String> = txids_seen.into_iter().collect();
    let mut tx_detail_cache: HashMap<String, TxDetail> =
        api.get_transaction_details_batch(&txids, crate::api_client::DEFAULT_BATCH_CONCURRENCY).await;

    for txid in &txids {
        token.throw_if_cancelled()?;
        let Some(detail) = tx_detail_cache.get(txid).cloned() else { continue };
        ingest_transaction(
            store,
            api,
            account_id,
            txid,
            &detail,
            &wallet_addresses,
            wallet_pub_key,
            network,
            &mut tx_detail_cache,
            now_ms,
        )
        .await?;
    }

    backfill_missing_amounts(store, api, account_id, &wallet_addresses, &mut tx_detail_cache, now_ms).await?;

    for address in &reported {
        if history_addresses.contains(address) && *address != *wallet_address {
            store.update_derived_address_synced_at(address, now_ms)?;
        }
    }

    if let Some(height) = block_height {
        store.set_last_synced_height(wallet_address, height as i64)?;
    }

    Ok(())
}

/// `syncAddress` from spec.md §4.7. Returns whether reconciliation actually
/// ran to completion (used to decide whether to bump `lastSyncedAt`); every
/// failure path is logged and absorbed here rather than propagated, so a
/// single flaky address never aborts the whole sync.
async fn sync_address(
    store: &Store,
    api: &ApiClient,
    account_id: i64,
    address: &str,
    basket: Basket,
    pending_txids: &HashSet<String>,
    block_height: Option<u32>,
    now_ms: i64,
) -> bool {
    let remote = match api.get_utxos_safe(address).await {
        Ok(utxos) => utxos,
        Err(e) => {
            tracing::warn!(%address, error = %e, "skipping address, UTXO fetch failed");
            return false;
        }
    };

    let local = match store.get_utxos_for_address(account_id, address) {
        Ok(utxos) => utxos,
        Err(e) => {
            tracing::warn!(%address, error = %e, "skipping address, local lookup failed");
            return false;
        }
    };

    if remote.is_empty() && !local.is_empty() {
        match api.get_transaction_history_safe(address).await {
            Err(e) => {
                tracing::warn!(%address, error = %e, "suspected API outage, skipping address");
                return false;
            }
            Ok(history) if history.is_empty() => {
                tracing::debug!(%address, "empty UTXO set with empty history, skipping as suspected outage");
                return false;
            }
            Ok(_) => {
                tracing::info!(%address, "address swept, all local UTXOs will be marked spent");
            }
        }
    }

    let remote_outpoints: HashSet<(String, u32)> =
        remote.iter().map(|u| (u.txid.clone(), u.vout)).collect();

    for utxo in &remote {
        if local.iter().any(|l| l.txid == utxo.txid && l.vout == utxo.vout) {
            continue;
        }
        let tags = if basket == Basket::Ordinals && utxo.satoshis == 1 {
            vec!["ordinal".to_string()]
        } else {
            Vec::new()
        };
        if let Err(e) = store.insert_utxo(
            account_id,
            &utxo.txid,
            utxo.vout,
            utxo.satoshis,
            "",
            address,
            basket,
            &tags,
            now_ms,
        ) {
            tracing::warn!(%address, error = %e, "failed to insert reconciled UTXO");
        }
    }

    for utxo in &local {
        if remote_outpoints.contains(&(utxo.txid.clone(), utxo.vout)) {
            continue;
        }
        if pending_txids.contains(&utxo.txid) {
            continue;
        }
        if let Err(e) = pending_spend::mark_spent_unknown(store, utxo.id, now_ms) {
            tracing::warn!(%address, error = %e, "failed to mark absent UTXO spent");
        }
    }

    if let Some(height) = block_height {
        if let Err(e) = store.set_last_synced_height(address, height as i64) {
            tracing::warn!(%address, error = %e, "failed to record last synced height");
        }
    }

    true
}

#[allow(clippy::too_many_arguments)]
async fn ingest_transaction(
    store: &Store,
    api: &ApiClient,
    account_id: i64,
    txid: &str,
    detail: &TxDetail,
    wallet_addresses: &HashSet<String>,
    wallet_pub_key: &PublicKey,
    network: Network,
    tx_detail_cache: &mut HashMap<String, TxDetail>,
    now_ms: i64,
) -> anyhow::Result<()> {
    let mut labels: Vec<String> = Vec::new();

    detect_locks(store, api, account_id, txid, detail, wallet_pub_key, network, &mut labels, now_ms).await?;

    let is_unlock = detail.locktime > UNLOCK_LOCKTIME_THRESHOLD
        && detail.vin.iter().any(|input| input.sequence == UNLOCK_SEQUENCE);

    let amount = if is_unlock {
        labels.push("unlock".to_string());
        for input in &detail.vin {
            let (Some(parent_txid), Some(parent_vout)) = (&input.txid, input.vout) else { continue };
            if let Ok(Some(parent_utxo)) = store.get_utxo_by_outpoint(account_id, parent_txid, parent_vout) {
                store.mark_lock_unlocked(parent_utxo.id, now_ms)?;
            }
        }
        detail.vout.iter().map(|o| crate::api_client::btc_to_sats(o.value) as i64).sum()
    } else {
        calculate_tx_amount(store, api, account_id, detail, wallet_addresses, tx_detail_cache).await
    };

    let status = if detail.blockheight.is_some() { TransactionStatus::Confirmed } else { TransactionStatus::Pending };
    store.upsert_transaction(account_id, txid, None, status, Some(amount), &labels, now_ms)?;
    Ok(())
}

/// Scans a transaction's outputs for the wallet's own timelock locking
/// script and records any match as a `locks`-basket UTXO + lock row,
/// checking immediately whether it has already been spent (spec.md §4.7).
#[allow(clippy::too_many_arguments)]
async fn detect_locks(
    store: &Store,
    api: &ApiClient,
    account_id: i64,
    txid: &str,
    detail: &TxDetail,
    wallet_pub_key: &PublicKey,
    network: Network,
    labels: &mut Vec<String>,
    now_ms: i64,
) -> anyhow::Result<()> {
    let wallet_pkh = keys::public_key_to_hash(wallet_pub_key);

    for (vout, output) in detail.vout.iter().enumerate() {
        let Some(fields) = script::parse_hex(&output.script_pub_key.hex) else { continue };
        if fields.pkh != wallet_pkh {
            continue;
        }

        let lock_address = keys::p2pkh_address(wallet_pub_key, network).to_string();
        store.insert_utxo(
            account_id,
            txid,
            vout as u32,
            crate::api_client::btc_to_sats(output.value),
            &output.script_pub_key.hex,
            &lock_address,
            Basket::Locks,
            &[],
            now_ms,
        )?;

        let Some(utxo) = store.get_utxo_by_outpoint(account_id, txid, vout as u32)? else { continue };
        store.upsert_lock(account_id, utxo.id, fields.unlock_block, None, now_ms)?;
        labels.push("lock".to_string());

        match api.is_output_spent_safe(txid, vout as u32).await {
            Ok(Some(spending_txid)) => {
                store.mark_lock_unlocked(utxo.id, now_ms)?;
                store.mark_utxo_spent(utxo.id, &SpentTxid::Known(spending_txid), now_ms)?;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(%txid, vout, error = %e, "failed to probe lock output spent-status");
            }
        }
    }
    Ok(())
}

/// `calculateTxAmount` from spec.md §4.7: `received - spent`, resolving
/// each input's parent output from the local store first and falling back
/// to a fetch (cached in `tx_detail_cache` for the remainder of this sync).
async fn calculate_tx_amount(
    store: &Store,
    api: &ApiClient,
    account_id: i64,
    detail: &TxDetail,
    wallet_addresses: &HashSet<String>,
    tx_detail_cache: &mut HashMap<String, TxDetail>,
) -> i64 {
    let received: i64 = detail
        .vout
        .iter()
        .filter(|o| o.script_pub_key.addresses.iter().any(|a| wallet_addresses.contains(a)))
        .map(|o| crate::api_client::btc_to_sats(o.value) as i64)
        .sum();

    let mut spent: i64 = 0;
    for input in &detail.vin {
        let (Some(parent_txid), Some(parent_vout)) = (&input.txid, input.vout) else { continue };

        if let Ok(Some(utxo)) = store.get_utxo_by_outpoint(account_id, parent_txid, parent_vout) {
            if wallet_addresses.contains(&utxo.address) {
                spent += utxo.satoshis as i64;
            }
            continue;
        }

        let parent = match tx_detail_cache.get(parent_txid) {
            Some(p) => p.clone(),
            None => match api.get_transaction_details_safe(parent_txid).await {
                Ok(p) => {
                    tx_detail_cache.insert(parent_txid.clone(), p.clone());
                    p
                }
                Err(e) => {
                    tracing::debug!(%parent_txid, error = %e, "failed to fetch parent tx for amount reconstruction");
                    continue;
                }
            },
        };

        if let Some(parent_output) = parent.vout.get(parent_vout as usize) {
            if parent_output.script_pub_key.addresses.iter().any(|a| wallet_addresses.contains(a)) {
                spent += crate::api_client::btc_to_sats(parent_output.value) as i64;
            }
        }
    }

    received - spent
}

async fn backfill_missing_amounts(
    store: &Store,
    api: &ApiClient,
    account_id: i64,
    wallet_addresses: &HashSet<String>,
    tx_detail_cache: &mut HashMap<String, TxDetail>,
    now_ms: i64,
) -> anyhow::Result<()> {
    let pending = store.get_transactions_missing_amount(account_id)?;
    for tx in pending {
        let detail = match tx_detail_cache.get(&tx.txid) {
            Some(d) => d.clone(),
            None => match api.get_transaction_details_safe(&tx.txid).await {
                Ok(d) => {
                    tx_detail_cache.insert(tx.txid.clone(), d.clone());
                    d
                }
                Err(e) => {
                    tracing::debug!(txid = %tx.txid, error = %e, "backfill fetch failed, leaving amount null");
                    continue;
                }
            },
        };
        let amount = calculate_tx_amount(store, api, account_id, &detail, wallet_addresses, tx_detail_cache).await;
        store.upsert_transaction(account_id, &tx.txid, tx.raw_tx.as_deref(), tx.status, Some(amount), &tx.labels, now_ms)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitcoin::secp256k1::{SecretKey, SECP256K1};

    fn test_store() -> Store {
        Store::open_in_memory().unwrap()
    }

    #[test]
    fn public_key_to_hash_is_stable_for_lock_matching() {
        let secret = SecretKey::new(&mut bitcoin::secp256k1::rand::thread_rng());
        let public = PublicKey::from_secret_key(SECP256K1, &secret);
        let a = keys::public_key_to_hash(&public);
        let b = keys::public_key_to_hash(&public);
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn sync_address_skips_and_preserves_state_on_fetch_failure() {
        let store = test_store();
        store.insert_utxo(1, "abc", 0, 1_000, "", "addr1", Basket::Default, &[], 0).unwrap();

        let api = ApiClient::new("http://127.0.0.1:1", None, Duration::from_millis(50));
        let pending = HashSet::new();
        let reported = sync_address(&store, &api, 1, "addr1", Basket::Default, &pending, None, 0).await;

        assert!(!reported);
        assert_eq!(store.get_utxos_for_address(1, "addr1").unwrap().len(), 1);
    }
}
