//! Transaction builder (C9): P2PKH sends, timelocks, unlocks and ordinal
//! transfers, all funnelled through the same broadcast contract.
//!
//! BIP-143 sighashing is hand-rolled rather than built on
//! `bitcoin::sighash::SighashCache` (the pattern `htlc_handler.rs` and
//! `bitcoin_client.rs` use for ordinary segwit signing): `SighashCache`'s
//! `EcdsaSighashType` has no way to OR in `SIGHASH_FORKID`, which every
//! signature here needs. [`sighash_preimage`] builds the same six-field
//! preimage by hand, using `bitcoin::consensus::encode::serialize` for its
//! wire-format sub-components.

use std::str::FromStr;

use bitcoin::blockdata::script::{Builder, ScriptBuf};
use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{sha256, sha256d, Hash};
use bitcoin::secp256k1::{ecdsa, Message, PublicKey, SecretKey, SECP256K1};
use bitcoin::{Address, Network, OutPoint, PublicKey as BtcPublicKey, Sequence, Transaction, TxIn, TxOut, Witness};

use crate::api_client::ApiClient;
use crate::concurrency;
use crate::error::BuilderError;
use crate::fees::FeePolicy;
use crate::keys;
use crate::pending_spend::{self, Outpoint};
use crate::script;
use crate::store::models::{Basket, TransactionStatus, Utxo};
use crate::store::Store;

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_FORKID: u32 = 0x40;
pub const SIGHASH_ALL_FORKID: u32 = SIGHASH_ALL | SIGHASH_FORKID;

/// Placeholder unlocking-script length used to pre-size the fee for an
/// unlock transaction; the real length is only known after signing
/// (spec.md §4.9).
const UNLOCK_SCRIPT_SIZE_ESTIMATE: u64 = 300;

pub struct SendResult {
    pub txid: String,
    pub amount_sent: u64,
    pub fee: u64,
}

/// `sendP2PKH` from spec.md §4.9: ascending-value coin selection, one
/// recipient output, one change output (no dust filter).
pub async fn send_p2pkh(
    store: &Store,
    api: &ApiClient,
    fees: &FeePolicy,
    account_id: i64,
    secret_key: &SecretKey,
    network: Network,
    recipient: &str,
    amount: u64,
    now_ms: i64,
) -> anyhow::Result<SendResult> {
    let utxos = spendable_sorted_ascending(store, account_id)?;
    let selected = select_coins(&utxos, amount, 2, fees)?;
    let fee = fees.calculate_tx_fee(selected.len() as u64, 2, 0);
    let total: u64 = selected.iter().map(|u| u.satoshis).sum();
    let change = total - amount - fee;

    let public_key = PublicKey::from_secret_key(SECP256K1, secret_key);
    let change_address = keys::p2pkh_address(&public_key, network);

    let recipient_address = parse_address(recipient, network)?;

    let mut outputs = vec![TxOut { value: amount, script_pubkey: recipient_address.script_pubkey() }];
    if change > 0 {
        outputs.push(TxOut { value: change, script_pubkey: change_address.script_pubkey() });
    }

    let unsigned = build_unsigned(&selected, outputs, 0, Sequence::MAX);
    let signed = sign_p2pkh_inputs(&unsigned, &selected, secret_key, &public_key)?;

    let outpoints: Vec<Outpoint> = selected.iter().map(|u| (u.txid.clone(), u.vout)).collect();
    let change_vout = if change > 0 { Some(1u32) } else { None };

    let txid = broadcast_and_settle(
        store, api, account_id, &signed, &outpoints, None, Some(amount), vec!["send".to_string()], now_ms,
    )
    .await?;

    if let Some(vout) = change_vout {
        let _ = store.insert_utxo(
            account_id, &txid, vout, change, "", &change_address.to_string(), Basket::Default, &[], now_ms,
        );
    }

    Ok(SendResult { txid, amount_sent: amount, fee })
}

/// `lock` from spec.md §4.9.
#[allow(clippy::too_many_arguments)]
pub async fn lock(
    store: &Store,
    api: &ApiClient,
    fees: &FeePolicy,
    account_id: i64,
    secret_key: &SecretKey,
    network: Network,
    unlock_block: u32,
    amount: u64,
    ordinal_origin: Option<&[u8]>,
    now_ms: i64,
) -> anyhow::Result<SendResult> {
    let public_key = PublicKey::from_secret_key(SECP256K1, secret_key);
    let pkh = keys::public_key_to_hash(&public_key);
    let lock_script = script::build(&pkh, unlock_block);
    let script_size = lock_script.len() as u64;

    let utxos = spendable_sorted_ascending(store, account_id)?;
    let selected = select_coins_with_fee(&utxos, amount, |n_in| fees.calculate_lock_fee(n_in, script_size))?;
    let fee = fees.calculate_lock_fee(selected.len() as u64, script_size);
    let total: u64 = selected.iter().map(|u| u.satoshis).sum();
    let change = total - amount - fee;

    let change_address = keys::p2pkh_address(&public_key, network);

    let mut outputs = vec![TxOut { value: amount, script_pubkey: lock_script }];
    if let Some(origin) = ordinal_origin {
        outputs.push(TxOut { value: 0, script_pubkey: script::build_op_return("lock", origin) });
    }
    let change_vout = if change > 0 {
        outputs.push(TxOut { value: change, script_pubkey: change_address.script_pubkey() });
        Some((outputs.len() - 1) as u32)
    } else {
        None
    };

    let unsigned = build_unsigned(&selected, outputs, 0, Sequence::MAX);
    let signed = sign_p2pkh_inputs(&unsigned, &selected, secret_key, &public_key)?;

    let outpoints: Vec<Outpoint> = selected.iter().map(|u| (u.txid.clone(), u.vout)).collect();

    let txid = broadcast_and_settle(
        store, api, account_id, &signed, &outpoints, None, Some(amount), vec!["lock".to_string()], now_ms,
    )
    .await?;

    let lock_utxo_id = store
        .get_utxo_by_outpoint(account_id, &txid, 0)
        .map_err(store_err)?
        .map(|u| u.id);
    if let Some(utxo_id) = lock_utxo_id {
        let _ = store.upsert_lock(account_id, utxo_id, unlock_block, None, now_ms);
    }

    if let Some(vout) = change_vout {
        let _ = store.insert_utxo(
            account_id, &txid, vout, change, "", &change_address.to_string(), Basket::Default, &[], now_ms,
        );
    }

    Ok(SendResult { txid, amount_sent: amount, fee })
}

/// `unlock` from spec.md §4.9: spends a single timelock UTXO back to its
/// own key once `unlockBlock` has passed.
pub async fn unlock(
    store: &Store,
    api: &ApiClient,
    fees: &FeePolicy,
    account_id: i64,
    secret_key: &SecretKey,
    network: Network,
    locked_utxo: &Utxo,
    unlock_block: u32,
    current_height: u32,
    now_ms: i64,
) -> anyhow::Result<SendResult> {
    if current_height < unlock_block {
        return Err(BuilderError::LocktimeNotReached { unlock_block, current_height }.into());
    }

    let public_key = PublicKey::from_secret_key(SECP256K1, secret_key);
    let destination = keys::p2pkh_address(&public_key, network);

    let fee = fees.calculate_tx_fee(1, 1, UNLOCK_SCRIPT_SIZE_ESTIMATE);
    if locked_utxo.satoshis <= fee {
        return Err(BuilderError::InsufficientFunds { needed: fee + 1, available: locked_utxo.satoshis }.into());
    }
    let send_amount = locked_utxo.satoshis - fee;

    let outputs = vec![TxOut { value: send_amount, script_pubkey: destination.script_pubkey() }];
    if locked_utxo.locking_script.is_empty() {
        return Err(BuilderError::InvalidScript("locked UTXO has no timelock script".to_string()).into());
    }
    let locking_script = ScriptBuf::from_hex(&locked_utxo.locking_script)
        .map_err(|e| BuilderError::InvalidScript(format!("bad locking script hex: {e}")))?;

    let mut unsigned = build_unsigned(std::slice::from_ref(locked_utxo), outputs, unlock_block, Sequence(0xffff_fffe));
    unsigned.version = 1;

    let preimage = sighash_preimage(&unsigned, 0, &locking_script, locked_utxo.satoshis, SIGHASH_ALL_FORKID);
    let digest = sha256::Hash::hash(&preimage);
    let message = Message::from_digest_slice(digest.as_byte_array()).expect("32-byte digest");
    let signature = SECP256K1.sign_ecdsa(&message, secret_key);

    let mut sig_with_hashtype = signature.serialize_der().to_vec();
    sig_with_hashtype.push(SIGHASH_ALL_FORKID as u8);

    let unlock_script = Builder::new()
        .push_slice(sig_with_hashtype.as_slice())
        .push_slice(&BtcPublicKey { compressed: true, inner: public_key }.to_bytes())
        .push_slice(preimage.as_slice())
        .into_script();

    unsigned.input[0].script_sig = unlock_script;

    let outpoints = vec![(locked_utxo.txid.clone(), locked_utxo.vout)];

    let result = broadcast_unlock(store, api, account_id, &unsigned, &outpoints, send_amount, now_ms).await?;

    let _ = store.insert_utxo(
        account_id, &result, 0, send_amount, "", &destination.to_string(), Basket::Default, &[], now_ms,
    );

    Ok(SendResult { txid: result, amount_sent: send_amount, fee })
}

/// `ordinal transfer` from spec.md §4.9: the 1-sat ordinal goes in as input
/// 0 / output 0, funding UTXOs (signed with `funding_key`) pay the fee.
#[allow(clippy::too_many_arguments)]
pub async fn ordinal_transfer(
    store: &Store,
    api: &ApiClient,
    fees: &FeePolicy,
    account_id: i64,
    ordinal_key: &SecretKey,
    funding_key: &SecretKey,
    network: Network,
    ordinal_utxo: &Utxo,
    recipient: &str,
    now_ms: i64,
) -> anyhow::Result<SendResult> {
    let funding_public = PublicKey::from_secret_key(SECP256K1, funding_key);
    let funding_utxos = spendable_sorted_ascending(store, account_id)?
        .into_iter()
        .filter(|u| u.id != ordinal_utxo.id)
        .collect::<Vec<_>>();

    let funding = select_coins_with_fee(&funding_utxos, 0, |n_in| fees.calculate_tx_fee(n_in + 1, 2, 0))?;
    let fee = fees.calculate_tx_fee((funding.len() + 1) as u64, 2, 0);
    let funding_total: u64 = funding.iter().map(|u| u.satoshis).sum();
    if funding_total < fee {
        return Err(BuilderError::InsufficientFunds { needed: fee, available: funding_total }.into());
    }
    let change = funding_total - fee;

    let recipient_address = parse_address(recipient, network)?;
    let change_address = keys::p2pkh_address(&funding_public, network);

    let mut inputs = vec![ordinal_utxo.clone()];
    inputs.extend(funding.iter().cloned());

    let mut outputs = vec![TxOut { value: ordinal_utxo.satoshis, script_pubkey: recipient_address.script_pubkey() }];
    let change_vout = if change > 0 {
        outputs.push(TxOut { value: change, script_pubkey: change_address.script_pubkey() });
        Some(1u32)
    } else {
        None
    };

    let unsigned = build_unsigned(&inputs, outputs, 0, Sequence::MAX);

    let ordinal_public = PublicKey::from_secret_key(SECP256K1, ordinal_key);
    let mut signed = unsigned;
    signed = sign_one(&signed, 0, ordinal_utxo, ordinal_key, &ordinal_public)?;
    for (i, utxo) in funding.iter().enumerate() {
        signed = sign_one(&signed, i + 1, utxo, funding_key, &funding_public)?;
    }

    let mut outpoints: Vec<Outpoint> = vec![(ordinal_utxo.txid.clone(), ordinal_utxo.vout)];
    outpoints.extend(funding.iter().map(|u| (u.txid.clone(), u.vout)));

    let labels = vec!["ordinal".to_string(), "transfer".to_string()];
    let txid = broadcast_and_settle(
        store, api, account_id, &signed, &outpoints, None, Some(ordinal_utxo.satoshis), labels, now_ms,
    )
    .await?;

    if let Some(vout) = change_vout {
        let _ = store.insert_utxo(
            account_id, &txid, vout, change, "", &change_address.to_string(), Basket::Default, &[], now_ms,
        );
    }

    Ok(SendResult { txid, amount_sent: ordinal_utxo.satoshis, fee })
}

// ---- coin selection -----------------------------------------------------

fn spendable_sorted_ascending(store: &Store, account_id: i64) -> Result<Vec<Utxo>, BuilderError> {
    let mut utxos = pending_spend::spendable_utxos(store, account_id).map_err(store_err)?;
    utxos.sort_by_key(|u| u.satoshis);
    Ok(utxos)
}

/// Ascending-value greedy accumulation, recomputing the flat-rate fee at
/// each step (spec.md §4.9).
fn select_coins(utxos: &[Utxo], target: u64, n_outputs: u64, fees: &FeePolicy) -> Result<Vec<Utxo>, BuilderError> {
    select_coins_with_fee(utxos, target, |n_in| fees.calculate_tx_fee(n_in, n_outputs, 0))
}

fn select_coins_with_fee(
    utxos: &[Utxo],
    target: u64,
    fee_for: impl Fn(u64) -> u64,
) -> Result<Vec<Utxo>, BuilderError> {
    let mut selected = Vec::new();
    let mut sum = 0u64;

    for utxo in utxos {
        selected.push(utxo.clone());
        sum += utxo.satoshis;
        let fee = fee_for(selected.len() as u64);
        if sum >= target + fee {
            return Ok(selected);
        }
    }

    let available: u64 = utxos.iter().map(|u| u.satoshis).sum();
    let fee = fee_for(selected.len().max(1) as u64);
    Err(BuilderError::InsufficientFunds { needed: target + fee, available })
}

// ---- transaction assembly ------------------------------------------------

fn build_unsigned(inputs: &[Utxo], outputs: Vec<TxOut>, lock_time: u32, sequence: Sequence) -> Transaction {
    Transaction {
        version: 2,
        lock_time: bitcoin::absolute::LockTime::from_consensus(lock_time),
        input: inputs
            .iter()
            .map(|u| TxIn {
                previous_output: OutPoint { txid: u.txid.parse().expect("stored txid is valid hex"), vout: u.vout },
                script_sig: ScriptBuf::new(),
                sequence,
                witness: Witness::new(),
            })
            .collect(),
        output: outputs,
    }
}

fn sign_p2pkh_inputs(
    tx: &Transaction,
    inputs: &[Utxo],
    secret_key: &SecretKey,
    public_key: &PublicKey,
) -> Result<Transaction, BuilderError> {
    let mut signed = tx.clone();
    for (i, utxo) in inputs.iter().enumerate() {
        signed = sign_one(&signed, i, utxo, secret_key, public_key)?;
    }
    Ok(signed)
}

/// Signs input `index` of `tx` against `utxo`'s own P2PKH scriptPubKey,
/// returning a transaction with that input's `script_sig` filled in.
///
/// `utxo.locking_script` is only populated for timelock outputs (C7 stores
/// an empty string for ordinary P2PKH UTXOs, since the block explorer's
/// unspent-list endpoint never returns one); the P2PKH subscript is
/// reconstructed from the UTXO's own address instead.
fn sign_one(
    tx: &Transaction,
    index: usize,
    utxo: &Utxo,
    secret_key: &SecretKey,
    public_key: &PublicKey,
) -> Result<Transaction, BuilderError> {
    let subscript = if utxo.locking_script.is_empty() {
        Address::from_str(&utxo.address)
            .map_err(|e| BuilderError::InvalidScript(format!("bad UTXO address {}: {e}", utxo.address)))?
            .assume_checked()
            .script_pubkey()
    } else {
        ScriptBuf::from_hex(&utxo.locking_script)
            .map_err(|e| BuilderError::InvalidScript(format!("bad locking script hex: {e}")))?
    };

    let preimage = sighash_preimage(tx, index, &subscript, utxo.satoshis, SIGHASH_ALL_FORKID);
    let digest = sha256::Hash::hash(&preimage);
    let message = Message::from_digest_slice(digest.as_byte_array()).expect("32-byte digest");
    let signature: ecdsa::Signature = SECP256K1.sign_ecdsa(&message, secret_key);

    let mut sig_with_hashtype = signature.serialize_der().to_vec();
    sig_with_hashtype.push(SIGHASH_ALL_FORKID as u8);

    let script_sig = Builder::new()
        .push_slice(sig_with_hashtype.as_slice())
        .push_slice(&BtcPublicKey { compressed: true, inner: *public_key }.to_bytes())
        .into_script();

    let mut signed = tx.clone();
    signed.input[index].script_sig = script_sig;
    Ok(signed)
}

/// Hand-rolled BIP-143 preimage (spec.md §4.9), since `SighashCache`'s
/// `EcdsaSighashType` can't carry `SIGHASH_FORKID`. Structure: nVersion,
/// hashPrevouts, hashSequence, outpoint, scriptCode (varint-prefixed),
/// amount, nSequence, hashOutputs, nLockTime, sighashType.
fn sighash_preimage(tx: &Transaction, index: usize, subscript: &bitcoin::Script, amount: u64, sighash_type: u32) -> Vec<u8> {
    let input = &tx.input[index];

    let mut prevouts_ser = Vec::new();
    for txin in &tx.input {
        prevouts_ser.extend(serialize(&txin.previous_output));
    }
    let hash_prevouts = sha256d::Hash::hash(&prevouts_ser);

    let mut sequences_ser = Vec::new();
    for txin in &tx.input {
        sequences_ser.extend(txin.sequence.to_consensus_u32().to_le_bytes());
    }
    let hash_sequence = sha256d::Hash::hash(&sequences_ser);

    let mut outputs_ser = Vec::new();
    for txout in &tx.output {
        outputs_ser.extend(serialize(txout));
    }
    let hash_outputs = sha256d::Hash::hash(&outputs_ser);

    let mut preimage = Vec::new();
    preimage.extend(tx.version.to_le_bytes());
    preimage.extend(hash_prevouts.to_byte_array());
    preimage.extend(hash_sequence.to_byte_array());
    preimage.extend(serialize(&input.previous_output));
    preimage.extend(serialize_script_code(subscript));
    preimage.extend(amount.to_le_bytes());
    preimage.extend(input.sequence.to_consensus_u32().to_le_bytes());
    preimage.extend(hash_outputs.to_byte_array());
    preimage.extend(tx.lock_time.to_consensus_u32().to_le_bytes());
    preimage.extend(sighash_type.to_le_bytes());
    preimage
}

fn serialize_script_code(script: &bitcoin::Script) -> Vec<u8> {
    let mut out = Vec::new();
    let bytes = script.as_bytes();
    write_varint(&mut out, bytes.len() as u64);
    out.extend(bytes);
    out
}

fn write_varint(out: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(0xfd);
        out.extend((n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        out.push(0xfe);
        out.extend((n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend(n.to_le_bytes());
    }
}

fn parse_address(s: &str, network: Network) -> Result<Address, BuilderError> {
    Address::from_str(s)
        .map_err(|e| BuilderError::InvalidScript(format!("bad recipient address {s}: {e}")))?
        .require_network(network)
        .map_err(|e| BuilderError::InvalidScript(format!("address {s} is for the wrong network: {e}")))
}

fn store_err(e: crate::error::StoreError) -> BuilderError {
    BuilderError::BroadcastRejected(format!("store error during tx build: {e}"))
}

// ---- broadcast contract ---------------------------------------------------

#[allow(clippy::too_many_arguments)]
async fn broadcast_and_settle(
    store: &Store,
    api: &ApiClient,
    account_id: i64,
    signed: &Transaction,
    outpoints: &[Outpoint],
    raw_override: Option<&str>,
    amount: Option<u64>,
    labels: Vec<String>,
    now_ms: i64,
) -> Result<String, BuilderError> {
    let _guard = concurrency::acquire_sync_lock(account_id).await;

    let raw_hex = hex::encode(serialize(signed));
    let pending_txid = signed.txid().to_string();

    pending_spend::mark_pending(store, account_id, outpoints, &pending_txid, now_ms)?;

    let broadcast_result = api.broadcast_safe(raw_override.unwrap_or(&raw_hex)).await;
    let txid = match broadcast_result {
        Ok(txid) => txid,
        Err(e) => {
            pending_spend::rollback(store, account_id, outpoints).map_err(store_err)?;
            return Err(BuilderError::BroadcastRejected(e.to_string()));
        }
    };

    pending_spend::confirm_spent(store, account_id, outpoints, &txid, now_ms).map_err(store_err)?;

    let amount_i64 = amount.map(|a| a as i64);
    store
        .upsert_transaction(account_id, &txid, Some(&raw_hex), TransactionStatus::Pending, amount_i64, &labels, now_ms)
        .map_err(store_err)?;

    Ok(txid)
}

/// The unlock-specific variant of the broadcast contract: a broadcast
/// failure is checked against `isOutputSpent` on the locked input before
/// being treated as a real failure, since a previous crashed attempt may
/// have already gotten the unlock on-chain (spec.md §4.9).
async fn broadcast_unlock(
    store: &Store,
    api: &ApiClient,
    account_id: i64,
    signed: &Transaction,
    outpoints: &[Outpoint],
    amount: u64,
    now_ms: i64,
) -> Result<String, BuilderError> {
    let _guard = concurrency::acquire_sync_lock(account_id).await;

    let raw_hex = hex::encode(serialize(signed));
    let pending_txid = signed.txid().to_string();

    pending_spend::mark_pending(store, account_id, outpoints, &pending_txid, now_ms)?;

    let (first_txid, first_vout) = outpoints[0].clone();
    let txid = match api.broadcast_safe(&raw_hex).await {
        Ok(txid) => txid,
        Err(e) => match api.is_output_spent_safe(&first_txid, first_vout).await {
            Ok(Some(spending_txid)) => spending_txid,
            _ => {
                pending_spend::rollback(store, account_id, outpoints).map_err(store_err)?;
                return Err(BuilderError::BroadcastRejected(e.to_string()));
            }
        },
    };

    pending_spend::confirm_spent(store, account_id, outpoints, &txid, now_ms).map_err(store_err)?;

    store
        .upsert_transaction(
            account_id, &txid, Some(&raw_hex), TransactionStatus::Pending, Some(amount as i64),
            &["unlock".to_string()], now_ms,
        )
        .map_err(store_err)?;

    if let Ok(Some(utxo)) = store.get_utxo_by_outpoint(account_id, &first_txid, first_vout) {
        let _ = store.mark_lock_unlocked(utxo.id, now_ms);
    }

    Ok(txid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fees::FeePolicy;

    fn utxo(id: i64, satoshis: u64, txid: &str) -> Utxo {
        Utxo {
            id,
            account_id: 1,
            txid: txid.to_string(),
            vout: 0,
            satoshis,
            locking_script: String::new(),
            address: "addr".to_string(),
            basket: Basket::Default,
            spendable: true,
            created_at: 0,
            spent_at: None,
            spent_txid: None,
            spending_status: crate::store::models::SpendingStatus::Unspent,
            pending_spending_txid: None,
            pending_since: None,
            tags: Vec::new(),
        }
    }

    #[test]
    fn select_coins_stops_as_soon_as_target_plus_fee_is_met() {
        let fees = FeePolicy::new();
        let utxos = vec![
            utxo(1, 1_000, "a".repeat(64).as_str()),
            utxo(2, 5_000, "b".repeat(64).as_str()),
            utxo(3, 50_000, "c".repeat(64).as_str()),
        ];
        let selected = select_coins(&utxos, 5_500, 2, &fees).unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].id, 1);
        assert_eq!(selected[1].id, 2);
    }

    #[test]
    fn select_coins_reports_insufficient_funds() {
        let fees = FeePolicy::new();
        let utxos = vec![utxo(1, 1_000, "a".repeat(64).as_str())];
        let result = select_coins(&utxos, 10_000, 2, &fees);
        assert!(matches!(result, Err(BuilderError::InsufficientFunds { .. })));
    }

    #[test]
    fn sighash_preimage_changes_with_amount() {
        let tx = build_unsigned(
            &[utxo(1, 1_000, &"11".repeat(32))],
            vec![TxOut { value: 900, script_pubkey: ScriptBuf::new() }],
            0,
            Sequence::MAX,
        );
        let subscript = ScriptBuf::new();
        let a = sighash_preimage(&tx, 0, &subscript, 1_000, SIGHASH_ALL_FORKID);
        let b = sighash_preimage(&tx, 0, &subscript, 2_000, SIGHASH_ALL_FORKID);
        assert_ne!(a, b);
    }
}
