//! Account discovery (C8): gap-limit walk over derived accounts.

use std::time::Duration;

use bitcoin::secp256k1::{PublicKey, SECP256K1};
use bitcoin::Network;

use crate::api_client::ApiClient;
use crate::error::ApiError;
use crate::keys::{self, Mnemonic};
use crate::store::Store;
use crate::sync;

/// Operational bound on the discovery walk. SPEC_FULL.md open-question
/// resolution: one discovery module in the original app declared this as
/// 20, but its own tests asserted 200 — 200 is the bound actually enforced
/// here; nothing in this crate reads the `20` figure.
pub const MAX_ACCOUNT_INDEX: u32 = 200;

const GAP_LIMIT: u32 = 5;
const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexStatus {
    Active,
    ConfirmedEmpty,
    Unknown,
}

pub struct DiscoveryResult {
    pub found: u32,
    pub last_index_checked: u32,
}

/// `discover(mnemonic, password, excludeId?)` from spec.md §4.8. `password`
/// from the original interface gates decrypting `encryptedKeys` for
/// existing accounts, which is out of scope here (spec.md §1 puts key
/// encryption's consumer, the password prompt, out of scope); callers
/// supply the already-unlocked `mnemonic` directly.
pub async fn discover(
    store: &Store,
    api: &ApiClient,
    mnemonic: &Mnemonic,
    network: Network,
    exclude_id: Option<i64>,
    now_ms: i64,
) -> anyhow::Result<DiscoveryResult> {
    let mut found = 0u32;
    let mut consecutive_empty = 0u32;
    let mut last_index_checked = 0u32;

    for index in 1..=MAX_ACCOUNT_INDEX {
        last_index_checked = index;

        let account_keys = keys::derive_account(mnemonic, network, index)
            .map_err(|e| ApiError::Other(format!("key derivation failed at index {index}: {e}")))?;

        let wallet_pub_key = PublicKey::from_secret_key(SECP256K1, &account_keys.wallet_key);
        let ord_pub_key = PublicKey::from_secret_key(SECP256K1, &account_keys.ordinal_key);
        let identity_pub_key = PublicKey::from_secret_key(SECP256K1, &account_keys.identity_key);

        let wallet_address = keys::p2pkh_address(&wallet_pub_key, network).to_string();
        let ord_address = keys::p2pkh_address(&ord_pub_key, network).to_string();
        let identity_address = keys::p2pkh_address(&identity_pub_key, network).to_string();

        let status = check_index(api, &[&wallet_address, &ord_address, &identity_address]).await;

        if status == IndexStatus::Active {
            let account_name = format!("Account {}", index + 1);
            let account_id = store
                .create_account(&account_name, "", now_ms)
                .map_err(|e| ApiError::Other(format!("createAccount failed: {e}")))?;

            found += 1;
            tracing::info!(account_id, index, "discovered active account");

            if let Err(e) = sync::sync_wallet(
                store,
                api,
                &wallet_address,
                &ord_address,
                &identity_address,
                account_id,
                &wallet_pub_key,
                network,
                now_ms,
            )
            .await
            {
                tracing::warn!(account_id, error = %e, "initial sync after discovery failed, keeping account");
            }
        }

        if advance_gap_streak(&mut consecutive_empty, status) {
            break;
        }
    }

    if let Some(exclude_id) = exclude_id {
        if found > 0 {
            store
                .set_active_account(exclude_id)
                .map_err(|e| ApiError::Other(format!("failed to reactivate excluded account: {e}")))?;
        }
    }

    Ok(DiscoveryResult { found, last_index_checked })
}

/// Folds one index's classification into the running gap-limit streak,
/// returning whether the walk should stop (spec.md §4.8). `Active` resets
/// the streak; `ConfirmedEmpty` advances it; `Unknown` counts as neither.
fn advance_gap_streak(consecutive_empty: &mut u32, status: IndexStatus) -> bool {
    match status {
        IndexStatus::Active => {
            *consecutive_empty = 0;
            false
        }
        IndexStatus::ConfirmedEmpty => {
            *consecutive_empty += 1;
            *consecutive_empty >= GAP_LIMIT
        }
        IndexStatus::Unknown => false,
    }
}

async fn check_index(api: &ApiClient, addresses: &[&str]) -> IndexStatus {
    for address in addresses {
        match history_with_retry(api, address).await {
            Ok(history) if !history.is_empty() => return IndexStatus::Active,
            Ok(_) => continue,
            Err(_) => return IndexStatus::Unknown,
        }
    }
    IndexStatus::ConfirmedEmpty
}

async fn history_with_retry(
    api: &ApiClient,
    address: &str,
) -> Result<Vec<crate::api_client::AddressHistoryEntry>, ApiError> {
    let mut attempt = 0;
    loop {
        match api.get_transaction_history_safe(address).await {
            Ok(history) => return Ok(history),
            Err(e) if attempt + 1 < RETRY_ATTEMPTS => {
                attempt += 1;
                tracing::debug!(%address, attempt, error = %e, "retrying discovery history check");
                tokio::time::sleep(RETRY_BASE_DELAY * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_limit_breaks_the_walk_after_consecutive_confirmed_empty() {
        let mut streak = 0;
        let mut stopped_at = None;
        for index in 1..=(GAP_LIMIT + 3) {
            if advance_gap_streak(&mut streak, IndexStatus::ConfirmedEmpty) {
                stopped_at = Some(index);
                break;
            }
        }
        assert_eq!(stopped_at, Some(GAP_LIMIT));
    }

    #[test]
    fn unknown_status_neither_advances_nor_resets_the_streak() {
        let mut streak = 0;
        assert!(!advance_gap_streak(&mut streak, IndexStatus::ConfirmedEmpty));
        assert_eq!(streak, 1);

        assert!(!advance_gap_streak(&mut streak, IndexStatus::Unknown));
        assert_eq!(streak, 1, "an Unknown result must not advance the streak");

        assert!(!advance_gap_streak(&mut streak, IndexStatus::Unknown));
        assert_eq!(streak, 1, "repeated Unknown results still must not advance the streak");

        for _ in 0..(GAP_LIMIT - 2) {
            assert!(!advance_gap_streak(&mut streak, IndexStatus::ConfirmedEmpty));
        }
        assert_eq!(streak, GAP_LIMIT - 1);
        assert!(
            advance_gap_streak(&mut streak, IndexStatus::ConfirmedEmpty),
            "the streak must still reach the gap limit once enough ConfirmedEmpty results land"
        );
    }

    #[test]
    fn active_status_resets_the_streak() {
        let mut streak = GAP_LIMIT - 1;
        assert!(!advance_gap_streak(&mut streak, IndexStatus::Active));
        assert_eq!(streak, 0);
    }

    #[tokio::test]
    async fn check_index_classifies_an_unreachable_api_as_unknown() {
        let api = ApiClient::new("http://127.0.0.1:1", None, Duration::from_millis(50));
        let status = check_index(&api, &["addr1", "addr2"]).await;
        assert_eq!(status, IndexStatus::Unknown);
    }
}
