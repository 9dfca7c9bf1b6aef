//! Block-explorer / miner fee-quote HTTP client (C6).
//!
//! Every call returns `Result<T, ApiError>` rather than panicking or
//! returning a dynamically-shaped value, per spec.md §4.6/§7. Grounded in
//! `get10101-10101/mobile/native/src/health.rs`'s `reqwest` usage pattern
//! (plain `reqwest::Client`, `.context(...)`-free error mapping at the
//! boundary since this module owns a typed error rather than `anyhow`).

mod types;

use std::time::Duration;

use futures::stream::{self, StreamExt};

use crate::error::ApiError;
pub use types::{btc_to_sats, AddressHistoryEntry, FeeQuote, SpentInfo, TxDetail, TxInput, TxOutput, Utxo};

/// Default bound on how many `getTransactionDetailsBatch` requests run
/// concurrently, matching spec.md §5's `maxConcurrentRequests` default.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 3;

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    miner_fee_url: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, miner_fee_url: Option<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client config is infallible at this call site");

        ApiClient {
            http,
            base_url: base_url.into(),
            miner_fee_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self.url(path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| ApiError::NetworkError { endpoint: path.to_string(), source })?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::RateLimited { endpoint: path.to_string() });
        }
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound { endpoint: path.to_string() });
        }
        if !response.status().is_success() {
            return Err(ApiError::Other(format!("{path} returned {}", response.status())));
        }

        response.json::<T>().await.map_err(|e| ApiError::Malformed {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })
    }

    pub async fn get_utxos_safe(&self, address: &str) -> Result<Vec<Utxo>, ApiError> {
        self.get_json(&format!("/address/{address}/unspent")).await
    }

    pub async fn get_transaction_history_safe(
        &self,
        address: &str,
    ) -> Result<Vec<AddressHistoryEntry>, ApiError> {
        self.get_json(&format!("/address/{address}/history")).await
    }

    pub async fn get_balance_safe(&self, address: &str) -> Result<u64, ApiError> {
        let utxos = self.get_utxos_safe(address).await?;
        Ok(utxos.iter().map(|u| u.satoshis).sum())
    }

    pub async fn get_transaction_details_safe(&self, txid: &str) -> Result<TxDetail, ApiError> {
        self.get_json(&format!("/tx/{txid}")).await
    }

    pub async fn is_output_spent_safe(&self, txid: &str, vout: u32) -> Result<Option<String>, ApiError> {
        let spent: Option<SpentInfo> = self.get_json(&format!("/tx/{txid}/out/{vout}/spent")).await?;
        Ok(spent.map(|s| s.spending_txid))
    }

    pub async fn get_block_height_safe(&self) -> Result<u32, ApiError> {
        #[derive(serde::Deserialize)]
        struct ChainInfo {
            blocks: u32,
        }
        let info: ChainInfo = self.get_json("/chain/info").await?;
        Ok(info.blocks)
    }

    pub async fn broadcast_safe(&self, raw_tx_hex: &str) -> Result<String, ApiError> {
        #[derive(serde::Deserialize)]
        struct BroadcastResponse {
            txid: String,
        }

        let url = self.url("/tx/raw");
        let response = self
            .http
            .post(&url)
            .body(raw_tx_hex.to_string())
            .send()
            .await
            .map_err(|source| ApiError::NetworkError { endpoint: "/tx/raw".to_string(), source })?;

        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Other(format!("broadcast rejected: {body}")));
        }

        let parsed: BroadcastResponse = response.json().await.map_err(|e| ApiError::Malformed {
            endpoint: "/tx/raw".to_string(),
            reason: e.to_string(),
        })?;
        Ok(parsed.txid)
    }

    /// Fans out `getTransactionDetails` over `txids` under a bounded worker
    /// pool and returns only the fetches that succeeded, per spec.md §4.6.
    pub async fn get_transaction_details_batch(
        &self,
        txids: &[String],
        concurrency: usize,
    ) -> std::collections::HashMap<String, TxDetail> {
        stream::iter(txids.iter().cloned())
            .map(|txid| async move {
                let detail = self.get_transaction_details_safe(&txid).await;
                (txid, detail)
            })
            .buffer_unordered(concurrency.max(1))
            .filter_map(|(txid, result)| async move {
                match result {
                    Ok(detail) => Some((txid, detail)),
                    Err(e) => {
                        tracing::debug!(%txid, error = %e, "dropping failed tx-detail fetch from batch");
                        None
                    }
                }
            })
            .collect()
            .await
    }

    /// `GET /mapi/feeQuote`. The `standard` fee type's rate is used for
    /// ordinary transactions per spec.md §6.
    pub async fn get_fee_quote_safe(&self) -> Result<FeeQuote, ApiError> {
        let miner_fee_url = self
            .miner_fee_url
            .clone()
            .ok_or_else(|| ApiError::Other("no miner fee-quote URL configured".to_string()))?;

        let response = self
            .http
            .get(&miner_fee_url)
            .send()
            .await
            .map_err(|source| ApiError::NetworkError { endpoint: miner_fee_url.clone(), source })?;

        if !response.status().is_success() {
            return Err(ApiError::Other(format!("{miner_fee_url} returned {}", response.status())));
        }

        let envelope: types::FeeQuoteEnvelope = response.json().await.map_err(|e| ApiError::Malformed {
            endpoint: miner_fee_url.clone(),
            reason: e.to_string(),
        })?;

        envelope.standard_rate().ok_or_else(|| ApiError::Malformed {
            endpoint: miner_fee_url,
            reason: "no standard feeType in payload".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path_without_double_slash() {
        let client = ApiClient::new("https://api.example.com/", None, Duration::from_secs(5));
        assert_eq!(client.url("/address/abc/unspent"), "https://api.example.com/address/abc/unspent");
    }
}
