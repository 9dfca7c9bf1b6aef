//! Typed error taxonomies for the fallible boundaries named in spec.md §7.
//!
//! Each boundary gets its own `thiserror` enum; callers that need a single
//! error type convert with `?` into `anyhow::Error` the way the rest of the
//! crate does.

use thiserror::Error;

/// Errors surfaced by the block-explorer / miner-fee HTTP client (C6).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error calling {endpoint}: {source}")]
    NetworkError {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("rate limited by {endpoint}")]
    RateLimited { endpoint: String },
    #[error("not found: {endpoint}")]
    NotFound { endpoint: String },
    #[error("malformed response from {endpoint}: {reason}")]
    Malformed { endpoint: String, reason: String },
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by the transaction builder (C9).
#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("insufficient funds: need {needed} sats, have {available}")]
    InsufficientFunds { needed: u64, available: u64 },
    #[error("invalid script: {0}")]
    InvalidScript(String),
    #[error("coin selection conflict on outpoint {txid}:{vout}")]
    CoinSelectionConflict { txid: String, vout: u32 },
    #[error("broadcast rejected: {0}")]
    BroadcastRejected(String),
    #[error("unlock block {unlock_block} not yet reached (current height {current_height})")]
    LocktimeNotReached {
        unlock_block: u32,
        current_height: u32,
    },
}

/// Errors surfaced by the store (C4).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("migration error: {0}")]
    Migration(String),
    #[error("executeTransaction invoked outside the writer queue")]
    ReentrancyGuard,
}

/// Raised by the concurrency core (C10) when a long-running operation
/// observes cancellation. Never surfaced to the user per spec.md §7; the
/// sync entry point catches it and returns `Ok(())`.
#[derive(Debug, Error)]
#[error("operation cancelled")]
pub struct Cancelled;
