//! `simplysats-core`: the non-custodial wallet engine shared across the
//! host applications. Key derivation, the embedded store, block-explorer
//! client, sync/discovery engines and transaction builder all live here;
//! the host supplies a [`config::Config`] and UI/network glue.

pub mod api_client;
pub mod autolock;
pub mod concurrency;
pub mod config;
pub mod discovery;
pub mod error;
pub mod fees;
pub mod keys;
pub mod logger;
pub mod pending_spend;
pub mod rate_limiter;
pub mod script;
pub mod state;
pub mod store;
pub mod sync;
pub mod tx_builder;

use std::sync::Arc;

use config::Config;

/// One-time process startup: installs the [`tracing`] subscriber, opens the
/// store at `config.data_dir`, and publishes `config`/the store/the API
/// client/the fee policy as the process-wide singletons every other module
/// reads through [`state`].
pub fn init(config: Config) -> Result<(), error::StoreError> {
    logger::init();

    let db_path = std::path::Path::new(&config.data_dir).join("wallet.sqlite3");
    let store = store::Store::open(&db_path)?;

    let api_client = api_client::ApiClient::new(
        config.block_explorer_base_url.clone(),
        config.miner_fee_quote_url.clone(),
        std::time::Duration::from_millis(config.request_timeout_ms),
    );

    let fee_policy = fees::FeePolicy::new();
    if let Some(rate) = config.fee_rate_override {
        fee_policy.set_user_override(Some(rate));
    }

    state::set_config(config);
    state::set_store(Arc::new(store));
    state::set_api_client(Arc::new(api_client));
    state::set_fee_policy(Arc::new(fee_policy));

    Ok(())
}
