//! Ambient configuration (SPEC_FULL.md "Configuration"): an externally
//! supplied [`Config`] converted once into [`ConfigInternal`] and read
//! through small accessor functions, mirroring
//! `native/src/config/mod.rs`/`native/src/state.rs`'s split. Settings
//! persistence is out of scope (spec.md §1); this only holds config for the
//! lifetime of the process.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bitcoin::Network;

/// The host application's configuration, handed to [`crate::state::set_config`]
/// once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub network: Network,
    pub block_explorer_base_url: String,
    pub miner_fee_quote_url: Option<String>,
    pub data_dir: String,
    pub fee_rate_override: Option<f64>,
    pub request_timeout_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ConfigInternal {
    network: Network,
    block_explorer_base_url: String,
    miner_fee_quote_url: Option<String>,
    data_dir: String,
    fee_rate_override: Option<f64>,
    request_timeout: Duration,
}

impl From<Config> for ConfigInternal {
    fn from(config: Config) -> Self {
        ConfigInternal {
            network: config.network,
            block_explorer_base_url: config.block_explorer_base_url,
            miner_fee_quote_url: config.miner_fee_quote_url,
            data_dir: config.data_dir,
            fee_rate_override: config.fee_rate_override,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        }
    }
}

pub fn get_network() -> Network {
    crate::state::get_config().network
}

pub fn get_block_explorer_base_url() -> String {
    crate::state::get_config().block_explorer_base_url
}

pub fn get_miner_fee_quote_url() -> Option<String> {
    crate::state::get_config().miner_fee_quote_url
}

pub fn get_data_dir() -> String {
    crate::state::get_config().data_dir
}

pub fn get_fee_rate_override() -> Option<f64> {
    crate::state::get_config().fee_rate_override
}

pub fn get_request_timeout() -> Duration {
    crate::state::get_config().request_timeout
}

/// `<data_dir>/<network>/simplysats.db`, the single-file embedded SQL
/// database spec.md §6 names.
pub fn get_db_path() -> PathBuf {
    Path::new(&get_data_dir()).join(get_network().to_string()).join("simplysats.db")
}
