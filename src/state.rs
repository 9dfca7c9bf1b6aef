//! Process-wide singleton state, following `native/src/state.rs`'s
//! `static Storage<RwLock<T>> + set_/get_/try_get_` convention.

use std::sync::Arc;

use parking_lot::RwLock;
use state::Storage;

use crate::api_client::ApiClient;
use crate::config::{Config, ConfigInternal};
use crate::fees::FeePolicy;
use crate::store::Store;

static CONFIG: Storage<RwLock<ConfigInternal>> = Storage::new();
static STORE: Storage<Arc<Store>> = Storage::new();
static API_CLIENT: Storage<Arc<ApiClient>> = Storage::new();
static FEE_POLICY: Storage<Arc<FeePolicy>> = Storage::new();

pub fn set_config(config: Config) {
    let internal: ConfigInternal = config.into();
    match CONFIG.try_get() {
        Some(slot) => *slot.write() = internal,
        None => {
            CONFIG.set(RwLock::new(internal));
        }
    }
}

pub fn get_config() -> ConfigInternal {
    CONFIG.get().read().clone()
}

pub fn try_get_config() -> Option<ConfigInternal> {
    CONFIG.try_get().map(|c| c.read().clone())
}

pub fn set_store(store: Arc<Store>) {
    STORE.set(store);
}

pub fn get_store() -> Arc<Store> {
    STORE.get().clone()
}

pub fn try_get_store() -> Option<Arc<Store>> {
    STORE.try_get().cloned()
}

pub fn set_api_client(client: Arc<ApiClient>) {
    API_CLIENT.set(client);
}

pub fn get_api_client() -> Arc<ApiClient> {
    API_CLIENT.get().clone()
}

pub fn set_fee_policy(policy: Arc<FeePolicy>) {
    FEE_POLICY.set(policy);
}

pub fn get_fee_policy() -> Arc<FeePolicy> {
    match FEE_POLICY.try_get() {
        Some(policy) => policy.clone(),
        None => {
            let policy = Arc::new(FeePolicy::new());
            FEE_POLICY.set(policy.clone());
            policy
        }
    }
}
