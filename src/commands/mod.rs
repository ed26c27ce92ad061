pub mod auth;
pub mod events;
pub mod logout;
pub mod new;
pub mod register;
pub mod share;
pub mod shared;
pub mod shares;
pub mod sync;
pub mod watch;

use anyhow::Result;
use juncture_core::{FileStore, GrantStore, ProviderClient, SyncSession};

use crate::config::Config;

pub fn open_store(config: &Config) -> Result<FileStore> {
    Ok(FileStore::new(config.store_dir()?))
}

pub fn grant_store(config: &Config) -> Result<GrantStore> {
    Ok(GrantStore::new(config.grant_dir()?))
}

pub fn provider_client(config: &Config) -> Result<ProviderClient> {
    Ok(ProviderClient::new(config.api_base_url())?)
}

pub fn open_session(config: &Config) -> Result<SyncSession> {
    Ok(SyncSession::new(provider_client(config)?, grant_store(config)?))
}
