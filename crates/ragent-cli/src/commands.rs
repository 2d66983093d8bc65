pub mod ask;
pub mod chat;
pub mod ingest;
pub mod search;
pub mod version;

use anyhow::Result;
use ragent::agent::RagAgent;
use ragent::errors::RagError;
use ragent::settings::Settings;
use std::sync::Arc;

pub fn load_settings() -> Result<Settings> {
    Ok(Settings::load().map_err(RagError::from)?)
}

/// The agent over the configured store, failing before any question is asked
pub fn build_agent(settings: &Settings) -> Result<RagAgent> {
    let store = Arc::new(settings.vector_store()?);
    Ok(RagAgent::from_settings(settings, store)?)
}
