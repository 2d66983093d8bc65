use anyhow::Result;
use ragent::{agent::RagAgent, errors::RagError, settings::Settings};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod configuration;
mod error;
mod routes;
mod state;

use configuration::ServerSettings;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = Settings::load().map_err(RagError::from)?;
    let server = ServerSettings::new()?;

    // load or build the index before accepting requests
    let store = Arc::new(settings.vector_store()?);
    let chunks = store.len().await?;
    info!(chunks, collection = %settings.store.collection, "index ready");

    let agent = RagAgent::from_settings(&settings, store)?;
    let state = AppState::new(agent);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = routes::configure(state).layer(cors);

    let listener = tokio::net::TcpListener::bind(server.socket_addr()?).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
