//! Casefile · Case Catalog Backend
//!
//! - Axum HTTP + WebSocket API over the case catalog
//! - Document store adapters: in-memory or a REST document service
//! - Bundled static dataset used for first-run seeding and as the offline fallback
//!
//! Important env variables:
//!   PORT                  : u16 (default 3000, overrides the config file)
//!   CASEFILE_CONFIG_PATH  : path to TOML config (store, collections, seed order)
//!   CASEFILE_STORE_TOKEN  : bearer token for the REST store (name set by `store.token_env`)
//!   LOG_LEVEL             : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT            : "pretty" (default) or "json"

mod telemetry;
mod config;
mod clock;
mod error;
mod domain;
mod ordering;
mod normalize;
mod editor;
mod seeds;
mod store;
mod export;
mod repository;
mod state;
mod protocol;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use crate::config::load_config_from_env;
use crate::repository::LoadMode;
use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let config = load_config_from_env();
  let port = config.server.port;

  // Shared application state (store adapter, clock, bundled dataset).
  let state = Arc::new(AppState::from_config(config)?);

  // First load cycle; a fallback here is served until a client asks for a reload.
  let snapshot = state.repo.load().await;
  match snapshot.mode {
    LoadMode::StaticFallback => warn!(
      target: "casefile_backend",
      notice = snapshot.notice.as_deref().unwrap_or_default(),
      "Serving bundled dataset"
    ),
    mode => info!(target: "casefile_backend", ?mode, cases = snapshot.cases.len(), "Catalog loaded"),
  }

  let app = build_router(state.clone());

  let addr = SocketAddr::from(([0, 0, 0, 0], port));
  let listener = TcpListener::bind(addr).await?;
  info!(target: "casefile_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "casefile_backend", "Shutdown signal received");
    })
    .await?;
  Ok(())
}
