//! Loading service configuration (server, document store, catalog seeding) from TOML.
//!
//! See `AppConfig` for the expected schema. Every section and field is optional.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub server: ServerConfig,
  #[serde(default)]
  pub store: StoreConfig,
  #[serde(default)]
  pub catalog: CatalogConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_port")]
  pub port: u16,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self { port: default_port() }
  }
}

#[derive(Clone, Copy, Debug, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
  /// Process-local store; contents vanish on restart.
  #[default]
  Memory,
  /// JSON document API reached over HTTP.
  Rest,
}

/// Where cases and user records live.
#[derive(Clone, Debug, Deserialize)]
pub struct StoreConfig {
  #[serde(default)] pub kind: StoreKind,
  #[serde(default = "default_base_url")] pub base_url: String,
  /// Name of the env variable holding the bearer token (never the token itself).
  #[serde(default = "default_token_env")] pub token_env: String,
  #[serde(default = "default_cases_collection")] pub cases_collection: String,
  #[serde(default = "default_users_collection")] pub users_collection: String,
  #[serde(default = "default_timeout_secs")] pub timeout_secs: u64,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      kind: StoreKind::Memory,
      base_url: default_base_url(),
      token_env: default_token_env(),
      cases_collection: default_cases_collection(),
      users_collection: default_users_collection(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

/// Seeding overrides. When `seed_order` is absent the bundled order is used.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct CatalogConfig {
  #[serde(default)]
  pub seed_order: Option<Vec<String>>,
}

fn default_port() -> u16 { 3000 }
fn default_base_url() -> String { "http://localhost:8080/v1".into() }
fn default_token_env() -> String { "CASEFILE_STORE_TOKEN".into() }
fn default_cases_collection() -> String { "cases".into() }
fn default_users_collection() -> String { "users".into() }
fn default_timeout_secs() -> u64 { 10 }

impl AppConfig {
  pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(s)
  }

  /// PORT wins over the configured port.
  pub fn apply_env_overrides(mut self) -> Self {
    if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse::<u16>().ok()) {
      self.server.port = port;
    }
    self
  }
}

/// Load `AppConfig` from CASEFILE_CONFIG_PATH. On any read/parse error, logs and returns defaults.
pub fn load_config_from_env() -> AppConfig {
  let Ok(path) = std::env::var("CASEFILE_CONFIG_PATH") else {
    info!(target: "casefile_backend", "CASEFILE_CONFIG_PATH not set; using default configuration");
    return AppConfig::default().apply_env_overrides();
  };
  let cfg = match std::fs::read_to_string(&path) {
    Ok(s) => match AppConfig::from_toml_str(&s) {
      Ok(cfg) => {
        info!(target: "casefile_backend", %path, "Loaded service config (TOML)");
        cfg
      }
      Err(e) => {
        error!(target: "casefile_backend", %path, error = %e, "Failed to parse TOML config");
        AppConfig::default()
      }
    },
    Err(e) => {
      error!(target: "casefile_backend", %path, error = %e, "Failed to read TOML config file");
      AppConfig::default()
    }
  };
  cfg.apply_env_overrides()
}
