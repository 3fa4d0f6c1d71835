//! Server assembly for Tempora: configuration and the top-level router.
//!
//! The binary in `main.rs` wires these together with a SQLite store.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::Router;
use serde::Deserialize;
use tempora_core::{config::EntitySchema, store::VersionedStore};
use tower_http::trace::TraceLayer;

// ─── Config ───────────────────────────────────────────────────────────────────

/// Top-level server configuration, deserialised from `config.toml` and
/// `TEMPORA_*` environment variables (nested keys joined with `__`, e.g.
/// `TEMPORA_ENTITY__TABLE`).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  pub store_path: PathBuf,
  /// The versioned table served under `/api/entities`.
  pub entity:     EntitySchema,
}

fn default_host() -> String { "127.0.0.1".into() }

fn default_port() -> u16 { 5240 }

/// Read `path` (optional) and the environment into a [`ServerConfig`].
pub fn load_config(path: &Path) -> Result<ServerConfig, config::ConfigError> {
  config::Config::builder()
    .add_source(config::File::from(path.to_path_buf()).required(false))
    .add_source(config::Environment::with_prefix("TEMPORA").separator("__"))
    .build()?
    .try_deserialize()
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The API nested under `/api`, with request tracing.
pub fn router<S>(store: Arc<S>) -> Router
where
  S: VersionedStore + 'static,
{
  Router::new()
    .nest("/api", tempora_api::api_router(store))
    .layer(TraceLayer::new_for_http())
}
