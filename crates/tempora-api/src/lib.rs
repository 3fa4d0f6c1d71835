//! JSON REST API for a Tempora versioned table.
//!
//! Exposes an axum [`Router`] backed by any
//! [`tempora_core::store::VersionedStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tempora_api::api_router(store.clone()))
//! ```

pub mod entities;
pub mod error;
pub mod versions;


use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use tempora_core::store::VersionedStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: VersionedStore + 'static,
{
  Router::new()
    // Entities
    .route("/entities", get(entities::list::<S>).post(entities::create::<S>))
    .route(
      "/entities/{id}",
      get(entities::get_current::<S>)
        .put(entities::save::<S>)
        .delete(entities::delete::<S>),
    )
    .route("/entities/{id}/overwrite", post(entities::overwrite::<S>))
    .route("/entities/{id}/restore", post(entities::restore::<S>))
    .route("/entities/{id}/purge", post(entities::purge::<S>))
    // Versions
    .route("/entities/{id}/versions", get(versions::list::<S>))
    .route("/entities/{id}/versions/first", get(versions::first::<S>))
    .route("/entities/{id}/versions/latest", get(versions::latest::<S>))
    .route("/entities/{id}/versions/{version}", get(versions::get_one::<S>))
    .route("/entities/{id}/versions/{version}/previous", get(versions::previous::<S>))
    .route("/entities/{id}/versions/{version}/next", get(versions::next::<S>))
    .route("/entities/{id}/at", get(versions::at::<S>))
    .with_state(store)
}
