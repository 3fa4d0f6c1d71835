//! Handlers for navigating the revision history of one entity.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/entities/:id/versions` | Optional `?from=&to=` overlap filter |
//! | `GET`  | `/entities/:id/versions/first` | |
//! | `GET`  | `/entities/:id/versions/latest` | Open or not |
//! | `GET`  | `/entities/:id/versions/:n` | 404 if absent |
//! | `GET`  | `/entities/:id/versions/:n/previous` | |
//! | `GET`  | `/entities/:id/versions/:n/next` | |
//! | `GET`  | `/entities/:id/at?t=<rfc3339>` | Revision valid at `t` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tempora_core::{revision::Revision, store::VersionedStore};
use uuid::Uuid;

use crate::error::ApiError;

fn found(
  revision: Option<Revision>,
  what: impl FnOnce() -> String,
) -> Result<Json<Revision>, ApiError> {
  revision.map(Json).ok_or_else(|| ApiError::NotFound(what()))
}

// ─── History ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RangeParams {
  pub from: Option<DateTime<Utc>>,
  pub to:   Option<DateTime<Utc>>,
}

/// `GET /entities/:id/versions[?from=t][&to=t]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Query(range): Query<RangeParams>,
) -> Result<Json<Vec<Revision>>, ApiError>
where
  S: VersionedStore,
{
  let revisions = if range.from.is_some() || range.to.is_some() {
    store.in_range(id, range.from, range.to).await
  } else {
    store.all_versions(id).await
  }
  .map_err(ApiError::store)?;
  Ok(Json(revisions))
}

// ─── Single revisions ─────────────────────────────────────────────────────────

/// `GET /entities/:id/versions/first`
pub async fn first<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Revision>, ApiError>
where
  S: VersionedStore,
{
  let revision = store.first_version(id).await.map_err(ApiError::store)?;
  found(revision, || format!("entity {id} not found"))
}

/// `GET /entities/:id/versions/latest`
pub async fn latest<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Revision>, ApiError>
where
  S: VersionedStore,
{
  let revision = store.latest_version(id).await.map_err(ApiError::store)?;
  found(revision, || format!("entity {id} not found"))
}

/// `GET /entities/:id/versions/:n`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path((id, version)): Path<(Uuid, u32)>,
) -> Result<Json<Revision>, ApiError>
where
  S: VersionedStore,
{
  let revision = store.at_version(id, version).await.map_err(ApiError::store)?;
  found(revision, || format!("entity {id} has no version {version}"))
}

/// The revision one step before or after `version`.
async fn neighbour<S>(
  store: &S,
  id: Uuid,
  version: u32,
  forward: bool,
) -> Result<Json<Revision>, ApiError>
where
  S: VersionedStore,
{
  let origin = store
    .at_version(id, version)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("entity {id} has no version {version}")))?;

  let revision = if forward {
    store.next_version(&origin).await
  } else {
    store.previous_version(&origin).await
  }
  .map_err(ApiError::store)?;

  let direction = if forward { "after" } else { "before" };
  found(revision, || format!("entity {id} has no version {direction} {version}"))
}

/// `GET /entities/:id/versions/:n/previous`
pub async fn previous<S>(
  State(store): State<Arc<S>>,
  Path((id, version)): Path<(Uuid, u32)>,
) -> Result<Json<Revision>, ApiError>
where
  S: VersionedStore,
{
  neighbour(store.as_ref(), id, version, false).await
}

/// `GET /entities/:id/versions/:n/next`
pub async fn next<S>(
  State(store): State<Arc<S>>,
  Path((id, version)): Path<(Uuid, u32)>,
) -> Result<Json<Revision>, ApiError>
where
  S: VersionedStore,
{
  neighbour(store.as_ref(), id, version, true).await
}

// ─── As of ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AtParams {
  pub t: DateTime<Utc>,
}

/// `GET /entities/:id/at?t=2024-01-01T09:00:00Z`
pub async fn at<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<AtParams>,
) -> Result<Json<Revision>, ApiError>
where
  S: VersionedStore,
{
  let revision = store.at_date(id, params.t).await.map_err(ApiError::store)?;
  found(revision, || format!("entity {id} has no revision at {}", params.t))
}
