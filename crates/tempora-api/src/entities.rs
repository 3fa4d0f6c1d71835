//! Handlers for `/entities` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/entities` | Current revisions; see [`ListParams`] for scopes |
//! | `POST`   | `/entities` | Body: `{"id"?: uuid, "payload": {...}}` |
//! | `GET`    | `/entities/:id` | Open revision; 404 if deleted or purged |
//! | `PUT`    | `/entities/:id` | Body: `{"version": n, "changes": {...}}` |
//! | `DELETE` | `/entities/:id?version=n` | Soft delete |
//! | `POST`   | `/entities/:id/overwrite` | Same body as `PUT`, never versions |
//! | `POST`   | `/entities/:id/restore` | Re-open the latest revision |
//! | `POST`   | `/entities/:id/purge` | Remove every revision |
//!
//! Writes name the version the caller last read. A stale or lost write is
//! answered with 409.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempora_core::{
  query::{Predicate, VersionQuery},
  revision::Revision,
  scope::TemporalScope as _,
  store::VersionedStore,
  transition::SaveOutcome,
  value::Payload,
};
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeName {
  Current,
  All,
  First,
}

/// Query parameters for `GET /entities`.
///
/// At most one of `scope`, `version`, `at` and `from`/`to` may be given;
/// with none, only open revisions are listed. `field` and `equals` add one
/// text equality filter on a payload column.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
  pub scope:   Option<ScopeName>,
  pub version: Option<u32>,
  pub at:      Option<DateTime<Utc>>,
  pub from:    Option<DateTime<Utc>>,
  pub to:      Option<DateTime<Utc>>,
  pub field:   Option<String>,
  pub equals:  Option<String>,
  pub limit:   Option<usize>,
  pub offset:  Option<usize>,
}

impl ListParams {
  fn into_query(self) -> Result<VersionQuery, ApiError> {
    let ranged = self.from.is_some() || self.to.is_some();
    let selectors = [
      self.scope.is_some(),
      self.version.is_some(),
      self.at.is_some(),
      ranged,
    ];
    if selectors.into_iter().filter(|s| *s).count() > 1 {
      return Err(ApiError::BadRequest(
        "use only one of scope, version, at, or from/to".into(),
      ));
    }

    let mut query = VersionQuery::new();
    query = match (self.scope, self.version, self.at) {
      (Some(ScopeName::All), ..) => query.all_versions(),
      (Some(ScopeName::First), ..) => query.first_versions(),
      (_, Some(n), _) => query.versions_at(n),
      (_, _, Some(t)) => query.versions_at_date(t),
      _ if ranged => query.versions_in_range(self.from, self.to),
      _ => query.current_versions(),
    };

    query = match (self.field, self.equals) {
      (Some(field), Some(value)) => query.filter(Predicate::eq(field, value)),
      (Some(field), None) => query.filter(Predicate::IsNull(field)),
      (None, Some(_)) => {
        return Err(ApiError::BadRequest("`equals` requires `field`".into()));
      }
      (None, None) => query,
    };
    if let Some(limit) = self.limit {
      query = query.limit(limit);
    }
    if let Some(offset) = self.offset {
      query = query.offset(offset);
    }
    Ok(query)
  }
}

/// `GET /entities[?scope=all|first][&version=n][&at=t][&from=t&to=t]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Revision>>, ApiError>
where
  S: VersionedStore,
{
  let query = params.into_query()?;
  let revisions = store.find(&query).await.map_err(ApiError::store)?;
  Ok(Json(revisions))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub id:      Option<Uuid>,
  #[serde(default)]
  pub payload: Payload,
}

/// `POST /entities`, body: `{"payload":{"name":"Ada"}}`
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: VersionedStore,
{
  let revision = match body.id {
    Some(id) => {
      if store.latest_version(id).await.map_err(ApiError::store)?.is_some() {
        return Err(ApiError::Conflict(format!("entity {id} already exists")));
      }
      store.create_with_id(id, body.payload).await
    }
    None => store.create(body.payload).await,
  }
  .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(revision)))
}

// ─── Get current ──────────────────────────────────────────────────────────────

/// `GET /entities/:id`
pub async fn get_current<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Revision>, ApiError>
where
  S: VersionedStore,
{
  let revision = store
    .current_version(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("entity {id} has no current revision")))?;
  Ok(Json(revision))
}

// ─── Writes ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChangeBody {
  /// The version the caller last read.
  pub version: u32,
  pub changes: Payload,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
  pub outcome:  SaveOutcome,
  pub revision: Revision,
}

#[derive(Debug, Serialize)]
pub struct TransitionResponse {
  /// `false` when nothing changed or an observer vetoed.
  pub applied:  bool,
  pub revision: Revision,
}

/// Load `version` of `id` and stage `changes` on it.
async fn staged<S>(
  store: &S,
  id: Uuid,
  version: u32,
  changes: Payload,
) -> Result<Revision, ApiError>
where
  S: VersionedStore,
{
  let mut revision = load(store, id, version).await?;
  for (field, value) in changes {
    revision.set(field, value);
  }
  Ok(revision)
}

async fn load<S>(store: &S, id: Uuid, version: u32) -> Result<Revision, ApiError>
where
  S: VersionedStore,
{
  store
    .at_version(id, version)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("entity {id} has no version {version}")))
}

/// `PUT /entities/:id`, body: `{"version":2,"changes":{"name":"Ada"}}`
pub async fn save<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ChangeBody>,
) -> Result<Json<SaveResponse>, ApiError>
where
  S: VersionedStore,
{
  let mut revision = staged(store.as_ref(), id, body.version, body.changes).await?;
  let outcome = store.save(&mut revision).await.map_err(ApiError::store)?;
  Ok(Json(SaveResponse { outcome, revision }))
}

/// `POST /entities/:id/overwrite` with the same body as `PUT`
pub async fn overwrite<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ChangeBody>,
) -> Result<Json<TransitionResponse>, ApiError>
where
  S: VersionedStore,
{
  let mut revision = staged(store.as_ref(), id, body.version, body.changes).await?;
  let applied = store.overwrite(&mut revision).await.map_err(ApiError::store)?;
  Ok(Json(TransitionResponse { applied, revision }))
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
  pub version: u32,
}

/// `DELETE /entities/:id?version=n`
pub async fn delete<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<DeleteParams>,
) -> Result<Json<TransitionResponse>, ApiError>
where
  S: VersionedStore,
{
  let mut revision = load(store.as_ref(), id, params.version).await?;
  let applied = store.delete(&mut revision).await.map_err(ApiError::store)?;
  Ok(Json(TransitionResponse { applied, revision }))
}

/// `POST /entities/:id/restore`
pub async fn restore<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, ApiError>
where
  S: VersionedStore,
{
  let mut revision = store
    .latest_version(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("entity {id} not found")))?;
  let applied = store.restore(&mut revision).await.map_err(ApiError::store)?;
  Ok(Json(TransitionResponse { applied, revision }))
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
  pub removed: usize,
}

/// `POST /entities/:id/purge`
pub async fn purge<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<PurgeResponse>, ApiError>
where
  S: VersionedStore,
{
  let removed = store.purge(id).await.map_err(ApiError::store)?;
  Ok(Json(PurgeResponse { removed }))
}
