//! The `VersionedStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `tempora-store-sqlite`).
//! Higher layers (`tempora-api`) depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Classify,
  config::EntitySchema,
  query::VersionQuery,
  revision::Revision,
  transition::{EntityState, SaveOutcome},
  value::Payload,
};

/// Abstraction over one versioned table.
///
/// Transitions take the caller's in-memory revision and update it in place
/// once the store has committed. Every transition that touches the open row is
/// constrained by the exact `(id, version)` the caller holds, so a stale copy
/// fails with a conflict instead of overwriting someone else's revision.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait VersionedStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  fn schema(&self) -> &EntitySchema;

  // ── Transitions ───────────────────────────────────────────────────────

  /// Insert version 1 of a new entity with a store-assigned id.
  fn create(
    &self,
    payload: Payload,
  ) -> impl Future<Output = Result<Revision, Self::Error>> + Send + '_;

  /// Insert version 1 of a new entity with a caller-supplied id. Fails if the
  /// id already has revisions.
  fn create_with_id(
    &self,
    id: Uuid,
    payload: Payload,
  ) -> impl Future<Output = Result<Revision, Self::Error>> + Send + '_;

  /// Persist the staged changes of `revision`, as an overwrite or as a new
  /// version depending on which fields changed.
  fn save<'a>(
    &'a self,
    revision: &'a mut Revision,
  ) -> impl Future<Output = Result<SaveOutcome, Self::Error>> + Send + 'a;

  /// Write the staged changes into the open row without creating a version.
  /// Returns `false` if nothing changed or an observer vetoed.
  fn overwrite<'a>(
    &'a self,
    revision: &'a mut Revision,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Close the open revision. Returns `false` if an observer vetoed.
  fn delete<'a>(
    &'a self,
    revision: &'a mut Revision,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Re-open the latest revision of a deleted entity and load it into
  /// `revision`. Returns `false` when the entity is already active.
  fn restore<'a>(
    &'a self,
    revision: &'a mut Revision,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  /// Physically remove every revision of `id`. Returns the number of rows
  /// removed (0 if an observer vetoed).
  fn purge(&self, id: Uuid) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Navigation ────────────────────────────────────────────────────────

  fn previous_version<'a>(
    &'a self,
    revision: &'a Revision,
  ) -> impl Future<Output = Result<Option<Revision>, Self::Error>> + Send + 'a;

  fn next_version<'a>(
    &'a self,
    revision: &'a Revision,
  ) -> impl Future<Output = Result<Option<Revision>, Self::Error>> + Send + 'a;

  fn first_version(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Revision>, Self::Error>> + Send + '_;

  fn at_version(
    &self,
    id: Uuid,
    version: u32,
  ) -> impl Future<Output = Result<Option<Revision>, Self::Error>> + Send + '_;

  /// The open revision, or `None` if the entity is deleted or purged.
  fn current_version(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Revision>, Self::Error>> + Send + '_;

  /// The highest version, open or not.
  fn latest_version(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Revision>, Self::Error>> + Send + '_;

  /// The revision valid at `at`. If several match, the highest version wins.
  fn at_date(
    &self,
    id: Uuid,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<Revision>, Self::Error>> + Send + '_;

  /// Revisions overlapping `[from, to)`, by ascending version.
  fn in_range(
    &self,
    id: Uuid,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Vec<Revision>, Self::Error>> + Send + '_;

  /// Every revision of `id`, by ascending version.
  fn all_versions(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Vec<Revision>, Self::Error>> + Send + '_;

  fn state(&self, id: Uuid) -> impl Future<Output = Result<EntityState, Self::Error>> + Send + '_;

  // ── Collection ────────────────────────────────────────────────────────

  fn find<'a>(
    &'a self,
    query: &'a VersionQuery,
  ) -> impl Future<Output = Result<Vec<Revision>, Self::Error>> + Send + 'a;

  /// Soft-delete every open revision matching `query`. Rows are closed, never
  /// removed; a repeated call matches nothing and returns 0. A query with a
  /// limit or offset is rejected.
  fn delete_where<'a>(
    &'a self,
    query: &'a VersionQuery,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Update payload columns of every row matching `query` in place.
  ///
  /// This is NOT versioning-safe: no revision is created, no interval is
  /// closed and no observer runs. Use it only for corrections that must not
  /// leave history, such as backfilling a new column. A query with a limit
  /// or offset is rejected.
  fn update_where_unversioned<'a>(
    &'a self,
    query: &'a VersionQuery,
    changes: Payload,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;
}
