//! The revision, one physical row of a versioned table.
//!
//! Identity, version and the validity interval are read-only to callers; only
//! the transition engine produces revisions with new values for them. Callers
//! edit the payload through [`Revision::set`], and the revision remembers the
//! payload it was loaded with so the engine can tell what changed.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::value::{FieldValue, Payload};

/// One revision of a logical entity, valid over
/// `[temporal_start, temporal_end)`.
#[derive(Debug, Clone, Serialize)]
pub struct Revision {
  pub(crate) id:             Uuid,
  pub(crate) version:        u32,
  pub(crate) temporal_start: DateTime<Utc>,
  pub(crate) temporal_end:   DateTime<Utc>,
  pub(crate) updated_at:     Option<DateTime<Utc>>,
  pub(crate) payload:        Payload,
  /// Payload as last read from or written to the store.
  #[serde(skip)]
  pub(crate) original:       Payload,
}

impl Revision {
  /// Rebuild a revision from stored column values. The payload is treated as
  /// clean.
  pub fn hydrate(
    id: Uuid,
    version: u32,
    temporal_start: DateTime<Utc>,
    temporal_end: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    payload: Payload,
  ) -> Self {
    Self {
      id,
      version,
      temporal_start,
      temporal_end,
      updated_at,
      original: payload.clone(),
      payload,
    }
  }

  pub fn id(&self) -> Uuid { self.id }

  pub fn version(&self) -> u32 { self.version }

  pub fn temporal_start(&self) -> DateTime<Utc> { self.temporal_start }

  pub fn temporal_end(&self) -> DateTime<Utc> { self.temporal_end }

  pub fn updated_at(&self) -> Option<DateTime<Utc>> { self.updated_at }

  pub fn payload(&self) -> &Payload { &self.payload }

  pub fn get(&self, field: &str) -> Option<&FieldValue> { self.payload.get(field) }

  /// Stage a payload change. Nothing is written until a transition runs.
  pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
    self.payload.insert(field.into(), value.into());
  }

  /// Whether this revision is the active one, by timestamp equality with the
  /// sentinel.
  pub fn is_current(&self, max_timestamp: DateTime<Utc>) -> bool {
    self.temporal_end == max_timestamp
  }

  /// Whether `at` falls inside `[temporal_start, temporal_end)`.
  pub fn contains(&self, at: DateTime<Utc>) -> bool {
    self.temporal_start <= at && at < self.temporal_end
  }

  /// Payload fields whose staged value differs from the stored one.
  pub fn changed_fields(&self) -> BTreeSet<&str> {
    let mut changed: BTreeSet<&str> = self
      .payload
      .iter()
      .filter(|(k, v)| !self.original.get(k.as_str()).is_some_and(|o| o.same_as(v)))
      .map(|(k, _)| k.as_str())
      .collect();
    // Removing a key from the map is treated as setting it to NULL.
    changed.extend(
      self
        .original
        .iter()
        .filter(|(k, v)| !v.is_null() && !self.payload.contains_key(k.as_str()))
        .map(|(k, _)| k.as_str()),
    );
    changed
  }

  pub fn is_dirty(&self) -> bool { !self.changed_fields().is_empty() }

  /// Drop staged changes.
  pub fn discard_changes(&mut self) { self.payload = self.original.clone(); }

  /// Same logical state, ignoring which changes are staged.
  pub fn same_state(&self, other: &Self) -> bool {
    self.id == other.id
      && self.version == other.version
      && self.temporal_start == other.temporal_start
      && self.temporal_end == other.temporal_end
      && self.updated_at == other.updated_at
      && self.payload == other.payload
  }
}
