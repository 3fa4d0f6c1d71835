//! The pure half of the version transition engine.
//!
//! Backends own the statements; this module owns the decisions: whether a
//! revision may be written at all, whether a change is an overwrite or a new
//! version, and what the revision looks like after each transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  Error, Result,
  clock::{Clock, truncate_micros},
  config::VersioningConfig,
  revision::Revision,
  value::Payload,
};

/// Lifecycle state of one entity id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
  /// Exactly one revision is open.
  Active,
  /// Revisions exist, none is open.
  Deleted,
  /// No revision exists.
  Purged,
}

impl EntityState {
  pub fn from_counts(total: u64, active: u64) -> Self {
    match (total, active) {
      (0, _) => Self::Purged,
      (_, 0) => Self::Deleted,
      _ => Self::Active,
    }
  }
}

/// Result of [`VersionedStore::save`](crate::store::VersionedStore::save).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveOutcome {
  /// The open revision was closed and a new one inserted.
  NewVersion,
  /// Only overwritable fields changed; the open revision was updated in place.
  Overwritten,
  /// Nothing changed; no statement was issued.
  Unchanged,
  /// An observer cancelled the transition.
  Vetoed,
}

/// How a staged change must be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
  Unchanged,
  Overwrite,
  NewVersion,
}

/// Classify the staged changes of `revision`: an overwrite when every changed
/// field is overwritable, otherwise a new version.
pub fn classify(revision: &Revision, cfg: &VersioningConfig) -> ChangeKind {
  let changed = revision.changed_fields();
  if changed.is_empty() {
    ChangeKind::Unchanged
  } else if changed.iter().all(|f| cfg.is_overwritable(f)) {
    ChangeKind::Overwrite
  } else {
    ChangeKind::NewVersion
  }
}

/// Fail with [`Error::StaleRevision`] unless `revision` is the open one.
pub fn ensure_current(revision: &Revision, cfg: &VersioningConfig) -> Result<()> {
  if revision.is_current(cfg.max_timestamp()) {
    Ok(())
  } else {
    Err(Error::StaleRevision { id: revision.id(), version: revision.version() })
  }
}

/// The timestamp a transition on `revision` records: the clock's reading,
/// never earlier than the revision's own start.
pub fn transition_time(clock: &dyn Clock, revision: &Revision) -> DateTime<Utc> {
  truncate_micros(clock.now()).max(revision.temporal_start())
}

impl Revision {
  /// Version 1 of a new entity.
  pub fn initial(
    id: uuid::Uuid,
    payload: Payload,
    now: DateTime<Utc>,
    cfg: &VersioningConfig,
    audited: bool,
  ) -> Self {
    Self::hydrate(
      id,
      1,
      now,
      cfg.max_timestamp(),
      audited.then_some(now),
      payload,
    )
  }

  /// The revision that replaces this one at `now`: next version number, open
  /// interval, full staged payload.
  pub fn successor(
    &self,
    now: DateTime<Utc>,
    cfg: &VersioningConfig,
    audited: bool,
  ) -> Result<Self> {
    let version = self.version.checked_add(1).ok_or(Error::VersionOverflow(self.id))?;
    Ok(Self::hydrate(
      self.id,
      version,
      now,
      cfg.max_timestamp(),
      audited.then_some(now),
      self.payload.clone(),
    ))
  }

  /// This revision with its interval closed at `now`. Staged changes are
  /// kept staged.
  pub fn closed_at(&self, now: DateTime<Utc>) -> Self {
    Self { temporal_end: now, ..self.clone() }
  }

  /// This revision re-opened at `now`.
  pub fn reopened(&self, now: DateTime<Utc>, cfg: &VersioningConfig, audited: bool) -> Self {
    Self {
      temporal_end: cfg.max_timestamp(),
      updated_at: audited.then_some(now),
      ..self.clone()
    }
  }

  /// This revision after its staged changes were written in place at `now`.
  pub fn overwritten(&self, now: DateTime<Utc>, audited: bool) -> Self {
    Self {
      updated_at: audited.then_some(now),
      original: self.payload.clone(),
      ..self.clone()
    }
  }
}
