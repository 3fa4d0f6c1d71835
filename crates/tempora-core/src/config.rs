//! Versioning configuration and the per-entity-type table description.
//!
//! Both structs deserialize with defaults for every field, so a config file
//! only needs to name what differs from the conventional layout. Validation
//! happens once, in [`EntitySchema::validate`]; after that the engine reads
//! the resolved values without further checks.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, TimeZone as _, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result, clock::truncate_micros, value::Payload};

// ─── VersioningConfig ────────────────────────────────────────────────────────

/// Column names and sentinel used by the versioning engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersioningConfig {
  pub version_column:        String,
  pub temporal_start_column: String,
  pub temporal_end_column:   String,
  /// `temporal_end` value of the active revision.
  pub max_timestamp:         DateTime<Utc>,
  /// Payload fields that may change without producing a new revision.
  pub overwritable:          BTreeSet<String>,
}

impl Default for VersioningConfig {
  fn default() -> Self {
    Self {
      version_column:        "version".into(),
      temporal_start_column: "temporal_start".into(),
      temporal_end_column:   "temporal_end".into(),
      max_timestamp:         default_max_timestamp(),
      overwritable:          BTreeSet::new(),
    }
  }
}

/// `2999-01-01T00:00:00Z`.
pub fn default_max_timestamp() -> DateTime<Utc> {
  Utc
    .with_ymd_and_hms(2999, 1, 1, 0, 0, 0)
    .single()
    .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl VersioningConfig {
  pub fn version_column(&self) -> &str { &self.version_column }

  pub fn temporal_start_column(&self) -> &str { &self.temporal_start_column }

  pub fn temporal_end_column(&self) -> &str { &self.temporal_end_column }

  pub fn max_timestamp(&self) -> DateTime<Utc> { self.max_timestamp }

  pub fn is_overwritable(&self, field: &str) -> bool {
    self.overwritable.contains(field)
  }

  pub fn with_overwritable<I, S>(mut self, fields: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.overwritable = fields.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_max_timestamp(mut self, max: DateTime<Utc>) -> Self {
    self.max_timestamp = max;
    self
  }
}

// ─── EntitySchema ────────────────────────────────────────────────────────────

/// Describes one versioned table: its name, identity column, payload columns
/// and versioning configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitySchema {
  pub table:           String,
  #[serde(default = "default_id_column")]
  pub id_column:       String,
  #[serde(default)]
  pub payload_columns: Vec<String>,
  /// Audit timestamp refreshed by save, overwrite and restore.
  #[serde(default = "default_audit_column")]
  pub audit_column:    Option<String>,
  #[serde(default)]
  pub versioning:      VersioningConfig,
}

fn default_id_column() -> String { "id".into() }

fn default_audit_column() -> Option<String> { Some("updated_at".into()) }

impl EntitySchema {
  pub fn new<I, S>(table: impl Into<String>, payload_columns: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      table:           table.into(),
      id_column:       default_id_column(),
      payload_columns: payload_columns.into_iter().map(Into::into).collect(),
      audit_column:    default_audit_column(),
      versioning:      VersioningConfig::default(),
    }
  }

  pub fn with_versioning(mut self, versioning: VersioningConfig) -> Self {
    self.versioning = versioning;
    self
  }

  pub fn without_audit_column(mut self) -> Self {
    self.audit_column = None;
    self
  }

  /// Check identifiers and the overwritable set, and normalise the sentinel
  /// to storage precision. Call once before handing the schema to a store.
  pub fn validate(mut self) -> Result<Self> {
    let mut seen = HashSet::new();
    for column in self.all_columns() {
      if !is_identifier(column) {
        return Err(Error::InvalidIdentifier(column.to_owned()));
      }
      if !seen.insert(column.to_ascii_lowercase()) {
        return Err(Error::InvalidSchema(format!("duplicate column {column:?}")));
      }
    }
    if !is_identifier(&self.table) {
      return Err(Error::InvalidIdentifier(self.table.clone()));
    }

    for field in &self.versioning.overwritable {
      if !self.is_payload_column(field) {
        return Err(Error::InvalidSchema(format!(
          "overwritable field {field:?} is not a payload column"
        )));
      }
    }
    if !self.payload_columns.is_empty()
      && self.versioning.overwritable.len() == self.payload_columns.len()
    {
      return Err(Error::InvalidSchema(
        "overwritable fields must be a strict subset of the payload columns".into(),
      ));
    }

    self.versioning.max_timestamp = truncate_micros(self.versioning.max_timestamp);
    Ok(self)
  }

  /// Identity, versioning, audit and payload columns, in storage order.
  pub fn all_columns(&self) -> impl Iterator<Item = &str> {
    [
      self.id_column.as_str(),
      self.versioning.version_column(),
      self.versioning.temporal_start_column(),
      self.versioning.temporal_end_column(),
    ]
    .into_iter()
    .chain(self.audit_column.as_deref())
    .chain(self.payload_columns.iter().map(String::as_str))
  }

  pub fn has_column(&self, name: &str) -> bool {
    self.all_columns().any(|c| c == name)
  }

  pub fn is_payload_column(&self, name: &str) -> bool {
    self.payload_columns.iter().any(|c| c == name)
  }

  /// Reject unknown or engine-managed keys and fill absent payload columns
  /// with `NULL`, so the in-memory payload matches what a read returns.
  pub fn normalize_payload(&self, mut payload: Payload) -> Result<Payload> {
    self.check_payload(&payload)?;
    for column in &self.payload_columns {
      payload.entry(column.clone()).or_insert(crate::value::FieldValue::Null);
    }
    Ok(payload)
  }

  /// Reject unknown or engine-managed keys, and NaN values.
  pub fn check_payload(&self, payload: &Payload) -> Result<()> {
    for (key, value) in payload {
      if !self.is_payload_column(key) {
        return Err(if self.has_column(key) {
          Error::ReservedColumn(key.clone())
        } else {
          Error::UnknownColumn(key.clone())
        });
      }
      if value.is_nan() {
        return Err(Error::NotANumber(key.clone()));
      }
    }
    Ok(())
  }
}

/// A plain SQL identifier: ASCII letter or underscore, then letters, digits
/// or underscores.
pub fn is_identifier(s: &str) -> bool {
  let mut chars = s.chars();
  matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
