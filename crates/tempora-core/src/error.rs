//! Error types for `tempora-core`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// A transition was attempted on a revision whose interval is already
  /// closed. The caller must re-read the current revision.
  #[error("revision {version} of {id} is not the current revision")]
  StaleRevision { id: Uuid, version: u32 },

  /// A version-constrained write matched no row: another writer advanced or
  /// deleted the revision between read and write.
  #[error("revision {version} of {id} was changed by another writer")]
  Conflict { id: Uuid, version: u32 },

  #[error("entity not found: {0}")]
  EntityNotFound(Uuid),

  #[error("unknown column: {0:?}")]
  UnknownColumn(String),

  #[error("column {0:?} is managed by the versioning engine")]
  ReservedColumn(String),

  #[error("invalid identifier: {0:?}")]
  InvalidIdentifier(String),

  #[error("invalid entity schema: {0}")]
  InvalidSchema(String),

  /// SQLite cannot store NaN; it would read back as NULL.
  #[error("column {0:?} holds NaN")]
  NotANumber(String),

  #[error("bulk operations do not accept {0}")]
  UnsupportedQuery(&'static str),

  #[error("entity {0} has reached the highest version number")]
  VersionOverflow(Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// Coarse category of a failure, shared by every backend's error type so
/// outer layers can react without knowing the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  StaleRevision,
  Conflict,
  NotFound,
  InvalidInput,
  Provisioning,
  Store,
}

/// Implemented by every error type a [`VersionedStore`](crate::store::VersionedStore)
/// may return.
pub trait Classify {
  fn kind(&self) -> ErrorKind;
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::StaleRevision { .. } => ErrorKind::StaleRevision,
      Self::Conflict { .. } => ErrorKind::Conflict,
      Self::EntityNotFound(_) => ErrorKind::NotFound,
      Self::UnknownColumn(_)
      | Self::ReservedColumn(_)
      | Self::InvalidIdentifier(_)
      | Self::InvalidSchema(_)
      | Self::NotANumber(_)
      | Self::UnsupportedQuery(_) => ErrorKind::InvalidInput,
      Self::VersionOverflow(_) => ErrorKind::Store,
    }
  }
}
