//! Error type for `tempora-store-sqlite`.

use tempora_core::{Classify, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Guard, conflict and validation failures from the engine.
  #[error(transparent)]
  Core(#[from] tempora_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// The versioned table exists but does not have the expected shape.
  #[error("table {table:?} is not provisioned for versioning: {problems}")]
  Provisioning { table: String, problems: String },
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Provisioning { .. } => ErrorKind::Provisioning,
      Self::Database(_) | Self::Uuid(_) | Self::DateParse(_) => ErrorKind::Store,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
