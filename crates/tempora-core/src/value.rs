//! Payload values: the caller-owned attributes duplicated into every
//! revision.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single scalar column value. Mirrors the storage classes of a relational
/// column; richer types are encoded by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
  Null,
  Integer(i64),
  Real(f64),
  Text(String),
  Blob(Vec<u8>),
}

impl FieldValue {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }

  pub fn as_text(&self) -> Option<&str> {
    match self {
      Self::Text(s) => Some(s),
      _ => None,
    }
  }

  pub fn is_nan(&self) -> bool { matches!(self, Self::Real(r) if r.is_nan()) }

  /// Equality that treats two reals with the same bit pattern as equal, NaN
  /// included.
  pub fn same_as(&self, other: &Self) -> bool {
    match (self, other) {
      (Self::Real(a), Self::Real(b)) => a.to_bits() == b.to_bits(),
      _ => self == other,
    }
  }

  pub fn as_integer(&self) -> Option<i64> {
    match self {
      Self::Integer(i) => Some(*i),
      _ => None,
    }
  }
}

/// Payload of one revision, keyed by column name.
pub type Payload = BTreeMap<String, FieldValue>;

impl From<i64> for FieldValue {
  fn from(v: i64) -> Self { Self::Integer(v) }
}

impl From<i32> for FieldValue {
  fn from(v: i32) -> Self { Self::Integer(v.into()) }
}

impl From<u32> for FieldValue {
  fn from(v: u32) -> Self { Self::Integer(v.into()) }
}

impl From<bool> for FieldValue {
  fn from(v: bool) -> Self { Self::Integer(v.into()) }
}

impl From<f64> for FieldValue {
  fn from(v: f64) -> Self { Self::Real(v) }
}

impl From<&str> for FieldValue {
  fn from(v: &str) -> Self { Self::Text(v.to_owned()) }
}

impl From<String> for FieldValue {
  fn from(v: String) -> Self { Self::Text(v) }
}

impl From<Vec<u8>> for FieldValue {
  fn from(v: Vec<u8>) -> Self { Self::Blob(v) }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
  fn from(v: Option<T>) -> Self { v.map_or(Self::Null, Into::into) }
}

/// Build a [`Payload`] from `(column, value)` pairs.
pub fn payload<I, K, V>(pairs: I) -> Payload
where
  I: IntoIterator<Item = (K, V)>,
  K: Into<String>,
  V: Into<FieldValue>,
{
  pairs
    .into_iter()
    .map(|(k, v)| (k.into(), v.into()))
    .collect()
}
