//! Encoding and decoding helpers between Rust domain types and the plain
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width UTC text with microsecond precision,
//! so lexical order in SQL equals time order. Every comparison in SQL is on
//! that text, so only the canonical spelling is accepted on the way back. UUIDs are stored as hyphenated
//! lowercase strings. Payload values map one-to-one onto SQLite storage
//! classes.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::Value;
use tempora_core::{
  config::EntitySchema,
  query::Operand,
  revision::Revision,
  value::{FieldValue, Payload},
};
use uuid::Uuid;

use crate::{Error, Result};

/// `2999-01-01T00:00:00.000000Z`
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// SQLite `GLOB` pattern matching exactly the spelling of [`encode_dt`].
pub const TIMESTAMP_GLOB: &str =
  "[0-9][0-9][0-9][0-9]-[0-9][0-9]-[0-9][0-9]T[0-9][0-9]:[0-9][0-9]:[0-9][0-9].[0-9][0-9][0-9][0-9][0-9][0-9]Z";

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.format(TIMESTAMP_FORMAT).to_string() }

/// Only the exact output of [`encode_dt`] decodes. A row spelled any other
/// way would read as one instant here but compare as another string in SQL.
pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
    .ok()
    .map(|naive| naive.and_utc())
    .filter(|dt| encode_dt(*dt) == s)
    .ok_or_else(|| Error::DateParse(format!("non-canonical timestamp: {s:?}")))
}

// ─── FieldValue ──────────────────────────────────────────────────────────────

pub fn encode_value(v: &FieldValue) -> Value {
  match v {
    FieldValue::Null => Value::Null,
    FieldValue::Integer(i) => Value::Integer(*i),
    FieldValue::Real(f) => Value::Real(*f),
    FieldValue::Text(s) => Value::Text(s.clone()),
    FieldValue::Blob(b) => Value::Blob(b.clone()),
  }
}

pub fn decode_value(v: Value) -> FieldValue {
  match v {
    Value::Null => FieldValue::Null,
    Value::Integer(i) => FieldValue::Integer(i),
    Value::Real(f) => FieldValue::Real(f),
    Value::Text(s) => FieldValue::Text(s),
    Value::Blob(b) => FieldValue::Blob(b),
  }
}

pub fn encode_operand(op: &Operand) -> Value {
  match op {
    Operand::Value(v) => encode_value(v),
    Operand::Instant(dt) => Value::Text(encode_dt(*dt)),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a versioned row, in
/// [`EntitySchema::all_columns`] order.
pub struct RawRevision {
  pub id:             String,
  pub version:        u32,
  pub temporal_start: String,
  pub temporal_end:   String,
  pub updated_at:     Option<String>,
  pub payload:        Vec<(String, Value)>,
}

impl RawRevision {
  pub fn from_row(row: &rusqlite::Row<'_>, schema: &EntitySchema) -> rusqlite::Result<Self> {
    let mut idx = 4;
    let updated_at = match schema.audit_column {
      Some(_) => {
        idx += 1;
        row.get(4)?
      }
      None => None,
    };

    let mut payload = Vec::with_capacity(schema.payload_columns.len());
    for column in &schema.payload_columns {
      payload.push((column.clone(), row.get::<_, Value>(idx)?));
      idx += 1;
    }

    Ok(Self {
      id: row.get(0)?,
      version: row.get(1)?,
      temporal_start: row.get(2)?,
      temporal_end: row.get(3)?,
      updated_at,
      payload,
    })
  }

  pub fn into_revision(self) -> Result<Revision> {
    let payload: Payload = self
      .payload
      .into_iter()
      .map(|(k, v)| (k, decode_value(v)))
      .collect();

    Ok(Revision::hydrate(
      decode_uuid(&self.id)?,
      self.version,
      decode_dt(&self.temporal_start)?,
      decode_dt(&self.temporal_end)?,
      self.updated_at.as_deref().map(decode_dt).transpose()?,
      payload,
    ))
  }
}
