//! Rendering of predicates and versioned statements to SQLite SQL.
//!
//! Identifiers are validated by [`EntitySchema::validate`] before a store is
//! built, and caller-supplied column names are checked against the schema
//! here, so quoting never has to escape anything. Every value is bound as a
//! positional `?` parameter.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use tempora_core::{
  config::EntitySchema,
  query::{CompareOp, Direction, Predicate, VersionQuery},
  revision::Revision,
  value::Payload,
};
use uuid::Uuid;

use crate::{
  Result,
  encode::{encode_dt, encode_operand, encode_uuid, encode_value},
};

pub fn quote(ident: &str) -> String { format!("\"{ident}\"") }

/// SQL text plus its positional parameters.
#[derive(Debug, Default)]
pub struct Sql {
  pub text:   String,
  pub params: Vec<Value>,
}

impl Sql {
  fn push(&mut self, text: &str) { self.text.push_str(text); }

  fn bind(&mut self, value: Value) {
    self.text.push('?');
    self.params.push(value);
  }
}

fn known_column<'a>(schema: &EntitySchema, column: &'a str) -> Result<&'a str> {
  if schema.has_column(column) {
    Ok(column)
  } else {
    Err(tempora_core::Error::UnknownColumn(column.to_owned()).into())
  }
}

// ─── Predicates ──────────────────────────────────────────────────────────────

fn render(p: &Predicate, schema: &EntitySchema, out: &mut Sql) -> Result<()> {
  match p {
    Predicate::Compare { column, op, operand } => {
      let column = quote(known_column(schema, column)?);
      let value = encode_operand(operand);
      // `= NULL` never matches in SQL; callers mean IS NULL.
      match (op, &value) {
        (CompareOp::Eq, Value::Null) => out.push(&format!("{column} IS NULL")),
        (CompareOp::Ne, Value::Null) => out.push(&format!("{column} IS NOT NULL")),
        _ => {
          let op = match op {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
          };
          out.push(&format!("{column} {op} "));
          out.bind(value);
        }
      }
    }
    Predicate::IsNull(column) => {
      out.push(&format!("{} IS NULL", quote(known_column(schema, column)?)))
    }
    Predicate::NotNull(column) => {
      out.push(&format!("{} IS NOT NULL", quote(known_column(schema, column)?)))
    }
    Predicate::And(parts) => render_joined(parts, " AND ", "1 = 1", schema, out)?,
    Predicate::Or(parts) => render_joined(parts, " OR ", "1 = 0", schema, out)?,
    Predicate::Not(inner) => {
      out.push("NOT (");
      render(inner, schema, out)?;
      out.push(")");
    }
  }
  Ok(())
}

fn render_joined(
  parts: &[Predicate],
  sep: &str,
  empty: &str,
  schema: &EntitySchema,
  out: &mut Sql,
) -> Result<()> {
  if parts.is_empty() {
    out.push(empty);
    return Ok(());
  }
  out.push("(");
  for (i, part) in parts.iter().enumerate() {
    if i > 0 {
      out.push(sep);
    }
    render(part, schema, out)?;
  }
  out.push(")");
  Ok(())
}

fn render_where(predicate: Option<&Predicate>, schema: &EntitySchema, out: &mut Sql) -> Result<()> {
  if let Some(p) = predicate {
    out.push(" WHERE ");
    render(p, schema, out)?;
  }
  Ok(())
}

// ─── Reads ───────────────────────────────────────────────────────────────────

pub fn column_list(schema: &EntitySchema) -> String {
  schema.all_columns().map(quote).collect::<Vec<_>>().join(", ")
}

/// `SELECT` for a [`VersionQuery`]: scope and caller filters, scope ordering
/// then caller ordering, limit and offset.
pub fn select(schema: &EntitySchema, query: &VersionQuery) -> Result<Sql> {
  let cfg = &schema.versioning;
  let mut sql = Sql::default();
  sql.push(&format!("SELECT {} FROM {}", column_list(schema), quote(&schema.table)));
  render_where(query.predicate(cfg).as_ref(), schema, &mut sql)?;

  let order = query.ordering(cfg);
  if !order.is_empty() {
    let terms = order
      .iter()
      .map(|o| {
        let dir = match o.direction {
          Direction::Asc => "ASC",
          Direction::Desc => "DESC",
        };
        Ok(format!("{} {dir}", quote(known_column(schema, &o.column)?)))
      })
      .collect::<Result<Vec<_>>>()?;
    sql.push(&format!(" ORDER BY {}", terms.join(", ")));
  }

  match (query.limit_value(), query.offset_value()) {
    (None, None) => {}
    (limit, offset) => {
      sql.push(" LIMIT ");
      sql.bind(Value::Integer(limit.map_or(-1, |l| l as i64)));
      sql.push(" OFFSET ");
      sql.bind(Value::Integer(offset.unwrap_or(0) as i64));
    }
  }
  Ok(sql)
}

/// Total and open revision counts for one id.
pub fn count_states(schema: &EntitySchema, id: Uuid) -> Sql {
  let cfg = &schema.versioning;
  Sql {
    text:   format!(
      "SELECT COUNT(*), COALESCE(SUM({end} = ?), 0) FROM {t} WHERE {id} = ?",
      end = quote(cfg.temporal_end_column()),
      t = quote(&schema.table),
      id = quote(&schema.id_column),
    ),
    params: vec![
      Value::Text(encode_dt(cfg.max_timestamp())),
      Value::Text(encode_uuid(id)),
    ],
  }
}

/// Highest version of one id, open or not. Bound: id.
pub fn latest_text(schema: &EntitySchema) -> String {
  format!(
    "SELECT {} FROM {} WHERE {} = ? ORDER BY {} DESC LIMIT 1",
    column_list(schema),
    quote(&schema.table),
    quote(&schema.id_column),
    quote(schema.versioning.version_column()),
  )
}

// ─── Writes ──────────────────────────────────────────────────────────────────

pub fn insert(schema: &EntitySchema, revision: &Revision) -> Sql {
  let columns = column_list(schema);
  let mut params = vec![
    Value::Text(encode_uuid(revision.id())),
    Value::Integer(revision.version().into()),
    Value::Text(encode_dt(revision.temporal_start())),
    Value::Text(encode_dt(revision.temporal_end())),
  ];
  if schema.audit_column.is_some() {
    params.push(revision.updated_at().map_or(Value::Null, |t| Value::Text(encode_dt(t))));
  }
  params.extend(schema.payload_columns.iter().map(|c| {
    revision.get(c).map_or(Value::Null, encode_value)
  }));

  let placeholders = vec!["?"; params.len()].join(", ");
  Sql {
    text: format!(
      "INSERT INTO {} ({columns}) VALUES ({placeholders})",
      quote(&schema.table)
    ),
    params,
  }
}

/// `WHERE id = ? AND version = ? AND temporal_end = MAX`, the optimistic
/// concurrency constraint shared by every write to the open row.
fn open_row_constraint(schema: &EntitySchema, revision: &Revision, out: &mut Sql) {
  let cfg = &schema.versioning;
  out.push(&format!(" WHERE {} = ", quote(&schema.id_column)));
  out.bind(Value::Text(encode_uuid(revision.id())));
  out.push(&format!(" AND {} = ", quote(cfg.version_column())));
  out.bind(Value::Integer(revision.version().into()));
  out.push(&format!(" AND {} = ", quote(cfg.temporal_end_column())));
  out.bind(Value::Text(encode_dt(cfg.max_timestamp())));
}

/// Close the open row at `now`.
pub fn close_open_row(schema: &EntitySchema, revision: &Revision, now: DateTime<Utc>) -> Sql {
  let mut sql = Sql::default();
  sql.push(&format!(
    "UPDATE {} SET {} = ",
    quote(&schema.table),
    quote(schema.versioning.temporal_end_column())
  ));
  sql.bind(Value::Text(encode_dt(now)));
  open_row_constraint(schema, revision, &mut sql);
  sql
}

/// Write the changed payload columns (and the audit column) into the open row.
pub fn overwrite_open_row(
  schema: &EntitySchema,
  revision: &Revision,
  changed: &[&str],
  now: DateTime<Utc>,
) -> Sql {
  let mut sql = Sql::default();
  sql.push(&format!("UPDATE {} SET ", quote(&schema.table)));
  for (i, column) in changed.iter().enumerate() {
    if i > 0 {
      sql.push(", ");
    }
    sql.push(&format!("{} = ", quote(column)));
    sql.bind(revision.get(column).map_or(Value::Null, encode_value));
  }
  if let Some(audit) = &schema.audit_column {
    sql.push(&format!(", {} = ", quote(audit)));
    sql.bind(Value::Text(encode_dt(now)));
  }
  open_row_constraint(schema, revision, &mut sql);
  sql
}

/// Re-open one closed revision. Bound: id, version.
pub fn reopen(schema: &EntitySchema, now: DateTime<Utc>) -> Sql {
  let cfg = &schema.versioning;
  let mut sql = Sql::default();
  sql.push(&format!(
    "UPDATE {} SET {} = ",
    quote(&schema.table),
    quote(cfg.temporal_end_column())
  ));
  sql.bind(Value::Text(encode_dt(cfg.max_timestamp())));
  if let Some(audit) = &schema.audit_column {
    sql.push(&format!(", {} = ", quote(audit)));
    sql.bind(Value::Text(encode_dt(now)));
  }
  sql.push(&format!(
    " WHERE {} = ? AND {} = ?",
    quote(&schema.id_column),
    quote(cfg.version_column())
  ));
  sql
}

pub fn purge(schema: &EntitySchema, id: Uuid) -> Sql {
  Sql {
    text:   format!(
      "DELETE FROM {} WHERE {} = ?",
      quote(&schema.table),
      quote(&schema.id_column)
    ),
    params: vec![Value::Text(encode_uuid(id))],
  }
}

/// The bulk-delete rewrite: close every row matching `predicate` at `now`.
/// The end is clamped to each row's own start so no interval turns negative.
pub fn close_matching(
  schema: &EntitySchema,
  predicate: &Predicate,
  now: DateTime<Utc>,
) -> Result<Sql> {
  let cfg = &schema.versioning;
  let end = quote(cfg.temporal_end_column());
  let mut sql = Sql::default();
  sql.push(&format!(
    "UPDATE {} SET {end} = MAX({}, ",
    quote(&schema.table),
    quote(cfg.temporal_start_column())
  ));
  sql.bind(Value::Text(encode_dt(now)));
  sql.push(")");
  render_where(Some(predicate), schema, &mut sql)?;
  Ok(sql)
}

/// In-place payload update of every row matching `predicate`.
pub fn update_matching(
  schema: &EntitySchema,
  predicate: Option<&Predicate>,
  changes: &Payload,
) -> Result<Sql> {
  let mut sql = Sql::default();
  sql.push(&format!("UPDATE {} SET ", quote(&schema.table)));
  for (i, (column, value)) in changes.iter().enumerate() {
    if i > 0 {
      sql.push(", ");
    }
    sql.push(&format!("{} = ", quote(column)));
    sql.bind(encode_value(value));
  }
  render_where(predicate, schema, &mut sql)?;
  Ok(sql)
}
