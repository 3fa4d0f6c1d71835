//! Provisioning for versioned tables.
//!
//! The DDL is derived from the [`EntitySchema`] and executed once when a store
//! is opened. An existing table is never altered; [`verify`] reports what is
//! missing or misspelled instead.

use std::collections::HashSet;

use tempora_core::config::EntitySchema;

use crate::{
  encode::{TIMESTAMP_GLOB, encode_dt},
  sql::quote,
};

/// `CREATE TABLE IF NOT EXISTS` for the versioned table.
///
/// Payload columns are declared without a type so SQLite stores each value
/// in the storage class it was written with.
pub fn table_sql(schema: &EntitySchema) -> String {
  let cfg = &schema.versioning;
  let id = quote(&schema.id_column);
  let version = quote(cfg.version_column());
  let start = quote(cfg.temporal_start_column());
  let end = quote(cfg.temporal_end_column());

  let mut columns = vec![
    format!("{id} TEXT NOT NULL"),
    format!("{version} INTEGER NOT NULL CHECK ({version} >= 1)"),
    format!("{start} TEXT NOT NULL"),
    format!("{end} TEXT NOT NULL"),
  ];
  if let Some(audit) = &schema.audit_column {
    columns.push(format!("{} TEXT", quote(audit)));
  }
  columns.extend(schema.payload_columns.iter().map(|c| quote(c)));
  columns.push(format!("PRIMARY KEY ({id}, {version})"));
  columns.push(format!("CHECK ({end} >= {start})"));

  format!(
    "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
    quote(&schema.table),
    columns.join(",\n    ")
  )
}

/// Supporting indexes: current-row lookups, as-of lookups, and a partial
/// unique index allowing at most one open revision per id.
pub fn index_sql(schema: &EntitySchema) -> String {
  let cfg = &schema.versioning;
  let table = &schema.table;
  let id = quote(&schema.id_column);
  let start = quote(cfg.temporal_start_column());
  let end = quote(cfg.temporal_end_column());
  let max = encode_dt(cfg.max_timestamp());

  format!(
    "CREATE INDEX IF NOT EXISTS {current} ON {t} ({end}, {id});
CREATE INDEX IF NOT EXISTS {as_of} ON {t} ({id}, {start}, {end});
CREATE UNIQUE INDEX IF NOT EXISTS {one_open} ON {t} ({id}) WHERE {end} = '{max}';",
    current = quote(&format!("{table}_current_idx")),
    as_of = quote(&format!("{table}_as_of_idx")),
    one_open = quote(&format!("{table}_one_open_idx")),
    t = quote(table),
  )
}

/// Compare the live table against `schema`. Returns one message per problem;
/// empty means the table is usable.
pub fn verify(
  conn: &rusqlite::Connection,
  schema: &EntitySchema,
) -> rusqlite::Result<Vec<String>> {
  let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(&schema.table)))?;
  let info: Vec<(String, i64)> = stmt
    .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i64>(5)?)))?
    .collect::<rusqlite::Result<_>>()?;

  if info.is_empty() {
    return Ok(vec![format!("table {:?} does not exist", schema.table)]);
  }

  let present: HashSet<&str> = info.iter().map(|(name, _)| name.as_str()).collect();
  let mut problems: Vec<String> = schema
    .all_columns()
    .filter(|c| !present.contains(c))
    .map(|c| format!("missing column {c:?}"))
    .collect();

  let mut pk: Vec<(i64, &str)> = info
    .iter()
    .filter(|(_, pk)| *pk > 0)
    .map(|(name, pk)| (*pk, name.as_str()))
    .collect();
  pk.sort_unstable();
  let pk: Vec<&str> = pk.into_iter().map(|(_, name)| name).collect();
  let expected = [schema.id_column.as_str(), schema.versioning.version_column()];
  if pk != expected {
    problems.push(format!("primary key is {pk:?}, expected {expected:?}"));
  }

  // Rows written by other tools must use the canonical timestamp text, or the
  // current filter and the concurrency check will not see them.
  let cfg = &schema.versioning;
  let timestamps = [cfg.temporal_start_column(), cfg.temporal_end_column()]
    .into_iter()
    .chain(schema.audit_column.as_deref())
    .filter(|c| present.contains(c));
  for column in timestamps {
    let col = quote(column);
    let misspelled: i64 = conn.query_row(
      &format!(
        "SELECT COUNT(*) FROM {} WHERE {col} IS NOT NULL AND NOT ({col} GLOB '{TIMESTAMP_GLOB}')",
        quote(&schema.table),
      ),
      [],
      |row| row.get(0),
    )?;
    if misspelled > 0 {
      problems.push(format!(
        "{misspelled} row(s) hold a non-canonical timestamp in {column:?}"
      ));
    }
  }

  Ok(problems)
}
