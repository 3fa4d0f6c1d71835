//! The SQLite implementation of [`VersionedStore`].

use std::{fmt, path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior, params_from_iter, types::Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use tempora_core::{
  clock::{Clock, SystemClock, truncate_micros},
  config::EntitySchema,
  hooks::{Event, Hooks, Observer},
  query::{Order, Predicate, VersionQuery},
  revision::Revision,
  scope::{TemporalScope as _, current_filter},
  store::VersionedStore,
  transition::{self, ChangeKind, EntityState, SaveOutcome},
  value::Payload,
};

use crate::{
  Error, Result,
  encode::{RawRevision, encode_uuid},
  schema,
  sql::{self, Sql},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// One versioned table backed by a SQLite file.
///
/// Cloning is cheap; the inner connection, schema and observers are
/// reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:   tokio_rusqlite::Connection,
  schema: Arc<EntitySchema>,
  clock:  Arc<dyn Clock>,
  hooks:  Hooks,
}

impl fmt::Debug for SqliteStore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("SqliteStore")
      .field("table", &self.schema.table)
      .field("hooks", &self.hooks)
      .finish_non_exhaustive()
  }
}

/// What the restore transaction found.
enum RestoreStep {
  AlreadyActive,
  Missing,
  Reopened(RawRevision),
}

impl SqliteStore {
  /// Open (or create) a store at `path`, validate `schema` and provision its
  /// table.
  pub async fn open(path: impl AsRef<Path>, schema: EntitySchema) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::attach(conn, schema, Arc::new(SystemClock)).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory(schema: EntitySchema) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::attach(conn, schema, Arc::new(SystemClock)).await
  }

  /// A store for another versioned table on the same connection. Observers
  /// are not carried over.
  pub async fn for_schema(&self, schema: EntitySchema) -> Result<Self> {
    Self::attach(self.conn.clone(), schema, Arc::clone(&self.clock)).await
  }

  async fn attach(
    conn: tokio_rusqlite::Connection,
    schema: EntitySchema,
    clock: Arc<dyn Clock>,
  ) -> Result<Self> {
    let schema = schema.validate()?;
    let store = Self { conn, schema: Arc::new(schema), clock, hooks: Hooks::default() };
    store.provision().await?;
    Ok(store)
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
    self.hooks.register(observer);
    self
  }

  /// Create the table and indexes if absent, then check the table's shape.
  async fn provision(&self) -> Result<()> {
    let schema = Arc::clone(&self.schema);
    let problems = self
      .conn
      .call(move |conn| {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
          row.get::<_, String>(0)
        })?;
        conn.execute_batch(&schema::table_sql(&schema))?;
        let problems = schema::verify(conn, &schema)?;
        if problems.is_empty() {
          conn.execute_batch(&schema::index_sql(&schema))?;
        }
        Ok(problems)
      })
      .await?;

    self.provisioning_result(problems)?;
    info!(table = %self.schema.table, "versioned table ready");
    Ok(())
  }

  /// Re-check the live table against the schema without changing it.
  pub async fn verify_schema(&self) -> Result<()> {
    let schema = Arc::clone(&self.schema);
    let problems = self
      .conn
      .call(move |conn| Ok(schema::verify(conn, &schema)?))
      .await?;
    self.provisioning_result(problems)
  }

  fn provisioning_result(&self, problems: Vec<String>) -> Result<()> {
    if problems.is_empty() {
      return Ok(());
    }
    Err(Error::Provisioning {
      table:    self.schema.table.clone(),
      problems: problems.join("; "),
    })
  }

  fn now(&self) -> DateTime<Utc> { truncate_micros(self.clock.now()) }

  fn audited(&self) -> bool { self.schema.audit_column.is_some() }

  /// Bulk writes act on every matching row, so a limit or offset is refused.
  fn reject_window(query: &VersionQuery) -> Result<()> {
    let unsupported = match (query.limit_value(), query.offset_value()) {
      (Some(_), _) => "a limit",
      (None, Some(_)) => "an offset",
      (None, None) => return Ok(()),
    };
    Err(tempora_core::Error::UnsupportedQuery(unsupported).into())
  }

  fn for_id(&self, id: Uuid) -> VersionQuery {
    VersionQuery::new().filter(Predicate::eq(self.schema.id_column.clone(), encode_uuid(id)))
  }

  fn conflict(&self, revision: &Revision) -> Error {
    warn!(
      table = %self.schema.table,
      id = %revision.id(),
      version = revision.version(),
      "write lost the optimistic concurrency check"
    );
    tempora_core::Error::Conflict { id: revision.id(), version: revision.version() }.into()
  }

  /// Run one statement outside an explicit transaction.
  async fn execute(&self, statement: Sql) -> Result<usize> {
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(conn.execute(&statement.text, params_from_iter(statement.params.iter()))?)
        })
        .await?,
    )
  }

  async fn fetch(&self, query: &VersionQuery) -> Result<Vec<Revision>> {
    let statement = sql::select(&self.schema, query)?;
    let schema = Arc::clone(&self.schema);

    let raws: Vec<RawRevision> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&statement.text)?;
        let rows = stmt
          .query_map(params_from_iter(statement.params.iter()), |row| {
            RawRevision::from_row(row, &schema)
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRevision::into_revision).collect()
  }

  async fn fetch_one(&self, query: VersionQuery) -> Result<Option<Revision>> {
    Ok(self.fetch(&query.limit(1)).await?.into_iter().next())
  }

  // ── Transition bodies ─────────────────────────────────────────────────────

  /// Close the open row and insert its successor in one IMMEDIATE
  /// transaction. Nothing is committed unless the close matched exactly one
  /// row.
  async fn write_new_version(&self, revision: &mut Revision) -> Result<SaveOutcome> {
    if !self.hooks.before(Event::Saving, revision.id(), Some(&*revision)) {
      return Ok(SaveOutcome::Vetoed);
    }

    let now = transition::transition_time(self.clock.as_ref(), revision);
    let next = revision.successor(now, &self.schema.versioning, self.audited())?;
    let close = sql::close_open_row(&self.schema, revision, now);
    let insert = sql::insert(&self.schema, &next);

    let committed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if tx.execute(&close.text, params_from_iter(close.params.iter()))? != 1 {
          return Ok(false);
        }
        tx.execute(&insert.text, params_from_iter(insert.params.iter()))?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !committed {
      return Err(self.conflict(revision));
    }

    *revision = next;
    debug!(
      table = %self.schema.table,
      id = %revision.id(),
      version = revision.version(),
      "new version"
    );
    self.hooks.after(Event::Saved, revision.id(), Some(&*revision));
    Ok(SaveOutcome::NewVersion)
  }

  async fn write_in_place(&self, revision: &mut Revision) -> Result<SaveOutcome> {
    transition::ensure_current(revision, &self.schema.versioning)?;
    self.schema.check_payload(revision.payload())?;

    if !revision.is_dirty() {
      return Ok(SaveOutcome::Unchanged);
    }
    if !self.hooks.before(Event::Overwriting, revision.id(), Some(&*revision)) {
      return Ok(SaveOutcome::Vetoed);
    }

    let now = transition::transition_time(self.clock.as_ref(), revision);
    let update = {
      let changed: Vec<&str> = revision.changed_fields().into_iter().collect();
      sql::overwrite_open_row(&self.schema, revision, &changed, now)
    };

    if self.execute(update).await? == 0 {
      return Err(self.conflict(revision));
    }

    *revision = revision.overwritten(now, self.audited());
    debug!(
      table = %self.schema.table,
      id = %revision.id(),
      version = revision.version(),
      "overwritten in place"
    );
    self.hooks.after(Event::Overwritten, revision.id(), Some(&*revision));
    Ok(SaveOutcome::Overwritten)
  }
}

// ─── VersionedStore impl ─────────────────────────────────────────────────────

impl VersionedStore for SqliteStore {
  type Error = Error;

  fn schema(&self) -> &EntitySchema { &self.schema }

  // ── Transitions ───────────────────────────────────────────────────────────

  async fn create(&self, payload: Payload) -> Result<Revision> {
    self.create_with_id(Uuid::new_v4(), payload).await
  }

  async fn create_with_id(&self, id: Uuid, payload: Payload) -> Result<Revision> {
    let payload = self.schema.normalize_payload(payload)?;
    let revision = Revision::initial(
      id,
      payload,
      self.now(),
      &self.schema.versioning,
      self.audited(),
    );

    self.execute(sql::insert(&self.schema, &revision)).await?;
    debug!(table = %self.schema.table, %id, "created");
    Ok(revision)
  }

  async fn save(&self, revision: &mut Revision) -> Result<SaveOutcome> {
    transition::ensure_current(revision, &self.schema.versioning)?;
    self.schema.check_payload(revision.payload())?;

    match transition::classify(revision, &self.schema.versioning) {
      ChangeKind::Unchanged => Ok(SaveOutcome::Unchanged),
      ChangeKind::Overwrite => self.write_in_place(revision).await,
      ChangeKind::NewVersion => self.write_new_version(revision).await,
    }
  }

  async fn overwrite(&self, revision: &mut Revision) -> Result<bool> {
    Ok(self.write_in_place(revision).await? == SaveOutcome::Overwritten)
  }

  async fn delete(&self, revision: &mut Revision) -> Result<bool> {
    transition::ensure_current(revision, &self.schema.versioning)?;
    if !self.hooks.before(Event::Deleting, revision.id(), Some(&*revision)) {
      return Ok(false);
    }

    let now = transition::transition_time(self.clock.as_ref(), revision);
    if self.execute(sql::close_open_row(&self.schema, revision, now)).await? == 0 {
      return Err(self.conflict(revision));
    }

    *revision = revision.closed_at(now);
    debug!(
      table = %self.schema.table,
      id = %revision.id(),
      version = revision.version(),
      "deleted"
    );
    self.hooks.after(Event::Deleted, revision.id(), Some(&*revision));
    Ok(true)
  }

  async fn restore(&self, revision: &mut Revision) -> Result<bool> {
    let id = revision.id();
    match self.state(id).await? {
      EntityState::Active => return Ok(false),
      EntityState::Purged => return Err(tempora_core::Error::EntityNotFound(id).into()),
      EntityState::Deleted => {}
    }
    if !self.hooks.before(Event::Restoring, id, Some(&*revision)) {
      return Ok(false);
    }

    let now = self.now();
    let schema = Arc::clone(&self.schema);
    let count = sql::count_states(&self.schema, id);
    let latest = sql::latest_text(&self.schema);
    let reopen = sql::reopen(&self.schema, now);
    let id_str = encode_uuid(id);

    // The state check above is repeated inside the transaction; another
    // writer may have restored or purged in between.
    let step = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (total, active): (i64, i64) = tx.query_row(
          &count.text,
          params_from_iter(count.params.iter()),
          |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        if active > 0 {
          return Ok(RestoreStep::AlreadyActive);
        }
        if total == 0 {
          return Ok(RestoreStep::Missing);
        }

        let Some(raw) = tx
          .query_row(&latest, [&id_str], |row| RawRevision::from_row(row, &schema))
          .optional()?
        else {
          return Ok(RestoreStep::Missing);
        };

        let mut params = reopen.params;
        params.push(Value::Text(id_str));
        params.push(Value::Integer(raw.version.into()));
        tx.execute(&reopen.text, params_from_iter(params.iter()))?;
        tx.commit()?;
        Ok(RestoreStep::Reopened(raw))
      })
      .await?;

    match step {
      RestoreStep::AlreadyActive => Ok(false),
      RestoreStep::Missing => Err(tempora_core::Error::EntityNotFound(id).into()),
      RestoreStep::Reopened(raw) => {
        *revision = raw
          .into_revision()?
          .reopened(now, &self.schema.versioning, self.audited());
        debug!(
          table = %self.schema.table,
          %id,
          version = revision.version(),
          "restored"
        );
        self.hooks.after(Event::Restored, id, Some(&*revision));
        Ok(true)
      }
    }
  }

  async fn purge(&self, id: Uuid) -> Result<usize> {
    if !self.hooks.before(Event::Purging, id, None) {
      return Ok(0);
    }
    let removed = self.execute(sql::purge(&self.schema, id)).await?;
    debug!(table = %self.schema.table, %id, removed, "purged");
    self.hooks.after(Event::Purged, id, None);
    Ok(removed)
  }

  // ── Navigation ────────────────────────────────────────────────────────────

  async fn previous_version(&self, revision: &Revision) -> Result<Option<Revision>> {
    if revision.version() <= 1 {
      return Ok(None);
    }
    self.at_version(revision.id(), revision.version() - 1).await
  }

  async fn next_version(&self, revision: &Revision) -> Result<Option<Revision>> {
    match revision.version().checked_add(1) {
      Some(next) => self.at_version(revision.id(), next).await,
      None => Ok(None),
    }
  }

  async fn first_version(&self, id: Uuid) -> Result<Option<Revision>> {
    self.fetch_one(self.for_id(id).first_versions()).await
  }

  async fn at_version(&self, id: Uuid, version: u32) -> Result<Option<Revision>> {
    self.fetch_one(self.for_id(id).versions_at(version)).await
  }

  async fn current_version(&self, id: Uuid) -> Result<Option<Revision>> {
    self.fetch_one(self.for_id(id).current_versions()).await
  }

  async fn latest_version(&self, id: Uuid) -> Result<Option<Revision>> {
    let version = self.schema.versioning.version_column().to_owned();
    self
      .fetch_one(self.for_id(id).all_versions().order_by(Order::desc(version)))
      .await
  }

  async fn at_date(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Revision>> {
    let version = self.schema.versioning.version_column().to_owned();
    self
      .fetch_one(self.for_id(id).versions_at_date(at).order_by(Order::desc(version)))
      .await
  }

  async fn in_range(
    &self,
    id: Uuid,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
  ) -> Result<Vec<Revision>> {
    self.fetch(&self.for_id(id).versions_in_range(from, to)).await
  }

  async fn all_versions(&self, id: Uuid) -> Result<Vec<Revision>> {
    let version = self.schema.versioning.version_column().to_owned();
    self
      .fetch(&self.for_id(id).all_versions().order_by(Order::asc(version)))
      .await
  }

  async fn state(&self, id: Uuid) -> Result<EntityState> {
    let count = sql::count_states(&self.schema, id);
    let (total, active): (i64, i64) = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(&count.text, params_from_iter(count.params.iter()), |row| {
          Ok((row.get(0)?, row.get(1)?))
        })?)
      })
      .await?;
    Ok(EntityState::from_counts(total.max(0) as u64, active.max(0) as u64))
  }

  // ── Collection ────────────────────────────────────────────────────────────

  async fn find(&self, query: &VersionQuery) -> Result<Vec<Revision>> {
    self.fetch(query).await
  }

  async fn delete_where(&self, query: &VersionQuery) -> Result<usize> {
    Self::reject_window(query)?;
    let cfg = &self.schema.versioning;
    // Only open rows are closed, whatever scope the query carries.
    let predicate = match query.predicate(cfg) {
      Some(p) => p.and(current_filter(cfg)),
      None => current_filter(cfg),
    };
    let statement = sql::close_matching(&self.schema, &predicate, self.now())?;
    let closed = self.execute(statement).await?;
    debug!(table = %self.schema.table, closed, "bulk soft delete");
    Ok(closed)
  }

  async fn update_where_unversioned(
    &self,
    query: &VersionQuery,
    changes: Payload,
  ) -> Result<usize> {
    Self::reject_window(query)?;
    if changes.is_empty() {
      return Ok(0);
    }
    self.schema.check_payload(&changes)?;

    let predicate = query.predicate(&self.schema.versioning);
    let statement = sql::update_matching(&self.schema, predicate.as_ref(), &changes)?;
    let updated = self.execute(statement).await?;
    warn!(table = %self.schema.table, updated, "unversioned bulk update");
    Ok(updated)
  }
}
