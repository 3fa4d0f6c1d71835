//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, TimeZone as _, Utc};
use tempora_core::{
  Classify as _, ErrorKind,
  clock::ManualClock,
  config::{EntitySchema, VersioningConfig},
  hooks::{Event, HookContext, Observer, Verdict},
  query::{Predicate, VersionQuery},
  revision::Revision,
  scope::TemporalScope as _,
  store::VersionedStore,
  transition::{EntityState, SaveOutcome},
  value::{FieldValue, Payload, payload},
};
use uuid::Uuid;

use crate::SqliteStore;

fn t0() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap() }

fn people() -> EntitySchema {
  EntitySchema::new("people", ["name", "email", "nickname"])
    .with_versioning(VersioningConfig::default().with_overwritable(["nickname"]))
}

async fn store() -> (SqliteStore, Arc<ManualClock>) {
  let clock = Arc::new(ManualClock::new(t0()));
  let store = SqliteStore::open_in_memory(people())
    .await
    .expect("in-memory store")
    .with_clock(clock.clone());
  (store, clock)
}

async fn ada(s: &SqliteStore) -> Revision {
  s.create(payload([("name", "Ada"), ("email", "ada@example.com")]))
    .await
    .unwrap()
}

fn text(v: Option<&FieldValue>) -> Option<&str> { v.and_then(FieldValue::as_text) }

/// A file-backed store, for tests that also need to write rows behind the
/// store's back with a plain connection.
async fn file_store(dir: &tempfile::TempDir) -> (SqliteStore, Arc<ManualClock>) {
  let clock = Arc::new(ManualClock::new(t0()));
  let store = SqliteStore::open(dir.path().join("people.db"), people())
    .await
    .expect("file store")
    .with_clock(clock.clone());
  (store, clock)
}

fn raw_conn(dir: &tempfile::TempDir) -> rusqlite::Connection {
  let conn = rusqlite::Connection::open(dir.path().join("people.db")).unwrap();
  conn.busy_timeout(std::time::Duration::from_secs(5)).unwrap();
  conn
}

// ─── Create ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_opens_version_one() {
  let (s, _) = store().await;
  let rev = ada(&s).await;

  assert_eq!(rev.version(), 1);
  assert_eq!(rev.temporal_start(), t0());
  assert!(rev.is_current(s.schema().versioning.max_timestamp()));
  assert_eq!(rev.updated_at(), Some(t0()));
  assert_eq!(rev.get("nickname"), Some(&FieldValue::Null));

  let fetched = s.current_version(rev.id()).await.unwrap().unwrap();
  assert!(fetched.same_state(&rev));
  assert_eq!(s.state(rev.id()).await.unwrap(), EntityState::Active);
}

#[tokio::test]
async fn create_with_existing_id_fails() {
  let (s, _) = store().await;
  let id = Uuid::new_v4();
  s.create_with_id(id, payload([("name", "Ada")])).await.unwrap();

  let err = s.create_with_id(id, payload([("name", "Bob")])).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Store);
  assert_eq!(s.all_versions(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn create_rejects_unknown_and_reserved_columns() {
  let (s, _) = store().await;

  let err = s.create(payload([("age", 36)])).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidInput);

  let err = s.create(payload([("version", 7)])).await.unwrap_err();
  assert!(matches!(
    err,
    crate::Error::Core(tempora_core::Error::ReservedColumn(ref c)) if c == "version"
  ));
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn full_lifecycle() {
  let (s, clock) = store().await;
  let mut rev = s.create(payload([("name", "test1")])).await.unwrap();
  let id = rev.id();

  clock.advance(Duration::hours(1));
  rev.set("name", "test2");
  assert_eq!(s.save(&mut rev).await.unwrap(), SaveOutcome::NewVersion);
  assert_eq!(rev.version(), 2);
  assert_eq!(rev.temporal_start(), t0() + Duration::hours(1));

  let v1 = s.at_version(id, 1).await.unwrap().unwrap();
  assert_eq!(v1.temporal_end(), t0() + Duration::hours(1));
  assert_eq!(text(v1.get("name")), Some("test1"));

  clock.advance(Duration::hours(1));
  rev.set("nickname", "t");
  assert_eq!(s.save(&mut rev).await.unwrap(), SaveOutcome::Overwritten);
  assert_eq!(rev.version(), 2);
  assert_eq!(rev.updated_at(), Some(t0() + Duration::hours(2)));
  let stored = s.current_version(id).await.unwrap().unwrap();
  assert!(stored.same_state(&rev));

  clock.advance(Duration::hours(1));
  assert!(s.delete(&mut rev).await.unwrap());
  assert_eq!(rev.temporal_end(), t0() + Duration::hours(3));
  assert!(s.current_version(id).await.unwrap().is_none());
  assert_eq!(s.all_versions(id).await.unwrap().len(), 2);
  assert_eq!(s.state(id).await.unwrap(), EntityState::Deleted);

  clock.advance(Duration::hours(1));
  assert!(s.restore(&mut rev).await.unwrap());
  assert_eq!(rev.version(), 2);
  assert_eq!(text(rev.get("name")), Some("test2"));
  assert_eq!(text(rev.get("nickname")), Some("t"));
  let current = s.current_version(id).await.unwrap().unwrap();
  assert!(current.same_state(&rev));
  assert_eq!(s.state(id).await.unwrap(), EntityState::Active);
}

#[tokio::test]
async fn nan_payload_values_are_rejected() {
  let (s, _) = store().await;
  let err = s.create(payload([("name", f64::NAN)])).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidInput);

  let mut rev = ada(&s).await;
  rev.set("email", f64::NAN);
  let err = s.save(&mut rev).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidInput);
  assert_eq!(rev.version(), 1);
  assert_eq!(s.all_versions(rev.id()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn unchanged_save_is_a_no_op() {
  let (s, clock) = store().await;
  let mut rev = ada(&s).await;

  clock.advance(Duration::minutes(5));
  rev.set("name", "Ada");
  assert!(!rev.is_dirty());
  assert_eq!(s.save(&mut rev).await.unwrap(), SaveOutcome::Unchanged);
  assert_eq!(rev.updated_at(), Some(t0()));
  assert_eq!(s.all_versions(rev.id()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn versions_increase_with_one_open_row() {
  let (s, clock) = store().await;
  let mut rev = ada(&s).await;

  for n in 0..4 {
    clock.advance(Duration::seconds(1));
    rev.set("email", format!("ada{n}@example.com"));
    s.save(&mut rev).await.unwrap();
  }

  let all = s.all_versions(rev.id()).await.unwrap();
  let versions: Vec<u32> = all.iter().map(|r| r.version()).collect();
  assert_eq!(versions, [1, 2, 3, 4, 5]);

  let max = s.schema().versioning.max_timestamp();
  assert_eq!(all.iter().filter(|r| r.is_current(max)).count(), 1);
  for pair in all.windows(2) {
    assert_eq!(pair[0].temporal_end(), pair[1].temporal_start());
  }
}

#[tokio::test]
async fn explicit_overwrite_skips_versioning() {
  let (s, clock) = store().await;
  let mut rev = ada(&s).await;

  clock.advance(Duration::minutes(1));
  rev.set("name", "Augusta Ada");
  assert!(s.overwrite(&mut rev).await.unwrap());
  assert_eq!(rev.version(), 1);
  assert!(!rev.is_dirty());

  assert!(!s.overwrite(&mut rev).await.unwrap());
  let all = s.all_versions(rev.id()).await.unwrap();
  assert_eq!(all.len(), 1);
  assert_eq!(text(all[0].get("name")), Some("Augusta Ada"));
}

#[tokio::test]
async fn backwards_clock_is_clamped_to_revision_start() {
  let (s, clock) = store().await;
  clock.set(t0() + Duration::hours(1));
  let mut rev = ada(&s).await;

  clock.set(t0());
  rev.set("name", "Ada L.");
  s.save(&mut rev).await.unwrap();
  assert_eq!(rev.temporal_start(), t0() + Duration::hours(1));

  let v1 = s.at_version(rev.id(), 1).await.unwrap().unwrap();
  assert_eq!(v1.temporal_end(), v1.temporal_start());
}

// ─── Concurrency ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn closed_revision_is_stale() {
  let (s, _) = store().await;
  let mut rev = ada(&s).await;
  let id = rev.id();
  rev.set("name", "Ada L.");
  s.save(&mut rev).await.unwrap();

  let mut old = s.at_version(id, 1).await.unwrap().unwrap();
  old.set("name", "Ada K.");
  let err = s.save(&mut old).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::StaleRevision);

  let err = s.delete(&mut old).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::StaleRevision);
}

#[tokio::test]
async fn second_writer_conflicts_then_retries() {
  let (s, clock) = store().await;
  let mut rev = ada(&s).await;
  let id = rev.id();
  rev.set("name", "v2");
  s.save(&mut rev).await.unwrap();

  let mut first = s.current_version(id).await.unwrap().unwrap();
  let mut second = s.current_version(id).await.unwrap().unwrap();
  assert_eq!(second.version(), 2);

  clock.advance(Duration::seconds(1));
  first.set("name", "first");
  assert_eq!(s.save(&mut first).await.unwrap(), SaveOutcome::NewVersion);
  assert_eq!(first.version(), 3);

  second.set("name", "second");
  let err = s.save(&mut second).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
  assert_eq!(s.all_versions(id).await.unwrap().len(), 3);

  let mut second = s.current_version(id).await.unwrap().unwrap();
  second.set("name", "second");
  s.save(&mut second).await.unwrap();
  assert_eq!(second.version(), 4);
}

#[tokio::test]
async fn delete_of_a_superseded_copy_conflicts() {
  let (s, _) = store().await;
  let rev = ada(&s).await;

  let mut first = rev.clone();
  let mut second = rev.clone();
  assert!(s.delete(&mut first).await.unwrap());

  let err = s.delete(&mut second).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Conflict);
}

// ─── Navigation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn version_chain_navigation() {
  let (s, clock) = store().await;
  let mut rev = ada(&s).await;
  let id = rev.id();
  for name in ["b", "c"] {
    clock.advance(Duration::minutes(1));
    rev.set("name", name);
    s.save(&mut rev).await.unwrap();
  }

  let first = s.first_version(id).await.unwrap().unwrap();
  assert_eq!(first.version(), 1);
  assert!(s.previous_version(&first).await.unwrap().is_none());

  let second = s.next_version(&first).await.unwrap().unwrap();
  assert_eq!(text(second.get("name")), Some("b"));
  let third = s.next_version(&second).await.unwrap().unwrap();
  assert!(third.same_state(&rev));
  assert!(s.next_version(&third).await.unwrap().is_none());

  let back = s.previous_version(&third).await.unwrap().unwrap();
  assert!(back.same_state(&second));
  assert!(s.at_version(id, 9).await.unwrap().is_none());
}

#[tokio::test]
async fn highest_version_number_has_no_successor() {
  let dir = tempfile::tempdir().unwrap();
  let (s, clock) = file_store(&dir).await;
  let id = ada(&s).await.id();

  raw_conn(&dir)
    .execute("UPDATE people SET version = ?1", [u32::MAX])
    .unwrap();
  let mut rev = s.current_version(id).await.unwrap().unwrap();
  assert_eq!(rev.version(), u32::MAX);
  assert!(s.next_version(&rev).await.unwrap().is_none());

  clock.advance(Duration::hours(1));
  rev.set("name", "Ada L.");
  let err = s.save(&mut rev).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Store);
  assert_eq!(rev.version(), u32::MAX);
  assert_eq!(s.all_versions(id).await.unwrap().len(), 1);
  assert_eq!(s.state(id).await.unwrap(), EntityState::Active);
}

#[tokio::test]
async fn at_date_is_half_open() {
  let (s, clock) = store().await;
  let mut rev = ada(&s).await;
  let id = rev.id();
  let t1 = t0() + Duration::hours(1);

  clock.set(t1);
  rev.set("name", "Ada L.");
  s.save(&mut rev).await.unwrap();

  assert!(s.at_date(id, t0() - Duration::seconds(1)).await.unwrap().is_none());
  assert_eq!(s.at_date(id, t0()).await.unwrap().unwrap().version(), 1);
  assert_eq!(s.at_date(id, t1 - Duration::microseconds(1)).await.unwrap().unwrap().version(), 1);
  assert_eq!(s.at_date(id, t1).await.unwrap().unwrap().version(), 2);
  assert_eq!(s.at_date(id, t1 + Duration::days(365)).await.unwrap().unwrap().version(), 2);
}

#[tokio::test]
async fn in_range_matches_overlapping_intervals() {
  let (s, clock) = store().await;
  let mut rev = ada(&s).await;
  let id = rev.id();
  let t1 = t0() + Duration::hours(1);
  let t2 = t0() + Duration::hours(2);

  for (at, name) in [(t1, "b"), (t2, "c")] {
    clock.set(at);
    rev.set("name", name);
    s.save(&mut rev).await.unwrap();
  }

  let versions = |revs: Vec<Revision>| -> Vec<u32> {
    revs.iter().map(|r| r.version()).collect()
  };

  assert_eq!(versions(s.in_range(id, None, None).await.unwrap()), [1, 2, 3]);
  // A revision ending exactly at `from` is included.
  assert_eq!(versions(s.in_range(id, Some(t1), None).await.unwrap()), [1, 2, 3]);
  assert_eq!(versions(s.in_range(id, None, Some(t1)).await.unwrap()), [1]);
  assert_eq!(versions(s.in_range(id, Some(t2), Some(t2 + Duration::hours(1))).await.unwrap()), [2, 3]);
}

// ─── Restore & purge ─────────────────────────────────────────────────────────

#[tokio::test]
async fn restore_is_idempotent() {
  let (s, _) = store().await;
  let mut rev = ada(&s).await;

  assert!(!s.restore(&mut rev).await.unwrap());

  s.delete(&mut rev).await.unwrap();
  assert!(s.restore(&mut rev).await.unwrap());
  assert!(!s.restore(&mut rev).await.unwrap());
  assert_eq!(s.all_versions(rev.id()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn restore_after_purge_is_not_found() {
  let (s, _) = store().await;
  let mut rev = ada(&s).await;
  s.delete(&mut rev).await.unwrap();
  assert_eq!(s.purge(rev.id()).await.unwrap(), 1);

  let err = s.restore(&mut rev).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn purge_removes_only_the_target() {
  let (s, _) = store().await;
  let mut a = ada(&s).await;
  let b = s.create(payload([("name", "Bob")])).await.unwrap();
  a.set("name", "Ada L.");
  s.save(&mut a).await.unwrap();

  assert_eq!(s.purge(a.id()).await.unwrap(), 2);
  assert!(s.all_versions(a.id()).await.unwrap().is_empty());
  assert_eq!(s.state(a.id()).await.unwrap(), EntityState::Purged);
  assert_eq!(s.all_versions(b.id()).await.unwrap().len(), 1);
  assert_eq!(s.purge(a.id()).await.unwrap(), 0);
}

// ─── Collection ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn find_respects_scopes() {
  let (s, clock) = store().await;
  let mut a = ada(&s).await;
  let mut b = s.create(payload([("name", "Bob")])).await.unwrap();
  clock.advance(Duration::minutes(1));
  a.set("email", "ada@lovelace.org");
  s.save(&mut a).await.unwrap();
  s.delete(&mut b).await.unwrap();

  assert_eq!(s.find(&VersionQuery::new()).await.unwrap().len(), 1);
  assert_eq!(s.find(&VersionQuery::new().all_versions()).await.unwrap().len(), 3);
  assert_eq!(s.find(&VersionQuery::new().first_versions()).await.unwrap().len(), 2);
  assert_eq!(s.find(&VersionQuery::new().versions_at(2)).await.unwrap().len(), 1);
  assert_eq!(
    s.find(&VersionQuery::new().versions_at_date(t0())).await.unwrap().len(),
    2
  );

  let named = VersionQuery::new()
    .remove_current_filter()
    .filter(Predicate::eq("name", "Ada"));
  assert_eq!(s.find(&named).await.unwrap().len(), 2);

  let none = VersionQuery::new().filter(Predicate::eq("name", "Bob"));
  assert!(s.find(&none).await.unwrap().is_empty());

  let err = s
    .find(&VersionQuery::new().filter(Predicate::eq("age", 3)))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn delete_where_closes_open_rows_once() {
  let (s, _) = store().await;
  let a = ada(&s).await;
  let b = s.create(payload([("name", "Bob")])).await.unwrap();

  let query = VersionQuery::new().all_versions().filter(Predicate::eq("name", "Ada"));
  assert_eq!(s.delete_where(&query).await.unwrap(), 1);
  assert_eq!(s.delete_where(&query).await.unwrap(), 0);

  assert_eq!(s.state(a.id()).await.unwrap(), EntityState::Deleted);
  assert_eq!(s.state(b.id()).await.unwrap(), EntityState::Active);
  assert_eq!(s.all_versions(a.id()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn bulk_operations_reject_a_window() {
  let (s, _) = store().await;
  for name in ["a", "b", "c"] {
    s.create(payload([("name", name)])).await.unwrap();
  }

  for query in [VersionQuery::new().limit(1), VersionQuery::new().offset(1)] {
    let err = s.delete_where(&query).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let err = s
      .update_where_unversioned(&query, payload([("email", "x@example.com")]))
      .await
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
  }

  let open = s.find(&VersionQuery::new()).await.unwrap();
  assert_eq!(open.len(), 3);
  assert!(open.iter().all(|r| r.get("email") == Some(&FieldValue::Null)));
}

#[tokio::test]
async fn unversioned_update_rewrites_history_in_place() {
  let (s, _) = store().await;
  let mut a = ada(&s).await;
  a.set("name", "Ada L.");
  s.save(&mut a).await.unwrap();

  let query = VersionQuery::new().all_versions();
  let changed = s
    .update_where_unversioned(&query, payload([("email", "ada@lovelace.org")]))
    .await
    .unwrap();
  assert_eq!(changed, 2);

  let all = s.all_versions(a.id()).await.unwrap();
  assert_eq!(all.len(), 2);
  assert!(all.iter().all(|r| text(r.get("email")) == Some("ada@lovelace.org")));

  assert_eq!(s.update_where_unversioned(&query, Payload::new()).await.unwrap(), 0);

  let err = s
    .update_where_unversioned(&query, payload([("version", 9)]))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

// ─── Observers ───────────────────────────────────────────────────────────────

#[derive(Default)]
struct Recorder {
  events: Mutex<Vec<Event>>,
  veto:   Option<Event>,
}

impl Observer for Recorder {
  fn before(&self, ctx: &HookContext<'_>) -> Verdict {
    self.events.lock().unwrap().push(ctx.event);
    if self.veto == Some(ctx.event) { Verdict::Veto } else { Verdict::Proceed }
  }

  fn after(&self, ctx: &HookContext<'_>) { self.events.lock().unwrap().push(ctx.event); }
}

#[tokio::test]
async fn observers_see_committed_transitions() {
  let recorder = Arc::new(Recorder::default());
  let (s, _) = store().await;
  let s = s.with_observer(recorder.clone());

  let mut rev = ada(&s).await;
  rev.set("name", "Ada L.");
  s.save(&mut rev).await.unwrap();
  rev.set("nickname", "Countess");
  s.save(&mut rev).await.unwrap();
  s.delete(&mut rev).await.unwrap();
  s.restore(&mut rev).await.unwrap();
  s.purge(rev.id()).await.unwrap();

  assert_eq!(*recorder.events.lock().unwrap(), [
    Event::Saving,
    Event::Saved,
    Event::Overwriting,
    Event::Overwritten,
    Event::Deleting,
    Event::Deleted,
    Event::Restoring,
    Event::Restored,
    Event::Purging,
    Event::Purged,
  ]);
}

#[tokio::test]
async fn vetoed_transitions_write_nothing() {
  let (s, _) = store().await;
  let mut rev = ada(&s).await;
  let id = rev.id();

  for event in [Event::Saving, Event::Deleting, Event::Purging] {
    let recorder = Arc::new(Recorder { veto: Some(event), ..Default::default() });
    let vetoing = s.clone().with_observer(recorder.clone());

    match event {
      Event::Saving => {
        rev.set("name", "Ada L.");
        assert_eq!(vetoing.save(&mut rev).await.unwrap(), SaveOutcome::Vetoed);
        assert!(rev.is_dirty());
        rev.discard_changes();
      }
      Event::Deleting => assert!(!vetoing.delete(&mut rev).await.unwrap()),
      _ => assert_eq!(vetoing.purge(id).await.unwrap(), 0),
    }
    assert_eq!(*recorder.events.lock().unwrap(), [event]);
  }

  let all = s.all_versions(id).await.unwrap();
  assert_eq!(all.len(), 1);
  assert!(all[0].same_state(&rev));
  assert_eq!(s.state(id).await.unwrap(), EntityState::Active);
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn column_names_are_configurable() {
  let clock = Arc::new(ManualClock::new(t0()));
  let mut versioning = VersioningConfig::default().with_overwritable(["note"]);
  versioning.version_column = "rev".into();
  versioning.temporal_start_column = "valid_from".into();
  versioning.temporal_end_column = "valid_to".into();
  let schema = EntitySchema::new("docs", ["title", "note"])
    .with_versioning(versioning)
    .without_audit_column();

  let s = SqliteStore::open_in_memory(schema).await.unwrap().with_clock(clock.clone());
  let mut doc = s.create(payload([("title", "Draft")])).await.unwrap();
  assert_eq!(doc.updated_at(), None);

  clock.advance(Duration::hours(1));
  doc.set("title", "Final");
  s.save(&mut doc).await.unwrap();
  assert_eq!(doc.version(), 2);

  let old = s
    .find(&VersionQuery::new().versions_at_date(t0()))
    .await
    .unwrap();
  assert_eq!(old.len(), 1);
  assert_eq!(text(old[0].get("title")), Some("Draft"));

  let by_rev = VersionQuery::new()
    .all_versions()
    .filter(Predicate::ge("rev", 2_u32));
  assert_eq!(s.find(&by_rev).await.unwrap().len(), 1);
}

#[tokio::test]
async fn mismatched_table_fails_provisioning() {
  let (s, _) = store().await;
  let mut versioning = VersioningConfig::default();
  versioning.version_column = "rev".into();
  let other = EntitySchema::new("people", ["name"]).with_versioning(versioning);

  let err = s.for_schema(other).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Provisioning);
  assert!(err.to_string().contains("rev"), "{err}");

  s.verify_schema().await.unwrap();
  assert!(format!("{s:?}").contains("people"), "{s:?}");
}

#[tokio::test]
async fn misspelled_sentinel_fails_verification() {
  let dir = tempfile::tempdir().unwrap();
  let (s, _) = file_store(&dir).await;
  let rev = ada(&s).await;

  raw_conn(&dir)
    .execute("UPDATE people SET temporal_end = '2999-01-01 00:00:00'", [])
    .unwrap();

  let err = s.verify_schema().await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Provisioning);
  assert!(err.to_string().contains("temporal_end"), "{err}");

  // Reads that meet the row fail loudly instead of disagreeing with SQL.
  let err = s.latest_version(rev.id()).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Store);

  drop(s);
  let err = SqliteStore::open(dir.path().join("people.db"), people())
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::Provisioning);
}

#[tokio::test]
async fn audit_column_is_stamped_even_when_the_row_had_none() {
  let dir = tempfile::tempdir().unwrap();
  let (s, clock) = file_store(&dir).await;
  let id = ada(&s).await.id();

  raw_conn(&dir)
    .execute("UPDATE people SET updated_at = NULL", [])
    .unwrap();
  let mut rev = s.current_version(id).await.unwrap().unwrap();
  assert_eq!(rev.updated_at(), None);

  clock.advance(Duration::minutes(1));
  rev.set("nickname", "Countess");
  assert_eq!(s.save(&mut rev).await.unwrap(), SaveOutcome::Overwritten);
  assert_eq!(rev.updated_at(), Some(t0() + Duration::minutes(1)));
  assert!(s.current_version(id).await.unwrap().unwrap().same_state(&rev));

  raw_conn(&dir)
    .execute("UPDATE people SET updated_at = NULL", [])
    .unwrap();
  let mut rev = s.current_version(id).await.unwrap().unwrap();
  clock.advance(Duration::minutes(1));
  rev.set("name", "Ada L.");
  assert_eq!(s.save(&mut rev).await.unwrap(), SaveOutcome::NewVersion);
  assert_eq!(rev.updated_at(), Some(t0() + Duration::minutes(2)));
  assert!(s.current_version(id).await.unwrap().unwrap().same_state(&rev));

  s.delete(&mut rev).await.unwrap();
  raw_conn(&dir)
    .execute("UPDATE people SET updated_at = NULL", [])
    .unwrap();
  clock.advance(Duration::minutes(1));
  assert!(s.restore(&mut rev).await.unwrap());
  assert_eq!(rev.updated_at(), Some(t0() + Duration::minutes(3)));
  assert!(s.current_version(id).await.unwrap().unwrap().same_state(&rev));
}

#[tokio::test]
async fn invalid_schema_is_rejected_before_provisioning() {
  let overwrite_all = EntitySchema::new("notes", ["body"])
    .with_versioning(VersioningConfig::default().with_overwritable(["body"]));
  let err = SqliteStore::open_in_memory(overwrite_all).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidInput);

  let bad_name = EntitySchema::new("notes; drop", ["body"]);
  let err = SqliteStore::open_in_memory(bad_name).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidInput);
}
