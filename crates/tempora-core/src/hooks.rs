//! Transition observers.
//!
//! Observers are called synchronously around each transition. A `before`
//! callback may veto the transition; a vetoed transition issues no statement
//! and reports the veto through its return value. `after` callbacks run only
//! once the transition has committed.

use std::{fmt, sync::Arc};

use uuid::Uuid;

use crate::revision::Revision;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
  Saving,
  Saved,
  Overwriting,
  Overwritten,
  Deleting,
  Deleted,
  Restoring,
  Restored,
  Purging,
  Purged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
  Proceed,
  Veto,
}

/// What an observer is told about a transition.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
  pub event:    Event,
  pub id:       Uuid,
  /// The revision being transitioned. `None` for purge, which works on the
  /// id alone.
  pub revision: Option<&'a Revision>,
}

pub trait Observer: Send + Sync {
  fn before(&self, _ctx: &HookContext<'_>) -> Verdict { Verdict::Proceed }

  fn after(&self, _ctx: &HookContext<'_>) {}
}

/// The observers registered on a store. Cloning shares them.
#[derive(Clone, Default)]
pub struct Hooks {
  observers: Vec<Arc<dyn Observer>>,
}

impl fmt::Debug for Hooks {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Hooks")
      .field("observers", &self.observers.len())
      .finish()
  }
}

impl Hooks {
  pub fn register(&mut self, observer: Arc<dyn Observer>) {
    self.observers.push(observer);
  }

  pub fn is_empty(&self) -> bool { self.observers.is_empty() }

  /// `true` unless some observer vetoes. Stops at the first veto.
  pub fn before(&self, event: Event, id: Uuid, revision: Option<&Revision>) -> bool {
    let ctx = HookContext { event, id, revision };
    self
      .observers
      .iter()
      .all(|o| o.before(&ctx) == Verdict::Proceed)
  }

  pub fn after(&self, event: Event, id: Uuid, revision: Option<&Revision>) {
    let ctx = HookContext { event, id, revision };
    for o in &self.observers {
      o.after(&ctx);
    }
  }
}
