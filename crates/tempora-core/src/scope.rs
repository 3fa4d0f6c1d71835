//! Query scopes: which revisions a read sees.
//!
//! Every read of a versioned table carries exactly one [`Scope`]. The default,
//! [`Scope::Current`], restricts results to active revisions; every other
//! scope replaces it rather than stacking on top of it.

use chrono::{DateTime, Utc};

use crate::{
  config::VersioningConfig,
  query::{CompareOp, Order, Predicate},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
  /// `temporal_end == MAX`.
  Current,
  /// No temporal restriction.
  All,
  /// `version == 1`.
  First,
  /// `version == n`.
  AtVersion(u32),
  /// `temporal_start <= t AND temporal_end > t`.
  AtDate(DateTime<Utc>),
  /// Revisions overlapping `[from, to)`; either bound may be open. Ordered
  /// by ascending version.
  InRange {
    from: Option<DateTime<Utc>>,
    to:   Option<DateTime<Utc>>,
  },
}

impl Scope {
  /// The predicate this scope contributes, if any.
  pub fn predicate(&self, cfg: &VersioningConfig) -> Option<Predicate> {
    let start = cfg.temporal_start_column();
    let end = cfg.temporal_end_column();
    match self {
      Self::Current => Some(current_filter(cfg)),
      Self::All => None,
      Self::First => Some(Predicate::eq(cfg.version_column(), 1_u32)),
      Self::AtVersion(n) => Some(Predicate::eq(cfg.version_column(), *n)),
      Self::AtDate(t) => Some(
        Predicate::at(start, CompareOp::Le, *t).and(Predicate::at(end, CompareOp::Gt, *t)),
      ),
      Self::InRange { from, to } => {
        let parts: Vec<Predicate> = from
          .map(|f| Predicate::at(end, CompareOp::Ge, f))
          .into_iter()
          .chain(to.map(|t| Predicate::at(start, CompareOp::Lt, t)))
          .collect();
        match parts.len() {
          0 => None,
          1 => parts.into_iter().next(),
          _ => Some(Predicate::And(parts)),
        }
      }
    }
  }

  /// Ordering this scope imposes ahead of any caller ordering.
  pub fn ordering(&self, cfg: &VersioningConfig) -> Option<Order> {
    match self {
      Self::InRange { .. } => Some(Order::asc(cfg.version_column())),
      _ => None,
    }
  }

  pub fn is_current(&self) -> bool { matches!(self, Self::Current) }
}

/// `temporal_end == MAX`.
pub fn current_filter(cfg: &VersioningConfig) -> Predicate {
  Predicate::at(cfg.temporal_end_column(), CompareOp::Eq, cfg.max_timestamp())
}

/// Capability interface for anything that can be scoped to revisions.
///
/// Implementors provide [`with_scope`](Self::with_scope); the named modifiers
/// are expressed on top of it.
pub trait TemporalScope: Sized {
  fn with_scope(self, scope: Scope) -> Self;

  fn current_scope(&self) -> &Scope;

  fn apply_current_filter(self) -> Self { self.with_scope(Scope::Current) }

  /// Remove the implicit current filter. Other scopes are left untouched
  /// since they never include it.
  fn remove_current_filter(self) -> Self {
    if self.current_scope().is_current() {
      self.with_scope(Scope::All)
    } else {
      self
    }
  }

  fn current_versions(self) -> Self { self.apply_current_filter() }

  fn all_versions(self) -> Self { self.with_scope(Scope::All) }

  fn first_versions(self) -> Self { self.with_scope(Scope::First) }

  fn versions_at(self, version: u32) -> Self {
    self.with_scope(Scope::AtVersion(version))
  }

  fn versions_at_date(self, at: DateTime<Utc>) -> Self {
    self.with_scope(Scope::AtDate(at))
  }

  fn versions_in_range(
    self,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
  ) -> Self {
    self.with_scope(Scope::InRange { from, to })
  }
}
