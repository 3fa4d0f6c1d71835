//! Predicates and the versioned query.
//!
//! [`Predicate`] is a small backend-neutral AST; storage backends render it to
//! their own dialect. [`VersionQuery`] pairs caller predicates with a
//! [`Scope`](crate::scope::Scope), which decides which revisions are visible.

use chrono::{DateTime, Utc};

use crate::{
  config::VersioningConfig,
  scope::{Scope, TemporalScope},
  value::FieldValue,
};

// ─── Predicate ───────────────────────────────────────────────────────────────

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
  Value(FieldValue),
  /// A timestamp; encoded by the backend the same way it stores temporal
  /// columns, so comparisons follow time order.
  Instant(DateTime<Utc>),
}

impl From<DateTime<Utc>> for Operand {
  fn from(v: DateTime<Utc>) -> Self { Self::Instant(v) }
}

macro_rules! operand_from_value {
  ($($t:ty),* $(,)?) => {
    $(
      impl From<$t> for Operand {
        fn from(v: $t) -> Self { Self::Value(v.into()) }
      }
    )*
  };
}

operand_from_value!(FieldValue, i64, i32, u32, bool, f64, &str, String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
  Compare {
    column:  String,
    op:      CompareOp,
    operand: Operand,
  },
  IsNull(String),
  NotNull(String),
  And(Vec<Predicate>),
  Or(Vec<Predicate>),
  Not(Box<Predicate>),
}

impl Predicate {
  pub fn compare(
    column: impl Into<String>,
    op: CompareOp,
    operand: impl Into<Operand>,
  ) -> Self {
    Self::Compare { column: column.into(), op, operand: operand.into() }
  }

  pub fn eq(column: impl Into<String>, operand: impl Into<Operand>) -> Self {
    Self::compare(column, CompareOp::Eq, operand)
  }

  pub fn ne(column: impl Into<String>, operand: impl Into<Operand>) -> Self {
    Self::compare(column, CompareOp::Ne, operand)
  }

  pub fn lt(column: impl Into<String>, operand: impl Into<Operand>) -> Self {
    Self::compare(column, CompareOp::Lt, operand)
  }

  pub fn le(column: impl Into<String>, operand: impl Into<Operand>) -> Self {
    Self::compare(column, CompareOp::Le, operand)
  }

  pub fn gt(column: impl Into<String>, operand: impl Into<Operand>) -> Self {
    Self::compare(column, CompareOp::Gt, operand)
  }

  pub fn ge(column: impl Into<String>, operand: impl Into<Operand>) -> Self {
    Self::compare(column, CompareOp::Ge, operand)
  }

  pub fn at(
    column: impl Into<String>,
    op: CompareOp,
    instant: DateTime<Utc>,
  ) -> Self {
    Self::Compare {
      column: column.into(),
      op,
      operand: Operand::Instant(instant),
    }
  }

  pub fn and(self, other: Predicate) -> Self {
    match self {
      Self::And(mut parts) => {
        parts.push(other);
        Self::And(parts)
      }
      p => Self::And(vec![p, other]),
    }
  }

  pub fn or(self, other: Predicate) -> Self {
    match self {
      Self::Or(mut parts) => {
        parts.push(other);
        Self::Or(parts)
      }
      p => Self::Or(vec![p, other]),
    }
  }

  #[allow(clippy::should_implement_trait)]
  pub fn not(self) -> Self { Self::Not(Box::new(self)) }

  /// Every column name referenced by this predicate.
  pub fn columns(&self) -> Vec<&str> {
    let mut out = Vec::new();
    self.collect_columns(&mut out);
    out
  }

  fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
    match self {
      Self::Compare { column, .. } | Self::IsNull(column) | Self::NotNull(column) => {
        out.push(column)
      }
      Self::And(parts) | Self::Or(parts) => {
        parts.iter().for_each(|p| p.collect_columns(out))
      }
      Self::Not(inner) => inner.collect_columns(out),
    }
  }
}

// ─── Ordering ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Asc,
  Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
  pub column:    String,
  pub direction: Direction,
}

impl Order {
  pub fn asc(column: impl Into<String>) -> Self {
    Self { column: column.into(), direction: Direction::Asc }
  }

  pub fn desc(column: impl Into<String>) -> Self {
    Self { column: column.into(), direction: Direction::Desc }
  }
}

// ─── VersionQuery ────────────────────────────────────────────────────────────

/// A read over a versioned table.
///
/// A fresh query sees only current revisions. The scope modifiers from
/// [`TemporalScope`] replace that default; caller predicates added with
/// [`filter`](Self::filter) are ANDed with whatever scope is in effect.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionQuery {
  scope:   Scope,
  filters: Vec<Predicate>,
  order:   Vec<Order>,
  limit:   Option<usize>,
  offset:  Option<usize>,
}

impl Default for VersionQuery {
  fn default() -> Self {
    Self {
      scope:   Scope::Current,
      filters: Vec::new(),
      order:   Vec::new(),
      limit:   None,
      offset:  None,
    }
  }
}

impl VersionQuery {
  pub fn new() -> Self { Self::default() }

  pub fn filter(mut self, predicate: Predicate) -> Self {
    self.filters.push(predicate);
    self
  }

  pub fn order_by(mut self, order: Order) -> Self {
    self.order.push(order);
    self
  }

  pub fn limit(mut self, limit: usize) -> Self {
    self.limit = Some(limit);
    self
  }

  pub fn offset(mut self, offset: usize) -> Self {
    self.offset = Some(offset);
    self
  }

  pub fn scope(&self) -> &Scope { &self.scope }

  pub fn filters(&self) -> &[Predicate] { &self.filters }

  pub fn limit_value(&self) -> Option<usize> { self.limit }

  pub fn offset_value(&self) -> Option<usize> { self.offset }

  /// The full WHERE predicate: scope predicate AND every caller filter.
  /// `None` means "every row".
  pub fn predicate(&self, cfg: &VersioningConfig) -> Option<Predicate> {
    let parts: Vec<Predicate> = self
      .scope
      .predicate(cfg)
      .into_iter()
      .chain(self.filters.iter().cloned())
      .collect();
    match parts.len() {
      0 => None,
      1 => parts.into_iter().next(),
      _ => Some(Predicate::And(parts)),
    }
  }

  /// Scope-mandated ordering first, then the caller's.
  pub fn ordering(&self, cfg: &VersioningConfig) -> Vec<Order> {
    self
      .scope
      .ordering(cfg)
      .into_iter()
      .chain(self.order.iter().cloned())
      .collect()
  }
}

impl TemporalScope for VersionQuery {
  fn with_scope(mut self, scope: Scope) -> Self {
    self.scope = scope;
    self
  }

  fn current_scope(&self) -> &Scope { &self.scope }
}
