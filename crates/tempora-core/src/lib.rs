//! Core types and trait definitions for the Tempora versioned store.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the revision model, the query-scope rewriter and the pure half of the
//! version transition engine; storage backends supply the statements.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod config;
pub mod error;
pub mod hooks;
pub mod query;
pub mod revision;
pub mod scope;
pub mod store;
pub mod transition;
pub mod value;

pub use error::{Classify, Error, ErrorKind, Result};
