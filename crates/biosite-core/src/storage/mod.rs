//! # Storage Module
//!
//! Embedded storage for the biosite schema.
//!
//! - `redb_store`: [`Store`], a redb database holding every table, with
//!   unique email indexes, the visitor → message foreign key, and the
//!   events search index maintained inside the same write transactions
//!   as the rows they cover.

mod redb_store;

pub use redb_store::{Snapshot, Store, TableCounts};
