//! # biosite
//!
//! Library half of the biosite binary: the HTTP API, the CLI, and the
//! configuration loader. Split from `main.rs` so integration tests can
//! build the router against an in-memory store.

pub mod api;
pub mod cli;
pub mod config;
