//! # Runtime
//!
//! Process-level wiring for the controller binary.
//!
//! - `initialization`: rustls, tracing, metrics, HTTP server, index watches, reconciler
//! - `watch_loop`: the `Secret` controller loop with restart handling
//! - `error_policy`: per-secret error backoff and watch error classification

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
