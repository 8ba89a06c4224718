//! Secret Protection Controller Library
//!
//! Keeps the `secret-protection` finalizer on credential secrets until no resource
//! in the same namespace still references them through `spec.authSecretRef`.
//! Tests are included in the module files and under `tests/`.
//!
//! ## Quick Start
//!
//! ```rust
//! use secret_protection_controller::prelude::*;
//! ```

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod index;
pub mod observability;
pub mod prelude;
pub mod runtime;
pub mod store;
