//! # Resource Definitions
//!
//! Types describing the resources this controller reads.
//!
//! ## Module Structure
//!
//! - `kinds.rs` - The fixed table of referencing kinds
//! - `reference.rs` - `spec.authSecretRef` and its index extractor

mod kinds;
mod reference;

pub use kinds::{ReferenceKind, AIVEN_GROUP, AIVEN_VERSION, REFERENCE_KINDS};
pub use reference::{secret_ref_index_fn, AuthSecretReference, ExtractorFn, HasSecretReference};
