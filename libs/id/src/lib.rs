//! # runrelay-id
//!
//! Run identity types, parsing, and validation for runrelay.
//!
//! ## Design Principles
//!
//! - A Run is identified by `namespace/name`, both chosen by the caller
//! - Identities are immutable once created
//! - All identities have a canonical string representation with strict parsing
//! - Parsing and formatting roundtrip (parse → format → parse)
//!
//! ## Format
//!
//! - `namespace` is a DNS-1123 label: `[a-z0-9]([-a-z0-9]*[a-z0-9])?`, at most 63 chars
//! - `name` is a DNS-1123 subdomain: lowercase alphanumerics, `-` and `.`, at most 253 chars
//!
//! Examples:
//! - `default/build-1234`
//! - `ci/nightly.release-7`

mod error;
mod key;

pub use error::IdError;
pub use key::{RunKey, MAX_NAME_LEN, MAX_NAMESPACE_LEN};
