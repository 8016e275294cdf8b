//! Foundation types for DiffDB.
//!
//! Every other DiffDB crate depends on `ddb-types`.
//!
//! # Key Types
//!
//! - [`ContentHash`] -- 8-byte structural digest of a tracked object
//! - [`TypeError`] -- parse and length errors for the types in this crate

pub mod error;
pub mod hash;

pub use error::TypeError;
pub use hash::ContentHash;
