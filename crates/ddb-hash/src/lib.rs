//! Structural content hashing for DiffDB.
//!
//! Turns any `serde::Serialize` value into a fixed-width [`ContentHash`]
//! that depends only on the value's logical structure. Map ordering, the
//! concrete map type and process state never influence the digest, so a
//! hash written by one process can be compared against a value hashed by
//! another.
//!
//! The digest is a truncated, domain-separated BLAKE3 hash. It detects
//! change; it is not a cryptographic commitment.

pub mod error;
pub mod hasher;

pub use ddb_types::ContentHash;
pub use error::HasherError;
pub use hasher::StructuralHasher;
