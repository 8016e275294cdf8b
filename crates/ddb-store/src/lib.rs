//! Transactional namespace storage for DiffDB.
//!
//! A store holds named namespaces; each namespace holds named buckets of
//! byte keys to byte values, iterated in lexicographic key order. All
//! access happens inside a transaction:
//!
//! - [`ReadTxn`] -- a consistent snapshot of the last committed state
//! - [`WriteTxn`] -- the single read-write transaction, committed or rolled
//!   back as a unit
//!
//! # Storage Backends
//!
//! All backends implement the [`Store`] trait:
//!
//! - [`InMemoryStore`] -- copy-on-write snapshot store for tests and embedding
//! - [`SqliteStore`] -- durable store on a SQLite database in WAL mode
//!
//! # Design Rules
//!
//! 1. At most one write transaction is live per store; `begin_write`
//!    blocks until the previous writer finishes.
//! 2. Readers never block writers and never observe uncommitted data.
//! 3. Dropping a transaction without committing rolls it back.
//! 4. Commit hooks run only after the commit is durable.
//! 5. Touching a namespace or bucket that does not exist is an error.

pub mod config;
pub mod cursor;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

mod slot;

#[cfg(test)]
mod conformance;

pub use config::{Backend, SqliteOptions, StoreConfig};
pub use cursor::Cursor;
pub use error::{StoreError, StoreResult};
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{update, view, BucketRef, CommitHook, Entry, ReadTxn, Store, WriteTxn};
