//! Change detection and staged apply for DiffDB.
//!
//! Given a stream of identifiable objects, a [`Differential`] works out
//! which ones actually changed since they were last applied, stages those
//! versions, and later hands them to a callback. Each version the callback
//! accepts is promoted to the committed state. Rejected versions stay
//! pending for the next run.
//!
//! # Key Types
//!
//! - [`DiffDb`] -- a store holding named differentials
//! - [`Differential`] -- staging, queries, apply and conflict tracking for
//!   one namespace
//! - [`Object`] -- what callers implement to be tracked
//! - [`Payload`] -- a staged version as seen by the apply callback
//! - [`DiffError`] / [`ApplyError`] -- failures, including the aggregated
//!   per-item apply report
//!
//! # Example
//!
//! ```
//! use ddb_diff::{DiffDb, DiffError, Object};
//! use serde::{Deserialize, Serialize};
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Row {
//!     key: u64,
//!     name: String,
//! }
//!
//! impl Object for Row {
//!     fn id(&self) -> Vec<u8> {
//!         self.key.to_be_bytes().to_vec()
//!     }
//! }
//!
//! let db = DiffDb::in_memory();
//! let rows = db.open("rows")?;
//! assert!(rows.stage(&Row { key: 1, name: "one".into() })?);
//!
//! let applied = rows.apply(&CancellationToken::new(), |_id, payload| {
//!     let row: Row = payload.decode()?;
//!     assert_eq!(row.name, "one");
//!     Ok::<_, DiffError>(())
//! })?;
//! assert_eq!(applied, 1);
//! assert!(!rows.stage(&Row { key: 1, name: "one".into() })?);
//! # Ok::<_, DiffError>(())
//! ```

pub mod apply;
pub mod codec;
pub mod config;
pub mod db;
pub mod differential;
pub mod error;
pub mod object;
pub mod stream;
pub mod user_data;

#[cfg(test)]
mod testing;

pub use codec::Payload;
pub use config::{DiffDbConfig, DEFAULT_STREAM_CAPACITY};
pub use db::DiffDb;
pub use differential::Differential;
pub use error::{ApplyError, ApplyFailure, DiffError, DiffResult};
pub use object::Object;
pub use user_data::{UserData, UserDataMut};

pub use ddb_store::{Store, StoreConfig, WriteTxn};
pub use ddb_types::ContentHash;
