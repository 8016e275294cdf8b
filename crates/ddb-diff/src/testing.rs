//! Fixtures shared by the crate's tests.

use serde::{Deserialize, Serialize};

use crate::db::DiffDb;
use crate::differential::Differential;
use crate::object::Object;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub(crate) struct Record {
    pub id: String,
    pub value: u32,
}

impl Record {
    pub fn new(id: &str, value: u32) -> Self {
        Self {
            id: id.to_string(),
            value,
        }
    }
}

impl Object for Record {
    fn id(&self) -> Vec<u8> {
        self.id.as_bytes().to_vec()
    }
}

/// A fresh in-memory database with one open namespace.
pub(crate) fn memory_diff(name: &str) -> (DiffDb, Differential) {
    let db = DiffDb::in_memory();
    let diff = db.open(name).unwrap();
    (db, diff)
}
