use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::row_id::{ROW_ID_SIZE, RowId};

/// An index entry: encoded key bytes plus the row they point at.
///
/// Ordering is the index order: key bytes compared unsigned, a proper prefix
/// first, ties broken by row id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Entry {
    pub key: Vec<u8>,
    pub row_id: RowId,
}

impl Entry {
    pub fn new(key: Vec<u8>, row_id: RowId) -> Self {
        Self { key, row_id }
    }

    /// Sorts before every entry with `key`.
    pub fn first_with_key(key: Vec<u8>) -> Self {
        Self::new(key, RowId::FIRST)
    }

    pub fn has_key(&self, key: &[u8]) -> bool {
        self.key == key
    }

    /// Bytes this entry occupies on a leaf page before prefix compression.
    pub fn leaf_size(&self) -> usize {
        self.key.len() + ROW_ID_SIZE
    }

    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.key);
        self.row_id.write_to(out);
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.key {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, " -> {}", self.row_id)
    }
}
