use serde::{Deserialize, Serialize};

use crate::storage::{format::FileFormat, header::GENERAL_SORT_ORDER};

/// Settings for creating or opening a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseOptions {
    /// Format of newly created files. Opening detects the format from the header.
    pub file_format: FileFormat,
    /// Sync the backing store after every write that leaves a write region.
    pub auto_sync: bool,
    pub read_only: bool,
    /// Collation id written to new headers.
    pub sort_order: u16,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            file_format: FileFormat::Jet4,
            auto_sync: false,
            read_only: false,
            sort_order: GENERAL_SORT_ORDER,
        }
    }
}

impl DatabaseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_format(mut self, file_format: FileFormat) -> Self {
        self.file_format = file_format;
        self
    }

    pub fn auto_sync(mut self, auto_sync: bool) -> Self {
        self.auto_sync = auto_sync;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn sort_order(mut self, sort_order: u16) -> Self {
        self.sort_order = sort_order;
        self
    }
}
