use thiserror::Error;

use crate::types::PageNumber;

/// Which index constraint a rejected mutation violated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Unique,
    Required,
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintKind::Unique => write!(f, "unique"),
            ConstraintKind::Required => write!(f, "required"),
        }
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid page number {page_number} (page count: {page_count})")]
    InvalidPageNumber {
        page_number: PageNumber,
        page_count: PageNumber,
    },

    #[error("Invalid page size: {expected} bytes, got {actual} bytes")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("Corrupted page: page_number={page_number}, reason={reason}")]
    CorruptedPage {
        page_number: PageNumber,
        reason: String,
    },

    #[error("Unexpected page type on page {page_number}: expected {expected}, found {actual:#04x}")]
    UnexpectedPageType {
        page_number: PageNumber,
        expected: &'static str,
        actual: u8,
    },

    #[error("Invalid page type: {0:#04x}")]
    InvalidPageType(u8),

    #[error("Usage map inconsistency for page {page_number}: {reason}")]
    UsageMapInconsistent {
        page_number: PageNumber,
        reason: String,
    },

    #[error("Row does not fit on page {page_number} ({needed} bytes needed, {available} free)")]
    PageFull {
        page_number: PageNumber,
        needed: usize,
        available: usize,
    },

    #[error("Invalid row {row_number} on page {page_number}")]
    InvalidRow {
        page_number: PageNumber,
        row_number: u8,
    },

    #[error("{kind} constraint violated by index '{index}' of table '{table}'")]
    ConstraintViolation {
        kind: ConstraintKind,
        index: String,
        table: String,
    },

    #[error("Batch update failed after {updated} rows: {source}")]
    BatchUpdate {
        updated: usize,
        #[source]
        source: Box<DatabaseError>,
    },

    #[error("Type mismatch for column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    #[error("Cannot decode index entry: {reason}")]
    EntryDecode { reason: String },

    #[error("Index '{index}' expects at most {expected} values, got {actual}")]
    TooManyValues {
        index: String,
        expected: usize,
        actual: usize,
    },

    #[error("Row has {actual} values but index '{index}' reads column {column}")]
    MissingColumn {
        index: String,
        column: usize,
        actual: usize,
    },

    #[error("Invalid savepoint: {reason}")]
    InvalidSavepoint { reason: String },

    #[error("Invalid database header: {reason}")]
    InvalidHeader { reason: String },

    #[error("Unsupported file format version: {version}")]
    UnsupportedFormat { version: u8 },

    #[error("Database is read-only")]
    ReadOnly,

    #[error("Codec failure on page {page_number}: {reason}")]
    Codec {
        page_number: PageNumber,
        reason: String,
    },

    #[error("Index entry already present in '{index}'")]
    DuplicateEntry { index: String },

    #[error("Database channel is closed")]
    Closed,
}

impl DatabaseError {
    pub fn is_constraint_violation(&self) -> bool {
        match self {
            DatabaseError::ConstraintViolation { .. } => true,
            DatabaseError::BatchUpdate { source, .. } => source.is_constraint_violation(),
            _ => false,
        }
    }

    pub(crate) fn corrupted(page_number: PageNumber, reason: impl Into<String>) -> Self {
        DatabaseError::CorruptedPage {
            page_number,
            reason: reason.into(),
        }
    }

    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        DatabaseError::EntryDecode {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
