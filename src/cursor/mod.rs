pub mod index_cursor;
pub mod table_scan;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::{
    index::entry::Entry,
    types::{error::DatabaseError, row_id::RowId},
};

static NEXT_CURSOR_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CursorId(u64);

impl CursorId {
    pub fn next() -> Self {
        CursorId(NEXT_CURSOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where a cursor stands. Index cursors remember the whole entry so they can find
/// their place again after the tree changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Position {
    BeforeFirst,
    AfterLast,
    Row(RowId),
    Entry(Entry),
}

impl Position {
    pub fn row_id(&self) -> Option<RowId> {
        match self {
            Position::Row(row_id) => Some(*row_id),
            Position::Entry(entry) => Some(entry.row_id),
            Position::BeforeFirst | Position::AfterLast => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Savepoint {
    pub cursor_id: CursorId,
    pub position: Position,
}

/// Directional traversal over rows.
pub trait Cursor {
    fn id(&self) -> CursorId;

    fn position(&self) -> &Position;

    fn before_first(&mut self);

    fn after_last(&mut self);

    fn reset(&mut self) {
        self.before_first();
    }

    fn is_before_first(&self) -> bool {
        matches!(self.position(), Position::BeforeFirst)
    }

    fn is_after_last(&self) -> bool {
        matches!(self.position(), Position::AfterLast)
    }

    /// Moves forward; false (and after-last) when there is no next row.
    fn move_to_next_row(&mut self) -> Result<bool, DatabaseError>;

    /// Moves backward; false (and before-first) when there is no previous row.
    fn move_to_previous_row(&mut self) -> Result<bool, DatabaseError>;

    fn current_row_id(&self) -> Option<RowId> {
        self.position().row_id()
    }

    /// Whether the row under the cursor was removed since the cursor got there.
    fn is_current_row_deleted(&mut self) -> Result<bool, DatabaseError>;

    fn savepoint(&self) -> Savepoint {
        Savepoint {
            cursor_id: self.id(),
            position: self.position().clone(),
        }
    }

    /// Returns false, leaving the cursor where it was, when the saved row is gone.
    fn restore_savepoint(&mut self, savepoint: &Savepoint) -> Result<bool, DatabaseError>;

    /// Row ids of every row from the current position onward.
    fn remaining_row_ids(&mut self) -> Result<Vec<RowId>, DatabaseError> {
        let mut row_ids = Vec::new();
        while self.move_to_next_row()? {
            if let Some(row_id) = self.current_row_id() {
                row_ids.push(row_id);
            }
        }
        Ok(row_ids)
    }
}

pub(crate) fn check_savepoint_owner(id: CursorId, savepoint: &Savepoint) -> Result<(), DatabaseError> {
    if savepoint.cursor_id != id {
        return Err(DatabaseError::InvalidSavepoint {
            reason: format!(
                "savepoint belongs to cursor {:?}, not {:?}",
                savepoint.cursor_id, id
            ),
        });
    }
    Ok(())
}
