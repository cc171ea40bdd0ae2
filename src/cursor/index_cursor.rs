use tracing::trace;

use crate::{
    cursor::{Cursor, CursorId, Position, Savepoint, check_savepoint_owner},
    index::{Index, SharedIndexData, entry::Entry},
    types::{error::DatabaseError, value::Value},
};

/// Walks an index in entry order.
///
/// The cursor holds only its current entry. Every move searches the tree again
/// from the root, so splits and deletes made through other handles never leave it
/// pointing at a stale page.
#[derive(Debug)]
pub struct IndexCursor {
    id: CursorId,
    index_name: String,
    data: SharedIndexData,
    position: Position,
}

impl IndexCursor {
    pub fn new(index: &Index) -> Self {
        Self {
            id: CursorId::next(),
            index_name: index.name().to_string(),
            data: index.data().clone(),
            position: Position::BeforeFirst,
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn current_entry(&self) -> Option<&Entry> {
        match &self.position {
            Position::Entry(entry) => Some(entry),
            _ => None,
        }
    }

    /// Values of the current entry, one per index column.
    pub fn current_entry_values(&self) -> Result<Option<Vec<Value>>, DatabaseError> {
        match self.current_entry() {
            Some(entry) => self.data.borrow().decode_entry(entry).map(Some),
            None => Ok(None),
        }
    }

    /// Moves to the first row whose leading columns equal `values`. On a miss the
    /// cursor stays where it was.
    pub fn find_first_row_by_entry(&mut self, values: &[Value]) -> Result<bool, DatabaseError> {
        let mut data = self.data.borrow_mut();
        let prefix = data.encode_entry_values(values)?;
        let found = data.find(&Entry::first_with_key(prefix.clone()))?;
        match found {
            Some(entry) if entry.key.starts_with(&prefix) => {
                trace!(index = %self.index_name, entry = %entry, "index_cursor.find_first");
                self.position = Position::Entry(entry);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Moves to the first row at or after `values`, or after-last when there is none.
    /// Returns whether the cursor now stands on a row.
    pub fn find_closest_row_by_entry(&mut self, values: &[Value]) -> Result<bool, DatabaseError> {
        let mut data = self.data.borrow_mut();
        let prefix = data.encode_entry_values(values)?;
        match data.find(&Entry::first_with_key(prefix))? {
            Some(entry) => {
                self.position = Position::Entry(entry);
                Ok(true)
            }
            None => {
                self.position = Position::AfterLast;
                Ok(false)
            }
        }
    }

    pub fn current_row_matches_entry(&self, values: &[Value]) -> Result<bool, DatabaseError> {
        let Some(entry) = self.current_entry() else {
            return Ok(false);
        };
        let prefix = self.data.borrow().encode_entry_values(values)?;
        Ok(entry.key.starts_with(&prefix))
    }

    /// Removes the current entry from the index. Deleting it twice is a no-op.
    pub fn delete_current_row(&mut self) -> Result<bool, DatabaseError> {
        let Some(entry) = self.current_entry() else {
            return Ok(false);
        };
        self.data.borrow_mut().delete_entry(entry)
    }

    fn step(&mut self, forward: bool) -> Result<bool, DatabaseError> {
        let next = {
            let mut data = self.data.borrow_mut();
            match (&self.position, forward) {
                (Position::AfterLast, true) | (Position::BeforeFirst, false) => None,
                (Position::BeforeFirst, true) => data.first_entry()?,
                (Position::AfterLast, false) => data.last_entry()?,
                (Position::Entry(entry), true) => data.entry_after(entry)?,
                (Position::Entry(entry), false) => data.entry_before(entry)?,
                (Position::Row(_), _) => {
                    return Err(DatabaseError::InvalidSavepoint {
                        reason: "index cursor positioned on a bare row".to_string(),
                    });
                }
            }
        };
        match next {
            Some(entry) => {
                self.position = Position::Entry(entry);
                Ok(true)
            }
            None => {
                self.position = if forward {
                    Position::AfterLast
                } else {
                    Position::BeforeFirst
                };
                Ok(false)
            }
        }
    }
}

impl Cursor for IndexCursor {
    fn id(&self) -> CursorId {
        self.id
    }

    fn position(&self) -> &Position {
        &self.position
    }

    fn before_first(&mut self) {
        self.position = Position::BeforeFirst;
    }

    fn after_last(&mut self) {
        self.position = Position::AfterLast;
    }

    fn move_to_next_row(&mut self) -> Result<bool, DatabaseError> {
        self.step(true)
    }

    fn move_to_previous_row(&mut self) -> Result<bool, DatabaseError> {
        self.step(false)
    }

    fn is_current_row_deleted(&mut self) -> Result<bool, DatabaseError> {
        match self.current_entry() {
            Some(entry) => Ok(!self.data.borrow_mut().contains(entry)?),
            None => Ok(false),
        }
    }

    fn restore_savepoint(&mut self, savepoint: &Savepoint) -> Result<bool, DatabaseError> {
        check_savepoint_owner(self.id, savepoint)?;
        match &savepoint.position {
            Position::BeforeFirst | Position::AfterLast => {
                self.position = savepoint.position.clone();
                Ok(true)
            }
            Position::Entry(entry) => {
                if !self.data.borrow_mut().contains(entry)? {
                    return Ok(false);
                }
                self.position = savepoint.position.clone();
                Ok(true)
            }
            Position::Row(_) => Err(DatabaseError::InvalidSavepoint {
                reason: "index cursors restore entry positions only".to_string(),
            }),
        }
    }
}
