use tracing::trace;

use crate::{
    cursor::{Cursor, CursorId, Position, Savepoint, check_savepoint_owner},
    storage::{page_channel::SharedPageChannel, usage_map::SharedUsageMap},
    types::{
        PageNumber,
        error::DatabaseError,
        page::{DataPage, PageType},
        row_id::RowId,
    },
};

/// Visits the live rows of every data page owned by a usage map, in page order.
pub struct TableScanCursor {
    id: CursorId,
    channel: SharedPageChannel,
    usage_map: SharedUsageMap,
    position: Position,
}

impl TableScanCursor {
    pub fn new(channel: SharedPageChannel, usage_map: SharedUsageMap) -> Self {
        Self {
            id: CursorId::next(),
            channel,
            usage_map,
            position: Position::BeforeFirst,
        }
    }

    /// Reads `page_number` if the map still owns it and it holds rows.
    fn load_page(&self, page_number: PageNumber) -> Result<Option<DataPage>, DatabaseError> {
        if !self.usage_map.borrow().contains(page_number) {
            return Ok(None);
        }
        let mut channel = self.channel.borrow_mut();
        let bytes = channel.read_page(page_number)?;
        if bytes[0] != PageType::Data.as_u8() {
            trace!(page = page_number, page_type = bytes[0], "table_scan.skip_page");
            return Ok(None);
        }
        DataPage::from_bytes(&bytes, page_number, channel.format()).map(Some)
    }

    /// Raw bytes of the current row.
    pub fn current_row(&self) -> Result<Option<Vec<u8>>, DatabaseError> {
        let Position::Row(row_id) = self.position else {
            return Ok(None);
        };
        match self.load_page(row_id.page_number)? {
            Some(page) if !page.is_row_deleted(row_id.row_number) => {
                Ok(Some(page.row(row_id.row_number)?.to_vec()))
            }
            _ => Ok(None),
        }
    }

    fn step(&mut self, forward: bool) -> Result<bool, DatabaseError> {
        let (mut page_number, mut row) = match (&self.position, forward) {
            (Position::AfterLast, true) | (Position::BeforeFirst, false) => return Ok(false),
            (Position::BeforeFirst, true) => (self.usage_map.borrow().first_page_number(), 0i64),
            (Position::AfterLast, false) => (self.usage_map.borrow().last_page_number(), i64::MAX),
            (Position::Row(row_id), true) => {
                (Some(row_id.page_number), row_id.row_number as i64 + 1)
            }
            (Position::Row(row_id), false) => {
                (Some(row_id.page_number), row_id.row_number as i64 - 1)
            }
            (Position::Entry(_), _) => {
                return Err(DatabaseError::InvalidSavepoint {
                    reason: "table scan positioned on an index entry".to_string(),
                });
            }
        };

        while let Some(current) = page_number {
            if let Some(page) = self.load_page(current)? {
                let count = page.row_count() as i64;
                let found = if forward {
                    (row.max(0)..count).find(|r| !page.is_row_deleted(*r as u8))
                } else {
                    (0..=row.min(count - 1)).rev().find(|r| !page.is_row_deleted(*r as u8))
                };
                if let Some(found) = found {
                    self.position = Position::Row(RowId::new(current, found as u8));
                    return Ok(true);
                }
            }
            let map = self.usage_map.borrow();
            if forward {
                page_number = map.next_page_after(Some(current));
                row = 0;
            } else {
                page_number = map.previous_page_before(Some(current));
                row = i64::MAX;
            }
        }

        self.position = if forward {
            Position::AfterLast
        } else {
            Position::BeforeFirst
        };
        Ok(false)
    }
}

impl Cursor for TableScanCursor {
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
        let Position::Row(row_id) = self.position else {
            return Ok(false);
        };
        Ok(self
            .load_page(row_id.page_number)?
            .is_none_or(|page| page.is_row_deleted(row_id.row_number)))
    }

    fn restore_savepoint(&mut self, savepoint: &Savepoint) -> Result<bool, DatabaseError> {
        check_savepoint_owner(self.id, savepoint)?;
        match &savepoint.position {
            Position::BeforeFirst | Position::AfterLast => {
                self.position = savepoint.position.clone();
                Ok(true)
            }
            Position::Row(row_id) => {
                let live = self
                    .load_page(row_id.page_number)?
                    .is_some_and(|page| !page.is_row_deleted(row_id.row_number));
                if live {
                    self.position = savepoint.position.clone();
                }
                Ok(live)
            }
            Position::Entry(_) => Err(DatabaseError::InvalidSavepoint {
                reason: "table scans restore row positions only".to_string(),
            }),
        }
    }
}
