use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{MAX_ROW_PAGE_NUMBER, PageNumber, error::DatabaseError};

/// Size of a row id inside an index entry: 3-byte page number + 1-byte row number.
pub const ROW_ID_SIZE: usize = 4;

/// Identifies a row by the data page holding it and its slot on that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowId {
    pub page_number: PageNumber,
    pub row_number: u8,
}

impl RowId {
    /// Sorts before every real row. Page 0 is the header page and never holds rows.
    pub const FIRST: RowId = RowId {
        page_number: 0,
        row_number: 0,
    };

    /// Sorts after every real row.
    pub const LAST: RowId = RowId {
        page_number: MAX_ROW_PAGE_NUMBER,
        row_number: u8::MAX,
    };

    pub fn new(page_number: PageNumber, row_number: u8) -> Self {
        Self {
            page_number,
            row_number,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.page_number > 0 && self.page_number < MAX_ROW_PAGE_NUMBER
    }

    /// Index entries store the page number big-endian so that byte order follows row order.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let page = self.page_number.to_be_bytes();
        out.extend_from_slice(&page[1..4]);
        out.push(self.row_number);
    }

    pub fn read_from(bytes: &[u8]) -> Result<Self, DatabaseError> {
        if bytes.len() < ROW_ID_SIZE {
            return Err(DatabaseError::decode(format!(
                "row id needs {} bytes, got {}",
                ROW_ID_SIZE,
                bytes.len()
            )));
        }
        let page_number = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
        Ok(Self {
            page_number,
            row_number: bytes[3],
        })
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.page_number, self.row_number)
    }
}
