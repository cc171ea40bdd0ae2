use serde::{Deserialize, Serialize};

use crate::{
    storage::format::JetFormat,
    types::{PageNumber, error::DatabaseError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageType {
    Data = 0x01,
    TableDefinition = 0x02,
    IndexNode = 0x03,
    IndexLeaf = 0x04,
    UsageMap = 0x05,
}

impl PageType {
    pub fn from_u8(value: u8) -> Result<Self, DatabaseError> {
        match value {
            0x01 => Ok(PageType::Data),
            0x02 => Ok(PageType::TableDefinition),
            0x03 => Ok(PageType::IndexNode),
            0x04 => Ok(PageType::IndexLeaf),
            0x05 => Ok(PageType::UsageMap),
            _ => Err(DatabaseError::InvalidPageType(value)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn name(&self) -> &'static str {
        match self {
            PageType::Data => "data",
            PageType::TableDefinition => "table definition",
            PageType::IndexNode => "index node",
            PageType::IndexLeaf => "index leaf",
            PageType::UsageMap => "usage map",
        }
    }
}

/// Every page written by this crate carries this byte right after the type tag.
pub const PAGE_MARKER: u8 = 0x01;

pub const DELETED_ROW_MASK: u16 = 0x8000;
pub const OVERFLOW_ROW_MASK: u16 = 0x4000;
pub const ROW_OFFSET_MASK: u16 = 0x1FFF;

/// Row numbers are a single byte.
pub const MAX_ROWS_PER_PAGE: usize = 255;

/*
 * Data Page Layout (Jet4 offsets, Jet3 in brackets)
 * ┌─────────────────────────────────────────────────────────────────┐
 * │ type=0x01(1) | 0x01(1) | free_space(2) | owner(4) | ...         │
 * │ row_count(2) at 12 [8]                                           │
 * ├─────────────────────────────────────────────────────────────────┤
 * │ ROW OFFSETS from 14 [10], one u16 per row, flags in top bits    │
 * ├─────────────────────────────────────────────────────────────────┤
 * │                    FREE SPACE                                   │
 * ├─────────────────────────────────────────────────────────────────┤
 * │ [...row N...] [...row 1...] [...row 0...]          (page end)   │
 * └─────────────────────────────────────────────────────────────────┘
 */

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRow {
    pub deleted: bool,
    pub overflow: bool,
    pub data: Vec<u8>,
}

/// A slotted row page. Usage-map rows live on these, and table scans read them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPage {
    pub page_number: PageNumber,
    pub owner: PageNumber,
    pub rows: Vec<DataRow>,
}

impl DataPage {
    pub fn new(page_number: PageNumber, owner: PageNumber) -> Self {
        Self {
            page_number,
            owner,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn used_space(&self, format: &JetFormat) -> usize {
        format.offset_row_start
            + self.rows.len() * 2
            + self.rows.iter().map(|row| row.data.len()).sum::<usize>()
    }

    pub fn free_space(&self, format: &JetFormat) -> usize {
        format.page_size.saturating_sub(self.used_space(format))
    }

    /// Appends a row and returns its row number.
    pub fn add_row(&mut self, data: &[u8], format: &JetFormat) -> Result<u8, DatabaseError> {
        let needed = data.len() + 2;
        let available = self.free_space(format);
        if needed > available || self.rows.len() >= MAX_ROWS_PER_PAGE {
            return Err(DatabaseError::PageFull {
                page_number: self.page_number,
                needed,
                available,
            });
        }
        self.rows.push(DataRow {
            deleted: false,
            overflow: false,
            data: data.to_vec(),
        });
        Ok((self.rows.len() - 1) as u8)
    }

    fn slot(&self, row_number: u8) -> Result<&DataRow, DatabaseError> {
        self.rows
            .get(row_number as usize)
            .ok_or(DatabaseError::InvalidRow {
                page_number: self.page_number,
                row_number,
            })
    }

    /// Returns the bytes of a live row.
    pub fn row(&self, row_number: u8) -> Result<&[u8], DatabaseError> {
        let row = self.slot(row_number)?;
        if row.deleted {
            return Err(DatabaseError::InvalidRow {
                page_number: self.page_number,
                row_number,
            });
        }
        Ok(&row.data)
    }

    pub fn is_row_deleted(&self, row_number: u8) -> bool {
        self.rows
            .get(row_number as usize)
            .is_none_or(|row| row.deleted)
    }

    /// Replaces a live row with data of the same length.
    pub fn set_row(&mut self, row_number: u8, data: &[u8]) -> Result<(), DatabaseError> {
        let page_number = self.page_number;
        let row = self
            .rows
            .get_mut(row_number as usize)
            .filter(|row| !row.deleted)
            .ok_or(DatabaseError::InvalidRow {
                page_number,
                row_number,
            })?;
        if row.data.len() != data.len() {
            return Err(DatabaseError::corrupted(
                page_number,
                format!(
                    "row {} is {} bytes, replacement is {}",
                    row_number,
                    row.data.len(),
                    data.len()
                ),
            ));
        }
        row.data.copy_from_slice(data);
        Ok(())
    }

    /// Marks a row deleted. Returns false if it already was.
    pub fn delete_row(&mut self, row_number: u8) -> Result<bool, DatabaseError> {
        let page_number = self.page_number;
        let row = self
            .rows
            .get_mut(row_number as usize)
            .ok_or(DatabaseError::InvalidRow {
                page_number,
                row_number,
            })?;
        if row.deleted {
            return Ok(false);
        }
        row.deleted = true;
        Ok(true)
    }

    /// Serialize the page following the documented layout
    pub fn to_bytes(&self, format: &JetFormat) -> Result<Vec<u8>, DatabaseError> {
        let used = self.used_space(format);
        if used > format.page_size {
            return Err(DatabaseError::PageFull {
                page_number: self.page_number,
                needed: used,
                available: format.page_size,
            });
        }

        let mut buffer = vec![0u8; format.page_size];
        buffer[0] = PageType::Data.as_u8();
        buffer[1] = PAGE_MARKER;
        let free_space = (format.page_size - used) as u16;
        buffer[format.offset_data_free_space..format.offset_data_free_space + 2]
            .copy_from_slice(&free_space.to_le_bytes());
        buffer[format.offset_data_owner..format.offset_data_owner + 4]
            .copy_from_slice(&self.owner.to_le_bytes());
        let count = format.offset_num_rows_on_data_page;
        buffer[count..count + 2].copy_from_slice(&(self.rows.len() as u16).to_le_bytes());

        // row 0 ends at the page end, each later row ends where the previous one starts
        let mut end = format.page_size;
        for (index, row) in self.rows.iter().enumerate() {
            let start = end - row.data.len();
            buffer[start..end].copy_from_slice(&row.data);
            let mut offset = start as u16;
            if row.deleted {
                offset |= DELETED_ROW_MASK;
            }
            if row.overflow {
                offset |= OVERFLOW_ROW_MASK;
            }
            let slot = format.offset_row_start + index * 2;
            buffer[slot..slot + 2].copy_from_slice(&offset.to_le_bytes());
            end = start;
        }
        Ok(buffer)
    }

    /// Deserialize a page following the documented layout
    pub fn from_bytes(
        bytes: &[u8],
        page_number: PageNumber,
        format: &JetFormat,
    ) -> Result<Self, DatabaseError> {
        if bytes.len() != format.page_size {
            return Err(DatabaseError::InvalidPageSize {
                expected: format.page_size,
                actual: bytes.len(),
            });
        }
        if bytes[0] != PageType::Data.as_u8() {
            return Err(DatabaseError::UnexpectedPageType {
                page_number,
                expected: PageType::Data.name(),
                actual: bytes[0],
            });
        }

        let owner = read_u32_le(bytes, format.offset_data_owner);
        let count = format.offset_num_rows_on_data_page;
        let row_count = u16::from_le_bytes([bytes[count], bytes[count + 1]]) as usize;
        if format.offset_row_start + row_count * 2 > format.page_size {
            return Err(DatabaseError::corrupted(
                page_number,
                "Row offset table extends beyond page boundary",
            ));
        }

        let mut rows = Vec::with_capacity(row_count);
        let mut end = format.page_size;
        for index in 0..row_count {
            let slot = format.offset_row_start + index * 2;
            let raw = u16::from_le_bytes([bytes[slot], bytes[slot + 1]]);
            let start = (raw & ROW_OFFSET_MASK) as usize;
            if start > end || start < format.offset_row_start + row_count * 2 {
                return Err(DatabaseError::corrupted(
                    page_number,
                    format!("Row {} has offset {} past its end {}", index, start, end),
                ));
            }
            rows.push(DataRow {
                deleted: raw & DELETED_ROW_MASK != 0,
                overflow: raw & OVERFLOW_ROW_MASK != 0,
                data: bytes[start..end].to_vec(),
            });
            end = start;
        }

        Ok(Self {
            page_number,
            owner,
            rows,
        })
    }
}

pub fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

pub fn read_u16_le(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}
