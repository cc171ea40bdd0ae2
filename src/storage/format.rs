use serde::{Deserialize, Serialize};

use crate::types::{PageNumber, error::DatabaseError};

/// Jet file format versions understood by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FileFormat {
    /// Access 97
    Jet3,
    /// Access 2000 and later
    #[default]
    Jet4,
}

impl FileFormat {
    pub fn from_version_byte(version: u8) -> Result<Self, DatabaseError> {
        match version {
            0 => Ok(FileFormat::Jet3),
            1 => Ok(FileFormat::Jet4),
            _ => Err(DatabaseError::UnsupportedFormat { version }),
        }
    }

    pub fn version_byte(&self) -> u8 {
        match self {
            FileFormat::Jet3 => 0,
            FileFormat::Jet4 => 1,
        }
    }

    pub fn jet_format(&self) -> &'static JetFormat {
        match self {
            FileFormat::Jet3 => &JET3,
            FileFormat::Jet4 => &JET4,
        }
    }
}

/// Page geometry and field offsets of one format version.
#[derive(Debug, PartialEq, Eq)]
pub struct JetFormat {
    pub file_format: FileFormat,
    pub page_size: usize,

    // data pages
    pub offset_data_free_space: usize,
    pub offset_data_owner: usize,
    pub offset_num_rows_on_data_page: usize,
    pub offset_row_start: usize,

    // index pages
    pub offset_index_free_space: usize,
    pub offset_index_owner: usize,
    pub offset_prev_index_page: usize,
    pub offset_next_index_page: usize,
    pub offset_child_tail_index_page: usize,
    pub offset_index_compressed_byte_count: usize,
    pub offset_index_entry_mask: usize,
    pub size_index_entry_mask: usize,

    // usage maps
    pub offset_usage_map_start: usize,
    pub offset_usage_map_page_data: usize,
    pub usage_map_row_length: usize,

    /// Encoded index keys are cut at this length.
    pub max_index_entry_length: usize,
}

impl JetFormat {
    pub fn index_entries_start(&self) -> usize {
        self.offset_index_entry_mask + self.size_index_entry_mask
    }

    /// Pages tracked by the bitmap of one inline usage-map row.
    pub fn inline_map_page_capacity(&self) -> u32 {
        ((self.usage_map_row_length - self.offset_usage_map_start) * 8) as u32
    }

    /// Pages tracked by one usage-map page of a reference map.
    pub fn reference_map_page_span(&self) -> u32 {
        ((self.page_size - self.offset_usage_map_page_data) * 8) as u32
    }

    /// Usage-map pages a reference map row can point at.
    pub fn max_reference_map_pages(&self) -> usize {
        (self.usage_map_row_length - 1) / 4
    }

    /// Pages a file can hold while every one of them stays trackable by a usage map.
    pub fn max_page_count(&self) -> PageNumber {
        self.reference_map_page_span() * self.max_reference_map_pages() as PageNumber
    }
}

pub static JET3: JetFormat = JetFormat {
    file_format: FileFormat::Jet3,
    page_size: 2048,

    offset_data_free_space: 2,
    offset_data_owner: 4,
    offset_num_rows_on_data_page: 8,
    offset_row_start: 10,

    offset_index_free_space: 2,
    offset_index_owner: 4,
    offset_prev_index_page: 8,
    offset_next_index_page: 12,
    offset_child_tail_index_page: 16,
    offset_index_compressed_byte_count: 20,
    offset_index_entry_mask: 22,
    size_index_entry_mask: 226,

    offset_usage_map_start: 5,
    offset_usage_map_page_data: 4,
    usage_map_row_length: 69,

    max_index_entry_length: 254,
};

pub static JET4: JetFormat = JetFormat {
    file_format: FileFormat::Jet4,
    page_size: 4096,

    offset_data_free_space: 2,
    offset_data_owner: 4,
    offset_num_rows_on_data_page: 12,
    offset_row_start: 14,

    offset_index_free_space: 2,
    offset_index_owner: 4,
    offset_prev_index_page: 8,
    offset_next_index_page: 12,
    offset_child_tail_index_page: 16,
    offset_index_compressed_byte_count: 24,
    offset_index_entry_mask: 27,
    size_index_entry_mask: 453,

    offset_usage_map_start: 5,
    offset_usage_map_page_data: 4,
    usage_map_row_length: 69,

    max_index_entry_length: 508,
};
