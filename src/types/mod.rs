pub mod error;
pub mod page;
pub mod row_id;
pub mod value;

// Common type aliases
pub type PageNumber = u32;
pub type ColumnNumber = usize;

// Page 0 is the database header; page 1 holds the global usage map row
pub const HEADER_PAGE_NUMBER: PageNumber = 0;
pub const GLOBAL_USAGE_MAP_PAGE: PageNumber = 1;
pub const GLOBAL_USAGE_MAP_ROW: u8 = 0;

// On-disk "no page" marker for sibling and child links
pub const INVALID_PAGE_NUMBER: PageNumber = 0;

// Row ids carry a 3-byte page number
pub const MAX_ROW_PAGE_NUMBER: PageNumber = 0x00FF_FFFF;
