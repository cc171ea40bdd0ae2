pub mod config;
pub mod cursor;
pub mod database;
pub mod index;
pub mod storage;
pub mod types;
pub mod utils;

pub use config::DatabaseOptions;
pub use cursor::{Cursor, Savepoint, index_cursor::IndexCursor, table_scan::TableScanCursor};
pub use database::Database;
pub use index::{Index, IndexDefinition, column::ColumnSpec};
pub use storage::format::FileFormat;
pub use types::{
    error::DatabaseError,
    row_id::RowId,
    value::{DataType, Value},
};
