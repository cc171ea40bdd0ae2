use std::{
    fs,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::{SystemTime, UNIX_EPOCH},
};

use tempfile::env::temp_dir;

use crate::{
    config::DatabaseOptions,
    database::Database,
    index::{IndexDefinition, column::ColumnSpec},
    types::{PageNumber, error::DatabaseError, value::DataType},
};

/// Owner page recorded on pages of the sample indexes below.
pub const SAMPLE_TABLE_PAGE: PageNumber = 2;

static NEXT_TEMP_ID: AtomicU64 = AtomicU64::new(0);

pub fn get_unix_timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

pub fn create_temp_db_path() -> PathBuf {
    create_temp_db_path_with_prefix("jetdb_test")
}

// Tests run in parallel threads, so the timestamp alone is not unique
pub fn create_temp_db_path_with_prefix(prefix: &str) -> PathBuf {
    let mut temp_path = temp_dir();
    temp_path.push(format!(
        "{}_{}_{}_{}.mdb",
        prefix,
        std::process::id(),
        get_unix_timestamp_millis(),
        NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed)
    ));
    temp_path
}

/// A database file in the temp directory, removed on drop.
pub struct TempDatabase {
    pub path: PathBuf,
    pub database: Option<Database>,
}

impl Default for TempDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl TempDatabase {
    pub fn new() -> Self {
        Self {
            path: create_temp_db_path(),
            database: None,
        }
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            path: create_temp_db_path_with_prefix(prefix),
            database: None,
        }
    }

    pub fn create_database(&mut self, options: DatabaseOptions) -> Result<&mut Database, DatabaseError> {
        let database = Database::create(&self.path, options)?;
        Ok(self.database.insert(database))
    }

    /// Closes the current handle, if any, and opens the file again.
    pub fn reopen_database(&mut self, options: DatabaseOptions) -> Result<&mut Database, DatabaseError> {
        self.close_database()?;
        let database = Database::open(&self.path, options)?;
        Ok(self.database.insert(database))
    }

    pub fn get_database(&mut self) -> Option<&mut Database> {
        self.database.as_mut()
    }

    pub fn close_database(&mut self) -> Result<(), DatabaseError> {
        if let Some(database) = self.database.take() {
            database.close()?;
        }
        Ok(())
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        self.database = None;
        if self.path.exists() {
            let _ = fs::remove_file(&self.path);
        }
    }
}

pub fn memory_database() -> Result<Database, DatabaseError> {
    Database::create_in_memory(DatabaseOptions::default())
}

/// Single text column index on column 0.
pub fn text_index_definition(name: &str) -> IndexDefinition {
    IndexDefinition::new(name, "people", SAMPLE_TABLE_PAGE)
        .column(ColumnSpec::new(0, "name", DataType::Text))
}

/// Single 64-bit integer column index on column 0.
pub fn big_int_index_definition(name: &str) -> IndexDefinition {
    IndexDefinition::new(name, "numbers", SAMPLE_TABLE_PAGE)
        .column(ColumnSpec::new(0, "value", DataType::BigInt))
}

/// Two-column index: text on column 0, long on column 1.
pub fn composite_index_definition(name: &str) -> IndexDefinition {
    IndexDefinition::new(name, "people", SAMPLE_TABLE_PAGE)
        .column(ColumnSpec::new(0, "name", DataType::Text))
        .column(ColumnSpec::new(1, "age", DataType::Long))
}
