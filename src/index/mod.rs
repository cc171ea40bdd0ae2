pub mod char_table;
pub mod column;
pub mod entry;
pub mod index_data;
pub mod page;
pub mod text;

use std::{cell::RefCell, rc::Rc};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    cursor::index_cursor::IndexCursor,
    index::{
        column::ColumnSpec,
        entry::Entry,
        index_data::{IndexData, PreparedChange},
    },
    storage::usage_map::UsageMapLocation,
    types::{PageNumber, error::DatabaseError, row_id::RowId, value::Value},
};

pub type SharedIndexData = Rc<RefCell<IndexData>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IndexKind {
    #[default]
    Normal,
    PrimaryKey,
    ForeignKey,
}

/// Describes the other side of a foreign-key index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyReference {
    pub other_table_page: PageNumber,
    pub other_index_number: usize,
    /// True on the referenced (primary) table's side.
    pub is_primary_table: bool,
    pub cascade_updates: bool,
    pub cascade_deletes: bool,
    pub cascade_null_on_delete: bool,
}

/// What the table layer knows about one logical index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub table_name: String,
    pub table_page: PageNumber,
    pub index_number: usize,
    pub columns: Vec<ColumnSpec>,
    pub unique: bool,
    pub ignore_nulls: bool,
    pub required: bool,
    pub kind: IndexKind,
    pub reference: Option<ForeignKeyReference>,
    /// Set once the index exists on disk.
    pub root_page: Option<PageNumber>,
    pub usage_map: Option<UsageMapLocation>,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>, table_name: impl Into<String>, table_page: PageNumber) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            table_page,
            index_number: 0,
            columns: Vec::new(),
            unique: false,
            ignore_nulls: false,
            required: false,
            kind: IndexKind::Normal,
            reference: None,
            root_page: None,
            usage_map: None,
        }
    }

    pub fn with_index_number(mut self, index_number: usize) -> Self {
        self.index_number = index_number;
        self
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn ignore_nulls(mut self) -> Self {
        self.ignore_nulls = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.kind = IndexKind::PrimaryKey;
        self.unique = true;
        self.required = true;
        self
    }

    pub fn foreign_key(mut self, reference: ForeignKeyReference) -> Self {
        self.kind = IndexKind::ForeignKey;
        self.reference = Some(reference);
        self
    }

    /// Two logical indexes collapse onto one Index Data when they read the same
    /// columns of the same table the same way.
    pub fn can_share_data_with(&self, other: &IndexDefinition) -> bool {
        self.table_page == other.table_page
            && self.columns == other.columns
            && self.ignore_nulls == other.ignore_nulls
    }
}

/// A named view over an Index Data. Cheap to clone; clones share the data.
#[derive(Debug, Clone)]
pub struct Index {
    definition: IndexDefinition,
    data: SharedIndexData,
}

impl Index {
    pub fn new(definition: IndexDefinition, data: SharedIndexData) -> Self {
        Self { definition, data }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn table_name(&self) -> &str {
        &self.definition.table_name
    }

    pub fn index_number(&self) -> usize {
        self.definition.index_number
    }

    pub fn definition(&self) -> &IndexDefinition {
        &self.definition
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.definition.columns
    }

    pub fn kind(&self) -> IndexKind {
        self.definition.kind
    }

    pub fn is_primary_key(&self) -> bool {
        self.definition.kind == IndexKind::PrimaryKey
    }

    pub fn is_foreign_key(&self) -> bool {
        self.definition.kind == IndexKind::ForeignKey
    }

    pub fn reference(&self) -> Option<&ForeignKeyReference> {
        self.definition.reference.as_ref()
    }

    pub fn is_unique(&self) -> bool {
        self.definition.unique
    }

    pub fn data(&self) -> &SharedIndexData {
        &self.data
    }

    pub fn shares_data_with(&self, other: &Index) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    pub fn root_page(&self) -> PageNumber {
        self.data.borrow().root_page()
    }

    pub fn entry_count(&self) -> Result<usize, DatabaseError> {
        self.data.borrow_mut().entry_count()
    }

    pub fn unique_entry_count(&self) -> Result<usize, DatabaseError> {
        self.data.borrow_mut().unique_entry_count()
    }

    /// Adds a row given as the full table row. Returns false when the row is not
    /// indexed (a null under ignore-nulls).
    pub fn add_row(&self, row: &[Value], row_id: RowId) -> Result<bool, DatabaseError> {
        self.data.borrow_mut().add_row(row, row_id)
    }

    pub fn delete_row(&self, row: &[Value], row_id: RowId) -> Result<bool, DatabaseError> {
        self.data.borrow_mut().delete_row(row, row_id)
    }

    pub fn update_row(
        &self,
        old_row: &[Value],
        new_row: &[Value],
        row_id: RowId,
    ) -> Result<(), DatabaseError> {
        self.data.borrow_mut().update_row(old_row, new_row, row_id)
    }

    /// Encodes leading column values the way this index sorts them.
    pub fn encode_entry_values(&self, values: &[Value]) -> Result<Vec<u8>, DatabaseError> {
        self.data.borrow().encode_entry_values(values)
    }

    pub fn decode_entry(&self, entry: &Entry) -> Result<Vec<Value>, DatabaseError> {
        self.data.borrow().decode_entry(entry)
    }

    /// All entries in index order.
    pub fn entries(&self) -> Result<Vec<Entry>, DatabaseError> {
        self.data.borrow_mut().entries()
    }

    pub fn cursor(&self) -> IndexCursor {
        IndexCursor::new(self)
    }
}

/// Drops views that share an Index Data so every physical index is touched once.
fn distinct_data<'a>(indexes: &[&'a Index]) -> Vec<&'a Index> {
    let mut distinct: Vec<&Index> = Vec::with_capacity(indexes.len());
    for index in indexes {
        if !distinct.iter().any(|seen| seen.shares_data_with(index)) {
            distinct.push(index);
        }
    }
    distinct
}

/// Adds one row to several indexes. Every index validates the row before any is
/// changed, so a constraint violation leaves all of them untouched.
pub fn add_row_to_indexes(
    indexes: &[&Index],
    row: &[Value],
    row_id: RowId,
) -> Result<(), DatabaseError> {
    let targets = distinct_data(indexes);
    let mut prepared: Vec<(&Index, PreparedChange)> = Vec::with_capacity(targets.len());
    for index in targets {
        let change = index.data.borrow_mut().prepare_add_row(row, row_id)?;
        prepared.push((index, change));
    }
    for (index, change) in prepared {
        index.data.borrow_mut().commit(change)?;
    }
    Ok(())
}

pub fn delete_row_from_indexes(
    indexes: &[&Index],
    row: &[Value],
    row_id: RowId,
) -> Result<(), DatabaseError> {
    for index in distinct_data(indexes) {
        index.delete_row(row, row_id)?;
    }
    Ok(())
}

pub fn update_row_in_indexes(
    indexes: &[&Index],
    old_row: &[Value],
    new_row: &[Value],
    row_id: RowId,
) -> Result<(), DatabaseError> {
    let targets = distinct_data(indexes);
    let mut prepared: Vec<(&Index, PreparedChange)> = Vec::with_capacity(targets.len());
    for index in targets {
        let change = index
            .data
            .borrow_mut()
            .prepare_update_row(old_row, new_row, row_id)?;
        prepared.push((index, change));
    }
    for (index, change) in prepared {
        index.data.borrow_mut().commit(change)?;
    }
    Ok(())
}

/// Adds rows in order. On failure the rows before the failing one stay applied and
/// the error reports how many there were.
pub fn add_rows_to_indexes(
    indexes: &[&Index],
    rows: &[(Vec<Value>, RowId)],
) -> Result<usize, DatabaseError> {
    for (updated, (row, row_id)) in rows.iter().enumerate() {
        if let Err(source) = add_row_to_indexes(indexes, row, *row_id) {
            debug!(updated, error = %source, "index.add_rows.failed");
            return Err(DatabaseError::BatchUpdate {
                updated,
                source: Box::new(source),
            });
        }
    }
    Ok(rows.len())
}
