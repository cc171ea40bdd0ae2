use std::{collections::HashMap, fmt, rc::Rc};

use tracing::{debug, trace, warn};

use crate::{
    index::{
        IndexDefinition,
        char_table::CharTable,
        column::ColumnSpec,
        entry::Entry,
        page::IndexPage,
    },
    storage::{
        format::JetFormat,
        page_channel::{PageChannel, SharedPageChannel},
        usage_map::UsageMap,
    },
    types::{
        INVALID_PAGE_NUMBER, MAX_ROW_PAGE_NUMBER, PageNumber,
        error::{ConstraintKind, DatabaseError},
        row_id::RowId,
        value::Value,
    },
};

/// What a child page looks like after a change below a node.
struct ChildUpdate {
    /// Greatest entry left in the child; `None` once the child was emptied and freed.
    max: Option<Entry>,
    /// A new left sibling split off the child, with its greatest entry.
    split: Option<(PageNumber, Entry)>,
}

#[derive(Debug, Clone)]
struct PendingAdd {
    entry: Entry,
    enforce_unique: bool,
}

/// A validated index change, applied by [`IndexData::commit`].
#[derive(Debug, Clone)]
pub struct PreparedChange {
    remove: Option<Entry>,
    add: Option<PendingAdd>,
    mod_count: u64,
}

impl PreparedChange {
    pub fn is_noop(&self) -> bool {
        self.remove.is_none() && self.add.is_none()
    }
}

/// The physical B-tree behind one or more logical indexes.
pub struct IndexData {
    channel: SharedPageChannel,
    format: &'static JetFormat,
    name: String,
    table_name: String,
    table_page: PageNumber,
    root_page: PageNumber,
    columns: Vec<ColumnSpec>,
    unique: bool,
    ignore_nulls: bool,
    required: bool,
    usage_map: UsageMap,
    pages: HashMap<PageNumber, IndexPage>,
    entry_count: usize,
    unique_entry_count: usize,
    initialized: bool,
    mod_count: u64,
}

impl fmt::Debug for IndexData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexData")
            .field("name", &self.name)
            .field("table_name", &self.table_name)
            .field("root_page", &self.root_page)
            .field("columns", &self.columns)
            .field("unique", &self.unique)
            .field("ignore_nulls", &self.ignore_nulls)
            .field("required", &self.required)
            .field("entry_count", &self.entry_count)
            .field("initialized", &self.initialized)
            .finish()
    }
}

impl IndexData {
    fn from_definition(
        channel: SharedPageChannel,
        definition: &IndexDefinition,
        root_page: PageNumber,
        usage_map: UsageMap,
    ) -> Self {
        let format = channel.borrow().format();
        Self {
            channel,
            format,
            name: definition.name.clone(),
            table_name: definition.table_name.clone(),
            table_page: definition.table_page,
            root_page,
            columns: definition.columns.clone(),
            unique: definition.unique,
            ignore_nulls: definition.ignore_nulls,
            required: definition.required,
            usage_map,
            pages: HashMap::new(),
            entry_count: 0,
            unique_entry_count: 0,
            initialized: false,
            mod_count: 0,
        }
    }

    /// Builds an empty index: a single empty leaf as root, taken through `usage_map`.
    pub fn create(
        channel: SharedPageChannel,
        definition: &IndexDefinition,
        mut usage_map: UsageMap,
    ) -> Result<Self, DatabaseError> {
        let root_page = {
            let mut page_channel = channel.borrow_mut();
            let root_page = usage_map.allocate_page(&mut page_channel)?;
            let format = page_channel.format();
            let root = IndexPage::new_leaf(root_page, definition.table_page);
            page_channel.write_page(&root.to_bytes(format)?, root_page)?;
            root_page
        };
        debug!(index = %definition.name, root_page, "index_data.create");

        let mut data = Self::from_definition(channel, definition, root_page, usage_map);
        data.initialized = true;
        Ok(data)
    }

    /// Attaches to an existing index. Pages are read on first use.
    pub fn open(
        channel: SharedPageChannel,
        definition: &IndexDefinition,
        root_page: PageNumber,
        usage_map: UsageMap,
    ) -> Self {
        Self::from_definition(channel, definition, root_page, usage_map)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn table_page(&self) -> PageNumber {
        self.table_page
    }

    pub fn root_page(&self) -> PageNumber {
        self.root_page
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn ignores_nulls(&self) -> bool {
        self.ignore_nulls
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn usage_map(&self) -> &UsageMap {
        &self.usage_map
    }

    pub fn mod_count(&self) -> u64 {
        self.mod_count
    }

    /// A logical index sharing this data adds its constraints.
    pub fn merge_constraints(&mut self, unique: bool, required: bool) {
        self.unique |= unique;
        self.required |= required;
    }

    pub fn entry_count(&mut self) -> Result<usize, DatabaseError> {
        self.initialize()?;
        Ok(self.entry_count)
    }

    pub fn unique_entry_count(&mut self) -> Result<usize, DatabaseError> {
        self.initialize()?;
        Ok(self.unique_entry_count)
    }

    /// Reads the whole leaf level once to establish the counts.
    pub fn initialize(&mut self) -> Result<(), DatabaseError> {
        if self.initialized {
            return Ok(());
        }
        let entries = self.entries()?;
        self.entry_count = entries.len();
        self.unique_entry_count = count_distinct_keys(&entries);
        self.initialized = true;
        debug!(
            index = %self.name,
            entries = self.entry_count,
            unique = self.unique_entry_count,
            "index_data.initialize"
        );
        Ok(())
    }

    // ---- key encoding ----

    fn truncate_key(&self, key: &mut Vec<u8>) {
        if key.len() > self.format.max_index_entry_length {
            trace!(index = %self.name, length = key.len(), "index_data.truncate_key");
            key.truncate(self.format.max_index_entry_length);
        }
    }

    /// Encodes the indexed columns of a full table row. `None` means the row is not
    /// indexed; the flag tells whether any indexed column was null.
    fn encode_row(
        &self,
        row: &[Value],
        enforce_required: bool,
    ) -> Result<Option<(Vec<u8>, bool)>, DatabaseError> {
        let table = CharTable::general();
        let mut key = Vec::new();
        let mut has_null = false;
        for column in &self.columns {
            let value = row
                .get(column.column_number)
                .ok_or_else(|| DatabaseError::MissingColumn {
                    index: self.name.clone(),
                    column: column.column_number,
                    actual: row.len(),
                })?;
            has_null |= column.is_null(value);
            column.encode(value, table, &mut key)?;
        }

        if has_null {
            if enforce_required && self.required {
                return Err(self.violation(ConstraintKind::Required));
            }
            if self.ignore_nulls {
                return Ok(None);
            }
        }
        self.truncate_key(&mut key);
        Ok(Some((key, has_null)))
    }

    /// Encodes values for the leading index columns, in index column order.
    pub fn encode_entry_values(&self, values: &[Value]) -> Result<Vec<u8>, DatabaseError> {
        if values.len() > self.columns.len() {
            return Err(DatabaseError::TooManyValues {
                index: self.name.clone(),
                expected: self.columns.len(),
                actual: values.len(),
            });
        }
        let table = CharTable::general();
        let mut key = Vec::new();
        for (column, value) in self.columns.iter().zip(values) {
            column.encode(value, table, &mut key)?;
        }
        self.truncate_key(&mut key);
        Ok(key)
    }

    /// Decodes an entry back into one value per index column.
    pub fn decode_entry(&self, entry: &Entry) -> Result<Vec<Value>, DatabaseError> {
        let table = CharTable::general();
        let mut values = Vec::with_capacity(self.columns.len());
        let mut position = 0;
        for column in &self.columns {
            let (value, consumed) = column.decode(&entry.key[position..], table)?;
            values.push(value);
            position += consumed;
        }
        if position != entry.key.len() {
            return Err(DatabaseError::decode(format!(
                "{} trailing bytes after the last column",
                entry.key.len() - position
            )));
        }
        Ok(values)
    }

    fn violation(&self, kind: ConstraintKind) -> DatabaseError {
        DatabaseError::ConstraintViolation {
            kind,
            index: self.name.clone(),
            table: self.table_name.clone(),
        }
    }

    // ---- mutation ----

    pub fn prepare_add_row(
        &mut self,
        row: &[Value],
        row_id: RowId,
    ) -> Result<PreparedChange, DatabaseError> {
        check_row_id(row_id)?;
        self.initialize()?;
        let add = match self.encode_row(row, true)? {
            Some((key, has_null)) => {
                let entry = Entry::new(key, row_id);
                let enforce_unique = self.unique && !has_null;
                self.check_add(&entry, enforce_unique, None)?;
                Some(PendingAdd {
                    entry,
                    enforce_unique,
                })
            }
            None => None,
        };
        Ok(PreparedChange {
            remove: None,
            add,
            mod_count: self.mod_count,
        })
    }

    pub fn prepare_update_row(
        &mut self,
        old_row: &[Value],
        new_row: &[Value],
        row_id: RowId,
    ) -> Result<PreparedChange, DatabaseError> {
        check_row_id(row_id)?;
        self.initialize()?;
        let remove = self.encode_row(old_row, false)?.map(|(key, _)| Entry::new(key, row_id));
        let add = self
            .encode_row(new_row, true)?
            .map(|(key, has_null)| PendingAdd {
                entry: Entry::new(key, row_id),
                enforce_unique: self.unique && !has_null,
            });

        if let (Some(old), Some(new)) = (&remove, &add) {
            if *old == new.entry {
                return Ok(PreparedChange {
                    remove: None,
                    add: None,
                    mod_count: self.mod_count,
                });
            }
        }
        if let Some(new) = &add {
            let replaced = remove.as_ref().map(|entry| entry.row_id);
            self.check_unique(&new.entry, new.enforce_unique, replaced)?;
        }
        Ok(PreparedChange {
            remove,
            add,
            mod_count: self.mod_count,
        })
    }

    fn check_add(
        &mut self,
        entry: &Entry,
        enforce_unique: bool,
        replaced: Option<RowId>,
    ) -> Result<(), DatabaseError> {
        if self.contains(entry)? {
            return Err(DatabaseError::DuplicateEntry {
                index: self.name.clone(),
            });
        }
        self.check_unique(entry, enforce_unique, replaced)
    }

    fn check_unique(
        &mut self,
        entry: &Entry,
        enforce_unique: bool,
        replaced: Option<RowId>,
    ) -> Result<(), DatabaseError> {
        if enforce_unique && self.has_key(&entry.key, replaced)? {
            return Err(self.violation(ConstraintKind::Unique));
        }
        Ok(())
    }

    /// Applies a prepared change. Checks are repeated if the index changed since.
    pub fn commit(&mut self, change: PreparedChange) -> Result<(), DatabaseError> {
        if change.is_noop() {
            return Ok(());
        }
        if change.mod_count != self.mod_count {
            if let Some(add) = &change.add {
                let replaced = change.remove.as_ref().map(|entry| entry.row_id);
                self.check_unique(&add.entry, add.enforce_unique, replaced)?;
            }
        }

        let channel = Rc::clone(&self.channel);
        let mut channel = channel.borrow_mut();
        channel.start_write();
        let result = self.apply(&mut channel, change);
        let finished = channel.finish_write();
        result.and(finished)
    }

    fn apply(&mut self, channel: &mut PageChannel, change: PreparedChange) -> Result<(), DatabaseError> {
        if let Some(entry) = change.remove {
            self.remove_entry(channel, &entry)?;
        }
        if let Some(add) = change.add {
            let new_key = !self.has_key_in(channel, &add.entry.key, None)?;
            let update = self.insert_into(channel, self.root_page, &add.entry)?;
            if update.split.is_some() {
                return Err(DatabaseError::corrupted(self.root_page, "root split escaped"));
            }
            self.entry_count += 1;
            if new_key {
                self.unique_entry_count += 1;
            }
            self.mod_count += 1;
            trace!(index = %self.name, entry = %add.entry, "index_data.add");
        }
        Ok(())
    }

    /// Returns false if the row was not indexed (a null under ignore-nulls).
    pub fn add_row(&mut self, row: &[Value], row_id: RowId) -> Result<bool, DatabaseError> {
        let change = self.prepare_add_row(row, row_id)?;
        let added = change.add.is_some();
        self.commit(change)?;
        Ok(added)
    }

    /// Returns false if the row had no entry.
    pub fn delete_row(&mut self, row: &[Value], row_id: RowId) -> Result<bool, DatabaseError> {
        match self.encode_row(row, false)? {
            Some((key, _)) => self.delete_entry(&Entry::new(key, row_id)),
            None => Ok(false),
        }
    }

    pub fn update_row(
        &mut self,
        old_row: &[Value],
        new_row: &[Value],
        row_id: RowId,
    ) -> Result<(), DatabaseError> {
        let change = self.prepare_update_row(old_row, new_row, row_id)?;
        self.commit(change)
    }

    /// Removes one exact entry. Missing entries are not an error.
    pub fn delete_entry(&mut self, entry: &Entry) -> Result<bool, DatabaseError> {
        self.initialize()?;
        let channel = Rc::clone(&self.channel);
        let mut channel = channel.borrow_mut();
        channel.start_write();
        let result = self.remove_entry(&mut channel, entry);
        let finished = channel.finish_write();
        let removed = result?;
        finished?;
        Ok(removed)
    }

    fn remove_entry(&mut self, channel: &mut PageChannel, entry: &Entry) -> Result<bool, DatabaseError> {
        let Some(update) = self.remove_from(channel, self.root_page, entry)? else {
            return Ok(false);
        };
        if update.split.is_some() {
            return Err(DatabaseError::corrupted(self.root_page, "root split escaped"));
        }
        self.entry_count = self.entry_count.saturating_sub(1);
        if !self.has_key_in(channel, &entry.key, None)? {
            self.unique_entry_count = self.unique_entry_count.saturating_sub(1);
        }
        self.mod_count += 1;
        trace!(index = %self.name, entry = %entry, "index_data.remove");
        Ok(true)
    }

    // ---- page access ----

    fn cached_page(
        &mut self,
        channel: &mut PageChannel,
        page_number: PageNumber,
    ) -> Result<&IndexPage, DatabaseError> {
        if !self.pages.contains_key(&page_number) {
            let bytes = channel.read_page(page_number)?;
            let page = IndexPage::from_bytes(&bytes, page_number, self.format)?;
            self.pages.insert(page_number, page);
        }
        self.pages
            .get(&page_number)
            .ok_or_else(|| DatabaseError::corrupted(page_number, "index page vanished from cache"))
    }

    fn read_index_page(
        &mut self,
        channel: &mut PageChannel,
        page_number: PageNumber,
    ) -> Result<IndexPage, DatabaseError> {
        self.cached_page(channel, page_number).cloned()
    }

    fn write_index_page(
        &mut self,
        channel: &mut PageChannel,
        mut page: IndexPage,
    ) -> Result<(), DatabaseError> {
        page.child_tail_page = if page.is_leaf {
            INVALID_PAGE_NUMBER
        } else {
            page.children.last().copied().unwrap_or(INVALID_PAGE_NUMBER)
        };
        let bytes = page.to_bytes(self.format)?;
        channel.write_page(&bytes, page.page_number)?;
        self.pages.insert(page.page_number, page);
        Ok(())
    }

    fn set_sibling_link(
        &mut self,
        channel: &mut PageChannel,
        page_number: PageNumber,
        prev: Option<PageNumber>,
        next: Option<PageNumber>,
    ) -> Result<(), DatabaseError> {
        if page_number == INVALID_PAGE_NUMBER {
            return Ok(());
        }
        let mut page = self.read_index_page(channel, page_number)?;
        if let Some(prev) = prev {
            page.prev_page = prev;
        }
        if let Some(next) = next {
            page.next_page = next;
        }
        self.write_index_page(channel, page)
    }

    // ---- tree mechanics ----

    fn insert_into(
        &mut self,
        channel: &mut PageChannel,
        page_number: PageNumber,
        entry: &Entry,
    ) -> Result<ChildUpdate, DatabaseError> {
        let mut page = self.read_index_page(channel, page_number)?;
        if page.is_leaf {
            let position = page.lower_bound(entry, false);
            if page.entries.get(position) == Some(entry) {
                return Err(DatabaseError::DuplicateEntry {
                    index: self.name.clone(),
                });
            }
            page.entries.insert(position, entry.clone());
        } else {
            if page.entries.is_empty() {
                return Err(DatabaseError::corrupted(page_number, "empty index node page"));
            }
            let slot = page.lower_bound(entry, false).min(page.entries.len() - 1);
            let update = self.insert_into(channel, page.children[slot], entry)?;
            apply_child_update(&mut page, slot, update);
        }
        self.finish_page_update(channel, page)
    }

    /// Removes `entry` below `page_number`; `None` when it is not there.
    fn remove_from(
        &mut self,
        channel: &mut PageChannel,
        page_number: PageNumber,
        entry: &Entry,
    ) -> Result<Option<ChildUpdate>, DatabaseError> {
        let (is_leaf, slot, child) = {
            let page = self.cached_page(channel, page_number)?;
            let slot = page.lower_bound(entry, false);
            if page.is_leaf {
                if page.entries.get(slot) != Some(entry) {
                    return Ok(None);
                }
                (true, slot, INVALID_PAGE_NUMBER)
            } else {
                match page.children.get(slot) {
                    Some(child) => (false, slot, *child),
                    None => return Ok(None),
                }
            }
        };

        let mut page = self.read_index_page(channel, page_number)?;
        if is_leaf {
            page.entries.remove(slot);
        } else {
            let Some(update) = self.remove_from(channel, child, entry)? else {
                return Ok(None);
            };
            apply_child_update(&mut page, slot, update);
        }
        self.finish_page_update(channel, page).map(Some)
    }

    /// Writes a changed page, freeing it when empty or splitting it when full.
    fn finish_page_update(
        &mut self,
        channel: &mut PageChannel,
        page: IndexPage,
    ) -> Result<ChildUpdate, DatabaseError> {
        let is_root = page.page_number == self.root_page;

        if page.entries.is_empty() {
            if is_root {
                // an emptied root always goes back to being a leaf
                let leaf = IndexPage::new_leaf(page.page_number, page.owner);
                self.write_index_page(channel, leaf)?;
            } else {
                self.unlink_and_free(channel, page)?;
            }
            return Ok(ChildUpdate {
                max: None,
                split: None,
            });
        }

        if page.fits(self.format) {
            let max = page.last_entry().cloned();
            self.write_index_page(channel, page)?;
            return Ok(ChildUpdate { max, split: None });
        }

        if is_root {
            self.split_root(channel, page)
        } else {
            self.split_page(channel, page)
        }
    }

    /// Moves the lower half of `page` into a new left sibling.
    fn split_page(
        &mut self,
        channel: &mut PageChannel,
        mut page: IndexPage,
    ) -> Result<ChildUpdate, DatabaseError> {
        let (lower_entries, lower_children) = page.split_lower_half();
        let left_page = self.usage_map.allocate_page(channel)?;

        let mut left = if page.is_leaf {
            IndexPage::new_leaf(left_page, page.owner)
        } else {
            IndexPage::new_node(left_page, page.owner)
        };
        left.entries = lower_entries;
        left.children = lower_children;
        left.prev_page = page.prev_page;
        left.next_page = page.page_number;

        self.set_sibling_link(channel, page.prev_page, None, Some(left_page))?;
        page.prev_page = left_page;

        let left_max = left
            .last_entry()
            .cloned()
            .ok_or_else(|| DatabaseError::corrupted(left_page, "split produced an empty page"))?;
        let max = page.last_entry().cloned();
        debug!(
            index = %self.name,
            page = page.page_number,
            left_page,
            leaf = page.is_leaf,
            "index_data.split"
        );
        self.write_index_page(channel, left)?;
        self.write_index_page(channel, page)?;
        Ok(ChildUpdate {
            max,
            split: Some((left_page, left_max)),
        })
    }

    /// The root keeps its page number: its contents move into two new children.
    fn split_root(
        &mut self,
        channel: &mut PageChannel,
        mut root: IndexPage,
    ) -> Result<ChildUpdate, DatabaseError> {
        let (lower_entries, lower_children) = root.split_lower_half();
        let left_page = self.usage_map.allocate_page(channel)?;
        let right_page = self.usage_map.allocate_page(channel)?;

        let new_child = |page_number| {
            if root.is_leaf {
                IndexPage::new_leaf(page_number, root.owner)
            } else {
                IndexPage::new_node(page_number, root.owner)
            }
        };
        let mut left = new_child(left_page);
        let mut right = new_child(right_page);
        left.entries = lower_entries;
        left.children = lower_children;
        left.next_page = right_page;
        right.entries = std::mem::take(&mut root.entries);
        right.children = std::mem::take(&mut root.children);
        right.prev_page = left_page;

        let (Some(left_max), Some(right_max)) =
            (left.last_entry().cloned(), right.last_entry().cloned())
        else {
            return Err(DatabaseError::corrupted(root.page_number, "root split produced an empty page"));
        };

        let mut new_root = IndexPage::new_node(root.page_number, root.owner);
        new_root.entries = vec![left_max, right_max.clone()];
        new_root.children = vec![left_page, right_page];
        debug!(
            index = %self.name,
            root = root.page_number,
            left_page,
            right_page,
            "index_data.split_root"
        );

        self.write_index_page(channel, left)?;
        self.write_index_page(channel, right)?;
        self.write_index_page(channel, new_root)?;
        Ok(ChildUpdate {
            max: Some(right_max),
            split: None,
        })
    }

    fn unlink_and_free(&mut self, channel: &mut PageChannel, page: IndexPage) -> Result<(), DatabaseError> {
        self.set_sibling_link(channel, page.prev_page, None, Some(page.next_page))?;
        self.set_sibling_link(channel, page.next_page, Some(page.prev_page), None)?;
        self.pages.remove(&page.page_number);
        debug!(index = %self.name, page = page.page_number, "index_data.free_page");
        self.usage_map.free_page(channel, page.page_number)
    }

    // ---- navigation ----

    fn with_channel<T>(
        &mut self,
        f: impl FnOnce(&mut Self, &mut PageChannel) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let channel = Rc::clone(&self.channel);
        let mut channel = channel.borrow_mut();
        f(self, &mut channel)
    }

    fn ceiling_in(
        &mut self,
        channel: &mut PageChannel,
        page_number: PageNumber,
        entry: &Entry,
        strict: bool,
    ) -> Result<Option<Entry>, DatabaseError> {
        let page = self.cached_page(channel, page_number)?;
        let slot = page.lower_bound(entry, strict);
        if page.is_leaf {
            return Ok(page.entries.get(slot).cloned());
        }
        match page.children.get(slot).copied() {
            Some(child) => self.ceiling_in(channel, child, entry, strict),
            None => Ok(None),
        }
    }

    fn floor_in(
        &mut self,
        channel: &mut PageChannel,
        page_number: PageNumber,
        entry: &Entry,
    ) -> Result<Option<Entry>, DatabaseError> {
        let page = self.cached_page(channel, page_number)?;
        let slot = page.lower_bound(entry, false);
        let before = slot.checked_sub(1).and_then(|i| page.entries.get(i).cloned());
        if page.is_leaf {
            return Ok(before);
        }
        match page.children.get(slot).copied() {
            Some(child) => Ok(self.floor_in(channel, child, entry)?.or(before)),
            None => Ok(page.last_entry().cloned()),
        }
    }

    fn has_key_in(
        &mut self,
        channel: &mut PageChannel,
        key: &[u8],
        exclude: Option<RowId>,
    ) -> Result<bool, DatabaseError> {
        let mut probe = Entry::first_with_key(key.to_vec());
        let mut strict = false;
        while let Some(found) = self.ceiling_in(channel, self.root_page, &probe, strict)? {
            if found.key != key {
                return Ok(false);
            }
            if Some(found.row_id) != exclude {
                return Ok(true);
            }
            probe = found;
            strict = true;
        }
        Ok(false)
    }

    /// Whether any entry other than `exclude`'s has exactly this key.
    pub fn has_key(&mut self, key: &[u8], exclude: Option<RowId>) -> Result<bool, DatabaseError> {
        self.with_channel(|data, channel| data.has_key_in(channel, key, exclude))
    }

    pub fn contains(&mut self, entry: &Entry) -> Result<bool, DatabaseError> {
        Ok(self.find(entry)?.as_ref() == Some(entry))
    }

    /// The first entry `>= entry`.
    pub fn find(&mut self, entry: &Entry) -> Result<Option<Entry>, DatabaseError> {
        self.with_channel(|data, channel| data.ceiling_in(channel, data.root_page, entry, false))
    }

    /// The first entry `> entry`.
    pub fn entry_after(&mut self, entry: &Entry) -> Result<Option<Entry>, DatabaseError> {
        self.with_channel(|data, channel| data.ceiling_in(channel, data.root_page, entry, true))
    }

    /// The last entry `< entry`.
    pub fn entry_before(&mut self, entry: &Entry) -> Result<Option<Entry>, DatabaseError> {
        self.with_channel(|data, channel| data.floor_in(channel, data.root_page, entry))
    }

    pub fn first_entry(&mut self) -> Result<Option<Entry>, DatabaseError> {
        self.find(&Entry::first_with_key(Vec::new()))
    }

    pub fn last_entry(&mut self) -> Result<Option<Entry>, DatabaseError> {
        self.with_channel(|data, channel| {
            let mut page_number = data.root_page;
            loop {
                let page = data.cached_page(channel, page_number)?;
                if page.is_leaf {
                    return Ok(page.last_entry().cloned());
                }
                match page.children.last() {
                    Some(child) => page_number = *child,
                    None => return Ok(None),
                }
            }
        })
    }

    fn leftmost_leaf(
        &mut self,
        channel: &mut PageChannel,
    ) -> Result<PageNumber, DatabaseError> {
        let mut page_number = self.root_page;
        loop {
            let page = self.cached_page(channel, page_number)?;
            if page.is_leaf {
                return Ok(page_number);
            }
            page_number = *page
                .children
                .first()
                .ok_or_else(|| DatabaseError::corrupted(page_number, "empty index node page"))?;
        }
    }

    /// All entries in order, following the leaf chain.
    pub fn entries(&mut self) -> Result<Vec<Entry>, DatabaseError> {
        self.with_channel(|data, channel| {
            let mut entries = Vec::new();
            let mut page_number = data.leftmost_leaf(channel)?;
            let mut visited = 0usize;
            while page_number != INVALID_PAGE_NUMBER {
                let page = data.cached_page(channel, page_number)?;
                entries.extend(page.entries.iter().cloned());
                page_number = page.next_page;
                visited += 1;
                if visited > channel.page_count() as usize {
                    return Err(DatabaseError::corrupted(page_number, "cycle in leaf chain"));
                }
            }
            Ok(entries)
        })
    }

    /// Checks ordering, node maxima, sibling links and counts of the whole tree.
    pub fn validate(&mut self) -> Result<(), DatabaseError> {
        self.initialize()?;
        self.with_channel(|data, channel| {
            let mut levels: Vec<Vec<PageNumber>> = Vec::new();
            let mut leaf_entries = 0;
            data.validate_page(channel, data.root_page, 0, None, &mut levels, &mut leaf_entries)?;

            for level in &levels {
                for (position, page_number) in level.iter().enumerate() {
                    let expected_prev = position
                        .checked_sub(1)
                        .map_or(INVALID_PAGE_NUMBER, |i| level[i]);
                    let expected_next = level.get(position + 1).copied().unwrap_or(INVALID_PAGE_NUMBER);
                    let page = data.cached_page(channel, *page_number)?;
                    if page.prev_page != expected_prev || page.next_page != expected_next {
                        return Err(DatabaseError::corrupted(
                            *page_number,
                            format!(
                                "sibling links {}/{} but expected {}/{}",
                                page.prev_page, page.next_page, expected_prev, expected_next
                            ),
                        ));
                    }
                }
            }
            if leaf_entries != data.entry_count {
                return Err(DatabaseError::corrupted(
                    data.root_page,
                    format!("{} entries counted, {} in tree", data.entry_count, leaf_entries),
                ));
            }
            for page_number in levels.iter().flatten() {
                if !data.usage_map.contains(*page_number) {
                    warn!(page = page_number, "index_data.validate.unowned_page");
                    return Err(DatabaseError::UsageMapInconsistent {
                        page_number: *page_number,
                        reason: format!("index page not owned by index '{}'", data.name),
                    });
                }
            }
            Ok(())
        })
    }

    fn validate_page(
        &mut self,
        channel: &mut PageChannel,
        page_number: PageNumber,
        depth: usize,
        expected_max: Option<&Entry>,
        levels: &mut Vec<Vec<PageNumber>>,
        leaf_entries: &mut usize,
    ) -> Result<(), DatabaseError> {
        let page = self.read_index_page(channel, page_number)?;
        if levels.len() <= depth {
            levels.push(Vec::new());
        }
        levels[depth].push(page_number);

        if page.entries.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(DatabaseError::corrupted(page_number, "entries out of order"));
        }
        if let Some(expected) = expected_max {
            if page.last_entry() != Some(expected) {
                return Err(DatabaseError::corrupted(
                    page_number,
                    "parent entry is not the greatest entry of its child",
                ));
            }
        }
        if page.is_leaf {
            *leaf_entries += page.entries.len();
            return Ok(());
        }
        if page.entries.is_empty() || page.children.len() != page.entries.len() {
            return Err(DatabaseError::corrupted(page_number, "malformed index node page"));
        }
        for (entry, child) in page.entries.iter().zip(&page.children) {
            self.validate_page(channel, *child, depth + 1, Some(entry), levels, leaf_entries)?;
        }
        Ok(())
    }
}

/// Entries store 3-byte page numbers; anything larger cannot be written back.
fn check_row_id(row_id: RowId) -> Result<(), DatabaseError> {
    if row_id.page_number > MAX_ROW_PAGE_NUMBER {
        return Err(DatabaseError::InvalidPageNumber {
            page_number: row_id.page_number,
            page_count: MAX_ROW_PAGE_NUMBER,
        });
    }
    Ok(())
}

fn apply_child_update(page: &mut IndexPage, slot: usize, update: ChildUpdate) {
    match update.max {
        Some(max) => page.entries[slot] = max,
        None => {
            page.entries.remove(slot);
            page.children.remove(slot);
        }
    }
    if let Some((left_page, left_max)) = update.split {
        page.entries.insert(slot, left_max);
        page.children.insert(slot, left_page);
    }
}

fn count_distinct_keys(entries: &[Entry]) -> usize {
    entries
        .windows(2)
        .filter(|pair| pair[0].key != pair[1].key)
        .count()
        + usize::from(!entries.is_empty())
}
