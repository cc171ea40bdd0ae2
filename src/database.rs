use std::{
    cell::RefCell,
    collections::HashMap,
    fs::OpenOptions,
    io::{Read, Seek, SeekFrom},
    path::{Path, PathBuf},
    rc::{Rc, Weak},
};

use tracing::{debug, info, warn};

use crate::{
    config::DatabaseOptions,
    cursor::table_scan::TableScanCursor,
    index::{Index, IndexDefinition, SharedIndexData, index_data::IndexData},
    storage::{
        SORT_ORDER_OFFSET,
        channel::ByteChannel,
        codec::CodecHandler,
        format::JetFormat,
        header::{DatabaseHeader, GENERAL_SORT_ORDER},
        page_channel::{PageChannel, SharedPageChannel},
        usage_map::{SharedUsageMap, UsageMap, UsageMapLocation},
    },
    types::{
        GLOBAL_USAGE_MAP_PAGE, GLOBAL_USAGE_MAP_ROW, INVALID_PAGE_NUMBER, MAX_ROW_PAGE_NUMBER,
        PageNumber,
        error::DatabaseError,
        page::{DataPage, MAX_ROWS_PER_PAGE, PageType},
        row_id::RowId,
    },
};

/// Bytes of page 0 needed to tell the format apart.
const HEADER_PROBE_LENGTH: usize = SORT_ORDER_OFFSET + 2;

/// An open database file: the page channel plus every usage map and index
/// materialised from it.
///
/// Index Data and usage maps are cached by weak reference, so they live exactly as
/// long as some `Index` or map handle uses them.
pub struct Database {
    path: Option<PathBuf>,
    channel: SharedPageChannel,
    header: DatabaseHeader,
    options: DatabaseOptions,
    map_holder_page: PageNumber,
    /// Live Index Data with the definition that created it.
    index_data: Vec<(IndexDefinition, Weak<RefCell<IndexData>>)>,
    usage_maps: HashMap<UsageMapLocation, Weak<RefCell<UsageMap>>>,
    definitions: HashMap<(PageNumber, usize), IndexDefinition>,
}

impl Database {
    pub fn create<P: AsRef<Path>>(path: P, options: DatabaseOptions) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        info!(path = %path.display(), "database.create");
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .truncate(true)
            .open(path)?;
        let mut database = Self::create_with(Box::new(file), options, None)?;
        database.path = Some(path.to_path_buf());
        Ok(database)
    }

    pub fn open<P: AsRef<Path>>(path: P, options: DatabaseOptions) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        info!(path = %path.display(), read_only = options.read_only, "database.open");
        let file = OpenOptions::new()
            .read(true)
            .write(!options.read_only)
            .open(path)?;
        let mut database = Self::open_with(Box::new(file), options, None)?;
        database.path = Some(path.to_path_buf());
        Ok(database)
    }

    pub fn create_in_memory(options: DatabaseOptions) -> Result<Self, DatabaseError> {
        Self::create_channel(Box::new(std::io::Cursor::new(Vec::new())), options)
    }

    /// Formats a caller-supplied channel. `close` hands it back.
    pub fn create_channel(
        channel: Box<dyn ByteChannel>,
        options: DatabaseOptions,
    ) -> Result<Self, DatabaseError> {
        Self::create_with(channel, options, None)
    }

    pub fn open_channel(
        channel: Box<dyn ByteChannel>,
        options: DatabaseOptions,
    ) -> Result<Self, DatabaseError> {
        Self::open_with(channel, options, None)
    }

    pub fn create_channel_with_codec(
        channel: Box<dyn ByteChannel>,
        options: DatabaseOptions,
        codec: Box<dyn CodecHandler>,
    ) -> Result<Self, DatabaseError> {
        Self::create_with(channel, options, Some(codec))
    }

    pub fn open_channel_with_codec(
        channel: Box<dyn ByteChannel>,
        options: DatabaseOptions,
        codec: Box<dyn CodecHandler>,
    ) -> Result<Self, DatabaseError> {
        Self::open_with(channel, options, Some(codec))
    }

    fn create_with(
        channel: Box<dyn ByteChannel>,
        options: DatabaseOptions,
        codec: Option<Box<dyn CodecHandler>>,
    ) -> Result<Self, DatabaseError> {
        if options.read_only {
            return Err(DatabaseError::ReadOnly);
        }
        let format = options.file_format.jet_format();
        let header = DatabaseHeader::new(options.file_format, options.sort_order);
        let mut page_channel = PageChannel::new(channel, format, codec, false, options.auto_sync)?;
        if page_channel.page_count() != 0 {
            return Err(DatabaseError::InvalidHeader {
                reason: format!(
                    "cannot create a database over {} existing pages",
                    page_channel.page_count()
                ),
            });
        }

        page_channel.start_write();
        let header_page = page_channel.allocate_new_page()?;
        page_channel.write_page(&header.to_bytes(), header_page)?;
        let map_page = page_channel.allocate_new_page()?;
        let mut page = DataPage::new(map_page, INVALID_PAGE_NUMBER);
        page.add_row(&UsageMap::empty_row(format), format)?;
        page_channel.write_page(&page.to_bytes(format)?, map_page)?;
        page_channel.finish_write()?;

        debug!(format = ?options.file_format, page_size = format.page_size, "database.format");
        Self::attach(page_channel, header, options)
    }

    fn open_with(
        mut channel: Box<dyn ByteChannel>,
        options: DatabaseOptions,
        codec: Option<Box<dyn CodecHandler>>,
    ) -> Result<Self, DatabaseError> {
        let mut probe = vec![0u8; HEADER_PROBE_LENGTH];
        channel.seek(SeekFrom::Start(0))?;
        channel.read_exact(&mut probe).map_err(|error| match error.kind() {
            std::io::ErrorKind::UnexpectedEof => DatabaseError::InvalidHeader {
                reason: "file is shorter than a database header".to_string(),
            },
            _ => DatabaseError::Io(error),
        })?;
        let header = DatabaseHeader::from_bytes(&probe)?;
        if header.sort_order != GENERAL_SORT_ORDER {
            warn!(sort_order = header.sort_order, "database.open.unknown_sort_order");
        }

        let page_channel = PageChannel::new(
            channel,
            header.format(),
            codec,
            options.read_only,
            options.auto_sync,
        )?;
        if page_channel.page_count() <= GLOBAL_USAGE_MAP_PAGE {
            return Err(DatabaseError::InvalidHeader {
                reason: "missing the global usage map page".to_string(),
            });
        }
        Self::attach(page_channel, header, options)
    }

    fn attach(
        mut page_channel: PageChannel,
        header: DatabaseHeader,
        options: DatabaseOptions,
    ) -> Result<Self, DatabaseError> {
        let global = UsageMap::read(
            &mut page_channel,
            UsageMapLocation::new(GLOBAL_USAGE_MAP_PAGE, GLOBAL_USAGE_MAP_ROW),
            true,
        )?;
        debug!(
            pages = page_channel.page_count(),
            free_pages = global.len(),
            "database.attach"
        );
        page_channel.set_global_map(global);

        Ok(Self {
            path: None,
            channel: page_channel.into_shared(),
            header,
            options,
            map_holder_page: GLOBAL_USAGE_MAP_PAGE,
            index_data: Vec::new(),
            usage_maps: HashMap::new(),
            definitions: HashMap::new(),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn header(&self) -> &DatabaseHeader {
        &self.header
    }

    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    pub fn format(&self) -> &'static JetFormat {
        self.header.format()
    }

    pub fn channel(&self) -> SharedPageChannel {
        Rc::clone(&self.channel)
    }

    pub fn page_count(&self) -> PageNumber {
        self.channel.borrow().page_count()
    }

    /// Pages recorded as free in the global usage map.
    pub fn free_pages(&self) -> Vec<PageNumber> {
        self.channel
            .borrow()
            .global_map()
            .map(|map| map.page_numbers().collect())
            .unwrap_or_default()
    }

    pub fn start_write(&self) {
        self.channel.borrow_mut().start_write();
    }

    pub fn finish_write(&self) -> Result<(), DatabaseError> {
        self.channel.borrow_mut().finish_write()
    }

    pub fn flush(&self) -> Result<(), DatabaseError> {
        self.channel.borrow_mut().flush()
    }

    // ---- usage maps ----

    /// Adds an empty usage-map row for `owner` and returns where it lives.
    pub fn create_usage_map(&mut self, owner: PageNumber) -> Result<UsageMapLocation, DatabaseError> {
        let map = UsageMap::create(&mut self.channel.borrow_mut(), self.map_holder_page, owner)?;
        self.map_holder_page = map.location().page_number;
        Ok(map.location())
    }

    /// The usage map at `location`, shared with every other handle to it.
    pub fn usage_map(&mut self, location: UsageMapLocation) -> Result<SharedUsageMap, DatabaseError> {
        if let Some(map) = self.usage_maps.get(&location).and_then(Weak::upgrade) {
            return Ok(map);
        }
        let map = UsageMap::read(&mut self.channel.borrow_mut(), location, false)?;
        let map = Rc::new(RefCell::new(map));
        self.usage_maps.retain(|_, map| map.strong_count() > 0);
        self.usage_maps.insert(location, Rc::downgrade(&map));
        Ok(map)
    }

    // ---- indexes ----

    fn find_shared_data(&mut self, definition: &IndexDefinition) -> Option<SharedIndexData> {
        self.index_data.retain(|(_, data)| data.strong_count() > 0);
        self.index_data.iter().find_map(|(owner, data)| {
            let data = data.upgrade()?;
            let same_root = definition
                .root_page
                .is_some_and(|root_page| data.borrow().root_page() == root_page);
            (same_root || owner.can_share_data_with(definition)).then_some(data)
        })
    }

    fn share(&mut self, mut definition: IndexDefinition, data: SharedIndexData) -> Index {
        {
            let mut shared = data.borrow_mut();
            shared.merge_constraints(definition.unique, definition.required);
            definition.root_page = Some(shared.root_page());
            definition.usage_map = Some(shared.usage_map().location());
            debug!(
                index = %definition.name,
                shared_with = %shared.name(),
                "database.share_index_data"
            );
        }
        self.definitions
            .insert((definition.table_page, definition.index_number), definition.clone());
        Index::new(definition, data)
    }

    fn register(&mut self, definition: IndexDefinition, data: IndexData) -> Index {
        let data = Rc::new(RefCell::new(data));
        self.index_data.push((definition.clone(), Rc::downgrade(&data)));
        self.definitions
            .insert((definition.table_page, definition.index_number), definition.clone());
        Index::new(definition, data)
    }

    /// Creates a new index, or a view on an existing Index Data over the same columns.
    pub fn create_index(&mut self, mut definition: IndexDefinition) -> Result<Index, DatabaseError> {
        definition.root_page = None;
        definition.usage_map = None;
        if let Some(data) = self.find_shared_data(&definition) {
            return Ok(self.share(definition, data));
        }

        let usage_map = UsageMap::create(
            &mut self.channel.borrow_mut(),
            self.map_holder_page,
            definition.table_page,
        )?;
        let location = usage_map.location();
        self.map_holder_page = location.page_number;
        let data = IndexData::create(Rc::clone(&self.channel), &definition, usage_map)?;
        definition.root_page = Some(data.root_page());
        definition.usage_map = Some(location);
        info!(
            index = %definition.name,
            table = %definition.table_name,
            root_page = data.root_page(),
            "database.create_index"
        );
        Ok(self.register(definition, data))
    }

    /// Opens an index created earlier; `definition` must carry its root page and
    /// usage-map location.
    pub fn open_index(&mut self, definition: IndexDefinition) -> Result<Index, DatabaseError> {
        if let Some(data) = self.find_shared_data(&definition) {
            return Ok(self.share(definition, data));
        }

        let (Some(root_page), Some(location)) = (definition.root_page, definition.usage_map) else {
            return Err(DatabaseError::InvalidPageNumber {
                page_number: definition.root_page.unwrap_or(INVALID_PAGE_NUMBER),
                page_count: self.page_count(),
            });
        };
        let usage_map = UsageMap::read(&mut self.channel.borrow_mut(), location, false)?;
        let data = IndexData::open(Rc::clone(&self.channel), &definition, root_page, usage_map);
        debug!(index = %definition.name, root_page, "database.open_index");
        Ok(self.register(definition, data))
    }

    /// The index on the other side of a foreign key, if this handle knows its definition.
    pub fn referenced_index(&mut self, index: &Index) -> Result<Option<Index>, DatabaseError> {
        let Some(reference) = index.reference() else {
            return Ok(None);
        };
        let key = (reference.other_table_page, reference.other_index_number);
        match self.definitions.get(&key).cloned() {
            Some(definition) => self.open_index(definition).map(Some),
            None => Ok(None),
        }
    }

    // ---- raw rows ----

    /// Stores a row on the last data page of `table_map`, or on a new page when it
    /// does not fit.
    pub fn add_raw_row(
        &mut self,
        table_map: &SharedUsageMap,
        owner: PageNumber,
        data: &[u8],
    ) -> Result<RowId, DatabaseError> {
        let mut channel = self.channel.borrow_mut();
        let format = channel.format();
        let mut map = table_map.borrow_mut();

        if let Some(last) = map.last_page_number() {
            let bytes = channel.read_page(last)?;
            if bytes[0] == PageType::Data.as_u8() {
                let mut page = DataPage::from_bytes(&bytes, last, format)?;
                if page.free_space(format) >= data.len() + 2 && page.row_count() < MAX_ROWS_PER_PAGE {
                    let row_number = page.add_row(data, format)?;
                    channel.write_page(&page.to_bytes(format)?, last)?;
                    return Ok(RowId::new(last, row_number));
                }
            }
        }

        let page_number = map.allocate_page(&mut channel)?;
        if page_number > MAX_ROW_PAGE_NUMBER {
            map.free_page(&mut channel, page_number)?;
            return Err(DatabaseError::InvalidPageNumber {
                page_number,
                page_count: MAX_ROW_PAGE_NUMBER,
            });
        }
        let mut page = DataPage::new(page_number, owner);
        let row_number = page.add_row(data, format)?;
        channel.write_page(&page.to_bytes(format)?, page_number)?;
        Ok(RowId::new(page_number, row_number))
    }

    pub fn read_raw_row(&self, row_id: RowId) -> Result<Vec<u8>, DatabaseError> {
        let mut channel = self.channel.borrow_mut();
        let bytes = channel.read_page(row_id.page_number)?;
        let page = DataPage::from_bytes(&bytes, row_id.page_number, channel.format())?;
        Ok(page.row(row_id.row_number)?.to_vec())
    }

    /// Marks a row deleted; false if it already was.
    pub fn delete_raw_row(&mut self, row_id: RowId) -> Result<bool, DatabaseError> {
        let mut channel = self.channel.borrow_mut();
        let format = channel.format();
        let bytes = channel.read_page(row_id.page_number)?;
        let mut page = DataPage::from_bytes(&bytes, row_id.page_number, format)?;
        if !page.delete_row(row_id.row_number)? {
            return Ok(false);
        }
        channel.write_page(&page.to_bytes(format)?, row_id.page_number)?;
        Ok(true)
    }

    pub fn table_scan(&self, table_map: &SharedUsageMap) -> TableScanCursor {
        TableScanCursor::new(Rc::clone(&self.channel), Rc::clone(table_map))
    }

    /// Flushes and closes. A channel supplied by the caller is handed back; a file
    /// opened by path is closed.
    pub fn close(self) -> Result<Option<Box<dyn ByteChannel>>, DatabaseError> {
        let mut channel = self.channel.borrow_mut();
        info!(path = ?self.path, "database.close");
        if self.path.is_some() {
            channel.close()?;
            Ok(None)
        } else {
            channel.take_inner().map(Some)
        }
    }
}
