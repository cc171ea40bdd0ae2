use std::{
    borrow::Cow,
    collections::HashMap,
    fs,
    io::{self, Cursor, Read, Seek, SeekFrom, Write},
};

use jetdb::{
    Cursor as _, Database, DatabaseOptions, FileFormat, RowId, Value,
    storage::{
        channel::{ByteChannel, read_all},
        codec::CodecHandler,
        header::GENERAL_SORT_ORDER,
    },
    types::{PageNumber, error::DatabaseError},
    utils::mock::{SAMPLE_TABLE_PAGE, TempDatabase, memory_database, text_index_definition},
};

struct XorCodec;

impl CodecHandler for XorCodec {
    fn can_encode_partial_page(&self) -> bool {
        false
    }

    fn can_decode_inline(&self) -> bool {
        false
    }

    fn decode_page(
        &self,
        raw: &[u8],
        page: &mut [u8],
        page_number: PageNumber,
    ) -> Result<(), DatabaseError> {
        for (out, byte) in page.iter_mut().zip(raw) {
            *out = byte ^ (page_number as u8).wrapping_add(0x5A);
        }
        Ok(())
    }

    fn encode_page<'a>(
        &self,
        page: &'a [u8],
        page_number: PageNumber,
        _partial_offset: usize,
    ) -> Result<Cow<'a, [u8]>, DatabaseError> {
        let mask = (page_number as u8).wrapping_add(0x5A);
        Ok(Cow::Owned(page.iter().map(|byte| byte ^ mask).collect()))
    }
}

const BLOCK_SIZE: u64 = 4096;

/// A channel that claims `len` bytes but only stores the blocks written to it.
struct SparseChannel {
    blocks: HashMap<u64, Vec<u8>>,
    len: u64,
    position: u64,
}

impl SparseChannel {
    fn with_length(bytes: &[u8], len: u64) -> Self {
        let mut channel = Self {
            blocks: HashMap::new(),
            len: 0,
            position: 0,
        };
        channel.write_all(bytes).unwrap();
        channel.len = channel.len.max(len);
        channel.position = 0;
        channel
    }
}

impl Read for SparseChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.len || buf.is_empty() {
            return Ok(0);
        }
        let offset = (self.position % BLOCK_SIZE) as usize;
        let count = buf
            .len()
            .min(BLOCK_SIZE as usize - offset)
            .min((self.len - self.position) as usize);
        match self.blocks.get(&(self.position / BLOCK_SIZE)) {
            Some(block) => buf[..count].copy_from_slice(&block[offset..offset + count]),
            None => buf[..count].fill(0),
        }
        self.position += count as u64;
        Ok(count)
    }
}

impl Write for SparseChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let offset = (self.position % BLOCK_SIZE) as usize;
        let count = buf.len().min(BLOCK_SIZE as usize - offset);
        let block = self
            .blocks
            .entry(self.position / BLOCK_SIZE)
            .or_insert_with(|| vec![0u8; BLOCK_SIZE as usize]);
        block[offset..offset + count].copy_from_slice(&buf[..count]);
        self.position += count as u64;
        self.len = self.len.max(self.position);
        Ok(count)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for SparseChannel {
    fn seek(&mut self, position: SeekFrom) -> io::Result<u64> {
        self.position = match position {
            SeekFrom::Start(offset) => offset,
            SeekFrom::End(delta) => (self.len as i64 + delta) as u64,
            SeekFrom::Current(delta) => (self.position as i64 + delta) as u64,
        };
        Ok(self.position)
    }
}

impl ByteChannel for SparseChannel {
    fn len(&mut self) -> io::Result<u64> {
        Ok(self.len)
    }
}

/// A fresh database whose file already reaches the last page a usage map can track.
fn full_database() -> Database {
    let database = memory_database().unwrap();
    let mut channel = database.close().unwrap().unwrap();
    let bytes = read_all(&mut *channel).unwrap();
    let limit = FileFormat::Jet4.jet_format().max_page_count() as u64;
    let sparse = SparseChannel::with_length(&bytes, limit * BLOCK_SIZE);
    Database::open_channel(Box::new(sparse), DatabaseOptions::default()).unwrap()
}

#[test]
fn test_create_writes_header_and_global_map() {
    let mut temp = TempDatabase::new();
    let path = temp.path.clone();
    let database = temp.create_database(DatabaseOptions::default()).unwrap();

    assert_eq!(database.header().file_format, FileFormat::Jet4);
    assert_eq!(database.header().sort_order, GENERAL_SORT_ORDER);
    assert_eq!(database.format().page_size, 4096);
    assert_eq!(database.page_count(), 2);
    assert!(database.free_pages().is_empty());
    assert_eq!(database.path(), Some(path.as_path()));
}

#[test]
fn test_reopen_detects_format() {
    let mut temp = TempDatabase::with_prefix("jetdb_jet3");
    temp.create_database(DatabaseOptions::default().file_format(FileFormat::Jet3))
        .unwrap();

    // the requested format is ignored on open
    let database = temp.reopen_database(DatabaseOptions::default()).unwrap();
    assert_eq!(database.header().file_format, FileFormat::Jet3);
    assert_eq!(database.format().page_size, 2048);
    assert_eq!(fs::metadata(&temp.path).unwrap().len(), 2 * 2048);
}

#[test]
fn test_open_garbage_file_is_invalid_header() {
    let temp = TempDatabase::new();
    fs::write(&temp.path, vec![0x42u8; 4096]).unwrap();
    assert!(matches!(
        Database::open(&temp.path, DatabaseOptions::default()),
        Err(DatabaseError::InvalidHeader { .. })
    ));

    fs::write(&temp.path, [0u8; 10]).unwrap();
    assert!(matches!(
        Database::open(&temp.path, DatabaseOptions::default()),
        Err(DatabaseError::InvalidHeader { .. })
    ));
}

#[test]
fn test_open_missing_file_is_io_error() {
    let temp = TempDatabase::new();
    assert!(matches!(
        Database::open(&temp.path, DatabaseOptions::default()),
        Err(DatabaseError::Io(_))
    ));
}

#[test]
fn test_read_only_database() {
    assert!(matches!(
        Database::create_in_memory(DatabaseOptions::default().read_only(true)),
        Err(DatabaseError::ReadOnly)
    ));

    let mut temp = TempDatabase::new();
    temp.create_database(DatabaseOptions::default()).unwrap();
    let database = temp
        .reopen_database(DatabaseOptions::default().read_only(true))
        .unwrap();
    assert!(matches!(
        database.create_index(text_index_definition("by_name")),
        Err(DatabaseError::ReadOnly)
    ));
    assert_eq!(database.page_count(), 2);
}

#[test]
fn test_create_over_existing_data_fails() {
    let channel = Cursor::new(vec![0u8; 4096 * 3]);
    assert!(matches!(
        Database::create_channel(Box::new(channel), DatabaseOptions::default()),
        Err(DatabaseError::InvalidHeader { .. })
    ));
}

#[test]
fn test_close_hands_back_supplied_channel() {
    let database = memory_database().unwrap();
    let channel = database.close().unwrap();
    assert!(channel.is_some());

    let mut temp = TempDatabase::new();
    temp.create_database(DatabaseOptions::default()).unwrap();
    let database = temp.database.take().unwrap();
    assert!(database.close().unwrap().is_none());
}

#[test]
fn test_memory_database_reopens_from_channel() {
    let mut database = memory_database().unwrap();
    let index = database.create_index(text_index_definition("by_name")).unwrap();
    index.add_row(&[Value::text("ann")], RowId::new(9, 0)).unwrap();
    let definition = index.definition().clone();
    drop(index);

    let channel = database.close().unwrap().unwrap();
    let mut database = Database::open_channel(channel, DatabaseOptions::default()).unwrap();
    let index = database.open_index(definition).unwrap();
    assert_eq!(index.entry_count().unwrap(), 1);
}

#[test]
fn test_index_survives_reopen() {
    let mut temp = TempDatabase::new();
    let definition = {
        let database = temp.create_database(DatabaseOptions::default()).unwrap();
        let index = database.create_index(text_index_definition("by_name")).unwrap();
        for i in 0..500u32 {
            index
                .add_row(&[Value::text(format!("name{:04}", i))], RowId::new(100 + i / 100, (i % 100) as u8))
                .unwrap();
        }
        index.definition().clone()
    };
    assert!(definition.root_page.is_some());
    assert!(definition.usage_map.is_some());

    let database = temp.reopen_database(DatabaseOptions::default()).unwrap();
    let index = database.open_index(definition).unwrap();
    assert_eq!(index.entry_count().unwrap(), 500);
    let mut cursor = index.cursor();
    assert!(cursor.find_first_row_by_entry(&[Value::text("NAME0250")]).unwrap());
    assert_eq!(cursor.current_row_id(), Some(RowId::new(102, 50)));
}

#[test]
fn test_free_pages_survive_reopen() {
    let mut temp = TempDatabase::new();
    let free_before = {
        let database = temp.create_database(DatabaseOptions::default()).unwrap();
        let index = database.create_index(text_index_definition("by_name")).unwrap();
        let rows: Vec<(Vec<Value>, RowId)> = (0..600u32)
            .map(|i| {
                (
                    vec![Value::text(format!("{:0>60}", i))],
                    RowId::new(200 + i / 200, (i % 200) as u8),
                )
            })
            .collect();
        for (row, row_id) in &rows {
            index.add_row(row, *row_id).unwrap();
        }
        for (row, row_id) in &rows {
            index.delete_row(row, *row_id).unwrap();
        }
        database.free_pages()
    };
    assert!(!free_before.is_empty());

    let database = temp.reopen_database(DatabaseOptions::default()).unwrap();
    assert_eq!(database.free_pages(), free_before);
}

#[test]
fn test_usage_maps_are_shared_handles() {
    let mut database = memory_database().unwrap();
    let location = database.create_usage_map(SAMPLE_TABLE_PAGE).unwrap();
    let first = database.usage_map(location).unwrap();
    let second = database.usage_map(location).unwrap();
    assert!(std::rc::Rc::ptr_eq(&first, &second));

    let row_id = database.add_raw_row(&first, SAMPLE_TABLE_PAGE, b"row").unwrap();
    assert!(second.borrow().contains(row_id.page_number));
}

#[test]
fn test_many_usage_maps_spill_to_new_holder_page() {
    let mut database = memory_database().unwrap();
    let mut locations = Vec::new();
    for _ in 0..100 {
        locations.push(database.create_usage_map(SAMPLE_TABLE_PAGE).unwrap());
    }
    assert!(locations.iter().any(|location| location.page_number != 1));
    let last = *locations.last().unwrap();
    assert!(database.usage_map(last).unwrap().borrow().is_empty());
}

#[test]
fn test_codec_database_round_trip() {
    let mut database = Database::create_channel_with_codec(
        Box::new(Cursor::new(Vec::new())),
        DatabaseOptions::default(),
        Box::new(XorCodec),
    )
    .unwrap();
    let index = database.create_index(text_index_definition("by_name")).unwrap();
    index.add_row(&[Value::text("secret")], RowId::new(7, 1)).unwrap();
    let definition = index.definition().clone();
    drop(index);

    let channel = database.close().unwrap().unwrap();
    let mut database =
        Database::open_channel_with_codec(channel, DatabaseOptions::default(), Box::new(XorCodec))
            .unwrap();
    let index = database.open_index(definition).unwrap();
    let mut cursor = index.cursor();
    assert!(cursor.find_first_row_by_entry(&[Value::text("secret")]).unwrap());
}

#[test]
fn test_explicit_write_region_defers_flush() {
    let mut temp = TempDatabase::new();
    let path = temp.path.clone();
    let database = temp.create_database(DatabaseOptions::default()).unwrap();
    database.start_write();
    let index = database.create_index(text_index_definition("by_name")).unwrap();
    index.add_row(&[Value::text("ann")], RowId::new(9, 0)).unwrap();
    assert_eq!(fs::metadata(&path).unwrap().len(), 2 * 4096);
    database.finish_write().unwrap();
    database.flush().unwrap();
    assert!(fs::metadata(&path).unwrap().len() > 2 * 4096);
}

#[test]
fn test_file_stops_growing_at_trackable_limit() {
    let database = full_database();
    let limit = database.format().max_page_count();
    assert_eq!(database.page_count(), limit);

    assert!(matches!(
        database.channel().borrow_mut().allocate_new_page(),
        Err(DatabaseError::InvalidPageNumber { page_number, .. }) if page_number == limit
    ));
    assert_eq!(database.page_count(), limit);
    assert!(database.free_pages().is_empty());
}

#[test]
fn test_refused_row_page_is_not_lost() {
    let mut database = full_database();
    let location = database.create_usage_map(SAMPLE_TABLE_PAGE).unwrap();
    let map = database.usage_map(location).unwrap();
    let page_count = database.page_count();

    assert!(database.add_raw_row(&map, SAMPLE_TABLE_PAGE, b"row").is_err());
    assert!(map.borrow().is_empty());
    assert_eq!(database.page_count(), page_count);
    assert!(database.free_pages().is_empty());
}
