use std::{
    cell::RefCell,
    collections::BTreeMap,
    io::SeekFrom,
    ops::RangeInclusive,
    rc::Rc,
};

use tracing::{debug, trace, warn};

use crate::{
    storage::{
        channel::ByteChannel,
        codec::{CodecHandler, DefaultCodecHandler},
        format::JetFormat,
        usage_map::UsageMap,
    },
    types::{HEADER_PAGE_NUMBER, PageNumber, error::DatabaseError},
};

/// A page channel shared by every structure of one open database.
pub type SharedPageChannel = Rc<RefCell<PageChannel>>;

/// Counts of page transfers against the backing store.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStats {
    pub pages_read: u64,
    pub pages_written: u64,
}

/// Reads and writes fixed-size pages by number.
///
/// Inside a `start_write`/`finish_write` region page images are parked in memory,
/// keyed by page number, and reach the backing store when the outermost region ends
/// or on `flush`. Reads always see the latest image.
pub struct PageChannel {
    channel: Option<Box<dyn ByteChannel>>,
    format: &'static JetFormat,
    codec: Box<dyn CodecHandler>,
    read_only: bool,
    auto_sync: bool,
    page_count: PageNumber,
    write_depth: usize,
    pending: BTreeMap<PageNumber, Vec<u8>>,
    global_map: Option<UsageMap>,
    stats: ChannelStats,
}

impl PageChannel {
    pub fn new(
        mut channel: Box<dyn ByteChannel>,
        format: &'static JetFormat,
        codec: Option<Box<dyn CodecHandler>>,
        read_only: bool,
        auto_sync: bool,
    ) -> Result<Self, DatabaseError> {
        let length = channel.len()?;
        let page_size = format.page_size as u64;
        let page_count = length.div_ceil(page_size) as PageNumber;
        Ok(Self {
            channel: Some(channel),
            format,
            codec: codec.unwrap_or_else(|| Box::new(DefaultCodecHandler)),
            read_only,
            auto_sync,
            page_count,
            write_depth: 0,
            pending: BTreeMap::new(),
            global_map: None,
            stats: ChannelStats::default(),
        })
    }

    pub fn into_shared(self) -> SharedPageChannel {
        Rc::new(RefCell::new(self))
    }

    pub fn format(&self) -> &'static JetFormat {
        self.format
    }

    pub fn page_size(&self) -> usize {
        self.format.page_size
    }

    pub fn page_count(&self) -> PageNumber {
        self.page_count
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn create_page_buffer(&self) -> Vec<u8> {
        vec![0u8; self.format.page_size]
    }

    fn page_offset(&self, page_number: PageNumber) -> u64 {
        page_number as u64 * self.format.page_size as u64
    }

    fn validate_page_number(&self, page_number: PageNumber) -> Result<(), DatabaseError> {
        if page_number >= self.page_count {
            return Err(DatabaseError::InvalidPageNumber {
                page_number,
                page_count: self.page_count,
            });
        }
        Ok(())
    }

    fn validate_page_buffer(&self, page: &[u8]) -> Result<(), DatabaseError> {
        if page.len() != self.format.page_size {
            return Err(DatabaseError::InvalidPageSize {
                expected: self.format.page_size,
                actual: page.len(),
            });
        }
        Ok(())
    }

    fn channel_mut(&mut self) -> Result<&mut Box<dyn ByteChannel>, DatabaseError> {
        self.channel.as_mut().ok_or(DatabaseError::Closed)
    }

    pub fn read_page(&mut self, page_number: PageNumber) -> Result<Vec<u8>, DatabaseError> {
        self.validate_page_number(page_number)?;
        if let Some(page) = self.pending.get(&page_number) {
            return Ok(page.clone());
        }

        let offset = self.page_offset(page_number);
        let mut raw = self.create_page_buffer();
        let channel = self.channel_mut()?;
        channel.seek(SeekFrom::Start(offset))?;
        channel.read_exact(&mut raw)?;
        self.stats.pages_read += 1;
        trace!(page_number, "page_channel.read_page");

        // the header page is never encoded
        if page_number == HEADER_PAGE_NUMBER {
            return Ok(raw);
        }
        if self.codec.can_decode_inline() {
            self.codec.decode_page_inline(&mut raw, page_number)?;
            Ok(raw)
        } else {
            let mut page = self.create_page_buffer();
            self.codec.decode_page(&raw, &mut page, page_number)?;
            Ok(page)
        }
    }

    pub fn write_page(&mut self, page: &[u8], page_number: PageNumber) -> Result<(), DatabaseError> {
        self.write_page_at(page, page_number, 0)
    }

    /// Writes a page of which only the bytes from `offset` on have changed.
    pub fn write_page_at(
        &mut self,
        page: &[u8],
        page_number: PageNumber,
        offset: usize,
    ) -> Result<(), DatabaseError> {
        if self.read_only {
            return Err(DatabaseError::ReadOnly);
        }
        self.validate_page_number(page_number)?;
        self.validate_page_buffer(page)?;

        if self.write_depth > 0 {
            self.pending.insert(page_number, page.to_vec());
            return Ok(());
        }
        self.write_through(page, page_number, offset)?;
        if self.auto_sync {
            self.channel_mut()?.sync()?;
        }
        Ok(())
    }

    fn write_through(
        &mut self,
        page: &[u8],
        page_number: PageNumber,
        offset: usize,
    ) -> Result<(), DatabaseError> {
        let page_offset = self.page_offset(page_number);
        let encoded = if page_number == HEADER_PAGE_NUMBER {
            std::borrow::Cow::Borrowed(page)
        } else {
            let partial = if self.codec.can_encode_partial_page() {
                offset
            } else {
                0
            };
            let encoded = self.codec.encode_page(page, page_number, partial)?;
            if encoded.len() != page.len() {
                return Err(DatabaseError::Codec {
                    page_number,
                    reason: format!("encoded page has {} bytes", encoded.len()),
                });
            }
            encoded
        };
        let start = if page_number == HEADER_PAGE_NUMBER || !self.codec.can_encode_partial_page()
        {
            0
        } else {
            offset.min(page.len())
        };

        let bytes = encoded[start..].to_vec();
        let channel = self.channel_mut()?;
        channel.seek(SeekFrom::Start(page_offset + start as u64))?;
        channel.write_all(&bytes)?;
        self.stats.pages_written += 1;
        trace!(page_number, offset = start, "page_channel.write_page");
        Ok(())
    }

    /// Appends a zeroed page to the end of the file.
    fn extend(&mut self) -> Result<PageNumber, DatabaseError> {
        if self.read_only {
            return Err(DatabaseError::ReadOnly);
        }
        let page_number = self.page_count;
        // past this no usage map can record the page
        if page_number >= self.format.max_page_count() {
            return Err(DatabaseError::InvalidPageNumber {
                page_number,
                page_count: self.format.max_page_count(),
            });
        }
        self.page_count += 1;
        let page = self.create_page_buffer();
        if let Err(error) = self.write_page(&page, page_number) {
            self.page_count = page_number;
            return Err(error);
        }
        Ok(page_number)
    }

    pub fn allocate_new_page(&mut self) -> Result<PageNumber, DatabaseError> {
        self.allocate_new_page_near(None)
    }

    /// Returns a page for a new owner. A free page from the global usage map is
    /// reused first, preferring one inside `preferred`; the file only grows when
    /// nothing is free.
    pub fn allocate_new_page_near(
        &mut self,
        preferred: Option<RangeInclusive<PageNumber>>,
    ) -> Result<PageNumber, DatabaseError> {
        if self.read_only {
            return Err(DatabaseError::ReadOnly);
        }
        let reusable = self.global_map.as_ref().and_then(|map| {
            preferred
                .clone()
                .and_then(|range| map.first_page_in(range))
                .or_else(|| map.first_page_number())
        });

        match reusable {
            Some(page_number) => {
                self.with_global_map(|map, channel| map.remove_page_number(channel, page_number))?;
                let page = self.create_page_buffer();
                self.write_page(&page, page_number)?;
                debug!(page_number, "page_channel.allocate.reused");
                Ok(page_number)
            }
            None => {
                let page_number = self.extend()?;
                debug!(page_number, "page_channel.allocate.extended");
                Ok(page_number)
            }
        }
    }

    /// Wipes a page and records it as free in the global usage map.
    pub fn deallocate_page(&mut self, page_number: PageNumber) -> Result<(), DatabaseError> {
        self.validate_page_number(page_number)?;
        if page_number <= crate::types::GLOBAL_USAGE_MAP_PAGE {
            return Err(DatabaseError::UsageMapInconsistent {
                page_number,
                reason: "reserved pages cannot be freed".to_string(),
            });
        }
        let page = self.create_page_buffer();
        self.write_page(&page, page_number)?;
        if self.global_map.is_some() {
            self.with_global_map(|map, channel| map.add_page_number(channel, page_number))?;
        }
        debug!(page_number, "page_channel.deallocate");
        Ok(())
    }

    pub fn set_global_map(&mut self, map: UsageMap) {
        self.global_map = Some(map);
    }

    pub fn global_map(&self) -> Option<&UsageMap> {
        self.global_map.as_ref()
    }

    /// Runs `f` against the global usage map. While it runs the map is detached, so
    /// any page it needs comes from the end of the file.
    fn with_global_map<T>(
        &mut self,
        f: impl FnOnce(&mut UsageMap, &mut PageChannel) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let mut map = self.global_map.take().ok_or_else(|| DatabaseError::UsageMapInconsistent {
            page_number: crate::types::GLOBAL_USAGE_MAP_PAGE,
            reason: "global usage map is not loaded".to_string(),
        })?;
        let result = f(&mut map, self);
        self.global_map = Some(map);
        result
    }

    pub fn start_write(&mut self) {
        self.write_depth += 1;
    }

    pub fn is_writing(&self) -> bool {
        self.write_depth > 0
    }

    /// Ends a write region; the outermost one flushes.
    pub fn finish_write(&mut self) -> Result<(), DatabaseError> {
        if self.write_depth == 0 {
            warn!("page_channel.finish_write without start_write");
            return Ok(());
        }
        self.write_depth -= 1;
        if self.write_depth == 0 {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes all parked pages in page order.
    pub fn flush(&mut self) -> Result<(), DatabaseError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let pending = std::mem::take(&mut self.pending);
        debug!(pages = pending.len(), "page_channel.flush");
        for (page_number, page) in &pending {
            self.write_through(page, *page_number, 0)?;
        }
        let auto_sync = self.auto_sync;
        let channel = self.channel_mut()?;
        if auto_sync {
            channel.sync()?;
        } else {
            channel.flush()?;
        }
        Ok(())
    }

    /// Flushes and hands the backing channel back to the caller. Any later page
    /// access fails with `Closed`.
    pub fn take_inner(&mut self) -> Result<Box<dyn ByteChannel>, DatabaseError> {
        self.write_depth = 0;
        self.flush()?;
        self.channel.take().ok_or(DatabaseError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_none()
    }

    pub fn close(&mut self) -> Result<(), DatabaseError> {
        self.write_depth = 0;
        self.flush()?;
        if let Some(mut channel) = self.channel.take() {
            channel.flush()?;
        }
        Ok(())
    }
}

impl Drop for PageChannel {
    fn drop(&mut self) {
        if self.channel.is_some() && !self.pending.is_empty() {
            if let Err(error) = self.flush() {
                warn!(%error, "page_channel.drop.flush_failed");
            }
        }
    }
}
