use std::{
    cell::RefCell,
    collections::BTreeSet,
    ops::RangeInclusive,
    rc::Rc,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    storage::{format::JetFormat, page_channel::PageChannel},
    types::{
        PageNumber,
        error::DatabaseError,
        page::{DataPage, PAGE_MARKER, PageType, read_u32_le},
    },
};

pub type SharedUsageMap = Rc<RefCell<UsageMap>>;

const MAP_TYPE_INLINE: u8 = 0x00;
const MAP_TYPE_REFERENCE: u8 = 0x01;

/// Where a usage-map row lives: a row on a data page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageMapLocation {
    pub page_number: PageNumber,
    pub row_number: u8,
}

impl UsageMapLocation {
    pub fn new(page_number: PageNumber, row_number: u8) -> Self {
        Self {
            page_number,
            row_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MapKind {
    /// A bitmap inside the row covering `capacity` pages from `start_page`.
    Inline { start_page: PageNumber },
    /// A list of usage-map pages, slot `i` covering pages `[i * span, (i + 1) * span)`.
    Reference { map_pages: Vec<PageNumber> },
}

/// The set of pages belonging to one owner. The global map holds the free pages.
///
/// The in-memory set is authoritative; every change is written straight through to
/// the map row (inline form) or the affected usage-map page (reference form).
#[derive(Debug, Clone)]
pub struct UsageMap {
    location: UsageMapLocation,
    is_global: bool,
    kind: MapKind,
    pages: BTreeSet<PageNumber>,
}

/*
 * Usage Map Row (69 bytes)
 * ┌────────────────────────────────────────────────────────────────┐
 * │ inline:    0x00 | start_page u32 LE | bitmap (64 bytes)        │
 * │ reference: 0x01 | 17 x usage-map page number u32 LE            │
 * └────────────────────────────────────────────────────────────────┘
 * Usage-map page: 0x05 0x01 0x00 0x00 | bitmap to the page end
 */

impl UsageMap {
    /// Bytes of a fresh, empty inline map row.
    pub fn empty_row(format: &JetFormat) -> Vec<u8> {
        let mut row = vec![0u8; format.usage_map_row_length];
        row[0] = MAP_TYPE_INLINE;
        row
    }

    /// Appends an empty map row to the data page `holder`, or to a freshly allocated
    /// page owned by `owner` when `holder` is full.
    pub fn create(
        channel: &mut PageChannel,
        holder: PageNumber,
        owner: PageNumber,
    ) -> Result<Self, DatabaseError> {
        let format = channel.format();
        let row = Self::empty_row(format);
        let bytes = channel.read_page(holder)?;
        let mut page = DataPage::from_bytes(&bytes, holder, format)?;
        let location = match page.add_row(&row, format) {
            Ok(row_number) => {
                channel.write_page(&page.to_bytes(format)?, holder)?;
                UsageMapLocation::new(holder, row_number)
            }
            Err(DatabaseError::PageFull { .. }) => {
                let new_holder = channel.allocate_new_page()?;
                let mut page = DataPage::new(new_holder, owner);
                let row_number = page.add_row(&row, format)?;
                channel.write_page(&page.to_bytes(format)?, new_holder)?;
                UsageMapLocation::new(new_holder, row_number)
            }
            Err(error) => return Err(error),
        };
        debug!(
            owner,
            page = location.page_number,
            row = location.row_number,
            "usage_map.create"
        );
        Ok(Self {
            location,
            is_global: false,
            kind: MapKind::Inline { start_page: 0 },
            pages: BTreeSet::new(),
        })
    }

    pub fn read(
        channel: &mut PageChannel,
        location: UsageMapLocation,
        is_global: bool,
    ) -> Result<Self, DatabaseError> {
        let format = channel.format();
        let bytes = channel.read_page(location.page_number)?;
        let page = DataPage::from_bytes(&bytes, location.page_number, format)?;
        let row = page.row(location.row_number)?;
        if row.len() < format.usage_map_row_length {
            return Err(DatabaseError::corrupted(
                location.page_number,
                format!("usage map row {} is {} bytes", location.row_number, row.len()),
            ));
        }

        let mut pages = BTreeSet::new();
        let kind = match row[0] {
            MAP_TYPE_INLINE => {
                let start_page = read_u32_le(row, 1);
                collect_bits(
                    &row[format.offset_usage_map_start..format.usage_map_row_length],
                    start_page,
                    &mut pages,
                );
                MapKind::Inline { start_page }
            }
            MAP_TYPE_REFERENCE => {
                let span = format.reference_map_page_span();
                let mut map_pages = Vec::with_capacity(format.max_reference_map_pages());
                for slot in 0..format.max_reference_map_pages() {
                    let map_page = read_u32_le(row, 1 + slot * 4);
                    map_pages.push(map_page);
                    if map_page == 0 {
                        continue;
                    }
                    let buffer = channel.read_page(map_page)?;
                    if buffer[0] != PageType::UsageMap.as_u8() {
                        return Err(DatabaseError::UnexpectedPageType {
                            page_number: map_page,
                            expected: PageType::UsageMap.name(),
                            actual: buffer[0],
                        });
                    }
                    collect_bits(
                        &buffer[format.offset_usage_map_page_data..],
                        slot as PageNumber * span,
                        &mut pages,
                    );
                }
                MapKind::Reference { map_pages }
            }
            other => {
                return Err(DatabaseError::corrupted(
                    location.page_number,
                    format!("unknown usage map type {:#04x}", other),
                ));
            }
        };

        debug!(
            page = location.page_number,
            row = location.row_number,
            is_global,
            pages = pages.len(),
            "usage_map.read"
        );
        Ok(Self {
            location,
            is_global,
            kind,
            pages,
        })
    }

    pub fn location(&self) -> UsageMapLocation {
        self.location
    }

    pub fn is_global(&self) -> bool {
        self.is_global
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.kind, MapKind::Inline { .. })
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn first_page_number(&self) -> Option<PageNumber> {
        self.pages.first().copied()
    }

    pub fn last_page_number(&self) -> Option<PageNumber> {
        self.pages.last().copied()
    }

    pub fn first_page_in(&self, range: RangeInclusive<PageNumber>) -> Option<PageNumber> {
        self.pages.range(range).next().copied()
    }

    pub fn contains(&self, page_number: PageNumber) -> bool {
        self.pages.contains(&page_number)
    }

    /// Pages in ascending order.
    pub fn page_numbers(&self) -> impl DoubleEndedIterator<Item = PageNumber> + '_ {
        self.pages.iter().copied()
    }

    /// The page after `page_number`, for scans that re-borrow the map between steps.
    pub fn next_page_after(&self, page_number: Option<PageNumber>) -> Option<PageNumber> {
        match page_number {
            None => self.first_page_number(),
            Some(page_number) => self
                .pages
                .range(page_number.saturating_add(1)..)
                .next()
                .copied(),
        }
    }

    pub fn previous_page_before(&self, page_number: Option<PageNumber>) -> Option<PageNumber> {
        match page_number {
            None => self.last_page_number(),
            Some(page_number) => self.pages.range(..page_number).next_back().copied(),
        }
    }

    pub fn add_page_number(
        &mut self,
        channel: &mut PageChannel,
        page_number: PageNumber,
    ) -> Result<(), DatabaseError> {
        if !self.pages.insert(page_number) {
            return Err(DatabaseError::UsageMapInconsistent {
                page_number,
                reason: format!(
                    "already set in usage map at {}:{}",
                    self.location.page_number, self.location.row_number
                ),
            });
        }
        let result = self.persist_change(channel, page_number, true);
        if result.is_err() {
            self.pages.remove(&page_number);
        }
        result
    }

    pub fn remove_page_number(
        &mut self,
        channel: &mut PageChannel,
        page_number: PageNumber,
    ) -> Result<(), DatabaseError> {
        if !self.pages.remove(&page_number) {
            return Err(DatabaseError::UsageMapInconsistent {
                page_number,
                reason: format!(
                    "not set in usage map at {}:{}",
                    self.location.page_number, self.location.row_number
                ),
            });
        }
        let result = self.persist_change(channel, page_number, false);
        if result.is_err() {
            self.pages.insert(page_number);
        }
        result
    }

    /// Takes a page from the page channel, preferring one inside this map's range,
    /// and records it here.
    pub fn allocate_page(&mut self, channel: &mut PageChannel) -> Result<PageNumber, DatabaseError> {
        let preferred = match (self.first_page_number(), self.last_page_number()) {
            (Some(first), Some(last)) => Some(first..=last),
            _ => None,
        };
        let page_number = channel.allocate_new_page_near(preferred)?;
        if let Err(error) = self.add_page_number(channel, page_number) {
            channel.deallocate_page(page_number)?;
            return Err(error);
        }
        Ok(page_number)
    }

    /// Drops a page from this map and hands it back to the global free map.
    pub fn free_page(
        &mut self,
        channel: &mut PageChannel,
        page_number: PageNumber,
    ) -> Result<(), DatabaseError> {
        self.remove_page_number(channel, page_number)?;
        channel.deallocate_page(page_number)
    }

    fn persist_change(
        &mut self,
        channel: &mut PageChannel,
        page_number: PageNumber,
        set: bool,
    ) -> Result<(), DatabaseError> {
        let format = channel.format();
        match &self.kind {
            MapKind::Inline { start_page } => {
                let capacity = format.inline_map_page_capacity();
                let start_page = *start_page;
                if self.fits_inline(start_page, capacity) {
                    return self.write_row(channel);
                }
                // try sliding the window before giving up on the inline form
                if let Some(first) = self.first_page_number() {
                    if self.fits_inline(first, capacity) {
                        debug!(
                            page = self.location.page_number,
                            from = start_page,
                            to = first,
                            "usage_map.move_window"
                        );
                        self.kind = MapKind::Inline { start_page: first };
                        return self.write_row(channel);
                    }
                }
                self.promote_to_reference(channel)
            }
            MapKind::Reference { map_pages } => {
                let span = format.reference_map_page_span();
                let slot = (page_number / span) as usize;
                if slot >= map_pages.len() {
                    return Err(DatabaseError::UsageMapInconsistent {
                        page_number,
                        reason: "beyond the range of a reference usage map".to_string(),
                    });
                }
                let map_page = map_pages[slot];
                if map_page == 0 {
                    // only reachable when setting: removal implies the bit existed
                    let map_page = self.create_map_page(channel, slot)?;
                    if let MapKind::Reference { map_pages } = &mut self.kind {
                        map_pages[slot] = map_page;
                    }
                    return self.write_row(channel);
                }

                let mut buffer = channel.read_page(map_page)?;
                let bit = (page_number % span) as usize;
                let byte = format.offset_usage_map_page_data + bit / 8;
                if set {
                    buffer[byte] |= 1 << (bit % 8);
                } else {
                    buffer[byte] &= !(1 << (bit % 8));
                }
                channel.write_page_at(&buffer, map_page, byte)
            }
        }
    }

    fn fits_inline(&self, start_page: PageNumber, capacity: u32) -> bool {
        match (self.first_page_number(), self.last_page_number()) {
            (Some(first), Some(last)) => first >= start_page && last - start_page < capacity,
            _ => true,
        }
    }

    /// Builds one usage-map page holding the bits of `slot` and returns its number.
    fn create_map_page(
        &self,
        channel: &mut PageChannel,
        slot: usize,
    ) -> Result<PageNumber, DatabaseError> {
        let format = channel.format();
        let span = format.reference_map_page_span();
        let map_page = channel.allocate_new_page()?;
        let mut buffer = channel.create_page_buffer();
        buffer[0] = PageType::UsageMap.as_u8();
        buffer[1] = PAGE_MARKER;
        let low = slot as PageNumber * span;
        for page_number in self.pages.range(low..low.saturating_add(span)) {
            let bit = (page_number - low) as usize;
            buffer[format.offset_usage_map_page_data + bit / 8] |= 1 << (bit % 8);
        }
        channel.write_page(&buffer, map_page)?;
        Ok(map_page)
    }

    fn promote_to_reference(&mut self, channel: &mut PageChannel) -> Result<(), DatabaseError> {
        let format = channel.format();
        let span = format.reference_map_page_span();
        let slots = format.max_reference_map_pages();
        if let Some(last) = self.last_page_number() {
            if (last / span) as usize >= slots {
                return Err(DatabaseError::UsageMapInconsistent {
                    page_number: last,
                    reason: "beyond the range of a reference usage map".to_string(),
                });
            }
        }

        let used_slots: BTreeSet<usize> =
            self.pages.iter().map(|page| (page / span) as usize).collect();
        let mut map_pages = vec![0; slots];
        for slot in used_slots {
            map_pages[slot] = self.create_map_page(channel, slot)?;
        }
        debug!(
            page = self.location.page_number,
            row = self.location.row_number,
            map_pages = map_pages.iter().filter(|page| **page != 0).count(),
            "usage_map.promote_to_reference"
        );
        self.kind = MapKind::Reference { map_pages };
        self.write_row(channel)
    }

    fn row_bytes(&self, format: &JetFormat) -> Vec<u8> {
        let mut row = vec![0u8; format.usage_map_row_length];
        match &self.kind {
            MapKind::Inline { start_page } => {
                row[0] = MAP_TYPE_INLINE;
                row[1..5].copy_from_slice(&start_page.to_le_bytes());
                for page_number in &self.pages {
                    let bit = (page_number - start_page) as usize;
                    row[format.offset_usage_map_start + bit / 8] |= 1 << (bit % 8);
                }
            }
            MapKind::Reference { map_pages } => {
                row[0] = MAP_TYPE_REFERENCE;
                for (slot, map_page) in map_pages.iter().enumerate() {
                    row[1 + slot * 4..5 + slot * 4].copy_from_slice(&map_page.to_le_bytes());
                }
            }
        }
        row
    }

    fn write_row(&self, channel: &mut PageChannel) -> Result<(), DatabaseError> {
        let format = channel.format();
        let bytes = channel.read_page(self.location.page_number)?;
        let mut page = DataPage::from_bytes(&bytes, self.location.page_number, format)?;
        page.set_row(self.location.row_number, &self.row_bytes(format))?;
        channel.write_page(&page.to_bytes(format)?, self.location.page_number)
    }
}

fn collect_bits(bitmap: &[u8], base: PageNumber, pages: &mut BTreeSet<PageNumber>) {
    for (index, byte) in bitmap.iter().enumerate() {
        if *byte == 0 {
            continue;
        }
        for bit in 0..8 {
            if byte & (1 << bit) != 0 {
                pages.insert(base + (index * 8 + bit) as PageNumber);
            }
        }
    }
}
