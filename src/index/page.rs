use crate::{
    index::entry::Entry,
    storage::format::JetFormat,
    types::{
        INVALID_PAGE_NUMBER, PageNumber,
        error::DatabaseError,
        page::{PAGE_MARKER, PageType, read_u16_le, read_u32_le},
        row_id::{ROW_ID_SIZE, RowId},
    },
};

const CHILD_POINTER_SIZE: usize = 4;

/*
 * Index Page Layout (Jet4 offsets, Jet3 in brackets)
 * ┌─────────────────────────────────────────────────────────────────┐
 * │ type(1) | 0x01(1) | free_space(2) | owner(4) | prev(4) | next(4) │
 * │ child_tail(4) | ... | prefix_length(2) at 24 [20]               │
 * ├─────────────────────────────────────────────────────────────────┤
 * │ ENTRY MASK at 27 [22], 453 [226] bytes: bit set at each entry's │
 * │ end offset, relative to the first entry                         │
 * ├─────────────────────────────────────────────────────────────────┤
 * │ ENTRIES from 480 [248]                                           │
 * │ [first entry] [entry 1 minus prefix] [entry 2 minus prefix] ... │
 * │ leaf entry: key | row id (3 BE + 1)                             │
 * │ node entry: key | row id (3 BE + 1) | child page (4 BE)         │
 * └─────────────────────────────────────────────────────────────────┘
 */

/// One page of an index B-tree. A node page keeps, for every child, the greatest
/// entry of that child's subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexPage {
    pub page_number: PageNumber,
    pub is_leaf: bool,
    pub owner: PageNumber,
    pub prev_page: PageNumber,
    pub next_page: PageNumber,
    pub child_tail_page: PageNumber,
    pub entries: Vec<Entry>,
    /// Child page of each entry; empty on leaves.
    pub children: Vec<PageNumber>,
}

impl IndexPage {
    pub fn new_leaf(page_number: PageNumber, owner: PageNumber) -> Self {
        Self {
            page_number,
            is_leaf: true,
            owner,
            prev_page: INVALID_PAGE_NUMBER,
            next_page: INVALID_PAGE_NUMBER,
            child_tail_page: INVALID_PAGE_NUMBER,
            entries: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn new_node(page_number: PageNumber, owner: PageNumber) -> Self {
        Self {
            is_leaf: false,
            ..Self::new_leaf(page_number, owner)
        }
    }

    pub fn page_type(&self) -> PageType {
        if self.is_leaf {
            PageType::IndexLeaf
        } else {
            PageType::IndexNode
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last_entry(&self) -> Option<&Entry> {
        self.entries.last()
    }

    fn entry_bytes(&self, index: usize) -> Vec<u8> {
        let entry = &self.entries[index];
        let mut bytes = Vec::with_capacity(entry.leaf_size() + CHILD_POINTER_SIZE);
        entry.write_to(&mut bytes);
        if !self.is_leaf {
            bytes.extend_from_slice(&self.children[index].to_be_bytes());
        }
        bytes
    }

    /// Uncompressed size of one entry on this page.
    pub fn entry_size(&self, index: usize) -> usize {
        let size = self.entries[index].leaf_size();
        if self.is_leaf {
            size
        } else {
            size + CHILD_POINTER_SIZE
        }
    }

    fn common_prefix_length(encoded: &[Vec<u8>]) -> usize {
        if encoded.len() < 2 {
            return 0;
        }
        let first = &encoded[0];
        let mut length = first.len();
        for other in &encoded[1..] {
            length = length.min(
                first
                    .iter()
                    .zip(other.iter())
                    .take_while(|(a, b)| a == b)
                    .count(),
            );
        }
        length
    }

    /// Bytes the entries occupy once written with prefix compression.
    pub fn data_size(&self) -> usize {
        let encoded: Vec<Vec<u8>> = (0..self.entries.len()).map(|i| self.entry_bytes(i)).collect();
        let prefix = Self::common_prefix_length(&encoded);
        encoded
            .iter()
            .enumerate()
            .map(|(i, bytes)| if i == 0 { bytes.len() } else { bytes.len() - prefix })
            .sum()
    }

    pub fn fits(&self, format: &JetFormat) -> bool {
        self.data_size() <= format.page_size - format.index_entries_start()
    }

    /// Serialize the page following the documented layout
    pub fn to_bytes(&self, format: &JetFormat) -> Result<Vec<u8>, DatabaseError> {
        if !self.is_leaf && self.children.len() != self.entries.len() {
            return Err(DatabaseError::corrupted(
                self.page_number,
                "node page entries and children differ in length",
            ));
        }

        let encoded: Vec<Vec<u8>> = (0..self.entries.len()).map(|i| self.entry_bytes(i)).collect();
        let prefix = Self::common_prefix_length(&encoded);
        let start = format.index_entries_start();

        let mut buffer = vec![0u8; format.page_size];
        let mut offset = start;
        for (index, bytes) in encoded.iter().enumerate() {
            let stored = if index == 0 { &bytes[..] } else { &bytes[prefix..] };
            let end = offset + stored.len();
            if end > format.page_size {
                return Err(DatabaseError::PageFull {
                    page_number: self.page_number,
                    needed: self.data_size(),
                    available: format.page_size - start,
                });
            }
            buffer[offset..end].copy_from_slice(stored);
            let bit = end - start;
            buffer[format.offset_index_entry_mask + bit / 8] |= 1 << (bit % 8);
            offset = end;
        }

        buffer[0] = self.page_type().as_u8();
        buffer[1] = PAGE_MARKER;
        let free_space = (format.page_size - offset) as u16;
        buffer[format.offset_index_free_space..format.offset_index_free_space + 2]
            .copy_from_slice(&free_space.to_le_bytes());
        buffer[format.offset_index_owner..format.offset_index_owner + 4]
            .copy_from_slice(&self.owner.to_le_bytes());
        buffer[format.offset_prev_index_page..format.offset_prev_index_page + 4]
            .copy_from_slice(&self.prev_page.to_le_bytes());
        buffer[format.offset_next_index_page..format.offset_next_index_page + 4]
            .copy_from_slice(&self.next_page.to_le_bytes());
        buffer[format.offset_child_tail_index_page..format.offset_child_tail_index_page + 4]
            .copy_from_slice(&self.child_tail_page.to_le_bytes());
        let prefix_offset = format.offset_index_compressed_byte_count;
        buffer[prefix_offset..prefix_offset + 2].copy_from_slice(&(prefix as u16).to_le_bytes());

        Ok(buffer)
    }

    /// Deserialize a page following the documented layout
    pub fn from_bytes(
        bytes: &[u8],
        page_number: PageNumber,
        format: &JetFormat,
    ) -> Result<Self, DatabaseError> {
        if bytes.len() != format.page_size {
            return Err(DatabaseError::InvalidPageSize {
                expected: format.page_size,
                actual: bytes.len(),
            });
        }
        let is_leaf = match PageType::from_u8(bytes[0]) {
            Ok(PageType::IndexLeaf) => true,
            Ok(PageType::IndexNode) => false,
            _ => {
                return Err(DatabaseError::UnexpectedPageType {
                    page_number,
                    expected: "index node or leaf",
                    actual: bytes[0],
                });
            }
        };

        let mut page = if is_leaf {
            Self::new_leaf(page_number, read_u32_le(bytes, format.offset_index_owner))
        } else {
            Self::new_node(page_number, read_u32_le(bytes, format.offset_index_owner))
        };
        page.prev_page = read_u32_le(bytes, format.offset_prev_index_page);
        page.next_page = read_u32_le(bytes, format.offset_next_index_page);
        page.child_tail_page = read_u32_le(bytes, format.offset_child_tail_index_page);
        let prefix_length = read_u16_le(bytes, format.offset_index_compressed_byte_count) as usize;

        let start = format.index_entries_start();
        let suffix_size = if is_leaf {
            ROW_ID_SIZE
        } else {
            ROW_ID_SIZE + CHILD_POINTER_SIZE
        };
        let mask = &bytes[format.offset_index_entry_mask..start];
        let mut prefix: Vec<u8> = Vec::new();
        let mut entry_start = start;

        for bit in 1..mask.len() * 8 {
            if mask[bit / 8] & (1 << (bit % 8)) == 0 {
                continue;
            }
            let entry_end = start + bit;
            if entry_end > format.page_size {
                return Err(DatabaseError::corrupted(
                    page_number,
                    "entry mask points past the page end",
                ));
            }
            let mut full = if page.entries.is_empty() {
                Vec::new()
            } else {
                prefix.clone()
            };
            full.extend_from_slice(&bytes[entry_start..entry_end]);
            if full.len() < suffix_size {
                return Err(DatabaseError::corrupted(
                    page_number,
                    format!("entry at offset {} is only {} bytes", entry_start, full.len()),
                ));
            }
            if page.entries.is_empty() {
                if prefix_length > full.len() {
                    return Err(DatabaseError::corrupted(
                        page_number,
                        "common prefix is longer than the first entry",
                    ));
                }
                prefix = full[..prefix_length].to_vec();
            }

            let key_length = full.len() - suffix_size;
            let row_id = RowId::read_from(&full[key_length..key_length + ROW_ID_SIZE])?;
            if !is_leaf {
                let child = &full[key_length + ROW_ID_SIZE..];
                page.children
                    .push(u32::from_be_bytes([child[0], child[1], child[2], child[3]]));
            }
            full.truncate(key_length);
            page.entries.push(Entry::new(full, row_id));
            entry_start = entry_end;
        }

        Ok(page)
    }

    /// Index of the first entry `>= entry` (or `> entry` when `strict`).
    pub fn lower_bound(&self, entry: &Entry, strict: bool) -> usize {
        self.entries
            .partition_point(|existing| if strict { existing <= entry } else { existing < entry })
    }

    /// Splits off the lower half by cumulative entry size and returns it.
    pub fn split_lower_half(&mut self) -> (Vec<Entry>, Vec<PageNumber>) {
        let total: usize = (0..self.entries.len()).map(|i| self.entry_size(i)).sum();
        let mut running = 0;
        let mut split_at = self.entries.len() / 2;
        for index in 0..self.entries.len() {
            running += self.entry_size(index);
            if running * 2 >= total {
                split_at = index + 1;
                break;
            }
        }
        let split_at = split_at.clamp(1, self.entries.len().saturating_sub(1).max(1));

        let upper_entries = self.entries.split_off(split_at);
        let lower_entries = std::mem::replace(&mut self.entries, upper_entries);
        let lower_children = if self.is_leaf {
            Vec::new()
        } else {
            let upper_children = self.children.split_off(split_at);
            std::mem::replace(&mut self.children, upper_children)
        };
        (lower_entries, lower_children)
    }
}
