use crate::{
    storage::{
        JET_MAGIC, JET_VERSION_OFFSET, SORT_ORDER_OFFSET,
        format::{FileFormat, JetFormat},
    },
    types::error::DatabaseError,
};

/// Collation id of the "General" sort order.
pub const GENERAL_SORT_ORDER: u16 = 0x0409;

/// The fields of page 0 this engine reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseHeader {
    pub magic: [u8; 20],
    pub file_format: FileFormat,
    pub sort_order: u16,
}

impl Default for DatabaseHeader {
    fn default() -> Self {
        Self {
            magic: *JET_MAGIC,
            file_format: FileFormat::default(),
            sort_order: GENERAL_SORT_ORDER,
        }
    }
}

impl DatabaseHeader {
    pub fn new(file_format: FileFormat, sort_order: u16) -> Self {
        Self {
            file_format,
            sort_order,
            ..Self::default()
        }
    }

    pub fn format(&self) -> &'static JetFormat {
        self.file_format.jet_format()
    }

    /// Serializes into a full header page.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = vec![0u8; self.format().page_size];
        buffer[..JET_MAGIC.len()].copy_from_slice(&self.magic);
        buffer[JET_VERSION_OFFSET] = self.file_format.version_byte();
        buffer[SORT_ORDER_OFFSET..SORT_ORDER_OFFSET + 2]
            .copy_from_slice(&self.sort_order.to_le_bytes());
        buffer
    }

    /// Parses the leading bytes of page 0. Only the first page-size-independent
    /// bytes are needed, which is how the format is detected before the page size is known.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DatabaseError> {
        if bytes.len() < SORT_ORDER_OFFSET + 2 {
            return Err(DatabaseError::InvalidHeader {
                reason: "Header too short".to_string(),
            });
        }

        let mut magic = [0u8; 20];
        magic.copy_from_slice(&bytes[..JET_MAGIC.len()]);
        if &magic != JET_MAGIC {
            return Err(DatabaseError::InvalidHeader {
                reason: "Invalid Jet magic number".to_string(),
            });
        }

        let file_format = FileFormat::from_version_byte(bytes[JET_VERSION_OFFSET])?;
        let sort_order =
            u16::from_le_bytes([bytes[SORT_ORDER_OFFSET], bytes[SORT_ORDER_OFFSET + 1]]);

        Ok(Self {
            magic,
            file_format,
            sort_order,
        })
    }
}
