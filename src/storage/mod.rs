pub mod channel;
pub mod codec;
pub mod format;
pub mod header;
pub mod page_channel;
pub mod usage_map;

pub(crate) const JET_MAGIC: &[u8; 20] = b"\x00\x01\x00\x00Standard Jet DB\x00";
pub(crate) const JET_VERSION_OFFSET: usize = 0x14;
pub(crate) const SORT_ORDER_OFFSET: usize = 0x6E;
