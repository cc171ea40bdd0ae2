use std::borrow::Cow;

use crate::types::{PageNumber, error::DatabaseError};

/// Per-page transform applied between the page channel and the backing store,
/// e.g. encryption. The cipher itself is supplied by the caller.
pub trait CodecHandler {
    /// Whether `encode_page` can encode just the bytes from `partial_offset` onward.
    fn can_encode_partial_page(&self) -> bool;

    /// Whether `decode_page_inline` may be used, avoiding a second buffer.
    fn can_decode_inline(&self) -> bool;

    /// Decodes `raw` (as read from the store) into `page`.
    fn decode_page(
        &self,
        raw: &[u8],
        page: &mut [u8],
        page_number: PageNumber,
    ) -> Result<(), DatabaseError>;

    /// Decodes in place. Only called when `can_decode_inline` is true.
    fn decode_page_inline(
        &self,
        page: &mut [u8],
        page_number: PageNumber,
    ) -> Result<(), DatabaseError> {
        let raw = page.to_vec();
        self.decode_page(&raw, page, page_number)
    }

    /// Encodes a page for writing. With a non-zero `partial_offset` only the returned
    /// bytes from that offset on are written.
    fn encode_page<'a>(
        &self,
        page: &'a [u8],
        page_number: PageNumber,
        partial_offset: usize,
    ) -> Result<Cow<'a, [u8]>, DatabaseError>;
}

/// Pages are stored unmodified.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCodecHandler;

impl CodecHandler for DefaultCodecHandler {
    fn can_encode_partial_page(&self) -> bool {
        true
    }

    fn can_decode_inline(&self) -> bool {
        true
    }

    fn decode_page(
        &self,
        raw: &[u8],
        page: &mut [u8],
        _page_number: PageNumber,
    ) -> Result<(), DatabaseError> {
        page.copy_from_slice(raw);
        Ok(())
    }

    fn decode_page_inline(
        &self,
        _page: &mut [u8],
        _page_number: PageNumber,
    ) -> Result<(), DatabaseError> {
        Ok(())
    }

    fn encode_page<'a>(
        &self,
        page: &'a [u8],
        _page_number: PageNumber,
        _partial_offset: usize,
    ) -> Result<Cow<'a, [u8]>, DatabaseError> {
        Ok(Cow::Borrowed(page))
    }
}
