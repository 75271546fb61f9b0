//! Encode and decode traits

use crate::{NdrContext, Result};
use bytes::{Buf, BufMut};

/// Types that can be written as NDR stub data.
///
/// `position` is the byte offset from the start of the stub. Alignment is
/// always computed against it, never against the buffer length.
pub trait NdrEncode {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<()>;

    /// Alignment of the first byte of this type
    fn ndr_align() -> usize
    where
        Self: Sized,
    {
        1
    }
}

/// Types that can be read back from NDR stub data.
pub trait NdrDecode: Sized {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<Self>;

    fn ndr_align() -> usize {
        1
    }
}
