//! Conformant byte arrays
//!
//! `byte data[size_is(n)]` is written as a 4-aligned `max_count` followed by
//! the raw bytes. `MInterfacePointer` uses this to carry a marshaled OBJREF.

use crate::{NdrContext, NdrDecode, NdrEncode, NdrError, Result, MAX_NDR_ALLOCATION_SIZE};
use bytes::{Buf, BufMut, Bytes};

/// Conformant array of `byte`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConformantBytes(pub Bytes);

impl ConformantBytes {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl NdrEncode for ConformantBytes {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<()> {
        let count = u32::try_from(self.0.len()).map_err(|_| NdrError::IntegerOverflow)?;
        ctx.pad(buf, position, 4);
        ctx.put_u32(buf, count);
        buf.put_slice(&self.0);
        *position += 4 + self.0.len();
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for ConformantBytes {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<Self> {
        ctx.skip(buf, position, 4, 4)?;
        let count = ctx.get_u32(buf) as usize;
        *position += 4;

        if count > MAX_NDR_ALLOCATION_SIZE {
            return Err(NdrError::AllocationLimitExceeded {
                requested: count,
                limit: MAX_NDR_ALLOCATION_SIZE,
            });
        }
        if buf.remaining() < count {
            return Err(NdrError::BufferUnderflow { needed: count, have: buf.remaining() });
        }
        let data = buf.copy_to_bytes(count);
        *position += count;
        Ok(Self(data))
    }

    fn ndr_align() -> usize {
        4
    }
}
