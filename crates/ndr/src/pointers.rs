//! Unique pointers
//!
//! `[unique]` pointers are a 4-aligned referent id, zero for null, followed by
//! the pointee when the id is non-zero. Referent ids are derived from the
//! stub offset so every pointer in one stub gets a distinct id.

use crate::{NdrContext, NdrDecode, NdrEncode, Result};
use bytes::{Buf, BufMut};

const REFERENT_BASE: u32 = 0x0002_0000;

/// Nullable embedded or top-level `[unique]` pointer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unique<T>(pub Option<T>);

impl<T> Unique<T> {
    pub fn new(value: T) -> Self {
        Self(Some(value))
    }

    pub fn null() -> Self {
        Self(None)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    pub fn into_option(self) -> Option<T> {
        self.0
    }
}

impl<T> Default for Unique<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> From<Option<T>> for Unique<T> {
    fn from(value: Option<T>) -> Self {
        Self(value)
    }
}

impl<T: NdrEncode> NdrEncode for Unique<T> {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<()> {
        ctx.pad(buf, position, 4);
        match &self.0 {
            None => {
                ctx.put_u32(buf, 0);
                *position += 4;
                Ok(())
            }
            Some(value) => {
                let referent = REFERENT_BASE.wrapping_add(*position as u32);
                ctx.put_u32(buf, referent);
                *position += 4;
                value.ndr_encode(buf, ctx, position)
            }
        }
    }

    fn ndr_align() -> usize {
        4
    }
}

impl<T: NdrDecode> NdrDecode for Unique<T> {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<Self> {
        ctx.skip(buf, position, 4, 4)?;
        let referent = ctx.get_u32(buf);
        *position += 4;
        if referent == 0 {
            return Ok(Self(None));
        }
        T::ndr_decode(buf, ctx, position).map(Self::new)
    }

    fn ndr_align() -> usize {
        4
    }
}
