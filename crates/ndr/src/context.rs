//! Byte order and alignment helpers
//!
//! The data representation label of a PDU decides whether stub integers are
//! little- or big-endian. `NdrContext` carries that choice and knows how to
//! pad and skip to an alignment boundary relative to the stub start.

use crate::{NdrError, Result};
use bytes::{Buf, BufMut};

/// NDR encoding/decoding context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdrContext {
    pub little_endian: bool,
}

macro_rules! ndr_scalar_io {
    ($($put:ident, $get:ident, $put_le:ident, $put_be:ident, $get_le:ident, $get_be:ident, $ty:ty;)*) => {
        $(
            #[inline]
            pub fn $put<B: BufMut>(&self, buf: &mut B, value: $ty) {
                if self.little_endian {
                    buf.$put_le(value)
                } else {
                    buf.$put_be(value)
                }
            }

            #[inline]
            pub fn $get<B: Buf>(&self, buf: &mut B) -> $ty {
                if self.little_endian {
                    buf.$get_le()
                } else {
                    buf.$get_be()
                }
            }
        )*
    };
}

impl NdrContext {
    /// Little-endian context, the representation every peer here sends.
    pub const fn new() -> Self {
        Self { little_endian: true }
    }

    pub const fn big_endian() -> Self {
        Self { little_endian: false }
    }

    /// Context for a PDU whose data representation has `integer_le` set or not.
    pub const fn with_byte_order(little_endian: bool) -> Self {
        Self { little_endian }
    }

    /// Padding needed to bring `position` up to a multiple of `alignment`.
    #[inline]
    pub fn align_padding(position: usize, alignment: usize) -> usize {
        if alignment <= 1 {
            return 0;
        }
        (alignment - position % alignment) % alignment
    }

    /// Write zero padding up to `alignment` and advance `position`.
    pub fn pad<B: BufMut>(&self, buf: &mut B, position: &mut usize, alignment: usize) {
        let padding = Self::align_padding(*position, alignment);
        buf.put_bytes(0, padding);
        *position += padding;
    }

    /// Skip padding up to `alignment`, then check that `needed` more bytes follow.
    pub fn skip<B: Buf>(&self, buf: &mut B, position: &mut usize, alignment: usize, needed: usize) -> Result<()> {
        let padding = Self::align_padding(*position, alignment);
        let total = padding.checked_add(needed).ok_or(NdrError::IntegerOverflow)?;
        if buf.remaining() < total {
            return Err(NdrError::BufferUnderflow { needed: total, have: buf.remaining() });
        }
        buf.advance(padding);
        *position += padding;
        Ok(())
    }

    ndr_scalar_io! {
        put_u16, get_u16, put_u16_le, put_u16, get_u16_le, get_u16, u16;
        put_i16, get_i16, put_i16_le, put_i16, get_i16_le, get_i16, i16;
        put_u32, get_u32, put_u32_le, put_u32, get_u32_le, get_u32, u32;
        put_i32, get_i32, put_i32_le, put_i32, get_i32_le, get_i32, i32;
        put_u64, get_u64, put_u64_le, put_u64, get_u64_le, get_u64, u64;
        put_i64, get_i64, put_i64_le, put_i64, get_i64_le, get_i64, i64;
        put_f32, get_f32, put_f32_le, put_f32, get_f32_le, get_f32, f32;
        put_f64, get_f64, put_f64_le, put_f64, get_f64_le, get_f64, f64;
    }
}

impl Default for NdrContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_alignment_padding() {
        assert_eq!(NdrContext::align_padding(0, 4), 0);
        assert_eq!(NdrContext::align_padding(1, 4), 3);
        assert_eq!(NdrContext::align_padding(3, 4), 1);
        assert_eq!(NdrContext::align_padding(5, 8), 3);
        assert_eq!(NdrContext::align_padding(7, 1), 0);
        assert_eq!(NdrContext::align_padding(7, 0), 0);
    }

    #[test]
    fn test_pad_and_skip() {
        let ctx = NdrContext::new();
        let mut buf = BytesMut::new();
        let mut pos = 1;
        ctx.pad(&mut buf, &mut pos, 4);
        assert_eq!(pos, 4);
        assert_eq!(&buf[..], &[0, 0, 0]);

        let mut reader = &[0u8, 0, 0, 7][..];
        let mut pos = 1;
        ctx.skip(&mut reader, &mut pos, 4, 1).unwrap();
        assert_eq!(pos, 4);
        assert_eq!(reader, &[7]);
    }

    #[test]
    fn test_skip_reports_underflow() {
        let ctx = NdrContext::new();
        let mut reader = &[0u8, 0][..];
        let mut pos = 0;
        let err = ctx.skip(&mut reader, &mut pos, 4, 4).unwrap_err();
        assert!(matches!(err, NdrError::BufferUnderflow { needed: 4, have: 2 }));
    }

    #[test]
    fn test_byte_order() {
        let mut le = BytesMut::new();
        NdrContext::new().put_u32(&mut le, 0x1122_3344);
        assert_eq!(&le[..], &[0x44, 0x33, 0x22, 0x11]);

        let mut be = BytesMut::new();
        NdrContext::big_endian().put_u32(&mut be, 0x1122_3344);
        assert_eq!(&be[..], &[0x11, 0x22, 0x33, 0x44]);

        let mut reader = be.freeze();
        assert_eq!(NdrContext::big_endian().get_u32(&mut reader), 0x1122_3344);
    }
}
