//! NDR primitive types
//!
//! | IDL type              | Rust  | Size | Alignment |
//! |-----------------------|-------|------|-----------|
//! | boolean, VARIANT_BOOL | bool  | 1    | 1         |
//! | byte, unsigned char   | u8    | 1    | 1         |
//! | small, char           | i8    | 1    | 1         |
//! | short                 | i16   | 2    | 2         |
//! | unsigned short        | u16   | 2    | 2         |
//! | long, int, HRESULT    | i32   | 4    | 4         |
//! | unsigned long, DWORD  | u32   | 4    | 4         |
//! | hyper                 | i64   | 8    | 8         |
//! | unsigned hyper        | u64   | 8    | 8         |
//! | float                 | f32   | 4    | 4         |
//! | double                | f64   | 8    | 8         |
//! | GUID                  | Uuid  | 16   | 4         |

use crate::{NdrContext, NdrDecode, NdrEncode, Result};
use bytes::{Buf, BufMut};
use uuid::Uuid;

macro_rules! impl_ndr_primitive {
    ($ty:ty, $size:expr, $put:ident, $get:ident) => {
        impl NdrEncode for $ty {
            fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<()> {
                ctx.pad(buf, position, $size);
                ctx.$put(buf, *self);
                *position += $size;
                Ok(())
            }

            fn ndr_align() -> usize {
                $size
            }
        }

        impl NdrDecode for $ty {
            fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<Self> {
                ctx.skip(buf, position, $size, $size)?;
                let value = ctx.$get(buf);
                *position += $size;
                Ok(value)
            }

            fn ndr_align() -> usize {
                $size
            }
        }
    };
}

impl_ndr_primitive!(u16, 2, put_u16, get_u16);
impl_ndr_primitive!(i16, 2, put_i16, get_i16);
impl_ndr_primitive!(u32, 4, put_u32, get_u32);
impl_ndr_primitive!(i32, 4, put_i32, get_i32);
impl_ndr_primitive!(u64, 8, put_u64, get_u64);
impl_ndr_primitive!(i64, 8, put_i64, get_i64);
impl_ndr_primitive!(f32, 4, put_f32, get_f32);
impl_ndr_primitive!(f64, 8, put_f64, get_f64);

impl NdrEncode for u8 {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, _ctx: &NdrContext, position: &mut usize) -> Result<()> {
        buf.put_u8(*self);
        *position += 1;
        Ok(())
    }
}

impl NdrDecode for u8 {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<Self> {
        ctx.skip(buf, position, 1, 1)?;
        *position += 1;
        Ok(buf.get_u8())
    }
}

impl NdrEncode for i8 {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, _ctx: &NdrContext, position: &mut usize) -> Result<()> {
        buf.put_i8(*self);
        *position += 1;
        Ok(())
    }
}

impl NdrDecode for i8 {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<Self> {
        ctx.skip(buf, position, 1, 1)?;
        *position += 1;
        Ok(buf.get_i8())
    }
}

/// Encoded as a single byte, any non-zero value decodes as `true`.
impl NdrEncode for bool {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<()> {
        u8::from(*self).ndr_encode(buf, ctx, position)
    }
}

impl NdrDecode for bool {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<Self> {
        Ok(u8::ndr_decode(buf, ctx, position)? != 0)
    }
}

impl NdrEncode for Uuid {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<()> {
        let (data1, data2, data3, data4) = self.as_fields();
        ctx.pad(buf, position, 4);
        ctx.put_u32(buf, data1);
        ctx.put_u16(buf, data2);
        ctx.put_u16(buf, data3);
        buf.put_slice(data4);
        *position += 16;
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for Uuid {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<Self> {
        ctx.skip(buf, position, 4, 16)?;
        let data1 = ctx.get_u32(buf);
        let data2 = ctx.get_u16(buf);
        let data3 = ctx.get_u16(buf);
        let mut data4 = [0u8; 8];
        buf.copy_to_slice(&mut data4);
        *position += 16;
        Ok(Uuid::from_fields(data1, data2, data3, &data4))
    }

    fn ndr_align() -> usize {
        4
    }
}
