//! String types
//!
//! `[string] wchar_t*` travels as a conformant varying array:
//! ```text
//! max_count: u32     # code units including the terminator
//! offset: u32        # always 0
//! actual_count: u32  # code units including the terminator
//! units[actual_count]
//! ```
//!
//! A BSTR is user-marshaled as a pointer to a `FLAGGED_WORD_BLOB`:
//! ```text
//! referent: u32      # 0x72657355 ("User") or 0 for a null BSTR
//! max_count: u32     # conformance, in code units
//! flags: u32         # byte length of the string
//! size: u32          # code units, no terminator
//! units[size]
//! ```

use crate::{NdrContext, NdrDecode, NdrEncode, NdrError, Result, MAX_NDR_ALLOCATION_SIZE};
use bytes::{Buf, BufMut};

const BSTR_REFERENT: u32 = 0x7265_7355;

fn put_units<B: BufMut>(buf: &mut B, ctx: &NdrContext, position: &mut usize, units: &[u16]) {
    for unit in units {
        ctx.put_u16(buf, *unit);
    }
    *position += units.len() * 2;
}

fn get_units<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize, count: usize) -> Result<Vec<u16>> {
    if count > MAX_NDR_ALLOCATION_SIZE / 2 {
        return Err(NdrError::AllocationLimitExceeded {
            requested: count,
            limit: MAX_NDR_ALLOCATION_SIZE / 2,
        });
    }
    let bytes = count.checked_mul(2).ok_or(NdrError::IntegerOverflow)?;
    if buf.remaining() < bytes {
        return Err(NdrError::BufferUnderflow { needed: bytes, have: buf.remaining() });
    }
    let units = (0..count).map(|_| ctx.get_u16(buf)).collect();
    *position += bytes;
    Ok(units)
}

fn units_to_string(units: Vec<u16>) -> Result<String> {
    char::decode_utf16(units)
        .collect::<std::result::Result<String, _>>()
        .map_err(NdrError::from)
}

/// Null-terminated UTF-16 string (`[string] LPWSTR`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct WideString(pub String);

impl WideString {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&str> for WideString {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl NdrEncode for WideString {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<()> {
        let mut units: Vec<u16> = self.0.encode_utf16().collect();
        units.push(0);
        let count = u32::try_from(units.len()).map_err(|_| NdrError::IntegerOverflow)?;

        ctx.pad(buf, position, 4);
        ctx.put_u32(buf, count);
        ctx.put_u32(buf, 0);
        ctx.put_u32(buf, count);
        *position += 12;
        put_units(buf, ctx, position, &units);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for WideString {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<Self> {
        ctx.skip(buf, position, 4, 12)?;
        let max_count = ctx.get_u32(buf);
        let offset = ctx.get_u32(buf);
        let actual_count = ctx.get_u32(buf);
        *position += 12;

        if offset != 0 {
            return Err(NdrError::InvalidString(format!("non-zero offset {offset}")));
        }
        if actual_count > max_count {
            return Err(NdrError::ConformanceMismatch { max_count, actual_count });
        }

        let mut units = get_units(buf, ctx, position, actual_count as usize)?;
        if units.pop() != Some(0) {
            return Err(NdrError::InvalidString("missing terminator".to_string()));
        }
        units_to_string(units).map(Self)
    }

    fn ndr_align() -> usize {
        4
    }
}

/// COM `BSTR`. `None` is the null BSTR, which COM treats as an empty string.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct Bstr(pub Option<String>);

impl Bstr {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Some(s.into()))
    }

    pub const fn null() -> Self {
        Self(None)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Contents, with a null BSTR read as empty.
    pub fn as_str(&self) -> &str {
        self.0.as_deref().unwrap_or("")
    }

    pub fn into_string(self) -> String {
        self.0.unwrap_or_default()
    }
}

impl From<&str> for Bstr {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Bstr {
    fn from(s: String) -> Self {
        Self(Some(s))
    }
}

impl NdrEncode for Bstr {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<()> {
        ctx.pad(buf, position, 4);
        let Some(s) = &self.0 else {
            ctx.put_u32(buf, 0);
            *position += 4;
            return Ok(());
        };

        let units: Vec<u16> = s.encode_utf16().collect();
        let count = u32::try_from(units.len()).map_err(|_| NdrError::IntegerOverflow)?;
        let byte_len = count.checked_mul(2).ok_or(NdrError::IntegerOverflow)?;

        ctx.put_u32(buf, BSTR_REFERENT);
        ctx.put_u32(buf, count);
        ctx.put_u32(buf, byte_len);
        ctx.put_u32(buf, count);
        *position += 16;
        put_units(buf, ctx, position, &units);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for Bstr {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> Result<Self> {
        ctx.skip(buf, position, 4, 4)?;
        let referent = ctx.get_u32(buf);
        *position += 4;
        if referent == 0 {
            return Ok(Self::null());
        }

        ctx.skip(buf, position, 4, 12)?;
        let max_count = ctx.get_u32(buf);
        let byte_len = ctx.get_u32(buf);
        let size = ctx.get_u32(buf);
        *position += 12;

        if size > max_count {
            return Err(NdrError::ConformanceMismatch { max_count, actual_count: size });
        }
        if u64::from(byte_len) != u64::from(size) * 2 {
            return Err(NdrError::InvalidString(format!(
                "byte length {byte_len} does not match {size} code units"
            )));
        }

        let units = get_units(buf, ctx, position, size as usize)?;
        units_to_string(units).map(Self::from)
    }

    fn ndr_align() -> usize {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn encode<T: NdrEncode>(value: &T, start: usize) -> (BytesMut, usize) {
        let mut buf = BytesMut::new();
        let mut pos = start;
        value.ndr_encode(&mut buf, &NdrContext::new(), &mut pos).unwrap();
        (buf, pos)
    }

    #[test]
    fn test_bstr_wire_format() {
        let (buf, pos) = encode(&Bstr::new("Oslo"), 0);
        assert_eq!(pos, 16 + 8);
        assert_eq!(&buf[..4], &BSTR_REFERENT.to_le_bytes());
        assert_eq!(&buf[4..8], &4u32.to_le_bytes());
        assert_eq!(&buf[8..12], &8u32.to_le_bytes());
        assert_eq!(&buf[16..18], &[b'O', 0]);

        let mut reader = buf.freeze();
        let mut pos = 0;
        let decoded = Bstr::ndr_decode(&mut reader, &NdrContext::new(), &mut pos).unwrap();
        assert_eq!(decoded.as_str(), "Oslo");
    }

    #[test]
    fn test_null_bstr() {
        let (buf, pos) = encode(&Bstr::null(), 2);
        assert_eq!(pos, 8);
        assert_eq!(buf.len(), 6);

        let mut reader = buf.freeze();
        let mut pos = 2;
        let decoded = Bstr::ndr_decode(&mut reader, &NdrContext::new(), &mut pos).unwrap();
        assert!(decoded.is_null());
        assert_eq!(decoded.as_str(), "");
    }

    #[test]
    fn test_consecutive_bstrs_realign() {
        let ctx = NdrContext::new();
        let mut buf = BytesMut::new();
        let mut pos = 0;
        Bstr::new("Suhms gate").ndr_encode(&mut buf, &ctx, &mut pos).unwrap();
        Bstr::new("0363").ndr_encode(&mut buf, &ctx, &mut pos).unwrap();
        Bstr::new("Oslo").ndr_encode(&mut buf, &ctx, &mut pos).unwrap();

        let mut reader = buf.freeze();
        let mut pos = 0;
        let fields: Vec<String> = (0..3)
            .map(|_| Bstr::ndr_decode(&mut reader, &ctx, &mut pos).unwrap().into_string())
            .collect();
        assert_eq!(fields, ["Suhms gate", "0363", "Oslo"]);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_wide_string_non_ascii() {
        let s = WideString::new("Bj\u{f8}rvika");
        let (buf, _) = encode(&s, 0);
        let mut reader = buf.freeze();
        let mut pos = 0;
        let decoded = WideString::ndr_decode(&mut reader, &NdrContext::new(), &mut pos).unwrap();
        assert_eq!(decoded, s);
    }

    #[test]
    fn test_wide_string_rejects_bad_conformance() {
        let ctx = NdrContext::new();
        let mut buf = BytesMut::new();
        ctx.put_u32(&mut buf, 1);
        ctx.put_u32(&mut buf, 0);
        ctx.put_u32(&mut buf, 2);
        let mut reader = buf.freeze();
        let mut pos = 0;
        let err = WideString::ndr_decode(&mut reader, &ctx, &mut pos).unwrap_err();
        assert!(matches!(err, NdrError::ConformanceMismatch { max_count: 1, actual_count: 2 }));
    }
}
