//! ORPC headers
//!
//! Every object call stub starts with ORPCTHIS and every reply stub with
//! ORPCTHAT. Extensions are never sent, so both end in a null pointer.
//!
//! ```text
//! ORPCTHIS (32 bytes): version u16.u16, flags u32, reserved1 u32, cid GUID, extensions ptr
//! ORPCTHAT (8 bytes):  flags u32, extensions ptr
//! ```

use super::error::{DcomError, Result};
use super::hresult::HResult;
use comharness_ndr::{Buf, BufMut, Bytes, BytesMut, NdrContext, NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct ComVersion {
    pub major: u16,
    pub minor: u16,
}

impl ComVersion {
    pub const DCOM_5_7: Self = Self { major: 5, minor: 7 };

    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl NdrEncode for ComVersion {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<()> {
        self.major.ndr_encode(buf, ctx, position)?;
        self.minor.ndr_encode(buf, ctx, position)
    }

    fn ndr_align() -> usize {
        2
    }
}

impl NdrDecode for ComVersion {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<Self> {
        Ok(Self {
            major: u16::ndr_decode(buf, ctx, position)?,
            minor: u16::ndr_decode(buf, ctx, position)?,
        })
    }

    fn ndr_align() -> usize {
        2
    }
}

fn decode_null_extensions<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<()> {
    match u32::ndr_decode(buf, ctx, position)? {
        0 => Ok(()),
        referent => Err(NdrError::InvalidPointer(referent)),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrpcThis {
    pub version: ComVersion,
    pub flags: u32,
    pub reserved1: u32,
    /// Causality id shared by every call in one logical call chain
    pub cid: Uuid,
}

impl OrpcThis {
    pub const SIZE: usize = 32;

    pub fn new() -> Self {
        Self::with_cid(Uuid::new_v4())
    }

    pub fn with_cid(cid: Uuid) -> Self {
        Self {
            version: ComVersion::DCOM_5_7,
            flags: 0,
            reserved1: 0,
            cid,
        }
    }
}

impl Default for OrpcThis {
    fn default() -> Self {
        Self::new()
    }
}

impl NdrEncode for OrpcThis {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<()> {
        self.version.ndr_encode(buf, ctx, position)?;
        self.flags.ndr_encode(buf, ctx, position)?;
        self.reserved1.ndr_encode(buf, ctx, position)?;
        self.cid.ndr_encode(buf, ctx, position)?;
        0u32.ndr_encode(buf, ctx, position)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for OrpcThis {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<Self> {
        let this = Self {
            version: ComVersion::ndr_decode(buf, ctx, position)?,
            flags: u32::ndr_decode(buf, ctx, position)?,
            reserved1: u32::ndr_decode(buf, ctx, position)?,
            cid: Uuid::ndr_decode(buf, ctx, position)?,
        };
        decode_null_extensions(buf, ctx, position)?;
        Ok(this)
    }

    fn ndr_align() -> usize {
        4
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct OrpcThat {
    pub flags: u32,
}

impl OrpcThat {
    pub const SIZE: usize = 8;

    pub fn new() -> Self {
        Self::default()
    }
}

impl NdrEncode for OrpcThat {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<()> {
        self.flags.ndr_encode(buf, ctx, position)?;
        0u32.ndr_encode(buf, ctx, position)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for OrpcThat {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<Self> {
        let flags = u32::ndr_decode(buf, ctx, position)?;
        decode_null_extensions(buf, ctx, position)?;
        Ok(Self { flags })
    }

    fn ndr_align() -> usize {
        4
    }
}

/// Prefix `args` with ORPCTHIS.
///
/// `args` must have been encoded from offset 0. ORPCTHIS is 32 bytes, so
/// every alignment inside `args` is preserved.
pub fn encode_request(this: &OrpcThis, args: &[u8]) -> Result<Bytes> {
    let mut writer = NdrWriter::new();
    writer.write(this)?;
    let mut stub = BytesMut::from(&writer.into_bytes()[..]);
    stub.extend_from_slice(args);
    Ok(stub.freeze())
}

/// Split an object call stub into its ORPCTHIS and the in-parameters.
pub fn decode_request(stub: Bytes) -> Result<(OrpcThis, Bytes)> {
    if stub.len() < OrpcThis::SIZE {
        return Err(NdrError::BufferUnderflow { needed: OrpcThis::SIZE, have: stub.len() }.into());
    }
    let this = NdrReader::new(&stub[..OrpcThis::SIZE]).read()?;
    Ok((this, stub.slice(OrpcThis::SIZE..)))
}

/// Build a reply stub: ORPCTHAT, the out-parameters, then the HRESULT at
/// the next 4-aligned offset.
pub fn encode_response(outs: &[u8], hr: HResult) -> Result<Bytes> {
    let mut writer = NdrWriter::new();
    writer.write(&OrpcThat::new())?;
    let mut stub = BytesMut::from(&writer.into_bytes()[..]);
    stub.extend_from_slice(outs);
    let padding = NdrContext::align_padding(stub.len(), 4);
    stub.resize(stub.len() + padding, 0);
    stub.extend_from_slice(&hr.code().to_le_bytes());
    Ok(stub.freeze())
}

/// Take a reply stub apart. A failing HRESULT becomes `DcomError::Failed`,
/// otherwise the out-parameters are returned, trailing padding included.
pub fn decode_response(stub: Bytes) -> Result<Bytes> {
    let min = OrpcThat::SIZE + 4;
    if stub.len() < min {
        return Err(NdrError::BufferUnderflow { needed: min, have: stub.len() }.into());
    }
    NdrReader::new(&stub[..OrpcThat::SIZE]).read::<OrpcThat>()?;

    let hr_at = stub.len() - 4;
    let mut code = [0u8; 4];
    code.copy_from_slice(&stub[hr_at..]);
    let hr = HResult(u32::from_le_bytes(code));
    if hr.is_failure() {
        return Err(DcomError::Failed(hr));
    }
    Ok(stub.slice(OrpcThat::SIZE..hr_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use comharness_ndr::{NdrReader, NdrWriter};

    #[test]
    fn test_orpcthis_size() {
        let this = OrpcThis::new();
        let mut writer = NdrWriter::new();
        writer.write(&this).unwrap();
        let stub = writer.into_bytes();
        assert_eq!(stub.len(), OrpcThis::SIZE);
        assert_eq!(&stub[..4], &[5, 0, 7, 0]);

        let decoded: OrpcThis = NdrReader::new(&stub).read().unwrap();
        assert_eq!(decoded, this);
    }

    #[test]
    fn test_orpcthat_rejects_extensions() {
        let mut writer = NdrWriter::new();
        writer.write(&0u32).unwrap().write(&0x0002_0000u32).unwrap();
        let stub = writer.into_bytes();
        assert!(NdrReader::new(&stub).read::<OrpcThat>().is_err());

        let mut writer = NdrWriter::new();
        writer.write(&OrpcThat::new()).unwrap();
        assert_eq!(writer.into_bytes().len(), OrpcThat::SIZE);
    }

    #[test]
    fn test_response_framing() {
        use crate::types::hresult;
        use comharness_ndr::Bstr;

        let mut writer = NdrWriter::new();
        writer.write(&Bstr::new("Oslo")).unwrap();
        let outs = writer.into_bytes();
        assert_eq!(outs.len(), 24);

        let stub = encode_response(&outs[..22], hresult::S_OK).unwrap();
        assert_eq!(stub.len(), 8 + 24 + 4);
        let decoded = decode_response(stub).unwrap();
        assert_eq!(decoded.len(), 24);

        let failed = encode_response(&[], hresult::E_POINTER).unwrap();
        assert_eq!(failed.len(), 12);
        let err = decode_response(failed).unwrap_err();
        assert_eq!(err.hresult(), hresult::E_POINTER);
    }

    #[test]
    fn test_request_framing() {
        let this = OrpcThis::new();
        let stub = encode_request(&this, &[1, 2, 3, 4]).unwrap();
        let (decoded, args) = decode_request(stub).unwrap();
        assert_eq!(decoded.cid, this.cid);
        assert_eq!(&args[..], &[1, 2, 3, 4]);
        assert!(decode_request(Bytes::from_static(&[5, 0, 7, 0])).is_err());
    }
}
