//! STDOBJREF
//!
//! The 40-byte core of a marshaled interface pointer:
//!
//! ```text
//! flags: u32  public_refs: u32  oxid: u64  oid: u64  ipid: GUID
//! ```

use super::identifiers::{Ipid, Oid, Oxid};
use comharness_ndr::{Buf, BufMut, NdrContext, NdrDecode, NdrEncode};

/// STDOBJREF flags (SORF_*)
pub mod flags {
    pub const SORF_NULL: u32 = 0x0000_0000;
    /// Client does not need to ping for this reference
    pub const SORF_NOPING: u32 = 0x0000_1000;
}

/// Public references handed out with each marshaled pointer
pub const DEFAULT_PUBLIC_REFS: u32 = 5;

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct StdObjRef {
    pub flags: u32,
    pub public_refs: u32,
    pub oxid: Oxid,
    pub oid: Oid,
    pub ipid: Ipid,
}

impl StdObjRef {
    pub const SIZE: usize = 40;

    pub fn new(oxid: Oxid, oid: Oid, ipid: Ipid, public_refs: u32) -> Self {
        Self {
            flags: flags::SORF_NOPING,
            public_refs,
            oxid,
            oid,
            ipid,
        }
    }
}

impl NdrEncode for StdObjRef {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<()> {
        self.flags.ndr_encode(buf, ctx, position)?;
        self.public_refs.ndr_encode(buf, ctx, position)?;
        self.oxid.ndr_encode(buf, ctx, position)?;
        self.oid.ndr_encode(buf, ctx, position)?;
        self.ipid.ndr_encode(buf, ctx, position)
    }

    fn ndr_align() -> usize {
        8
    }
}

impl NdrDecode for StdObjRef {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<Self> {
        Ok(Self {
            flags: u32::ndr_decode(buf, ctx, position)?,
            public_refs: u32::ndr_decode(buf, ctx, position)?,
            oxid: Oxid::ndr_decode(buf, ctx, position)?,
            oid: Oid::ndr_decode(buf, ctx, position)?,
            ipid: Ipid::ndr_decode(buf, ctx, position)?,
        })
    }

    fn ndr_align() -> usize {
        8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comharness_ndr::{NdrReader, NdrWriter};

    #[test]
    fn test_stdobjref_is_forty_bytes() {
        let std = StdObjRef::new(Oxid::new(1), Oid::new(2), Ipid::generate(), DEFAULT_PUBLIC_REFS);
        let mut writer = NdrWriter::new();
        writer.write(&std).unwrap();
        let stub = writer.into_bytes();
        assert_eq!(stub.len(), StdObjRef::SIZE);
        assert_eq!(&stub[4..8], &5u32.to_le_bytes());

        let decoded: StdObjRef = NdrReader::new(&stub).read().unwrap();
        assert_eq!(decoded, std);
    }
}
