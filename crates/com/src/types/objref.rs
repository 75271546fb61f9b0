//! OBJREF and MInterfacePointer
//!
//! An interface pointer crosses the wire as an `MInterfacePointer`: a byte
//! count followed by a conformant byte array holding an OBJREF. Only the
//! standard flavor is produced or accepted:
//!
//! ```text
//! signature: u32 = "MEOW"   flags: u32 = OBJREF_STANDARD   iid: GUID
//! std: STDOBJREF            saResAddr: DUALSTRINGARRAY
//! ```

use super::error::{DcomError, Result};
use super::identifiers::Iid;
use super::stdobjref::StdObjRef;
use super::stringbinding::DualStringArray;
use comharness_ndr::{
    Buf, BufMut, Bytes, ConformantBytes, NdrContext, NdrDecode, NdrEncode, NdrError, NdrReader,
    NdrWriter, Unique,
};

/// "MEOW" read as a little-endian u32
pub const OBJREF_SIGNATURE: u32 = 0x574F_454D;

pub mod objref_flags {
    pub const OBJREF_STANDARD: u32 = 0x0000_0001;
    pub const OBJREF_HANDLER: u32 = 0x0000_0002;
    pub const OBJREF_CUSTOM: u32 = 0x0000_0004;
    pub const OBJREF_EXTENDED: u32 = 0x0000_0008;
}

/// A standard OBJREF
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjRef {
    pub iid: Iid,
    pub std: StdObjRef,
    pub resolver_addr: DualStringArray,
}

impl ObjRef {
    pub fn new(iid: Iid, std: StdObjRef, resolver_addr: DualStringArray) -> Self {
        Self { iid, std, resolver_addr }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut writer = NdrWriter::new();
        writer
            .write(&OBJREF_SIGNATURE)?
            .write(&objref_flags::OBJREF_STANDARD)?
            .write(&self.iid)?
            .write(&self.std)?
            .write(&self.resolver_addr)?;
        Ok(writer.into_bytes())
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let mut reader = NdrReader::new(data);
        let signature: u32 = reader.read()?;
        if signature != OBJREF_SIGNATURE {
            return Err(DcomError::InvalidObjRef(format!("bad signature 0x{signature:08x}")));
        }
        let flags: u32 = reader.read()?;
        if flags != objref_flags::OBJREF_STANDARD {
            return Err(DcomError::InvalidObjRef(format!("unsupported flavor 0x{flags:x}")));
        }
        let iid = reader.read()?;
        let std = reader.read()?;
        let resolver_addr = reader.read()?;
        reader.finish()?;
        Ok(Self { iid, std, resolver_addr })
    }
}

/// Marshaled interface pointer body
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct MInterfacePointer {
    pub data: Bytes,
}

impl MInterfacePointer {
    pub fn from_objref(objref: &ObjRef) -> Result<Self> {
        Ok(Self { data: objref.encode()? })
    }

    pub fn objref(&self) -> Result<ObjRef> {
        ObjRef::decode(&self.data)
    }
}

impl NdrEncode for MInterfacePointer {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<()> {
        let count = u32::try_from(self.data.len()).map_err(|_| NdrError::IntegerOverflow)?;
        count.ndr_encode(buf, ctx, position)?;
        ConformantBytes(self.data.clone()).ndr_encode(buf, ctx, position)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for MInterfacePointer {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<Self> {
        let count = u32::ndr_decode(buf, ctx, position)?;
        let data = ConformantBytes::ndr_decode(buf, ctx, position)?;
        if data.len() != count as usize {
            return Err(NdrError::ConformanceMismatch {
                max_count: data.len() as u32,
                actual_count: count,
            });
        }
        Ok(Self { data: data.into_bytes() })
    }

    fn ndr_align() -> usize {
        4
    }
}

/// Nullable interface pointer parameter, `[in] IFoo*` or `[out] IFoo**`
pub type InterfacePtr = Unique<MInterfacePointer>;

/// Wrap an optional OBJREF as an interface pointer parameter.
pub fn marshal_interface(objref: Option<&ObjRef>) -> Result<InterfacePtr> {
    objref.map(MInterfacePointer::from_objref).transpose().map(Unique)
}

/// Unwrap an interface pointer parameter. A null pointer yields `None`.
pub fn unmarshal_interface(ptr: InterfacePtr) -> Result<Option<ObjRef>> {
    ptr.into_option().map(|mip| mip.objref()).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Ipid, Oid, Oxid, DEFAULT_PUBLIC_REFS};
    use uuid::uuid;

    const IID_IHEN: Iid = uuid!("2e1c6f5a-8a3d-4b7e-9f10-6c2d4e8a1b01");

    fn sample() -> ObjRef {
        ObjRef::new(
            IID_IHEN,
            StdObjRef::new(Oxid::new(7), Oid::new(9), Ipid::generate(), DEFAULT_PUBLIC_REFS),
            DualStringArray::with_tcp_binding("127.0.0.1", 4135),
        )
    }

    #[test]
    fn test_objref_starts_with_meow() {
        let objref = sample();
        let bytes = objref.encode().unwrap();
        assert_eq!(&bytes[..4], b"MEOW");
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(ObjRef::decode(&bytes).unwrap(), objref);
    }

    #[test]
    fn test_objref_rejects_other_flavors() {
        let mut bytes = sample().encode().unwrap().to_vec();
        bytes[4..8].copy_from_slice(&objref_flags::OBJREF_CUSTOM.to_le_bytes());
        assert!(matches!(ObjRef::decode(&bytes), Err(DcomError::InvalidObjRef(_))));

        bytes[..4].copy_from_slice(b"WOOF");
        assert!(matches!(ObjRef::decode(&bytes), Err(DcomError::InvalidObjRef(_))));
    }

    #[test]
    fn test_interface_pointer_parameter() {
        let objref = sample();
        let ptr = marshal_interface(Some(&objref)).unwrap();
        let mut writer = NdrWriter::new();
        writer.write(&ptr).unwrap();
        let stub = writer.into_bytes();

        let mut reader = NdrReader::new(&stub);
        let decoded = unmarshal_interface(reader.read().unwrap()).unwrap();
        assert_eq!(decoded, Some(objref));

        let null = marshal_interface(None).unwrap();
        assert!(null.is_null());
        assert_eq!(unmarshal_interface(null).unwrap(), None);
    }
}
