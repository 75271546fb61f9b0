//! IRemUnknown in- and out-parameters
//!
//! These are the parameters only. ORPCTHIS, ORPCTHAT and the trailing
//! HRESULT are added by the ORPC framing in [`crate::types`].
//!
//! ```text
//! RemQueryInterface  in:  ripid, cRefs u32, cIids u16, iids[cIids]
//!                    out: count u32, { hr u32, [unique] STDOBJREF }[count]
//! RemAddRef          in:  count u16, REMINTERFACEREF[count]
//!                    out: count u32, hr u32[count]
//! RemRelease         in:  count u16, REMINTERFACEREF[count]
//! ```

use crate::types::{iid, DcomError, HResult, Iid, Ipid, Result, StdObjRef};
use comharness_ndr::{
    Buf, BufMut, Bytes, NdrContext, NdrDecode, NdrEncode, NdrReader, NdrWriter, Unique,
};
use comharness_rpc::SyntaxId;

pub const REMUNKNOWN_VERSION: (u16, u16) = (0, 0);

/// Larger batches are refused rather than allocated
pub const MAX_BATCH: usize = 1024;

pub mod opnum {
    pub const REM_QUERY_INTERFACE: u16 = 3;
    pub const REM_ADD_REF: u16 = 4;
    pub const REM_RELEASE: u16 = 5;
}

pub fn remunknown_syntax() -> SyntaxId {
    SyntaxId::new(iid::IREMUNKNOWN, REMUNKNOWN_VERSION.0, REMUNKNOWN_VERSION.1)
}

fn batch_len(count: u32) -> Result<usize> {
    let count = count as usize;
    if count > MAX_BATCH {
        return Err(DcomError::Failed(crate::types::hresult::E_INVALIDARG));
    }
    Ok(count)
}

fn read_batch<T: NdrDecode>(reader: &mut NdrReader<'_>, count: usize) -> Result<Vec<T>> {
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(reader.read()?);
    }
    Ok(items)
}

/// REMQIRESULT
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemQiResult {
    pub hresult: HResult,
    pub std: Option<StdObjRef>,
}

impl RemQiResult {
    pub fn success(std: StdObjRef) -> Self {
        Self { hresult: crate::types::hresult::S_OK, std: Some(std) }
    }

    pub fn failure(hresult: HResult) -> Self {
        Self { hresult, std: None }
    }
}

impl NdrEncode for RemQiResult {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<()> {
        self.hresult.code().ndr_encode(buf, ctx, position)?;
        Unique(self.std.clone()).ndr_encode(buf, ctx, position)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for RemQiResult {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<Self> {
        let hresult = HResult(u32::ndr_decode(buf, ctx, position)?);
        let std = Unique::<StdObjRef>::ndr_decode(buf, ctx, position)?.into_option();
        Ok(Self { hresult, std })
    }

    fn ndr_align() -> usize {
        4
    }
}

/// REMINTERFACEREF
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RemInterfaceRef {
    pub ipid: Ipid,
    pub public_refs: u32,
    pub private_refs: u32,
}

impl RemInterfaceRef {
    pub const SIZE: usize = 24;

    pub fn new(ipid: Ipid, public_refs: u32) -> Self {
        Self { ipid, public_refs, private_refs: 0 }
    }
}

impl NdrEncode for RemInterfaceRef {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<()> {
        self.ipid.ndr_encode(buf, ctx, position)?;
        self.public_refs.ndr_encode(buf, ctx, position)?;
        self.private_refs.ndr_encode(buf, ctx, position)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for RemInterfaceRef {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<Self> {
        Ok(Self {
            ipid: Ipid::ndr_decode(buf, ctx, position)?,
            public_refs: u32::ndr_decode(buf, ctx, position)?,
            private_refs: u32::ndr_decode(buf, ctx, position)?,
        })
    }

    fn ndr_align() -> usize {
        4
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemQueryInterfaceRequest {
    pub ipid: Ipid,
    pub refs: u32,
    pub iids: Vec<Iid>,
}

impl RemQueryInterfaceRequest {
    pub fn new(ipid: Ipid, refs: u32, iids: Vec<Iid>) -> Self {
        Self { ipid, refs, iids }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let count = u16::try_from(self.iids.len()).map_err(|_| comharness_ndr::NdrError::IntegerOverflow)?;
        let mut writer = NdrWriter::new();
        writer
            .write(&self.ipid)?
            .write(&self.refs)?
            .write(&count)?
            .write(&u32::from(count))?;
        for iid in &self.iids {
            writer.write(iid)?;
        }
        Ok(writer.into_bytes())
    }

    pub fn decode(args: &[u8]) -> Result<Self> {
        let mut reader = NdrReader::new(args);
        let ipid = reader.read()?;
        let refs = reader.read()?;
        let count: u16 = reader.read()?;
        let max_count: u32 = reader.read()?;
        if max_count != u32::from(count) {
            return Err(comharness_ndr::NdrError::ConformanceMismatch {
                max_count,
                actual_count: u32::from(count),
            }
            .into());
        }
        let iids = read_batch(&mut reader, batch_len(max_count)?)?;
        reader.finish()?;
        Ok(Self { ipid, refs, iids })
    }
}

pub fn encode_qi_results(results: &[RemQiResult]) -> Result<Bytes> {
    let count = u32::try_from(results.len()).map_err(|_| comharness_ndr::NdrError::IntegerOverflow)?;
    let mut writer = NdrWriter::new();
    writer.write(&count)?;
    for result in results {
        writer.write(result)?;
    }
    Ok(writer.into_bytes())
}

pub fn decode_qi_results(outs: &[u8]) -> Result<Vec<RemQiResult>> {
    let mut reader = NdrReader::new(outs);
    let count: u32 = reader.read()?;
    let results = read_batch(&mut reader, batch_len(count)?)?;
    reader.finish()?;
    Ok(results)
}

/// In-parameters shared by RemAddRef and RemRelease
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemRefsRequest {
    pub refs: Vec<RemInterfaceRef>,
}

impl RemRefsRequest {
    pub fn new(refs: Vec<RemInterfaceRef>) -> Self {
        Self { refs }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let count = u16::try_from(self.refs.len()).map_err(|_| comharness_ndr::NdrError::IntegerOverflow)?;
        let mut writer = NdrWriter::new();
        writer.write(&count)?.write(&u32::from(count))?;
        for r in &self.refs {
            writer.write(r)?;
        }
        Ok(writer.into_bytes())
    }

    pub fn decode(args: &[u8]) -> Result<Self> {
        let mut reader = NdrReader::new(args);
        let count: u16 = reader.read()?;
        let max_count: u32 = reader.read()?;
        if max_count != u32::from(count) {
            return Err(comharness_ndr::NdrError::ConformanceMismatch {
                max_count,
                actual_count: u32::from(count),
            }
            .into());
        }
        let refs = read_batch(&mut reader, batch_len(max_count)?)?;
        reader.finish()?;
        Ok(Self { refs })
    }
}

pub fn encode_add_ref_results(results: &[HResult]) -> Result<Bytes> {
    let count = u32::try_from(results.len()).map_err(|_| comharness_ndr::NdrError::IntegerOverflow)?;
    let mut writer = NdrWriter::new();
    writer.write(&count)?;
    for hr in results {
        writer.write(&hr.code())?;
    }
    Ok(writer.into_bytes())
}

pub fn decode_add_ref_results(outs: &[u8]) -> Result<Vec<HResult>> {
    let mut reader = NdrReader::new(outs);
    let count: u32 = reader.read()?;
    let codes: Vec<u32> = read_batch(&mut reader, batch_len(count)?)?;
    reader.finish()?;
    Ok(codes.into_iter().map(HResult).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{hresult, Oid, Oxid};
    use uuid::Uuid;

    #[test]
    fn test_query_interface_request() {
        let request = RemQueryInterfaceRequest::new(Ipid::generate(), 5, vec![Uuid::new_v4(), Uuid::new_v4()]);
        let decoded = RemQueryInterfaceRequest::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_qi_results_keep_failures() {
        let std = StdObjRef::new(Oxid::new(1), Oid::new(2), Ipid::generate(), 5);
        let results = vec![RemQiResult::failure(hresult::E_NOINTERFACE), RemQiResult::success(std)];
        let decoded = decode_qi_results(&encode_qi_results(&results).unwrap()).unwrap();
        assert_eq!(decoded, results);
        assert!(decoded[0].std.is_none());
    }

    #[test]
    fn test_refs_request_rejects_count_mismatch() {
        let request = RemRefsRequest::new(vec![RemInterfaceRef::new(Ipid::generate(), 5)]);
        let mut bytes = request.encode().unwrap().to_vec();
        assert_eq!(bytes.len(), 8 + RemInterfaceRef::SIZE);
        assert_eq!(RemRefsRequest::decode(&bytes).unwrap(), request);

        bytes[4] = 2;
        assert!(RemRefsRequest::decode(&bytes).is_err());
    }
}
