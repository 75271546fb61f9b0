//! RemoteActivation wire format
//!
//! ```text
//! request:  ORPCTHIS, clsid, client_imp_level u32, mode u32,
//!           iid_count u32, iids[iid_count]
//! response: ORPCTHAT, oxid, DUALSTRINGARRAY, remunknown ipid,
//!           authn_hint u32, server_version, hr u32,
//!           result_count u32, { hr u32, [unique] STDOBJREF }[result_count]
//! ```
//!
//! The reply carries its own HRESULT after the ORPC header rather than as a
//! trailing status, so a failed activation is still a well-formed response.

use crate::types::{
    iid, ComVersion, DcomError, DualStringArray, HResult, Iid, Ipid, OrpcThat, OrpcThis, Oxid,
    Result, StdObjRef,
};
use comharness_ndr::{Bytes, NdrReader, NdrWriter, Unique};
use comharness_rpc::SyntaxId;
use uuid::Uuid;

pub const ACTIVATION_VERSION: (u16, u16) = (0, 0);

/// Requests asking for more interfaces than this are rejected
pub const MAX_REQUESTED_INTERFACES: u32 = 256;

pub mod opnum {
    pub const REMOTE_ACTIVATION: u16 = 0;
}

pub mod mode {
    pub const CLSCTX_LOCAL_SERVER: u32 = 0x0000_0004;
    pub const CLSCTX_REMOTE_SERVER: u32 = 0x0000_0010;
}

/// RPC_C_IMP_LEVEL_IDENTIFY
const IMP_LEVEL_IDENTIFY: u32 = 2;

pub fn activation_syntax() -> SyntaxId {
    SyntaxId::new(iid::IACTIVATION, ACTIVATION_VERSION.0, ACTIVATION_VERSION.1)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteActivationRequest {
    pub orpc_this: OrpcThis,
    pub clsid: Uuid,
    pub client_imp_level: u32,
    pub mode: u32,
    pub interfaces: Vec<Iid>,
}

impl RemoteActivationRequest {
    pub fn new(clsid: Uuid, interfaces: Vec<Iid>) -> Self {
        Self {
            orpc_this: OrpcThis::new(),
            clsid,
            client_imp_level: IMP_LEVEL_IDENTIFY,
            mode: mode::CLSCTX_REMOTE_SERVER,
            interfaces,
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let count = u32::try_from(self.interfaces.len())
            .map_err(|_| comharness_ndr::NdrError::IntegerOverflow)?;
        let mut writer = NdrWriter::new();
        writer
            .write(&self.orpc_this)?
            .write(&self.clsid)?
            .write(&self.client_imp_level)?
            .write(&self.mode)?
            .write(&count)?;
        for iid in &self.interfaces {
            writer.write(iid)?;
        }
        Ok(writer.into_bytes())
    }

    pub fn decode(stub: &[u8]) -> Result<Self> {
        let mut reader = NdrReader::new(stub);
        let orpc_this = reader.read()?;
        let clsid = reader.read()?;
        let client_imp_level = reader.read()?;
        let mode = reader.read()?;
        let count: u32 = reader.read()?;
        if count > MAX_REQUESTED_INTERFACES {
            return Err(DcomError::Failed(crate::types::hresult::E_INVALIDARG));
        }
        let interfaces = (0..count).map(|_| reader.read()).collect::<comharness_ndr::Result<Vec<Iid>>>()?;
        reader.finish()?;
        Ok(Self { orpc_this, clsid, client_imp_level, mode, interfaces })
    }
}

/// Outcome for one requested interface
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceResult {
    pub hresult: HResult,
    pub std: Option<StdObjRef>,
}

impl InterfaceResult {
    pub fn success(std: StdObjRef) -> Self {
        Self { hresult: crate::types::hresult::S_OK, std: Some(std) }
    }

    pub fn failure(hresult: HResult) -> Self {
        Self { hresult, std: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteActivationResponse {
    pub orpc_that: OrpcThat,
    pub oxid: Oxid,
    pub bindings: DualStringArray,
    pub remunknown_ipid: Ipid,
    pub authn_hint: u32,
    pub server_version: ComVersion,
    pub hresult: HResult,
    pub interface_results: Vec<InterfaceResult>,
}

impl RemoteActivationResponse {
    pub fn success(
        oxid: Oxid,
        bindings: DualStringArray,
        remunknown_ipid: Ipid,
        interface_results: Vec<InterfaceResult>,
    ) -> Self {
        Self {
            orpc_that: OrpcThat::new(),
            oxid,
            bindings,
            remunknown_ipid,
            authn_hint: 0,
            server_version: ComVersion::DCOM_5_7,
            hresult: crate::types::hresult::S_OK,
            interface_results,
        }
    }

    /// A failed activation still names the exporter that answered
    pub fn failure(oxid: Oxid, bindings: DualStringArray, hresult: HResult) -> Self {
        Self {
            hresult,
            ..Self::success(oxid, bindings, Ipid::nil(), Vec::new())
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let count = u32::try_from(self.interface_results.len())
            .map_err(|_| comharness_ndr::NdrError::IntegerOverflow)?;
        let mut writer = NdrWriter::new();
        writer
            .write(&self.orpc_that)?
            .write(&self.oxid)?
            .write(&self.bindings)?
            .write(&self.remunknown_ipid)?
            .write(&self.authn_hint)?
            .write(&self.server_version)?
            .write(&self.hresult.code())?
            .write(&count)?;
        for result in &self.interface_results {
            writer
                .write(&result.hresult.code())?
                .write(&Unique(result.std.clone()))?;
        }
        Ok(writer.into_bytes())
    }

    pub fn decode(stub: &[u8]) -> Result<Self> {
        let mut reader = NdrReader::new(stub);
        let orpc_that = reader.read()?;
        let oxid = reader.read()?;
        let bindings = reader.read()?;
        let remunknown_ipid = reader.read()?;
        let authn_hint = reader.read()?;
        let server_version = reader.read()?;
        let hresult = HResult(reader.read()?);
        let count: u32 = reader.read()?;
        if count > MAX_REQUESTED_INTERFACES {
            return Err(DcomError::InvalidObjRef(format!("{count} interface results")));
        }

        let mut interface_results = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let hresult = HResult(reader.read()?);
            let std: Unique<StdObjRef> = reader.read()?;
            interface_results.push(InterfaceResult { hresult, std: std.into_option() });
        }
        reader.finish()?;

        Ok(Self {
            orpc_that,
            oxid,
            bindings,
            remunknown_ipid,
            authn_hint,
            server_version,
            hresult,
            interface_results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{hresult, Oid, DEFAULT_PUBLIC_REFS};
    use uuid::uuid;

    const CLSID_HEN: Uuid = uuid!("9eedb943-b267-4f0c-b8b6-59fe3851f239");

    #[test]
    fn test_request_decode() {
        let iids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let request = RemoteActivationRequest::new(CLSID_HEN, iids.clone());
        let decoded = RemoteActivationRequest::decode(&request.encode().unwrap()).unwrap();
        assert_eq!(decoded.clsid, CLSID_HEN);
        assert_eq!(decoded.interfaces, iids);
    }

    #[test]
    fn test_response_with_mixed_results() {
        let std = StdObjRef::new(Oxid::new(1), Oid::new(2), Ipid::generate(), DEFAULT_PUBLIC_REFS);
        let response = RemoteActivationResponse::success(
            Oxid::new(1),
            DualStringArray::with_tcp_binding("127.0.0.1", 4135),
            Ipid::generate(),
            vec![InterfaceResult::success(std), InterfaceResult::failure(hresult::E_NOINTERFACE)],
        );
        let decoded = RemoteActivationResponse::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_failed_activation_round_trips_status() {
        let response = RemoteActivationResponse::failure(
            Oxid::new(3),
            DualStringArray::new(),
            hresult::REGDB_E_CLASSNOTREG,
        );
        let decoded = RemoteActivationResponse::decode(&response.encode().unwrap()).unwrap();
        assert_eq!(decoded.hresult, hresult::REGDB_E_CLASSNOTREG);
        assert!(decoded.interface_results.is_empty());
    }
}
