//! DCOM error types

use super::hresult::{self, HResult};
use super::identifiers::{Ipid, Oid};
use comharness_rpc::RpcError;
use thiserror::Error;

/// Result type for DCOM operations
pub type Result<T> = std::result::Result<T, DcomError>;

#[derive(Error, Debug)]
pub enum DcomError {
    /// The call completed and the object answered with a failing HRESULT
    #[error("call failed: {0}")]
    Failed(HResult),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("NDR error: {0}")]
    Ndr(#[from] comharness_ndr::NdrError),

    #[error("invalid OBJREF: {0}")]
    InvalidObjRef(String),

    #[error("invalid string binding: {0}")]
    InvalidStringBinding(String),

    #[error("unknown IPID {0}")]
    UnknownIpid(Ipid),

    #[error("unknown object {0}")]
    UnknownOid(Oid),

    #[error("apartment is shut down")]
    ApartmentShutdown,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DcomError {
    /// HRESULT a COM caller would observe for this error
    pub fn hresult(&self) -> HResult {
        match self {
            DcomError::Failed(hr) => *hr,
            DcomError::Rpc(RpcError::Fault(status)) => HResult(*status),
            DcomError::Rpc(RpcError::Timeout) => hresult::RPC_E_TIMEOUT,
            DcomError::Rpc(e) if e.is_disconnect() => hresult::RPC_E_SERVER_DIED_DNE,
            DcomError::Io(_) => hresult::RPC_E_SERVER_DIED_DNE,
            DcomError::UnknownIpid(_) | DcomError::UnknownOid(_) => hresult::RPC_E_INVALID_IPID,
            DcomError::ApartmentShutdown => hresult::RPC_E_DISCONNECTED,
            DcomError::Ndr(_) => hresult::E_INVALIDARG,
            DcomError::InvalidObjRef(_) | DcomError::InvalidStringBinding(_) => hresult::E_INVALIDARG,
            DcomError::Rpc(_) => hresult::E_FAIL,
        }
    }

    /// The RPC fault a server answers with for this error
    pub fn into_fault(self) -> RpcError {
        RpcError::Fault(self.hresult().code())
    }
}

impl From<HResult> for DcomError {
    fn from(hr: HResult) -> Self {
        DcomError::Failed(hr)
    }
}
