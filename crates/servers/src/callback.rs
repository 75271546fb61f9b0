//! Calling back into client objects

use bytes::Bytes;
use comharness_com::types::unmarshal_interface;
use comharness_com::{hresult, CallFuture, CallResult, DcomError, Iid, InterfacePtr, InterfaceProxy};
use comharness_ndr::NdrReader;
use tracing::debug;

/// Read the single `[in]` interface pointer of `args` and call `opnum` on
/// it. A null pointer is `E_POINTER`; a failing callback fails the call
/// with the callback's status.
pub(crate) async fn call_back(args: Bytes, opnum: u16) -> CallResult {
    let mut reader = NdrReader::new(&args);
    let ptr: InterfacePtr = reader.read()?;
    reader.finish()?;

    let objref = unmarshal_interface(ptr)?.ok_or(DcomError::Failed(hresult::E_POINTER))?;
    let proxy = InterfaceProxy::from_objref(objref)?;
    let result = proxy.invoke(opnum, Bytes::new()).await;
    if let Err(e) = proxy.release().await {
        debug!("releasing callback failed: {}", e);
    }
    result.map(|_| Bytes::new())
}

pub(crate) fn unsupported(iid: &Iid, opnum: u16) -> CallFuture {
    debug!(%iid, opnum, "no such method");
    Box::pin(async { Err(DcomError::Failed(hresult::E_NOTIMPL)) })
}
