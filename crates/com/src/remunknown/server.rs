//! IRemUnknown on the server side

use super::protocol::*;
use crate::exporter::ObjectExporter;
use crate::types::{hresult, DcomError, Result};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct RemUnknownServer {
    exporter: Arc<ObjectExporter>,
}

impl RemUnknownServer {
    pub fn new(exporter: Arc<ObjectExporter>) -> Self {
        Self { exporter }
    }

    /// Run one IRemUnknown operation on already unframed in-parameters and
    /// return the out-parameters.
    pub fn handle(&self, opnum: u16, args: Bytes) -> Result<Bytes> {
        match opnum {
            opnum::REM_QUERY_INTERFACE => self.query_interface(&args),
            opnum::REM_ADD_REF => self.add_ref(&args),
            opnum::REM_RELEASE => self.release(&args),
            other => {
                warn!(opnum = other, "unknown IRemUnknown opnum");
                Err(DcomError::Failed(hresult::E_NOTIMPL))
            }
        }
    }

    fn query_interface(&self, args: &[u8]) -> Result<Bytes> {
        let request = RemQueryInterfaceRequest::decode(args)?;
        if self.exporter.lookup_ipid(&request.ipid).is_none() {
            return Err(DcomError::UnknownIpid(request.ipid));
        }

        let results: Vec<RemQiResult> = request
            .iids
            .iter()
            .map(|iid| match self.exporter.query_interface(&request.ipid, iid, request.refs) {
                Ok(std) => RemQiResult::success(std),
                Err(e) => RemQiResult::failure(e.hresult()),
            })
            .collect();
        debug!(ipid = %request.ipid, requested = request.iids.len(), "RemQueryInterface");
        encode_qi_results(&results)
    }

    fn add_ref(&self, args: &[u8]) -> Result<Bytes> {
        let request = RemRefsRequest::decode(args)?;
        let results: Vec<_> = request
            .refs
            .iter()
            .map(|r| match self.exporter.add_refs(&r.ipid, r.public_refs) {
                Ok(_) => hresult::S_OK,
                Err(_) => hresult::E_INVALIDARG,
            })
            .collect();
        encode_add_ref_results(&results)
    }

    fn release(&self, args: &[u8]) -> Result<Bytes> {
        let request = RemRefsRequest::decode(args)?;
        for r in &request.refs {
            match self.exporter.release(&r.ipid, r.public_refs) {
                Ok(remaining) => debug!(ipid = %r.ipid, released = r.public_refs, remaining, "RemRelease"),
                Err(e) => warn!(ipid = %r.ipid, "RemRelease failed: {}", e),
            }
        }
        Ok(Bytes::new())
    }
}
