//! IRemUnknown client
//!
//! Calls are addressed to the exporter's IRemUnknown IPID, which a client
//! learns from the activation reply.

use super::protocol::*;
use crate::client::rpc_call_error;
use crate::types::{
    decode_response, encode_request, DcomError, HResult, Iid, Ipid, OrpcThis, Result, StdObjRef,
};
use comharness_ndr::Bytes;
use comharness_rpc::{DceRpcClient, DceRpcClientBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

pub struct RemUnknownClient {
    client: DceRpcClient,
    remunknown_ipid: Ipid,
}

impl RemUnknownClient {
    pub async fn connect(addr: SocketAddr, remunknown_ipid: Ipid) -> Result<Self> {
        Self::connect_with_timeout(addr, remunknown_ipid, None).await
    }

    pub async fn connect_with_timeout(
        addr: SocketAddr,
        remunknown_ipid: Ipid,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let mut builder = DceRpcClientBuilder::from_syntax(remunknown_syntax()).call_timeout(timeout);
        if let Some(limit) = timeout {
            builder = builder.connect_timeout(limit);
        }
        let client = builder.connect(addr).await.map_err(rpc_call_error)?;
        Ok(Self { client, remunknown_ipid })
    }

    async fn call(&self, opnum: u16, args: Bytes) -> Result<Bytes> {
        let stub = encode_request(&OrpcThis::new(), &args)?;
        let reply = self
            .client
            .call_object(self.remunknown_ipid.0, opnum, stub)
            .await
            .map_err(rpc_call_error)?;
        decode_response(reply)
    }

    /// Ask the object behind `ipid` for more interfaces, one result per IID.
    pub async fn rem_query_interface(&self, ipid: Ipid, refs: u32, iids: Vec<Iid>) -> Result<Vec<RemQiResult>> {
        let expected = iids.len();
        let args = RemQueryInterfaceRequest::new(ipid, refs, iids).encode()?;
        let results = decode_qi_results(&self.call(opnum::REM_QUERY_INTERFACE, args).await?)?;
        if results.len() != expected {
            return Err(DcomError::Ndr(comharness_ndr::NdrError::ConformanceMismatch {
                max_count: expected as u32,
                actual_count: results.len() as u32,
            }));
        }
        Ok(results)
    }

    /// Query a single interface, turning a failed entry into an error.
    pub async fn query_interface(&self, ipid: Ipid, iid: Iid, refs: u32) -> Result<StdObjRef> {
        let result = self
            .rem_query_interface(ipid, refs, vec![iid])
            .await?
            .into_iter()
            .next()
            .ok_or(DcomError::Failed(crate::types::hresult::E_UNEXPECTED))?;
        match result.std {
            Some(std) if result.hresult.is_success() => Ok(std),
            _ => Err(DcomError::Failed(result.hresult)),
        }
    }

    pub async fn rem_add_ref(&self, refs: Vec<RemInterfaceRef>) -> Result<Vec<HResult>> {
        let args = RemRefsRequest::new(refs).encode()?;
        decode_add_ref_results(&self.call(opnum::REM_ADD_REF, args).await?)
    }

    pub async fn rem_release(&self, refs: Vec<RemInterfaceRef>) -> Result<()> {
        debug!(count = refs.len(), "releasing remote references");
        let args = RemRefsRequest::new(refs).encode()?;
        self.call(opnum::REM_RELEASE, args).await?;
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        self.client.close().await.map_err(DcomError::from)
    }
}
