//! IRemoteActivation client

use super::protocol::*;
use crate::client::rpc_call_error;
use crate::types::{hresult, DcomError, HResult, Iid, ObjRef, Result};
use comharness_rpc::{DceRpcClient, DceRpcClientBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

pub struct ActivationClient {
    client: DceRpcClient,
}

impl ActivationClient {
    /// Connect to the server's activation endpoint.
    ///
    /// A server that cannot be reached reports `CO_E_SERVER_EXEC_FAILURE`,
    /// the status an activation request gets when no server is running.
    pub async fn connect(addr: SocketAddr, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = DceRpcClientBuilder::from_syntax(activation_syntax()).call_timeout(timeout);
        if let Some(limit) = timeout {
            builder = builder.connect_timeout(limit);
        }
        let client = builder.connect(addr).await.map_err(|e| {
            debug!(%addr, error = %e, "activation endpoint unreachable");
            match e {
                e if e.is_disconnect() => DcomError::Failed(hresult::CO_E_SERVER_EXEC_FAILURE),
                comharness_rpc::RpcError::Timeout => DcomError::Failed(hresult::CO_E_SERVER_EXEC_FAILURE),
                other => DcomError::Rpc(other),
            }
        })?;
        Ok(Self { client })
    }

    /// Create an instance of `clsid` and ask for `iids` on it.
    ///
    /// A failed activation is an error. Per-interface failures are left in
    /// the response for the caller to inspect.
    pub async fn remote_activation(&self, clsid: Uuid, iids: Vec<Iid>) -> Result<RemoteActivationResponse> {
        let request = RemoteActivationRequest::new(clsid, iids);
        let reply = self
            .client
            .call(opnum::REMOTE_ACTIVATION, request.encode()?)
            .await
            .map_err(rpc_call_error)?;
        let response = RemoteActivationResponse::decode(&reply)?;

        if response.hresult.is_failure() {
            debug!(%clsid, hr = %response.hresult, "activation refused");
            return Err(DcomError::Failed(response.hresult));
        }
        info!(%clsid, oxid = %response.oxid, interfaces = response.interface_results.len(), "activated");
        Ok(response)
    }

    pub async fn close(&self) -> Result<()> {
        self.client.close().await.map_err(DcomError::from)
    }
}

impl RemoteActivationResponse {
    /// Pair each requested IID with its OBJREF or its failure status.
    pub fn objrefs(&self, iids: &[Iid]) -> Vec<std::result::Result<ObjRef, HResult>> {
        iids.iter()
            .enumerate()
            .map(|(i, iid)| match self.interface_results.get(i) {
                Some(InterfaceResult { hresult, std: Some(std) }) if hresult.is_success() => {
                    Ok(ObjRef::new(*iid, std.clone(), self.bindings.clone()))
                }
                Some(result) if result.hresult.is_failure() => Err(result.hresult),
                _ => Err(hresult::E_UNEXPECTED),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DualStringArray, Ipid, Oid, Oxid, StdObjRef, DEFAULT_PUBLIC_REFS};

    #[test]
    fn test_objrefs_pairs_iids_with_results() {
        let std = StdObjRef::new(Oxid::new(1), Oid::new(2), Ipid::generate(), DEFAULT_PUBLIC_REFS);
        let bindings = DualStringArray::with_tcp_binding("127.0.0.1", 4135);
        let response = RemoteActivationResponse::success(
            Oxid::new(1),
            bindings.clone(),
            Ipid::generate(),
            vec![InterfaceResult::success(std.clone()), InterfaceResult::failure(hresult::E_NOINTERFACE)],
        );
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let objrefs = response.objrefs(&[first, second]);
        let objref = objrefs[0].as_ref().unwrap();
        assert_eq!(objref.iid, first);
        assert_eq!(objref.std, std);
        assert_eq!(objref.resolver_addr, bindings);
        assert_eq!(objrefs[1], Err(hresult::E_NOINTERFACE));
    }

    #[tokio::test]
    async fn test_connect_refused_is_exec_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = ActivationClient::connect(addr, Some(Duration::from_secs(2))).await.err().unwrap();
        assert_eq!(err.hresult(), hresult::CO_E_SERVER_EXEC_FAILURE);
    }
}
