//! DCOM client
//!
//! [`DcomClient`] activates objects on a server and hands back
//! [`InterfaceProxy`] handles. A proxy owns the public references its
//! STDOBJREF carried and gives them back with `RemRelease` when dropped.

use crate::activation::ActivationClient;
use crate::remunknown::{RemInterfaceRef, RemUnknownClient};
use crate::types::{
    decode_response, encode_request, hresult, Clsid, DcomError, HResult, Iid, Ipid, ObjRef,
    OrpcThis, Result, DEFAULT_PUBLIC_REFS,
};
use bytes::Bytes;
use comharness_rpc::{DceRpcClient, DceRpcClientBuilder, RpcError, SyntaxId, DEFAULT_MAX_PDU_SIZE};
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Map a transport error on an ORPC call to the status a COM caller sees.
pub(crate) fn rpc_call_error(e: RpcError) -> DcomError {
    match e {
        RpcError::Fault(status) => DcomError::Failed(HResult(status)),
        RpcError::Timeout => DcomError::Failed(hresult::RPC_E_TIMEOUT),
        e if e.is_disconnect() => DcomError::Failed(hresult::RPC_E_SERVER_DIED_DNE),
        other => DcomError::Rpc(other),
    }
}

#[derive(Clone, Debug)]
pub struct DcomClientConfig {
    pub connect_timeout: Option<Duration>,
    /// Limit on one ORPC exchange. Unset means calls may block indefinitely.
    pub call_timeout: Option<Duration>,
    pub max_pdu_size: usize,
}

impl Default for DcomClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Some(Duration::from_secs(5)),
            call_timeout: None,
            max_pdu_size: DEFAULT_MAX_PDU_SIZE,
        }
    }
}

impl DcomClientConfig {
    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_max_pdu_size(mut self, max_pdu_size: usize) -> Self {
        self.max_pdu_size = max_pdu_size;
        self
    }
}

/// Client side handle on one remote interface
pub struct InterfaceProxy {
    objref: ObjRef,
    endpoint: SocketAddr,
    config: DcomClientConfig,
    connection: Mutex<Option<Arc<DceRpcClient>>>,
    remunknown_ipid: Ipid,
    released: AtomicBool,
    runtime: Option<Handle>,
}

impl InterfaceProxy {
    /// Proxy for an unmarshaled OBJREF, reached through its first TCP binding.
    pub fn from_objref(objref: ObjRef) -> Result<Self> {
        Self::with_config(objref, DcomClientConfig::default())
    }

    pub fn with_config(objref: ObjRef, config: DcomClientConfig) -> Result<Self> {
        let endpoint = objref.resolver_addr.tcp_endpoint()?;
        Ok(Self {
            objref,
            endpoint,
            config,
            connection: Mutex::new(None),
            remunknown_ipid: Ipid::nil(),
            released: AtomicBool::new(false),
            runtime: Handle::try_current().ok(),
        })
    }

    /// IRemUnknown IPID of the exporter, when activation reported one.
    pub fn with_remunknown_ipid(mut self, ipid: Ipid) -> Self {
        self.remunknown_ipid = ipid;
        self
    }

    pub fn iid(&self) -> Iid {
        self.objref.iid
    }

    pub fn ipid(&self) -> Ipid {
        self.objref.std.ipid
    }

    pub fn objref(&self) -> &ObjRef {
        &self.objref
    }

    pub fn remunknown_ipid(&self) -> Ipid {
        self.remunknown_ipid
    }

    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    async fn connection(&self) -> Result<Arc<DceRpcClient>> {
        let mut slot = self.connection.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        let mut builder = DceRpcClientBuilder::from_syntax(SyntaxId::new(self.objref.iid, 0, 0))
            .call_timeout(self.config.call_timeout)
            .max_pdu_size(self.config.max_pdu_size);
        if let Some(limit) = self.config.connect_timeout {
            builder = builder.connect_timeout(limit);
        }
        let client = builder.connect(self.endpoint).await.map_err(|e| {
            debug!(endpoint = %self.endpoint, iid = %self.objref.iid, error = %e, "connect failed");
            match e {
                RpcError::Fault(status) => DcomError::Failed(HResult(status)),
                RpcError::BindFailed(_) => DcomError::Failed(hresult::E_NOINTERFACE),
                _ => DcomError::Failed(hresult::RPC_E_SERVER_DIED_DNE),
            }
        })?;
        let client = Arc::new(client);
        *slot = Some(client.clone());
        Ok(client)
    }

    /// Whether a connection is open for the next call
    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    async fn reset_connection(&self) {
        self.connection.lock().await.take();
    }

    /// Call `opnum` with NDR-encoded in-parameters and return the
    /// out-parameters. A failing HRESULT is `DcomError::Failed`.
    pub async fn invoke(&self, opnum: u16, args: Bytes) -> Result<Bytes> {
        if self.released.load(Ordering::Acquire) {
            return Err(DcomError::Failed(hresult::RPC_E_DISCONNECTED));
        }

        let client = self.connection().await?;
        let stub = encode_request(&OrpcThis::new(), &args)?;
        trace!(ipid = %self.ipid(), opnum, len = args.len(), "invoking");

        match client.call_object(self.objref.std.ipid.0, opnum, stub).await {
            Ok(reply) => decode_response(reply),
            Err(e) => {
                let disconnected = e.is_disconnect() || matches!(e, RpcError::Timeout);
                let err = rpc_call_error(e);
                if disconnected {
                    // The next call dials again
                    self.reset_connection().await;
                }
                Err(err)
            }
        }
    }

    async fn remunknown(&self) -> Result<RemUnknownClient> {
        RemUnknownClient::connect_with_timeout(self.endpoint, self.remunknown_ipid, self.config.connect_timeout)
            .await
            .map_err(|e| match e {
                DcomError::Rpc(_) => DcomError::Failed(hresult::RPC_E_SERVER_DIED_DNE),
                other => other,
            })
    }

    /// Ask the remote object for another interface.
    pub async fn query_interface(&self, iid: Iid) -> Result<InterfaceProxy> {
        let remunknown = self.remunknown().await?;
        let std = remunknown.query_interface(self.ipid(), iid, DEFAULT_PUBLIC_REFS).await;
        let _ = remunknown.close().await;

        let objref = ObjRef::new(iid, std?, self.objref.resolver_addr.clone());
        Ok(InterfaceProxy::with_config(objref, self.config.clone())?.with_remunknown_ipid(self.remunknown_ipid))
    }

    /// Give the proxy's references back now instead of on drop.
    pub async fn release(self) -> Result<()> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(client) = self.connection.lock().await.take() {
            let _ = client.close().await;
        }
        release_refs(self.endpoint, self.remunknown_ipid, self.ipid(), self.objref.std.public_refs, self.config.connect_timeout)
            .await
    }
}

async fn release_refs(
    endpoint: SocketAddr,
    remunknown_ipid: Ipid,
    ipid: Ipid,
    public_refs: u32,
    timeout: Option<Duration>,
) -> Result<()> {
    if public_refs == 0 {
        return Ok(());
    }
    let remunknown = RemUnknownClient::connect_with_timeout(endpoint, remunknown_ipid, timeout).await?;
    let result = remunknown.rem_release(vec![RemInterfaceRef::new(ipid, public_refs)]).await;
    let _ = remunknown.close().await;
    result
}

impl fmt::Debug for InterfaceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceProxy")
            .field("iid", &self.objref.iid)
            .field("ipid", &self.objref.std.ipid)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Drop for InterfaceProxy {
    fn drop(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        let (endpoint, remunknown_ipid, ipid) = (self.endpoint, self.remunknown_ipid, self.ipid());
        let (public_refs, timeout) = (self.objref.std.public_refs, self.config.connect_timeout);
        runtime.spawn(async move {
            if let Err(e) = release_refs(endpoint, remunknown_ipid, ipid, public_refs, timeout).await {
                debug!(%ipid, error = %e, "release on drop failed");
            }
        });
    }
}

/// Activates remote objects and builds proxies for them.
#[derive(Clone, Debug, Default)]
pub struct DcomClient {
    config: DcomClientConfig,
}

impl DcomClient {
    pub fn new(config: DcomClientConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DcomClientConfig {
        &self.config
    }

    /// Create an instance of `clsid` on `server`, asking for each of `iids`.
    ///
    /// Each entry holds a proxy or the status the server gave that interface.
    pub async fn activate(
        &self,
        server: SocketAddr,
        clsid: Clsid,
        iids: &[Iid],
    ) -> Result<Vec<std::result::Result<InterfaceProxy, HResult>>> {
        let activation = ActivationClient::connect(server, self.config.connect_timeout).await?;
        let response = activation.remote_activation(clsid, iids.to_vec()).await;
        let _ = activation.close().await;
        let response = response?;

        response
            .objrefs(iids)
            .into_iter()
            .map(|entry| -> Result<std::result::Result<InterfaceProxy, HResult>> {
                match entry {
                    Ok(objref) => Ok(Ok(InterfaceProxy::with_config(objref, self.config.clone())?
                        .with_remunknown_ipid(response.remunknown_ipid))),
                    Err(hr) => Ok(Err(hr)),
                }
            })
            .collect()
    }

    /// Create an instance of `clsid` and return its `iid` interface.
    pub async fn create_instance(&self, server: SocketAddr, clsid: Clsid, iid: Iid) -> Result<InterfaceProxy> {
        let mut proxies = self.activate(server, clsid, &[iid]).await?;
        match proxies.pop() {
            Some(Ok(proxy)) => Ok(proxy),
            Some(Err(hr)) => Err(DcomError::Failed(hr)),
            None => {
                warn!(%clsid, "activation returned no interfaces");
                Err(DcomError::Failed(hresult::E_UNEXPECTED))
            }
        }
    }

    pub fn proxy(&self, objref: ObjRef) -> Result<InterfaceProxy> {
        InterfaceProxy::with_config(objref, self.config.clone())
    }
}
