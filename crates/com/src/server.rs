//! DCOM server
//!
//! One TCP listener carries everything a client needs:
//!
//! - `IRemoteActivation`, dispatched by opnum
//! - `IRemUnknown`, addressed to the exporter's IRemUnknown IPID
//! - ORPC calls on exported objects, addressed by IPID
//!
//! Object calls arrive through [`ObjectHost`], which strips ORPCTHIS, finds
//! the IPID and runs the call in the object's apartment.

use crate::activation::ActivationServer;
use crate::apartment::{Apartment, CallDispatcher, ComObject, SinglethreadedApartment};
use crate::exporter::ObjectExporter;
use crate::registry::{ClassRegistry, ThreadingModel};
use crate::remunknown::RemUnknownServer;
use crate::types::{
    decode_request, encode_response, hresult, iid, Clsid, DcomError, DualStringArray, Iid, Ipid,
    ObjRef, Oxid, Result,
};
use async_trait::async_trait;
use bytes::Bytes;
use comharness_rpc::{DceRpcServer, DceRpcServerConfig, ObjectCall, ObjectRouter, DEFAULT_MAX_PDU_SIZE};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

/// Port the `comharness-server` binary listens on by default
pub const DEFAULT_PORT: u16 = 4135;

#[derive(Clone, Debug)]
pub struct DcomServerConfig {
    /// Address to listen on. Port 0 picks a free port.
    pub rpc_addr: SocketAddr,
    pub max_connections: usize,
    pub max_pdu_size: usize,
}

impl Default for DcomServerConfig {
    fn default() -> Self {
        Self {
            rpc_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
            max_connections: 1024,
            max_pdu_size: DEFAULT_MAX_PDU_SIZE,
        }
    }
}

impl DcomServerConfig {
    pub fn new(rpc_addr: SocketAddr) -> Self {
        Self { rpc_addr, ..Self::default() }
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_max_pdu_size(mut self, max_pdu_size: usize) -> Self {
        self.max_pdu_size = max_pdu_size;
        self
    }
}

/// Object side of a server: class registry, exporter and apartments.
///
/// Class factories receive the host so that objects can create and export
/// further objects, the way `PetShop::BuyDog` hands out a new dog.
pub struct ObjectHost {
    registry: Arc<ClassRegistry>,
    exporter: Arc<ObjectExporter>,
    remunknown: RemUnknownServer,
    sta: OnceCell<Arc<dyn Apartment>>,
}

impl ObjectHost {
    pub fn new(registry: Arc<ClassRegistry>, exporter: Arc<ObjectExporter>) -> Arc<Self> {
        Arc::new(Self {
            registry,
            remunknown: RemUnknownServer::new(exporter.clone()),
            exporter,
            sta: OnceCell::new(),
        })
    }

    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    pub fn exporter(&self) -> &Arc<ObjectExporter> {
        &self.exporter
    }

    fn dispatcher(&self) -> &Arc<CallDispatcher> {
        self.exporter.dispatcher()
    }

    /// Apartment for instances of a class with `model`.
    ///
    /// The server owns one STA, created on first use. This needs to run
    /// inside a tokio runtime.
    pub fn apartment_for(&self, model: ThreadingModel) -> Arc<dyn Apartment> {
        match model {
            ThreadingModel::Apartment => self
                .sta
                .get_or_init(|| {
                    let sta: Arc<dyn Apartment> = Arc::new(SinglethreadedApartment::new());
                    self.dispatcher().register_apartment(sta.clone());
                    debug!(apartment = sta.id().0, "created server STA");
                    sta
                })
                .clone(),
            ThreadingModel::Free | ThreadingModel::Both => {
                let mta: Arc<dyn Apartment> = self.dispatcher().default_mta();
                mta
            }
        }
    }

    /// Run the class factory for `clsid`.
    pub fn instantiate(self: &Arc<Self>, clsid: &Clsid) -> Result<(Arc<dyn ComObject>, ThreadingModel)> {
        let entry = self
            .registry
            .lookup(clsid)
            .ok_or(DcomError::Failed(hresult::REGDB_E_CLASSNOTREG))?;
        let object = entry.factory.create_instance(None, self)?;
        Ok((object, entry.threading))
    }

    /// Create an instance of `clsid` and export its `iid` interface.
    pub fn create_instance(self: &Arc<Self>, clsid: &Clsid, iid: Iid) -> Result<ObjRef> {
        let (object, threading) = self.instantiate(clsid)?;
        self.export(object, iid, threading)
    }

    /// Export `object` in the apartment `model` selects.
    pub fn export(&self, object: Arc<dyn ComObject>, iid: Iid, model: ThreadingModel) -> Result<ObjRef> {
        let apartment = self.apartment_for(model);
        self.exporter.marshal(object, iid, &apartment)
    }

    async fn handle_call(&self, call: ObjectCall) -> Result<Bytes> {
        let (orpc_this, args) = decode_request(call.stub_data)?;
        trace!(object = %call.object, opnum = call.opnum, cid = %orpc_this.cid, "ORPC call");

        if call.interface == iid::IREMUNKNOWN {
            return self.remunknown.handle(call.opnum, args);
        }

        let ipid = Ipid(call.object);
        match self.exporter.lookup_ipid(&ipid) {
            Some(entry) if entry.iid != call.interface => {
                warn!(%ipid, bound = %call.interface, exported = %entry.iid, "IPID used on the wrong interface");
                return Err(DcomError::UnknownIpid(ipid));
            }
            Some(_) => {}
            None => return Err(DcomError::UnknownIpid(ipid)),
        }
        self.exporter.dispatch(&ipid, call.opnum, args)?.await
    }
}

#[async_trait]
impl ObjectRouter for ObjectHost {
    fn supports_interface(&self, interface: &uuid::Uuid) -> bool {
        *interface == iid::IREMUNKNOWN || self.exporter.is_exported_iid(interface)
    }

    async fn route(&self, call: ObjectCall) -> comharness_rpc::Result<Bytes> {
        let object = call.object;
        let opnum = call.opnum;
        let reply = match self.handle_call(call).await {
            Ok(outs) => encode_response(&outs, hresult::S_OK),
            Err(DcomError::Failed(hr)) => {
                debug!(%object, opnum, %hr, "call returned failure");
                encode_response(&[], hr)
            }
            Err(e) => {
                debug!(%object, opnum, "call faulted: {}", e);
                return Err(e.into_fault());
            }
        };
        reply.map_err(DcomError::into_fault)
    }
}

/// A listening DCOM server
pub struct DcomServer {
    local_addr: SocketAddr,
    host: Arc<ObjectHost>,
    rpc: Arc<DceRpcServer>,
    listener: Mutex<Option<TcpListener>>,
    closing: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DcomServer {
    /// Bind the listener and prepare the server. Nothing is accepted until
    /// [`spawn`](Self::spawn) or [`run_until`](Self::run_until).
    pub async fn bind(config: DcomServerConfig, registry: Arc<ClassRegistry>) -> Result<Self> {
        let listener = TcpListener::bind(config.rpc_addr).await?;
        let local_addr = listener.local_addr()?;

        let exporter = Arc::new(ObjectExporter::new(
            DualStringArray::for_socket_addr(local_addr),
            Arc::new(CallDispatcher::new()),
        ));
        let host = ObjectHost::new(registry, exporter);

        let rpc_config = DceRpcServerConfig {
            max_pdu_size: config.max_pdu_size,
            max_connections: config.max_connections,
            ..DceRpcServerConfig::default()
        };
        let rpc = DceRpcServer::with_config(rpc_config).with_router(host.clone());
        rpc.register_interface(ActivationServer::new(host.clone()).build_interface())
            .await;

        info!(%local_addr, oxid = %host.exporter().oxid(), classes = host.registry().len(), "DCOM server bound");
        let (closing, _) = watch::channel(false);
        Ok(Self {
            local_addr,
            host,
            rpc: Arc::new(rpc),
            listener: Mutex::new(Some(listener)),
            closing,
            task: Mutex::new(None),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn host(&self) -> &Arc<ObjectHost> {
        &self.host
    }

    pub fn exporter(&self) -> &Arc<ObjectExporter> {
        self.host.exporter()
    }

    pub fn oxid(&self) -> Oxid {
        self.exporter().oxid()
    }

    pub fn bindings(&self) -> &DualStringArray {
        self.exporter().bindings()
    }

    fn take_listener(&self) -> Result<TcpListener> {
        self.listener
            .lock()
            .take()
            .ok_or_else(|| DcomError::Io(io::Error::new(io::ErrorKind::AddrInUse, "server is already serving")))
    }

    fn closed_signal(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut closing = self.closing.subscribe();
        async move {
            let _ = closing.wait_for(|closing| *closing).await;
        }
    }

    /// Serve in a background task until [`shutdown`](Self::shutdown).
    pub fn spawn(&self) -> Result<()> {
        let listener = self.take_listener()?;
        let rpc = self.rpc.clone();
        let closed = self.closed_signal();
        let local_addr = self.local_addr;
        let task = tokio::spawn(async move {
            if let Err(e) = rpc.serve(listener, closed).await {
                warn!(%local_addr, "DCOM server stopped: {}", e);
            }
        });
        *self.task.lock() = Some(task);
        Ok(())
    }

    /// Serve on the current task until `signal` completes or
    /// [`shutdown`](Self::shutdown) is called, then shut the apartments down.
    pub async fn run_until<F: Future<Output = ()>>(&self, signal: F) -> Result<()> {
        let listener = self.take_listener()?;
        let closed = self.closed_signal();
        let stop = async move {
            tokio::select! {
                _ = signal => {}
                _ = closed => {}
            }
        };
        let served = self.rpc.serve(listener, stop).await;
        self.host.dispatcher().shutdown();
        served.map_err(DcomError::from)
    }

    /// Disconnect every client and shut the apartments down.
    ///
    /// Proxies held by clients fail afterwards with `RPC_E_SERVER_DIED_DNE`.
    pub async fn shutdown(&self) {
        self.closing.send_replace(true);
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("DCOM server task failed: {}", e);
            }
        }
        self.host.dispatcher().shutdown();
        info!(local_addr = %self.local_addr, "DCOM server shut down");
    }
}

impl Drop for DcomServer {
    fn drop(&mut self) {
        self.closing.send_replace(true);
    }
}
