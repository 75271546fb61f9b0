//! Connection-oriented RPC server
//!
//! Each accepted connection runs in its own Tokio task and a semaphore caps
//! how many are live at once. A request is dispatched one of two ways:
//!
//! - to a registered [`Interface`], by opnum
//! - to the [`ObjectRouter`], when the request names an object UUID and the
//!   bound interface is one the router claims
//!
//! Shutting the server down closes every live connection, so clients see the
//! association drop rather than hang.

use crate::pdu::{
    fault_status, provider_reason, BindAckPdu, BindPdu, BindResult, ContextResult, FaultPdu,
    Pdu, RequestPdu, ResponsePdu, SyntaxId, DEFAULT_MAX_FRAG, NDR_TRANSFER_SYNTAX,
};
use crate::transport::{PduTransport, DEFAULT_MAX_PDU_SIZE};
use crate::{Result, RpcError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, RwLock, Semaphore};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Operation handler function type
pub type OperationHandler =
    Arc<dyn Fn(Bytes) -> Pin<Box<dyn Future<Output = Result<Bytes>> + Send>> + Send + Sync>;

/// An interface exported by opnum, without object addressing
pub struct Interface {
    pub syntax: SyntaxId,
    operations: HashMap<u16, OperationHandler>,
}

impl Interface {
    pub fn new(uuid: Uuid, major_version: u16, minor_version: u16) -> Self {
        Self::from_syntax(SyntaxId::new(uuid, major_version, minor_version))
    }

    pub fn from_syntax(syntax: SyntaxId) -> Self {
        Self {
            syntax,
            operations: HashMap::new(),
        }
    }

    pub fn register_operation<F, Fut>(&mut self, opnum: u16, handler: F)
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes>> + Send + 'static,
    {
        self.operations
            .insert(opnum, Arc::new(move |args| Box::pin(handler(args))));
    }

    pub fn get_operation(&self, opnum: u16) -> Option<&OperationHandler> {
        self.operations.get(&opnum)
    }
}

/// A request addressed to an object
#[derive(Debug, Clone)]
pub struct ObjectCall {
    /// Object UUID from the request header
    pub object: Uuid,
    /// Abstract syntax the connection bound
    pub interface: Uuid,
    pub opnum: u16,
    pub stub_data: Bytes,
    pub little_endian: bool,
}

/// Routes object-addressed requests.
///
/// Returning `Err(RpcError::Fault(status))` answers the call with a fault PDU
/// carrying `status`. Any other error is reported as an unspecified fault.
#[async_trait]
pub trait ObjectRouter: Send + Sync {
    /// Whether a bind to `interface` should be accepted
    fn supports_interface(&self, interface: &Uuid) -> bool;

    async fn route(&self, call: ObjectCall) -> Result<Bytes>;
}

#[derive(Debug, Clone)]
pub struct DceRpcServerConfig {
    pub max_pdu_size: usize,
    pub max_connections: usize,
    pub max_xmit_frag: u16,
    pub max_recv_frag: u16,
}

impl Default for DceRpcServerConfig {
    fn default() -> Self {
        Self {
            max_pdu_size: DEFAULT_MAX_PDU_SIZE,
            max_connections: 1024,
            max_xmit_frag: DEFAULT_MAX_FRAG,
            max_recv_frag: DEFAULT_MAX_FRAG,
        }
    }
}

type InterfaceMap = Arc<RwLock<HashMap<Uuid, Interface>>>;

pub struct DceRpcServer {
    interfaces: InterfaceMap,
    router: Option<Arc<dyn ObjectRouter>>,
    config: DceRpcServerConfig,
    assoc_group_counter: AtomicU32,
}

impl DceRpcServer {
    pub fn new() -> Self {
        Self::with_config(DceRpcServerConfig::default())
    }

    pub fn with_config(config: DceRpcServerConfig) -> Self {
        Self {
            interfaces: Arc::new(RwLock::new(HashMap::new())),
            router: None,
            config,
            assoc_group_counter: AtomicU32::new(1),
        }
    }

    pub fn with_router(mut self, router: Arc<dyn ObjectRouter>) -> Self {
        self.router = Some(router);
        self
    }

    pub fn config(&self) -> &DceRpcServerConfig {
        &self.config
    }

    pub async fn register_interface(&self, interface: Interface) {
        info!(
            "Registering interface: {} version {}.{}",
            interface.syntax.uuid,
            interface.syntax.major_version(),
            interface.syntax.minor_version()
        );
        self.interfaces
            .write()
            .await
            .insert(interface.syntax.uuid, interface);
    }

    /// Bind `addr` and serve until `shutdown` completes.
    pub async fn run_until<F: Future<Output = ()>>(&self, addr: SocketAddr, shutdown: F) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve connections from an already bound listener until `shutdown`
    /// completes, then close every live connection and wait for them to end.
    pub async fn serve<F: Future<Output = ()>>(&self, listener: TcpListener, shutdown: F) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!(
            "RPC server listening on {} (max_connections: {})",
            local_addr, self.config.max_connections
        );

        let semaphore = Arc::new(Semaphore::new(self.config.max_connections));
        let (closing_tx, closing_rx) = watch::channel(false);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("RPC server on {} shutting down", local_addr);
                    let _ = closing_tx.send(true);
                    let _ = semaphore.acquire_many(self.config.max_connections as u32).await;
                    debug!("All connections closed");
                    return Ok(());
                }

                accepted = listener.accept() => {
                    let (stream, peer_addr) = accepted?;

                    let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                        warn!("Connection limit reached, rejecting connection from {}", peer_addr);
                        drop(stream);
                        continue;
                    };

                    debug!("Accepted connection from {}", peer_addr);
                    let connection = Connection {
                        interfaces: Arc::clone(&self.interfaces),
                        router: self.router.clone(),
                        config: self.config.clone(),
                        assoc_group_id: self.assoc_group_counter.fetch_add(1, Ordering::Relaxed),
                        contexts: HashMap::new(),
                    };
                    let mut closing = closing_rx.clone();

                    tokio::spawn(async move {
                        let _permit = permit;
                        let result = tokio::select! {
                            result = connection.run(stream) => result,
                            _ = closing.wait_for(|closing| *closing) => Ok(()),
                        };
                        match result {
                            Ok(()) | Err(RpcError::ConnectionClosed) => {
                                debug!("Connection closed from {}", peer_addr)
                            }
                            Err(e) => warn!("Connection error from {}: {}", peer_addr, e),
                        }
                    });
                }
            }
        }
    }
}

impl Default for DceRpcServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-connection state
struct Connection {
    interfaces: InterfaceMap,
    router: Option<Arc<dyn ObjectRouter>>,
    config: DceRpcServerConfig,
    assoc_group_id: u32,
    /// Presentation context id to abstract syntax
    contexts: HashMap<u16, Uuid>,
}

impl Connection {
    async fn run(mut self, stream: TcpStream) -> Result<()> {
        stream.set_nodelay(true)?;
        let mut transport = PduTransport::new(stream).with_max_pdu_size(self.config.max_pdu_size);

        loop {
            let reply = match transport.read_pdu_decoded().await? {
                Pdu::Bind(bind) => {
                    debug!(
                        "Received bind: call_id={}, contexts={}",
                        bind.header.call_id,
                        bind.context_list.len()
                    );
                    Pdu::BindAck(self.process_bind(&bind).await)
                }
                Pdu::Request(request) => self.process_request(request).await,
                other => {
                    warn!("Unexpected PDU on server connection: call_id={}", other.call_id());
                    continue;
                }
            };
            transport.write_pdu_encoded(&reply).await?;
        }
    }

    async fn supports(&self, interface: &Uuid) -> bool {
        if self.interfaces.read().await.contains_key(interface) {
            return true;
        }
        self.router
            .as_ref()
            .is_some_and(|router| router.supports_interface(interface))
    }

    async fn process_bind(&mut self, bind: &BindPdu) -> BindAckPdu {
        let mut results = Vec::with_capacity(bind.context_list.len());

        for context in &bind.context_list {
            let interface = context.abstract_syntax.uuid;
            let result = if !self.supports(&interface).await {
                debug!("Rejecting bind to unknown interface {}", interface);
                rejection(provider_reason::ABSTRACT_SYNTAX_NOT_SUPPORTED)
            } else if !context.offers_ndr() {
                rejection(provider_reason::TRANSFER_SYNTAX_NOT_SUPPORTED)
            } else {
                self.contexts.insert(context.context_id, interface);
                BindResult {
                    result: ContextResult::Acceptance,
                    reason: provider_reason::NOT_SPECIFIED,
                    transfer_syntax: NDR_TRANSFER_SYNTAX,
                }
            };
            results.push(result);
        }

        let mut ack = BindAckPdu::new(bind.header.call_id, self.assoc_group_id, results);
        ack.max_xmit_frag = self.config.max_xmit_frag.min(bind.max_recv_frag);
        ack.max_recv_frag = self.config.max_recv_frag.min(bind.max_xmit_frag);
        ack
    }

    async fn process_request(&self, request: RequestPdu) -> Pdu {
        let call_id = request.header.call_id;
        let context_id = request.context_id;
        let fault = |status| Pdu::Fault(FaultPdu::new(call_id, context_id, status));

        let Some(interface) = self.contexts.get(&context_id).copied() else {
            return fault(fault_status::NCA_S_FAULT_CONTEXT_MISMATCH);
        };
        debug!(
            "Received request: call_id={}, opnum={}, stub_len={}",
            call_id,
            request.opnum,
            request.stub_data.len()
        );

        let handler = self
            .interfaces
            .read()
            .await
            .get(&interface)
            .map(|iface| iface.get_operation(request.opnum).cloned());

        let result = match (handler, request.object_uuid, &self.router) {
            (Some(Some(handler)), _, _) => handler(request.stub_data).await,
            (Some(None), _, _) => {
                return Pdu::Fault(
                    FaultPdu::new(call_id, context_id, fault_status::NCA_S_OP_RNG_ERROR).did_not_execute(),
                )
            }
            (None, Some(object), Some(router)) => {
                router
                    .route(ObjectCall {
                        object,
                        interface,
                        opnum: request.opnum,
                        stub_data: request.stub_data,
                        little_endian: request.header.data_rep.is_little_endian(),
                    })
                    .await
            }
            (None, _, _) => return fault(fault_status::NCA_S_UNK_IF),
        };

        match result {
            Ok(stub) => Pdu::Response(ResponsePdu::new(call_id, context_id, stub)),
            Err(RpcError::Fault(status)) => fault(status),
            Err(e) => {
                warn!("Operation error on call {}: {}", call_id, e);
                fault(fault_status::NCA_S_FAULT_UNSPEC)
            }
        }
    }
}

fn rejection(reason: u16) -> BindResult {
    BindResult {
        result: ContextResult::ProviderRejection,
        reason,
        transfer_syntax: SyntaxId::new(Uuid::nil(), 0, 0),
    }
}

/// Builder for creating interfaces with a fluent API
pub struct InterfaceBuilder {
    interface: Interface,
}

impl InterfaceBuilder {
    pub fn new(uuid: Uuid, major_version: u16, minor_version: u16) -> Self {
        Self {
            interface: Interface::new(uuid, major_version, minor_version),
        }
    }

    pub fn from_syntax(syntax: SyntaxId) -> Self {
        Self {
            interface: Interface::from_syntax(syntax),
        }
    }

    pub fn operation<F, Fut>(mut self, opnum: u16, handler: F) -> Self
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Bytes>> + Send + 'static,
    {
        self.interface.register_operation(opnum, handler);
        self
    }

    pub fn build(self) -> Interface {
        self.interface
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DceRpcClient, DceRpcClientBuilder};
    use std::time::Duration;
    use tokio::sync::oneshot;
    use uuid::uuid;

    const ECHO: Uuid = uuid!("6b2f0e7a-3c41-4d8e-a5f0-12c9d3e4b701");
    const OBJECTS: Uuid = uuid!("6b2f0e7a-3c41-4d8e-a5f0-12c9d3e4b702");
    const KNOWN_OBJECT: Uuid = uuid!("6b2f0e7a-3c41-4d8e-a5f0-12c9d3e4b7ff");

    struct TestRouter;

    #[async_trait]
    impl ObjectRouter for TestRouter {
        fn supports_interface(&self, interface: &Uuid) -> bool {
            *interface == OBJECTS
        }

        async fn route(&self, call: ObjectCall) -> Result<Bytes> {
            if call.object != KNOWN_OBJECT {
                return Err(RpcError::Fault(0x8001_0113));
            }
            let mut reply = call.object.as_bytes().to_vec();
            reply.extend_from_slice(&call.stub_data);
            Ok(Bytes::from(reply))
        }
    }

    async fn start() -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<()>) {
        let server = DceRpcServer::new().with_router(Arc::new(TestRouter));
        server
            .register_interface(
                InterfaceBuilder::new(ECHO, 1, 0)
                    .operation(0, |_args| async { Ok(Bytes::new()) })
                    .operation(1, |args: Bytes| async move { Ok(args) })
                    .build(),
            )
            .await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });
        (addr, tx, handle)
    }

    #[test]
    fn test_interface_builder() {
        let interface = InterfaceBuilder::new(ECHO, 1, 0)
            .operation(0, |_args| async { Ok(Bytes::new()) })
            .operation(1, |_args| async { Ok(Bytes::from_static(b"hello")) })
            .build();

        assert!(interface.get_operation(0).is_some());
        assert!(interface.get_operation(1).is_some());
        assert!(interface.get_operation(2).is_none());
    }

    #[tokio::test]
    async fn test_echo_call() {
        let (addr, _stop, _handle) = start().await;
        let client = DceRpcClient::connect(addr, SyntaxId::new(ECHO, 1, 0)).await.unwrap();

        client.null_call().await.unwrap();
        let reply = client.call(1, Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(reply.as_ref(), b"hello");
    }

    #[tokio::test]
    async fn test_unknown_opnum_faults() {
        let (addr, _stop, _handle) = start().await;
        let client = DceRpcClient::connect(addr, SyntaxId::new(ECHO, 1, 0)).await.unwrap();

        let err = client.call(9, Bytes::new()).await.unwrap_err();
        assert!(matches!(err, RpcError::Fault(fault_status::NCA_S_OP_RNG_ERROR)));
    }

    #[tokio::test]
    async fn test_bind_to_unknown_interface_fails() {
        let (addr, _stop, _handle) = start().await;
        let unknown = SyntaxId::new(uuid!("00000000-1111-2222-3333-444444444444"), 1, 0);

        let err = DceRpcClient::connect(addr, unknown).await.err().unwrap();
        assert!(matches!(err, RpcError::BindFailed(_)));
    }

    #[tokio::test]
    async fn test_object_call_is_routed() {
        let (addr, _stop, _handle) = start().await;
        let client = DceRpcClient::connect(addr, SyntaxId::new(OBJECTS, 0, 0)).await.unwrap();

        let reply = client
            .call_object(KNOWN_OBJECT, 3, Bytes::from_static(b"args"))
            .await
            .unwrap();
        assert_eq!(&reply[..16], KNOWN_OBJECT.as_bytes());
        assert_eq!(&reply[16..], b"args");

        let err = client.call_object(Uuid::nil(), 3, Bytes::new()).await.unwrap_err();
        assert!(matches!(err, RpcError::Fault(0x8001_0113)));
    }

    #[tokio::test]
    async fn test_shutdown_closes_live_connections() {
        let (addr, stop, handle) = start().await;
        let client = DceRpcClientBuilder::from_syntax(SyntaxId::new(ECHO, 1, 0))
            .connect_timeout(Duration::from_secs(5))
            .connect(addr)
            .await
            .unwrap();
        client.null_call().await.unwrap();

        stop.send(()).unwrap();
        handle.await.unwrap();

        let err = client.null_call().await.unwrap_err();
        assert!(err.is_disconnect(), "unexpected error: {err}");
    }
}
