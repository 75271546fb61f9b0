//! Connection-oriented RPC client
//!
//! One client owns one TCP association bound to one interface. Calls are
//! serialized over the connection: a request is written and its response read
//! while the transport lock is held, so replies can never be crossed.

use crate::pdu::{
    reject_reason, BindPdu, Pdu, RequestPdu, SyntaxId, DEFAULT_MAX_FRAG,
};
use crate::transport::{PduTransport, DEFAULT_MAX_PDU_SIZE};
use crate::{Result, RpcError};
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

pub struct DceRpcClient {
    transport: Mutex<PduTransport<TcpStream>>,
    call_id: AtomicU32,
    interface: SyntaxId,
    context_id: u16,
    max_xmit_frag: u16,
    call_timeout: Option<Duration>,
}

impl DceRpcClient {
    /// Connect to `addr` and bind `interface` with default settings.
    pub async fn connect(addr: SocketAddr, interface: SyntaxId) -> Result<Self> {
        DceRpcClientBuilder::from_syntax(interface).connect(addr).await
    }

    /// Bind `interface` over an already connected stream.
    pub async fn from_stream(stream: TcpStream, interface: SyntaxId) -> Result<Self> {
        DceRpcClientBuilder::from_syntax(interface).bind_stream(stream).await
    }

    pub fn interface(&self) -> &SyntaxId {
        &self.interface
    }

    pub fn max_xmit_frag(&self) -> u16 {
        self.max_xmit_frag
    }

    fn next_call_id(&self) -> u32 {
        self.call_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Invoke `opnum` on the bound interface.
    pub async fn call(&self, opnum: u16, stub_data: Bytes) -> Result<Bytes> {
        let request = RequestPdu::new(self.next_call_id(), opnum, stub_data);
        self.send_request(request).await
    }

    /// Invoke `opnum` on the interface instance named by `object`.
    ///
    /// The object UUID travels in the request header, which is how ORPC
    /// addresses an IPID.
    pub async fn call_object(&self, object: Uuid, opnum: u16, stub_data: Bytes) -> Result<Bytes> {
        let request = RequestPdu::new(self.next_call_id(), opnum, stub_data).with_object(object);
        self.send_request(request).await
    }

    /// Invoke opnum 0 with no arguments.
    pub async fn null_call(&self) -> Result<()> {
        self.call(0, Bytes::new()).await?;
        Ok(())
    }

    async fn send_request(&self, mut request: RequestPdu) -> Result<Bytes> {
        request.context_id = self.context_id;
        let call_id = request.header.call_id;
        let encoded = request.encode()?;
        if encoded.len() > self.max_xmit_frag as usize {
            return Err(RpcError::PduTooLarge {
                size: encoded.len(),
                max: self.max_xmit_frag as usize,
            });
        }

        trace!(call_id, opnum = request.opnum, stub_len = request.stub_data.len(), "sending request");

        let exchange = async {
            let mut transport = self.transport.lock().await;
            transport.write_pdu(&encoded).await?;
            receive_response(&mut transport, call_id).await
        };

        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, exchange)
                .await
                .map_err(|_| RpcError::Timeout)?,
            None => exchange.await,
        }
    }

    /// Half-close the connection.
    pub async fn close(&self) -> Result<()> {
        self.transport.lock().await.shutdown().await
    }
}

async fn receive_response(transport: &mut PduTransport<TcpStream>, call_id: u32) -> Result<Bytes> {
    match transport.read_pdu_decoded().await? {
        Pdu::Response(response) => {
            if response.header.call_id != call_id {
                return Err(RpcError::CallIdMismatch {
                    expected: call_id,
                    got: response.header.call_id,
                });
            }
            Ok(response.stub_data)
        }
        Pdu::Fault(fault) => {
            debug!(call_id, status = format_args!("0x{:08x}", fault.status), "call faulted");
            Err(RpcError::Fault(fault.status))
        }
        other => Err(RpcError::InvalidPduData(format!(
            "expected response for call {call_id}, got {other:?}"
        ))),
    }
}

/// Builder for a [`DceRpcClient`]
pub struct DceRpcClientBuilder {
    interface: SyntaxId,
    connect_timeout: Option<Duration>,
    call_timeout: Option<Duration>,
    max_pdu_size: usize,
}

impl DceRpcClientBuilder {
    pub fn new(uuid: Uuid, major_version: u16, minor_version: u16) -> Self {
        Self::from_syntax(SyntaxId::new(uuid, major_version, minor_version))
    }

    pub fn from_syntax(interface: SyntaxId) -> Self {
        Self {
            interface,
            connect_timeout: None,
            call_timeout: None,
            max_pdu_size: DEFAULT_MAX_PDU_SIZE,
        }
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Limit on one request/response exchange. Unset by default.
    pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn max_pdu_size(mut self, size: usize) -> Self {
        self.max_pdu_size = size;
        self
    }

    pub async fn connect(self, addr: SocketAddr) -> Result<DceRpcClient> {
        let stream = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, TcpStream::connect(addr))
                .await
                .map_err(|_| RpcError::Timeout)??,
            None => TcpStream::connect(addr).await?,
        };
        stream.set_nodelay(true)?;
        debug!(%addr, interface = %self.interface.uuid, "connected");
        self.bind_stream(stream).await
    }

    async fn bind_stream(self, stream: TcpStream) -> Result<DceRpcClient> {
        let mut transport = PduTransport::new(stream).with_max_pdu_size(self.max_pdu_size);
        let call_id = 1;
        let bind = BindPdu::new(call_id, self.interface);
        let context_id = bind.context_list[0].context_id;
        transport.write_pdu(&bind.encode()?).await?;

        let max_xmit_frag = match transport.read_pdu_decoded().await? {
            Pdu::BindAck(ack) => {
                if ack.header.call_id != call_id {
                    return Err(RpcError::CallIdMismatch {
                        expected: call_id,
                        got: ack.header.call_id,
                    });
                }
                if !ack.accepted(0) {
                    let reason = ack.results.first().map(|r| r.reason).unwrap_or_default();
                    return Err(RpcError::BindFailed(format!(
                        "interface {} rejected (provider reason {})",
                        self.interface.uuid, reason
                    )));
                }
                ack.max_recv_frag.min(DEFAULT_MAX_FRAG)
            }
            Pdu::BindNak(nak) => {
                let reason = match nak.reject_reason {
                    reject_reason::PROTOCOL_VERSION_NOT_SUPPORTED => "protocol version not supported".to_string(),
                    other => format!("reject reason {other}"),
                };
                return Err(RpcError::BindFailed(reason));
            }
            other => {
                return Err(RpcError::InvalidPduData(format!(
                    "expected bind_ack, got {other:?}"
                )))
            }
        };

        debug!(interface = %self.interface.uuid, max_xmit_frag, "bound");

        Ok(DceRpcClient {
            transport: Mutex::new(transport),
            call_id: AtomicU32::new(call_id + 1),
            interface: self.interface,
            context_id,
            max_xmit_frag,
            call_timeout: self.call_timeout,
        })
    }
}
