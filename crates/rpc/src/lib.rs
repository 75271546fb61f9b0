//! DCE/RPC connection-oriented client and server
//!
//! This crate carries the RPC layer the COM runtime sits on: the v5.0
//! connection-oriented PDUs, single-fragment framing over TCP, a client bound
//! to one interface, and a server that dispatches either by opnum or, for
//! object-addressed requests, through an [`ObjectRouter`].
//!
//! # Example
//!
//! ```no_run
//! use comharness_rpc::{DceRpcClient, DceRpcServer, InterfaceBuilder, SyntaxId};
//! use bytes::Bytes;
//! use uuid::uuid;
//!
//! # async fn demo() -> comharness_rpc::Result<()> {
//! let echo = uuid!("12345678-1234-1234-1234-123456789012");
//! let server = DceRpcServer::new();
//! server
//!     .register_interface(
//!         InterfaceBuilder::new(echo, 1, 0)
//!             .operation(1, |args: Bytes| async move { Ok(args) })
//!             .build(),
//!     )
//!     .await;
//! tokio::spawn(async move {
//!     server
//!         .run_until("127.0.0.1:12345".parse().unwrap(), std::future::pending())
//!         .await
//! });
//!
//! let client = DceRpcClient::connect("127.0.0.1:12345".parse().unwrap(), SyntaxId::new(echo, 1, 0)).await?;
//! let reply = client.call(1, Bytes::from("hello")).await?;
//! assert_eq!(reply.as_ref(), b"hello");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod pdu;
pub mod server;
pub mod transport;

pub use client::{DceRpcClient, DceRpcClientBuilder};
pub use error::{Result, RpcError};
pub use pdu::{
    fault_status, BindAckPdu, BindNakPdu, BindPdu, BindResult, ContextElement, ContextResult,
    DataRepresentation, FaultPdu, PacketFlags, PacketType, Pdu, PduHeader, RequestPdu,
    ResponsePdu, SyntaxId, DCE_RPC_VERSION, DCE_RPC_VERSION_MINOR, DEFAULT_MAX_FRAG,
    NDR_TRANSFER_SYNTAX,
};
pub use server::{
    DceRpcServer, DceRpcServerConfig, Interface, InterfaceBuilder, ObjectCall, ObjectRouter,
    OperationHandler,
};
pub use transport::{PduTransport, DEFAULT_MAX_PDU_SIZE};
pub use uuid::Uuid;
