//! Error types for the RPC layer

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DCE RPC version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u8, got: u8 },

    /// Header fields that do not describe a PDU we can read
    #[error("invalid PDU")]
    InvalidPdu,

    #[error("invalid PDU: {0}")]
    InvalidPduData(String),

    #[error("invalid message type: {0}")]
    InvalidMessageType(i32),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("call timed out")]
    Timeout,

    #[error("bind failed: {0}")]
    BindFailed(String),

    /// The peer answered with a fault PDU. For ORPC the status is an HRESULT.
    #[error("fault: status 0x{0:08x}")]
    Fault(u32),

    #[error("call ID mismatch: expected {expected}, got {got}")]
    CallIdMismatch { expected: u32, got: u32 },

    #[error("PDU too large: {size} bytes exceeds maximum {max}")]
    PduTooLarge { size: usize, max: usize },

    #[error("record too large: {size} bytes exceeds maximum {max}")]
    RecordTooLarge { size: usize, max: usize },
}

impl RpcError {
    /// Whether the transport underneath is gone and the call cannot have been delivered
    pub fn is_disconnect(&self) -> bool {
        match self {
            RpcError::ConnectionClosed => true,
            RpcError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;
