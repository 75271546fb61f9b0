//! PDU framing over a byte stream
//!
//! Connection-oriented PDUs are self-delimiting: the header's `frag_length`
//! says how many bytes belong to the PDU. Multi-fragment calls are not used,
//! every request and response travels as a single fragment.

use crate::pdu::{Pdu, PduHeader};
use crate::{Result, RpcError};
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest fragment accepted from a peer
pub const DEFAULT_MAX_PDU_SIZE: usize = 65535;

pub struct PduTransport<T> {
    inner: T,
    max_pdu_size: usize,
    read_buf: BytesMut,
}

impl<T> PduTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            max_pdu_size: DEFAULT_MAX_PDU_SIZE,
            read_buf: BytesMut::with_capacity(8192),
        }
    }

    pub fn with_max_pdu_size(mut self, max_size: usize) -> Self {
        self.max_pdu_size = max_size;
        self
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: AsyncRead + Unpin> PduTransport<T> {
    /// Read one complete PDU fragment.
    ///
    /// A clean end of stream before any byte of the next PDU is reported as
    /// `ConnectionClosed`; a stream that ends mid-PDU is an I/O error.
    pub async fn read_pdu(&mut self) -> Result<Bytes> {
        self.fill_to(PduHeader::SIZE).await?;

        let header = PduHeader::decode(&self.read_buf)?;
        let frag_length = header.frag_length as usize;
        if frag_length < PduHeader::SIZE {
            return Err(RpcError::InvalidPduData(format!(
                "fragment length {} shorter than header",
                frag_length
            )));
        }
        if frag_length > self.max_pdu_size {
            return Err(RpcError::RecordTooLarge {
                size: frag_length,
                max: self.max_pdu_size,
            });
        }

        self.fill_to(frag_length).await?;
        Ok(self.read_buf.split_to(frag_length).freeze())
    }

    pub async fn read_pdu_decoded(&mut self) -> Result<Pdu> {
        let data = self.read_pdu().await?;
        Pdu::decode(&data)
    }

    async fn fill_to(&mut self, wanted: usize) -> Result<()> {
        while self.read_buf.len() < wanted {
            self.read_buf.reserve(wanted - self.read_buf.len());
            let n = self.inner.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                if self.read_buf.is_empty() {
                    return Err(RpcError::ConnectionClosed);
                }
                return Err(RpcError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {} of {} bytes", self.read_buf.len(), wanted),
                )));
            }
        }
        Ok(())
    }
}

impl<T: AsyncWrite + Unpin> PduTransport<T> {
    /// Write an already encoded PDU.
    pub async fn write_pdu(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data).await?;
        self.inner.flush().await?;
        Ok(())
    }

    pub async fn write_pdu_encoded(&mut self, pdu: &Pdu) -> Result<()> {
        let data = pdu.encode()?;
        self.write_pdu(&data).await
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await?;
        Ok(())
    }
}
