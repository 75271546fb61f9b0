//! Connection-oriented DCE/RPC PDUs
//!
//! Only the PDUs an ORPC session needs are modelled: bind, bind_ack,
//! bind_nak, request, response and fault. Every PDU starts with the common
//! 16-byte header:
//!
//! ```text
//! +--------+--------+--------+--------+
//! |  vers  |vers_min| ptype  | pflags |
//! +--------+--------+--------+--------+
//! |        data representation        |
//! +--------+--------+--------+--------+
//! |   frag_len      |   auth_len      |
//! +--------+--------+--------+--------+
//! |             call_id               |
//! +--------+--------+--------+--------+
//! ```
//!
//! Integers after the data representation label follow its byte order.

use crate::{Result, RpcError};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::{uuid, Uuid};

pub const DCE_RPC_VERSION: u8 = 5;
pub const DCE_RPC_VERSION_MINOR: u8 = 0;

/// NDR transfer syntax, version 2.0
pub const NDR_TRANSFER_SYNTAX: SyntaxId = SyntaxId {
    uuid: uuid!("8a885d04-1ceb-11c9-9fe8-08002b104860"),
    version: 2,
};

/// Largest fragment either side advertises during bind.
pub const DEFAULT_MAX_FRAG: u16 = 5840;

/// NCA status codes carried in fault PDUs
pub mod fault_status {
    pub const NCA_S_OP_RNG_ERROR: u32 = 0x1c01_0002;
    pub const NCA_S_UNK_IF: u32 = 0x1c01_0003;
    pub const NCA_S_PROTO_ERROR: u32 = 0x1c01_000b;
    pub const NCA_S_FAULT_CONTEXT_MISMATCH: u32 = 0x1c00_001a;
    pub const NCA_S_FAULT_UNSPEC: u32 = 0x1c00_0012;
}

/// Reasons sent in a bind_nak
pub mod reject_reason {
    pub const REASON_NOT_SPECIFIED: u16 = 0;
    pub const PROTOCOL_VERSION_NOT_SUPPORTED: u16 = 4;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Request = 0,
    Response = 2,
    Fault = 3,
    Bind = 11,
    BindAck = 12,
    BindNak = 13,
}

impl PacketType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Request),
            2 => Some(Self::Response),
            3 => Some(Self::Fault),
            11 => Some(Self::Bind),
            12 => Some(Self::BindAck),
            13 => Some(Self::BindNak),
            _ => None,
        }
    }
}

/// `pfc_flags` header byte
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketFlags(u8);

impl PacketFlags {
    pub const FIRST_FRAG: u8 = 0x01;
    pub const LAST_FRAG: u8 = 0x02;
    pub const DID_NOT_EXECUTE: u8 = 0x20;
    /// Request carries an object UUID after the opnum
    pub const OBJECT_UUID: u8 = 0x80;

    /// Single-fragment PDU
    pub fn complete() -> Self {
        Self(Self::FIRST_FRAG | Self::LAST_FRAG)
    }

    pub fn contains(&self, flag: u8) -> bool {
        self.0 & flag == flag
    }

    pub fn with(self, flag: u8) -> Self {
        Self(self.0 | flag)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn from_u8(value: u8) -> Self {
        Self(value)
    }
}

/// Data representation format label. Only the integer byte order is
/// honoured; characters are ASCII and floats IEEE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataRepresentation([u8; 4]);

impl DataRepresentation {
    /// Little-endian, ASCII, IEEE
    pub const fn ndr() -> Self {
        Self([0x10, 0, 0, 0])
    }

    pub const fn big_endian() -> Self {
        Self([0x00, 0, 0, 0])
    }

    pub fn is_little_endian(&self) -> bool {
        self.0[0] & 0xf0 == 0x10
    }

    pub fn as_bytes(&self) -> [u8; 4] {
        self.0
    }
}

impl Default for DataRepresentation {
    fn default() -> Self {
        Self::ndr()
    }
}

/// Interface identifier and version. The wire version is `major | minor << 16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyntaxId {
    pub uuid: Uuid,
    pub version: u32,
}

impl SyntaxId {
    pub const fn new(uuid: Uuid, major: u16, minor: u16) -> Self {
        Self {
            uuid,
            version: major as u32 | (minor as u32) << 16,
        }
    }

    pub fn major_version(&self) -> u16 {
        (self.version & 0xffff) as u16
    }

    pub fn minor_version(&self) -> u16 {
        (self.version >> 16) as u16
    }
}

/// Big- or little-endian writer for PDU bodies
struct BodyWriter {
    buf: BytesMut,
    little_endian: bool,
}

impl BodyWriter {
    fn new(capacity: usize, little_endian: bool) -> Self {
        let mut buf = BytesMut::with_capacity(PduHeader::SIZE + capacity);
        buf.put_bytes(0, PduHeader::SIZE);
        Self { buf, little_endian }
    }

    fn u8(&mut self, v: u8) {
        self.buf.put_u8(v);
    }

    fn u16(&mut self, v: u16) {
        if self.little_endian {
            self.buf.put_u16_le(v)
        } else {
            self.buf.put_u16(v)
        }
    }

    fn u32(&mut self, v: u32) {
        if self.little_endian {
            self.buf.put_u32_le(v)
        } else {
            self.buf.put_u32(v)
        }
    }

    fn uuid(&mut self, v: &Uuid) {
        if self.little_endian {
            self.buf.put_slice(&v.to_bytes_le())
        } else {
            self.buf.put_slice(v.as_bytes())
        }
    }

    fn syntax(&mut self, v: &SyntaxId) {
        self.uuid(&v.uuid);
        self.u32(v.version);
    }

    fn align(&mut self, alignment: usize) {
        let padding = (alignment - self.buf.len() % alignment) % alignment;
        self.buf.put_bytes(0, padding);
    }

    fn bytes(&mut self, v: &[u8]) {
        self.buf.put_slice(v);
    }

    /// Patch the header in with the final fragment length.
    fn finish(mut self, header: &PduHeader) -> Result<Bytes> {
        let frag_length = u16::try_from(self.buf.len()).map_err(|_| RpcError::PduTooLarge {
            size: self.buf.len(),
            max: u16::MAX as usize,
        })?;
        let mut header = header.clone();
        header.frag_length = frag_length;
        header.auth_length = 0;
        let mut encoded = BytesMut::with_capacity(PduHeader::SIZE);
        header.encode(&mut encoded);
        self.buf[..PduHeader::SIZE].copy_from_slice(&encoded);
        Ok(self.buf.freeze())
    }
}

/// Bounds-checked reader for PDU bodies
struct BodyReader<'a> {
    data: &'a [u8],
    offset: usize,
    little_endian: bool,
    what: &'static str,
}

impl<'a> BodyReader<'a> {
    fn new(data: &'a [u8], header: &PduHeader, what: &'static str) -> Result<Self> {
        let end = (header.frag_length as usize).min(data.len());
        if end < PduHeader::SIZE {
            return Err(RpcError::InvalidPduData(format!("{what}: fragment shorter than header")));
        }
        Ok(Self {
            data: &data[..end],
            offset: PduHeader::SIZE,
            little_endian: header.data_rep.is_little_endian(),
            what,
        })
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.data.len() - self.offset < n {
            return Err(RpcError::InvalidPduData(format!(
                "{}: truncated at offset {}",
                self.what, self.offset
            )));
        }
        let slice = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let mut b = self.take(2)?;
        Ok(if self.little_endian { b.get_u16_le() } else { b.get_u16() })
    }

    fn u32(&mut self) -> Result<u32> {
        let mut b = self.take(4)?;
        Ok(if self.little_endian { b.get_u32_le() } else { b.get_u32() })
    }

    fn uuid(&mut self) -> Result<Uuid> {
        let raw: [u8; 16] = self
            .take(16)?
            .try_into()
            .map_err(|_| RpcError::InvalidPdu)?;
        Ok(if self.little_endian {
            Uuid::from_bytes_le(raw)
        } else {
            Uuid::from_bytes(raw)
        })
    }

    fn syntax(&mut self) -> Result<SyntaxId> {
        let uuid = self.uuid()?;
        let version = self.u32()?;
        Ok(SyntaxId { uuid, version })
    }

    fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - self.offset % alignment) % alignment;
        self.take(padding).map(|_| ())
    }

    fn rest(&mut self) -> Bytes {
        let rest = Bytes::copy_from_slice(&self.data[self.offset..]);
        self.offset = self.data.len();
        rest
    }
}

/// Common PDU header (16 bytes)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PduHeader {
    pub version: u8,
    pub version_minor: u8,
    pub packet_type: PacketType,
    pub packet_flags: PacketFlags,
    pub data_rep: DataRepresentation,
    /// Total length of this fragment, header included
    pub frag_length: u16,
    pub auth_length: u16,
    pub call_id: u32,
}

impl PduHeader {
    pub const SIZE: usize = 16;

    pub fn new(packet_type: PacketType, call_id: u32) -> Self {
        Self {
            version: DCE_RPC_VERSION,
            version_minor: DCE_RPC_VERSION_MINOR,
            packet_type,
            packet_flags: PacketFlags::complete(),
            data_rep: DataRepresentation::ndr(),
            frag_length: 0,
            auth_length: 0,
            call_id,
        }
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(self.version);
        buf.put_u8(self.version_minor);
        buf.put_u8(self.packet_type as u8);
        buf.put_u8(self.packet_flags.as_u8());
        buf.put_slice(&self.data_rep.as_bytes());
        if self.data_rep.is_little_endian() {
            buf.put_u16_le(self.frag_length);
            buf.put_u16_le(self.auth_length);
            buf.put_u32_le(self.call_id);
        } else {
            buf.put_u16(self.frag_length);
            buf.put_u16(self.auth_length);
            buf.put_u32(self.call_id);
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(RpcError::InvalidPduData(format!(
                "PDU header too short: {} bytes",
                data.len()
            )));
        }
        if data[0] != DCE_RPC_VERSION {
            return Err(RpcError::VersionMismatch {
                expected: DCE_RPC_VERSION,
                got: data[0],
            });
        }
        let packet_type =
            PacketType::from_u8(data[2]).ok_or(RpcError::InvalidMessageType(data[2] as i32))?;
        let data_rep = DataRepresentation([data[4], data[5], data[6], data[7]]);

        let mut rest = &data[8..Self::SIZE];
        let (frag_length, auth_length, call_id) = if data_rep.is_little_endian() {
            (rest.get_u16_le(), rest.get_u16_le(), rest.get_u32_le())
        } else {
            (rest.get_u16(), rest.get_u16(), rest.get_u32())
        };

        Ok(Self {
            version: data[0],
            version_minor: data[1],
            packet_type,
            packet_flags: PacketFlags::from_u8(data[3]),
            data_rep,
            frag_length,
            auth_length,
            call_id,
        })
    }
}

/// Presentation context offered in a bind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextElement {
    pub context_id: u16,
    pub abstract_syntax: SyntaxId,
    pub transfer_syntaxes: Vec<SyntaxId>,
}

impl ContextElement {
    pub fn new(context_id: u16, abstract_syntax: SyntaxId) -> Self {
        Self {
            context_id,
            abstract_syntax,
            transfer_syntaxes: vec![NDR_TRANSFER_SYNTAX],
        }
    }

    pub fn offers_ndr(&self) -> bool {
        self.transfer_syntaxes.contains(&NDR_TRANSFER_SYNTAX)
    }
}

#[derive(Debug, Clone)]
pub struct BindPdu {
    pub header: PduHeader,
    pub max_xmit_frag: u16,
    pub max_recv_frag: u16,
    pub assoc_group_id: u32,
    pub context_list: Vec<ContextElement>,
}

impl BindPdu {
    pub fn new(call_id: u32, interface: SyntaxId) -> Self {
        Self {
            header: PduHeader::new(PacketType::Bind, call_id),
            max_xmit_frag: DEFAULT_MAX_FRAG,
            max_recv_frag: DEFAULT_MAX_FRAG,
            assoc_group_id: 0,
            context_list: vec![ContextElement::new(0, interface)],
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut w = BodyWriter::new(64, self.header.data_rep.is_little_endian());
        w.u16(self.max_xmit_frag);
        w.u16(self.max_recv_frag);
        w.u32(self.assoc_group_id);
        w.u8(self.context_list.len() as u8);
        w.u8(0);
        w.u16(0);
        for element in &self.context_list {
            w.u16(element.context_id);
            w.u8(element.transfer_syntaxes.len() as u8);
            w.u8(0);
            w.syntax(&element.abstract_syntax);
            for ts in &element.transfer_syntaxes {
                w.syntax(ts);
            }
        }
        w.finish(&self.header)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let header = expect_type(data, PacketType::Bind)?;
        let mut r = BodyReader::new(data, &header, "bind")?;
        let max_xmit_frag = r.u16()?;
        let max_recv_frag = r.u16()?;
        let assoc_group_id = r.u32()?;
        let count = r.u8()?;
        r.take(3)?;

        let mut context_list = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let context_id = r.u16()?;
            let n_transfer = r.u8()?;
            r.u8()?;
            let abstract_syntax = r.syntax()?;
            let transfer_syntaxes = (0..n_transfer)
                .map(|_| r.syntax())
                .collect::<Result<Vec<_>>>()?;
            context_list.push(ContextElement {
                context_id,
                abstract_syntax,
                transfer_syntaxes,
            });
        }

        Ok(Self {
            header,
            max_xmit_frag,
            max_recv_frag,
            assoc_group_id,
            context_list,
        })
    }
}

/// Per-context answer in a bind_ack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ContextResult {
    Acceptance = 0,
    UserRejection = 1,
    ProviderRejection = 2,
}

impl ContextResult {
    fn from_u16(value: u16) -> Result<Self> {
        match value {
            0 => Ok(Self::Acceptance),
            1 => Ok(Self::UserRejection),
            2 => Ok(Self::ProviderRejection),
            other => Err(RpcError::InvalidPduData(format!("context result {other}"))),
        }
    }
}

/// Provider reason accompanying a rejected context
pub mod provider_reason {
    pub const NOT_SPECIFIED: u16 = 0;
    pub const ABSTRACT_SYNTAX_NOT_SUPPORTED: u16 = 1;
    pub const TRANSFER_SYNTAX_NOT_SUPPORTED: u16 = 2;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindResult {
    pub result: ContextResult,
    pub reason: u16,
    pub transfer_syntax: SyntaxId,
}

#[derive(Debug, Clone)]
pub struct BindAckPdu {
    pub header: PduHeader,
    pub max_xmit_frag: u16,
    pub max_recv_frag: u16,
    pub assoc_group_id: u32,
    /// Secondary address, the server port as a decimal string
    pub secondary_addr: String,
    pub results: Vec<BindResult>,
}

impl BindAckPdu {
    pub fn new(call_id: u32, assoc_group_id: u32, results: Vec<BindResult>) -> Self {
        Self {
            header: PduHeader::new(PacketType::BindAck, call_id),
            max_xmit_frag: DEFAULT_MAX_FRAG,
            max_recv_frag: DEFAULT_MAX_FRAG,
            assoc_group_id,
            secondary_addr: String::new(),
            results,
        }
    }

    /// Whether the context at `index` in the bind was accepted
    pub fn accepted(&self, index: usize) -> bool {
        self.results
            .get(index)
            .is_some_and(|r| r.result == ContextResult::Acceptance)
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut w = BodyWriter::new(64, self.header.data_rep.is_little_endian());
        w.u16(self.max_xmit_frag);
        w.u16(self.max_recv_frag);
        w.u32(self.assoc_group_id);
        w.u16(self.secondary_addr.len() as u16 + 1);
        w.bytes(self.secondary_addr.as_bytes());
        w.u8(0);
        w.align(4);
        w.u8(self.results.len() as u8);
        w.u8(0);
        w.u16(0);
        for result in &self.results {
            w.u16(result.result as u16);
            w.u16(result.reason);
            w.syntax(&result.transfer_syntax);
        }
        w.finish(&self.header)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let header = expect_type(data, PacketType::BindAck)?;
        let mut r = BodyReader::new(data, &header, "bind_ack")?;
        let max_xmit_frag = r.u16()?;
        let max_recv_frag = r.u16()?;
        let assoc_group_id = r.u32()?;
        let addr_len = r.u16()? as usize;
        let addr = r.take(addr_len)?;
        let secondary_addr = String::from_utf8_lossy(addr)
            .trim_end_matches('\0')
            .to_string();
        r.align(4)?;
        let count = r.u8()?;
        r.take(3)?;

        let mut results = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let result = ContextResult::from_u16(r.u16()?)?;
            let reason = r.u16()?;
            let transfer_syntax = r.syntax()?;
            results.push(BindResult {
                result,
                reason,
                transfer_syntax,
            });
        }

        Ok(Self {
            header,
            max_xmit_frag,
            max_recv_frag,
            assoc_group_id,
            secondary_addr,
            results,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BindNakPdu {
    pub header: PduHeader,
    pub reject_reason: u16,
}

impl BindNakPdu {
    pub fn new(call_id: u32, reject_reason: u16) -> Self {
        Self {
            header: PduHeader::new(PacketType::BindNak, call_id),
            reject_reason,
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut w = BodyWriter::new(8, self.header.data_rep.is_little_endian());
        w.u16(self.reject_reason);
        // Empty list of supported protocol versions
        w.u8(0);
        w.finish(&self.header)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let header = expect_type(data, PacketType::BindNak)?;
        let mut r = BodyReader::new(data, &header, "bind_nak")?;
        let reject_reason = r.u16()?;
        Ok(Self { header, reject_reason })
    }
}

#[derive(Debug, Clone)]
pub struct RequestPdu {
    pub header: PduHeader,
    pub alloc_hint: u32,
    pub context_id: u16,
    pub opnum: u16,
    /// For ORPC calls, the IPID of the target interface
    pub object_uuid: Option<Uuid>,
    pub stub_data: Bytes,
}

impl RequestPdu {
    pub fn new(call_id: u32, opnum: u16, stub_data: Bytes) -> Self {
        Self {
            header: PduHeader::new(PacketType::Request, call_id),
            alloc_hint: stub_data.len() as u32,
            context_id: 0,
            opnum,
            object_uuid: None,
            stub_data,
        }
    }

    pub fn with_object(mut self, object: Uuid) -> Self {
        self.object_uuid = Some(object);
        self
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut header = self.header.clone();
        if self.object_uuid.is_some() {
            header.packet_flags = header.packet_flags.with(PacketFlags::OBJECT_UUID);
        }
        let mut w = BodyWriter::new(24 + self.stub_data.len(), header.data_rep.is_little_endian());
        w.u32(self.alloc_hint);
        w.u16(self.context_id);
        w.u16(self.opnum);
        if let Some(object) = &self.object_uuid {
            w.uuid(object);
        }
        w.bytes(&self.stub_data);
        w.finish(&header)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let header = expect_type(data, PacketType::Request)?;
        let mut r = BodyReader::new(data, &header, "request")?;
        let alloc_hint = r.u32()?;
        let context_id = r.u16()?;
        let opnum = r.u16()?;
        let object_uuid = if header.packet_flags.contains(PacketFlags::OBJECT_UUID) {
            Some(r.uuid()?)
        } else {
            None
        };
        let stub_data = r.rest();

        Ok(Self {
            header,
            alloc_hint,
            context_id,
            opnum,
            object_uuid,
            stub_data,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ResponsePdu {
    pub header: PduHeader,
    pub alloc_hint: u32,
    pub context_id: u16,
    pub cancel_count: u8,
    pub stub_data: Bytes,
}

impl ResponsePdu {
    pub fn new(call_id: u32, context_id: u16, stub_data: Bytes) -> Self {
        Self {
            header: PduHeader::new(PacketType::Response, call_id),
            alloc_hint: stub_data.len() as u32,
            context_id,
            cancel_count: 0,
            stub_data,
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut w = BodyWriter::new(8 + self.stub_data.len(), self.header.data_rep.is_little_endian());
        w.u32(self.alloc_hint);
        w.u16(self.context_id);
        w.u8(self.cancel_count);
        w.u8(0);
        w.bytes(&self.stub_data);
        w.finish(&self.header)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let header = expect_type(data, PacketType::Response)?;
        let mut r = BodyReader::new(data, &header, "response")?;
        let alloc_hint = r.u32()?;
        let context_id = r.u16()?;
        let cancel_count = r.u8()?;
        r.u8()?;
        let stub_data = r.rest();

        Ok(Self {
            header,
            alloc_hint,
            context_id,
            cancel_count,
            stub_data,
        })
    }
}

#[derive(Debug, Clone)]
pub struct FaultPdu {
    pub header: PduHeader,
    pub alloc_hint: u32,
    pub context_id: u16,
    pub cancel_count: u8,
    /// NCA status or, for ORPC, an HRESULT
    pub status: u32,
}

impl FaultPdu {
    pub fn new(call_id: u32, context_id: u16, status: u32) -> Self {
        Self {
            header: PduHeader::new(PacketType::Fault, call_id),
            alloc_hint: 0,
            context_id,
            cancel_count: 0,
            status,
        }
    }

    /// Mark the call as never having reached the manager routine.
    pub fn did_not_execute(mut self) -> Self {
        self.header.packet_flags = self.header.packet_flags.with(PacketFlags::DID_NOT_EXECUTE);
        self
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut w = BodyWriter::new(16, self.header.data_rep.is_little_endian());
        w.u32(self.alloc_hint);
        w.u16(self.context_id);
        w.u8(self.cancel_count);
        w.u8(0);
        w.u32(self.status);
        w.u32(0);
        w.finish(&self.header)
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        let header = expect_type(data, PacketType::Fault)?;
        let mut r = BodyReader::new(data, &header, "fault")?;
        let alloc_hint = r.u32()?;
        let context_id = r.u16()?;
        let cancel_count = r.u8()?;
        r.u8()?;
        let status = r.u32()?;

        Ok(Self {
            header,
            alloc_hint,
            context_id,
            cancel_count,
            status,
        })
    }
}

fn expect_type(data: &[u8], expected: PacketType) -> Result<PduHeader> {
    let header = PduHeader::decode(data)?;
    if header.packet_type != expected {
        return Err(RpcError::InvalidMessageType(header.packet_type as i32));
    }
    Ok(header)
}

/// Any PDU this crate understands
#[derive(Debug, Clone)]
pub enum Pdu {
    Bind(BindPdu),
    BindAck(BindAckPdu),
    BindNak(BindNakPdu),
    Request(RequestPdu),
    Response(ResponsePdu),
    Fault(FaultPdu),
}

impl Pdu {
    pub fn decode(data: &[u8]) -> Result<Self> {
        let header = PduHeader::decode(data)?;
        Ok(match header.packet_type {
            PacketType::Bind => Pdu::Bind(BindPdu::decode(data)?),
            PacketType::BindAck => Pdu::BindAck(BindAckPdu::decode(data)?),
            PacketType::BindNak => Pdu::BindNak(BindNakPdu::decode(data)?),
            PacketType::Request => Pdu::Request(RequestPdu::decode(data)?),
            PacketType::Response => Pdu::Response(ResponsePdu::decode(data)?),
            PacketType::Fault => Pdu::Fault(FaultPdu::decode(data)?),
        })
    }

    pub fn encode(&self) -> Result<Bytes> {
        match self {
            Pdu::Bind(pdu) => pdu.encode(),
            Pdu::BindAck(pdu) => pdu.encode(),
            Pdu::BindNak(pdu) => pdu.encode(),
            Pdu::Request(pdu) => pdu.encode(),
            Pdu::Response(pdu) => pdu.encode(),
            Pdu::Fault(pdu) => pdu.encode(),
        }
    }

    pub fn call_id(&self) -> u32 {
        match self {
            Pdu::Bind(pdu) => pdu.header.call_id,
            Pdu::BindAck(pdu) => pdu.header.call_id,
            Pdu::BindNak(pdu) => pdu.header.call_id,
            Pdu::Request(pdu) => pdu.header.call_id,
            Pdu::Response(pdu) => pdu.header.call_id,
            Pdu::Fault(pdu) => pdu.header.call_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IHEN: Uuid = uuid!("48c2e6d3-8d1b-4a53-9b0e-7d4c1f2a6b01");

    #[test]
    fn test_header_encode_decode() {
        let header = PduHeader::new(PacketType::Request, 12345);
        let mut buf = BytesMut::new();
        header.encode(&mut buf);

        assert_eq!(buf.len(), PduHeader::SIZE);
        assert_eq!(buf[0], DCE_RPC_VERSION);
        assert_eq!(buf[4], 0x10);

        let decoded = PduHeader::decode(&buf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_header_rejects_wrong_version() {
        let mut buf = BytesMut::new();
        PduHeader::new(PacketType::Request, 1).encode(&mut buf);
        buf[0] = 4;
        assert!(matches!(
            PduHeader::decode(&buf),
            Err(RpcError::VersionMismatch { expected: 5, got: 4 })
        ));
    }

    #[test]
    fn test_request_carries_object_uuid() {
        let ipid = Uuid::new_v4();
        let request = RequestPdu::new(42, 3, Bytes::from_static(b"orpc")).with_object(ipid);
        let encoded = request.encode().unwrap();
        assert!(PacketFlags::from_u8(encoded[3]).contains(PacketFlags::OBJECT_UUID));
        assert_eq!(encoded.len(), PduHeader::SIZE + 8 + 16 + 4);

        let decoded = RequestPdu::decode(&encoded).unwrap();
        assert_eq!(decoded.object_uuid, Some(ipid));
        assert_eq!(decoded.opnum, 3);
        assert_eq!(decoded.stub_data.as_ref(), b"orpc");
    }

    #[test]
    fn test_request_without_object() {
        let encoded = RequestPdu::new(7, 0, Bytes::new()).encode().unwrap();
        let decoded = RequestPdu::decode(&encoded).unwrap();
        assert_eq!(decoded.object_uuid, None);
        assert!(decoded.stub_data.is_empty());
    }

    #[test]
    fn test_bind_and_ack() {
        let interface = SyntaxId::new(IHEN, 0, 0);
        let bind = BindPdu::new(1, interface);
        let decoded = BindPdu::decode(&bind.encode().unwrap()).unwrap();
        assert_eq!(decoded.context_list.len(), 1);
        assert_eq!(decoded.context_list[0].abstract_syntax, interface);
        assert!(decoded.context_list[0].offers_ndr());

        let ack = BindAckPdu::new(
            1,
            0x1234,
            vec![BindResult {
                result: ContextResult::Acceptance,
                reason: 0,
                transfer_syntax: NDR_TRANSFER_SYNTAX,
            }],
        );
        let decoded = BindAckPdu::decode(&ack.encode().unwrap()).unwrap();
        assert_eq!(decoded.assoc_group_id, 0x1234);
        assert!(decoded.accepted(0));
        assert!(!decoded.accepted(1));
    }

    #[test]
    fn test_fault_status_roundtrip() {
        let fault = FaultPdu::new(9, 0, 0x8001_0012).did_not_execute();
        let encoded = fault.encode().unwrap();
        match Pdu::decode(&encoded).unwrap() {
            Pdu::Fault(f) => {
                assert_eq!(f.status, 0x8001_0012);
                assert!(f.header.packet_flags.contains(PacketFlags::DID_NOT_EXECUTE));
            }
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_big_endian_request() {
        let mut request = RequestPdu::new(3, 4, Bytes::from_static(b"x")).with_object(IHEN);
        request.header.data_rep = DataRepresentation::big_endian();
        let encoded = request.encode().unwrap();
        assert_eq!(&encoded[8..10], &(PduHeader::SIZE as u16 + 25).to_be_bytes());

        let decoded = RequestPdu::decode(&encoded).unwrap();
        assert_eq!(decoded.object_uuid, Some(IHEN));
        assert_eq!(decoded.opnum, 4);
    }

    #[test]
    fn test_truncated_body_is_rejected() {
        let encoded = BindPdu::new(1, SyntaxId::new(IHEN, 0, 0)).encode().unwrap();
        let truncated = &encoded[..encoded.len() - 10];
        assert!(BindPdu::decode(truncated).is_err());
    }

    #[test]
    fn test_syntax_version_packing() {
        let syntax = SyntaxId::new(IHEN, 1, 2);
        assert_eq!(syntax.version, 0x0002_0001);
        assert_eq!(syntax.major_version(), 1);
        assert_eq!(syntax.minor_version(), 2);
    }
}
