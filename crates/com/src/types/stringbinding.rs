//! String bindings and DUALSTRINGARRAY
//!
//! A DUALSTRINGARRAY tells a client how to reach an object exporter.
//!
//! ```text
//! num_entries: u16        # u16 units that follow
//! security_offset: u16    # unit offset of the security bindings
//! tower_id: u16, addr..., 0     # string bindings, repeated
//! 0                             # end of string bindings
//! ...security bindings..., 0
//! ```
//!
//! Addresses for `ncacn_ip_tcp` are written as `host[port]`. Security bindings
//! are skipped on decode since no authentication is negotiated.

use super::error::{DcomError, Result};
use comharness_ndr::{Buf, BufMut, NdrContext, NdrDecode, NdrEncode, NdrError};
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Protocol tower identifiers
pub mod protocol_id {
    pub const NCACN_IP_TCP: u16 = 0x07;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StringBinding {
    pub tower_id: u16,
    pub network_addr: String,
}

impl StringBinding {
    pub fn new(tower_id: u16, network_addr: impl Into<String>) -> Self {
        Self {
            tower_id,
            network_addr: network_addr.into(),
        }
    }

    /// `ncacn_ip_tcp` binding for `host[port]`
    pub fn tcp(host: &str, port: u16) -> Self {
        Self::new(protocol_id::NCACN_IP_TCP, format!("{host}[{port}]"))
    }

    /// Parse a TCP binding into a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        if self.tower_id != protocol_id::NCACN_IP_TCP {
            return Err(DcomError::InvalidStringBinding(format!(
                "unsupported tower id 0x{:02x}",
                self.tower_id
            )));
        }
        let invalid = || DcomError::InvalidStringBinding(self.network_addr.clone());
        let (host, rest) = self.network_addr.split_once('[').ok_or_else(invalid)?;
        let port = rest
            .strip_suffix(']')
            .and_then(|p| p.parse::<u16>().ok())
            .ok_or_else(invalid)?;
        let ip = match host {
            "localhost" => IpAddr::from([127, 0, 0, 1]),
            other => other.parse::<IpAddr>().map_err(|_| invalid())?,
        };
        Ok(SocketAddr::new(ip, port))
    }

    fn units(&self) -> impl Iterator<Item = u16> + '_ {
        std::iter::once(self.tower_id)
            .chain(self.network_addr.encode_utf16())
            .chain(std::iter::once(0))
    }
}

impl fmt::Display for StringBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tower_id {
            protocol_id::NCACN_IP_TCP => write!(f, "ncacn_ip_tcp:{}", self.network_addr),
            other => write!(f, "tower 0x{:02x}:{}", other, self.network_addr),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct DualStringArray {
    pub string_bindings: Vec<StringBinding>,
}

impl DualStringArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tcp_binding(host: &str, port: u16) -> Self {
        Self {
            string_bindings: vec![StringBinding::tcp(host, port)],
        }
    }

    /// Advertise `addr`, substituting loopback for an unspecified address.
    pub fn for_socket_addr(addr: SocketAddr) -> Self {
        let ip = if addr.ip().is_unspecified() {
            IpAddr::from([127, 0, 0, 1])
        } else {
            addr.ip()
        };
        Self::with_tcp_binding(&ip.to_string(), addr.port())
    }

    /// First TCP endpoint in the array
    pub fn tcp_endpoint(&self) -> Result<SocketAddr> {
        self.string_bindings
            .iter()
            .find(|b| b.tower_id == protocol_id::NCACN_IP_TCP)
            .ok_or_else(|| DcomError::InvalidStringBinding("no ncacn_ip_tcp binding".to_string()))?
            .socket_addr()
    }

    fn units(&self) -> Vec<u16> {
        let mut units: Vec<u16> = self.string_bindings.iter().flat_map(|b| b.units()).collect();
        units.push(0);
        // empty security section
        units.push(0);
        units
    }
}

impl NdrEncode for DualStringArray {
    fn ndr_encode<B: BufMut>(&self, buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<()> {
        let units = self.units();
        let num_entries = u16::try_from(units.len()).map_err(|_| NdrError::IntegerOverflow)?;
        let security_offset = num_entries - 1;
        num_entries.ndr_encode(buf, ctx, position)?;
        security_offset.ndr_encode(buf, ctx, position)?;
        for unit in units {
            unit.ndr_encode(buf, ctx, position)?;
        }
        Ok(())
    }

    fn ndr_align() -> usize {
        2
    }
}

impl NdrDecode for DualStringArray {
    fn ndr_decode<B: Buf>(buf: &mut B, ctx: &NdrContext, position: &mut usize) -> comharness_ndr::Result<Self> {
        let num_entries = u16::ndr_decode(buf, ctx, position)?;
        let security_offset = u16::ndr_decode(buf, ctx, position)?;
        if security_offset > num_entries {
            return Err(NdrError::ConformanceMismatch {
                max_count: u32::from(num_entries),
                actual_count: u32::from(security_offset),
            });
        }
        let units = (0..num_entries)
            .map(|_| u16::ndr_decode(buf, ctx, position))
            .collect::<comharness_ndr::Result<Vec<u16>>>()?;

        let mut string_bindings = Vec::new();
        let mut rest = &units[..security_offset as usize];
        while let Some((&tower_id, tail)) = rest.split_first() {
            if tower_id == 0 {
                break;
            }
            let end = tail
                .iter()
                .position(|u| *u == 0)
                .ok_or_else(|| NdrError::InvalidString("unterminated string binding".to_string()))?;
            let network_addr = char::decode_utf16(tail[..end].iter().copied())
                .collect::<std::result::Result<String, _>>()?;
            string_bindings.push(StringBinding { tower_id, network_addr });
            rest = &tail[end + 1..];
        }

        Ok(Self { string_bindings })
    }

    fn ndr_align() -> usize {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comharness_ndr::{NdrReader, NdrWriter};

    #[test]
    fn test_tcp_binding_parses() {
        let binding = StringBinding::tcp("127.0.0.1", 4135);
        assert_eq!(binding.network_addr, "127.0.0.1[4135]");
        assert_eq!(binding.socket_addr().unwrap(), "127.0.0.1:4135".parse().unwrap());
        assert_eq!(binding.to_string(), "ncacn_ip_tcp:127.0.0.1[4135]");
    }

    #[test]
    fn test_bad_binding_is_rejected() {
        assert!(StringBinding::new(protocol_id::NCACN_IP_TCP, "hostonly").socket_addr().is_err());
        assert!(StringBinding::new(0x0f, "\\pipe\\x").socket_addr().is_err());
    }

    #[test]
    fn test_dual_string_array_layout() {
        let dsa = DualStringArray::with_tcp_binding("10.0.0.5", 135);
        let mut writer = NdrWriter::new();
        writer.write(&dsa).unwrap();
        let stub = writer.into_bytes();

        // tower + "10.0.0.5[135]" + 0, then two terminators
        let units = 1 + 13 + 1 + 2;
        assert_eq!(&stub[..2], &(units as u16).to_le_bytes());
        assert_eq!(stub.len(), 4 + units * 2);

        let decoded: DualStringArray = NdrReader::new(&stub).read().unwrap();
        assert_eq!(decoded, dsa);
        assert_eq!(decoded.tcp_endpoint().unwrap(), "10.0.0.5:135".parse().unwrap());
    }

    #[test]
    fn test_unspecified_address_advertises_loopback() {
        let dsa = DualStringArray::for_socket_addr("0.0.0.0:4135".parse().unwrap());
        assert_eq!(dsa.string_bindings[0].network_addr, "127.0.0.1[4135]");
    }
}
