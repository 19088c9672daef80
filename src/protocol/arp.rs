//! ARP (Address Resolution Protocol) - RFC 826

use super::MacAddr;
use crate::{Error, Result};
use std::net::Ipv4Addr;

/// ARP packet size (for Ethernet/IPv4)
pub const ARP_PACKET_SIZE: usize = 28;

/// ARP operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ArpOp {
    Request = 1,
    Reply = 2,
}

impl ArpOp {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(ArpOp::Request),
            2 => Some(ArpOp::Reply),
            _ => None,
        }
    }
}

/// ARP packet (Ethernet/IPv4 only; other bindings are rejected)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpPacket {
    pub operation: ArpOp,
    pub sender_mac: MacAddr,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr,
    pub target_ip: Ipv4Addr,
}

impl ArpPacket {
    /// Parse an ARP packet from buffer
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < ARP_PACKET_SIZE {
            return Err(Error::Parse("ARP packet too short".into()));
        }

        let htype = u16::from_be_bytes([buffer[0], buffer[1]]);
        let ptype = u16::from_be_bytes([buffer[2], buffer[3]]);
        if htype != 1 || ptype != 0x0800 {
            return Err(Error::Parse("ARP binding is not Ethernet/IPv4".into()));
        }
        if buffer[4] != 6 || buffer[5] != 4 {
            return Err(Error::Parse("ARP address lengths invalid".into()));
        }

        let operation = u16::from_be_bytes([buffer[6], buffer[7]]);
        let operation =
            ArpOp::from_u16(operation).ok_or_else(|| Error::Parse("invalid ARP operation".into()))?;

        Ok(Self {
            operation,
            sender_mac: MacAddr(buffer[8..14].try_into().unwrap()),
            sender_ip: Ipv4Addr::new(buffer[14], buffer[15], buffer[16], buffer[17]),
            target_mac: MacAddr(buffer[18..24].try_into().unwrap()),
            target_ip: Ipv4Addr::new(buffer[24], buffer[25], buffer[26], buffer[27]),
        })
    }

    /// Serialize ARP packet to bytes
    pub fn to_bytes(&self) -> [u8; ARP_PACKET_SIZE] {
        let mut buf = [0u8; ARP_PACKET_SIZE];

        buf[0..2].copy_from_slice(&1u16.to_be_bytes());
        buf[2..4].copy_from_slice(&0x0800u16.to_be_bytes());
        buf[4] = 6;
        buf[5] = 4;
        buf[6..8].copy_from_slice(&(self.operation as u16).to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.0);
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac.0);
        buf[24..28].copy_from_slice(&self.target_ip.octets());

        buf
    }

    /// Create an ARP request
    pub fn request(sender_mac: MacAddr, sender_ip: Ipv4Addr, target_ip: Ipv4Addr) -> Self {
        Self {
            operation: ArpOp::Request,
            sender_mac,
            sender_ip,
            target_mac: MacAddr::ZERO,
            target_ip,
        }
    }

    /// Create an ARP reply
    pub fn reply(
        sender_mac: MacAddr,
        sender_ip: Ipv4Addr,
        target_mac: MacAddr,
        target_ip: Ipv4Addr,
    ) -> Self {
        Self {
            operation: ArpOp::Reply,
            sender_mac,
            sender_ip,
            target_mac,
            target_ip,
        }
    }

    /// Check if this is a Gratuitous ARP (sender announces its own binding)
    pub fn is_gratuitous(&self) -> bool {
        self.sender_ip == self.target_ip
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request_bytes() -> [u8; ARP_PACKET_SIZE] {
        ArpPacket::request(
            MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(192, 168, 1, 2),
        )
        .to_bytes()
    }

    #[test]
    fn test_arp_op_from_u16() {
        assert_eq!(ArpOp::from_u16(1), Some(ArpOp::Request));
        assert_eq!(ArpOp::from_u16(2), Some(ArpOp::Reply));
        assert_eq!(ArpOp::from_u16(0), None);
        assert_eq!(ArpOp::from_u16(3), None);
    }

    #[test]
    fn test_parse_request() {
        let pkt = ArpPacket::parse(&make_request_bytes()).unwrap();

        assert_eq!(pkt.operation, ArpOp::Request);
        assert_eq!(
            pkt.sender_mac,
            MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55])
        );
        assert_eq!(pkt.sender_ip, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(pkt.target_mac, MacAddr::ZERO);
        assert_eq!(pkt.target_ip, Ipv4Addr::new(192, 168, 1, 2));
    }

    #[test]
    fn test_roundtrip_reply() {
        let original = ArpPacket::reply(
            MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]),
            Ipv4Addr::new(10, 0, 0, 1),
            MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            Ipv4Addr::new(10, 0, 0, 2),
        );
        let parsed = ArpPacket::parse(&original.to_bytes()).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_parse_too_short() {
        assert!(ArpPacket::parse(&[0u8; 27]).is_err());
    }

    #[test]
    fn test_parse_bad_binding() {
        let mut data = make_request_bytes();
        data[0..2].copy_from_slice(&2u16.to_be_bytes());
        assert!(ArpPacket::parse(&data).is_err());

        let mut data = make_request_bytes();
        data[2..4].copy_from_slice(&0x86DDu16.to_be_bytes());
        assert!(ArpPacket::parse(&data).is_err());

        let mut data = make_request_bytes();
        data[4] = 8;
        assert!(ArpPacket::parse(&data).is_err());
    }

    #[test]
    fn test_parse_bad_operation() {
        let mut data = make_request_bytes();
        data[6..8].copy_from_slice(&99u16.to_be_bytes());
        assert!(ArpPacket::parse(&data).is_err());
    }

    #[test]
    fn test_is_gratuitous() {
        let garp = ArpPacket::request(
            MacAddr([0x00, 0x11, 0x22, 0x33, 0x44, 0x55]),
            Ipv4Addr::new(192, 168, 1, 1),
            Ipv4Addr::new(192, 168, 1, 1),
        );
        assert!(garp.is_gratuitous());

        let normal = ArpPacket::parse(&make_request_bytes()).unwrap();
        assert!(!normal.is_gratuitous());
    }
}
