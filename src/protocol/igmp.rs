//! IGMP (Internet Group Management Protocol) - RFC 2236
//!
//! Only the v1/v2 message subset the snooping switch observes: membership
//! reports and leave-group. Queries pass through untouched.

use crate::{Error, Result};
use std::net::Ipv4Addr;

/// IGMP message size (v1/v2)
pub const IGMP_PACKET_SIZE: usize = 8;

/// IGMP message types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum IgmpType {
    MembershipQuery = 0x11,
    MembershipReportV1 = 0x12,
    MembershipReportV2 = 0x16,
    LeaveGroup = 0x17,
}

impl IgmpType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x11 => Some(IgmpType::MembershipQuery),
            0x12 => Some(IgmpType::MembershipReportV1),
            0x16 => Some(IgmpType::MembershipReportV2),
            0x17 => Some(IgmpType::LeaveGroup),
            _ => None,
        }
    }
}

/// Parsed IGMP message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgmpPacket {
    pub igmp_type: IgmpType,
    pub max_resp_time: u8,
    pub group: Ipv4Addr,
}

impl IgmpPacket {
    pub fn parse(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < IGMP_PACKET_SIZE {
            return Err(Error::Parse("IGMP packet too short".into()));
        }

        let igmp_type = IgmpType::from_u8(buffer[0])
            .ok_or_else(|| Error::Parse("unknown IGMP type".into()))?;

        Ok(Self {
            igmp_type,
            max_resp_time: buffer[1],
            group: Ipv4Addr::new(buffer[4], buffer[5], buffer[6], buffer[7]),
        })
    }

    /// True for v1/v2 membership reports (join)
    pub fn is_report(&self) -> bool {
        matches!(
            self.igmp_type,
            IgmpType::MembershipReportV1 | IgmpType::MembershipReportV2
        )
    }

    pub fn is_leave(&self) -> bool {
        self.igmp_type == IgmpType::LeaveGroup
    }

    pub fn to_bytes(&self) -> [u8; IGMP_PACKET_SIZE] {
        let mut buf = [0u8; IGMP_PACKET_SIZE];
        buf[0] = self.igmp_type as u8;
        buf[1] = self.max_resp_time;
        // Checksum
        buf[4..8].copy_from_slice(&self.group.octets());
        let sum = super::icmp::icmp_checksum(&buf);
        buf[2..4].copy_from_slice(&sum.to_be_bytes());
        buf
    }
}

/// Map an IPv4 multicast group to its Ethernet MAC (01:00:5e + low 23 bits)
pub fn group_mac(group: Ipv4Addr) -> crate::protocol::MacAddr {
    let o = group.octets();
    crate::protocol::MacAddr([0x01, 0x00, 0x5e, o[1] & 0x7f, o[2], o[3]])
}
