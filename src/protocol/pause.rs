//! 802.3x MAC control PAUSE frames
//!
//! A PAUSE frame is a MAC control frame (EtherType 0x8808, opcode 0x0001)
//! sent to the reserved multicast 01:80:c2:00:00:01. The quantum field tells
//! the peer how long to hold off transmission; quantum 0 resumes it.

use super::{EtherType, MacAddr};
use crate::protocol::ethernet::FrameBuilder;
use crate::{Error, Result};

/// MAC control opcode for PAUSE
pub const PAUSE_OPCODE: u16 = 0x0001;

/// MAC control payload size (opcode + quantum)
pub const PAUSE_PAYLOAD_SIZE: usize = 4;

/// Parsed PAUSE request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseFrame {
    /// Pause time in 512-bit-time quanta; 0 means resume
    pub quantum: u16,
}

impl PauseFrame {
    /// Parse a MAC control payload
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < PAUSE_PAYLOAD_SIZE {
            return Err(Error::Parse("MAC control payload too short".into()));
        }

        let opcode = u16::from_be_bytes([payload[0], payload[1]]);
        if opcode != PAUSE_OPCODE {
            return Err(Error::Parse("unsupported MAC control opcode".into()));
        }

        Ok(Self {
            quantum: u16::from_be_bytes([payload[2], payload[3]]),
        })
    }

    pub fn to_payload(&self) -> [u8; PAUSE_PAYLOAD_SIZE] {
        let mut buf = [0u8; PAUSE_PAYLOAD_SIZE];
        buf[0..2].copy_from_slice(&PAUSE_OPCODE.to_be_bytes());
        buf[2..4].copy_from_slice(&self.quantum.to_be_bytes());
        buf
    }

    /// Build the full Ethernet frame for this PAUSE request
    pub fn to_frame(&self, src_mac: MacAddr) -> Vec<u8> {
        FrameBuilder::new()
            .dst_mac(MacAddr::PAUSE_MULTICAST)
            .src_mac(src_mac)
            .ethertype(EtherType::MacControl as u16)
            .payload(&self.to_payload())
            .build()
    }

    pub fn is_resume(&self) -> bool {
        self.quantum == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ethernet::Frame;

    #[test]
    fn test_pause_roundtrip() {
        let pause = PauseFrame { quantum: 0xFFFF };
        let parsed = PauseFrame::parse(&pause.to_payload()).unwrap();
        assert_eq!(parsed, pause);
        assert!(!parsed.is_resume());
    }

    #[test]
    fn test_resume() {
        let resume = PauseFrame { quantum: 0 };
        assert!(resume.is_resume());
    }

    #[test]
    fn test_parse_bad_opcode() {
        let mut payload = PauseFrame { quantum: 10 }.to_payload();
        payload[1] = 0x02;
        assert!(PauseFrame::parse(&payload).is_err());
    }

    #[test]
    fn test_parse_too_short() {
        assert!(PauseFrame::parse(&[0x00, 0x01]).is_err());
    }

    #[test]
    fn test_to_frame() {
        let src = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
        let bytes = PauseFrame { quantum: 128 }.to_frame(src);

        let frame = Frame::parse(&bytes).unwrap();
        assert_eq!(frame.dst_mac(), MacAddr::PAUSE_MULTICAST);
        assert_eq!(frame.src_mac(), src);
        assert_eq!(frame.ethertype(), EtherType::MacControl as u16);

        let pause = PauseFrame::parse(frame.payload()).unwrap();
        assert_eq!(pause.quantum, 128);
    }
}
