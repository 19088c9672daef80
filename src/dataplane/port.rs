//! Port ingress and egress stages
//!
//! The boundary between the fabric core and the physical-layer collaborator
//! is the port frame event: a chunk of bytes plus line metadata. Ingress
//! reassembles events into frames, validates them and stamps arrival
//! metadata; egress turns a finished frame back into an event.

use crate::protocol::ethernet::{self, MIN_FRAME_SIZE};
use crate::telemetry::DropCause;

/// Port identifier
pub type PortId = u32;

/// Fabric-wide time, in external scrub ticks
pub type Tick = u64;

/// The line timestamp is a 48-bit counter
pub const TIMESTAMP_MASK: u64 = (1 << 48) - 1;

/// What PortIngress/PortEgress exchange with the physical-layer collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortFrameEvent {
    pub bytes: Vec<u8>,
    /// Last event of the frame
    pub end_of_frame: bool,
    /// Line-side error indication (bad symbol, FCS failure in the PHY)
    pub error: bool,
    pub rate_hint: u16,
    pub status: u8,
    /// 48-bit line timestamp
    pub timestamp: u64,
}

impl PortFrameEvent {
    /// A complete frame in a single event, as most software collaborators
    /// deliver them
    pub fn whole(bytes: Vec<u8>, timestamp: u64) -> Self {
        Self {
            bytes,
            end_of_frame: true,
            error: false,
            rate_hint: 0,
            status: 0,
            timestamp: timestamp & TIMESTAMP_MASK,
        }
    }
}

/// Arrival metadata stamped on every ingested frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameMeta {
    pub port: PortId,
    pub timestamp: u64,
    pub rate_hint: u16,
    pub status: u8,
}

/// A validated frame owned by the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressFrame {
    /// Frame bytes without the FCS trailer
    pub bytes: Vec<u8>,
    pub meta: FrameMeta,
}

/// Outcome of feeding one event into the ingress stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngressResult {
    /// Mid-frame; more events expected
    Pending,
    /// A complete, valid frame
    Frame(IngressFrame),
    /// The frame was discarded
    Drop(DropCause),
}

/// Per-port ingress reassembly and validation
#[derive(Debug)]
pub struct PortIngress {
    port: PortId,
    /// Frames carry a trailing FCS that must be checked and stripped
    verify_fcs: bool,
    assembling: Vec<u8>,
    error_latched: bool,
    start_meta: Option<(u64, u16, u8)>,
}

impl PortIngress {
    pub fn new(port: PortId, verify_fcs: bool) -> Self {
        Self {
            port,
            verify_fcs,
            assembling: Vec::new(),
            error_latched: false,
            start_meta: None,
        }
    }

    pub fn set_verify_fcs(&mut self, verify: bool) {
        self.verify_fcs = verify;
    }

    /// Feed one event; a frame is produced when `end_of_frame` closes it
    pub fn push(&mut self, event: PortFrameEvent) -> IngressResult {
        if self.start_meta.is_none() {
            self.start_meta = Some((
                event.timestamp & TIMESTAMP_MASK,
                event.rate_hint,
                event.status,
            ));
        }
        self.error_latched |= event.error;
        self.assembling.extend_from_slice(&event.bytes);

        if !event.end_of_frame {
            return IngressResult::Pending;
        }

        let bytes = std::mem::take(&mut self.assembling);
        let (timestamp, rate_hint, status) = self.start_meta.take().unwrap();
        let error = std::mem::take(&mut self.error_latched);

        if error {
            return IngressResult::Drop(DropCause::FcsError);
        }

        let bytes = if self.verify_fcs {
            if !ethernet::validate_fcs(&bytes) {
                return IngressResult::Drop(DropCause::FcsError);
            }
            let mut bytes = bytes;
            bytes.truncate(bytes.len() - ethernet::FCS_SIZE);
            bytes
        } else {
            bytes
        };

        // Not even a header: unusable regardless of the runt policy
        if bytes.len() < MIN_FRAME_SIZE {
            return IngressResult::Drop(DropCause::Runt);
        }

        IngressResult::Frame(IngressFrame {
            bytes,
            meta: FrameMeta {
                port: self.port,
                timestamp,
                rate_hint,
                status,
            },
        })
    }

    /// Discard any partial frame, e.g. on a port-down transition
    pub fn reset(&mut self) {
        self.assembling.clear();
        self.error_latched = false;
        self.start_meta = None;
    }
}

/// Per-port egress framing
#[derive(Debug)]
pub struct PortEgress {
    emit_fcs: bool,
}

impl PortEgress {
    pub fn new(emit_fcs: bool) -> Self {
        Self { emit_fcs }
    }

    pub fn set_emit_fcs(&mut self, emit: bool) {
        self.emit_fcs = emit;
    }

    /// Wrap finished frame bytes into an outbound event
    pub fn emit(&self, mut bytes: Vec<u8>, timestamp: u64) -> PortFrameEvent {
        if self.emit_fcs {
            ethernet::append_fcs(&mut bytes);
        }
        PortFrameEvent::whole(bytes, timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ethernet::append_fcs;

    fn frame_bytes() -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        frame.extend_from_slice(&[0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb]);
        frame.extend_from_slice(&[0x08, 0x00]);
        frame.extend_from_slice(&[0u8; 50]);
        frame
    }

    #[test]
    fn test_whole_frame_no_fcs() {
        let mut ingress = PortIngress::new(3, false);
        let result = ingress.push(PortFrameEvent::whole(frame_bytes(), 1000));

        match result {
            IngressResult::Frame(frame) => {
                assert_eq!(frame.bytes, frame_bytes());
                assert_eq!(frame.meta.port, 3);
                assert_eq!(frame.meta.timestamp, 1000);
            }
            other => panic!("Expected Frame, got {:?}", other),
        }
    }

    #[test]
    fn test_fragmented_frame() {
        let mut ingress = PortIngress::new(0, false);
        let bytes = frame_bytes();
        let (head, tail) = bytes.split_at(20);

        let first = PortFrameEvent {
            bytes: head.to_vec(),
            end_of_frame: false,
            error: false,
            rate_hint: 100,
            status: 1,
            timestamp: 42,
        };
        assert_eq!(ingress.push(first), IngressResult::Pending);

        let second = PortFrameEvent {
            bytes: tail.to_vec(),
            end_of_frame: true,
            error: false,
            rate_hint: 0,
            status: 0,
            timestamp: 43,
        };
        match ingress.push(second) {
            IngressResult::Frame(frame) => {
                assert_eq!(frame.bytes, bytes);
                // Metadata comes from the first event of the frame
                assert_eq!(frame.meta.timestamp, 42);
                assert_eq!(frame.meta.rate_hint, 100);
                assert_eq!(frame.meta.status, 1);
            }
            other => panic!("Expected Frame, got {:?}", other),
        }
    }

    #[test]
    fn test_error_flag_drops_frame() {
        let mut ingress = PortIngress::new(0, false);
        let mut event = PortFrameEvent::whole(frame_bytes(), 0);
        event.error = true;

        assert_eq!(ingress.push(event), IngressResult::Drop(DropCause::FcsError));
    }

    #[test]
    fn test_error_latched_across_events() {
        let mut ingress = PortIngress::new(0, false);
        let bytes = frame_bytes();
        let (head, tail) = bytes.split_at(20);

        let first = PortFrameEvent {
            bytes: head.to_vec(),
            end_of_frame: false,
            error: true,
            rate_hint: 0,
            status: 0,
            timestamp: 0,
        };
        assert_eq!(ingress.push(first), IngressResult::Pending);

        // Error on an earlier event poisons the whole frame
        let second = PortFrameEvent::whole(tail.to_vec(), 1);
        assert_eq!(
            ingress.push(second),
            IngressResult::Drop(DropCause::FcsError)
        );

        // Next frame starts clean
        match ingress.push(PortFrameEvent::whole(frame_bytes(), 2)) {
            IngressResult::Frame(_) => {}
            other => panic!("Expected Frame, got {:?}", other),
        }
    }

    #[test]
    fn test_fcs_verified_and_stripped() {
        let mut ingress = PortIngress::new(0, true);
        let mut bytes = frame_bytes();
        append_fcs(&mut bytes);

        match ingress.push(PortFrameEvent::whole(bytes, 0)) {
            IngressResult::Frame(frame) => assert_eq!(frame.bytes, frame_bytes()),
            other => panic!("Expected Frame, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_fcs_dropped() {
        let mut ingress = PortIngress::new(0, true);
        let mut bytes = frame_bytes();
        append_fcs(&mut bytes);
        bytes[20] ^= 0xFF;

        assert_eq!(
            ingress.push(PortFrameEvent::whole(bytes, 0)),
            IngressResult::Drop(DropCause::FcsError)
        );
    }

    #[test]
    fn test_headerless_runt_dropped() {
        let mut ingress = PortIngress::new(0, false);
        assert_eq!(
            ingress.push(PortFrameEvent::whole(vec![0u8; 10], 0)),
            IngressResult::Drop(DropCause::Runt)
        );
    }

    #[test]
    fn test_timestamp_masked_to_48_bits() {
        let event = PortFrameEvent::whole(frame_bytes(), u64::MAX);
        assert_eq!(event.timestamp, TIMESTAMP_MASK);
    }

    #[test]
    fn test_reset_discards_partial() {
        let mut ingress = PortIngress::new(0, false);
        let partial = PortFrameEvent {
            bytes: vec![0u8; 20],
            end_of_frame: false,
            error: false,
            rate_hint: 0,
            status: 0,
            timestamp: 0,
        };
        assert_eq!(ingress.push(partial), IngressResult::Pending);

        ingress.reset();

        match ingress.push(PortFrameEvent::whole(frame_bytes(), 5)) {
            IngressResult::Frame(frame) => {
                assert_eq!(frame.bytes.len(), frame_bytes().len());
                assert_eq!(frame.meta.timestamp, 5);
            }
            other => panic!("Expected Frame, got {:?}", other),
        }
    }

    #[test]
    fn test_egress_appends_fcs() {
        let egress = PortEgress::new(true);
        let event = egress.emit(frame_bytes(), 7);

        assert!(event.end_of_frame);
        assert_eq!(event.timestamp, 7);
        assert_eq!(event.bytes.len(), frame_bytes().len() + 4);
        assert!(crate::protocol::ethernet::validate_fcs(&event.bytes));
    }

    #[test]
    fn test_egress_without_fcs() {
        let egress = PortEgress::new(false);
        let event = egress.emit(frame_bytes(), 7);
        assert_eq!(event.bytes, frame_bytes());
    }
}
