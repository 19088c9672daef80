//! Queueing fabric
//!
//! Bounded per-port buffers: one ingress queue absorbing table/VLAN
//! latency, and an egress buffer split into a high-priority lane and a
//! normal lane. Enqueue never blocks; a full queue reports overflow and
//! the caller counts the drop. Length policy (runt/jumbo acceptance) is
//! enforced here, at enqueue, not earlier in the pipeline.

use crate::dataplane::mac_table::VlanId;
use crate::dataplane::port::{IngressFrame, PortId};
use crate::protocol::ethernet::{MAX_FRAME_SIZE, MIN_WIRE_SIZE};
use crate::telemetry::DropCause;
use std::collections::VecDeque;

/// Enqueue failed; the queue is at capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overflow;

/// Runt/jumbo acceptance flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthPolicy {
    pub accept_runts: bool,
    pub accept_jumbo: bool,
}

impl Default for LengthPolicy {
    fn default() -> Self {
        Self {
            accept_runts: false,
            accept_jumbo: false,
        }
    }
}

impl LengthPolicy {
    /// Check a frame length (without FCS) against the policy
    pub fn check(&self, len: usize) -> Result<(), DropCause> {
        if len < MIN_WIRE_SIZE && !self.accept_runts {
            return Err(DropCause::Runt);
        }
        if len > MAX_FRAME_SIZE && !self.accept_jumbo {
            return Err(DropCause::Jumbo);
        }
        Ok(())
    }
}

/// A frame parked in an egress buffer, in canonical (untagged) form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFrame {
    pub bytes: Vec<u8>,
    pub vlan: VlanId,
    pub pcp: u8,
    pub ingress_port: PortId,
    pub timestamp: u64,
}

/// Egress lane selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    High,
    Normal,
}

/// Bounded ingress buffer
#[derive(Debug)]
pub struct IngressQueue {
    queue: VecDeque<IngressFrame>,
    capacity: usize,
}

impl IngressQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn enqueue(&mut self, frame: IngressFrame) -> Result<(), Overflow> {
        if self.queue.len() >= self.capacity {
            return Err(Overflow);
        }
        self.queue.push_back(frame);
        Ok(())
    }

    pub fn dequeue(&mut self) -> Option<IngressFrame> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn flush(&mut self) -> usize {
        let n = self.queue.len();
        self.queue.clear();
        n
    }
}

/// Two-lane egress buffer with weighted drain
#[derive(Debug)]
pub struct EgressQueues {
    high: VecDeque<QueuedFrame>,
    normal: VecDeque<QueuedFrame>,
    lane_capacity: usize,
    high_watermark: usize,
    low_watermark: usize,
    /// PCP at or above this goes to the high lane
    pcp_threshold: u8,
    /// After this many consecutive high dequeues, the normal lane gets one
    normal_weight: u32,
    high_since_normal: u32,
}

impl EgressQueues {
    pub fn new(
        lane_capacity: usize,
        high_watermark: usize,
        low_watermark: usize,
        pcp_threshold: u8,
        normal_weight: u32,
    ) -> Self {
        Self {
            high: VecDeque::with_capacity(lane_capacity),
            normal: VecDeque::with_capacity(lane_capacity),
            lane_capacity,
            high_watermark,
            low_watermark,
            pcp_threshold,
            normal_weight: normal_weight.max(1),
            high_since_normal: 0,
        }
    }

    /// Lane for a frame's priority code point
    pub fn classify(&self, pcp: u8) -> Lane {
        if pcp >= self.pcp_threshold {
            Lane::High
        } else {
            Lane::Normal
        }
    }

    pub fn enqueue(&mut self, frame: QueuedFrame, lane: Lane) -> Result<(), Overflow> {
        let queue = match lane {
            Lane::High => &mut self.high,
            Lane::Normal => &mut self.normal,
        };
        if queue.len() >= self.lane_capacity {
            return Err(Overflow);
        }
        queue.push_back(frame);
        Ok(())
    }

    /// Drain one frame
    ///
    /// The high lane goes first, but once `normal_weight` high frames have
    /// been served back to back the normal lane is granted a slot, so
    /// bursty priority traffic cannot starve it.
    pub fn dequeue(&mut self) -> Option<QueuedFrame> {
        let grant_normal = !self.normal.is_empty()
            && (self.high.is_empty() || self.high_since_normal >= self.normal_weight);

        if grant_normal {
            self.high_since_normal = 0;
            return self.normal.pop_front();
        }

        match self.high.pop_front() {
            Some(frame) => {
                self.high_since_normal += 1;
                Some(frame)
            }
            None => self.normal.pop_front(),
        }
    }

    pub fn occupancy(&self) -> usize {
        self.high.len() + self.normal.len()
    }

    pub fn high_occupancy(&self) -> usize {
        self.high.len()
    }

    pub fn is_empty(&self) -> bool {
        self.high.is_empty() && self.normal.is_empty()
    }

    pub fn set_watermarks(&mut self, high: usize, low: usize) {
        self.high_watermark = high;
        self.low_watermark = low;
    }

    pub fn above_high_water(&self) -> bool {
        self.occupancy() >= self.high_watermark
    }

    pub fn below_low_water(&self) -> bool {
        self.occupancy() <= self.low_watermark
    }

    pub fn flush(&mut self) -> usize {
        let n = self.occupancy();
        self.high.clear();
        self.normal.clear();
        self.high_since_normal = 0;
        n
    }
}
