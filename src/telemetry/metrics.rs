//! Per-port statistics collection.
//!
//! Read-only accumulation of frame, byte and drop counts. Counters are
//! relaxed atomics with saturating arithmetic; recording never blocks the
//! data path and never influences a forwarding decision.

use std::sync::atomic::{AtomicU64, Ordering};

/// Why a frame was dropped instead of forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropCause {
    /// FCS mismatch or physical-layer error flag
    FcsError,
    /// Frame under the minimum accepted length
    Runt,
    /// Frame over the maximum accepted length
    Jumbo,
    /// Ingress or egress buffer full
    BufferFull,
    /// Frame's VLAN not in the port's membership
    VlanViolation,
    /// MAC table at capacity with no-evict policy
    TableFull,
    /// Unknown unicast with miss-flooding disabled
    MissNoFlood,
    /// ARP resolution timed out; buffered dependents dropped
    ArpTimeout,
    /// ARP pending buffer overflowed
    ArpPendingFull,
    /// Router policy: fragmented IPv4 blocked
    FilteredFragment,
    /// Router policy: IPv4 multicast blocked
    FilteredMulticast,
    /// Router policy: destination MAC did not match the router
    MacMismatch,
    /// Router policy: non-IPv4 traffic blocked
    PolicyBlock,
    /// No usable next hop for the destination
    NoRoute,
    /// TTL reached zero in transit
    TtlExpired,
    /// Port is down or was taken down with frames queued
    PortDown,
}

impl DropCause {
    /// All causes, in export order
    pub const ALL: [DropCause; 16] = [
        DropCause::FcsError,
        DropCause::Runt,
        DropCause::Jumbo,
        DropCause::BufferFull,
        DropCause::VlanViolation,
        DropCause::TableFull,
        DropCause::MissNoFlood,
        DropCause::ArpTimeout,
        DropCause::ArpPendingFull,
        DropCause::FilteredFragment,
        DropCause::FilteredMulticast,
        DropCause::MacMismatch,
        DropCause::PolicyBlock,
        DropCause::NoRoute,
        DropCause::TtlExpired,
        DropCause::PortDown,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DropCause::FcsError => "fcs_error",
            DropCause::Runt => "runt",
            DropCause::Jumbo => "jumbo",
            DropCause::BufferFull => "buffer_full",
            DropCause::VlanViolation => "vlan_violation",
            DropCause::TableFull => "table_full",
            DropCause::MissNoFlood => "miss_no_flood",
            DropCause::ArpTimeout => "arp_timeout",
            DropCause::ArpPendingFull => "arp_pending_full",
            DropCause::FilteredFragment => "filtered_fragment",
            DropCause::FilteredMulticast => "filtered_multicast",
            DropCause::MacMismatch => "mac_mismatch",
            DropCause::PolicyBlock => "policy_block",
            DropCause::NoRoute => "no_route",
            DropCause::TtlExpired => "ttl_expired",
            DropCause::PortDown => "port_down",
        }
    }

    fn index(&self) -> usize {
        Self::ALL.iter().position(|c| c == self).unwrap()
    }
}

/// Atomic counter that saturates instead of wrapping.
#[derive(Debug, Default)]
pub struct SaturatingCounter(AtomicU64);

impl SaturatingCounter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, val: u64) {
        let mut cur = self.0.load(Ordering::Relaxed);
        loop {
            let next = cur.saturating_add(val);
            match self
                .0
                .compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => cur = observed,
            }
        }
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

/// Counters for a single port.
#[derive(Debug, Default)]
pub struct PortCounters {
    pub rx_frames: SaturatingCounter,
    pub rx_bytes: SaturatingCounter,
    pub tx_frames: SaturatingCounter,
    pub tx_bytes: SaturatingCounter,
    pub pause_rx: SaturatingCounter,
    pub pause_tx: SaturatingCounter,
    drops: [SaturatingCounter; 16],
}

impl PortCounters {
    pub fn record_rx(&self, bytes: usize) {
        self.rx_frames.inc();
        self.rx_bytes.add(bytes as u64);
    }

    pub fn record_tx(&self, bytes: usize) {
        self.tx_frames.inc();
        self.tx_bytes.add(bytes as u64);
    }

    pub fn record_drop(&self, cause: DropCause) {
        self.drops[cause.index()].inc();
    }

    pub fn drop_count(&self, cause: DropCause) -> u64 {
        self.drops[cause.index()].get()
    }

    pub fn total_drops(&self) -> u64 {
        self.drops.iter().map(|c| c.get()).sum()
    }

    pub fn reset(&self) {
        self.rx_frames.reset();
        self.rx_bytes.reset();
        self.tx_frames.reset();
        self.tx_bytes.reset();
        self.pause_rx.reset();
        self.pause_tx.reset();
        for c in &self.drops {
            c.reset();
        }
    }
}

/// Point-in-time copy of one port's counters, for the control surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortStatsSnapshot {
    pub port: usize,
    pub rx_frames: u64,
    pub rx_bytes: u64,
    pub tx_frames: u64,
    pub tx_bytes: u64,
    pub pause_rx: u64,
    pub pause_tx: u64,
    pub drops: Vec<(&'static str, u64)>,
}

/// Statistics registry for the whole fabric, one slot per port.
#[derive(Debug)]
pub struct FabricStats {
    ports: Vec<PortCounters>,
    /// ARP requests emitted by the inline router
    pub arp_requests_sent: SaturatingCounter,
    /// ARP replies emitted (including proxied ones)
    pub arp_replies_sent: SaturatingCounter,
    /// Frames routed across the local/uplink boundary
    pub routed_frames: SaturatingCounter,
    /// ICMP error messages generated
    pub icmp_errors_sent: SaturatingCounter,
}

impl FabricStats {
    pub fn new(port_count: usize) -> Self {
        Self {
            ports: (0..port_count).map(|_| PortCounters::default()).collect(),
            arp_requests_sent: SaturatingCounter::new(),
            arp_replies_sent: SaturatingCounter::new(),
            routed_frames: SaturatingCounter::new(),
            icmp_errors_sent: SaturatingCounter::new(),
        }
    }

    pub fn port(&self, port: usize) -> Option<&PortCounters> {
        self.ports.get(port)
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn record_rx(&self, port: usize, bytes: usize) {
        if let Some(p) = self.ports.get(port) {
            p.record_rx(bytes);
        }
    }

    pub fn record_tx(&self, port: usize, bytes: usize) {
        if let Some(p) = self.ports.get(port) {
            p.record_tx(bytes);
        }
    }

    pub fn record_drop(&self, port: usize, cause: DropCause) {
        if let Some(p) = self.ports.get(port) {
            p.record_drop(cause);
        }
    }

    /// Snapshot one port's counters
    pub fn snapshot(&self, port: usize) -> Option<PortStatsSnapshot> {
        let p = self.ports.get(port)?;
        Some(PortStatsSnapshot {
            port,
            rx_frames: p.rx_frames.get(),
            rx_bytes: p.rx_bytes.get(),
            tx_frames: p.tx_frames.get(),
            tx_bytes: p.tx_bytes.get(),
            pause_rx: p.pause_rx.get(),
            pause_tx: p.pause_tx.get(),
            drops: DropCause::ALL
                .iter()
                .map(|c| (c.name(), p.drop_count(*c)))
                .collect(),
        })
    }

    /// Reset all per-port counters (periodic reset per the overflow policy)
    pub fn reset(&self) {
        for p in &self.ports {
            p.reset();
        }
        self.arp_requests_sent.reset();
        self.arp_replies_sent.reset();
        self.routed_frames.reset();
        self.icmp_errors_sent.reset();
    }
}
