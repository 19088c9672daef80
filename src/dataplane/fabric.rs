//! Fabric core
//!
//! Wires the pipeline together: port ingress, flow-control interception,
//! VLAN admission, learning and forwarding, the queueing fabric, and the
//! inline router on the uplink port. One ingress worker and one egress
//! worker per port share the fabric through `&self`; the MAC table and
//! the ARP cache are the only cross-port mutable state and sit behind
//! their own locks.

use crate::dataplane::arp_cache::ArpCacheConfig;
use crate::dataplane::flow_control::FlowControl;
use crate::dataplane::forwarding::{Decision, ForwardingEngine};
use crate::dataplane::inline_router::{InlineRouter, RouterConfig, RouterFace};
use crate::dataplane::mac_table::{EvictionPolicy, LearnOutcome, MacTableView, VlanId};
use crate::dataplane::port::{
    IngressFrame, IngressResult, PortEgress, PortFrameEvent, PortId, PortIngress, Tick,
};
use crate::dataplane::queueing::{EgressQueues, IngressQueue, LengthPolicy, QueuedFrame};
use crate::dataplane::vlan::{PortVlanMode, VlanFilter};
use crate::protocol::ethernet::{self, Frame};
use crate::protocol::igmp::{self, IgmpPacket};
use crate::protocol::ipv4::{protocol as ip_proto, Ipv4Header};
use crate::protocol::pause::PauseFrame;
use crate::protocol::{EtherType, MacAddr};
use crate::telemetry::{DropCause, FabricStats, PortStatsSnapshot};
use crate::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use tracing::{debug, trace};

/// Per-port tunables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    /// Port MAC, used as the source of PAUSE frames
    pub mac: MacAddr,
    pub link_up: bool,
    pub verify_fcs: bool,
    pub emit_fcs: bool,
    pub length_policy: LengthPolicy,
    pub ingress_capacity: usize,
    pub egress_lane_capacity: usize,
    pub high_watermark: usize,
    pub low_watermark: usize,
    /// PCP at or above this rides the high-priority lane
    pub pcp_threshold: u8,
    /// Normal-lane grant interval for the weighted drain
    pub normal_weight: u32,
    /// Advertised line rate, surfaced in the port state
    pub rate_limit: u16,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            mac: MacAddr::ZERO,
            link_up: true,
            verify_fcs: false,
            emit_fcs: false,
            length_policy: LengthPolicy::default(),
            ingress_capacity: 64,
            egress_lane_capacity: 64,
            high_watermark: 48,
            low_watermark: 16,
            pcp_threshold: 4,
            normal_weight: 4,
            rate_limit: 0,
        }
    }
}

/// Router attachment: which port it guards and how it is configured
#[derive(Debug, Clone)]
pub struct RouterAttachment {
    pub uplink_port: PortId,
    pub config: RouterConfig,
    pub arp: ArpCacheConfig,
}

/// Whole-fabric construction parameters
#[derive(Debug)]
pub struct FabricConfig {
    pub ports: Vec<PortSettings>,
    pub vlans: VlanFilter,
    pub mac_capacity: usize,
    pub mac_max_age: Tick,
    pub eviction: EvictionPolicy,
    pub flood_on_miss: bool,
    pub pause_quantum: u16,
    pub router: Option<RouterAttachment>,
}

/// Observable state of one port, for the control surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortState {
    pub link_up: bool,
    pub rate_limit: u16,
    pub ingress_queue_depth: usize,
    pub egress_queue_depth: usize,
    pub high_priority_depth: usize,
    pub pause_active: bool,
}

/// Requests arriving from the external configuration bus
#[derive(Debug, Clone)]
pub enum ControlRequest {
    SetPortEnabled { port: PortId, up: bool },
    AddStaticMac { mac: MacAddr, vlan: VlanId, port: PortId },
    RemoveMac { mac: MacAddr, vlan: VlanId },
    QueryMac { mac: MacAddr, vlan: VlanId },
    AddVlanMember { port: PortId, vlan: VlanId },
    RemoveVlanMember { port: PortId, vlan: VlanId },
    SetPortMode { port: PortId, mode: PortVlanMode },
    SetPortRate { port: PortId, rate: u16 },
    SetLengthPolicy { port: PortId, policy: LengthPolicy },
    SetWatermarks { port: PortId, high: usize, low: usize },
    SetFloodOnMiss(bool),
    SetRouterConfig(Box<RouterConfig>),
    ReadPortStats { port: PortId },
    ReadPortState { port: PortId },
    ResetStats,
}

/// Control surface responses
#[derive(Debug, Clone)]
pub enum ControlResponse {
    /// Write accepted; it takes effect at the next frame boundary
    Accepted,
    MacEntry(Option<MacTableView>),
    PortStats(PortStatsSnapshot),
    PortState(PortState),
}

#[derive(Debug)]
struct PortRuntime {
    settings: PortSettings,
    ingress: PortIngress,
    ingress_queue: IngressQueue,
    egress_queues: EgressQueues,
    egress: PortEgress,
    /// MAC control frames jump the data lanes and ignore pause
    control_out: VecDeque<Vec<u8>>,
}

impl PortRuntime {
    fn new(port: PortId, settings: PortSettings) -> Self {
        Self {
            ingress: PortIngress::new(port, settings.verify_fcs),
            ingress_queue: IngressQueue::new(settings.ingress_capacity),
            egress_queues: EgressQueues::new(
                settings.egress_lane_capacity,
                settings.high_watermark,
                settings.low_watermark,
                settings.pcp_threshold,
                settings.normal_weight,
            ),
            egress: PortEgress::new(settings.emit_fcs),
            control_out: VecDeque::new(),
            settings,
        }
    }
}

/// The switching/routing core shared by all port workers
pub struct Fabric {
    ports: Vec<Mutex<PortRuntime>>,
    engine: ForwardingEngine,
    vlans: RwLock<VlanFilter>,
    flow: Mutex<FlowControl>,
    router: Option<(PortId, Mutex<InlineRouter>)>,
    stats: FabricStats,
    pending_writes: Mutex<VecDeque<ControlRequest>>,
    now: AtomicU64,
}

impl Fabric {
    pub fn new(config: FabricConfig) -> Self {
        let port_count = config.ports.len();
        let ports = config
            .ports
            .into_iter()
            .enumerate()
            .map(|(i, settings)| Mutex::new(PortRuntime::new(i as PortId, settings)))
            .collect();

        Self {
            ports,
            engine: ForwardingEngine::new(
                config.mac_capacity,
                config.mac_max_age,
                config.eviction,
                config.flood_on_miss,
            ),
            vlans: RwLock::new(config.vlans),
            flow: Mutex::new(FlowControl::new(port_count, config.pause_quantum)),
            router: config
                .router
                .map(|r| (r.uplink_port, Mutex::new(InlineRouter::new(r.config, r.arp)))),
            stats: FabricStats::new(port_count),
            pending_writes: Mutex::new(VecDeque::new()),
            now: AtomicU64::new(0),
        }
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn stats(&self) -> &FabricStats {
        &self.stats
    }

    pub fn engine(&self) -> &ForwardingEngine {
        &self.engine
    }

    fn now(&self) -> Tick {
        self.now.load(Ordering::Relaxed)
    }

    // ========================================
    // Ingress path
    // ========================================

    /// Feed one port frame event into the fabric
    pub fn ingress(&self, port: PortId, event: PortFrameEvent) {
        // Config writes land between frames, never inside one
        self.apply_pending_writes();

        let Some(cell) = self.ports.get(port as usize) else {
            return;
        };

        let frame = {
            let mut runtime = cell.lock().unwrap();
            if !runtime.settings.link_up {
                self.stats.record_drop(port as usize, DropCause::PortDown);
                return;
            }

            match runtime.ingress.push(event) {
                IngressResult::Pending => return,
                IngressResult::Drop(cause) => {
                    self.stats.record_drop(port as usize, cause);
                    return;
                }
                IngressResult::Frame(frame) => {
                    self.stats.record_rx(port as usize, frame.bytes.len());

                    // Length policy is applied here, at the queueing
                    // stage, per the acceptance flags
                    if let Err(cause) = runtime.settings.length_policy.check(frame.bytes.len()) {
                        self.stats.record_drop(port as usize, cause);
                        return;
                    }
                    if runtime.ingress_queue.enqueue(frame).is_err() {
                        self.stats.record_drop(port as usize, DropCause::BufferFull);
                        return;
                    }
                    runtime.ingress_queue.dequeue()
                }
            }
        };

        if let Some(frame) = frame {
            self.process_frame(frame);
        }
    }

    fn process_frame(&self, frame: IngressFrame) {
        let port = frame.meta.port;
        let now = self.now();

        let parsed = match Frame::parse(&frame.bytes) {
            Ok(f) => f,
            Err(_) => {
                self.stats.record_drop(port as usize, DropCause::Runt);
                return;
            }
        };

        // 802.3x interception: MAC control frames terminate here
        if parsed.ethertype() == EtherType::MacControl as u16 {
            if let Ok(pause) = PauseFrame::parse(parsed.payload()) {
                trace!(port, quantum = pause.quantum, "pause received");
                if let Some(counters) = self.stats.port(port as usize) {
                    counters.pause_rx.inc();
                }
                self.flow.lock().unwrap().on_pause_received(port, pause);
            }
            return;
        }

        // Everything arriving on the uplink wire enters through the
        // router's uplink face; local-face output is switched from there
        if self.is_router_port(port) {
            let canonical = ethernet::strip_vlan_tag(&frame.bytes);
            self.route_across(RouterFace::Uplink, &canonical, now);
            return;
        }

        let src_mac = parsed.src_mac();
        let dst_mac = parsed.dst_mac();
        let tag = parsed.vlan_tag();

        let resolved = match self.vlans.read().unwrap().admit(tag, port) {
            Some(r) => r,
            None => {
                self.stats
                    .record_drop(port as usize, DropCause::VlanViolation);
                return;
            }
        };

        if src_mac.is_unicast() {
            match self.engine.learn(src_mac, resolved.vlan, port, now) {
                LearnOutcome::Rejected => {
                    self.stats.record_drop(port as usize, DropCause::TableFull)
                }
                LearnOutcome::Moved { previous_port } => {
                    debug!(
                        "station {} moved from port {} to {}",
                        src_mac, previous_port, port
                    );
                }
                _ => {}
            }
        }

        let canonical = ethernet::strip_vlan_tag(&frame.bytes);
        self.snoop_igmp(&canonical, resolved.vlan, port, now);

        let members = self.vlans.read().unwrap().members(resolved.vlan);
        let targets = match self.engine.decide(&dst_mac, resolved.vlan, port, &members) {
            Decision::Unicast(p) => vec![p],
            Decision::Flood(ports) => ports,
            Decision::Filter => return,
            Decision::Drop(cause) => {
                self.stats.record_drop(port as usize, cause);
                return;
            }
        };

        // Frames arriving on the uplink port already crossed the router,
        // so only the local->uplink direction passes through it here
        for target in targets {
            if self.is_router_port(target) && !self.is_router_port(port) {
                self.route_across(RouterFace::Local, &canonical, now);
            } else {
                self.enqueue_egress(
                    target,
                    QueuedFrame {
                        bytes: canonical.clone(),
                        vlan: resolved.vlan,
                        pcp: resolved.pcp,
                        ingress_port: port,
                        timestamp: frame.meta.timestamp,
                    },
                );
            }
        }
    }

    fn is_router_port(&self, port: PortId) -> bool {
        matches!(&self.router, Some((uplink, _)) if *uplink == port)
    }

    /// IGMP snooping: track join/leave so multicast floods can be pruned
    fn snoop_igmp(&self, canonical: &[u8], vlan: VlanId, port: PortId, now: Tick) {
        let Ok(frame) = Frame::parse(canonical) else {
            return;
        };
        if frame.ethertype() != EtherType::Ipv4 as u16 {
            return;
        }
        let Ok(header) = Ipv4Header::parse(frame.payload()) else {
            return;
        };
        if header.protocol() != ip_proto::IGMP {
            return;
        }
        let Ok(report) = IgmpPacket::parse(header.payload()) else {
            return;
        };

        let group = igmp::group_mac(report.group);
        if report.is_report() {
            trace!(port, group = %report.group, "IGMP join");
            self.engine.igmp_join(group, vlan, port, now);
        } else if report.is_leave() {
            trace!(port, group = %report.group, "IGMP leave");
            self.engine.igmp_leave(group, vlan, port);
        }
    }

    /// Hand a frame to the inline router and distribute its output
    fn route_across(&self, ingress_face: RouterFace, canonical: &[u8], now: Tick) {
        let Some((uplink_port, router)) = &self.router else {
            return;
        };
        let uplink_port = *uplink_port;

        let output = router.lock().unwrap().process_frame(ingress_face, canonical, now);

        for cause in output.drops {
            self.stats.record_drop(uplink_port as usize, cause);
        }
        self.stats.arp_requests_sent.add(output.arp_requests as u64);
        self.stats.arp_replies_sent.add(output.arp_replies as u64);
        self.stats.icmp_errors_sent.add(output.icmp_errors as u64);

        for (face, bytes) in output.emits {
            match face {
                RouterFace::Uplink => {
                    self.stats.routed_frames.inc();
                    self.enqueue_router_frame(uplink_port, bytes);
                }
                RouterFace::Local => {
                    self.stats.routed_frames.inc();
                    self.switch_from_uplink(bytes);
                }
            }
        }
    }

    /// L2-switch a router-produced frame into the local group, as if it
    /// had arrived on the uplink port
    fn switch_from_uplink(&self, bytes: Vec<u8>) {
        let Some((uplink_port, _)) = &self.router else {
            return;
        };
        let uplink_port = *uplink_port;

        let Ok(frame) = Frame::parse(&bytes) else {
            return;
        };
        let dst_mac = frame.dst_mac();

        let resolved = match self.vlans.read().unwrap().admit(None, uplink_port) {
            Some(r) => r,
            None => {
                self.stats
                    .record_drop(uplink_port as usize, DropCause::VlanViolation);
                return;
            }
        };

        let members = self.vlans.read().unwrap().members(resolved.vlan);
        let targets = match self
            .engine
            .decide(&dst_mac, resolved.vlan, uplink_port, &members)
        {
            Decision::Unicast(p) => vec![p],
            Decision::Flood(ports) => ports,
            Decision::Filter => return,
            Decision::Drop(cause) => {
                self.stats.record_drop(uplink_port as usize, cause);
                return;
            }
        };

        let now = self.now();
        for target in targets {
            self.enqueue_egress(
                target,
                QueuedFrame {
                    bytes: bytes.clone(),
                    vlan: resolved.vlan,
                    pcp: resolved.pcp,
                    ingress_port: uplink_port,
                    timestamp: now,
                },
            );
        }
    }

    /// Router output headed for the uplink wire
    fn enqueue_router_frame(&self, uplink_port: PortId, bytes: Vec<u8>) {
        let vlan = match self.vlans.read().unwrap().admit(None, uplink_port) {
            Some(r) => r,
            None => {
                self.stats
                    .record_drop(uplink_port as usize, DropCause::VlanViolation);
                return;
            }
        };
        self.enqueue_egress(
            uplink_port,
            QueuedFrame {
                bytes,
                vlan: vlan.vlan,
                pcp: vlan.pcp,
                ingress_port: uplink_port,
                timestamp: self.now(),
            },
        );
    }

    fn enqueue_egress(&self, port: PortId, frame: QueuedFrame) {
        let Some(cell) = self.ports.get(port as usize) else {
            return;
        };
        let mut runtime = cell.lock().unwrap();

        if !runtime.settings.link_up {
            self.stats.record_drop(port as usize, DropCause::PortDown);
            return;
        }

        let lane = runtime.egress_queues.classify(frame.pcp);
        if runtime.egress_queues.enqueue(frame, lane).is_err() {
            self.stats.record_drop(port as usize, DropCause::BufferFull);
            return;
        }

        // Occupancy crossing the high-water mark asks the peer to stop
        if runtime.egress_queues.above_high_water() {
            if let Some(pause) = self.flow.lock().unwrap().assert_pause(port) {
                trace!(port, "asserting pause toward peer");
                if let Some(counters) = self.stats.port(port as usize) {
                    counters.pause_tx.inc();
                }
                let frame = pause.to_frame(runtime.settings.mac);
                runtime.control_out.push_back(frame);
            }
        }
    }

    // ========================================
    // Egress path
    // ========================================

    /// Drain up to `budget` frames from a port's egress buffers
    pub fn drain(&self, port: PortId, budget: usize) -> Vec<PortFrameEvent> {
        self.apply_pending_writes();

        let Some(cell) = self.ports.get(port as usize) else {
            return Vec::new();
        };
        let mut runtime = cell.lock().unwrap();
        let mut out = Vec::new();
        let now = self.now();

        // MAC control bypasses both the lanes and the pause state
        while let Some(bytes) = runtime.control_out.pop_front() {
            out.push(runtime.egress.emit(bytes, now));
        }

        if !runtime.settings.link_up {
            return out;
        }

        let paused = self.flow.lock().unwrap().is_paused(port);
        if !paused {
            let vlans = self.vlans.read().unwrap();
            for _ in 0..budget {
                let Some(frame) = runtime.egress_queues.dequeue() else {
                    break;
                };
                let wire = vlans.retag(&frame.bytes, port, frame.vlan, frame.pcp);
                self.stats.record_tx(port as usize, wire.len());
                out.push(runtime.egress.emit(wire, now));
            }
        }

        // Falling under the low-water mark lets the peer resume
        if runtime.egress_queues.below_low_water() {
            if let Some(resume) = self.flow.lock().unwrap().release_pause(port) {
                trace!(port, "releasing pause");
                if let Some(counters) = self.stats.port(port as usize) {
                    counters.pause_tx.inc();
                }
                let frame = resume.to_frame(runtime.settings.mac);
                out.push(runtime.egress.emit(frame, now));
            }
        }

        out
    }

    // ========================================
    // Periodic maintenance
    // ========================================

    /// Advance fabric time: aging scrub, ARP retry/expiry, pause quanta
    pub fn tick(&self, now: Tick) {
        self.now.store(now, Ordering::Relaxed);
        self.apply_pending_writes();

        let (aged_macs, aged_groups) = self.engine.scrub(now);
        if aged_macs > 0 || aged_groups > 0 {
            debug!(aged_macs, aged_groups, "scrub");
        }

        self.flow.lock().unwrap().tick();

        if let Some((uplink_port, router)) = &self.router {
            let uplink_port = *uplink_port;
            let output = router.lock().unwrap().tick(now);

            for _ in 0..output.timeout_drops {
                self.stats
                    .record_drop(uplink_port as usize, DropCause::ArpTimeout);
            }
            self.stats.arp_requests_sent.add(output.arp_requests as u64);

            for (face, bytes) in output.emits {
                match face {
                    RouterFace::Uplink => self.enqueue_router_frame(uplink_port, bytes),
                    RouterFace::Local => self.switch_from_uplink(bytes),
                }
            }
        }
    }

    // ========================================
    // Control surface
    // ========================================

    /// Handle a control-bus request
    ///
    /// Reads answer immediately; validated writes are queued and applied
    /// at the next frame boundary. An invalid write is rejected here and
    /// never applied.
    pub fn control(&self, request: ControlRequest) -> Result<ControlResponse> {
        match &request {
            ControlRequest::QueryMac { mac, vlan } => {
                return Ok(ControlResponse::MacEntry(self.engine.query(mac, *vlan)));
            }
            ControlRequest::ReadPortStats { port } => {
                let snapshot = self
                    .stats
                    .snapshot(*port as usize)
                    .ok_or(Error::PortNotFound {
                        index: *port as usize,
                    })?;
                return Ok(ControlResponse::PortStats(snapshot));
            }
            ControlRequest::ReadPortState { port } => {
                return Ok(ControlResponse::PortState(self.port_state(*port)?));
            }
            ControlRequest::ResetStats => {
                self.stats.reset();
                return Ok(ControlResponse::Accepted);
            }
            _ => {}
        }

        self.validate_write(&request)?;
        self.pending_writes.lock().unwrap().push_back(request);
        Ok(ControlResponse::Accepted)
    }

    pub fn port_state(&self, port: PortId) -> Result<PortState> {
        let cell = self.ports.get(port as usize).ok_or(Error::PortNotFound {
            index: port as usize,
        })?;
        let runtime = cell.lock().unwrap();
        Ok(PortState {
            link_up: runtime.settings.link_up,
            rate_limit: runtime.settings.rate_limit,
            ingress_queue_depth: runtime.ingress_queue.len(),
            egress_queue_depth: runtime.egress_queues.occupancy(),
            high_priority_depth: runtime.egress_queues.high_occupancy(),
            pause_active: self.flow.lock().unwrap().is_paused(port),
        })
    }

    fn validate_write(&self, request: &ControlRequest) -> Result<()> {
        let check_port = |port: PortId| -> Result<()> {
            if (port as usize) < self.ports.len() {
                Ok(())
            } else {
                Err(Error::ConfigConflict(format!("port {} does not exist", port)))
            }
        };
        let check_vlan = |vlan: VlanId| -> Result<()> {
            if (1..=4094).contains(&vlan) {
                Ok(())
            } else {
                Err(Error::ConfigConflict(format!("invalid VLAN id {}", vlan)))
            }
        };

        match request {
            ControlRequest::SetPortEnabled { port, .. } => check_port(*port),
            ControlRequest::AddStaticMac { mac, vlan, port } => {
                check_port(*port)?;
                check_vlan(*vlan)?;
                if !mac.is_unicast() {
                    return Err(Error::ConfigConflict(format!(
                        "static entry for non-unicast address {}",
                        mac
                    )));
                }
                // A static binding to a port outside the VLAN would
                // contradict the isolation invariant
                if !self.vlans.read().unwrap().is_member(*port, *vlan) {
                    return Err(Error::ConfigConflict(format!(
                        "port {} is not a member of VLAN {}",
                        port, vlan
                    )));
                }
                Ok(())
            }
            ControlRequest::RemoveMac { vlan, .. } => check_vlan(*vlan),
            ControlRequest::AddVlanMember { port, vlan }
            | ControlRequest::RemoveVlanMember { port, vlan } => {
                check_port(*port)?;
                check_vlan(*vlan)
            }
            ControlRequest::SetPortMode { port, mode } => {
                check_port(*port)?;
                if let PortVlanMode::Access { default_vlan } = mode {
                    check_vlan(*default_vlan)?;
                }
                Ok(())
            }
            ControlRequest::SetPortRate { port, .. }
            | ControlRequest::SetLengthPolicy { port, .. } => check_port(*port),
            ControlRequest::SetWatermarks { port, high, low } => {
                check_port(*port)?;
                if low >= high {
                    return Err(Error::ConfigConflict(format!(
                        "low watermark {} must be below high watermark {}",
                        low, high
                    )));
                }
                Ok(())
            }
            ControlRequest::SetFloodOnMiss(_) => Ok(()),
            ControlRequest::SetRouterConfig(_) => {
                if self.router.is_none() {
                    return Err(Error::ConfigConflict(
                        "no inline router attached".to_string(),
                    ));
                }
                Ok(())
            }
            // Reads are handled before validation
            _ => Ok(()),
        }
    }

    /// Drain queued configuration writes; called at frame boundaries only
    fn apply_pending_writes(&self) {
        let mut queue = self.pending_writes.lock().unwrap();
        while let Some(request) = queue.pop_front() {
            self.apply_write(request);
        }
    }

    fn apply_write(&self, request: ControlRequest) {
        match request {
            ControlRequest::SetPortEnabled { port, up } => self.set_port_enabled(port, up),
            ControlRequest::AddStaticMac { mac, vlan, port } => {
                if !self.engine.insert_static(mac, vlan, port) {
                    debug!("static MAC {} not inserted: table full", mac);
                }
            }
            ControlRequest::RemoveMac { mac, vlan } => {
                self.engine.remove_entry(&mac, vlan);
            }
            ControlRequest::AddVlanMember { port, vlan } => {
                self.vlans.write().unwrap().add_member(port, vlan);
            }
            ControlRequest::RemoveVlanMember { port, vlan } => {
                self.vlans.write().unwrap().remove_member(port, vlan);
            }
            ControlRequest::SetPortMode { port, mode } => {
                self.vlans.write().unwrap().set_port_mode(port, mode);
            }
            ControlRequest::SetPortRate { port, rate } => {
                if let Some(cell) = self.ports.get(port as usize) {
                    cell.lock().unwrap().settings.rate_limit = rate;
                }
            }
            ControlRequest::SetLengthPolicy { port, policy } => {
                if let Some(cell) = self.ports.get(port as usize) {
                    cell.lock().unwrap().settings.length_policy = policy;
                }
            }
            ControlRequest::SetWatermarks { port, high, low } => {
                if let Some(cell) = self.ports.get(port as usize) {
                    let mut runtime = cell.lock().unwrap();
                    runtime.settings.high_watermark = high;
                    runtime.settings.low_watermark = low;
                    runtime.egress_queues.set_watermarks(high, low);
                }
            }
            ControlRequest::SetFloodOnMiss(flood) => self.engine.set_flood_on_miss(flood),
            ControlRequest::SetRouterConfig(config) => {
                if let Some((_, router)) = &self.router {
                    router.lock().unwrap().set_config(*config);
                }
            }
            _ => {}
        }
    }

    fn set_port_enabled(&self, port: PortId, up: bool) {
        let Some(cell) = self.ports.get(port as usize) else {
            return;
        };
        let mut runtime = cell.lock().unwrap();
        if runtime.settings.link_up == up {
            return;
        }
        runtime.settings.link_up = up;

        if !up {
            debug!(port, "port down: flushing queues and learned state");
            runtime.ingress.reset();
            let flushed =
                runtime.ingress_queue.flush() + runtime.egress_queues.flush();
            runtime.control_out.clear();
            drop(runtime);

            for _ in 0..flushed {
                self.stats.record_drop(port as usize, DropCause::PortDown);
            }
            self.engine.flush_port(port);
            self.flow.lock().unwrap().port_down(port);
        }
    }
}
