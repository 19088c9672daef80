//! Inline IPv4 router
//!
//! Sits between the local port group and the uplink network, attached to
//! the uplink port. Everything the switch sends toward the uplink passes
//! the local face; everything arriving from the uplink passes the uplink
//! face. The router resolves next hops through its ARP cache, optionally
//! answers ARP on behalf of the opposite segment (proxy ARP), applies the
//! configured filtering policy and rewrites MAC addresses on the way
//! through.

use crate::dataplane::arp_cache::{ArpCache, ArpCacheConfig, PendingOutcome, TickAction};
use crate::dataplane::port::Tick;
use crate::protocol::arp::{ArpOp, ArpPacket};
use crate::protocol::ethernet::{Frame, FrameBuilder};
use crate::protocol::icmp;
use crate::protocol::ipv4::{protocol as ip_proto, Ipv4Builder, Ipv4Header, Ipv4Packet};
use crate::protocol::{EtherType, MacAddr};
use crate::telemetry::DropCause;
use std::net::Ipv4Addr;
use tracing::trace;

/// Which side of the router a frame is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterFace {
    Local,
    Uplink,
}

impl RouterFace {
    pub fn opposite(&self) -> RouterFace {
        match self {
            RouterFace::Local => RouterFace::Uplink,
            RouterFace::Uplink => RouterFace::Local,
        }
    }
}

/// Handling of frames that are neither IPv4 nor ARP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonIpv4Policy {
    /// Drop them at the boundary
    #[default]
    Block,
    /// Pass them through unchanged
    Forward,
    /// Pass them through with the source MAC replaced by the egress face
    ForwardRewrite,
}

/// Static router configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Local subnet address and prefix
    pub local_ip: Ipv4Addr,
    pub local_prefix_len: u8,
    /// Router MAC on the local face
    pub local_mac: MacAddr,
    /// Router address and MAC on the uplink face
    pub uplink_ip: Ipv4Addr,
    pub uplink_mac: MacAddr,
    /// Next hop for everything outside the local subnet
    pub gateway_ip: Ipv4Addr,
    /// Static gateway binding; skips ARP resolution when set
    pub gateway_mac: Option<MacAddr>,
    /// Answer local-side ARP requests for uplink-side addresses
    pub proxy_arp_to_uplink: bool,
    /// Answer uplink-side ARP requests for local-subnet addresses
    pub proxy_arp_to_local: bool,
    pub block_fragments: bool,
    pub block_multicast: bool,
    /// Only route frames addressed to the router's face MAC
    pub require_dst_mac_match: bool,
    /// Stamp the egress face MAC as source on forwarded frames
    pub rewrite_source_mac: bool,
    pub non_ipv4: NonIpv4Policy,
    /// Generate ICMP errors for filtered/undeliverable packets
    pub icmp_errors: bool,
}

impl RouterConfig {
    pub fn is_local_subnet(&self, ip: Ipv4Addr) -> bool {
        let mask = if self.local_prefix_len == 0 {
            0
        } else {
            !0u32 << (32 - self.local_prefix_len)
        };
        (u32::from(ip) & mask) == (u32::from(self.local_ip) & mask)
    }

    pub fn face_of_ip(&self, ip: Ipv4Addr) -> RouterFace {
        if self.is_local_subnet(ip) {
            RouterFace::Local
        } else {
            RouterFace::Uplink
        }
    }

    pub fn face_mac(&self, face: RouterFace) -> MacAddr {
        match face {
            RouterFace::Local => self.local_mac,
            RouterFace::Uplink => self.uplink_mac,
        }
    }

    pub fn face_ip(&self, face: RouterFace) -> Ipv4Addr {
        match face {
            RouterFace::Local => self.local_ip,
            RouterFace::Uplink => self.uplink_ip,
        }
    }
}

/// Result of pushing one frame through the router
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RouterOutput {
    /// Frames to emit, per face
    pub emits: Vec<(RouterFace, Vec<u8>)>,
    /// Drops to count (a single input can displace a buffered frame and
    /// so produce more than one)
    pub drops: Vec<DropCause>,
    /// ARP requests emitted (statistics)
    pub arp_requests: usize,
    /// ARP replies emitted, proxied or own (statistics)
    pub arp_replies: usize,
    /// ICMP errors generated (statistics)
    pub icmp_errors: usize,
}

impl RouterOutput {
    fn drop(cause: DropCause) -> Self {
        Self {
            drops: vec![cause],
            ..Self::default()
        }
    }

    fn emit(face: RouterFace, frame: Vec<u8>) -> Self {
        Self {
            emits: vec![(face, frame)],
            ..Self::default()
        }
    }
}

/// Timer-driven output
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RouterTickOutput {
    pub emits: Vec<(RouterFace, Vec<u8>)>,
    /// Frames dropped because their resolution timed out
    pub timeout_drops: usize,
    pub arp_requests: usize,
}

/// The router proper
#[derive(Debug)]
pub struct InlineRouter {
    config: RouterConfig,
    cache: ArpCache,
}

impl InlineRouter {
    pub fn new(config: RouterConfig, arp_config: ArpCacheConfig) -> Self {
        Self {
            config,
            cache: ArpCache::new(arp_config),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Replace the configuration; the caller applies this at a frame
    /// boundary only
    pub fn set_config(&mut self, config: RouterConfig) {
        self.config = config;
    }

    pub fn cache(&self) -> &ArpCache {
        &self.cache
    }

    /// Push one frame (canonical, untagged) through the boundary
    pub fn process_frame(&mut self, ingress: RouterFace, bytes: &[u8], now: Tick) -> RouterOutput {
        let frame = match Frame::parse(bytes) {
            Ok(f) => f,
            Err(e) => {
                trace!("router: unparseable frame: {:?}", e);
                return RouterOutput::default();
            }
        };

        match EtherType::from_u16(frame.ethertype()) {
            Some(EtherType::Arp) => self.handle_arp(ingress, &frame, now),
            Some(EtherType::Ipv4) => self.handle_ipv4(ingress, &frame, now),
            _ => self.handle_other(ingress, bytes),
        }
    }

    /// Advance retry/expiry timers
    pub fn tick(&mut self, now: Tick) -> RouterTickOutput {
        let mut out = RouterTickOutput::default();

        for action in self.cache.tick(now) {
            match action {
                TickAction::Retry(ip) => {
                    let face = self.config.face_of_ip(ip);
                    out.emits.push((face, self.build_arp_request(face, ip)));
                    out.arp_requests += 1;
                }
                TickAction::Expired { ip, dropped } => {
                    trace!("router: resolution of {} expired, {} dropped", ip, dropped);
                    out.timeout_drops += dropped;
                }
            }
        }

        out
    }

    // ========================================
    // ARP
    // ========================================

    fn handle_arp(&mut self, ingress: RouterFace, frame: &Frame<'_>, now: Tick) -> RouterOutput {
        let arp = match ArpPacket::parse(frame.payload()) {
            Ok(p) => p,
            Err(e) => {
                trace!("router: bad ARP: {:?}", e);
                return RouterOutput::default();
            }
        };

        let face_ip = self.config.face_ip(ingress);
        let face_mac = self.config.face_mac(ingress);

        // Opportunistic cache update, RFC 826 style: refresh a sender we
        // already track, or one talking to us
        let sender_known = self.cache.state(&arp.sender_ip).is_some();
        let addressed_to_us = arp.target_ip == face_ip;
        if sender_known || addressed_to_us {
            let flushed = self.cache.complete(arp.sender_ip, arp.sender_mac, now);
            if !flushed.is_empty() {
                let egress = self.config.face_of_ip(arp.sender_ip);
                let mut out = RouterOutput::default();
                for mut pending in flushed {
                    pending[0..6].copy_from_slice(&arp.sender_mac.0);
                    out.emits.push((egress, pending));
                }
                // The ARP itself is consumed below; fold its handling in
                let mut rest = self.handle_arp_decision(ingress, &arp, face_ip, face_mac);
                out.emits.append(&mut rest.emits);
                out.drops.append(&mut rest.drops);
                out.arp_replies += rest.arp_replies;
                return out;
            }
        }

        self.handle_arp_decision(ingress, &arp, face_ip, face_mac)
    }

    fn handle_arp_decision(
        &mut self,
        ingress: RouterFace,
        arp: &ArpPacket,
        face_ip: Ipv4Addr,
        face_mac: MacAddr,
    ) -> RouterOutput {
        match arp.operation {
            ArpOp::Request => {
                if arp.target_ip == face_ip {
                    // For our own address: answer directly
                    let reply =
                        ArpPacket::reply(face_mac, face_ip, arp.sender_mac, arp.sender_ip);
                    let mut out =
                        RouterOutput::emit(ingress, self.build_arp_frame(ingress, &reply));
                    out.arp_replies = 1;
                    return out;
                }

                let target_face = self.config.face_of_ip(arp.target_ip);
                let proxy_enabled = match ingress {
                    RouterFace::Local => self.config.proxy_arp_to_uplink,
                    RouterFace::Uplink => self.config.proxy_arp_to_local,
                };

                if target_face != ingress && proxy_enabled {
                    // Answer on behalf of the opposite segment instead of
                    // forwarding the broadcast into it
                    let reply =
                        ArpPacket::reply(face_mac, arp.target_ip, arp.sender_mac, arp.sender_ip);
                    let mut out =
                        RouterOutput::emit(ingress, self.build_arp_frame(ingress, &reply));
                    out.arp_replies = 1;
                    return out;
                }

                if target_face != ingress {
                    // Proxy off: let the request cross
                    let egress = ingress.opposite();
                    return RouterOutput::emit(egress, self.build_arp_frame(egress, arp));
                }

                // Target lives on the requesting segment; with proxying
                // active the broadcast stops here, otherwise it crosses
                if proxy_enabled {
                    RouterOutput::default()
                } else {
                    let egress = ingress.opposite();
                    RouterOutput::emit(egress, self.build_arp_frame(egress, arp))
                }
            }
            ArpOp::Reply => {
                if arp.target_ip == face_ip {
                    // Consumed: the cache update happened in handle_arp
                    RouterOutput::default()
                } else {
                    // A reply between third parties; pass it along
                    let egress = ingress.opposite();
                    RouterOutput::emit(egress, self.build_arp_frame(egress, arp))
                }
            }
        }
    }

    fn build_arp_frame(&self, egress: RouterFace, arp: &ArpPacket) -> Vec<u8> {
        let dst = match arp.operation {
            ArpOp::Request => MacAddr::BROADCAST,
            ArpOp::Reply => arp.target_mac,
        };
        FrameBuilder::new()
            .dst_mac(dst)
            .src_mac(self.config.face_mac(egress))
            .ethertype(EtherType::Arp as u16)
            .payload(&arp.to_bytes())
            .build()
    }

    fn build_arp_request(&self, face: RouterFace, target: Ipv4Addr) -> Vec<u8> {
        let request = ArpPacket::request(
            self.config.face_mac(face),
            self.config.face_ip(face),
            target,
        );
        self.build_arp_frame(face, &request)
    }

    // ========================================
    // IPv4
    // ========================================

    fn handle_ipv4(&mut self, ingress: RouterFace, frame: &Frame<'_>, now: Tick) -> RouterOutput {
        let config = self.config.clone();

        if config.require_dst_mac_match && frame.dst_mac() != config.face_mac(ingress) {
            return RouterOutput::drop(DropCause::MacMismatch);
        }

        let header = match Ipv4Header::parse(frame.payload()) {
            Ok(h) => h,
            Err(e) => {
                trace!("router: bad IPv4 header: {:?}", e);
                return RouterOutput::default();
            }
        };

        if config.block_fragments && header.is_fragment() {
            return self.filtered_drop(ingress, frame, &header, DropCause::FilteredFragment);
        }

        if config.block_multicast && header.dst_addr().is_multicast() {
            return RouterOutput::drop(DropCause::FilteredMulticast);
        }

        if header.dst_addr().is_broadcast() {
            // Routers do not forward link broadcast
            return RouterOutput::drop(DropCause::NoRoute);
        }

        // Pick the next hop before touching the packet
        let dst = header.dst_addr();
        let (next_hop, egress) = match ingress {
            RouterFace::Local => {
                if config.is_local_subnet(dst) {
                    // Hairpin back into its own segment: nothing to route
                    return self.undeliverable(ingress, frame, &header);
                }
                (config.gateway_ip, RouterFace::Uplink)
            }
            RouterFace::Uplink => {
                if config.is_local_subnet(dst) {
                    (dst, RouterFace::Local)
                } else {
                    return self.undeliverable(ingress, frame, &header);
                }
            }
        };

        let mut packet = match Ipv4Packet::from_bytes(frame.payload()) {
            Ok(p) => p,
            Err(_) => return RouterOutput::default(),
        };

        if !packet.decrement_ttl() {
            let mut out = RouterOutput::drop(DropCause::TtlExpired);
            if config.icmp_errors {
                out.emits.push((
                    ingress,
                    self.build_icmp_error(
                        ingress,
                        frame,
                        &header,
                        icmp::IcmpType::TimeExceeded,
                        icmp::time_exceeded::TTL_EXCEEDED,
                    ),
                ));
                out.icmp_errors = 1;
            }
            return out;
        }

        let src_mac = if config.rewrite_source_mac {
            config.face_mac(egress)
        } else {
            frame.src_mac()
        };

        // Static gateway binding short-circuits resolution
        let static_mac = if next_hop == config.gateway_ip {
            config.gateway_mac
        } else {
            None
        };
        let resolved = static_mac.or_else(|| self.cache.resolve(&next_hop));

        if let Some(next_hop_mac) = resolved {
            let out_frame = FrameBuilder::new()
                .dst_mac(next_hop_mac)
                .src_mac(src_mac)
                .ethertype(EtherType::Ipv4 as u16)
                .payload(&packet.into_bytes())
                .build();
            return RouterOutput::emit(egress, out_frame);
        }

        // Unresolved: park the frame with a zeroed destination and kick
        // off (or join) the resolution
        let parked = FrameBuilder::new()
            .dst_mac(MacAddr::ZERO)
            .src_mac(src_mac)
            .ethertype(EtherType::Ipv4 as u16)
            .payload(&packet.into_bytes())
            .build();

        let mut out = RouterOutput::default();
        let (outcome, request_needed) = self.cache.queue_pending(next_hop, parked, now);
        match outcome {
            PendingOutcome::Queued => {}
            PendingOutcome::QueuedDroppedOldest => out.drops.push(DropCause::ArpPendingFull),
            PendingOutcome::RejectedNewest => out.drops.push(DropCause::ArpPendingFull),
        }
        if request_needed {
            out.emits
                .push((egress, self.build_arp_request(egress, next_hop)));
            out.arp_requests = 1;
        }
        out
    }

    /// No route for the destination: drop, with an optional ICMP error
    fn undeliverable(
        &self,
        ingress: RouterFace,
        frame: &Frame<'_>,
        header: &Ipv4Header<'_>,
    ) -> RouterOutput {
        let mut out = RouterOutput::drop(DropCause::NoRoute);
        if self.config.icmp_errors {
            out.emits.push((
                ingress,
                self.build_icmp_error(
                    ingress,
                    frame,
                    header,
                    icmp::IcmpType::DestinationUnreachable,
                    icmp::dest_unreachable::HOST_UNREACHABLE,
                ),
            ));
            out.icmp_errors = 1;
        }
        out
    }

    /// A policy filter fired: drop, with an optional administratively-
    /// prohibited notification
    fn filtered_drop(
        &self,
        ingress: RouterFace,
        frame: &Frame<'_>,
        header: &Ipv4Header<'_>,
        cause: DropCause,
    ) -> RouterOutput {
        let mut out = RouterOutput::drop(cause);
        if self.config.icmp_errors {
            out.emits.push((
                ingress,
                self.build_icmp_error(
                    ingress,
                    frame,
                    header,
                    icmp::IcmpType::DestinationUnreachable,
                    icmp::dest_unreachable::COMM_PROHIBITED,
                ),
            ));
            out.icmp_errors = 1;
        }
        out
    }

    fn build_icmp_error(
        &self,
        ingress: RouterFace,
        frame: &Frame<'_>,
        header: &Ipv4Header<'_>,
        icmp_type: icmp::IcmpType,
        code: u8,
    ) -> Vec<u8> {
        let icmp_payload = match icmp_type {
            icmp::IcmpType::TimeExceeded => icmp::build_time_exceeded(code, frame.payload()),
            _ => icmp::build_destination_unreachable(code, frame.payload()),
        };

        let ip_packet = Ipv4Builder::new()
            .src_addr(self.config.face_ip(ingress))
            .dst_addr(header.src_addr())
            .ttl(64)
            .protocol(ip_proto::ICMP)
            .payload(&icmp_payload)
            .build();

        FrameBuilder::new()
            .dst_mac(frame.src_mac())
            .src_mac(self.config.face_mac(ingress))
            .ethertype(EtherType::Ipv4 as u16)
            .payload(&ip_packet)
            .build()
    }

    // ========================================
    // Non-IPv4
    // ========================================

    fn handle_other(&self, ingress: RouterFace, bytes: &[u8]) -> RouterOutput {
        match self.config.non_ipv4 {
            NonIpv4Policy::Block => RouterOutput::drop(DropCause::PolicyBlock),
            NonIpv4Policy::Forward => RouterOutput::emit(ingress.opposite(), bytes.to_vec()),
            NonIpv4Policy::ForwardRewrite => {
                let egress = ingress.opposite();
                let mut out = bytes.to_vec();
                out[6..12].copy_from_slice(&self.config.face_mac(egress).0);
                RouterOutput::emit(egress, out)
            }
        }
    }
}
