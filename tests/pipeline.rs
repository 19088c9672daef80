//! End-to-end pipeline tests over the in-memory fabric
//!
//! Each test drives `Fabric` the way the per-port workers do: frame
//! events in through `ingress`, drained events out through `drain`, with
//! `tick` standing in for the external scrub timer.

use fabricsw::dataplane::{
    ArpCacheConfig, ControlRequest, ControlResponse, EvictionPolicy, Fabric, FabricConfig,
    NonIpv4Policy, PortFrameEvent, PortId, PortSettings, PortVlanMode, RouterAttachment,
    RouterConfig, VlanFilter,
};
use fabricsw::protocol::arp::{ArpOp, ArpPacket};
use fabricsw::protocol::ethernet::{Frame, FrameBuilder};
use fabricsw::protocol::igmp::{IgmpPacket, IgmpType};
use fabricsw::protocol::ipv4::{protocol as ip_proto, Ipv4Builder, Ipv4Header};
use fabricsw::protocol::pause::PauseFrame;
use fabricsw::protocol::{EtherType, MacAddr, VlanTag};
use std::net::Ipv4Addr;

fn mac(last: u8) -> MacAddr {
    MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, last])
}

/// Pad to the 60-byte wire minimum, as the line side would
fn pad(mut frame: Vec<u8>) -> Vec<u8> {
    if frame.len() < 60 {
        frame.resize(60, 0);
    }
    frame
}

/// A data frame with a marker byte to tell copies apart
fn data_frame(src: MacAddr, dst: MacAddr, marker: u8) -> Vec<u8> {
    let mut payload = vec![0u8; 50];
    payload[0] = marker;
    FrameBuilder::new()
        .dst_mac(dst)
        .src_mac(src)
        .ethertype(0x88B5)
        .payload(&payload)
        .build()
}

fn tagged_frame(src: MacAddr, dst: MacAddr, vid: u16, marker: u8) -> Vec<u8> {
    let mut payload = vec![0u8; 50];
    payload[0] = marker;
    FrameBuilder::new()
        .dst_mac(dst)
        .src_mac(src)
        .vlan_tag(VlanTag::new(vid))
        .ethertype(0x88B5)
        .payload(&payload)
        .build()
}

fn send(fabric: &Fabric, port: PortId, bytes: Vec<u8>) {
    fabric.ingress(port, PortFrameEvent::whole(pad(bytes), 0));
}

fn drain_all(fabric: &Fabric) -> Vec<Vec<PortFrameEvent>> {
    (0..fabric.port_count())
        .map(|p| fabric.drain(p as PortId, 64))
        .collect()
}

/// Flat switch: `count` access ports, all on VLAN 1
fn flat_fabric(count: usize, mac_capacity: usize, flood_on_miss: bool) -> Fabric {
    let mut vlans = VlanFilter::new();
    for p in 0..count {
        vlans.set_port_mode(p as PortId, PortVlanMode::Access { default_vlan: 1 });
    }
    Fabric::new(FabricConfig {
        ports: (0..count)
            .map(|i| PortSettings {
                mac: mac(0xe0 + i as u8),
                ..Default::default()
            })
            .collect(),
        vlans,
        mac_capacity,
        mac_max_age: 300,
        eviction: EvictionPolicy::NotRecentlyUsed,
        flood_on_miss,
        pause_quantum: 8,
        router: None,
    })
}

// ========================================
// Forwarding properties
// ========================================

#[test]
fn test_learned_unicast_goes_to_learned_port_only() {
    let fabric = flat_fabric(4, 64, true);
    let a = mac(1);
    let b = mac(2);

    // A introduces itself on port 0
    send(&fabric, 0, data_frame(a, MacAddr::BROADCAST, 1));
    drain_all(&fabric);

    // B (port 1) sends to A: only port 0 emits
    send(&fabric, 1, data_frame(b, a, 2));
    let drained = drain_all(&fabric);

    assert_eq!(drained[0].len(), 1);
    let frame = Frame::parse(&drained[0][0].bytes).unwrap();
    assert_eq!(frame.dst_mac(), a);
    assert!(drained[1].is_empty());
    assert!(drained[2].is_empty());
    assert!(drained[3].is_empty());
}

#[test]
fn test_frame_to_station_on_ingress_port_is_filtered() {
    let fabric = flat_fabric(4, 64, true);
    let a = mac(1);
    let b = mac(2);

    // Both stations live behind port 0
    send(&fabric, 0, data_frame(a, MacAddr::BROADCAST, 1));
    send(&fabric, 0, data_frame(b, MacAddr::BROADCAST, 2));
    drain_all(&fabric);

    send(&fabric, 0, data_frame(a, b, 3));
    for events in drain_all(&fabric) {
        assert!(events.is_empty());
    }
}

#[test]
fn test_unknown_unicast_floods_except_ingress() {
    let fabric = flat_fabric(4, 64, true);

    send(&fabric, 1, data_frame(mac(1), mac(0x99), 1));
    let drained = drain_all(&fabric);

    assert!(drained[1].is_empty());
    for port in [0usize, 2, 3] {
        assert_eq!(drained[port].len(), 1, "port {} should get the flood", port);
    }
}

#[test]
fn test_miss_broadcast_disabled_drops() {
    let fabric = flat_fabric(4, 64, false);

    send(&fabric, 1, data_frame(mac(1), mac(0x99), 1));
    for events in drain_all(&fabric) {
        assert!(events.is_empty());
    }
    let snap = fabric.stats().snapshot(1).unwrap();
    assert!(snap
        .drops
        .iter()
        .any(|(name, count)| *name == "miss_no_flood" && *count == 1));

    // Broadcast still floods
    send(&fabric, 1, data_frame(mac(1), MacAddr::BROADCAST, 2));
    let drained = drain_all(&fabric);
    assert_eq!(drained[0].len(), 1);
    assert_eq!(drained[2].len(), 1);
    assert_eq!(drained[3].len(), 1);
}

#[test]
fn test_learning_is_idempotent() {
    let fabric = flat_fabric(4, 64, true);

    for marker in 0..5 {
        send(&fabric, 0, data_frame(mac(1), MacAddr::BROADCAST, marker));
    }
    assert_eq!(fabric.engine().table_len(), 1);
}

#[test]
fn test_mac_table_capacity_scenario() {
    // Capacity 4, five distinct sources on five ports
    let fabric = flat_fabric(5, 4, true);

    for i in 0..5u8 {
        fabric.tick(i as u64 + 1);
        send(
            &fabric,
            i as PortId,
            data_frame(mac(10 + i), MacAddr::BROADCAST, i),
        );
        assert!(fabric.engine().table_len() <= 4);
    }
    assert_eq!(fabric.engine().table_len(), 4);
    drain_all(&fabric);

    // mac(10) was the oldest entry and got evicted; return traffic to it
    // must flood (never a stale unicast to port 0 alone)
    send(&fabric, 4, data_frame(mac(14), mac(10), 0x77));
    let drained = drain_all(&fabric);

    assert!(drained[4].is_empty());
    for port in 0..4usize {
        assert_eq!(drained[port].len(), 1, "port {} misses the flood", port);
        let frame = Frame::parse(&drained[port][0].bytes).unwrap();
        assert_eq!(frame.dst_mac(), mac(10));
    }
}

// ========================================
// VLAN isolation
// ========================================

fn vlan_fabric() -> Fabric {
    // Ports 0,1: access VLAN 10; port 2: access VLAN 20; port 3: trunk
    let mut vlans = VlanFilter::new();
    vlans.set_port_mode(0, PortVlanMode::Access { default_vlan: 10 });
    vlans.set_port_mode(1, PortVlanMode::Access { default_vlan: 10 });
    vlans.set_port_mode(2, PortVlanMode::Access { default_vlan: 20 });
    vlans.set_port_mode(3, PortVlanMode::Tagged);
    vlans.add_member(3, 10);
    vlans.add_member(3, 20);

    Fabric::new(FabricConfig {
        ports: (0..4)
            .map(|i| PortSettings {
                mac: mac(0xe0 + i as u8),
                ..Default::default()
            })
            .collect(),
        vlans,
        mac_capacity: 64,
        mac_max_age: 300,
        eviction: EvictionPolicy::NotRecentlyUsed,
        flood_on_miss: true,
        pause_quantum: 8,
        router: None,
    })
}

#[test]
fn test_vlan_isolation_on_flood() {
    let fabric = vlan_fabric();

    send(&fabric, 0, data_frame(mac(1), MacAddr::BROADCAST, 1));
    let drained = drain_all(&fabric);

    // VLAN 10 reaches its access peer and the trunk, never VLAN 20
    assert_eq!(drained[1].len(), 1);
    assert!(drained[2].is_empty());
    assert_eq!(drained[3].len(), 1);

    // Access egress is untagged, trunk egress carries the tag
    let access = Frame::parse(&drained[1][0].bytes).unwrap();
    assert!(access.vlan_tag().is_none());
    let trunk = Frame::parse(&drained[3][0].bytes).unwrap();
    assert_eq!(trunk.vlan_tag().unwrap().vid, 10);
}

#[test]
fn test_trunk_ingress_scoped_to_tag() {
    let fabric = vlan_fabric();

    send(&fabric, 3, tagged_frame(mac(5), MacAddr::BROADCAST, 20, 1));
    let drained = drain_all(&fabric);

    assert!(drained[0].is_empty());
    assert!(drained[1].is_empty());
    assert_eq!(drained[2].len(), 1);
    // Stripped on the access port
    let frame = Frame::parse(&drained[2][0].bytes).unwrap();
    assert!(frame.vlan_tag().is_none());
}

#[test]
fn test_wrong_tag_rejected_at_ingress() {
    let fabric = vlan_fabric();

    // VLAN 30 exists nowhere on port 3
    send(&fabric, 3, tagged_frame(mac(5), MacAddr::BROADCAST, 30, 1));
    for events in drain_all(&fabric) {
        assert!(events.is_empty());
    }
    let snap = fabric.stats().snapshot(3).unwrap();
    assert!(snap
        .drops
        .iter()
        .any(|(name, count)| *name == "vlan_violation" && *count == 1));
}

// ========================================
// IGMP snooping
// ========================================

#[test]
fn test_igmp_pruned_multicast_flood() {
    let fabric = flat_fabric(4, 64, true);
    let group_ip = Ipv4Addr::new(239, 1, 2, 3);
    let group = fabricsw::protocol::igmp::group_mac(group_ip);

    // Port 2 joins the group
    let report = IgmpPacket {
        igmp_type: IgmpType::MembershipReportV2,
        max_resp_time: 0,
        group: group_ip,
    };
    let ip = Ipv4Builder::new()
        .src_addr(Ipv4Addr::new(192, 168, 1, 2))
        .dst_addr(group_ip)
        .ttl(1)
        .protocol(ip_proto::IGMP)
        .payload(&report.to_bytes())
        .build();
    let join = FrameBuilder::new()
        .dst_mac(group)
        .src_mac(mac(3))
        .ethertype(EtherType::Ipv4 as u16)
        .payload(&ip)
        .build();
    send(&fabric, 2, join);
    drain_all(&fabric);

    // Multicast from port 0 goes to the listener only
    send(&fabric, 0, data_frame(mac(1), group, 7));
    let drained = drain_all(&fabric);
    assert!(drained[1].is_empty());
    assert_eq!(drained[2].len(), 1);
    assert!(drained[3].is_empty());
}

// ========================================
// Flow control
// ========================================

#[test]
fn test_pause_gates_egress_until_quantum_expiry() {
    let fabric = flat_fabric(4, 64, true);
    let b = mac(2);

    send(&fabric, 1, data_frame(b, MacAddr::BROADCAST, 0));
    drain_all(&fabric);

    for marker in 1..=3 {
        send(&fabric, 0, data_frame(mac(1), b, marker));
    }

    // Peer on port 1 asks for 2 quanta of silence
    send(
        &fabric,
        1,
        PauseFrame { quantum: 2 }.to_frame(mac(0xbb)),
    );

    assert!(fabric.drain(1, 64).is_empty());
    fabric.tick(1);
    assert!(fabric.drain(1, 64).is_empty());
    fabric.tick(2);

    // Quantum expired: everything comes out, in arrival order
    let events = fabric.drain(1, 64);
    assert_eq!(events.len(), 3);
    for (i, event) in events.iter().enumerate() {
        let frame = Frame::parse(&event.bytes).unwrap();
        assert_eq!(frame.payload()[0], i as u8 + 1);
    }
}

#[test]
fn test_resume_frame_releases_pause_early() {
    let fabric = flat_fabric(2, 64, true);
    let b = mac(2);
    send(&fabric, 1, data_frame(b, MacAddr::BROADCAST, 0));
    drain_all(&fabric);
    send(&fabric, 0, data_frame(mac(1), b, 1));

    send(
        &fabric,
        1,
        PauseFrame { quantum: 60000 }.to_frame(mac(0xbb)),
    );
    assert!(fabric.drain(1, 64).is_empty());

    // Quantum-0 resume unblocks without waiting
    send(&fabric, 1, PauseFrame { quantum: 0 }.to_frame(mac(0xbb)));
    assert_eq!(fabric.drain(1, 64).len(), 1);
}

#[test]
fn test_watermark_crossing_emits_pause_then_resume() {
    let mut vlans = VlanFilter::new();
    for p in 0..4 {
        vlans.set_port_mode(p, PortVlanMode::Access { default_vlan: 1 });
    }
    let fabric = Fabric::new(FabricConfig {
        ports: (0..4)
            .map(|i| PortSettings {
                mac: mac(0xe0 + i as u8),
                egress_lane_capacity: 8,
                high_watermark: 3,
                low_watermark: 1,
                ..Default::default()
            })
            .collect(),
        vlans,
        mac_capacity: 64,
        mac_max_age: 300,
        eviction: EvictionPolicy::NotRecentlyUsed,
        flood_on_miss: true,
        pause_quantum: 8,
        router: None,
    });

    // Three floods from port 0 push every other egress to the mark
    for marker in 0..3 {
        send(&fabric, 0, data_frame(mac(1), mac(0x99), marker));
    }

    // Budget 0: only the interleaved MAC control traffic comes out
    let control = fabric.drain(1, 0);
    assert_eq!(control.len(), 1);
    let frame = Frame::parse(&control[0].bytes).unwrap();
    assert_eq!(frame.ethertype(), EtherType::MacControl as u16);
    let pause = PauseFrame::parse(frame.payload()).unwrap();
    assert_eq!(pause.quantum, 8);

    // Draining under the low-water mark releases the peer
    let events = fabric.drain(1, 64);
    assert_eq!(events.len(), 4);
    let last = Frame::parse(&events[3].bytes).unwrap();
    assert_eq!(last.ethertype(), EtherType::MacControl as u16);
    assert!(PauseFrame::parse(last.payload()).unwrap().is_resume());

    let snap = fabric.stats().snapshot(1).unwrap();
    assert_eq!(snap.pause_tx, 2);
}

// ========================================
// Inline router
// ========================================

const HOST_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x01, 0x10]);
const GW_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x01, 0xee]);
const LOCAL_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x01, 0x01]);
const UPLINK_MAC: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x01, 0x02]);

fn router_config() -> RouterConfig {
    RouterConfig {
        local_ip: Ipv4Addr::new(192, 168, 1, 1),
        local_prefix_len: 24,
        local_mac: LOCAL_MAC,
        uplink_ip: Ipv4Addr::new(10, 0, 0, 2),
        uplink_mac: UPLINK_MAC,
        gateway_ip: Ipv4Addr::new(10, 0, 0, 1),
        gateway_mac: None,
        proxy_arp_to_uplink: false,
        proxy_arp_to_local: false,
        block_fragments: false,
        block_multicast: false,
        require_dst_mac_match: false,
        rewrite_source_mac: true,
        non_ipv4: NonIpv4Policy::Block,
        icmp_errors: false,
    }
}

/// Ports 0-2 local group, port 3 uplink with the router attached
fn routed_fabric_with(config: RouterConfig) -> Fabric {
    let mut vlans = VlanFilter::new();
    for p in 0..4 {
        vlans.set_port_mode(p, PortVlanMode::Access { default_vlan: 1 });
    }
    Fabric::new(FabricConfig {
        ports: (0..4)
            .map(|i| PortSettings {
                mac: mac(0xe0 + i as u8),
                ..Default::default()
            })
            .collect(),
        vlans,
        mac_capacity: 64,
        mac_max_age: 300,
        eviction: EvictionPolicy::NotRecentlyUsed,
        flood_on_miss: true,
        pause_quantum: 8,
        router: Some(RouterAttachment {
            uplink_port: 3,
            config,
            arp: ArpCacheConfig {
                max_pending: 4,
                retry_interval: 2,
                max_retries: 2,
                ..Default::default()
            },
        }),
    })
}

fn routed_fabric() -> Fabric {
    routed_fabric_with(router_config())
}

fn ipv4_to_remote(marker: u8) -> Vec<u8> {
    let mut payload = vec![0u8; 32];
    payload[0] = marker;
    let packet = Ipv4Builder::new()
        .src_addr(Ipv4Addr::new(192, 168, 1, 100))
        .dst_addr(Ipv4Addr::new(8, 8, 8, 8))
        .ttl(64)
        .protocol(ip_proto::UDP)
        .payload(&payload)
        .build();
    FrameBuilder::new()
        .dst_mac(LOCAL_MAC)
        .src_mac(HOST_MAC)
        .ethertype(EtherType::Ipv4 as u16)
        .payload(&packet)
        .build()
}

fn gateway_arp_reply() -> Vec<u8> {
    let reply = ArpPacket::reply(
        GW_MAC,
        Ipv4Addr::new(10, 0, 0, 1),
        UPLINK_MAC,
        Ipv4Addr::new(10, 0, 0, 2),
    );
    FrameBuilder::new()
        .dst_mac(UPLINK_MAC)
        .src_mac(GW_MAC)
        .ethertype(EtherType::Arp as u16)
        .payload(&reply.to_bytes())
        .build()
}

#[test]
fn test_arp_roundtrip_forwards_exactly_once() {
    let fabric = routed_fabric();

    // Local host sends toward the uplink; gateway is unresolved
    send(&fabric, 0, ipv4_to_remote(0x42));
    let first = fabric.drain(3, 64);
    assert_eq!(first.len(), 1);
    let request = Frame::parse(&first[0].bytes).unwrap();
    assert_eq!(request.ethertype(), EtherType::Arp as u16);
    let arp = ArpPacket::parse(request.payload()).unwrap();
    assert_eq!(arp.operation, ArpOp::Request);
    assert_eq!(arp.target_ip, Ipv4Addr::new(10, 0, 0, 1));

    // Reply lands 2 ticks later, well inside the timeout window
    fabric.tick(1);
    fabric.tick(2);
    send(&fabric, 3, gateway_arp_reply());

    // Exactly one IPv4 frame comes out, rewritten toward the gateway
    let mut ipv4_frames = 0;
    for event in fabric.drain(3, 64) {
        let frame = Frame::parse(&event.bytes).unwrap();
        if frame.ethertype() == EtherType::Ipv4 as u16 {
            ipv4_frames += 1;
            assert_eq!(frame.dst_mac(), GW_MAC);
            assert_eq!(frame.src_mac(), UPLINK_MAC);
            let header = Ipv4Header::parse(frame.payload()).unwrap();
            assert_eq!(header.ttl(), 63);
            assert_eq!(header.dst_addr(), Ipv4Addr::new(8, 8, 8, 8));
        }
    }
    assert_eq!(ipv4_frames, 1);

    // Nothing left pending; later ticks emit nothing for it
    for now in 3..10 {
        fabric.tick(now);
    }
    assert!(fabric.drain(3, 64).is_empty());
    let snap = fabric.stats().snapshot(3).unwrap();
    assert!(snap
        .drops
        .iter()
        .all(|(name, count)| *name != "arp_timeout" || *count == 0));
}

#[test]
fn test_arp_timeout_drops_and_counts() {
    let fabric = routed_fabric();

    send(&fabric, 0, ipv4_to_remote(1));
    send(&fabric, 0, ipv4_to_remote(2));
    drain_all(&fabric);

    // retry_interval 2, max_retries 2: retries at 2 and 4, expiry at 6
    for now in 1..=6 {
        fabric.tick(now);
    }

    let snap = fabric.stats().snapshot(3).unwrap();
    assert!(snap
        .drops
        .iter()
        .any(|(name, count)| *name == "arp_timeout" && *count == 2));

    // The retransmitted requests made it out; no data did
    for event in fabric.drain(3, 64) {
        let frame = Frame::parse(&event.bytes).unwrap();
        assert_eq!(frame.ethertype(), EtherType::Arp as u16);
    }
}

#[test]
fn test_uplink_to_local_is_routed_and_switched() {
    let fabric = routed_fabric();

    // The local host is known to the switch and the router's cache
    send(&fabric, 0, data_frame(HOST_MAC, MacAddr::BROADCAST, 0));
    drain_all(&fabric);
    let host_arp = ArpPacket::reply(
        HOST_MAC,
        Ipv4Addr::new(192, 168, 1, 100),
        LOCAL_MAC,
        Ipv4Addr::new(192, 168, 1, 1),
    );
    let host_arp_frame = FrameBuilder::new()
        .dst_mac(LOCAL_MAC)
        .src_mac(HOST_MAC)
        .ethertype(EtherType::Arp as u16)
        .payload(&host_arp.to_bytes())
        .build();
    send(&fabric, 0, host_arp_frame);
    drain_all(&fabric);

    // Traffic from the uplink toward the local host
    let packet = Ipv4Builder::new()
        .src_addr(Ipv4Addr::new(8, 8, 8, 8))
        .dst_addr(Ipv4Addr::new(192, 168, 1, 100))
        .ttl(64)
        .protocol(ip_proto::UDP)
        .payload(&[0u8; 32])
        .build();
    let inbound = FrameBuilder::new()
        .dst_mac(UPLINK_MAC)
        .src_mac(GW_MAC)
        .ethertype(EtherType::Ipv4 as u16)
        .payload(&packet)
        .build();
    send(&fabric, 3, inbound);

    // Unicast to the learned host port, rewritten by the router
    let drained = drain_all(&fabric);
    assert_eq!(drained[0].len(), 1);
    assert!(drained[1].is_empty());
    assert!(drained[2].is_empty());
    let frame = Frame::parse(&drained[0][0].bytes).unwrap();
    assert_eq!(frame.dst_mac(), HOST_MAC);
    assert_eq!(frame.src_mac(), LOCAL_MAC);
    let header = Ipv4Header::parse(frame.payload()).unwrap();
    assert_eq!(header.ttl(), 63);
}

#[test]
fn test_proxy_arp_answers_on_local_segment() {
    let mut config = router_config();
    config.proxy_arp_to_uplink = true;
    let fabric = routed_fabric_with(config);

    // Host asks for an uplink-side address
    let request = ArpPacket::request(
        HOST_MAC,
        Ipv4Addr::new(192, 168, 1, 100),
        Ipv4Addr::new(10, 0, 0, 7),
    );
    let request_frame = FrameBuilder::new()
        .dst_mac(MacAddr::BROADCAST)
        .src_mac(HOST_MAC)
        .ethertype(EtherType::Arp as u16)
        .payload(&request.to_bytes())
        .build();
    send(&fabric, 0, request_frame);

    let drained = drain_all(&fabric);

    // The broadcast floods the local group; the router's proxy reply is
    // switched back to the asker instead of crossing the uplink
    for event in &drained[3] {
        let frame = Frame::parse(&event.bytes).unwrap();
        assert_ne!(
            frame.ethertype(),
            EtherType::Arp as u16,
            "request must not cross into the uplink"
        );
    }
    let reply_event = drained[0]
        .iter()
        .find(|e| {
            Frame::parse(&e.bytes)
                .map(|f| f.ethertype() == EtherType::Arp as u16)
                .unwrap_or(false)
        })
        .expect("proxy reply delivered to the asker");
    let reply = ArpPacket::parse(Frame::parse(&reply_event.bytes).unwrap().payload()).unwrap();
    assert_eq!(reply.operation, ArpOp::Reply);
    assert_eq!(reply.sender_ip, Ipv4Addr::new(10, 0, 0, 7));
    assert_eq!(reply.sender_mac, LOCAL_MAC);
}

// ========================================
// Control surface
// ========================================

#[test]
fn test_config_write_applies_at_frame_boundary() {
    let fabric = flat_fabric(4, 64, true);

    let response = fabric.control(ControlRequest::SetFloodOnMiss(false)).unwrap();
    assert!(matches!(response, ControlResponse::Accepted));

    // The write lands before this frame is processed
    send(&fabric, 1, data_frame(mac(1), mac(0x99), 1));
    for events in drain_all(&fabric) {
        assert!(events.is_empty());
    }
}

#[test]
fn test_conflicting_static_mac_rejected() {
    let fabric = flat_fabric(4, 64, true);

    // Port 0 is only a member of VLAN 1
    let err = fabric
        .control(ControlRequest::AddStaticMac {
            mac: mac(1),
            vlan: 20,
            port: 0,
        })
        .unwrap_err();
    assert!(err.to_string().contains("not a member"));

    // Non-unicast static entries are refused too
    assert!(fabric
        .control(ControlRequest::AddStaticMac {
            mac: MacAddr::BROADCAST,
            vlan: 1,
            port: 0,
        })
        .is_err());
}

#[test]
fn test_static_mac_drives_forwarding() {
    let fabric = flat_fabric(4, 64, true);

    fabric
        .control(ControlRequest::AddStaticMac {
            mac: mac(7),
            vlan: 1,
            port: 2,
        })
        .unwrap();
    fabric.tick(1);

    match fabric
        .control(ControlRequest::QueryMac { mac: mac(7), vlan: 1 })
        .unwrap()
    {
        ControlResponse::MacEntry(Some(view)) => {
            assert_eq!(view.port, 2);
            assert!(view.is_static);
        }
        other => panic!("unexpected response: {:?}", other),
    }

    send(&fabric, 0, data_frame(mac(1), mac(7), 1));
    let drained = drain_all(&fabric);
    assert_eq!(drained[2].len(), 1);
    assert!(drained[1].is_empty());
    assert!(drained[3].is_empty());
}

#[test]
fn test_port_down_flushes_and_drops() {
    let fabric = flat_fabric(4, 64, true);
    let b = mac(2);
    send(&fabric, 1, data_frame(b, MacAddr::BROADCAST, 0));
    drain_all(&fabric);
    assert_eq!(fabric.engine().table_len(), 1);

    // Park a frame in port 1's egress, then take the port down
    send(&fabric, 0, data_frame(mac(1), b, 1));
    fabric
        .control(ControlRequest::SetPortEnabled { port: 1, up: false })
        .unwrap();
    fabric.tick(1);

    assert!(fabric.drain(1, 64).is_empty());
    // b's entry went with the port; mac(1), learned on port 0, stays
    assert_eq!(fabric.engine().table_len(), 1);
    assert!(fabric
        .control(ControlRequest::QueryMac { mac: b, vlan: 1 })
        .is_ok_and(|r| matches!(r, ControlResponse::MacEntry(None))));

    let snap = fabric.stats().snapshot(1).unwrap();
    assert!(snap
        .drops
        .iter()
        .any(|(name, count)| *name == "port_down" && *count >= 1));

    // Ingress on a downed port is refused
    send(&fabric, 1, data_frame(b, MacAddr::BROADCAST, 2));
    assert_eq!(fabric.engine().table_len(), 1);
}

#[test]
fn test_length_policy_updated_at_runtime() {
    let fabric = flat_fabric(2, 64, true);

    let jumbo = vec![0u8; 1950];
    let frame = FrameBuilder::new()
        .dst_mac(MacAddr::BROADCAST)
        .src_mac(mac(1))
        .ethertype(0x88B5)
        .payload(&jumbo)
        .build();

    send(&fabric, 0, frame.clone());
    assert!(fabric.drain(1, 64).is_empty());
    let snap = fabric.stats().snapshot(0).unwrap();
    assert!(snap
        .drops
        .iter()
        .any(|(name, count)| *name == "jumbo" && *count == 1));

    fabric
        .control(ControlRequest::SetLengthPolicy {
            port: 0,
            policy: fabricsw::dataplane::LengthPolicy {
                accept_runts: false,
                accept_jumbo: true,
            },
        })
        .unwrap();

    send(&fabric, 0, frame);
    assert_eq!(fabric.drain(1, 64).len(), 1);
}

#[test]
fn test_watermark_write_validated() {
    let fabric = flat_fabric(2, 64, true);

    assert!(fabric
        .control(ControlRequest::SetWatermarks {
            port: 0,
            high: 4,
            low: 4,
        })
        .is_err());
    assert!(fabric
        .control(ControlRequest::SetWatermarks {
            port: 0,
            high: 8,
            low: 2,
        })
        .is_ok());
}

#[test]
fn test_invalid_control_writes_rejected() {
    let fabric = flat_fabric(2, 64, true);

    assert!(fabric
        .control(ControlRequest::SetPortEnabled { port: 9, up: true })
        .is_err());
    assert!(fabric
        .control(ControlRequest::AddVlanMember { port: 0, vlan: 4095 })
        .is_err());
    // No router attached
    assert!(fabric
        .control(ControlRequest::SetRouterConfig(Box::new(router_config())))
        .is_err());
}

// ========================================
// Statistics
// ========================================

#[test]
fn test_counters_track_traffic() {
    let fabric = flat_fabric(2, 64, true);

    send(&fabric, 0, data_frame(mac(1), MacAddr::BROADCAST, 1));
    drain_all(&fabric);

    let rx = fabric.stats().snapshot(0).unwrap();
    assert_eq!(rx.rx_frames, 1);
    assert!(rx.rx_bytes >= 60);
    let tx = fabric.stats().snapshot(1).unwrap();
    assert_eq!(tx.tx_frames, 1);

    fabric.control(ControlRequest::ResetStats).unwrap();
    assert_eq!(fabric.stats().snapshot(0).unwrap().rx_frames, 0);
}
