//! VLAN filtering and retagging
//!
//! Membership is static configuration: a set of (port, VLAN) pairs plus a
//! per-port mode. Access ports carry a single untagged VLAN; tagged ports
//! carry any of their member VLANs with the 802.1Q tag on the wire.

use crate::dataplane::mac_table::VlanId;
use crate::dataplane::port::PortId;
use crate::protocol::ethernet;
use crate::protocol::VlanTag;
use std::collections::{HashMap, HashSet};

/// Default VLAN for unconfigured ports
pub const DEFAULT_VLAN: VlanId = 1;

/// How a port carries VLANs on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortVlanMode {
    /// Untagged port; frames implicitly belong to the default VLAN
    Access { default_vlan: VlanId },
    /// 802.1Q trunk; frames carry their tag
    Tagged,
}

impl Default for PortVlanMode {
    fn default() -> Self {
        PortVlanMode::Access {
            default_vlan: DEFAULT_VLAN,
        }
    }
}

/// The VLAN a frame resolved to, with its priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedVlan {
    pub vlan: VlanId,
    pub pcp: u8,
}

/// Port/VLAN membership and tagging rules
#[derive(Debug, Default)]
pub struct VlanFilter {
    membership: HashSet<(PortId, VlanId)>,
    modes: HashMap<PortId, PortVlanMode>,
}

impl VlanFilter {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================
    // Membership management
    // ========================================

    pub fn set_port_mode(&mut self, port: PortId, mode: PortVlanMode) {
        self.modes.insert(port, mode);
        // An access port is implicitly a member of its default VLAN
        if let PortVlanMode::Access { default_vlan } = mode {
            self.membership.insert((port, default_vlan));
        }
    }

    pub fn port_mode(&self, port: PortId) -> PortVlanMode {
        self.modes.get(&port).copied().unwrap_or_default()
    }

    pub fn add_member(&mut self, port: PortId, vlan: VlanId) {
        self.membership.insert((port, vlan));
    }

    pub fn remove_member(&mut self, port: PortId, vlan: VlanId) {
        self.membership.remove(&(port, vlan));
    }

    pub fn is_member(&self, port: PortId, vlan: VlanId) -> bool {
        self.membership.contains(&(port, vlan))
    }

    /// All member ports of a VLAN, for flood scoping
    pub fn members(&self, vlan: VlanId) -> Vec<PortId> {
        let mut ports: Vec<PortId> = self
            .membership
            .iter()
            .filter(|(_, v)| *v == vlan)
            .map(|(p, _)| *p)
            .collect();
        ports.sort_unstable();
        ports
    }

    /// Remove a port from all VLANs (port-down transition)
    pub fn flush_port(&mut self, port: PortId) {
        self.membership.retain(|(p, _)| *p != port);
        self.modes.remove(&port);
    }

    // ========================================
    // Admission
    // ========================================

    /// Resolve a frame's VLAN on ingress
    ///
    /// Returns None when the frame must be rejected:
    /// - tagged frame on an access port with a different VLAN
    /// - resolved VLAN not in the ingress port's membership
    pub fn admit(&self, tag: Option<VlanTag>, port: PortId) -> Option<ResolvedVlan> {
        let resolved = match (self.port_mode(port), tag) {
            (PortVlanMode::Access { default_vlan }, None) => ResolvedVlan {
                vlan: default_vlan,
                pcp: 0,
            },
            (PortVlanMode::Access { default_vlan }, Some(tag)) => {
                // Tag allowed only if it names the access VLAN
                if tag.vid != default_vlan {
                    return None;
                }
                ResolvedVlan {
                    vlan: tag.vid,
                    pcp: tag.pcp,
                }
            }
            (PortVlanMode::Tagged, Some(tag)) => ResolvedVlan {
                vlan: tag.vid,
                pcp: tag.pcp,
            },
            // Untagged on a trunk: assigned the default VLAN
            (PortVlanMode::Tagged, None) => ResolvedVlan {
                vlan: DEFAULT_VLAN,
                pcp: 0,
            },
        };

        if !self.is_member(port, resolved.vlan) {
            return None;
        }
        Some(resolved)
    }

    // ========================================
    // Egress retagging
    // ========================================

    /// Produce the on-wire frame for an egress port
    ///
    /// `canonical` is the untagged form of the frame. Tagged ports get the
    /// 802.1Q tag inserted; access ports emit it untagged.
    pub fn retag(&self, canonical: &[u8], port: PortId, vlan: VlanId, pcp: u8) -> Vec<u8> {
        match self.port_mode(port) {
            PortVlanMode::Access { .. } => canonical.to_vec(),
            PortVlanMode::Tagged => {
                ethernet::insert_vlan_tag(canonical, VlanTag::with_pcp(vlan, pcp))
            }
        }
    }
}
