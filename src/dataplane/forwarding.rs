//! Forwarding engine
//!
//! Owns the shared MAC table and the IGMP snooping state, and turns a
//! destination into an egress port set. Learning takes the write lock,
//! lookups the read lock; each call observes a consistent table, so a
//! lookup after a completed learn always sees it (read-after-write, no
//! global ordering promise across ports).

use crate::dataplane::mac_table::{
    EvictionPolicy, LearnOutcome, MacTable, MacTableView, VlanId,
};
use crate::dataplane::port::{PortId, Tick};
use crate::protocol::MacAddr;
use crate::telemetry::DropCause;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Default multicast group membership lifetime, in ticks
pub const DEFAULT_GROUP_TTL: Tick = 260;

/// Per-frame forwarding decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Exact unicast hit
    Unicast(PortId),
    /// Send on every listed port
    Flood(Vec<PortId>),
    /// Destination lives on the ingress port; nothing to do
    Filter,
    /// Discard, with the cause to count
    Drop(DropCause),
}

/// IGMP snooping state: which ports asked for which group
#[derive(Debug, Default)]
pub struct GroupTable {
    /// (group MAC, VLAN) -> port -> last report tick
    groups: HashMap<(MacAddr, VlanId), HashMap<PortId, Tick>>,
}

impl GroupTable {
    pub fn join(&mut self, group: MacAddr, vlan: VlanId, port: PortId, now: Tick) {
        self.groups.entry((group, vlan)).or_default().insert(port, now);
    }

    pub fn leave(&mut self, group: MacAddr, vlan: VlanId, port: PortId) {
        if let Some(ports) = self.groups.get_mut(&(group, vlan)) {
            ports.remove(&port);
            if ports.is_empty() {
                self.groups.remove(&(group, vlan));
            }
        }
    }

    /// Member ports, if the group is tracked at all
    pub fn members(&self, group: MacAddr, vlan: VlanId) -> Option<Vec<PortId>> {
        self.groups.get(&(group, vlan)).map(|ports| {
            let mut v: Vec<PortId> = ports.keys().copied().collect();
            v.sort_unstable();
            v
        })
    }

    /// Expire memberships not refreshed within `ttl`
    pub fn scrub(&mut self, now: Tick, ttl: Tick) -> usize {
        let mut removed = 0;
        for ports in self.groups.values_mut() {
            let before = ports.len();
            ports.retain(|_, last| now.saturating_sub(*last) < ttl);
            removed += before - ports.len();
        }
        self.groups.retain(|_, ports| !ports.is_empty());
        removed
    }

    pub fn flush_port(&mut self, port: PortId) {
        for ports in self.groups.values_mut() {
            ports.remove(&port);
        }
        self.groups.retain(|_, ports| !ports.is_empty());
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// The forwarding engine shared by all port workers
#[derive(Debug)]
pub struct ForwardingEngine {
    table: RwLock<MacTable>,
    groups: RwLock<GroupTable>,
    /// Flood unknown unicast instead of dropping it
    flood_on_miss: AtomicBool,
    group_ttl: Tick,
}

impl ForwardingEngine {
    pub fn new(
        capacity: usize,
        max_age: Tick,
        policy: EvictionPolicy,
        flood_on_miss: bool,
    ) -> Self {
        Self {
            table: RwLock::new(MacTable::new(capacity, max_age, policy)),
            groups: RwLock::new(GroupTable::default()),
            flood_on_miss: AtomicBool::new(flood_on_miss),
            group_ttl: DEFAULT_GROUP_TTL,
        }
    }

    pub fn set_flood_on_miss(&self, flood: bool) {
        self.flood_on_miss.store(flood, Ordering::Relaxed);
    }

    /// Learn a source address
    pub fn learn(&self, src: MacAddr, vlan: VlanId, port: PortId, now: Tick) -> LearnOutcome {
        self.table.write().unwrap().learn(src, vlan, port, now)
    }

    /// Decide the egress port set for a destination
    ///
    /// `members` is the VLAN's port membership, from which flood sets are
    /// scoped; the ingress port is always excluded.
    pub fn decide(
        &self,
        dst: &MacAddr,
        vlan: VlanId,
        ingress_port: PortId,
        members: &[PortId],
    ) -> Decision {
        let flood = |only: Option<&[PortId]>| -> Vec<PortId> {
            members
                .iter()
                .copied()
                .filter(|p| *p != ingress_port)
                .filter(|p| only.map_or(true, |set| set.contains(p)))
                .collect()
        };

        if dst.is_broadcast() {
            return Decision::Flood(flood(None));
        }

        if dst.is_multicast() {
            // Snooping prunes the flood to reported listeners
            let tracked = self.groups.read().unwrap().members(*dst, vlan);
            return match tracked {
                Some(listeners) => Decision::Flood(flood(Some(&listeners))),
                None => Decision::Flood(flood(None)),
            };
        }

        match self.table.read().unwrap().lookup(dst, vlan) {
            Some(port) if port == ingress_port => Decision::Filter,
            Some(port) => {
                // A learned port outside the VLAN membership would leak
                // across broadcast domains; never emit there.
                if members.contains(&port) {
                    Decision::Unicast(port)
                } else {
                    Decision::Drop(DropCause::VlanViolation)
                }
            }
            None => {
                if self.flood_on_miss.load(Ordering::Relaxed) {
                    Decision::Flood(flood(None))
                } else {
                    Decision::Drop(DropCause::MissNoFlood)
                }
            }
        }
    }

    // ========================================
    // IGMP snooping
    // ========================================

    pub fn igmp_join(&self, group: MacAddr, vlan: VlanId, port: PortId, now: Tick) {
        self.groups.write().unwrap().join(group, vlan, port, now);
    }

    pub fn igmp_leave(&self, group: MacAddr, vlan: VlanId, port: PortId) {
        self.groups.write().unwrap().leave(group, vlan, port);
    }

    pub fn group_count(&self) -> usize {
        self.groups.read().unwrap().len()
    }

    // ========================================
    // Control surface
    // ========================================

    pub fn insert_static(&self, mac: MacAddr, vlan: VlanId, port: PortId) -> bool {
        self.table.write().unwrap().insert_static(mac, vlan, port)
    }

    pub fn remove_entry(&self, mac: &MacAddr, vlan: VlanId) -> bool {
        self.table.write().unwrap().remove(mac, vlan)
    }

    pub fn query(&self, mac: &MacAddr, vlan: VlanId) -> Option<MacTableView> {
        self.table.read().unwrap().query(mac, vlan)
    }

    pub fn table_len(&self) -> usize {
        self.table.read().unwrap().len()
    }

    pub fn set_max_age(&self, max_age: Tick) {
        self.table.write().unwrap().set_max_age(max_age);
    }

    // ========================================
    // Maintenance
    // ========================================

    /// Age the MAC table and group memberships; returns (macs, groups) removed
    pub fn scrub(&self, now: Tick) -> (usize, usize) {
        let macs = self.table.write().unwrap().scrub(now);
        let groups = self.groups.write().unwrap().scrub(now, self.group_ttl);
        (macs, groups)
    }

    /// Forget everything learned on a downed port
    pub fn flush_port(&self, port: PortId) -> usize {
        let removed = self.table.write().unwrap().flush_port(port);
        self.groups.write().unwrap().flush_port(port);
        removed
    }
}
