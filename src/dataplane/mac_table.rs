//! MAC address table
//!
//! Bounded associative map from (MAC, VLAN) to egress port, the shared
//! heart of the forwarding engine. Capacity is fixed at construction;
//! when full, a not-recently-used entry is evicted or, under the
//! no-evict policy, the learn is silently rejected. Aging is driven by
//! an external tick through `scrub`.

use crate::dataplane::port::{PortId, Tick};
use crate::protocol::MacAddr;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// VLAN identifier
pub type VlanId = u16;

/// What to do when a learn arrives at a full table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Evict an entry whose usage bit is clear (oldest first)
    #[default]
    NotRecentlyUsed,
    /// Decline the learn; the table keeps its current contents
    NoEvict,
}

/// Result of a learn attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LearnOutcome {
    /// New entry inserted
    Inserted,
    /// Existing entry refreshed in place
    Refreshed,
    /// Source moved to a different port (topology change)
    Moved { previous_port: PortId },
    /// An entry was evicted to make room
    Evicted { victim: (MacAddr, VlanId) },
    /// Table full and the policy declines eviction
    Rejected,
}

#[derive(Debug)]
struct MacEntry {
    port: PortId,
    last_seen: Tick,
    /// NRU usage bit; set on lookup, cleared by scrub
    referenced: AtomicBool,
    /// Static entries come from the control surface and never age or evict
    is_static: bool,
}

/// A table entry as reported to the control surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacTableView {
    pub mac: MacAddr,
    pub vlan: VlanId,
    pub port: PortId,
    pub last_seen: Tick,
    pub is_static: bool,
}

/// Bounded MAC address table
#[derive(Debug)]
pub struct MacTable {
    entries: HashMap<(MacAddr, VlanId), MacEntry>,
    capacity: usize,
    max_age: Tick,
    policy: EvictionPolicy,
}

impl MacTable {
    pub fn new(capacity: usize, max_age: Tick, policy: EvictionPolicy) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            capacity,
            max_age,
            policy,
        }
    }

    /// Learn a source MAC on a port
    ///
    /// Broadcast and multicast sources are never learned. Re-learning the
    /// same key refreshes the entry; a different port moves it. A full
    /// table applies the eviction policy first.
    pub fn learn(&mut self, mac: MacAddr, vlan: VlanId, port: PortId, now: Tick) -> LearnOutcome {
        if mac.is_broadcast() || mac.is_multicast() {
            return LearnOutcome::Rejected;
        }

        if let Some(entry) = self.entries.get_mut(&(mac, vlan)) {
            // Learning never demotes a static binding
            if entry.is_static {
                return LearnOutcome::Refreshed;
            }
            entry.last_seen = now;
            entry.referenced.store(true, Ordering::Relaxed);
            if entry.port != port {
                let previous_port = entry.port;
                entry.port = port;
                return LearnOutcome::Moved { previous_port };
            }
            return LearnOutcome::Refreshed;
        }

        let mut evicted = None;
        if self.entries.len() >= self.capacity {
            match self.policy {
                EvictionPolicy::NoEvict => return LearnOutcome::Rejected,
                EvictionPolicy::NotRecentlyUsed => match self.pick_victim() {
                    Some(victim) => {
                        self.entries.remove(&victim);
                        evicted = Some(victim);
                    }
                    // Every slot is static: nothing to evict
                    None => return LearnOutcome::Rejected,
                },
            }
        }

        self.entries.insert(
            (mac, vlan),
            MacEntry {
                port,
                last_seen: now,
                referenced: AtomicBool::new(true),
                is_static: false,
            },
        );

        match evicted {
            Some(victim) => LearnOutcome::Evicted { victim },
            None => LearnOutcome::Inserted,
        }
    }

    /// Look up the egress port for a destination
    ///
    /// Sets the entry's usage bit, which protects it from NRU eviction
    /// until the next scrub.
    pub fn lookup(&self, mac: &MacAddr, vlan: VlanId) -> Option<PortId> {
        self.entries.get(&(*mac, vlan)).map(|entry| {
            entry.referenced.store(true, Ordering::Relaxed);
            entry.port
        })
    }

    /// Victim selection: prefer a dynamic entry with a clear usage bit,
    /// oldest first; fall back to the oldest dynamic entry.
    fn pick_victim(&self) -> Option<(MacAddr, VlanId)> {
        let mut unreferenced: Option<(&(MacAddr, VlanId), Tick)> = None;
        let mut oldest: Option<(&(MacAddr, VlanId), Tick)> = None;

        for (key, entry) in &self.entries {
            if entry.is_static {
                continue;
            }
            if oldest.is_none() || entry.last_seen < oldest.unwrap().1 {
                oldest = Some((key, entry.last_seen));
            }
            if !entry.referenced.load(Ordering::Relaxed)
                && (unreferenced.is_none() || entry.last_seen < unreferenced.unwrap().1)
            {
                unreferenced = Some((key, entry.last_seen));
            }
        }

        unreferenced.or(oldest).map(|(key, _)| *key)
    }

    /// Insert a static entry (control surface)
    ///
    /// Static entries bypass capacity accounting the way TCAM pinned rows
    /// do not: they still occupy a slot, so insertion fails on a table
    /// filled with other static entries.
    pub fn insert_static(&mut self, mac: MacAddr, vlan: VlanId, port: PortId) -> bool {
        if let Some(entry) = self.entries.get_mut(&(mac, vlan)) {
            entry.port = port;
            entry.is_static = true;
            return true;
        }
        if self.entries.len() >= self.capacity {
            match self.pick_victim() {
                Some(victim) => {
                    self.entries.remove(&victim);
                }
                None => return false,
            }
        }
        self.entries.insert(
            (mac, vlan),
            MacEntry {
                port,
                last_seen: 0,
                referenced: AtomicBool::new(true),
                is_static: true,
            },
        );
        true
    }

    /// Remove one entry (control surface)
    pub fn remove(&mut self, mac: &MacAddr, vlan: VlanId) -> bool {
        self.entries.remove(&(*mac, vlan)).is_some()
    }

    /// Query one entry (control surface)
    pub fn query(&self, mac: &MacAddr, vlan: VlanId) -> Option<MacTableView> {
        self.entries.get(&(*mac, vlan)).map(|e| MacTableView {
            mac: *mac,
            vlan,
            port: e.port,
            last_seen: e.last_seen,
            is_static: e.is_static,
        })
    }

    /// Age out stale dynamic entries and clear usage bits
    ///
    /// Called from the periodic scrub task. Returns the number removed.
    pub fn scrub(&mut self, now: Tick) -> usize {
        let max_age = self.max_age;
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            entry.is_static || now.saturating_sub(entry.last_seen) < max_age
        });
        for entry in self.entries.values_mut() {
            entry.referenced.store(false, Ordering::Relaxed);
        }
        before - self.entries.len()
    }

    /// Drop all dynamic entries learned on a port (port-down transition)
    pub fn flush_port(&mut self, port: PortId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.is_static || entry.port != port);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn set_max_age(&mut self, max_age: Tick) {
        self.max_age = max_age;
    }
}
