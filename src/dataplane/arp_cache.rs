//! ARP cache with pending-resolution buffers
//!
//! Each unresolved next hop owns a bounded buffer of frames waiting for
//! its MAC. Resolution is timer-driven: a pending entry retransmits its
//! request a configured number of times and then expires, dropping the
//! buffered frames. There is no blocking wait anywhere.

use crate::dataplane::port::Tick;
use crate::protocol::MacAddr;
use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;

/// Resolution state of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArpState {
    /// Request sent, awaiting reply; frames buffered
    Pending,
    /// Binding valid
    Resolved,
    /// Binding old; next use re-resolves
    Stale,
}

/// What to drop when a pending buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingDropPolicy {
    /// Make room by dropping the oldest buffered frame
    #[default]
    DropOldest,
    /// Reject the newly arriving frame
    DropNewest,
}

/// Outcome of buffering a frame against an unresolved entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOutcome {
    /// Frame buffered
    Queued,
    /// Frame buffered after evicting the oldest one
    QueuedDroppedOldest,
    /// Buffer full; the new frame was rejected
    RejectedNewest,
}

/// Per-resolution timer events produced by `tick`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickAction {
    /// Retransmit the ARP request for this address
    Retry(Ipv4Addr),
    /// Resolution gave up; the buffered frames were dropped
    Expired { ip: Ipv4Addr, dropped: usize },
}

#[derive(Debug)]
struct CacheEntry {
    mac: MacAddr,
    state: ArpState,
    last_update: Tick,
    pending: VecDeque<Vec<u8>>,
    retries_left: u8,
    next_retry: Tick,
}

/// Tunables for the cache
#[derive(Debug, Clone, Copy)]
pub struct ArpCacheConfig {
    /// Frames buffered per unresolved address
    pub max_pending: usize,
    pub pending_policy: PendingDropPolicy,
    /// Ticks between request retransmissions
    pub retry_interval: Tick,
    /// Retransmissions before the entry expires
    pub max_retries: u8,
    /// Ticks a resolved binding stays fresh
    pub resolved_ttl: Tick,
    /// Ticks a stale binding lingers before removal
    pub stale_ttl: Tick,
}

impl Default for ArpCacheConfig {
    fn default() -> Self {
        Self {
            max_pending: 4,
            pending_policy: PendingDropPolicy::DropOldest,
            retry_interval: 2,
            max_retries: 2,
            resolved_ttl: 60,
            stale_ttl: 240,
        }
    }
}

/// The cache proper
#[derive(Debug)]
pub struct ArpCache {
    entries: HashMap<Ipv4Addr, CacheEntry>,
    config: ArpCacheConfig,
}

impl ArpCache {
    pub fn new(config: ArpCacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
        }
    }

    /// Usable binding for a next hop, if resolved
    pub fn resolve(&self, ip: &Ipv4Addr) -> Option<MacAddr> {
        self.entries
            .get(ip)
            .filter(|e| e.state == ArpState::Resolved)
            .map(|e| e.mac)
    }

    pub fn state(&self, ip: &Ipv4Addr) -> Option<ArpState> {
        self.entries.get(ip).map(|e| e.state)
    }

    pub fn pending_len(&self, ip: &Ipv4Addr) -> usize {
        self.entries.get(ip).map_or(0, |e| e.pending.len())
    }

    /// Buffer a frame against an unresolved address
    ///
    /// Creates (or revives) the Pending entry. The bool is true when a
    /// fresh ARP request should be emitted, i.e. the entry just entered
    /// Pending.
    pub fn queue_pending(
        &mut self,
        ip: Ipv4Addr,
        frame: Vec<u8>,
        now: Tick,
    ) -> (PendingOutcome, bool) {
        let config = self.config;
        let entry = self.entries.entry(ip).or_insert_with(|| CacheEntry {
            mac: MacAddr::ZERO,
            state: ArpState::Stale,
            last_update: now,
            pending: VecDeque::new(),
            retries_left: 0,
            next_retry: 0,
        });

        let request_needed = entry.state != ArpState::Pending;
        if request_needed {
            entry.state = ArpState::Pending;
            entry.last_update = now;
            entry.retries_left = config.max_retries;
            entry.next_retry = now + config.retry_interval;
        }

        let outcome = if entry.pending.len() >= config.max_pending {
            match config.pending_policy {
                PendingDropPolicy::DropOldest => {
                    entry.pending.pop_front();
                    entry.pending.push_back(frame);
                    PendingOutcome::QueuedDroppedOldest
                }
                PendingDropPolicy::DropNewest => PendingOutcome::RejectedNewest,
            }
        } else {
            entry.pending.push_back(frame);
            PendingOutcome::Queued
        };

        (outcome, request_needed)
    }

    /// Learn a binding from an observed ARP packet
    pub fn insert(&mut self, ip: Ipv4Addr, mac: MacAddr, now: Tick) {
        let entry = self.entries.entry(ip).or_insert_with(|| CacheEntry {
            mac,
            state: ArpState::Resolved,
            last_update: now,
            pending: VecDeque::new(),
            retries_left: 0,
            next_retry: 0,
        });
        entry.mac = mac;
        entry.state = ArpState::Resolved;
        entry.last_update = now;
    }

    /// A matching reply arrived: resolve and hand back the buffered frames
    /// in their original arrival order
    pub fn complete(&mut self, ip: Ipv4Addr, mac: MacAddr, now: Tick) -> Vec<Vec<u8>> {
        match self.entries.get_mut(&ip) {
            Some(entry) => {
                entry.mac = mac;
                entry.state = ArpState::Resolved;
                entry.last_update = now;
                entry.pending.drain(..).collect()
            }
            None => {
                self.insert(ip, mac, now);
                Vec::new()
            }
        }
    }

    /// Advance the resolution and aging timers
    pub fn tick(&mut self, now: Tick) -> Vec<TickAction> {
        let mut actions = Vec::new();
        let config = self.config;
        let mut expired = Vec::new();

        for (ip, entry) in self.entries.iter_mut() {
            match entry.state {
                ArpState::Pending => {
                    if now >= entry.next_retry {
                        if entry.retries_left > 0 {
                            entry.retries_left -= 1;
                            entry.next_retry = now + config.retry_interval;
                            actions.push(TickAction::Retry(*ip));
                        } else {
                            expired.push(*ip);
                        }
                    }
                }
                ArpState::Resolved => {
                    if now.saturating_sub(entry.last_update) >= config.resolved_ttl {
                        entry.state = ArpState::Stale;
                    }
                }
                ArpState::Stale => {
                    if now.saturating_sub(entry.last_update) >= config.stale_ttl {
                        expired.push(*ip);
                    }
                }
            }
        }

        for ip in expired {
            let entry = self.entries.remove(&ip).unwrap();
            if entry.state == ArpState::Pending {
                actions.push(TickAction::Expired {
                    ip,
                    dropped: entry.pending.len(),
                });
            }
        }

        actions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
