//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// User-defined configuration (config.toml)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub switch: SwitchConfig,
    #[serde(default)]
    pub ports: HashMap<String, PortConfig>,
    #[serde(default)]
    pub router: Option<RouterSectionConfig>,
    #[serde(default)]
    pub static_macs: Vec<StaticMacConfig>,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwitchConfig {
    pub mac_table_capacity: Option<usize>,
    /// Scrub ticks before an idle entry ages out
    pub mac_max_age: Option<u64>,
    #[serde(default)]
    pub eviction: EvictionConfig,
    pub flood_on_miss: Option<bool>,
    pub pause_quantum: Option<u16>,
    /// Milliseconds between scrub ticks in run mode
    pub tick_interval_ms: Option<u64>,
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            mac_table_capacity: None,
            mac_max_age: None,
            eviction: EvictionConfig::default(),
            flood_on_miss: None,
            pause_quantum: None,
            tick_interval_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionConfig {
    #[default]
    Nru,
    NoEvict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortMode {
    #[default]
    Access,
    Trunk,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortConfig {
    /// Position of this port in the fabric; must be dense from 0
    pub index: u32,
    #[serde(default)]
    pub mode: PortMode,
    /// Access mode: the untagged VLAN
    pub default_vlan: Option<u16>,
    /// Trunk mode: carried VLANs
    #[serde(default)]
    pub vlans: Vec<u16>,
    pub mac: Option<String>,
    #[serde(default)]
    pub verify_fcs: bool,
    #[serde(default)]
    pub emit_fcs: bool,
    #[serde(default)]
    pub accept_runts: bool,
    #[serde(default)]
    pub accept_jumbo: bool,
    pub ingress_capacity: Option<usize>,
    pub egress_lane_capacity: Option<usize>,
    pub high_watermark: Option<usize>,
    pub low_watermark: Option<usize>,
    pub pcp_threshold: Option<u8>,
    pub normal_weight: Option<u32>,
    pub rate: Option<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterSectionConfig {
    /// Name of the port facing the uplink network
    pub uplink: String,
    /// Router address and prefix on the local subnet, CIDR
    pub local_network: String,
    /// Router address on the uplink face
    pub uplink_address: String,
    /// Next hop for traffic leaving the local subnet
    pub gateway: String,
    /// Static gateway binding; skips ARP when set
    pub gateway_mac: Option<String>,
    /// Router MAC on the local face; defaults to the uplink port MAC
    pub local_mac: Option<String>,
    /// Router MAC on the uplink face; defaults to the uplink port MAC
    pub uplink_mac: Option<String>,
    #[serde(default)]
    pub proxy_arp_to_uplink: bool,
    #[serde(default)]
    pub proxy_arp_to_local: bool,
    #[serde(default)]
    pub block_fragments: bool,
    #[serde(default)]
    pub block_multicast: bool,
    #[serde(default)]
    pub require_dst_mac_match: bool,
    pub rewrite_source_mac: Option<bool>,
    #[serde(default)]
    pub non_ipv4: NonIpv4Config,
    #[serde(default)]
    pub icmp_errors: bool,
    #[serde(default)]
    pub arp: ArpSectionConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NonIpv4Config {
    #[default]
    Block,
    Forward,
    ForwardRewrite,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArpSectionConfig {
    pub max_pending: Option<usize>,
    #[serde(default)]
    pub pending_policy: PendingPolicyConfig,
    pub retry_interval: Option<u64>,
    pub max_retries: Option<u8>,
    pub resolved_ttl: Option<u64>,
    pub stale_ttl: Option<u64>,
}

impl Default for ArpSectionConfig {
    fn default() -> Self {
        Self {
            max_pending: None,
            pending_policy: PendingPolicyConfig::default(),
            retry_interval: None,
            max_retries: None,
            resolved_ttl: None,
            stale_ttl: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PendingPolicyConfig {
    #[default]
    DropOldest,
    DropNewest,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StaticMacConfig {
    pub mac: String,
    pub vlan: u16,
    /// Port name, resolved against the [ports] table
    pub port: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

// ============================================================================
// Lock file types (generated, includes all defaults)
// ============================================================================

/// Generated lock file with all defaults filled in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigLock {
    pub generated_at: String,
    pub source_hash: String,
    pub switch: SwitchLock,
    pub ports: HashMap<String, PortLock>,
    pub router: Option<RouterLock>,
    pub static_macs: Vec<StaticMacLock>,
    pub logging: LoggingLock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchLock {
    pub mac_table_capacity: usize,
    pub mac_max_age: u64,
    pub eviction: String,
    pub flood_on_miss: bool,
    pub pause_quantum: u16,
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortLock {
    pub index: u32,
    pub mode: String,
    pub default_vlan: u16,
    pub vlans: Vec<u16>,
    pub mac: String,
    pub verify_fcs: bool,
    pub emit_fcs: bool,
    pub accept_runts: bool,
    pub accept_jumbo: bool,
    pub ingress_capacity: usize,
    pub egress_lane_capacity: usize,
    pub high_watermark: usize,
    pub low_watermark: usize,
    pub pcp_threshold: u8,
    pub normal_weight: u32,
    pub rate: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterLock {
    pub uplink: String,
    pub local_network: String,
    pub uplink_address: String,
    pub gateway: String,
    pub gateway_mac: Option<String>,
    pub local_mac: String,
    pub uplink_mac: String,
    pub proxy_arp_to_uplink: bool,
    pub proxy_arp_to_local: bool,
    pub block_fragments: bool,
    pub block_multicast: bool,
    pub require_dst_mac_match: bool,
    pub rewrite_source_mac: bool,
    pub non_ipv4: String,
    pub icmp_errors: bool,
    pub arp: ArpLock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArpLock {
    pub max_pending: usize,
    pub pending_policy: String,
    pub retry_interval: u64,
    pub max_retries: u8,
    pub resolved_ttl: u64,
    pub stale_ttl: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticMacLock {
    pub mac: String,
    pub vlan: u16,
    pub port: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingLock {
    pub level: String,
    pub format: String,
}

pub mod defaults {
    pub const MAC_TABLE_CAPACITY: usize = 1024;
    pub const MAC_MAX_AGE: u64 = 300;
    pub const PAUSE_QUANTUM: u16 = 512;
    pub const TICK_INTERVAL_MS: u64 = 1000;
    pub const INGRESS_CAPACITY: usize = 64;
    pub const EGRESS_LANE_CAPACITY: usize = 64;
    pub const HIGH_WATERMARK: usize = 48;
    pub const LOW_WATERMARK: usize = 16;
    pub const PCP_THRESHOLD: u8 = 4;
    pub const NORMAL_WEIGHT: u32 = 4;
    pub const ARP_MAX_PENDING: usize = 4;
    pub const ARP_RETRY_INTERVAL: u64 = 2;
    pub const ARP_MAX_RETRIES: u8 = 2;
    pub const ARP_RESOLVED_TTL: u64 = 60;
    pub const ARP_STALE_TTL: u64 = 240;
}

impl ConfigLock {
    pub fn from_config(config: &Config, source_hash: String) -> Self {
        let switch = SwitchLock {
            mac_table_capacity: config
                .switch
                .mac_table_capacity
                .unwrap_or(defaults::MAC_TABLE_CAPACITY),
            mac_max_age: config.switch.mac_max_age.unwrap_or(defaults::MAC_MAX_AGE),
            eviction: match config.switch.eviction {
                EvictionConfig::Nru => "nru".to_string(),
                EvictionConfig::NoEvict => "no-evict".to_string(),
            },
            flood_on_miss: config.switch.flood_on_miss.unwrap_or(true),
            pause_quantum: config
                .switch
                .pause_quantum
                .unwrap_or(defaults::PAUSE_QUANTUM),
            tick_interval_ms: config
                .switch
                .tick_interval_ms
                .unwrap_or(defaults::TICK_INTERVAL_MS),
        };

        let ports = config
            .ports
            .iter()
            .map(|(name, port)| {
                (
                    name.clone(),
                    PortLock {
                        index: port.index,
                        mode: match port.mode {
                            PortMode::Access => "access".to_string(),
                            PortMode::Trunk => "trunk".to_string(),
                        },
                        default_vlan: port.default_vlan.unwrap_or(1),
                        vlans: port.vlans.clone(),
                        mac: port.mac.clone().unwrap_or_else(|| "auto".to_string()),
                        verify_fcs: port.verify_fcs,
                        emit_fcs: port.emit_fcs,
                        accept_runts: port.accept_runts,
                        accept_jumbo: port.accept_jumbo,
                        ingress_capacity: port
                            .ingress_capacity
                            .unwrap_or(defaults::INGRESS_CAPACITY),
                        egress_lane_capacity: port
                            .egress_lane_capacity
                            .unwrap_or(defaults::EGRESS_LANE_CAPACITY),
                        high_watermark: port.high_watermark.unwrap_or(defaults::HIGH_WATERMARK),
                        low_watermark: port.low_watermark.unwrap_or(defaults::LOW_WATERMARK),
                        pcp_threshold: port.pcp_threshold.unwrap_or(defaults::PCP_THRESHOLD),
                        normal_weight: port.normal_weight.unwrap_or(defaults::NORMAL_WEIGHT),
                        rate: port.rate.unwrap_or(0),
                    },
                )
            })
            .collect();

        let router = config.router.as_ref().map(|r| RouterLock {
            uplink: r.uplink.clone(),
            local_network: r.local_network.clone(),
            uplink_address: r.uplink_address.clone(),
            gateway: r.gateway.clone(),
            gateway_mac: r.gateway_mac.clone(),
            local_mac: r.local_mac.clone().unwrap_or_else(|| "auto".to_string()),
            uplink_mac: r.uplink_mac.clone().unwrap_or_else(|| "auto".to_string()),
            proxy_arp_to_uplink: r.proxy_arp_to_uplink,
            proxy_arp_to_local: r.proxy_arp_to_local,
            block_fragments: r.block_fragments,
            block_multicast: r.block_multicast,
            require_dst_mac_match: r.require_dst_mac_match,
            rewrite_source_mac: r.rewrite_source_mac.unwrap_or(true),
            non_ipv4: match r.non_ipv4 {
                NonIpv4Config::Block => "block".to_string(),
                NonIpv4Config::Forward => "forward".to_string(),
                NonIpv4Config::ForwardRewrite => "forward-rewrite".to_string(),
            },
            icmp_errors: r.icmp_errors,
            arp: ArpLock {
                max_pending: r.arp.max_pending.unwrap_or(defaults::ARP_MAX_PENDING),
                pending_policy: match r.arp.pending_policy {
                    PendingPolicyConfig::DropOldest => "drop-oldest".to_string(),
                    PendingPolicyConfig::DropNewest => "drop-newest".to_string(),
                },
                retry_interval: r.arp.retry_interval.unwrap_or(defaults::ARP_RETRY_INTERVAL),
                max_retries: r.arp.max_retries.unwrap_or(defaults::ARP_MAX_RETRIES),
                resolved_ttl: r.arp.resolved_ttl.unwrap_or(defaults::ARP_RESOLVED_TTL),
                stale_ttl: r.arp.stale_ttl.unwrap_or(defaults::ARP_STALE_TTL),
            },
        });

        let static_macs = config
            .static_macs
            .iter()
            .map(|s| StaticMacLock {
                mac: s.mac.clone(),
                vlan: s.vlan,
                port: s.port.clone(),
            })
            .collect();

        let logging = LoggingLock {
            level: config
                .logging
                .as_ref()
                .and_then(|l| l.level.clone())
                .unwrap_or_else(|| "info".to_string()),
            format: config
                .logging
                .as_ref()
                .and_then(|l| l.format.clone())
                .unwrap_or_else(|| "pretty".to_string()),
        };

        ConfigLock {
            generated_at: chrono::Utc::now().to_rfc3339(),
            source_hash,
            switch,
            ports,
            router,
            static_macs,
            logging,
        }
    }
}
