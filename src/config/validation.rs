//! Configuration validation

use super::{Config, PortMode};
use crate::protocol::MacAddr;
use std::collections::HashSet;
use std::net::Ipv4Addr;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_ports(config, &mut result);
    validate_router(config, &mut result);
    validate_static_macs(config, &mut result);

    result
}

fn valid_vlan(vlan: u16) -> bool {
    (1..=4094).contains(&vlan)
}

fn parse_cidr(s: &str) -> Option<(Ipv4Addr, u8)> {
    let (addr, prefix) = s.split_once('/')?;
    let addr: Ipv4Addr = addr.parse().ok()?;
    let prefix: u8 = prefix.parse().ok()?;
    if prefix > 32 {
        return None;
    }
    Some((addr, prefix))
}

fn in_subnet(ip: Ipv4Addr, network: Ipv4Addr, prefix: u8) -> bool {
    let mask = if prefix == 0 { 0 } else { !0u32 << (32 - prefix) };
    (u32::from(ip) & mask) == (u32::from(network) & mask)
}

fn validate_ports(config: &Config, result: &mut ValidationResult) {
    if config.ports.is_empty() {
        result.error("ports: at least one port must be defined");
        return;
    }

    // Indexes must be unique and dense from 0: they are the fabric's
    // port numbering
    let mut seen = HashSet::new();
    for (name, port) in &config.ports {
        if !seen.insert(port.index) {
            result.error(format!("ports.{}: duplicate index {}", name, port.index));
        }
    }
    for i in 0..config.ports.len() as u32 {
        if !seen.contains(&i) {
            result.error(format!(
                "ports: indexes must be dense from 0, missing {}",
                i
            ));
        }
    }

    for (name, port) in &config.ports {
        match port.mode {
            PortMode::Access => {
                if port.default_vlan.is_none() {
                    result.warn(format!(
                        "ports.{}: default_vlan not specified, using 1",
                        name
                    ));
                }
                if let Some(vlan) = port.default_vlan {
                    if !valid_vlan(vlan) {
                        result.error(format!("ports.{}: invalid VLAN id {}", name, vlan));
                    }
                }
                if !port.vlans.is_empty() {
                    result.warn(format!(
                        "ports.{}: vlans list ignored on an access port",
                        name
                    ));
                }
            }
            PortMode::Trunk => {
                if port.vlans.is_empty() {
                    result.error(format!(
                        "ports.{}: trunk port requires a vlans list",
                        name
                    ));
                }
                for vlan in &port.vlans {
                    if !valid_vlan(*vlan) {
                        result.error(format!("ports.{}: invalid VLAN id {}", name, vlan));
                    }
                }
            }
        }

        if let Some(ref mac) = port.mac {
            if mac != "auto" && mac.parse::<MacAddr>().is_err() {
                result.error(format!("ports.{}: invalid MAC address '{}'", name, mac));
            }
        }

        let capacity = port
            .egress_lane_capacity
            .unwrap_or(super::defaults::EGRESS_LANE_CAPACITY);
        let high = port
            .high_watermark
            .unwrap_or(super::defaults::HIGH_WATERMARK);
        let low = port.low_watermark.unwrap_or(super::defaults::LOW_WATERMARK);
        if high > capacity * 2 {
            result.error(format!(
                "ports.{}: high_watermark {} exceeds total egress capacity {}",
                name,
                high,
                capacity * 2
            ));
        }
        if low >= high {
            result.error(format!(
                "ports.{}: low_watermark {} must be below high_watermark {}",
                name, low, high
            ));
        }

        if let Some(threshold) = port.pcp_threshold {
            if threshold > 7 {
                result.error(format!(
                    "ports.{}: pcp_threshold {} out of range (0-7)",
                    name, threshold
                ));
            }
        }
    }
}

fn validate_router(config: &Config, result: &mut ValidationResult) {
    let Some(router) = &config.router else {
        return;
    };

    if !config.ports.contains_key(&router.uplink) {
        result.error(format!("router.uplink: port '{}' not defined", router.uplink));
    }

    let local = parse_cidr(&router.local_network);
    if local.is_none() {
        result.error(format!(
            "router.local_network: invalid CIDR '{}'",
            router.local_network
        ));
    }

    let uplink_addr: Option<Ipv4Addr> = router.uplink_address.parse().ok();
    if uplink_addr.is_none() {
        result.error(format!(
            "router.uplink_address: invalid address '{}'",
            router.uplink_address
        ));
    }

    let gateway: Option<Ipv4Addr> = router.gateway.parse().ok();
    if gateway.is_none() {
        result.error(format!(
            "router.gateway: invalid address '{}'",
            router.gateway
        ));
    }

    // The gateway is the next hop on the uplink side; an address inside
    // the local subnet would route local traffic back at itself
    if let (Some((network, prefix)), Some(gw)) = (local, gateway) {
        if in_subnet(gw, network, prefix) {
            result.error(format!(
                "router.gateway: {} lies inside the local subnet {}",
                gw, router.local_network
            ));
        }
    }
    if let (Some((network, prefix)), Some(up)) = (local, uplink_addr) {
        if in_subnet(up, network, prefix) {
            result.error(format!(
                "router.uplink_address: {} lies inside the local subnet {}",
                up, router.local_network
            ));
        }
    }

    if let Some(ref mac) = router.gateway_mac {
        if mac.parse::<MacAddr>().is_err() {
            result.error(format!("router.gateway_mac: invalid MAC '{}'", mac));
        }
    }
    for (field, mac) in [
        ("local_mac", &router.local_mac),
        ("uplink_mac", &router.uplink_mac),
    ] {
        if let Some(mac) = mac {
            if mac != "auto" && mac.parse::<MacAddr>().is_err() {
                result.error(format!("router.{}: invalid MAC '{}'", field, mac));
            }
        }
    }

    if router.arp.max_pending == Some(0) {
        result.error("router.arp.max_pending: must be at least 1");
    }
}

fn validate_static_macs(config: &Config, result: &mut ValidationResult) {
    for (i, entry) in config.static_macs.iter().enumerate() {
        let mac: Option<MacAddr> = entry.mac.parse().ok();
        match mac {
            None => result.error(format!(
                "static_macs[{}]: invalid MAC address '{}'",
                i, entry.mac
            )),
            Some(mac) if !mac.is_unicast() => result.error(format!(
                "static_macs[{}]: {} is not a unicast address",
                i, entry.mac
            )),
            _ => {}
        }

        if !valid_vlan(entry.vlan) {
            result.error(format!("static_macs[{}]: invalid VLAN id {}", i, entry.vlan));
        }

        match config.ports.get(&entry.port) {
            None => {
                result.error(format!(
                    "static_macs[{}]: port '{}' not defined",
                    i, entry.port
                ));
            }
            Some(port) => {
                // A static binding outside the port's VLAN membership
                // contradicts the isolation rules and is refused
                let member = match port.mode {
                    PortMode::Access => port.default_vlan.unwrap_or(1) == entry.vlan,
                    PortMode::Trunk => port.vlans.contains(&entry.vlan),
                };
                if !member {
                    result.error(format!(
                        "static_macs[{}]: port '{}' is not a member of VLAN {}",
                        i, entry.port, entry.vlan
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        PortConfig, RouterSectionConfig, StaticMacConfig, SwitchConfig,
    };
    use std::collections::HashMap;

    fn make_port(index: u32) -> PortConfig {
        PortConfig {
            index,
            mode: PortMode::Access,
            default_vlan: Some(1),
            vlans: Vec::new(),
            mac: None,
            verify_fcs: false,
            emit_fcs: false,
            accept_runts: false,
            accept_jumbo: false,
            ingress_capacity: None,
            egress_lane_capacity: None,
            high_watermark: None,
            low_watermark: None,
            pcp_threshold: None,
            normal_weight: None,
            rate: None,
        }
    }

    fn make_config() -> Config {
        let mut ports = HashMap::new();
        ports.insert("eth0".to_string(), make_port(0));
        ports.insert("eth1".to_string(), make_port(1));
        Config {
            switch: SwitchConfig::default(),
            ports,
            router: None,
            static_macs: Vec::new(),
            logging: None,
        }
    }

    fn make_router() -> RouterSectionConfig {
        RouterSectionConfig {
            uplink: "eth1".to_string(),
            local_network: "192.168.1.1/24".to_string(),
            uplink_address: "10.0.0.2".to_string(),
            gateway: "10.0.0.1".to_string(),
            gateway_mac: None,
            local_mac: None,
            uplink_mac: None,
            proxy_arp_to_uplink: false,
            proxy_arp_to_local: false,
            block_fragments: false,
            block_multicast: false,
            require_dst_mac_match: false,
            rewrite_source_mac: None,
            non_ipv4: Default::default(),
            icmp_errors: false,
            arp: Default::default(),
        }
    }

    #[test]
    fn test_valid_minimal_config() {
        let config = make_config();
        let result = validate(&config);
        assert!(!result.has_errors());
    }

    #[test]
    fn test_no_ports() {
        let mut config = make_config();
        config.ports.clear();
        let result = validate(&config);
        assert!(result.has_errors());
    }

    #[test]
    fn test_duplicate_port_index() {
        let mut config = make_config();
        config.ports.insert("eth2".to_string(), make_port(1));
        let result = validate(&config);
        assert!(result.has_errors());
        assert!(result.errors.iter().any(|e| e.contains("duplicate index")));
    }

    #[test]
    fn test_sparse_port_indexes() {
        let mut config = make_config();
        config.ports.insert("eth2".to_string(), make_port(5));
        let result = validate(&config);
        assert!(result.has_errors());
        assert!(result.errors.iter().any(|e| e.contains("dense")));
    }

    #[test]
    fn test_trunk_requires_vlans() {
        let mut config = make_config();
        let port = config.ports.get_mut("eth0").unwrap();
        port.mode = PortMode::Trunk;
        port.vlans = Vec::new();
        let result = validate(&config);
        assert!(result.has_errors());
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("requires a vlans list")));
    }

    #[test]
    fn test_invalid_vlan_id() {
        let mut config = make_config();
        config.ports.get_mut("eth0").unwrap().default_vlan = Some(4095);
        let result = validate(&config);
        assert!(result.has_errors());
        assert!(result.errors.iter().any(|e| e.contains("invalid VLAN id")));
    }

    #[test]
    fn test_default_vlan_warning() {
        let mut config = make_config();
        config.ports.get_mut("eth0").unwrap().default_vlan = None;
        let result = validate(&config);
        assert!(!result.has_errors());
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("default_vlan not specified")));
    }

    #[test]
    fn test_watermark_ordering() {
        let mut config = make_config();
        let port = config.ports.get_mut("eth0").unwrap();
        port.high_watermark = Some(10);
        port.low_watermark = Some(10);
        let result = validate(&config);
        assert!(result.has_errors());
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("must be below high_watermark")));
    }

    #[test]
    fn test_invalid_port_mac() {
        let mut config = make_config();
        config.ports.get_mut("eth0").unwrap().mac = Some("not-a-mac".to_string());
        let result = validate(&config);
        assert!(result.has_errors());
    }

    #[test]
    fn test_port_mac_auto_ok() {
        let mut config = make_config();
        config.ports.get_mut("eth0").unwrap().mac = Some("auto".to_string());
        assert!(!validate(&config).has_errors());
    }

    #[test]
    fn test_valid_router() {
        let mut config = make_config();
        config.router = Some(make_router());
        assert!(!validate(&config).has_errors());
    }

    #[test]
    fn test_router_undefined_uplink() {
        let mut config = make_config();
        let mut router = make_router();
        router.uplink = "eth9".to_string();
        config.router = Some(router);
        let result = validate(&config);
        assert!(result.has_errors());
        assert!(result.errors.iter().any(|e| e.contains("not defined")));
    }

    #[test]
    fn test_router_gateway_inside_local_subnet() {
        let mut config = make_config();
        let mut router = make_router();
        router.gateway = "192.168.1.254".to_string();
        config.router = Some(router);
        let result = validate(&config);
        assert!(result.has_errors());
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("inside the local subnet")));
    }

    #[test]
    fn test_router_bad_cidr() {
        let mut config = make_config();
        let mut router = make_router();
        router.local_network = "192.168.1.1/40".to_string();
        config.router = Some(router);
        assert!(validate(&config).has_errors());
    }

    #[test]
    fn test_static_mac_undefined_port() {
        let mut config = make_config();
        config.static_macs.push(StaticMacConfig {
            mac: "02:00:00:00:00:01".to_string(),
            vlan: 1,
            port: "eth9".to_string(),
        });
        let result = validate(&config);
        assert!(result.has_errors());
        assert!(result.errors.iter().any(|e| e.contains("eth9")));
    }

    #[test]
    fn test_static_mac_vlan_conflict() {
        let mut config = make_config();
        // eth0 is an access port on VLAN 1; a binding in VLAN 20 conflicts
        config.static_macs.push(StaticMacConfig {
            mac: "02:00:00:00:00:01".to_string(),
            vlan: 20,
            port: "eth0".to_string(),
        });
        let result = validate(&config);
        assert!(result.has_errors());
        assert!(result
            .errors
            .iter()
            .any(|e| e.contains("not a member of VLAN 20")));
    }

    #[test]
    fn test_static_mac_multicast_rejected() {
        let mut config = make_config();
        config.static_macs.push(StaticMacConfig {
            mac: "01:00:5e:00:00:01".to_string(),
            vlan: 1,
            port: "eth0".to_string(),
        });
        let result = validate(&config);
        assert!(result.has_errors());
        assert!(result.errors.iter().any(|e| e.contains("not a unicast")));
    }
}
