use clap::{Parser, Subcommand};
use fabricsw::config;
use fabricsw::telemetry::init_logging;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "fabricsw")]
#[command(about = "An N-port Ethernet switching fabric with an inline IPv4 router")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Run the fabric daemon
    Run {
        /// Path to config.lock file
        #[arg(short, long, default_value = "config.lock")]
        config: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Generate config.lock from config.toml
    Generate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Output path for config.lock
        #[arg(short, long, default_value = "config.lock")]
        output: PathBuf,
    },
    /// Validate config.toml without generating lock file
    Validate {
        /// Path to config.toml
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

fn main() {
    // Initialize logging (RUST_LOG env var takes priority)
    init_logging(None);

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config { action }) => match action {
            ConfigAction::Generate {
                config: config_path,
                output,
            } => {
                if let Err(e) = cmd_config_generate(&config_path, &output) {
                    eprintln!("[ERROR] {}", e);
                    std::process::exit(1);
                }
            }
            ConfigAction::Validate {
                config: config_path,
            } => {
                if let Err(e) = cmd_config_validate(&config_path) {
                    eprintln!("[ERROR] {}", e);
                    std::process::exit(1);
                }
            }
        },
        Some(Commands::Run { config: lock_path }) => {
            if let Err(e) = cmd_run(&lock_path) {
                eprintln!("[ERROR] {}", e);
                std::process::exit(1);
            }
        }
        None => {
            info!("fabricsw starting...");
            // Default: run with config.lock
            if let Err(e) = cmd_run(&PathBuf::from("config.lock")) {
                eprintln!("[ERROR] {}", e);
                std::process::exit(1);
            }
        }
    }
}

fn cmd_run(lock_path: &PathBuf) -> Result<(), String> {
    use fabricsw::capture::AfPacketSocket;
    use fabricsw::dataplane::{ControlRequest, Fabric};
    use std::time::{Duration, Instant};
    use tokio::runtime::Runtime;
    use tracing::{error, warn};

    info!("Loading {}...", lock_path.display());

    let lock =
        config::load_lock(lock_path).map_err(|e| format!("Failed to load lock file: {}", e))?;

    // Ports sorted by fabric index; the lock validated them dense
    let mut ports: Vec<(String, config::PortLock)> =
        lock.ports.iter().map(|(n, p)| (n.clone(), p.clone())).collect();
    ports.sort_by_key(|(_, p)| p.index);

    let fabric_config = build_fabric_config(&lock, &ports)?;
    let tick_interval = Duration::from_millis(lock.switch.tick_interval_ms);

    let rt = Runtime::new().map_err(|e| format!("Failed to create runtime: {}", e))?;

    rt.block_on(async move {
        let fabric = Arc::new(Fabric::new(fabric_config));

        // Static table entries from the configuration
        for entry in &lock.static_macs {
            let mac = entry.mac.parse().map_err(|e| {
                format!("static MAC {}: {}", entry.mac, e)
            })?;
            let port = ports
                .iter()
                .find(|(name, _)| *name == entry.port)
                .map(|(_, p)| p.index)
                .ok_or_else(|| format!("static MAC port '{}' not found", entry.port))?;
            fabric
                .control(ControlRequest::AddStaticMac {
                    mac,
                    vlan: entry.vlan,
                    port,
                })
                .map_err(|e| format!("static MAC rejected: {}", e))?;
        }
        // Apply the queued writes before traffic starts
        fabric.tick(0);

        let start = Instant::now();

        // One ingress worker and one egress worker per port, each with
        // its own socket on the interface
        for (name, port_lock) in &ports {
            let port = port_lock.index;

            info!("Binding to interface {}...", name);
            let bind = |role: &str| {
                AfPacketSocket::bind(name).map_err(|e| {
                    format!(
                        "Failed to bind {} socket to {}: {}. Run with root privileges.",
                        role, name, e
                    )
                })
            };
            let mut rx_socket = bind("rx")?;
            let mut tx_socket = bind("tx")?;
            info!("  port {} on {} configured", port, name);

            let ingress_fabric = fabric.clone();
            let ingress_name = name.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 2048];
                loop {
                    match rx_socket.recv(&mut buf).await {
                        Ok(rx_info) => {
                            let timestamp = start.elapsed().as_micros() as u64;
                            let event = fabricsw::dataplane::PortFrameEvent::whole(
                                buf[..rx_info.len].to_vec(),
                                timestamp,
                            );
                            ingress_fabric.ingress(port, event);
                        }
                        Err(e) => {
                            error!("Receive error on {}: {}", ingress_name, e);
                        }
                    }
                }
            });

            let egress_fabric = fabric.clone();
            let egress_name = name.clone();
            tokio::spawn(async move {
                const DRAIN_BUDGET: usize = 32;
                let mut drain_timer = tokio::time::interval(Duration::from_millis(1));
                loop {
                    drain_timer.tick().await;
                    for event in egress_fabric.drain(port, DRAIN_BUDGET) {
                        if let Err(e) = tx_socket.send(&event.bytes).await {
                            warn!("Failed to send on {}: {}", egress_name, e);
                        }
                    }
                }
            });
        }

        info!("Fabric started, processing frames...");

        // The external tick: aging scrub, ARP retries, pause quanta
        let mut tick_timer = tokio::time::interval(tick_interval);
        let mut now = 0u64;
        loop {
            tick_timer.tick().await;
            now += 1;
            fabric.tick(now);
        }
    })
}

fn build_fabric_config(
    lock: &config::ConfigLock,
    ports: &[(String, config::PortLock)],
) -> Result<fabricsw::dataplane::FabricConfig, String> {
    use fabricsw::dataplane::{
        ArpCacheConfig, EvictionPolicy, FabricConfig, LengthPolicy, NonIpv4Policy,
        PendingDropPolicy, PortSettings, PortVlanMode, RouterAttachment, RouterConfig, VlanFilter,
    };

    let mut settings = Vec::new();
    let mut vlans = VlanFilter::new();

    for (name, port) in ports {
        let mac = if port.mac == "auto" {
            get_interface_mac(name)
        } else {
            port.mac
                .parse()
                .map_err(|e| format!("ports.{}: {}", name, e))?
        };

        settings.push(PortSettings {
            mac,
            link_up: true,
            verify_fcs: port.verify_fcs,
            emit_fcs: port.emit_fcs,
            length_policy: LengthPolicy {
                accept_runts: port.accept_runts,
                accept_jumbo: port.accept_jumbo,
            },
            ingress_capacity: port.ingress_capacity,
            egress_lane_capacity: port.egress_lane_capacity,
            high_watermark: port.high_watermark,
            low_watermark: port.low_watermark,
            pcp_threshold: port.pcp_threshold,
            normal_weight: port.normal_weight,
            rate_limit: port.rate,
        });

        match port.mode.as_str() {
            "trunk" => {
                vlans.set_port_mode(port.index, PortVlanMode::Tagged);
                for vlan in &port.vlans {
                    vlans.add_member(port.index, *vlan);
                }
            }
            _ => {
                vlans.set_port_mode(
                    port.index,
                    PortVlanMode::Access {
                        default_vlan: port.default_vlan,
                    },
                );
            }
        }
    }

    let router = match &lock.router {
        None => None,
        Some(r) => {
            let (uplink_name, uplink_lock) = ports
                .iter()
                .find(|(name, _)| *name == r.uplink)
                .ok_or_else(|| format!("router.uplink: port '{}' not found", r.uplink))?;

            let uplink_port_mac = if uplink_lock.mac == "auto" {
                get_interface_mac(uplink_name)
            } else {
                uplink_lock.mac.parse().unwrap_or_default()
            };
            let face_mac = |s: &str| -> fabricsw::protocol::MacAddr {
                if s == "auto" {
                    uplink_port_mac
                } else {
                    s.parse().unwrap_or(uplink_port_mac)
                }
            };

            let (local_ip, local_prefix_len) = parse_cidr(&r.local_network)?;

            Some(RouterAttachment {
                uplink_port: uplink_lock.index,
                config: RouterConfig {
                    local_ip,
                    local_prefix_len,
                    local_mac: face_mac(&r.local_mac),
                    uplink_ip: r
                        .uplink_address
                        .parse()
                        .map_err(|_| format!("invalid uplink address {}", r.uplink_address))?,
                    uplink_mac: face_mac(&r.uplink_mac),
                    gateway_ip: r
                        .gateway
                        .parse()
                        .map_err(|_| format!("invalid gateway {}", r.gateway))?,
                    gateway_mac: match &r.gateway_mac {
                        Some(mac) => Some(
                            mac.parse()
                                .map_err(|e| format!("router.gateway_mac: {}", e))?,
                        ),
                        None => None,
                    },
                    proxy_arp_to_uplink: r.proxy_arp_to_uplink,
                    proxy_arp_to_local: r.proxy_arp_to_local,
                    block_fragments: r.block_fragments,
                    block_multicast: r.block_multicast,
                    require_dst_mac_match: r.require_dst_mac_match,
                    rewrite_source_mac: r.rewrite_source_mac,
                    non_ipv4: match r.non_ipv4.as_str() {
                        "forward" => NonIpv4Policy::Forward,
                        "forward-rewrite" => NonIpv4Policy::ForwardRewrite,
                        _ => NonIpv4Policy::Block,
                    },
                    icmp_errors: r.icmp_errors,
                },
                arp: ArpCacheConfig {
                    max_pending: r.arp.max_pending,
                    pending_policy: match r.arp.pending_policy.as_str() {
                        "drop-newest" => PendingDropPolicy::DropNewest,
                        _ => PendingDropPolicy::DropOldest,
                    },
                    retry_interval: r.arp.retry_interval,
                    max_retries: r.arp.max_retries,
                    resolved_ttl: r.arp.resolved_ttl,
                    stale_ttl: r.arp.stale_ttl,
                },
            })
        }
    };

    Ok(FabricConfig {
        ports: settings,
        vlans,
        mac_capacity: lock.switch.mac_table_capacity,
        mac_max_age: lock.switch.mac_max_age,
        eviction: match lock.switch.eviction.as_str() {
            "no-evict" => EvictionPolicy::NoEvict,
            _ => EvictionPolicy::NotRecentlyUsed,
        },
        flood_on_miss: lock.switch.flood_on_miss,
        pause_quantum: lock.switch.pause_quantum,
        router,
    })
}

fn parse_cidr(cidr: &str) -> Result<(std::net::Ipv4Addr, u8), String> {
    use std::net::Ipv4Addr;

    let parts: Vec<&str> = cidr.split('/').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid CIDR: {}", cidr));
    }

    let ip: Ipv4Addr = parts[0]
        .parse()
        .map_err(|_| format!("Invalid IP: {}", parts[0]))?;
    let prefix: u8 = parts[1]
        .parse()
        .map_err(|_| format!("Invalid prefix: {}", parts[1]))?;

    Ok((ip, prefix))
}

fn get_interface_mac(name: &str) -> fabricsw::protocol::MacAddr {
    // Read MAC from /sys/class/net/{name}/address
    let path = format!("/sys/class/net/{}/address", name);
    if let Ok(content) = std::fs::read_to_string(&path) {
        if let Ok(mac) = content.trim().parse() {
            return mac;
        }
    }
    // Fallback to zero MAC
    fabricsw::protocol::MacAddr::ZERO
}

fn cmd_config_generate(config_path: &PathBuf, output_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Loading {}...", config_path.display());

    let content = std::fs::read_to_string(config_path)
        .map_err(|e| format!("Failed to read config file: {}", e))?;

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        return Err("Validation failed with errors".to_string());
    }

    let lock = config::generate_lock(&cfg, &content);

    let lock_toml =
        toml::to_string_pretty(&lock).map_err(|e| format!("Failed to serialize lock: {}", e))?;

    // Add header comment
    let output = format!(
        "# Generated by fabricsw - DO NOT EDIT\n# Source: {} (sha256: {})\n\n{}",
        config_path.display(),
        &lock.source_hash[..16],
        lock_toml
    );

    std::fs::write(output_path, output).map_err(|e| format!("Failed to write lock file: {}", e))?;

    println!("[INFO] Generated {}", output_path.display());
    Ok(())
}

fn cmd_config_validate(config_path: &PathBuf) -> Result<(), String> {
    println!("[INFO] Validating {}...", config_path.display());

    let cfg = config::load(config_path).map_err(|e| format!("Failed to parse config: {}", e))?;

    let validation = config::validate(&cfg);
    validation.print_diagnostics();

    if validation.has_errors() {
        Err("Validation failed".to_string())
    } else {
        println!("[INFO] Configuration is valid");
        Ok(())
    }
}
