//! fabricsw - Ethernet fabric switch core
//!
//! A software model of an embedded N-port L2 switch with MAC learning,
//! VLAN filtering, priority queueing and 802.3x flow control, coupled to
//! an inline IPv4 router between a local subnet and an uplink network.

pub mod capture;
pub mod config;
pub mod dataplane;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
