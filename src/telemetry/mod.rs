//! Telemetry: logging and statistics.

mod logging;
mod metrics;

pub use logging::{init_logging, LogConfig};
pub use metrics::{DropCause, FabricStats, PortCounters, PortStatsSnapshot, SaturatingCounter};
