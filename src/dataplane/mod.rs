//! Data plane components
//!
//! The switching and routing core: per-port ingress/egress stages, the
//! shared MAC table and forwarding engine, VLAN filtering, the queueing
//! fabric with 802.3x flow control, and the inline IPv4 router on the
//! uplink boundary.

mod arp_cache;
mod fabric;
mod flow_control;
mod forwarding;
mod inline_router;
mod mac_table;
mod port;
mod queueing;
mod vlan;

pub use arp_cache::{
    ArpCache, ArpCacheConfig, ArpState, PendingDropPolicy, PendingOutcome, TickAction,
};
pub use fabric::{
    ControlRequest, ControlResponse, Fabric, FabricConfig, PortSettings, PortState,
    RouterAttachment,
};
pub use flow_control::FlowControl;
pub use forwarding::{Decision, ForwardingEngine, GroupTable};
pub use inline_router::{
    InlineRouter, NonIpv4Policy, RouterConfig, RouterFace, RouterOutput, RouterTickOutput,
};
pub use mac_table::{EvictionPolicy, LearnOutcome, MacTable, MacTableView, VlanId};
pub use port::{
    FrameMeta, IngressFrame, IngressResult, PortEgress, PortFrameEvent, PortId, PortIngress, Tick,
};
pub use queueing::{EgressQueues, IngressQueue, Lane, LengthPolicy, Overflow, QueuedFrame};
pub use vlan::{PortVlanMode, ResolvedVlan, VlanFilter, DEFAULT_VLAN};
