//! Port I/O backends
//!
//! In run mode each fabric port is bound to a host network interface;
//! the backend turns received packets into port frame events and puts
//! outbound events back on the wire. Only AF_PACKET is implemented;
//! the trait leaves room for faster backends.

mod af_packet;

pub use af_packet::AfPacketSocket;

use crate::dataplane::PortFrameEvent;
use crate::Result;
use std::future::Future;

/// Information about a received packet
#[derive(Debug, Clone)]
pub struct RxInfo {
    /// Number of bytes received
    pub len: usize,
    /// VLAN ID if the kernel stripped it
    pub vlan_id: Option<u16>,
}

/// Port I/O backend trait
pub trait PortIo: Send {
    /// Receive a packet into the provided buffer
    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = Result<RxInfo>> + Send;

    /// Send a packet
    fn send(&mut self, buf: &[u8]) -> impl Future<Output = Result<usize>> + Send;

    /// Receive one packet as a whole-frame port event
    fn recv_event(
        &mut self,
        buf: &mut [u8],
        timestamp: u64,
    ) -> impl Future<Output = Result<PortFrameEvent>> + Send
    where
        Self: Sized,
    {
        async move {
            let info = self.recv(buf).await?;
            Ok(PortFrameEvent::whole(buf[..info.len].to_vec(), timestamp))
        }
    }
}
