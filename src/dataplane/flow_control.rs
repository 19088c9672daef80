//! 802.3x flow control
//!
//! Two directions per port: a peer can pause our egress (rx side), and we
//! can ask the peer to pause when our egress buffer fills (tx side). In
//! this model one pause quantum counts down per external tick.

use crate::dataplane::port::PortId;
use crate::protocol::pause::PauseFrame;

#[derive(Debug, Default, Clone)]
struct PortFlowState {
    /// Ticks left of peer-imposed pause; 0 means transmitting
    rx_pause_remaining: u32,
    /// We have asked the peer to stop and not yet released it
    tx_pause_asserted: bool,
}

/// Per-port pause state machine
#[derive(Debug)]
pub struct FlowControl {
    ports: Vec<PortFlowState>,
    /// Quantum we request when asserting pause toward a peer
    pause_quantum: u16,
}

impl FlowControl {
    pub fn new(port_count: usize, pause_quantum: u16) -> Self {
        Self {
            ports: vec![PortFlowState::default(); port_count],
            pause_quantum,
        }
    }

    /// Peer sent a PAUSE frame: suspend (or resume, on quantum 0) our
    /// egress on that port
    pub fn on_pause_received(&mut self, port: PortId, pause: PauseFrame) {
        if let Some(state) = self.ports.get_mut(port as usize) {
            state.rx_pause_remaining = pause.quantum as u32;
        }
    }

    /// True while the peer's pause quantum holds our egress
    pub fn is_paused(&self, port: PortId) -> bool {
        self.ports
            .get(port as usize)
            .is_some_and(|s| s.rx_pause_remaining > 0)
    }

    /// Egress occupancy crossed the high-water mark: ask the peer to stop.
    ///
    /// Returns the PAUSE frame to emit, once per assertion.
    pub fn assert_pause(&mut self, port: PortId) -> Option<PauseFrame> {
        let state = self.ports.get_mut(port as usize)?;
        if state.tx_pause_asserted {
            return None;
        }
        state.tx_pause_asserted = true;
        Some(PauseFrame {
            quantum: self.pause_quantum,
        })
    }

    /// Egress occupancy fell under the low-water mark: let the peer resume.
    ///
    /// Returns the quantum-0 frame to emit, once per release.
    pub fn release_pause(&mut self, port: PortId) -> Option<PauseFrame> {
        let state = self.ports.get_mut(port as usize)?;
        if !state.tx_pause_asserted {
            return None;
        }
        state.tx_pause_asserted = false;
        Some(PauseFrame { quantum: 0 })
    }

    pub fn is_pause_asserted(&self, port: PortId) -> bool {
        self.ports
            .get(port as usize)
            .is_some_and(|s| s.tx_pause_asserted)
    }

    /// Count down pause quanta; returns ports whose pause just expired
    pub fn tick(&mut self) -> Vec<PortId> {
        let mut resumed = Vec::new();
        for (port, state) in self.ports.iter_mut().enumerate() {
            if state.rx_pause_remaining > 0 {
                state.rx_pause_remaining -= 1;
                if state.rx_pause_remaining == 0 {
                    resumed.push(port as PortId);
                }
            }
        }
        resumed
    }

    /// Forget all state for a downed port
    pub fn port_down(&mut self, port: PortId) {
        if let Some(state) = self.ports.get_mut(port as usize) {
            *state = PortFlowState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_and_quantum_expiry() {
        let mut fc = FlowControl::new(4, 100);
        assert!(!fc.is_paused(1));

        fc.on_pause_received(1, PauseFrame { quantum: 3 });
        assert!(fc.is_paused(1));
        assert!(!fc.is_paused(0));

        assert!(fc.tick().is_empty());
        assert!(fc.is_paused(1));
        assert!(fc.tick().is_empty());
        assert_eq!(fc.tick(), vec![1]);
        assert!(!fc.is_paused(1));
    }

    #[test]
    fn test_resume_frame_clears_pause() {
        let mut fc = FlowControl::new(2, 100);
        fc.on_pause_received(0, PauseFrame { quantum: 1000 });
        assert!(fc.is_paused(0));

        fc.on_pause_received(0, PauseFrame { quantum: 0 });
        assert!(!fc.is_paused(0));
    }

    #[test]
    fn test_reassert_refreshes_quantum() {
        let mut fc = FlowControl::new(1, 100);
        fc.on_pause_received(0, PauseFrame { quantum: 1 });
        fc.on_pause_received(0, PauseFrame { quantum: 5 });

        fc.tick();
        assert!(fc.is_paused(0));
    }

    #[test]
    fn test_assert_pause_emits_once() {
        let mut fc = FlowControl::new(2, 128);

        let frame = fc.assert_pause(0).unwrap();
        assert_eq!(frame.quantum, 128);
        assert!(fc.is_pause_asserted(0));

        // Still above water: no duplicate frame
        assert!(fc.assert_pause(0).is_none());
    }

    #[test]
    fn test_release_pause_emits_once() {
        let mut fc = FlowControl::new(2, 128);
        assert!(fc.release_pause(0).is_none());

        fc.assert_pause(0);
        let frame = fc.release_pause(0).unwrap();
        assert!(frame.is_resume());
        assert!(!fc.is_pause_asserted(0));
        assert!(fc.release_pause(0).is_none());
    }

    #[test]
    fn test_port_down_clears_state() {
        let mut fc = FlowControl::new(2, 128);
        fc.on_pause_received(0, PauseFrame { quantum: 100 });
        fc.assert_pause(0);

        fc.port_down(0);
        assert!(!fc.is_paused(0));
        assert!(!fc.is_pause_asserted(0));
    }

    #[test]
    fn test_out_of_range_port() {
        let mut fc = FlowControl::new(1, 100);
        // Must not panic
        fc.on_pause_received(9, PauseFrame { quantum: 5 });
        assert!(!fc.is_paused(9));
        assert!(fc.assert_pause(9).is_none());
    }
}
