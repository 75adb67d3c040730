//! Fault-injecting transmit wrapper for testing.
//!
//! Real networks drop, reorder, and duplicate packets.  To exercise the
//! reliability mechanisms without depending on actual network conditions,
//! [`Simulator`] wraps any [`Transmit`] and applies a configurable fault
//! model to every outbound datagram:
//!
//! | Fault            | Description                                      |
//! |------------------|--------------------------------------------------|
//! | Packet loss      | Drop a datagram with probability `loss_rate`.    |
//! | Reordering       | Hold a datagram back until after the next one.   |
//! | Duplication      | Deliver a datagram twice.                        |
//!
//! The RNG is seeded so a failing run can be reproduced exactly.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::session::lock;
use crate::socket::Transmit;

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is held back behind the next one.
    pub reorder_rate: f64,
    /// Probability that a datagram is delivered twice.
    pub duplicate_rate: f64,
    /// RNG seed.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            reorder_rate: 0.0,
            duplicate_rate: 0.0,
            seed: 0,
        }
    }
}

struct State {
    rng: StdRng,
    held: Option<Vec<u8>>,
}

/// A [`Transmit`] that misbehaves like a lossy network.
pub struct Simulator<T> {
    inner: T,
    config: SimulatorConfig,
    state: Mutex<State>,
}

impl<T: Transmit> Simulator<T> {
    pub fn new(inner: T, config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            inner,
            config,
            state: Mutex::new(State { rng, held: None }),
        }
    }

    /// Release a datagram still held back for reordering, if any.
    pub fn flush(&self) {
        if let Some(held) = lock(&self.state).held.take() {
            self.inner.transmit(&held);
        }
    }
}

impl<T: Transmit> Transmit for Simulator<T> {
    fn transmit(&self, datagram: &[u8]) {
        let mut state = lock(&self.state);

        if state.rng.random_bool(self.config.loss_rate) {
            log::trace!("[sim] dropped {} byte datagram", datagram.len());
            return;
        }

        if state.held.is_none() && state.rng.random_bool(self.config.reorder_rate) {
            log::trace!("[sim] holding back {} byte datagram", datagram.len());
            state.held = Some(datagram.to_vec());
            return;
        }

        let duplicate = state.rng.random_bool(self.config.duplicate_rate);
        let held = state.held.take();
        drop(state);

        self.inner.transmit(datagram);
        if duplicate {
            log::trace!("[sim] duplicated {} byte datagram", datagram.len());
            self.inner.transmit(datagram);
        }
        if let Some(held) = held {
            self.inner.transmit(&held);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn collect(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Ok(d) = rx.try_recv() {
            out.push(d);
        }
        out
    }

    #[test]
    fn default_is_pass_through() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sim = Simulator::new(tx, SimulatorConfig::default());
        for i in 0..10u8 {
            sim.transmit(&[i]);
        }
        let expected: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i]).collect();
        assert_eq!(collect(&mut rx), expected);
    }

    #[test]
    fn total_loss_drops_everything() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = SimulatorConfig {
            loss_rate: 1.0,
            ..SimulatorConfig::default()
        };
        let sim = Simulator::new(tx, config);
        sim.transmit(b"a");
        sim.transmit(b"b");
        assert!(collect(&mut rx).is_empty());
    }

    #[test]
    fn always_duplicate() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = SimulatorConfig {
            duplicate_rate: 1.0,
            ..SimulatorConfig::default()
        };
        let sim = Simulator::new(tx, config);
        sim.transmit(b"a");
        assert_eq!(collect(&mut rx), [b"a".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn reorder_swaps_with_next_datagram() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = SimulatorConfig {
            reorder_rate: 1.0,
            ..SimulatorConfig::default()
        };
        let sim = Simulator::new(tx, config);
        sim.transmit(b"first");
        assert!(collect(&mut rx).is_empty());
        sim.transmit(b"second");
        assert_eq!(collect(&mut rx), [b"second".to_vec(), b"first".to_vec()]);

        sim.transmit(b"third");
        sim.flush();
        assert_eq!(collect(&mut rx), [b"third".to_vec()]);
    }

    #[test]
    fn same_seed_same_faults() {
        let config = SimulatorConfig {
            loss_rate: 0.5,
            seed: 42,
            ..SimulatorConfig::default()
        };
        let run = || {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let sim = Simulator::new(tx, config.clone());
            for i in 0..64u8 {
                sim.transmit(&[i]);
            }
            collect(&mut rx)
        };
        assert_eq!(run(), run());
    }
}
