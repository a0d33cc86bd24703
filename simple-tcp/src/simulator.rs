//! Optional fault injection on the outbound path.
//!
//! The protocol deliberately has no retransmission, so a lost datagram
//! simply fails whatever was waiting for it.  To exercise those paths
//! without depending on real network conditions, a [`Simulator`] can be
//! attached to a [`crate::socket::Socket`]; every outbound datagram is first
//! routed through [`Simulator::copies`]:
//!
//! | Fault            | Description                                        |
//! |------------------|----------------------------------------------------|
//! | Targeted drop    | Drop the datagrams at the listed send ordinals.    |
//! | Targeted dup     | Send the datagrams at the listed ordinals twice.   |
//! | Packet loss      | Drop a datagram with probability `loss_rate`.      |
//! | Duplication      | Deliver a datagram twice.                          |
//!
//! Randomness comes from a seeded [`StdRng`] so failures are reproducible.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Configuration for the fault-injection model.
///
/// All probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Default)]
pub struct SimulatorConfig {
    /// Zero-based ordinals of outbound datagrams to drop unconditionally.
    pub drop_sends: Vec<usize>,
    /// Zero-based ordinals of outbound datagrams to send twice.
    pub duplicate_sends: Vec<usize>,
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that a datagram is sent twice.
    pub duplicate_rate: f64,
    /// RNG seed.
    pub seed: u64,
}

impl SimulatorConfig {
    /// Drop exactly the `n`th outbound datagram (zero-based).
    pub fn drop_nth(n: usize) -> Self {
        Self {
            drop_sends: vec![n],
            ..Self::default()
        }
    }

    /// Send exactly the `n`th outbound datagram (zero-based) twice.
    pub fn duplicate_nth(n: usize) -> Self {
        Self {
            duplicate_sends: vec![n],
            ..Self::default()
        }
    }
}

#[derive(Debug)]
struct SimState {
    sent: usize,
    rng: StdRng,
}

/// A fault-injecting decision point for outbound datagrams.
#[derive(Debug)]
pub struct Simulator {
    config: SimulatorConfig,
    state: Mutex<SimState>,
}

impl Simulator {
    /// Create a simulator with the given fault model.
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            state: Mutex::new(SimState { sent: 0, rng }),
        }
    }

    /// Decide how many copies of the next outbound datagram reach the wire.
    ///
    /// `0` means dropped, `2` means duplicated.
    pub fn copies(&self) -> usize {
        let mut st = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let ordinal = st.sent;
        st.sent += 1;

        if self.config.drop_sends.contains(&ordinal) {
            return 0;
        }
        if self.config.duplicate_sends.contains(&ordinal) {
            return 2;
        }
        if self.config.loss_rate > 0.0 && st.rng.random_bool(self.config.loss_rate.min(1.0)) {
            return 0;
        }
        if self.config.duplicate_rate > 0.0
            && st.rng.random_bool(self.config.duplicate_rate.min(1.0))
        {
            return 2;
        }
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_pass_through() {
        let sim = Simulator::new(SimulatorConfig::default());
        assert!((0..100).all(|_| sim.copies() == 1));
    }

    #[test]
    fn drop_nth_drops_only_that_send() {
        let sim = Simulator::new(SimulatorConfig::drop_nth(1));
        assert_eq!(sim.copies(), 1);
        assert_eq!(sim.copies(), 0);
        assert_eq!(sim.copies(), 1);
    }

    #[test]
    fn duplicate_nth_doubles_only_that_send() {
        let sim = Simulator::new(SimulatorConfig::duplicate_nth(2));
        let copies: Vec<usize> = (0..4).map(|_| sim.copies()).collect();
        assert_eq!(copies, [1, 1, 2, 1]);
    }

    #[test]
    fn full_loss_drops_everything() {
        let sim = Simulator::new(SimulatorConfig {
            loss_rate: 1.0,
            ..SimulatorConfig::default()
        });
        assert!((0..20).all(|_| sim.copies() == 0));
    }

    #[test]
    fn same_seed_same_decisions() {
        let cfg = SimulatorConfig {
            loss_rate: 0.3,
            duplicate_rate: 0.3,
            seed: 42,
            ..SimulatorConfig::default()
        };
        let a = Simulator::new(cfg.clone());
        let b = Simulator::new(cfg);
        let run_a: Vec<usize> = (0..50).map(|_| a.copies()).collect();
        let run_b: Vec<usize> = (0..50).map(|_| b.copies()).collect();
        assert_eq!(run_a, run_b);
    }
}
