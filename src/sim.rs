//! Ingress packet-drop simulation.
//!
//! Loss is simulated on the receive path, before decoding, so every
//! retransmission and duplicate-handling branch can be exercised without a
//! lossy network. Disabled (probability 0) unless explicitly configured;
//! tests seed the generator for reproducible drop sequences.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Drops incoming datagrams with a fixed probability.
#[derive(Debug)]
pub struct DropSimulator {
    rate: f64,
    rng: StdRng,
}

impl DropSimulator {
    /// A simulator that never drops.
    pub fn disabled() -> Self {
        DropSimulator {
            rate: 0.0,
            rng: StdRng::from_entropy(),
        }
    }

    /// Drop with probability `rate`, clamped into `[0, 1]`.
    pub fn new(rate: f64) -> Self {
        DropSimulator {
            rate: rate.clamp(0.0, 1.0),
            rng: StdRng::from_entropy(),
        }
    }

    /// Like [`DropSimulator::new`] with a fixed seed, so the drop sequence
    /// is reproducible.
    pub fn seeded(rate: f64, seed: u64) -> Self {
        DropSimulator {
            rate: rate.clamp(0.0, 1.0),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Decide the fate of one incoming datagram.
    pub fn should_drop(&mut self) -> bool {
        self.rate > 0.0 && self.rng.gen::<f64>() < self.rate
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_never_drops() {
        let mut sim = DropSimulator::disabled();
        assert!((0..10_000).all(|_| !sim.should_drop()));
    }

    #[test]
    fn test_certain_drop_always_drops() {
        let mut sim = DropSimulator::new(1.0);
        assert!((0..100).all(|_| sim.should_drop()));
    }

    #[test]
    fn test_rate_is_clamped() {
        assert_eq!(DropSimulator::new(7.5).rate(), 1.0);
        assert_eq!(DropSimulator::new(-0.2).rate(), 0.0);
    }

    #[test]
    fn test_seeded_sequences_are_reproducible() {
        let mut a = DropSimulator::seeded(0.5, 1234);
        let mut b = DropSimulator::seeded(0.5, 1234);
        let seq_a: Vec<bool> = (0..64).map(|_| a.should_drop()).collect();
        let seq_b: Vec<bool> = (0..64).map(|_| b.should_drop()).collect();
        assert_eq!(seq_a, seq_b);
    }

    #[test]
    fn test_half_rate_drops_roughly_half() {
        let mut sim = DropSimulator::seeded(0.5, 42);
        let dropped = (0..10_000).filter(|_| sim.should_drop()).count();
        assert!((4_000..6_000).contains(&dropped), "dropped {}", dropped);
    }
}
