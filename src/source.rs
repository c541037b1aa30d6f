//! Correlated-source contract and the bundled GHZ outcome simulator.
//!
//! The protocol core never produces correlated randomness itself; it asks a
//! collaborator implementing [`CorrelatedSource`] for one outcome vector per
//! round.  The contract is small: given one transform per party and an
//! optional intercepting adversary, return one bit per party.  Absent any
//! adversary, an all-[`Transform::Identity`] request must yield a perfectly
//! correlated vector.  How disturbance manifests under an adversary is the
//! collaborator's business, as long as it is deterministic for a fixed seed.
//!
//! [`GhzSource`] is the bundled implementation.  It replaces the physics of
//! a shared GHZ state with the statistical behaviour the protocol relies
//! on: matching-basis outcomes agree, joint X-basis parity is even, and an
//! intermediate measurement breaks one or both of those correlations.

use crate::prng::SeededPrng;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Seed derivation domain for [`GhzSource::from_seed`].
const SOURCE_SEED_DOMAIN: &[u8] = b"GHZ_ACCORD:SOURCE";

/// Measurement basis a party applies to its share of a round's draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Basis {
    /// Computational basis; realized by the identity transform.
    Z,
    /// Conjugate basis; realized by the basis-change transform.
    X,
}

impl Basis {
    /// Returns the transform a party applies to measure in this basis.
    pub fn transform(self) -> Transform {
        match self {
            Basis::Z => Transform::Identity,
            Basis::X => Transform::BasisChange,
        }
    }

    /// Samples a uniform basis from the injected generator.
    pub fn sample(prng: &mut SeededPrng) -> Self {
        if prng.gen_bit() == 0 {
            Basis::Z
        } else {
            Basis::X
        }
    }

    /// Single-character rendering used in transcripts.
    pub fn symbol(self) -> char {
        match self {
            Basis::Z => 'Z',
            Basis::X => 'X',
        }
    }

    /// Parses the single-character transcript rendering.
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            'Z' => Some(Basis::Z),
            'X' => Some(Basis::X),
            _ => None,
        }
    }
}

/// Per-party transform requested from the source for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    /// Leave the share untouched (Z-basis measurement).
    Identity,
    /// Rotate the share into the conjugate basis (X-basis measurement).
    BasisChange,
}

/// An interception applied to one round's draw before legitimate parties act.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adversary {
    /// Index of the intercepted party's share, `0..num_nodes`.
    pub target_index: usize,
    /// Basis the adversary measures in.
    pub basis: Basis,
}

/// External collaborator producing one correlated outcome vector per round.
///
/// Contract, per round: `transforms` has one entry per party, the returned
/// vector has the same length with every entry in `{0, 1}`.  With
/// `adversary == None` and all entries `Identity`, every entry of the
/// result must be equal.  Implementations must be deterministic for a fixed
/// seed so runs are reproducible.
pub trait CorrelatedSource {
    /// Produces the outcome vector for one round.
    fn draw(&mut self, transforms: &[Transform], adversary: Option<Adversary>) -> Vec<u8>;
}

/// Deterministic simulator of an idealized N-party GHZ outcome model.
///
/// Outcome rules without an adversary:
///
/// * every `Identity` party observes one common uniform bit;
/// * `BasisChange` parties observe uniform bits constrained to even joint
///   parity when two or more of them participate, and an unconstrained
///   uniform bit when exactly one does.
///
/// An adversary measuring the target share in Z collapses the state to a
/// classical branch: Z correlations survive, but every `BasisChange` party
/// observes an independent uniform bit, so the joint parity constraint is
/// lost.  An adversary measuring in X decouples the target share: the
/// target party observes an independent uniform bit under either
/// transform, while the remaining parties behave as an ideal smaller GHZ
/// group among themselves.
#[derive(Debug, Clone)]
pub struct GhzSource {
    rng: StdRng,
}

impl GhzSource {
    /// Creates a source from a raw 32-byte seed.
    pub fn from_seed_bytes(seed: [u8; 32]) -> Self {
        Self {
            rng: StdRng::from_seed(seed),
        }
    }

    /// Creates a source from a `u64` seed via a domain-separated SHA-256 digest.
    pub fn from_seed(seed: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(SOURCE_SEED_DOMAIN);
        hasher.update(seed.to_be_bytes());
        let digest: [u8; 32] = hasher.finalize().into();
        Self::from_seed_bytes(digest)
    }

    fn bit(&mut self) -> u8 {
        self.rng.gen::<bool>() as u8
    }

    /// Fills `out` at the given X-party indices with an even-parity tuple
    /// when at least two parties participate, or an unconstrained uniform
    /// bit when exactly one does.
    fn fill_x_parties(&mut self, out: &mut [u8], x_indices: &[usize]) {
        if x_indices.len() == 1 {
            out[x_indices[0]] = self.bit();
            return;
        }
        if let Some((&last, rest)) = x_indices.split_last() {
            let mut parity = 0u8;
            for &idx in rest {
                let bit = self.bit();
                out[idx] = bit;
                parity ^= bit;
            }
            // The last participant balances the joint parity to even.
            out[last] = parity;
        }
    }

    fn ideal_draw(&mut self, transforms: &[Transform], out: &mut [u8], skip: Option<usize>) {
        let shared = self.bit();
        let mut x_indices = Vec::new();
        for (idx, transform) in transforms.iter().enumerate() {
            if skip == Some(idx) {
                continue;
            }
            match transform {
                Transform::Identity => out[idx] = shared,
                Transform::BasisChange => x_indices.push(idx),
            }
        }
        self.fill_x_parties(out, &x_indices);
    }

    fn collapsed_draw(&mut self, transforms: &[Transform], out: &mut [u8]) {
        // Z-interception: the branch bit is fixed, superposition is gone.
        let branch = self.bit();
        for (idx, transform) in transforms.iter().enumerate() {
            out[idx] = match transform {
                Transform::Identity => branch,
                Transform::BasisChange => self.bit(),
            };
        }
    }
}

impl CorrelatedSource for GhzSource {
    fn draw(&mut self, transforms: &[Transform], adversary: Option<Adversary>) -> Vec<u8> {
        let mut out = vec![0u8; transforms.len()];
        match adversary {
            None => self.ideal_draw(transforms, &mut out, None),
            Some(adv) => {
                assert!(
                    adv.target_index < transforms.len(),
                    "adversary target out of range"
                );
                match adv.basis {
                    Basis::Z => self.collapsed_draw(transforms, &mut out),
                    Basis::X => {
                        // The target share is torn out of the entangled
                        // group; the rest behave as a smaller ideal GHZ.
                        out[adv.target_index] = self.bit();
                        self.ideal_draw(transforms, &mut out, Some(adv.target_index));
                    }
                }
            }
        }
        out
    }
}
