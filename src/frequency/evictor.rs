//! Probabilistic collision resolution
//!
//! When a key lands on a cell owned by a different fingerprint, each unit of
//! the incoming increment decays the incumbent with probability
//! `b^-counter`. Light incumbents give way quickly; heavy ones almost never
//! do, which is what lets large flows survive in a small table.

use super::grid::Cell;
use crate::math;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Exponential decay base `b` from the HeavyKeeper paper
pub const DECAY_BASE: f64 = 1.08;

/// What happened to a cell when an event was resolved against it
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The cell was empty and now belongs to the incoming key
    Inserted,
    /// The cell already carried the incoming fingerprint
    Reinforced,
    /// The incumbent lost `by` units (possibly none) and kept the cell;
    /// the event is dropped for this row
    Decayed { by: u32 },
    /// The incumbent decayed to zero and the incoming key took the cell
    Replaced,
}

/// Resolves incoming events against single cells
#[derive(Clone, Debug)]
pub struct Evictor {
    base: f64,
    ln_base: f64,
    rng: SmallRng,
}

impl Evictor {
    /// Create an evictor with decay base `base` (at least 1) and RNG seed
    pub fn new(base: f64, seed: u64) -> Self {
        debug_assert!(base >= 1.0);
        Self {
            base,
            ln_base: math::ln(base),
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    /// Restart the random stream from `seed`
    pub fn reseed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }

    /// Apply `increment` units of the key with `fingerprint` to `cell`
    pub fn resolve(&mut self, cell: &mut Cell, fingerprint: u32, increment: u32) -> Resolution {
        debug_assert!(fingerprint != 0);
        debug_assert!(increment > 0);

        if cell.is_empty() {
            *cell = Cell {
                fingerprint,
                counter: increment,
            };
            return Resolution::Inserted;
        }

        if cell.fingerprint == fingerprint {
            cell.counter = cell.counter.saturating_add(increment);
            return Resolution::Reinforced;
        }

        let mut remaining = increment as u64;
        let mut decayed = 0u32;
        loop {
            let gap = self.units_until_decay(cell.counter);
            if gap > remaining {
                return Resolution::Decayed { by: decayed };
            }
            remaining -= gap;
            decayed += 1;
            cell.counter -= 1;
            if cell.counter == 0 {
                *cell = Cell {
                    fingerprint,
                    counter: increment,
                };
                return Resolution::Replaced;
            }
        }
    }

    /// Decay probability for an incumbent holding `counter`
    #[inline]
    pub fn decay_probability(&self, counter: u32) -> f64 {
        math::exp(-(counter as f64) * self.ln_base)
    }

    /// Number of units, counting the successful one, until the next decay
    ///
    /// Sampled from the geometric distribution, so one draw stands in for a
    /// run of per-unit coin flips that all come up "keep".
    fn units_until_decay(&mut self, counter: u32) -> u64 {
        let p = self.decay_probability(counter);
        if p >= 1.0 {
            return 1;
        }
        if p <= 0.0 {
            return u64::MAX;
        }
        // (0, 1] keeps ln(u) finite
        let u = 1.0 - self.rng.gen::<f64>();
        let ratio = math::ln(u) / math::ln_1p(-p);
        (math::floor(ratio) as u64).saturating_add(1)
    }
}
