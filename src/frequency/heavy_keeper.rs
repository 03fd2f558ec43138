//! HeavyKeeper heavy-hitter sketch
//!
//! Counts keyed events in a fixed `depth × width` grid of fingerprinted
//! counters and keeps a ranked view of the `k` heaviest keys. Collisions are
//! settled by exponential-weakening decay, so heavy flows hold their cells
//! while light ones churn through.

use super::codec;
use super::evictor::{Evictor, DECAY_BASE};
use super::grid::HashGrid;
use super::tracker::{Offer, TopKTracker};
use crate::math;
use crate::traits::{ConfigError, DecodeError, FrequencySketch, HeavyHitters, MergeError, Sketch};
use tracing::{debug, trace};

#[cfg(feature = "std")]
use std::{
    string::{String, ToString},
    vec::Vec,
};

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(not(feature = "std"))]
use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};

/// Seed used by [`HeavyKeeper::new`]
pub const DEFAULT_SEED: u64 = 0x853c49e6748fea9b;

/// Read-only snapshot of a sketch's size and traffic
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeavyKeeperStats {
    /// Number of `add`/`update` calls recorded
    pub total_updates: u64,
    pub k: usize,
    pub depth: usize,
    pub width: usize,
    /// Exact storage cost of the grid in bits
    pub memory_bits: u64,
}

/// HeavyKeeper sketch for top-K heavy hitters
///
/// Sizing follows the usual count-min derivation from the accuracy
/// parameters:
/// - `depth = ceil(ln(1/δ))`
/// - `width = ceil(e/ε)`
///
/// Memory is fixed at construction and never grows with the number of
/// distinct keys. The sketch is single-threaded; shard and [`merge`] to
/// scale out.
///
/// # Example
///
/// ```
/// use topflow::frequency::HeavyKeeper;
///
/// let mut hk = HeavyKeeper::new(10, 0.001, 0.01).unwrap();
///
/// for i in 0..1000 {
///     hk.add(format!("flow_{}", i % 20).as_bytes(), 1);
/// }
/// hk.add(b"elephant", 500);
///
/// let top = hk.top_k();
/// assert_eq!(top[0].0, b"elephant".to_vec());
/// assert!(hk.estimate(b"elephant") >= 450);
/// ```
///
/// [`merge`]: crate::traits::Sketch::merge
#[derive(Clone, Debug)]
pub struct HeavyKeeper {
    k: usize,
    epsilon: f64,
    delta: f64,
    grid: HashGrid,
    evictor: Evictor,
    tracker: TopKTracker,
    total_updates: u64,
}

impl HeavyKeeper {
    /// Create a sketch tracking the top `k` keys
    ///
    /// # Arguments
    ///
    /// * `k` - Number of heavy hitters to report
    /// * `epsilon` - Error scale in (0, 1); smaller means wider rows
    /// * `delta` - Failure probability in (0, 1); smaller means more rows
    pub fn new(k: usize, epsilon: f64, delta: f64) -> Result<Self, ConfigError> {
        Self::with_seed(k, epsilon, delta, DEFAULT_SEED)
    }

    /// Create a sketch whose eviction decisions are driven by `seed`
    ///
    /// Two sketches with the same parameters and seed that see the same
    /// calls in the same order end up byte-identical.
    pub fn with_seed(k: usize, epsilon: f64, delta: f64, seed: u64) -> Result<Self, ConfigError> {
        let (depth, width) = validate(k, epsilon, delta)?;

        debug!(k, epsilon, delta, depth, width, "created heavy keeper");

        Ok(Self::from_parts(
            k,
            epsilon,
            delta,
            HashGrid::new(depth, width),
            TopKTracker::new(k),
            0,
            seed,
        ))
    }

    pub(crate) fn from_parts(
        k: usize,
        epsilon: f64,
        delta: f64,
        grid: HashGrid,
        tracker: TopKTracker,
        total_updates: u64,
        seed: u64,
    ) -> Self {
        Self {
            k,
            epsilon,
            delta,
            grid,
            evictor: Evictor::new(DECAY_BASE, seed),
            tracker,
            total_updates,
        }
    }

    /// Grid dimensions `(depth, width)` for the given accuracy parameters
    ///
    /// Fails under the same conditions as [`HeavyKeeper::new`].
    pub fn dimensions(epsilon: f64, delta: f64) -> Result<(usize, usize), ConfigError> {
        validate(1, epsilon, delta)
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn depth(&self) -> usize {
        self.grid.depth()
    }

    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn total_updates(&self) -> u64 {
        self.total_updates
    }

    /// Base `b` of the `b^-counter` collision decay
    pub fn decay_base(&self) -> f64 {
        self.evictor.base()
    }

    pub(crate) fn grid(&self) -> &HashGrid {
        &self.grid
    }

    /// Record `count` occurrences of `key`
    ///
    /// Counts above `u32::MAX` are clamped per cell. A zero count is ignored.
    pub fn add(&mut self, key: &[u8], count: u64) {
        if count == 0 {
            return;
        }
        self.total_updates = self.total_updates.saturating_add(1);
        let increment = count.min(u32::MAX as u64) as u32;

        let mut estimate: Option<u64> = None;
        for row in 0..self.grid.depth() {
            let probe = self.grid.locate(key, row);
            let cell = self.grid.cell_mut(row, probe.column);
            self.evictor.resolve(cell, probe.fingerprint, increment);

            if !cell.is_empty() && cell.fingerprint == probe.fingerprint {
                let counter = cell.counter as u64;
                estimate = Some(estimate.map_or(counter, |m| m.min(counter)));
            }
        }

        // Keys too long for the wire format stay out of the ranked view
        if key.len() <= u32::MAX as usize {
            self.offer(key, estimate.unwrap_or(0));
        }
    }

    /// Record one occurrence of each key, in order
    pub fn update_batch<I, K>(&mut self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        for key in keys {
            self.add(key.as_ref(), 1);
        }
    }

    /// Estimated count for `key`, 0 if no row carries its fingerprint
    pub fn estimate(&self, key: &[u8]) -> u64 {
        self.grid.min_matching(key)
    }

    /// Tracked keys with their estimates, heaviest first
    ///
    /// Equal estimates list the most recently admitted key first.
    pub fn top_k(&self) -> Vec<(Vec<u8>, u64)> {
        self.tracker.snapshot()
    }

    /// Whether `key` is currently in the top-K view
    pub fn contains(&self, key: &[u8]) -> bool {
        self.tracker.contains(key)
    }

    /// Attenuate every counter and tracked estimate by `1/b`
    ///
    /// Values that floor to zero are dropped: the cell is emptied and the
    /// key leaves the top-K view.
    pub fn decay(&mut self) {
        let factor = 1.0 / self.evictor.base();
        let emptied = self.grid.attenuate_all(factor);
        let dropped = self.tracker.decay_all(factor);

        debug!(factor, emptied, dropped, "decayed heavy keeper");
    }

    pub fn stats(&self) -> HeavyKeeperStats {
        HeavyKeeperStats {
            total_updates: self.total_updates,
            k: self.k,
            depth: self.grid.depth(),
            width: self.grid.width(),
            memory_bits: self.grid.memory_bits(),
        }
    }

    /// Encode into the portable little-endian format
    ///
    /// Layout: a 36-byte header `k:u32, depth:u32, width:u32, epsilon:f64,
    /// delta:f64, total_updates:u64`, then `depth * width` cells of
    /// `fingerprint:u32, counter:u32` in row-major order, then the top-K
    /// view as `count:u32` followed by `key_len:u32, key, estimate:u64`
    /// records, heaviest first.
    pub fn to_bytes(&self) -> Vec<u8> {
        codec::encode(self)
    }

    /// Decode bytes produced by [`HeavyKeeper::to_bytes`]
    ///
    /// The random stream restarts from [`DEFAULT_SEED`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::from_bytes_with_seed(bytes, DEFAULT_SEED)
    }

    /// Decode and restart the random stream from `seed`
    pub fn from_bytes_with_seed(bytes: &[u8], seed: u64) -> Result<Self, DecodeError> {
        codec::decode(bytes, seed).map_err(|err| {
            debug!(len = bytes.len(), error = %err, "rejected encoded heavy keeper");
            err
        })
    }

    fn offer(&mut self, key: &[u8], estimate: u64) {
        if let Offer::Evicted {
            key: evicted,
            estimate: evicted_estimate,
        } = self.tracker.offer(key, estimate)
        {
            trace!(
                evicted_len = evicted.len(),
                evicted_estimate,
                estimate,
                "top-k eviction"
            );
        }
    }

    fn config_string(&self) -> String {
        format!(
            "k={}, epsilon={}, delta={}, depth={}, width={}",
            self.k,
            self.epsilon,
            self.delta,
            self.grid.depth(),
            self.grid.width()
        )
    }

    fn is_compatible(&self, other: &Self) -> bool {
        self.k == other.k
            && self.epsilon == other.epsilon
            && self.delta == other.delta
            && self.grid.depth() == other.grid.depth()
            && self.grid.width() == other.grid.width()
    }
}

/// Check construction parameters and derive `(depth, width)`
pub(crate) fn validate(k: usize, epsilon: f64, delta: f64) -> Result<(usize, usize), ConfigError> {
    if k == 0 {
        return Err(ConfigError::InvalidParameter {
            param: "k",
            value: k.to_string(),
            constraint: "must be > 0",
        });
    }
    if k > u32::MAX as usize {
        return Err(ConfigError::InvalidParameter {
            param: "k",
            value: k.to_string(),
            constraint: "must fit in 32 bits",
        });
    }
    // Negated so NaN fails too
    if !(epsilon > 0.0 && epsilon < 1.0) {
        return Err(ConfigError::InvalidParameter {
            param: "epsilon",
            value: format!("{}", epsilon),
            constraint: "must be in (0, 1)",
        });
    }
    if !(delta > 0.0 && delta < 1.0) {
        return Err(ConfigError::InvalidParameter {
            param: "delta",
            value: format!("{}", delta),
            constraint: "must be in (0, 1)",
        });
    }

    let depth = math::ceil(math::ln(1.0 / delta)).max(1.0);
    let width = math::ceil(core::f64::consts::E / epsilon);

    if depth > u32::MAX as f64 {
        return Err(ConfigError::InvalidParameter {
            param: "delta",
            value: format!("{}", delta),
            constraint: "too small: row count must fit in 32 bits",
        });
    }
    if width > u32::MAX as f64 {
        return Err(ConfigError::InvalidParameter {
            param: "epsilon",
            value: format!("{}", epsilon),
            constraint: "too small: row width must fit in 32 bits",
        });
    }
    let (depth, width) = (depth as usize, width as usize);
    if depth.checked_mul(width).is_none() {
        return Err(ConfigError::InvalidParameter {
            param: "epsilon",
            value: format!("{}", epsilon),
            constraint: "too small: grid does not fit in memory",
        });
    }

    Ok((depth, width))
}

impl Sketch for HeavyKeeper {
    type Item = [u8];

    fn update(&mut self, item: &[u8]) {
        self.add(item, 1);
    }

    /// Fold `other` into this sketch
    ///
    /// Cells combine position by position: empty cells copy, matching
    /// fingerprints sum, and differing fingerprints keep the heavier counter
    /// (the receiver's on a tie). The top-K view is then rebuilt from both
    /// sides' tracked keys, each offered at its estimate in the merged grid;
    /// a key whose cells were all taken by the other side drops out.
    fn merge(&mut self, other: &Self) -> Result<(), MergeError> {
        if !self.is_compatible(other) {
            return Err(MergeError::IncompatibleConfig {
                expected: self.config_string(),
                found: other.config_string(),
            });
        }
        if other.is_empty() {
            return Ok(());
        }

        self.grid.merge_from(&other.grid);

        let mut rebuilt = TopKTracker::new(self.k);
        // Oldest first so recency ties survive the rebuild
        for side in [&self.tracker, &other.tracker] {
            for (key, _) in side.snapshot().into_iter().rev() {
                rebuilt.offer(&key, self.grid.min_matching(&key));
            }
        }
        self.tracker = rebuilt;
        self.total_updates = self.total_updates.saturating_add(other.total_updates);

        debug!(
            total_updates = self.total_updates,
            tracked = self.tracker.len(),
            "merged heavy keeper"
        );

        Ok(())
    }

    fn clear(&mut self) {
        self.grid.clear();
        self.tracker.clear();
        self.total_updates = 0;

        debug!(k = self.k, "cleared heavy keeper");
    }

    fn size_bytes(&self) -> usize {
        core::mem::size_of::<Self>()
            + self.grid.cells().len() * core::mem::size_of::<super::grid::Cell>()
            + self.tracker.size_bytes()
    }

    fn count(&self) -> u64 {
        self.total_updates
    }

    fn is_empty(&self) -> bool {
        self.total_updates == 0 && self.tracker.is_empty() && self.grid.is_empty()
    }
}

impl core::fmt::Display for HeavyKeeper {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "HeavyKeeper(k={}, depth={}, width={})",
            self.k,
            self.grid.depth(),
            self.grid.width()
        )
    }
}

impl FrequencySketch for HeavyKeeper {
    fn estimate_frequency(&self, item: &[u8]) -> u64 {
        self.estimate(item)
    }
}

impl HeavyHitters for HeavyKeeper {
    fn heavy_hitters(&self, min_estimate: u64) -> Vec<(Vec<u8>, u64)> {
        self.tracker
            .snapshot()
            .into_iter()
            .filter(|(_, estimate)| *estimate >= min_estimate)
            .collect()
    }

    fn top_k(&self) -> Vec<(Vec<u8>, u64)> {
        self.tracker.snapshot()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for HeavyKeeper {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for HeavyKeeper {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let bytes = <Vec<u8> as serde::Deserialize>::deserialize(deserializer)?;
        HeavyKeeper::from_bytes(&bytes).map_err(<D::Error as serde::de::Error>::custom)
    }
}
