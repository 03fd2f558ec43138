//! Frequency estimation and heavy-hitter detection
//!
//! [`HeavyKeeper`] counts keyed events in bounded memory and keeps the `k`
//! heaviest keys ranked. It is assembled from three parts that are also
//! usable on their own:
//!
//! - [`HashGrid`]: `depth × width` table of fingerprinted counters
//! - [`Evictor`]: settles collisions by exponential-weakening decay
//! - [`TopKTracker`]: min-heap index of the heaviest keys
//!
//! # Example
//!
//! ```
//! use topflow::frequency::HeavyKeeper;
//! use topflow::traits::Sketch;
//!
//! let mut shard_a = HeavyKeeper::new(5, 0.01, 0.01).unwrap();
//! let mut shard_b = HeavyKeeper::new(5, 0.01, 0.01).unwrap();
//!
//! shard_a.add(b"10.0.0.1", 40);
//! shard_b.add(b"10.0.0.1", 25);
//! shard_b.add(b"10.0.0.2", 3);
//!
//! shard_a.merge(&shard_b).unwrap();
//! assert_eq!(shard_a.top_k()[0], (b"10.0.0.1".to_vec(), 65));
//!
//! // Age everything by one step
//! shard_a.decay();
//! assert!(shard_a.estimate(b"10.0.0.1") < 65);
//! ```

mod codec;
mod evictor;
mod grid;
mod heavy_keeper;
mod tracker;

pub use codec::HEADER_LEN;
pub use evictor::{Evictor, Resolution, DECAY_BASE};
pub use grid::{Cell, HashGrid, Probe, COUNTER_BITS, FINGERPRINT_BITS};
pub use heavy_keeper::{HeavyKeeper, HeavyKeeperStats, DEFAULT_SEED};
pub use tracker::{Offer, TopKTracker};
