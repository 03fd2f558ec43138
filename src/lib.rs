//! # Topflow
//!
//! Bounded-memory heavy-hitter detection for high-rate event streams.
//!
//! Topflow implements the HeavyKeeper sketch: a grid of fingerprinted
//! counters where collisions are settled by exponential-weakening decay, so
//! large flows keep their counters while the long tail churns, plus an
//! incrementally maintained top-K view.
//!
//! ## Features
//!
//! - **Frequency Estimation**: per-key counts with `(ε, δ)`-derived sizing
//! - **Heavy Hitters**: always-ranked top-K, updated on every event
//! - **Full Mergeability**: combine shards that share a configuration
//! - **Time Decay**: caller-driven global aging of all counts
//! - **Portable Encoding**: bit-exact little-endian serialization
//!
//! ## Quick Start
//!
//! ```rust
//! use topflow::prelude::*;
//!
//! let mut hk = HeavyKeeper::new(3, 0.001, 0.01).unwrap();
//! for user in ["alice", "bob", "alice", "carol", "alice", "bob"] {
//!     hk.update(user.as_bytes());
//! }
//!
//! assert_eq!(hk.top_k()[0], (b"alice".to_vec(), 3));
//! println!("bob: ~{}", hk.estimate(b"bob"));
//! ```
//!
//! ## Distributed Computing
//!
//! Sketches implement the [`Sketch`](traits::Sketch) trait, whose `merge`
//! combines sketches built with the same parameters:
//!
//! ```rust
//! use topflow::HeavyKeeper;
//! use topflow::traits::Sketch;
//!
//! let mut worker1 = HeavyKeeper::new(10, 0.001, 0.01).unwrap();
//! let mut worker2 = HeavyKeeper::new(10, 0.001, 0.01).unwrap();
//!
//! worker1.add(b"user_a", 50);
//! worker2.add(b"user_a", 30);
//!
//! worker1.merge(&worker2).unwrap();
//! assert!(worker1.estimate(b"user_a") >= 70);
//! ```
//!
//! ## Feature Flags
//!
//! - `frequency` (default): HeavyKeeper and its components
//! - `full`: Everything below
//!
//! Platform features:
//! - `std` (default): Standard library support; without it the crate is
//!   `no_std + alloc`
//! - `serde`: `Serialize`/`Deserialize` through the byte encoding

#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(not(feature = "std"))]
extern crate alloc;

// Core traits always available
pub mod traits;

mod math;

#[cfg(feature = "frequency")]
#[cfg_attr(docsrs, doc(cfg(feature = "frequency")))]
pub mod frequency;

pub mod prelude {
    pub use crate::traits::*;

    #[cfg(feature = "frequency")]
    pub use crate::frequency::{HeavyKeeper, HeavyKeeperStats};
}

#[cfg(feature = "frequency")]
pub use frequency::HeavyKeeper;
