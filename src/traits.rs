//! Core traits for streaming sketches
//!
//! Every sketch implements the base [`Sketch`] trait. Frequency estimators add
//! [`FrequencySketch`], and sketches that keep a ranked view of their heaviest
//! keys add [`HeavyHitters`].

use core::fmt::Debug;

#[cfg(feature = "std")]
use std::{string::String, vec::Vec};

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(not(feature = "std"))]
use alloc::{string::String, vec::Vec};

/// Error raised when a sketch is constructed with invalid parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A parameter is outside its valid range
    InvalidParameter {
        /// Parameter name
        param: &'static str,
        /// Offending value, rendered as text
        value: String,
        /// The constraint that was violated
        constraint: &'static str,
    },
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::InvalidParameter {
                param,
                value,
                constraint,
            } => write!(f, "invalid parameter '{}' = {}: {}", param, value, constraint),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

/// Error during sketch merge operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeError {
    /// Sketches have incompatible configurations
    IncompatibleConfig {
        expected: String,
        found: String,
    },
}

impl core::fmt::Display for MergeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MergeError::IncompatibleConfig { expected, found } => {
                write!(f, "incompatible config: expected {}, found {}", expected, found)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MergeError {}

/// Error during sketch decoding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Input buffer ended before a complete field could be read
    BufferTooShort { expected: usize, found: usize },
    /// Input length disagrees with the size implied by its contents
    LengthMismatch { expected: usize, found: usize },
    /// Header fields are invalid or inconsistent with each other
    InvalidHeader(String),
    /// Corrupted data
    Corrupted(String),
}

impl core::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DecodeError::BufferTooShort { expected, found } => {
                write!(f, "buffer too short: expected {}, found {}", expected, found)
            }
            DecodeError::LengthMismatch { expected, found } => {
                write!(f, "length mismatch: expected {} bytes, found {}", expected, found)
            }
            DecodeError::InvalidHeader(msg) => write!(f, "invalid header: {}", msg),
            DecodeError::Corrupted(msg) => write!(f, "corrupted data: {}", msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

/// Core trait for all streaming sketches
pub trait Sketch: Clone + Debug {
    /// The type of item this sketch processes
    type Item: ?Sized;

    /// Add an item to the sketch
    fn update(&mut self, item: &Self::Item);

    /// Merge another sketch into this one
    ///
    /// Returns an error if sketches are incompatible
    fn merge(&mut self, other: &Self) -> Result<(), MergeError>;

    /// Reset sketch to empty state
    fn clear(&mut self);

    /// Memory usage in bytes
    fn size_bytes(&self) -> usize;

    /// Number of items processed
    fn count(&self) -> u64;

    /// Check if sketch is empty
    fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Frequency estimation sketches
pub trait FrequencySketch: Sketch {
    /// Estimate frequency of an item
    fn estimate_frequency(&self, item: &Self::Item) -> u64;

    /// Check if frequency exceeds threshold
    fn exceeds_threshold(&self, item: &Self::Item, threshold: u64) -> bool {
        self.estimate_frequency(item) >= threshold
    }
}

/// Heavy hitters / Top-K capability
///
/// Keys are reported as owned byte strings since the sketch only stores the
/// bytes it was handed, never the caller's original type.
pub trait HeavyHitters: FrequencySketch {
    /// Tracked keys whose estimate is at least `min_estimate`, heaviest first
    fn heavy_hitters(&self, min_estimate: u64) -> Vec<(Vec<u8>, u64)>;

    /// All tracked keys, heaviest first
    fn top_k(&self) -> Vec<(Vec<u8>, u64)>;
}
