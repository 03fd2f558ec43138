//! Portable byte encoding for [`HeavyKeeper`]
//!
//! Everything is little-endian with fixed widths, so the bytes are identical
//! across platforms. Decoding is strict: every field is checked against the
//! header and any leftover input is an error.

use super::grid::{Cell, HashGrid};
use super::heavy_keeper::{validate, HeavyKeeper};
use super::tracker::{Offer, TopKTracker};
use crate::traits::DecodeError;

#[cfg(feature = "std")]
use std::{string::ToString, vec::Vec};

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(not(feature = "std"))]
use alloc::{format, string::ToString, vec::Vec};

/// `k, depth, width: u32` + `epsilon, delta: f64` + `total_updates: u64`
pub const HEADER_LEN: usize = 36;

const CELL_LEN: usize = 8;

pub(crate) fn encode(sketch: &HeavyKeeper) -> Vec<u8> {
    let grid = sketch.grid();
    let top = sketch.top_k();
    let tracker_len: usize = top.iter().map(|(key, _)| 12 + key.len()).sum();

    let mut out = Vec::with_capacity(HEADER_LEN + grid.cells().len() * CELL_LEN + 4 + tracker_len);

    out.extend_from_slice(&(sketch.k() as u32).to_le_bytes());
    out.extend_from_slice(&(grid.depth() as u32).to_le_bytes());
    out.extend_from_slice(&(grid.width() as u32).to_le_bytes());
    out.extend_from_slice(&sketch.epsilon().to_le_bytes());
    out.extend_from_slice(&sketch.delta().to_le_bytes());
    out.extend_from_slice(&sketch.total_updates().to_le_bytes());

    for cell in grid.cells() {
        out.extend_from_slice(&cell.fingerprint.to_le_bytes());
        out.extend_from_slice(&cell.counter.to_le_bytes());
    }

    out.extend_from_slice(&(top.len() as u32).to_le_bytes());
    for (key, estimate) in &top {
        out.extend_from_slice(&(key.len() as u32).to_le_bytes());
        out.extend_from_slice(key);
        out.extend_from_slice(&estimate.to_le_bytes());
    }

    out
}

pub(crate) fn decode(bytes: &[u8], seed: u64) -> Result<HeavyKeeper, DecodeError> {
    let mut r = Reader::new(bytes);

    let k = r.u32()? as usize;
    let depth = r.u32()? as usize;
    let width = r.u32()? as usize;
    let epsilon = r.f64()?;
    let delta = r.f64()?;
    let total_updates = r.u64()?;

    let expected = validate(k, epsilon, delta).map_err(|e| DecodeError::InvalidHeader(e.to_string()))?;
    if expected != (depth, width) {
        return Err(DecodeError::InvalidHeader(format!(
            "dimensions {}x{} do not match epsilon={}, delta={} (expected {}x{})",
            depth, width, epsilon, delta, expected.0, expected.1
        )));
    }

    // Dimensions are validated, so this cannot overflow; check the length
    // before allocating
    let n_cells = depth * width;
    r.require(n_cells.saturating_mul(CELL_LEN))?;

    let mut cells = Vec::with_capacity(n_cells);
    for i in 0..n_cells {
        let cell = Cell {
            fingerprint: r.u32()?,
            counter: r.u32()?,
        };
        if (cell.fingerprint == 0) != (cell.counter == 0) {
            return Err(DecodeError::Corrupted(format!(
                "cell {} has fingerprint {} with counter {}",
                i, cell.fingerprint, cell.counter
            )));
        }
        cells.push(cell);
    }

    let count = r.u32()? as usize;
    if count > k {
        return Err(DecodeError::Corrupted(format!(
            "{} tracked keys exceed k={}",
            count, k
        )));
    }

    // Each record takes at least 12 bytes, so a lying count cannot force a
    // large allocation
    let mut records = Vec::with_capacity(count.min(r.remaining() / 12));
    for _ in 0..count {
        let len = r.u32()? as usize;
        let key = r.take(len)?;
        let estimate = r.u64()?;
        if estimate == 0 {
            return Err(DecodeError::Corrupted("tracked key with zero estimate".to_string()));
        }
        records.push((key, estimate));
    }

    if records.windows(2).any(|w| w[0].1 < w[1].1) {
        return Err(DecodeError::Corrupted(
            "tracked keys not in descending order".to_string(),
        ));
    }

    if r.remaining() > 0 {
        return Err(DecodeError::LengthMismatch {
            expected: r.position(),
            found: bytes.len(),
        });
    }

    // Lightest first, so the heaviest and most recent end up newest
    let mut tracker = TopKTracker::new(k);
    for (key, estimate) in records.into_iter().rev() {
        if tracker.offer(key, estimate) != Offer::Inserted {
            return Err(DecodeError::Corrupted("duplicate tracked key".to_string()));
        }
    }

    Ok(HeavyKeeper::from_parts(
        k,
        epsilon,
        delta,
        HashGrid::from_cells(depth, width, cells),
        tracker,
        total_updates,
        seed,
    ))
}

/// Bounds-checked cursor over the input
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn require(&self, n: usize) -> Result<(), DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::BufferTooShort {
                expected: self.pos.saturating_add(n),
                found: self.bytes.len(),
            });
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.require(n)?;
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        self.array().map(u64::from_le_bytes)
    }

    fn f64(&mut self) -> Result<f64, DecodeError> {
        self.array().map(f64::from_le_bytes)
    }
}
