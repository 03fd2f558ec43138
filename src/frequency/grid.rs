//! Fingerprinted counter grid
//!
//! A `depth × width` table of [`Cell`]s. Each row is an independent hash
//! table: a key maps to one column per row and leaves a 32-bit fingerprint
//! there instead of the key itself, so two keys may share a cell.

use crate::math;
use xxhash_rust::xxh3::xxh3_64_with_seed;

#[cfg(feature = "std")]
use std::vec::Vec;

#[cfg(not(feature = "std"))]
extern crate alloc;
#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

/// Bits used to store a fingerprint
pub const FINGERPRINT_BITS: u64 = 32;

/// Bits used to store a counter
pub const COUNTER_BITS: u64 = 32;

const SEED_STRIDE: u64 = 0x9e3779b97f4a7c15;

/// One slot of the grid
///
/// The empty cell is `(0, 0)`. A nonzero counter always carries a nonzero
/// fingerprint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cell {
    pub fingerprint: u32,
    pub counter: u32,
}

impl Cell {
    /// The empty cell
    pub const EMPTY: Cell = Cell {
        fingerprint: 0,
        counter: 0,
    };

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counter == 0
    }

    #[inline]
    pub fn clear(&mut self) {
        *self = Cell::EMPTY;
    }

    /// Multiply the counter by `factor`, emptying the cell if it floors to 0
    ///
    /// Returns true if the cell was emptied by this call.
    pub fn attenuate(&mut self, factor: f64) -> bool {
        if self.is_empty() {
            return false;
        }
        let scaled = math::floor(self.counter as f64 * factor) as u32;
        if scaled == 0 {
            self.clear();
            true
        } else {
            self.counter = scaled;
            false
        }
    }
}

/// Where a key lands in one row
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Probe {
    pub column: usize,
    pub fingerprint: u32,
}

/// Row-major `depth × width` cell storage
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HashGrid {
    depth: usize,
    width: usize,
    cells: Vec<Cell>,
}

impl HashGrid {
    /// Create an empty grid
    ///
    /// Both dimensions must be positive; callers derive them from validated
    /// accuracy parameters.
    pub fn new(depth: usize, width: usize) -> Self {
        debug_assert!(depth > 0 && width > 0);
        Self {
            depth,
            width,
            cells: vec![Cell::EMPTY; depth * width],
        }
    }

    pub(crate) fn from_cells(depth: usize, width: usize, cells: Vec<Cell>) -> Self {
        debug_assert_eq!(cells.len(), depth * width);
        Self {
            depth,
            width,
            cells,
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Exact storage cost of the cells in bits
    pub fn memory_bits(&self) -> u64 {
        (self.depth as u64) * (self.width as u64) * (FINGERPRINT_BITS + COUNTER_BITS)
    }

    /// Hash `key` for `row`
    ///
    /// The fingerprint and the column come from independently seeded hashes,
    /// and the seeds depend only on the row index, so the result is the same
    /// in every process and every grid of the same width.
    #[inline]
    pub fn locate(&self, key: &[u8], row: usize) -> Probe {
        let (fp_seed, col_seed) = row_seeds(row);
        let fingerprint = match xxh3_64_with_seed(key, fp_seed) as u32 {
            0 => 1,
            fp => fp,
        };
        let column = (xxh3_64_with_seed(key, col_seed) % self.width as u64) as usize;
        Probe {
            column,
            fingerprint,
        }
    }

    #[inline]
    pub fn cell(&self, row: usize, column: usize) -> &Cell {
        &self.cells[row * self.width + column]
    }

    #[inline]
    pub fn cell_mut(&mut self, row: usize, column: usize) -> &mut Cell {
        &mut self.cells[row * self.width + column]
    }

    /// Minimum counter over the rows whose cell carries `key`'s fingerprint
    ///
    /// Returns 0 if no row matches. An empty cell in any of `key`'s rows also
    /// reads as 0: inserting a key fills every one of its rows, so an empty
    /// cell there is a count that attenuated away.
    pub fn min_matching(&self, key: &[u8]) -> u64 {
        let mut min = None;
        for row in 0..self.depth {
            let probe = self.locate(key, row);
            let cell = self.cell(row, probe.column);
            if cell.is_empty() {
                return 0;
            }
            if cell.fingerprint == probe.fingerprint {
                let count = cell.counter as u64;
                min = Some(min.map_or(count, |m: u64| m.min(count)));
            }
        }
        min.unwrap_or(0)
    }

    /// Attenuate every cell by `factor`, returning the number emptied
    pub fn attenuate_all(&mut self, factor: f64) -> usize {
        self.cells
            .iter_mut()
            .map(|cell| cell.attenuate(factor))
            .filter(|&emptied| emptied)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(Cell::is_empty)
    }

    pub fn clear(&mut self) {
        self.cells.fill(Cell::EMPTY);
    }

    /// All cells in row-major order
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Fold `other` into this grid cell by cell
    ///
    /// Empty cells take the other side's cell, matching fingerprints sum
    /// (saturating), and differing fingerprints keep the heavier counter.
    /// On equal counters the receiver keeps its own cell. Both grids must
    /// have the same dimensions.
    pub fn merge_from(&mut self, other: &HashGrid) {
        debug_assert_eq!((self.depth, self.width), (other.depth, other.width));

        for (mine, theirs) in self.cells.iter_mut().zip(other.cells.iter()) {
            if theirs.is_empty() {
                continue;
            }
            if mine.is_empty() {
                *mine = *theirs;
            } else if mine.fingerprint == theirs.fingerprint {
                mine.counter = mine.counter.saturating_add(theirs.counter);
            } else if theirs.counter > mine.counter {
                *mine = *theirs;
            }
        }
    }
}

#[inline]
fn row_seeds(row: usize) -> (u64, u64) {
    let base = (row as u64).wrapping_mul(2);
    (
        base.wrapping_add(1).wrapping_mul(SEED_STRIDE),
        base.wrapping_add(2).wrapping_mul(SEED_STRIDE),
    )
}
