//! Uniform-grid broad-phase spatial index.
//!
//! The simulation rebuilds the index from entity positions every tick and
//! answers "what is near this point" with candidate index lists: radius
//! queries scan the square cell neighborhood covering the circle, so they
//! over-approximate — callers filter candidates with an exact distance
//! check. False positives are expected; false negatives never occur.
//!
//! Cells are pooled and fully rebuilt each pass — there is no incremental
//! insert/remove, and an index's presence in a cell has no lifetime beyond
//! one build. The query path allocates nothing beyond growth of the
//! caller's output buffer and never returns an error: malformed inputs
//! (negative radius, non-finite coordinates) produce no matches.

use std::collections::hash_map::Entry;

use rustc_hash::FxHashMap;

/// Hard floor for the cell size. Guards against division by zero and
/// pathological cell counts from tiny or non-positive sizes.
pub const MIN_CELL_SIZE: f64 = 0.001;

/// Default cell size in world units.
pub const DEFAULT_CELL_SIZE: f64 = 10.0;

/// Uniform grid over the horizontal plane. Holds opaque `u32` indices that
/// reference an external entity array rebuilt alongside the grid.
#[derive(Debug)]
pub struct SpatialHash {
    cell_size: f64,
    cells: FxHashMap<(i64, i64), Vec<u32>>,
    pool: Vec<Vec<u32>>,
}

impl SpatialHash {
    /// Creates an empty grid. `cell_size` is clamped to [`MIN_CELL_SIZE`].
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: clamp_cell_size(cell_size),
            cells: FxHashMap::default(),
            pool: Vec::new(),
        }
    }

    /// The active cell size.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Number of occupied cells in the current build.
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Returns every cell to the pool and clears the active map, keeping
    /// allocations for the next build. A differing `cell_size` is adopted;
    /// mixed cell sizes within one build are not supported.
    pub fn reset(&mut self, cell_size: Option<f64>) {
        if let Some(size) = cell_size {
            let size = clamp_cell_size(size);
            if size != self.cell_size {
                self.cell_size = size;
            }
        }
        for (_, mut cell) in self.cells.drain() {
            cell.clear();
            self.pool.push(cell);
        }
    }

    /// Inserts `index` at world position `(x, z)`. Non-finite coordinates
    /// are skipped — the entity simply never matches a query this tick.
    pub fn insert(&mut self, index: u32, x: f64, z: f64) {
        if !x.is_finite() || !z.is_finite() {
            return;
        }
        let key = self.cell_key(x, z);
        let cell = match self.cells.entry(key) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(v) => v.insert(self.pool.pop().unwrap_or_default()),
        };
        cell.push(index);
    }

    /// Collects into `out` every index whose cell intersects the square
    /// neighborhood of side `2·range + 1` around `(x, z)`, where
    /// `range = ceil(radius / cell_size)`.
    ///
    /// `out` is cleared first. A negative radius or non-finite input yields
    /// an empty result. With more than one match the result is sorted
    /// ascending, so identical queries against an unmodified grid return
    /// identical output.
    pub fn query_indices(&self, x: f64, z: f64, radius: f64, out: &mut Vec<u32>) {
        out.clear();
        if radius < 0.0 || !x.is_finite() || !z.is_finite() || !radius.is_finite() {
            return;
        }

        let (cx, cz) = self.cell_key(x, z);
        let range = (radius / self.cell_size).ceil() as i64;
        for dz in -range..=range {
            for dx in -range..=range {
                if let Some(cell) = self.cells.get(&(cx + dx, cz + dz)) {
                    out.extend_from_slice(cell);
                }
            }
        }

        if out.len() > 1 {
            out.sort_unstable();
        }
    }

    fn cell_key(&self, x: f64, z: f64) -> (i64, i64) {
        (
            (x / self.cell_size).floor() as i64,
            (z / self.cell_size).floor() as i64,
        )
    }
}

impl Default for SpatialHash {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_SIZE)
    }
}

fn clamp_cell_size(size: f64) -> f64 {
    if size.is_finite() {
        size.max(MIN_CELL_SIZE)
    } else {
        DEFAULT_CELL_SIZE
    }
}
