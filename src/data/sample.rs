//! # Pileup Samples
//!
//! A `Sample` is the fundamental unit consumed by inference: a dense feature
//! tensor with one row per pileup column, the draft coordinates of those
//! columns, and the read depth that produced them.
//!
//! Columns are addressed by `(major, minor)` pairs: `major` is the draft
//! position, `minor` the insertion rank at that position (0 = the draft base
//! itself). The pair sequence is strictly lexicographically increasing.

use ndarray::{s, Array1, Array2};

/// One window's worth of encoded pileup columns.
#[derive(Clone, Debug)]
pub struct Sample {
    /// Feature tensor, one row per pileup column.
    pub features: Array2<f32>,

    /// Draft position of each column. Monotonic non-decreasing.
    pub positions_major: Vec<i64>,

    /// Insertion rank of each column; 0 for draft-aligned columns, then
    /// strictly increasing within a run of equal major positions.
    pub positions_minor: Vec<i64>,

    /// Read depth per column.
    pub depth: Array1<f32>,

    /// Index of the draft contig this sample belongs to.
    pub seq_id: i32,

    /// Identity of the parent BAM region, used to scope merging.
    pub region_id: i32,
}

impl Sample {
    pub fn new(
        features: Array2<f32>,
        positions_major: Vec<i64>,
        positions_minor: Vec<i64>,
        depth: Array1<f32>,
        seq_id: i32,
        region_id: i32,
    ) -> Self {
        Self {
            features,
            positions_major,
            positions_minor,
            depth,
            seq_id,
            region_id,
        }
    }

    /// Number of pileup columns (tensor rows).
    pub fn len(&self) -> usize {
        self.positions_major.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions_major.is_empty()
    }

    /// First covered draft position, or -1 when empty.
    pub fn start(&self) -> i64 {
        self.positions_major.first().copied().unwrap_or(-1)
    }

    /// One past the last covered draft position, or -1 when empty.
    /// Half-open: a sample ending here abuts one starting at `end()`.
    pub fn end(&self) -> i64 {
        self.positions_major.last().map(|&p| p + 1).unwrap_or(-1)
    }

    /// The `(major, minor)` pair at a column index, `(-1, -1)` out of range.
    pub fn position(&self, idx: i64) -> (i64, i64) {
        if idx < 0 || idx >= self.len() as i64 {
            return (-1, -1);
        }
        let idx = idx as usize;
        (self.positions_major[idx], self.positions_minor[idx])
    }

    /// The `(major, minor)` pair of the final column.
    pub fn last_position(&self) -> (i64, i64) {
        self.position(self.len() as i64 - 1)
    }

    /// Copy out the columns in `[idx_start, idx_end)`, slicing all four
    /// parallel fields identically.
    pub fn slice(&self, idx_start: usize, idx_end: usize) -> Sample {
        debug_assert!(idx_start <= idx_end && idx_end <= self.len());
        Sample {
            features: self.features.slice(s![idx_start..idx_end, ..]).to_owned(),
            positions_major: self.positions_major[idx_start..idx_end].to_vec(),
            positions_minor: self.positions_minor[idx_start..idx_end].to_vec(),
            depth: self.depth.slice(s![idx_start..idx_end]).to_owned(),
            seq_id: self.seq_id,
            region_id: self.region_id,
        }
    }

    /// Check the structural invariants: equal field lengths and strictly
    /// increasing `(major, minor)` pairs.
    pub fn is_consistent(&self) -> bool {
        let n = self.positions_major.len();
        if self.positions_minor.len() != n
            || self.features.nrows() != n
            || self.depth.len() != n
        {
            return false;
        }
        self.positions_major
            .iter()
            .zip(&self.positions_minor)
            .zip(
                self.positions_major
                    .iter()
                    .zip(&self.positions_minor)
                    .skip(1),
            )
            .all(|((ma, mi), (mb, nb))| (ma, mi) < (mb, nb))
    }
}
