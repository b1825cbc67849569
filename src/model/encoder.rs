//! # Feature Encoders
//!
//! Turn pileup observations for a draft window into the dense per-column
//! feature tensor of a [`Sample`]. Two encodings are supported, selected by
//! the model config:
//!
//! - `CountsEncoder`: strand-split, depth-normalized counts of
//!   `A/C/G/T/deletion` per column (feature dim 10).
//! - `ReadAlignmentEncoder`: per-read slots carrying base identity and
//!   strand, flattened into the feature axis.
//!
//! Both materialize insertion columns: a column at draft position `p` with
//! a longest insertion of `k` bases is followed by `k` rows with the same
//! major position and minor ranks `1..=k`.

use ndarray::{Array1, Array2, Array3, Axis};
use rust_htslib::bam;
use rust_htslib::bam::Read as _;
use std::path::Path;

use crate::data::Sample;
use crate::error::{GraylingError, Result};
use crate::model::config::{kwarg_usize, ModelConfig};
use crate::model::pileup::{collect_pileup, PileupColumn};

/// Capability contract of a pileup feature encoder.
///
/// Output guarantees: all major positions lie in `[start, end)`; columns
/// with no spanning reads are absent; the sample is empty when the window
/// has no aligned reads; `(major, minor)` pairs are strictly increasing.
pub trait FeatureEncoder: Send {
    fn feature_dim(&self) -> usize;

    fn encode_region(
        &mut self,
        seq_name: &str,
        start: i64,
        end: i64,
        seq_id: i32,
    ) -> Result<Sample>;
}

const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

fn base_index(base: u8) -> Option<usize> {
    BASES.iter().position(|&b| b == base.to_ascii_uppercase())
}

/// What one read shows at one (major, minor) column.
enum ColumnCall {
    Base(u8),
    Deletion,
}

fn read_call(col: &PileupColumn, read: usize, minor: usize) -> ColumnCall {
    let obs = &col.reads[read];
    if minor == 0 {
        match obs.base {
            Some(base) => ColumnCall::Base(base),
            None => ColumnCall::Deletion,
        }
    } else if obs.insertion.len() >= minor {
        ColumnCall::Base(obs.insertion[minor - 1])
    } else {
        // A spanning read without this insertion rank reads as a deletion.
        ColumnCall::Deletion
    }
}

/// Assemble a `Sample` from pileup columns, asking `featurize` for each
/// `(column, minor)` row.
fn build_sample(
    columns: &[PileupColumn],
    feature_dim: usize,
    seq_id: i32,
    featurize: impl Fn(&PileupColumn, usize) -> Vec<f32>,
) -> Sample {
    let n_rows: usize = columns.iter().map(|c| c.max_insertion() + 1).sum();
    let mut features = Array2::zeros((n_rows, feature_dim));
    let mut majors = Vec::with_capacity(n_rows);
    let mut minors = Vec::with_capacity(n_rows);
    let mut depth = Array1::zeros(n_rows);

    let mut row = 0;
    for col in columns {
        for minor in 0..=col.max_insertion() {
            let values = featurize(col, minor);
            debug_assert_eq!(values.len(), feature_dim);
            for (j, v) in values.into_iter().enumerate() {
                features[[row, j]] = v;
            }
            majors.push(col.major);
            minors.push(minor as i64);
            depth[row] = col.reads.len() as f32;
            row += 1;
        }
    }
    Sample::new(features, majors, minors, depth, seq_id, -1)
}

/// Strand-split normalized base counts.
pub struct CountsEncoder {
    bam: bam::IndexedReader,
    min_mapq: u8,
}

/// Feature layout: `[A+, C+, G+, T+, del+, A-, C-, G-, T-, del-]`,
/// each divided by the column depth.
pub const COUNTS_FEATURE_DIM: usize = 10;

impl CountsEncoder {
    pub fn new(bam_path: &Path, min_mapq: u8) -> Result<Self> {
        let bam = bam::IndexedReader::from_path(bam_path)?;
        Ok(Self { bam, min_mapq })
    }

    fn featurize(col: &PileupColumn, minor: usize) -> Vec<f32> {
        let mut counts = vec![0.0f32; COUNTS_FEATURE_DIM];
        for read in 0..col.reads.len() {
            let strand_offset = if col.reads[read].reverse { 5 } else { 0 };
            match read_call(col, read, minor) {
                ColumnCall::Base(base) => {
                    if let Some(idx) = base_index(base) {
                        counts[strand_offset + idx] += 1.0;
                    }
                }
                ColumnCall::Deletion => counts[strand_offset + 4] += 1.0,
            }
        }
        let depth = col.reads.len() as f32;
        if depth > 0.0 {
            for v in &mut counts {
                *v /= depth;
            }
        }
        counts
    }
}

impl FeatureEncoder for CountsEncoder {
    fn feature_dim(&self) -> usize {
        COUNTS_FEATURE_DIM
    }

    fn encode_region(
        &mut self,
        seq_name: &str,
        start: i64,
        end: i64,
        seq_id: i32,
    ) -> Result<Sample> {
        let tid = self.bam.header().tid(seq_name.as_bytes()).ok_or_else(|| {
            GraylingError::invalid_data(format!("Contig '{seq_name}' not found in the alignment"))
        })?;
        let columns = collect_pileup(&mut self.bam, tid, start, end, self.min_mapq)?;
        Ok(build_sample(
            &columns,
            COUNTS_FEATURE_DIM,
            seq_id,
            Self::featurize,
        ))
    }
}

/// Per-read base/strand slots.
pub struct ReadAlignmentEncoder {
    bam: bam::IndexedReader,
    min_mapq: u8,
    max_reads: usize,
}

impl ReadAlignmentEncoder {
    pub fn new(bam_path: &Path, min_mapq: u8, max_reads: usize) -> Result<Self> {
        let bam = bam::IndexedReader::from_path(bam_path)?;
        Ok(Self {
            bam,
            min_mapq,
            max_reads,
        })
    }

    fn featurize(col: &PileupColumn, minor: usize, max_reads: usize) -> Vec<f32> {
        // Two features per read slot: a base code in (0, 1] and a strand
        // sign. Empty slots stay zero.
        let mut values = vec![0.0f32; max_reads * 2];
        for read in 0..col.reads.len().min(max_reads) {
            let code = match read_call(col, read, minor) {
                ColumnCall::Base(base) => match base_index(base) {
                    Some(idx) => (idx + 1) as f32 / 5.0,
                    None => continue,
                },
                ColumnCall::Deletion => 1.0,
            };
            values[read * 2] = code;
            values[read * 2 + 1] = if col.reads[read].reverse { -1.0 } else { 1.0 };
        }
        values
    }
}

impl FeatureEncoder for ReadAlignmentEncoder {
    fn feature_dim(&self) -> usize {
        self.max_reads * 2
    }

    fn encode_region(
        &mut self,
        seq_name: &str,
        start: i64,
        end: i64,
        seq_id: i32,
    ) -> Result<Sample> {
        let tid = self.bam.header().tid(seq_name.as_bytes()).ok_or_else(|| {
            GraylingError::invalid_data(format!("Contig '{seq_name}' not found in the alignment"))
        })?;
        let columns = collect_pileup(&mut self.bam, tid, start, end, self.min_mapq)?;
        let max_reads = self.max_reads;
        Ok(build_sample(
            &columns,
            self.feature_dim(),
            seq_id,
            move |col, minor| Self::featurize(col, minor, max_reads),
        ))
    }
}

/// Encoder variant selected from the model config.
pub enum EncoderKind {
    Counts(CountsEncoder),
    ReadAlignment(ReadAlignmentEncoder),
}

impl EncoderKind {
    pub fn from_config(config: &ModelConfig, bam_path: &Path, min_mapq: u8) -> Result<Self> {
        match config.feature_encoder.encoder_type.as_str() {
            "CountsEncoder" => Ok(Self::Counts(CountsEncoder::new(bam_path, min_mapq)?)),
            "ReadAlignmentEncoder" => {
                let max_reads = kwarg_usize(&config.feature_encoder.kwargs, "max_reads", 100)?;
                Ok(Self::ReadAlignment(ReadAlignmentEncoder::new(
                    bam_path, min_mapq, max_reads,
                )?))
            }
            other => Err(GraylingError::format(format!(
                "Unknown feature encoder type: '{other}'"
            ))),
        }
    }
}

impl FeatureEncoder for EncoderKind {
    fn feature_dim(&self) -> usize {
        match self {
            Self::Counts(e) => e.feature_dim(),
            Self::ReadAlignment(e) => e.feature_dim(),
        }
    }

    fn encode_region(
        &mut self,
        seq_name: &str,
        start: i64,
        end: i64,
        seq_id: i32,
    ) -> Result<Sample> {
        match self {
            Self::Counts(e) => e.encode_region(seq_name, start, end, seq_id),
            Self::ReadAlignment(e) => e.encode_region(seq_name, start, end, seq_id),
        }
    }
}

/// Stack same-shaped samples into a `[batch, len, features]` tensor.
pub fn collate(samples: &[&Sample]) -> Result<Array3<f32>> {
    let first = samples
        .first()
        .ok_or_else(|| GraylingError::invalid_data("Cannot collate an empty batch"))?;
    let shape = first.features.dim();
    if samples.iter().any(|s| s.features.dim() != shape) {
        return Err(GraylingError::invalid_data(
            "Cannot collate samples with differing shapes",
        ));
    }
    let views: Vec<_> = samples.iter().map(|s| s.features.view()).collect();
    ndarray::stack(Axis(0), &views)
        .map_err(|e| GraylingError::invalid_data(format!("Failed to stack batch: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::pileup::ReadObservation;
    use ndarray::Array2;

    fn obs(reverse: bool, base: Option<u8>, insertion: &[u8]) -> ReadObservation {
        ReadObservation {
            reverse,
            base,
            insertion: insertion.to_vec(),
        }
    }

    fn column(major: i64, reads: Vec<ReadObservation>) -> PileupColumn {
        PileupColumn { major, reads }
    }

    #[test]
    fn test_counts_normalized_by_depth() {
        let col = column(
            7,
            vec![
                obs(false, Some(b'A'), &[]),
                obs(false, Some(b'A'), &[]),
                obs(true, Some(b'C'), &[]),
                obs(true, None, &[]),
            ],
        );
        let sample = build_sample(&[col], COUNTS_FEATURE_DIM, 0, CountsEncoder::featurize);
        assert_eq!(sample.len(), 1);
        assert_eq!(sample.positions_major, vec![7]);
        assert_eq!(sample.positions_minor, vec![0]);
        assert_eq!(sample.depth[0], 4.0);
        assert_eq!(sample.features[[0, 0]], 0.5); // A forward
        assert_eq!(sample.features[[0, 6]], 0.25); // C reverse
        assert_eq!(sample.features[[0, 9]], 0.25); // del reverse
    }

    #[test]
    fn test_insertion_columns_materialized() {
        let col = column(
            3,
            vec![
                obs(false, Some(b'A'), b"TT"),
                obs(false, Some(b'A'), &[]),
            ],
        );
        let sample = build_sample(&[col], COUNTS_FEATURE_DIM, 0, CountsEncoder::featurize);
        assert_eq!(sample.positions_major, vec![3, 3, 3]);
        assert_eq!(sample.positions_minor, vec![0, 1, 2]);
        // Rank 1: one T forward, one implied deletion.
        assert_eq!(sample.features[[1, 3]], 0.5);
        assert_eq!(sample.features[[1, 4]], 0.5);
        assert!(sample.is_consistent());
    }

    #[test]
    fn test_uncovered_columns_absent() {
        let cols = vec![
            column(10, vec![obs(false, Some(b'G'), &[])]),
            column(14, vec![obs(false, Some(b'G'), &[])]),
        ];
        let sample = build_sample(&cols, COUNTS_FEATURE_DIM, 0, CountsEncoder::featurize);
        assert_eq!(sample.positions_major, vec![10, 14]);
    }

    #[test]
    fn test_read_alignment_slots() {
        let col = column(
            0,
            vec![obs(false, Some(b'A'), &[]), obs(true, Some(b'T'), &[])],
        );
        let sample = build_sample(&[col], 8, 0, |c, m| {
            ReadAlignmentEncoder::featurize(c, m, 4)
        });
        assert_eq!(sample.features[[0, 0]], 0.2); // A
        assert_eq!(sample.features[[0, 1]], 1.0); // forward
        assert_eq!(sample.features[[0, 2]], 0.8); // T
        assert_eq!(sample.features[[0, 3]], -1.0); // reverse
        assert_eq!(sample.features[[0, 4]], 0.0); // empty slot
    }

    #[test]
    fn test_collate_stacks_uniform_samples() {
        let make = |rows: usize, fill: f32| {
            Sample::new(
                Array2::from_elem((rows, 3), fill),
                (0..rows as i64).collect(),
                vec![0; rows],
                Array1::zeros(rows),
                0,
                0,
            )
        };
        let a = make(4, 1.0);
        let b = make(4, 2.0);
        let batch = collate(&[&a, &b]).unwrap();
        assert_eq!(batch.dim(), (2, 4, 3));
        assert_eq!(batch[[1, 0, 0]], 2.0);

        let c = make(5, 3.0);
        assert!(collate(&[&a, &c]).is_err());
        assert!(collate(&[]).is_err());
    }
}
