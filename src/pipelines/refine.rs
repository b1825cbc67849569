//! # Sample Refinement
//!
//! Three sequential passes over the sub-window samples of one BAM region:
//!
//! 1. Split every sample wherever consecutive major positions jump by more
//!    than one (a coverage gap).
//! 2. Merge neighbors that are exactly contiguous in draft coordinates and
//!    belong to the same contig and BAM region.
//! 3. Re-split the merged samples into fixed-length row chunks for
//!    inference. Tensors grow with insertions, so chunk boundaries are row
//!    counts, not draft coordinates.

use ndarray::Axis;

use crate::data::Sample;
use crate::error::{GraylingError, Result};

/// Split a sample at every discontinuity in its major positions.
pub fn split_on_discontinuities(sample: Sample) -> Vec<Sample> {
    let gaps: Vec<usize> = sample
        .positions_major
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| pair[1] - pair[0] > 1)
        .map(|(i, _)| i + 1)
        .collect();

    if gaps.is_empty() {
        return vec![sample];
    }

    let mut results = Vec::with_capacity(gaps.len() + 1);
    let mut start = 0;
    for gap in gaps {
        results.push(sample.slice(start, gap));
        start = gap;
    }
    if start < sample.len() {
        results.push(sample.slice(start, sample.len()));
    }
    results
}

/// Concatenate a run of buffered samples. A single-element buffer is moved,
/// never copied.
fn concat_samples(mut buffer: Vec<Sample>) -> Result<Sample> {
    if buffer.len() == 1 {
        return Ok(buffer.pop().expect("non-empty buffer"));
    }
    let n_rows: usize = buffer.iter().map(Sample::len).sum();
    let feature_views: Vec<_> = buffer.iter().map(|s| s.features.view()).collect();
    let features = ndarray::concatenate(Axis(0), &feature_views)
        .map_err(|e| GraylingError::invalid_data(format!("Failed to merge features: {e}")))?;
    let depth_views: Vec<_> = buffer.iter().map(|s| s.depth.view()).collect();
    let depth = ndarray::concatenate(Axis(0), &depth_views)
        .map_err(|e| GraylingError::invalid_data(format!("Failed to merge depth: {e}")))?;

    let mut positions_major = Vec::with_capacity(n_rows);
    let mut positions_minor = Vec::with_capacity(n_rows);
    for s in &buffer {
        positions_major.extend_from_slice(&s.positions_major);
        positions_minor.extend_from_slice(&s.positions_minor);
    }
    let first = &buffer[0];
    Ok(Sample::new(
        features,
        positions_major,
        positions_minor,
        depth,
        first.seq_id,
        first.region_id,
    ))
}

/// Merge neighbors that continue each other without a coordinate gap.
///
/// Two samples merge iff they share `seq_id` and `region_id`, the next one
/// starts exactly at the previous `end()` (half-open), and it starts on a
/// draft-aligned column (`minor == 0`). Tensors are buffered and
/// concatenated lazily.
pub fn merge_adjacent_samples(samples: Vec<Sample>) -> Result<Vec<Sample>> {
    let mut results = Vec::new();
    let mut buffer: Vec<Sample> = Vec::new();
    let mut last_end = -1;

    for sample in samples {
        if sample.is_empty() {
            continue;
        }
        let contiguous = buffer.last().is_some_and(|prev| {
            sample.seq_id == prev.seq_id
                && sample.region_id == prev.region_id
                && sample.start() - last_end == 0
                && sample.positions_minor[0] == 0
        });
        last_end = sample.end();
        if buffer.is_empty() || contiguous {
            buffer.push(sample);
        } else {
            results.push(concat_samples(std::mem::take(&mut buffer))?);
            buffer.push(sample);
        }
    }
    if !buffer.is_empty() {
        results.push(concat_samples(buffer)?);
    }
    Ok(results)
}

/// Split samples into `chunk_len`-row chunks stepping by
/// `chunk_len - chunk_overlap`.
///
/// A short tail is covered by one final chunk anchored at
/// `rows - chunk_len`, producing a possibly large overlap with the previous
/// chunk. Samples already at or below `chunk_len` rows pass through at
/// their natural length; the dispatcher batches those separately.
pub fn split_samples(
    samples: Vec<Sample>,
    chunk_len: usize,
    chunk_overlap: usize,
) -> Result<Vec<Sample>> {
    if chunk_overlap >= chunk_len {
        return Err(GraylingError::config(format!(
            "Chunk overlap must be smaller than the chunk length. chunk_len = {chunk_len}, \
             chunk_overlap = {chunk_overlap}"
        )));
    }

    let step = chunk_len - chunk_overlap;
    let mut results = Vec::with_capacity(samples.len());
    for sample in samples {
        let rows = sample.len();
        if rows <= chunk_len {
            results.push(sample);
            continue;
        }
        let mut end = 0;
        let mut start = 0;
        while start + chunk_len <= rows {
            end = start + chunk_len;
            results.push(sample.slice(start, end));
            start += step;
        }
        if end < rows {
            results.push(sample.slice(rows - chunk_len, rows));
        }
    }
    Ok(results)
}

/// The full refinement of one BAM region's sub-window samples.
pub fn refine_region_samples(
    samples: Vec<Sample>,
    chunk_len: usize,
    chunk_overlap: usize,
) -> Result<Vec<Sample>> {
    let split: Vec<Sample> = samples
        .into_iter()
        .flat_map(split_on_discontinuities)
        .collect();
    let merged = merge_adjacent_samples(split)?;
    split_samples(merged, chunk_len, chunk_overlap)
}
