//! # Stitching
//!
//! Reassembles trimmed per-sample predictions into one consensus per
//! contig. Draft ranges no sample covers are copied in verbatim with a
//! placeholder quality, and the final sequence is compacted by dropping
//! the deletion placeholders.

use crate::data::consensus::{remove_deletions, ConsensusResult, FILL_QUAL};
use crate::data::Sample;
use crate::error::{GraylingError, Result};
use crate::pipelines::trim::TrimInfo;

/// One sample's contribution to a contig, in stitch order.
pub struct StitchEntry<'a> {
    pub sample: &'a Sample,
    pub trim: &'a TrimInfo,
    pub result: &'a ConsensusResult,
}

/// Stitch the contributions of one contig over the draft range
/// `[range_start, range_end)`.
///
/// Entries must be sorted by draft start. Empty predictions and discarded
/// trims are skipped; contributions already fully covered by earlier ones
/// are dropped. A contig with no usable contribution yields the draft
/// range verbatim with placeholder quality.
pub fn stitch_sequence(
    draft: &[u8],
    range_start: i64,
    range_end: i64,
    entries: &[StitchEntry<'_>],
    draft_id: i32,
) -> Result<ConsensusResult> {
    let range_end = range_end.min(draft.len() as i64);
    let mut seq = Vec::with_capacity((range_end - range_start).max(0) as usize);
    let mut quals = Vec::with_capacity(seq.capacity());

    // Inclusive position already written; starting just before the range
    // makes the first gap fill include the range start.
    let mut last_end = range_start - 1;
    for entry in entries {
        if entry.result.is_empty() || entry.trim.is_discarded() {
            continue;
        }
        let trim_start = entry.trim.start as usize;
        let trim_end = entry.trim.end as usize;
        if trim_end > entry.sample.len() || entry.result.seq.len() != entry.sample.len() {
            return Err(GraylingError::invalid_data(format!(
                "Trim [{}, {}) does not fit a prediction of {} rows",
                trim_start,
                trim_end,
                entry.result.seq.len()
            )));
        }

        let start_pos = entry.sample.positions_major[trim_start];
        let end_pos = *entry
            .sample
            .positions_major
            .last()
            .expect("non-empty sample");
        if end_pos <= last_end {
            // Entirely inside what has been written already (e.g. a
            // contained sample); drop it.
            continue;
        }
        if start_pos > last_end + 1 {
            // Coverage gap: fill from the draft.
            seq.extend_from_slice(&draft[(last_end + 1) as usize..start_pos as usize]);
            quals.resize(seq.len(), FILL_QUAL);
        }

        seq.extend_from_slice(&entry.result.seq.as_bytes()[trim_start..trim_end]);
        quals.extend_from_slice(&entry.result.quals.as_bytes()[trim_start..trim_end]);
        last_end = end_pos;
    }

    if last_end + 1 < range_end {
        seq.extend_from_slice(&draft[(last_end + 1) as usize..range_end as usize]);
        quals.resize(seq.len(), FILL_QUAL);
    }

    let mut result = ConsensusResult::new(
        String::from_utf8(seq)
            .map_err(|_| GraylingError::invalid_data("Non-ASCII bytes in stitched consensus"))?,
        String::from_utf8(quals)
            .map_err(|_| GraylingError::invalid_data("Non-ASCII bytes in stitched qualities"))?,
        draft_id,
        range_start,
    );
    remove_deletions(&mut result);
    Ok(result)
}
