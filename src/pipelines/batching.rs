//! # Batch Formation
//!
//! Two batching levels: draft contigs are grouped into memory-bounded
//! batches that act as barriers, and within a draft batch the refined
//! samples are grouped into inference batches.
//!
//! Only samples with exactly `chunk_len` rows can be stacked into one
//! tensor; everything else is dispatched in batches of one. Recurrent
//! models cannot pad, so oddly-sized remainders never share a batch.

use crate::data::{Interval, Sample};
use crate::pipelines::trim::TrimInfo;

/// A sample travelling through inference, tagged with its index in the
/// draft batch so results can be re-associated in order.
#[derive(Debug)]
pub struct PendingSample {
    pub index: usize,
    pub sample: Sample,
    pub trim: TrimInfo,
}

/// One unit of work for an inference worker.
#[derive(Debug, Default)]
pub struct InferenceBatch {
    pub items: Vec<PendingSample>,
}

/// Group draft contigs into batches of roughly `batch_size` total bases.
/// Every batch holds at least one contig.
pub fn create_draft_batches(draft_lens: &[(String, i64)], batch_size: i64) -> Vec<Interval> {
    let mut batches = Vec::new();
    let mut interval = Interval::default();
    let mut sum = 0;
    for (_, len) in draft_lens {
        sum += len;
        interval.end += 1;
        if sum >= batch_size {
            batches.push(interval);
            interval.start = interval.end;
            sum = 0;
        }
    }
    if interval.end > interval.start {
        batches.push(interval);
    }
    batches
}

/// Partition pending samples into inference batches.
///
/// Samples of exactly `chunk_len` rows form stacked batches of
/// `batch_size` in stream order; all other samples follow in batches of
/// one. Discarded samples are not dispatched at all.
pub fn form_batches(
    pending: Vec<PendingSample>,
    chunk_len: usize,
    batch_size: usize,
) -> Vec<InferenceBatch> {
    let mut batches = Vec::new();
    let mut regular = InferenceBatch::default();
    let mut remainders = Vec::new();

    for item in pending {
        if item.trim.is_discarded() {
            continue;
        }
        if item.sample.len() == chunk_len {
            regular.items.push(item);
            if regular.items.len() == batch_size {
                batches.push(std::mem::take(&mut regular));
            }
        } else {
            remainders.push(item);
        }
    }
    if !regular.items.is_empty() {
        batches.push(regular);
    }
    for item in remainders {
        batches.push(InferenceBatch { items: vec![item] });
    }
    batches
}
