//! # Window Planning
//!
//! Deterministic decomposition of draft contigs into units of work.
//!
//! Two levels of windowing are used:
//! 1. *BAM regions*: long overlapping chunks of a contig. The overlap gives
//!    the pileup encoder context at the seams; the `*_no_overlap` range of
//!    each region tiles the contig exactly and decides ownership of every
//!    draft position during stitching.
//! 2. *Sub-windows*: each BAM region is split again into short
//!    non-overlapping pieces for parallel encoding. Sub-windows carry their
//!    parent's `region_id` and ownership range.

use crate::error::{GraylingError, Result};

/// A half-open range of indices into a vector, used to batch drafts and to
/// map sub-windows back to their BAM region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Interval {
    pub start: usize,
    pub end: usize,
}

impl Interval {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// A range of a draft contig delivered to the pipeline as a unit of work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Window {
    /// Contig index into the draft length table.
    pub seq_id: i32,
    /// Full length of the contig.
    pub seq_length: i64,
    /// Window range, half-open draft coordinates.
    pub start: i64,
    pub end: i64,
    /// Parent BAM region identity; -1 for the BAM regions themselves.
    pub region_id: i32,
    /// The sub-range this window is solely responsible for once overlaps
    /// are resolved. Ownership ranges tile each contig exactly.
    pub start_no_overlap: i64,
    pub end_no_overlap: i64,
}

/// An explicit region restriction, parsed from an htslib-style string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionSpec {
    pub name: String,
    /// 0-based inclusive start, or None for the contig start.
    pub start: Option<i64>,
    /// 0-based exclusive end, or None for the contig end.
    pub end: Option<i64>,
}

impl RegionSpec {
    /// Parse `name`, `name:start-end`, or `name:start` (1-based, inclusive
    /// end on the wire; converted to 0-based half-open here).
    pub fn parse(region: &str) -> Result<Self> {
        let Some((name, range)) = region.split_once(':') else {
            return Ok(Self {
                name: region.to_string(),
                start: None,
                end: None,
            });
        };
        if name.is_empty() {
            return Err(GraylingError::config(format!(
                "Region '{region}' has an empty contig name"
            )));
        }
        if range.is_empty() {
            return Ok(Self {
                name: name.to_string(),
                start: None,
                end: None,
            });
        }
        let (start_str, end_str) = match range.split_once('-') {
            Some((s, e)) => (s, e),
            None => (range, ""),
        };
        let parse_coord = |text: &str| -> Result<Option<i64>> {
            if text.is_empty() {
                return Ok(None);
            }
            let value: i64 = text.replace(',', "").parse().map_err(|_| {
                GraylingError::config(format!("Cannot parse region coordinate '{text}'"))
            })?;
            Ok(Some(value))
        };
        let start = parse_coord(start_str)?.map(|v| v - 1);
        let end = parse_coord(end_str)?;
        if let (Some(s), Some(e)) = (start, end) {
            if s < 0 || e <= s {
                return Err(GraylingError::config(format!(
                    "Region '{region}' has an empty or negative range"
                )));
            }
        }
        Ok(Self {
            name: name.to_string(),
            start,
            end,
        })
    }
}

/// Linearly split `[seq_start, seq_end)` into windows of `window_len`
/// stepped by `window_len - window_overlap` and clamped at `seq_end`.
///
/// The first window owns from its own start; every later window owns from
/// `start + window_overlap`, so ownership ranges tile the input range.
pub fn create_windows(
    seq_id: i32,
    seq_start: i64,
    seq_end: i64,
    seq_len: i64,
    window_len: i64,
    window_overlap: i64,
    region_id: i32,
) -> Result<Vec<Window>> {
    if window_overlap < 0 || window_overlap >= window_len {
        return Err(GraylingError::config(format!(
            "Window overlap must be in [0, window_len). window_len = {window_len}, \
             window_overlap = {window_overlap}"
        )));
    }

    let mut windows = Vec::new();
    let step = window_len - window_overlap;
    let mut start = seq_start;
    while start < seq_end {
        let end = seq_end.min(start + window_len);
        let start_no_overlap = if start == seq_start {
            start
        } else {
            seq_end.min(start + window_overlap)
        };
        windows.push(Window {
            seq_id,
            seq_length: seq_len,
            start,
            end,
            region_id,
            start_no_overlap,
            end_no_overlap: end,
        });
        if end == seq_end {
            break;
        }
        start += step;
    }
    Ok(windows)
}

/// Create the BAM regions for a batch of draft contigs, or for one explicit
/// region restriction.
///
/// Windows are emitted in `(seq_id, start)` order. Every draft position is
/// covered by at least one region, and owned by exactly one.
pub fn plan_bam_regions(
    draft_lens: &[(String, i64)],
    bam_chunk_len: i64,
    window_overlap: i64,
    region: Option<&RegionSpec>,
) -> Result<Vec<Window>> {
    match region {
        None => {
            let mut windows = Vec::new();
            for (seq_id, (_, len)) in draft_lens.iter().enumerate() {
                windows.extend(create_windows(
                    seq_id as i32,
                    0,
                    *len,
                    *len,
                    bam_chunk_len,
                    window_overlap,
                    -1,
                )?);
            }
            Ok(windows)
        }
        Some(spec) => {
            let seq_id = draft_lens
                .iter()
                .position(|(name, _)| *name == spec.name)
                .ok_or_else(|| {
                    GraylingError::invalid_data(format!(
                        "Region contig '{}' not found in the draft input",
                        spec.name
                    ))
                })?;
            let seq_len = draft_lens[seq_id].1;
            let start = spec.start.unwrap_or(0).max(0);
            let end = spec.end.unwrap_or(seq_len).min(seq_len);
            if end <= start {
                return Err(GraylingError::config(format!(
                    "Region '{}:{}-{}' is empty after clamping to the contig",
                    spec.name,
                    start + 1,
                    end
                )));
            }
            create_windows(
                seq_id as i32,
                start,
                end,
                seq_len,
                bam_chunk_len,
                window_overlap,
                -1,
            )
        }
    }
}

/// Split each BAM region into non-overlapping sub-windows for parallel
/// encoding. Returns the sub-windows plus, per BAM region, the interval of
/// sub-window indices belonging to it.
///
/// Sub-windows inherit the parent's ownership range; the trim resolver
/// later restricts every sample of a region to that range.
pub fn split_into_subwindows(
    bam_regions: &[Window],
    sub_window_len: i64,
) -> Result<(Vec<Window>, Vec<Interval>)> {
    let mut windows = Vec::new();
    let mut intervals = Vec::with_capacity(bam_regions.len());
    for (region_id, region) in bam_regions.iter().enumerate() {
        let mut sub = create_windows(
            region.seq_id,
            region.start,
            region.end,
            region.seq_length,
            sub_window_len,
            0,
            region_id as i32,
        )?;
        for w in &mut sub {
            w.start_no_overlap = region.start_no_overlap;
            w.end_no_overlap = region.end_no_overlap;
        }
        let first = windows.len();
        windows.extend(sub);
        intervals.push(Interval {
            start: first,
            end: windows.len(),
        });
    }
    Ok((windows, intervals))
}
