//! # Overlap Resolution and Trimming
//!
//! Adjacent samples on a contig overlap: BAM regions overlap by design, and
//! the inference re-split duplicates rows at chunk seams. Before stitching,
//! every sample gets a `[start, end)` row range so that the kept ranges
//! tile the contig without duplication.
//!
//! The clean cut requires the overlapping columns of both samples to agree
//! structurally (same insertion ranks); the splice is then the midpoint of
//! the shared range. When chunking has given the two samples different
//! column structures, a heuristic cut searches near the middle of the
//! overlap for a draft position at which both samples carry the same run
//! length of columns. Heuristic cuts are counted so regressions stay
//! visible; a pair with no usable cut at all is marked discarded and the
//! stitcher falls back to draft bases.

use std::fmt;
use tracing::debug;

use crate::data::Sample;
use crate::error::{GraylingError, Result};

/// Pairwise placement of two samples on the draft.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Relationship {
    DifferentContig,
    ForwardOverlap,
    ReverseOverlap,
    ForwardAbutted,
    ReverseAbutted,
    ForwardGapped,
    ReverseGapped,
    BContainedInA,
    AContainedInB,
    Unknown,
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DifferentContig => "DifferentContig",
            Self::ForwardOverlap => "ForwardOverlap",
            Self::ReverseOverlap => "ReverseOverlap",
            Self::ForwardAbutted => "ForwardAbutted",
            Self::ReverseAbutted => "ReverseAbutted",
            Self::ForwardGapped => "ForwardGapped",
            Self::ReverseGapped => "ReverseGapped",
            Self::BContainedInA => "BContainedInA",
            Self::AContainedInB => "AContainedInB",
            Self::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// The row range of a sample that contributes to the consensus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrimInfo {
    /// Half-open row offsets into the sample; both -1 marks a sample that
    /// is discarded entirely.
    pub start: i64,
    pub end: i64,
    /// The cut came from the fallback heuristic.
    pub heuristic: bool,
    /// This sample ends a contiguous piece; the stitcher draft-fills after
    /// it when the next piece does not abut.
    pub is_last_in_contig: bool,
}

impl TrimInfo {
    fn full(sample: &Sample) -> Self {
        Self {
            start: 0,
            end: sample.len() as i64,
            heuristic: false,
            is_last_in_contig: false,
        }
    }

    pub fn is_discarded(&self) -> bool {
        self.start < 0 || self.end < 0
    }
}

/// Restriction of trims to one BAM region's ownership range (and, through
/// window planning, to any user-supplied region).
#[derive(Clone, Copy, Debug)]
pub struct RegionRestriction {
    pub seq_id: i32,
    /// Draft coordinates, half-open.
    pub start: i64,
    pub end: i64,
}

/// Classify the placement of `s2` relative to `s1`.
///
/// The pair is first brought into canonical order: earlier first position,
/// and on ties the longer sample first. `Forward*` means the input order
/// was already canonical.
pub fn relative_position(s1: &Sample, s2: &Sample) -> Relationship {
    if s1.seq_id != s2.seq_id {
        return Relationship::DifferentContig;
    }

    let key = |s: &Sample| (s.position(0), -(s.len() as i64));
    let is_ordered = key(s1) <= key(s2);
    let (a, b) = if is_ordered { (s1, s2) } else { (s2, s1) };

    let (a_end_maj, a_end_min) = a.last_position();
    let (b_start_maj, b_start_min) = b.position(0);

    let contained = b.position(0) >= a.position(0) && b.last_position() <= a.last_position();
    let abuts = (b_start_maj == a_end_maj + 1 && b_start_min == 0)
        || (b_start_maj == a_end_maj && b_start_min == a_end_min + 1);
    let overlaps = b_start_maj < a_end_maj
        || (b_start_maj == a_end_maj && b_start_min < a_end_min + 1);
    let gapped = b_start_maj > a_end_maj + 1
        || (b_start_maj > a_end_maj && b_start_min > 0)
        || (b_start_maj == a_end_maj && b_start_min > a_end_min + 1);

    if contained {
        if is_ordered {
            Relationship::BContainedInA
        } else {
            Relationship::AContainedInB
        }
    } else if abuts {
        if is_ordered {
            Relationship::ForwardAbutted
        } else {
            Relationship::ReverseAbutted
        }
    } else if overlaps {
        if is_ordered {
            Relationship::ForwardOverlap
        } else {
            Relationship::ReverseOverlap
        }
    } else if gapped {
        if is_ordered {
            Relationship::ForwardGapped
        } else {
            Relationship::ReverseGapped
        }
    } else {
        Relationship::Unknown
    }
}

/// Length of the run of equal values starting at `start`.
fn streak_count(values: &[i64], start: usize) -> usize {
    match values.get(start) {
        None => 0,
        Some(&first) => values[start..].iter().take_while(|&&v| v == first).count(),
    }
}

fn count_unique(values: &[i64]) -> i64 {
    let mut count = 0;
    let mut prev = None;
    for &v in values {
        if prev != Some(v) {
            count += 1;
            prev = Some(v);
        }
    }
    count
}

/// Decide the splice between two overlapping samples.
///
/// Returns `(end_of_s1, start_of_s2, heuristic)`. A `(-1, -1, true)` result
/// means no viable junction was found.
pub fn overlap_indices(
    s1: &Sample,
    s2: &Sample,
    min_unique_majors: i64,
) -> Result<(i64, i64, bool)> {
    let rel = relative_position(s1, s2);

    if rel == Relationship::ForwardAbutted {
        return Ok((s1.len() as i64, 0, false));
    }
    if rel != Relationship::ForwardOverlap {
        return Err(GraylingError::invalid_data(format!(
            "Cannot splice samples whose relationship is {rel}"
        )));
    }

    let pair = |s: &Sample, i: usize| (s.positions_major[i], s.positions_minor[i]);
    // Largest index of s1 at or before s2's first position.
    let s2_first = s2.position(0);
    let below = (0..s1.len()).take_while(|&i| pair(s1, i) <= s2_first).count();
    // Smallest index of s2 after s1's last position.
    let s1_last = s1.last_position();
    let ovl_end_2 = (0..s2.len()).take_while(|&i| pair(s2, i) <= s1_last).count();
    if below == 0 {
        return Err(GraylingError::invalid_data(
            "Samples should overlap, but no shared coordinates were found",
        ));
    }
    let ovl_start_1 = below - 1;

    // Clean cut: the overlapping columns must agree on insertion structure.
    let minors_1 = &s1.positions_minor[ovl_start_1..];
    let minors_2 = &s2.positions_minor[..ovl_end_2];
    if minors_1 == minors_2 {
        let overlap_len = ovl_end_2 as i64;
        let pad_1 = overlap_len / 2;
        let pad_2 = overlap_len - pad_1;
        return Ok((ovl_start_1 as i64 + pad_1, ovl_end_2 as i64 - pad_2, false));
    }

    debug!(
        "Overlap columns disagree structurally, falling back to the heuristic cut \
         (s1 {}..{}, s2 {}..{})",
        s1.start(),
        s1.end(),
        s2.start(),
        s2.end()
    );

    // The fallback needs to see enough distinct draft positions on both
    // sides to anchor a cut.
    let unique_1 = count_unique(&s1.positions_major[ovl_start_1..]);
    let unique_2 = count_unique(&s2.positions_major[..ovl_end_2]);
    if unique_1 <= min_unique_majors || unique_2 <= min_unique_majors {
        return Ok((s1.len() as i64, 0, true));
    }

    let start = s1.positions_major[ovl_start_1];
    let end = *s1.positions_major.last().expect("non-empty sample");
    let mid = start + (end - start) / 2;
    let mut offset = 1;
    while mid + offset <= end || mid - offset >= start {
        for target in [mid + offset, mid - offset] {
            let left = s1.positions_major.partition_point(|&m| m < target);
            let right = s2.positions_major.partition_point(|&m| m < target);
            if left == s1.len() || right == s2.len() {
                continue;
            }
            let left_streak = streak_count(&s1.positions_major, left);
            let right_streak = streak_count(&s2.positions_major, right);
            if left_streak == right_streak {
                return Ok((left as i64, right as i64, true));
            }
        }
        offset += 1;
    }

    // No junction with matching structure anywhere near the middle.
    Ok((-1, -1, true))
}

/// Compute one `TrimInfo` per sample so that the kept row ranges tile the
/// contig. `samples` must be sorted by start position. Returns the trims
/// and the number of heuristic cuts taken.
pub fn trim_samples(
    samples: &[Sample],
    region: Option<&RegionRestriction>,
    min_unique_majors: i64,
) -> Result<(Vec<TrimInfo>, usize)> {
    let mut trims: Vec<TrimInfo> = samples.iter().map(TrimInfo::full).collect();
    if samples.is_empty() {
        return Ok((trims, 0));
    }

    let mut num_heuristic = 0;
    let mut idx_prev = 0;
    for i in 1..samples.len() {
        let s1 = &samples[idx_prev];
        let s2 = &samples[i];
        let mut heuristic = false;

        match relative_position(s1, s2) {
            Relationship::BContainedInA => {
                // The contained sample keeps its full range; the stitcher
                // sees it is already covered and drops it.
                continue;
            }
            Relationship::ForwardAbutted => {}
            Relationship::ForwardGapped => {
                trims[idx_prev].is_last_in_contig = true;
            }
            Relationship::DifferentContig => {}
            _ => {
                let (end_1, start_2, h) = overlap_indices(s1, s2, min_unique_majors)?;
                trims[idx_prev].end = end_1;
                trims[i].start = start_2;
                if h {
                    trims[idx_prev].heuristic = true;
                    trims[i].heuristic = true;
                }
                heuristic = h;
            }
        }

        if heuristic {
            num_heuristic += 1;
        }
        idx_prev = i;
    }

    let last = trims.last_mut().expect("non-empty trims");
    last.end = samples.last().expect("non-empty samples").len() as i64;
    last.is_last_in_contig = true;

    if let Some(region) = region {
        restrict_to_region(samples, &mut trims, region);
    }

    Ok((trims, num_heuristic))
}

/// Clip every trim to the rows whose major positions fall inside the
/// region. Samples left without rows are discarded.
fn restrict_to_region(samples: &[Sample], trims: &mut [TrimInfo], region: &RegionRestriction) {
    for (sample, trim) in samples.iter().zip(trims.iter_mut()) {
        if trim.is_discarded() {
            continue;
        }
        if sample.seq_id != region.seq_id {
            trim.start = -1;
            trim.end = -1;
            continue;
        }
        let first_inside = sample.positions_major.partition_point(|&m| m < region.start) as i64;
        let first_beyond = sample.positions_major.partition_point(|&m| m < region.end) as i64;
        trim.start = trim.start.max(first_inside);
        trim.end = trim.end.min(first_beyond);
        if trim.start >= trim.end {
            trim.start = -1;
            trim.end = -1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn make_sample(majors: Vec<i64>, minors: Vec<i64>, seq_id: i32) -> Sample {
        let n = majors.len();
        Sample::new(
            Array2::zeros((n, 2)),
            majors,
            minors,
            Array1::ones(n),
            seq_id,
            0,
        )
    }

    fn flat(start: i64, end: i64, seq_id: i32) -> Sample {
        make_sample((start..end).collect(), vec![0; (end - start) as usize], seq_id)
    }

    #[test]
    fn test_relationships() {
        let a = flat(0, 100, 0);
        assert_eq!(
            relative_position(&a, &flat(0, 50, 1)),
            Relationship::DifferentContig
        );
        assert_eq!(
            relative_position(&a, &flat(10, 60, 0)),
            Relationship::BContainedInA
        );
        assert_eq!(
            relative_position(&flat(10, 60, 0), &a),
            Relationship::AContainedInB
        );
        assert_eq!(
            relative_position(&a, &flat(100, 150, 0)),
            Relationship::ForwardAbutted
        );
        assert_eq!(
            relative_position(&flat(100, 150, 0), &a),
            Relationship::ReverseAbutted
        );
        assert_eq!(
            relative_position(&a, &flat(50, 150, 0)),
            Relationship::ForwardOverlap
        );
        assert_eq!(
            relative_position(&flat(50, 150, 0), &a),
            Relationship::ReverseOverlap
        );
        assert_eq!(
            relative_position(&a, &flat(150, 200, 0)),
            Relationship::ForwardGapped
        );
        assert_eq!(
            relative_position(&flat(150, 200, 0), &a),
            Relationship::ReverseGapped
        );
    }

    #[test]
    fn test_minor_abutment() {
        // a ends at (99, 1); b starting at (99, 2) abuts, (100, 0) abuts too.
        let mut majors: Vec<i64> = (0..100).collect();
        majors.push(99);
        let mut minors = vec![0i64; 100];
        minors.push(1);
        let a = make_sample(majors, minors, 0);
        let b = make_sample(vec![99, 100], vec![2, 0], 0);
        assert_eq!(relative_position(&a, &b), Relationship::ForwardAbutted);
    }

    #[test]
    fn test_midpoint_cut() {
        // s1 covers 0..=99, s2 covers 50..=149, all draft-aligned.
        let s1 = flat(0, 100, 0);
        let s2 = flat(50, 150, 0);
        let (end_1, start_2, heuristic) = overlap_indices(&s1, &s2, 3).unwrap();
        assert!(!heuristic);
        assert_eq!(end_1, 75);
        assert_eq!(start_2, 25);
        // The kept halves tile: s1 rows [0, 75) end at major 74, s2 rows
        // [25, 100) start at major 75.
        assert_eq!(s1.positions_major[end_1 as usize - 1], 74);
        assert_eq!(s2.positions_major[start_2 as usize], 75);
    }

    #[test]
    fn test_abutted_pair_keeps_everything() {
        let s1 = flat(0, 100, 0);
        let s2 = flat(100, 200, 0);
        let (end_1, start_2, heuristic) = overlap_indices(&s1, &s2, 3).unwrap();
        assert_eq!((end_1, start_2, heuristic), (100, 0, false));
    }

    #[test]
    fn test_gapped_pair_cannot_be_spliced() {
        let s1 = flat(0, 100, 0);
        let s2 = flat(150, 200, 0);
        assert!(overlap_indices(&s1, &s2, 3).is_err());
    }

    /// Insert an extra minor column after `major` in an otherwise flat run.
    fn with_insertion(start: i64, end: i64, ins_after: i64, seq_id: i32) -> Sample {
        let mut majors = Vec::new();
        let mut minors = Vec::new();
        for m in start..end {
            majors.push(m);
            minors.push(0);
            if m == ins_after {
                majors.push(m);
                minors.push(1);
            }
        }
        make_sample(majors, minors, seq_id)
    }

    #[test]
    fn test_heuristic_cut_on_structural_mismatch() {
        // s1 and s2 overlap on majors 40..=59, but s2 carries an insertion
        // at 45 that s1 never saw.
        let s1 = flat(0, 60, 0);
        let s2 = with_insertion(40, 100, 45, 0);
        let (end_1, start_2, heuristic) = overlap_indices(&s1, &s2, 3).unwrap();
        assert!(heuristic);
        assert!(end_1 >= 0 && start_2 >= 0);
        // The cut must land on the same draft position in both samples.
        assert_eq!(
            s1.positions_major[end_1 as usize],
            s2.positions_major[start_2 as usize]
        );
        // Concatenated kept positions stay strictly increasing.
        let mut kept: Vec<(i64, i64)> = (0..end_1 as usize)
            .map(|i| (s1.positions_major[i], s1.positions_minor[i]))
            .collect();
        kept.extend(
            (start_2 as usize..s2.len()).map(|i| (s2.positions_major[i], s2.positions_minor[i])),
        );
        assert!(kept.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_heuristic_requires_enough_majors() {
        // Structural mismatch over only two distinct majors: keep all of
        // s1, start s2 at zero, flag the heuristic.
        let s1 = flat(0, 60, 0);
        let s2 = with_insertion(58, 120, 58, 0);
        let (end_1, start_2, heuristic) = overlap_indices(&s1, &s2, 3).unwrap();
        assert!(heuristic);
        assert_eq!(end_1, s1.len() as i64);
        assert_eq!(start_2, 0);
    }

    #[test]
    fn test_trim_samples_tiles_contig() {
        let samples = vec![flat(0, 100, 0), flat(50, 150, 0), flat(100, 200, 0)];
        let (trims, heuristic) = trim_samples(&samples, None, 3).unwrap();
        assert_eq!(heuristic, 0);
        assert_eq!(trims[0].start, 0);
        assert!(trims.last().unwrap().is_last_in_contig);
        assert_eq!(trims.last().unwrap().end, 100);

        // Concatenated kept positions are strictly increasing and cover
        // every draft position exactly once.
        let mut kept = Vec::new();
        for (s, t) in samples.iter().zip(&trims) {
            for i in t.start as usize..t.end as usize {
                kept.push((s.positions_major[i], s.positions_minor[i]));
            }
        }
        assert!(kept.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(kept.len(), 200);
        assert_eq!(kept[0], (0, 0));
        assert_eq!(*kept.last().unwrap(), (199, 0));
    }

    #[test]
    fn test_trim_contained_sample_keeps_full_range() {
        let samples = vec![flat(0, 100, 0), flat(10, 60, 0), flat(90, 150, 0)];
        let (trims, _) = trim_samples(&samples, None, 3).unwrap();
        // The contained sample is untouched; the stitcher drops it later.
        assert_eq!(trims[1].start, 0);
        assert_eq!(trims[1].end, 50);
        // The pair (0, 2) still resolved around the container.
        assert!(trims[0].end > 0);
        assert_eq!(
            samples[0].positions_major[trims[0].end as usize - 1] + 1,
            samples[2].positions_major[trims[2].start as usize]
        );
    }

    #[test]
    fn test_trim_gap_marks_piece_end() {
        let samples = vec![flat(0, 50, 0), flat(60, 100, 0)];
        let (trims, _) = trim_samples(&samples, None, 3).unwrap();
        assert!(trims[0].is_last_in_contig);
        assert_eq!(trims[1].start, 0);
        assert!(trims[1].is_last_in_contig);
    }

    #[test]
    fn test_region_restriction() {
        let samples = vec![flat(0, 500, 0), flat(450, 1000, 0)];
        let region = RegionRestriction {
            seq_id: 0,
            start: 200,
            end: 800,
        };
        let (trims, _) = trim_samples(&samples, Some(&region), 3).unwrap();
        let mut kept = Vec::new();
        for (s, t) in samples.iter().zip(&trims) {
            if t.is_discarded() {
                continue;
            }
            for i in t.start as usize..t.end as usize {
                kept.push(s.positions_major[i]);
            }
        }
        assert_eq!(kept.len(), 600);
        assert_eq!(*kept.first().unwrap(), 200);
        assert_eq!(*kept.last().unwrap(), 799);
    }

    #[test]
    fn test_region_restriction_discards_outside_samples() {
        let samples = vec![flat(0, 100, 0), flat(100, 200, 0)];
        let region = RegionRestriction {
            seq_id: 0,
            start: 120,
            end: 180,
        };
        let (trims, _) = trim_samples(&samples, Some(&region), 3).unwrap();
        assert!(trims[0].is_discarded());
        assert!(!trims[1].is_discarded());
        assert_eq!(trims[1].start, 20);
        assert_eq!(trims[1].end, 80);
    }

    #[test]
    fn test_region_restriction_other_contig_discarded() {
        let samples = vec![flat(0, 100, 1)];
        let region = RegionRestriction {
            seq_id: 0,
            start: 0,
            end: 100,
        };
        let (trims, _) = trim_samples(&samples, Some(&region), 3).unwrap();
        assert!(trims[0].is_discarded());
    }
}
