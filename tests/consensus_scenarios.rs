//! End-to-end scenarios over the refine -> trim -> stitch path, driven with
//! synthetic samples and a predictor that echoes the draft. The echo setup
//! makes expected outputs exact: draft-aligned columns predict the draft
//! base, insertion columns predict a deletion, so a full round trip must
//! reproduce the draft byte for byte.

use ndarray::{Array1, Array2};

use grayling::data::consensus::ConsensusResult;
use grayling::data::Sample;
use grayling::pipelines::refine::refine_region_samples;
use grayling::pipelines::stitch::{stitch_sequence, StitchEntry};
use grayling::pipelines::trim::{trim_samples, RegionRestriction, TrimInfo};

fn draft_of_len(len: usize) -> Vec<u8> {
    (0..len).map(|i| b"ACGT"[(i * 7 + i / 5) % 4]).collect()
}

fn make_sample(majors: Vec<i64>, minors: Vec<i64>, seq_id: i32, region_id: i32) -> Sample {
    let n = majors.len();
    Sample::new(
        Array2::zeros((n, 10)),
        majors,
        minors,
        Array1::ones(n),
        seq_id,
        region_id,
    )
}

fn flat_sample(start: i64, end: i64) -> Sample {
    make_sample(
        (start..end).collect(),
        vec![0; (end - start) as usize],
        0,
        0,
    )
}

/// The echo predictor: draft base at draft-aligned columns, a deletion at
/// insertion columns.
fn echo_prediction(sample: &Sample, draft: &[u8]) -> ConsensusResult {
    let seq: String = sample
        .positions_major
        .iter()
        .zip(&sample.positions_minor)
        .map(|(&major, &minor)| {
            if minor == 0 {
                draft[major as usize] as char
            } else {
                '*'
            }
        })
        .collect();
    let quals = "I".repeat(sample.len());
    ConsensusResult::new(seq, quals, sample.seq_id, sample.start())
}

/// Trim, echo-predict, and stitch a sorted sample list.
fn run_to_consensus(
    draft: &[u8],
    samples: &[Sample],
    region: Option<&RegionRestriction>,
) -> (ConsensusResult, Vec<TrimInfo>, usize) {
    let (trims, heuristic) = trim_samples(samples, region, 3).unwrap();
    let predictions: Vec<ConsensusResult> =
        samples.iter().map(|s| echo_prediction(s, draft)).collect();
    let entries: Vec<StitchEntry<'_>> = samples
        .iter()
        .zip(&trims)
        .zip(&predictions)
        .map(|((sample, trim), result)| StitchEntry {
            sample,
            trim,
            result,
        })
        .collect();
    let (range_start, range_end) = match region {
        Some(r) => (r.start, r.end),
        None => (0, draft.len() as i64),
    };
    let consensus = stitch_sequence(draft, range_start, range_end, &entries, 0).unwrap();
    (consensus, trims, heuristic)
}

// S1: a window with no coverage emits the draft with placeholder quality.
#[test]
fn scenario_empty_region_emits_draft() {
    let draft = draft_of_len(1000);
    let consensus = stitch_sequence(&draft, 0, 1000, &[], 0).unwrap();
    assert_eq!(consensus.seq.as_bytes(), &draft[..]);
    assert_eq!(consensus.quals, "!".repeat(1000));
}

// S2: one perfect window reproduces the draft with no gap characters.
#[test]
fn scenario_single_perfect_window() {
    let draft = draft_of_len(50);
    let samples = vec![flat_sample(0, 50)];
    let (consensus, trims, heuristic) = run_to_consensus(&draft, &samples, None);
    assert_eq!(heuristic, 0);
    assert_eq!(trims[0], TrimInfo {
        start: 0,
        end: 50,
        heuristic: false,
        is_last_in_contig: true,
    });
    assert_eq!(consensus.seq.as_bytes(), &draft[..]);
    assert!(!consensus.seq.contains('*'));
    assert_eq!(consensus.seq.len(), consensus.quals.len());
}

// S3: deletion classes are compacted out of sequence and qualities.
#[test]
fn scenario_deletions_compact() {
    let draft = b"AACCGG";
    let sample = flat_sample(0, 6);
    let trims = vec![TrimInfo {
        start: 0,
        end: 6,
        heuristic: false,
        is_last_in_contig: true,
    }];
    let prediction = ConsensusResult::new("AC*GT*".into(), "!!!!!!".into(), 0, 0);
    let entries = [StitchEntry {
        sample: &sample,
        trim: &trims[0],
        result: &prediction,
    }];
    let consensus = stitch_sequence(draft, 0, 6, &entries, 0).unwrap();
    assert_eq!(consensus.seq, "ACGT");
    assert_eq!(consensus.quals, "!!!!");
}

// S4: two overlapping windows cut at the overlap midpoint.
#[test]
fn scenario_overlap_midpoint_cut() {
    let draft = draft_of_len(150);
    let samples = vec![flat_sample(0, 100), flat_sample(50, 150)];
    let (consensus, trims, heuristic) = run_to_consensus(&draft, &samples, None);
    assert_eq!(heuristic, 0);
    assert_eq!(trims[0].end, 75);
    assert_eq!(trims[1].start, 25);
    assert_eq!(consensus.seq.len(), 150);
    assert_eq!(consensus.seq.as_bytes(), &draft[..]);
}

// S5: a coverage gap is filled with draft bytes at placeholder quality.
#[test]
fn scenario_gap_draft_fill() {
    let draft = draft_of_len(100);
    let samples = vec![flat_sample(0, 50), flat_sample(60, 100)];
    let (consensus, trims, _) = run_to_consensus(&draft, &samples, None);
    assert!(trims[0].is_last_in_contig);
    assert_eq!(consensus.seq.len(), 100);
    assert_eq!(consensus.seq.as_bytes(), &draft[..]);
    assert_eq!(&consensus.quals[..50], "I".repeat(50));
    assert_eq!(&consensus.quals[50..60], "!".repeat(10));
    assert_eq!(&consensus.quals[60..], "I".repeat(40));
}

// S6: differing insertion structure in the overlap forces the heuristic
// cut; the result still tiles.
#[test]
fn scenario_heuristic_fallback() {
    let draft = draft_of_len(100);
    let s1 = flat_sample(0, 60);
    // Same contig range, but with an insertion column at position 45.
    let mut majors: Vec<i64> = Vec::new();
    let mut minors: Vec<i64> = Vec::new();
    for m in 40..100 {
        majors.push(m);
        minors.push(0);
        if m == 45 {
            majors.push(m);
            minors.push(1);
        }
    }
    let s2 = make_sample(majors, minors, 0, 0);
    let samples = vec![s1, s2];
    let (consensus, trims, heuristic) = run_to_consensus(&draft, &samples, None);
    assert_eq!(heuristic, 1);
    assert!(trims.iter().any(|t| t.heuristic));
    // The echo predictor marks the insertion column '*', so the compacted
    // output still equals the draft.
    assert_eq!(consensus.seq.as_bytes(), &draft[..]);
}

// S7: a region restriction trims every sample to the region and the
// output covers exactly the restricted range.
#[test]
fn scenario_region_restriction() {
    let draft = draft_of_len(1000);
    let samples = vec![flat_sample(0, 500), flat_sample(450, 1000)];
    let region = RegionRestriction {
        seq_id: 0,
        start: 200,
        end: 800,
    };
    let (consensus, trims, _) = run_to_consensus(&draft, &samples, Some(&region));
    for (sample, trim) in samples.iter().zip(&trims) {
        if trim.is_discarded() {
            continue;
        }
        for i in trim.start as usize..trim.end as usize {
            assert!(sample.positions_major[i] >= 200);
            assert!(sample.positions_major[i] < 800);
        }
    }
    assert_eq!(consensus.seq.len(), 600);
    assert_eq!(consensus.seq.as_bytes(), &draft[200..800]);
}

// Round trip: windowing + refinement + trimming + stitching with an echo
// predictor reproduces the draft byte for byte (invariant 4).
#[test]
fn roundtrip_refine_trim_stitch() {
    let draft = draft_of_len(2000);

    // Overlapping encoder windows, as the planner would emit them.
    let raw: Vec<Sample> = vec![
        flat_sample(0, 700),
        flat_sample(600, 1300),
        flat_sample(1200, 2000),
    ];
    // Refine with a chunk length that forces re-splitting and an anchored
    // tail chunk.
    let refined = refine_region_samples(raw, 256, 32).unwrap();
    assert!(refined.iter().all(|s| s.len() <= 256));

    let mut samples = refined;
    samples.sort_by_key(|s| (s.position(0), -(s.len() as i64)));

    let (consensus, trims, _) = run_to_consensus(&draft, &samples, None);

    // Invariant 2: kept positions are strictly increasing with no
    // duplicates.
    let mut kept = Vec::new();
    for (sample, trim) in samples.iter().zip(&trims) {
        if trim.is_discarded() {
            continue;
        }
        for i in trim.start as usize..trim.end as usize {
            kept.push((sample.positions_major[i], sample.positions_minor[i]));
        }
    }
    assert!(kept.windows(2).all(|w| w[0] < w[1]));

    assert_eq!(consensus.seq.len(), 2000);
    assert_eq!(consensus.seq.as_bytes(), &draft[..]);
    assert_eq!(consensus.seq.len(), consensus.quals.len());
}

// Invariant 6: after trimming, adjacent kept ranges either abut exactly or
// leave a positive-length gap for draft fill.
#[test]
fn trimmed_neighbors_abut_or_gap() {
    let draft = draft_of_len(500);
    let samples = vec![
        flat_sample(0, 200),
        flat_sample(150, 350),
        // A real coverage gap before the last sample.
        flat_sample(400, 500),
    ];
    let (consensus, trims, _) = run_to_consensus(&draft, &samples, None);

    let mut boundaries = Vec::new();
    for (sample, trim) in samples.iter().zip(&trims) {
        if trim.is_discarded() {
            continue;
        }
        boundaries.push((
            sample.positions_major[trim.start as usize],
            sample.positions_major[trim.end as usize - 1],
        ));
    }
    for pair in boundaries.windows(2) {
        let (_, prev_end) = pair[0];
        let (next_start, _) = pair[1];
        assert!(
            next_start == prev_end + 1 || next_start > prev_end + 1,
            "kept ranges overlap: {prev_end} -> {next_start}"
        );
    }
    assert_eq!(consensus.seq.as_bytes(), &draft[..]);
}
