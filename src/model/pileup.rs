//! # Pileup Collection
//!
//! Walks aligned records over a draft window and gathers, per draft
//! position, what every spanning read observes there: a base, a deletion,
//! and any bases inserted immediately after. The feature encoders turn
//! these observations into tensors.
//!
//! Positions with no spanning reads produce no column at all; the refiner
//! detects the resulting coordinate gaps downstream.

use rust_htslib::bam::record::Cigar;
use rust_htslib::bam::{self, Read};

use crate::error::Result;

/// What one read observes at one draft position.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadObservation {
    /// Read aligns to the reverse strand.
    pub reverse: bool,
    /// Base at the position (ASCII), or None when the read has a deletion.
    pub base: Option<u8>,
    /// Bases inserted in the read immediately after this position.
    pub insertion: Vec<u8>,
}

/// All observations at one draft position.
#[derive(Clone, Debug, Default)]
pub struct PileupColumn {
    pub major: i64,
    pub reads: Vec<ReadObservation>,
}

impl PileupColumn {
    /// Longest insertion any spanning read carries after this position.
    pub fn max_insertion(&self) -> usize {
        self.reads.iter().map(|r| r.insertion.len()).max().unwrap_or(0)
    }
}

/// Walk one record's CIGAR and emit `(position, observation)` pairs for
/// every draft position in `[start, end)` the alignment spans.
pub fn record_observations(
    record: &bam::Record,
    start: i64,
    end: i64,
) -> Vec<(i64, ReadObservation)> {
    let reverse = record.is_reverse();
    let seq = record.seq();
    let mut out: Vec<(i64, ReadObservation)> = Vec::new();
    let mut ref_pos = record.pos();
    let mut read_pos = 0usize;

    for op in record.cigar().iter() {
        match *op {
            Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) => {
                for i in 0..len as i64 {
                    let p = ref_pos + i;
                    if p >= start && p < end {
                        out.push((
                            p,
                            ReadObservation {
                                reverse,
                                base: Some(seq[read_pos + i as usize]),
                                insertion: Vec::new(),
                            },
                        ));
                    }
                }
                ref_pos += len as i64;
                read_pos += len as usize;
            }
            Cigar::Ins(len) => {
                // Inserted bases hang off the preceding draft position.
                if let Some((p, obs)) = out.last_mut() {
                    if *p == ref_pos - 1 {
                        obs.insertion =
                            (0..len as usize).map(|i| seq[read_pos + i]).collect();
                    }
                }
                read_pos += len as usize;
            }
            Cigar::Del(len) => {
                for i in 0..len as i64 {
                    let p = ref_pos + i;
                    if p >= start && p < end {
                        out.push((
                            p,
                            ReadObservation {
                                reverse,
                                base: None,
                                insertion: Vec::new(),
                            },
                        ));
                    }
                }
                ref_pos += len as i64;
            }
            Cigar::RefSkip(len) => {
                ref_pos += len as i64;
            }
            Cigar::SoftClip(len) => {
                read_pos += len as usize;
            }
            Cigar::HardClip(_) | Cigar::Pad(_) => {}
        }
    }
    out
}

/// Fetch `[start, end)` of contig `tid` and assemble pileup columns from
/// every primary alignment passing the mapping-quality filter. Columns are
/// returned in position order; uncovered positions are absent.
pub fn collect_pileup(
    bam: &mut bam::IndexedReader,
    tid: u32,
    start: i64,
    end: i64,
    min_mapq: u8,
) -> Result<Vec<PileupColumn>> {
    bam.fetch((tid, start, end))?;

    let mut slots: Vec<Vec<ReadObservation>> = vec![Vec::new(); (end - start).max(0) as usize];
    for result in bam.records() {
        let record = result?;
        if record.is_unmapped()
            || record.is_secondary()
            || record.is_supplementary()
            || record.is_duplicate()
            || record.is_quality_check_failed()
            || record.mapq() < min_mapq
        {
            continue;
        }
        for (p, obs) in record_observations(&record, start, end) {
            slots[(p - start) as usize].push(obs);
        }
    }

    Ok(slots
        .into_iter()
        .enumerate()
        .filter(|(_, reads)| !reads.is_empty())
        .map(|(i, reads)| PileupColumn {
            major: start + i as i64,
            reads,
        })
        .collect())
}
