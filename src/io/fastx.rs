//! # Draft Sequence Access
//!
//! Random access to the draft FASTA/FASTQ through its `.fai` index. The
//! index is created on open when missing; contig names and lengths come
//! from the index file, in draft order.

use rust_htslib::faidx;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{GraylingError, Result};

/// Indexed access to the draft sequences.
pub struct DraftReader {
    reader: faidx::Reader,
    lens: Vec<(String, i64)>,
}

impl DraftReader {
    /// Open a draft file, creating the `.fai` index if it does not exist.
    pub fn open(path: &Path) -> Result<Self> {
        let fai_path = fai_path_for(path);
        if !fai_path.exists() {
            info!("Creating index for '{}'", path.display());
        }
        // Opening through htslib builds the .fai when it is missing.
        let reader = faidx::Reader::from_path(path).map_err(|e| {
            GraylingError::format(format!(
                "Failed to open or index draft '{}': {e}",
                path.display()
            ))
        })?;
        let lens = read_sequence_lengths(&fai_path)?;
        if lens.is_empty() {
            return Err(GraylingError::format(format!(
                "Draft index '{}' lists no sequences",
                fai_path.display()
            )));
        }
        Ok(Self { reader, lens })
    }

    /// Contig names and lengths, in draft order.
    pub fn sequence_lengths(&self) -> &[(String, i64)] {
        &self.lens
    }

    /// Fetch draft bytes for `[start, end)` of a contig.
    pub fn fetch(&self, name: &str, start: i64, end: i64) -> Result<Vec<u8>> {
        if end <= start {
            return Err(GraylingError::invalid_data(format!(
                "Cannot fetch empty range {start}..{end} of '{name}'"
            )));
        }
        // htslib takes a 0-based inclusive end.
        let seq = self
            .reader
            .fetch_seq(name, start as usize, (end - 1) as usize)?;
        if seq.len() as i64 != end - start {
            return Err(GraylingError::format(format!(
                "Fetched {} bases of '{name}' where {} were requested",
                seq.len(),
                end - start
            )));
        }
        Ok(seq.to_vec())
    }

    /// Fetch a whole contig.
    pub fn fetch_all(&self, name: &str) -> Result<Vec<u8>> {
        let len = self
            .lens
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, len)| *len)
            .ok_or_else(|| {
                GraylingError::invalid_data(format!("Contig '{name}' not found in the draft"))
            })?;
        self.fetch(name, 0, len)
    }
}

fn fai_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(".fai");
    PathBuf::from(os)
}

/// Parse name and length columns of a `.fai` index.
fn read_sequence_lengths(fai_path: &Path) -> Result<Vec<(String, i64)>> {
    let text = std::fs::read_to_string(fai_path)?;
    let mut lens = Vec::new();
    for (i, line) in text.lines().enumerate() {
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split('\t');
        let name = fields.next().unwrap_or_default();
        let len: i64 = fields
            .next()
            .and_then(|f| f.parse().ok())
            .ok_or_else(|| {
                GraylingError::format(format!(
                    "Malformed index line {} in '{}'",
                    i + 1,
                    fai_path.display()
                ))
            })?;
        lens.push((name.to_string(), len));
    }
    Ok(lens)
}
