//! # Configuration Logic
//!
//! CLI argument parsing and validation using clap derive.

use clap::Parser;
use std::path::PathBuf;
use tracing::warn;

use crate::error::{GraylingError, Result};

/// Grayling: consensus polishing for draft assemblies
#[derive(Parser, Debug, Clone)]
#[command(name = "grayling")]
#[command(version)]
#[command(about = "Consensus polishing for draft assemblies", long_about = None)]
pub struct Config {
    // ============ Positional Parameters ============
    /// Aligned reads in indexed BAM format
    #[arg(value_name = "ALIGNMENT")]
    pub in_aln_fn: PathBuf,

    /// Draft assembly to polish (FASTA/FASTQ, indexed)
    #[arg(value_name = "DRAFT")]
    pub in_draft_fn: PathBuf,

    // ============ General Parameters ============
    /// Number of processing threads (default: half the available cores)
    #[arg(short, long, default_value = "0")]
    pub threads: usize,

    /// Number of model replicas per device (CPU only)
    #[arg(long)]
    pub infer_threads: Option<usize>,

    /// Inference device: cpu, cuda[:<ids>], or auto
    #[arg(long, default_value = "auto")]
    pub device: String,

    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    // ============ Input/Output Parameters ============
    /// Output to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub out_path: Option<PathBuf>,

    /// Path to the model directory (config.toml + weights)
    #[arg(short, long, value_name = "DIR")]
    pub model_path: PathBuf,

    /// Emit per-base qualities (FASTQ) instead of FASTA
    #[arg(short, long, default_value = "false")]
    pub qualities: bool,

    // ============ Advanced Parameters ============
    /// Batch size for inference
    #[arg(short, long, default_value = "100")]
    pub batch_size: usize,

    /// Draft sequences are processed in batches of roughly this many bases
    #[arg(long, default_value = "200M", value_parser = parse_size_arg)]
    pub draft_batch_size: i64,

    /// Sample length (in pileup columns) for inference
    #[arg(short, long, default_value = "10000")]
    pub window_len: i64,

    /// Overlap between neighboring windows
    #[arg(long, default_value = "1000")]
    pub window_overlap: i64,

    /// Length of the draft chunks fetched from the BAM at a time
    #[arg(long, default_value = "1000000")]
    pub bam_chunk: i64,

    /// Non-overlapping split of each BAM chunk for parallel encoding
    #[arg(long, default_value = "100000")]
    pub bam_subchunk: i64,

    /// Process only this region, htslib-style (1-based, inclusive end)
    #[arg(long)]
    pub region: Option<String>,

    /// Minimum mapping quality of alignments used for polishing
    #[arg(long, default_value = "0")]
    pub min_mapq: u8,

    /// Cap for emitted base qualities (Phred, at most 70)
    #[arg(long, default_value = "40")]
    pub qual_cap: u8,

    /// Distinct draft positions required on each side before the fallback
    /// overlap cut is attempted
    #[arg(long, default_value = "3")]
    pub heuristic_min_majors: i64,

    /// Always run inference in full precision
    #[arg(long, default_value = "false")]
    pub full_precision: bool,
}

impl Config {
    /// Parse command line arguments and validate
    pub fn parse_and_validate() -> Result<Self> {
        let mut config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters. Clamps `bam_subchunk` to
    /// `bam_chunk` with a warning rather than rejecting it.
    pub fn validate(&mut self) -> Result<()> {
        for path in [&self.in_aln_fn, &self.in_draft_fn] {
            if !path.exists() {
                return Err(GraylingError::FileNotFound { path: path.clone() });
            }
            if std::fs::metadata(path)?.len() == 0 {
                return Err(GraylingError::config(format!(
                    "Input file {} is empty",
                    path.display()
                )));
            }
        }
        if !self.model_path.exists() {
            return Err(GraylingError::FileNotFound {
                path: self.model_path.clone(),
            });
        }
        if let Some(ref out) = self.out_path {
            if out == &self.in_aln_fn || out == &self.in_draft_fn {
                return Err(GraylingError::config(
                    "Output path matches one of the input paths",
                ));
            }
        }

        if self.batch_size == 0 {
            return Err(GraylingError::config("Batch size must be > 0"));
        }
        if self.draft_batch_size <= 0 {
            return Err(GraylingError::config("Draft batch size must be > 0"));
        }
        if self.window_len <= 0 {
            return Err(GraylingError::config("Window length must be > 0"));
        }
        if self.bam_chunk <= 0 || self.bam_subchunk <= 0 {
            return Err(GraylingError::config("BAM chunk sizes must be > 0"));
        }
        if self.window_overlap < 0 || self.window_overlap >= self.window_len {
            return Err(GraylingError::config(format!(
                "Window overlap must be in [0, window_len). window_overlap = {}, \
                 window_len = {}",
                self.window_overlap, self.window_len
            )));
        }
        if self.bam_subchunk > self.bam_chunk {
            warn!(
                "BAM sub-chunk is larger than the BAM chunk, limiting it. \
                 bam_subchunk = {}, bam_chunk = {}",
                self.bam_subchunk, self.bam_chunk
            );
            self.bam_subchunk = self.bam_chunk;
        }
        if self.qual_cap == 0 || self.qual_cap > 70 {
            return Err(GraylingError::config(format!(
                "Quality cap must be in [1, 70]. Given: {}",
                self.qual_cap
            )));
        }
        if self.heuristic_min_majors < 1 {
            return Err(GraylingError::config(
                "The heuristic cut needs at least one distinct position per side",
            ));
        }
        if self.infer_threads.is_some() && self.device != "cpu" {
            return Err(GraylingError::config(
                "The number of inference threads can only be set when the device is 'cpu'",
            ));
        }
        Ok(())
    }

    /// Number of processing threads to use
    pub fn threads(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| (n.get() / 2).max(1))
                .unwrap_or(1)
        }
    }

    /// Number of model replicas on a CPU device
    pub fn infer_threads(&self) -> usize {
        self.infer_threads.unwrap_or(1).max(1)
    }
}

/// Parse a size with an optional K/M/G suffix, e.g. `200M`.
pub fn parse_size(text: &str) -> Result<i64> {
    let trimmed = text.trim();
    let (digits, multiplier) = match trimmed.chars().last() {
        Some('k') | Some('K') => (&trimmed[..trimmed.len() - 1], 1_000),
        Some('m') | Some('M') => (&trimmed[..trimmed.len() - 1], 1_000_000),
        Some('g') | Some('G') => (&trimmed[..trimmed.len() - 1], 1_000_000_000),
        _ => (trimmed, 1),
    };
    let value: i64 = digits
        .parse()
        .map_err(|_| GraylingError::config(format!("Cannot parse size '{text}'")))?;
    Ok(value * multiplier)
}

fn parse_size_arg(text: &str) -> std::result::Result<i64, String> {
    parse_size(text).map_err(|e| e.to_string())
}
