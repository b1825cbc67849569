//! # Data Module
//!
//! ## Role
//! In-memory representations of the units flowing through the polishing
//! pipeline. This is the core "Model" layer.
//!
//! ## Design Philosophy
//! - **Owned tensors, borrowed views:** feature and depth buffers are owned
//!   `ndarray` arrays; slicing copies only the requested rows, and merge
//!   paths move single buffers instead of concatenating.
//! - **Index-based association:** samples, trims, and predictions are tied
//!   together by position in parallel vectors, never by pointers.
//!
//! ## Sub-modules
//! - `sample`: the per-window feature tensor plus pileup coordinates
//! - `window`: draft decomposition into BAM regions and sub-windows
//! - `consensus`: per-sample and per-contig consensus sequences

pub mod consensus;
pub mod sample;
pub mod window;

pub use consensus::ConsensusResult;
pub use sample::Sample;
pub use window::{Interval, Window};
