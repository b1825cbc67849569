//! # Pipelines Module (Orchestration)
//!
//! ## Role
//! The algorithms that transform samples between encoding and output, and
//! the orchestrator that drives them.
//!
//! ## Design Philosophy
//! - The pipeline **owns** the execution flow: it calls into `io` to load
//!   data, `model` to encode and infer, and `io` again to write.
//! - Parallelism is coordinated here: rayon for the encode/refine fan-out,
//!   bounded channels between the long-lived stages.
//! - Progress reporting and run counters live here.
//!
//! ## Sub-modules
//! - `refine`: split/merge/re-split of encoded samples
//! - `trim`: overlap resolution between adjacent samples
//! - `batching`: draft batches and inference batch formation
//! - `stitch`: per-contig consensus assembly
//! - `polish`: the end-to-end orchestrator

pub mod batching;
pub mod polish;
pub mod refine;
pub mod stitch;
pub mod trim;

pub use polish::{PolishPipeline, PolishStats};
pub use trim::{Relationship, TrimInfo};
