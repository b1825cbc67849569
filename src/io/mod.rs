//! # IO Module
//!
//! File access at the pipeline edges: indexed draft sequence fetch and
//! consensus record output. Alignment access lives with the encoders in
//! `model::pileup`, one reader replica per worker.

pub mod fastx;
pub mod output;

pub use fastx::DraftReader;
pub use output::ConsensusWriter;
