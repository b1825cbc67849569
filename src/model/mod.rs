//! # Model Module
//!
//! Everything that faces the neural network: the TOML model configuration,
//! device selection, the pileup feature encoders, the logits decoder, and
//! the predictor implementations.
//!
//! The three capability seams (`FeatureEncoder`, `Predictor`, and the
//! decoder) are concrete tagged types selected once from the model config;
//! nothing here is dispatched dynamically across threads.

pub mod config;
pub mod decoder;
pub mod device;
pub mod encoder;
pub mod pileup;
pub mod predictor;

pub use config::ModelConfig;
pub use decoder::{BaseDecoder, LabelScheme};
pub use device::{DeviceInfo, DeviceKind, DeviceRegistry};
pub use encoder::{collate, EncoderKind, FeatureEncoder};
pub use predictor::{ModelKind, Predictor};
