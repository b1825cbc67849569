//! # Logits Decoding
//!
//! Turns predictor output into called bases with Phred-scaled qualities.
//! The haploid label scheme maps the class axis onto `*ACGT`, where `*`
//! marks the deletion class and is compacted away after stitching.

use ndarray::ArrayView3;

use crate::error::{GraylingError, Result};

/// Symbol table for a label scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabelScheme {
    Haploid,
}

impl LabelScheme {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "HaploidLabelScheme" => Ok(Self::Haploid),
            other => Err(GraylingError::format(format!(
                "Unknown label scheme type: '{other}'"
            ))),
        }
    }

    pub fn symbols(&self) -> &'static [u8] {
        match self {
            Self::Haploid => b"*ACGT",
        }
    }
}

/// Decodes per-sample logits into `(seq, quals)` pairs.
#[derive(Clone, Debug)]
pub struct BaseDecoder {
    scheme: LabelScheme,
    qual_cap: f32,
}

impl BaseDecoder {
    pub fn new(scheme: LabelScheme, qual_cap: u8) -> Self {
        Self {
            scheme,
            qual_cap: f32::from(qual_cap),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.scheme.symbols().len()
    }

    /// Decode a `[batch, len, classes]` logits tensor. Returns one
    /// `(seq, quals)` pair per batch element, each of exactly `len` bytes.
    pub fn decode_bases(&self, logits: ArrayView3<'_, f32>) -> Result<Vec<(String, String)>> {
        let symbols = self.scheme.symbols();
        let (batch, len, classes) = logits.dim();
        if classes != symbols.len() {
            return Err(GraylingError::invalid_data(format!(
                "Logits have {classes} classes but the label scheme has {}",
                symbols.len()
            )));
        }

        let mut results = Vec::with_capacity(batch);
        for b in 0..batch {
            let mut seq = Vec::with_capacity(len);
            let mut quals = Vec::with_capacity(len);
            for t in 0..len {
                let row = logits.slice(ndarray::s![b, t, ..]);
                let mut best = 0usize;
                let mut best_val = f32::NEG_INFINITY;
                for (c, &v) in row.iter().enumerate() {
                    if v > best_val {
                        best = c;
                        best_val = v;
                    }
                }
                // Softmax probability of the winning class, computed with
                // the max subtracted so exp never overflows.
                let denom: f32 = row.iter().map(|&v| (v - best_val).exp()).sum();
                let prob = 1.0 / denom;
                let err = (1.0 - prob).max(1e-10);
                let phred = (-10.0 * err.log10()).clamp(0.0, self.qual_cap);
                seq.push(symbols[best]);
                quals.push(33 + phred.round() as u8);
            }
            // Safety: both buffers contain ASCII only.
            results.push((
                String::from_utf8(seq).expect("ASCII bases"),
                String::from_utf8(quals).expect("ASCII qualities"),
            ));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn one_hot_logits(classes: &[usize], scale: f32) -> Array3<f32> {
        let mut logits = Array3::zeros((1, classes.len(), 5));
        for (t, &c) in classes.iter().enumerate() {
            logits[[0, t, c]] = scale;
        }
        logits
    }

    #[test]
    fn test_argmax_maps_to_label_scheme() {
        let decoder = BaseDecoder::new(LabelScheme::Haploid, 40);
        let logits = one_hot_logits(&[1, 2, 0, 3, 4], 10.0);
        let decoded = decoder.decode_bases(logits.view()).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].0, "AC*GT");
        assert_eq!(decoded[0].1.len(), 5);
    }

    #[test]
    fn test_confident_calls_hit_the_cap() {
        let decoder = BaseDecoder::new(LabelScheme::Haploid, 40);
        let logits = one_hot_logits(&[1], 1000.0);
        let decoded = decoder.decode_bases(logits.view()).unwrap();
        // err underflows to the floor, phred saturates at the cap.
        assert_eq!(decoded[0].1.as_bytes()[0], 33 + 40);
    }

    #[test]
    fn test_uncertain_calls_get_low_quality() {
        let decoder = BaseDecoder::new(LabelScheme::Haploid, 40);
        // All-equal logits: p = 0.2, err = 0.8 -> ~1 phred.
        let logits = Array3::zeros((1, 1, 5));
        let decoded = decoder.decode_bases(logits.view()).unwrap();
        let q = decoded[0].1.as_bytes()[0] - 33;
        assert!(q <= 1, "expected near-zero quality, got {q}");
    }

    #[test]
    fn test_configurable_cap() {
        let decoder = BaseDecoder::new(LabelScheme::Haploid, 70);
        let logits = one_hot_logits(&[2], 1000.0);
        let decoded = decoder.decode_bases(logits.view()).unwrap();
        assert_eq!(decoded[0].1.as_bytes()[0], 33 + 70);
    }

    #[test]
    fn test_class_count_mismatch_is_rejected() {
        let decoder = BaseDecoder::new(LabelScheme::Haploid, 40);
        let logits = Array3::zeros((1, 3, 4));
        assert!(decoder.decode_bases(logits.view()).is_err());
    }
}
