//! # Polishing Pipeline
//!
//! Orchestrates the full run: draft batching, window planning, parallel
//! encoding, refinement and trimming per BAM region, batched inference,
//! decoding, and stitching.
//!
//! Within one draft batch the stages form a three-worker pipeline joined
//! by bounded channels: the producer turns BAM regions into inference
//! batches, one inference worker per model replica runs the forward pass,
//! and a decode worker turns logits into per-sample sequences. Draft
//! batches act as barriers so that peak memory stays proportional to the
//! batch size, not the assembly size.

use crossbeam_channel::bounded;
use ndarray::Array3;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::data::consensus::ConsensusResult;
use crate::data::window::{plan_bam_regions, split_into_subwindows, RegionSpec, Window};
use crate::data::Sample;
use crate::error::{GraylingError, Result};
use crate::io::{ConsensusWriter, DraftReader};
use crate::model::config::kwarg_usize;
use crate::model::decoder::{BaseDecoder, LabelScheme};
use crate::model::device::{DeviceKind, DeviceRegistry};
use crate::model::encoder::{collate, EncoderKind, FeatureEncoder, COUNTS_FEATURE_DIM};
use crate::model::predictor::{ModelKind, Predictor};
use crate::model::ModelConfig;
use crate::pipelines::batching::{create_draft_batches, form_batches, InferenceBatch, PendingSample};
use crate::pipelines::refine::refine_region_samples;
use crate::pipelines::stitch::{stitch_sequence, StitchEntry};
use crate::pipelines::trim::{trim_samples, RegionRestriction, TrimInfo};

/// Capacity of the queue feeding the inference workers.
const BATCH_QUEUE_CAPACITY: usize = 8;
/// Capacity of the queue feeding the decode worker.
const DECODE_QUEUE_CAPACITY: usize = 8;

/// Run counters, shared across the pipeline stages.
#[derive(Debug, Default)]
pub struct PolishStats {
    pub windows_skipped: AtomicUsize,
    pub heuristic_cuts: AtomicUsize,
    pub samples_inferred: AtomicUsize,
    pub batches_dispatched: AtomicUsize,
}

impl PolishStats {
    fn log_summary(&self) {
        info!(
            "Run summary: {} samples inferred in {} batches, {} zero-coverage windows \
             skipped, {} heuristic overlap cuts",
            self.samples_inferred.load(Ordering::Relaxed),
            self.batches_dispatched.load(Ordering::Relaxed),
            self.windows_skipped.load(Ordering::Relaxed),
            self.heuristic_cuts.load(Ordering::Relaxed),
        );
    }
}

/// A batch that went through the forward pass, awaiting decoding.
struct DecodeJob {
    items: Vec<PendingSample>,
    logits: Array3<f32>,
}

/// A sample with its trim and decoded prediction, back from inference.
type Decoded = Option<(Sample, TrimInfo, ConsensusResult)>;

/// The polishing pipeline.
pub struct PolishPipeline {
    config: Config,
}

impl PolishPipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Drive the whole run. Consumes the draft in batches and writes one
    /// consensus record per contig.
    pub fn run(&self) -> Result<()> {
        let config = &self.config;

        let registry = DeviceRegistry::init(&config.device)?;

        info!("Loading the model config");
        let model_config = ModelConfig::load(&config.model_path)?;
        let scheme = LabelScheme::from_name(&model_config.label_scheme.scheme_type)?;
        let decoder = BaseDecoder::new(scheme, config.qual_cap);

        info!("Loading the model");
        let base_model = ModelKind::from_config(&model_config)?;
        if base_model.num_classes() != decoder.num_classes() {
            return Err(GraylingError::config(format!(
                "Model predicts {} classes but the label scheme has {}",
                base_model.num_classes(),
                decoder.num_classes()
            )));
        }
        let expected_features = match model_config.feature_encoder.encoder_type.as_str() {
            "ReadAlignmentEncoder" => {
                2 * kwarg_usize(&model_config.feature_encoder.kwargs, "max_reads", 100)?
            }
            _ => COUNTS_FEATURE_DIM,
        };
        if base_model.in_features() != expected_features {
            return Err(GraylingError::config(format!(
                "Model expects {} input features but the encoder produces {}",
                base_model.in_features(),
                expected_features
            )));
        }

        let mut models = Vec::new();
        let replicas = if registry.is_cpu_only() {
            config.infer_threads()
        } else {
            1
        };
        for device in registry.devices() {
            for _ in 0..replicas {
                let mut model = base_model.clone();
                model.to_device(device)?;
                if device.kind == DeviceKind::Cuda && !config.full_precision {
                    model.to_half()?;
                }
                model.set_eval();
                models.push(model);
            }
        }
        info!("Using {} model replica(s)", models.len());

        info!("Opening the draft");
        let draft = DraftReader::open(&config.in_draft_fn)?;

        // An explicit region narrows the run to one contig; output then
        // covers exactly the requested range.
        let region_spec = config
            .region
            .as_deref()
            .map(RegionSpec::parse)
            .transpose()?;
        let (draft_lens, region_bounds) = match &region_spec {
            None => (draft.sequence_lengths().to_vec(), None),
            Some(spec) => {
                let (name, len) = draft
                    .sequence_lengths()
                    .iter()
                    .find(|(name, _)| *name == spec.name)
                    .cloned()
                    .ok_or_else(|| {
                        GraylingError::invalid_data(format!(
                            "Region contig '{}' not found in the draft input",
                            spec.name
                        ))
                    })?;
                let start = spec.start.unwrap_or(0).max(0);
                let end = spec.end.unwrap_or(len).min(len);
                info!("Restricting to region {}:{}-{}", name, start + 1, end);
                (vec![(name, len)], Some((start, end)))
            }
        };

        info!(
            "Opening {} alignment reader replica(s)",
            config.threads()
        );
        let mut encoders: Vec<EncoderKind> = (0..config.threads())
            .map(|_| EncoderKind::from_config(&model_config, &config.in_aln_fn, config.min_mapq))
            .collect::<Result<_>>()?;

        let mut writer = match &config.out_path {
            Some(path) => ConsensusWriter::create(path, config.qualities)?,
            None => ConsensusWriter::stdout(config.qualities),
        };

        let stats = PolishStats::default();
        let draft_batches = create_draft_batches(&draft_lens, config.draft_batch_size);
        info!(
            "Polishing {} contig(s) in {} draft batch(es)",
            draft_lens.len(),
            draft_batches.len()
        );

        for (batch_id, interval) in draft_batches.iter().enumerate() {
            let batch_lens = &draft_lens[interval.start..interval.end];
            let total_bases: i64 = batch_lens.iter().map(|(_, len)| len).sum();
            info!(
                "Draft batch {}/{}: {} contig(s), {:.2} Mbp",
                batch_id + 1,
                draft_batches.len(),
                batch_lens.len(),
                total_bases as f64 / 1e6
            );
            self.process_draft_batch(
                batch_lens,
                region_spec.as_ref(),
                region_bounds,
                &draft,
                &mut encoders,
                &models,
                &decoder,
                &mut writer,
                &stats,
            )?;
        }

        writer.flush()?;
        stats.log_summary();
        Ok(())
    }

    /// Encode, refine, trim, infer, decode, and stitch one draft batch.
    #[allow(clippy::too_many_arguments)]
    fn process_draft_batch(
        &self,
        batch_lens: &[(String, i64)],
        region_spec: Option<&RegionSpec>,
        region_bounds: Option<(i64, i64)>,
        draft: &DraftReader,
        encoders: &mut Vec<EncoderKind>,
        models: &[ModelKind],
        decoder: &BaseDecoder,
        writer: &mut ConsensusWriter,
        stats: &PolishStats,
    ) -> Result<()> {
        let config = &self.config;

        let bam_regions = plan_bam_regions(
            batch_lens,
            config.bam_chunk,
            config.window_overlap,
            region_spec,
        )?;
        let (windows, intervals) = split_into_subwindows(&bam_regions, config.bam_subchunk)?;
        debug!(
            "{} BAM region(s), {} sub-window(s)",
            bam_regions.len(),
            windows.len()
        );

        // Encode, refine, and trim each BAM region in parallel. Alignment
        // reader replicas are handed out through a checkout channel, one
        // per in-flight region.
        let n_encoders = encoders.len().max(1);
        let (pool_tx, pool_rx) = bounded::<EncoderKind>(n_encoders);
        for encoder in encoders.drain(..) {
            pool_tx
                .send(encoder)
                .map_err(|_| GraylingError::invalid_data("Encoder pool closed unexpectedly"))?;
        }

        let region_results: Result<Vec<(Vec<Sample>, Vec<TrimInfo>)>> = (0..bam_regions.len())
            .into_par_iter()
            .map(|region_id| {
                let mut encoder = pool_rx
                    .recv()
                    .map_err(|_| GraylingError::invalid_data("Encoder pool closed unexpectedly"))?;
                let output = self.process_region(
                    &bam_regions[region_id],
                    &windows[intervals[region_id].start..intervals[region_id].end],
                    batch_lens,
                    &mut encoder,
                    stats,
                );
                let _ = pool_tx.send(encoder);
                output
            })
            .collect();
        for _ in 0..n_encoders {
            if let Ok(encoder) = pool_rx.try_recv() {
                encoders.push(encoder);
            }
        }
        let region_results = region_results?;

        // Flatten in region order; the index ties every sample to its slot
        // in the result vector.
        let mut pending = Vec::new();
        for (samples, trims) in region_results {
            for (sample, trim) in samples.into_iter().zip(trims) {
                pending.push(PendingSample {
                    index: pending.len(),
                    sample,
                    trim,
                });
            }
        }
        let n_items = pending.len();
        info!("Produced {} sample(s) for inference", n_items);

        let batches = form_batches(pending, config.window_len as usize, config.batch_size);

        // Inference and decoding run as a bounded-channel pipeline.
        let (batch_tx, batch_rx) = bounded::<InferenceBatch>(BATCH_QUEUE_CAPACITY);
        let (decode_tx, decode_rx) = bounded::<DecodeJob>(DECODE_QUEUE_CAPACITY);
        let cancel = AtomicBool::new(false);

        let decoded: Vec<Decoded> = thread::scope(|scope| -> Result<Vec<Decoded>> {
            let mut infer_handles = Vec::new();
            for model in models {
                let batch_rx = batch_rx.clone();
                let decode_tx = decode_tx.clone();
                let cancel = &cancel;
                infer_handles.push(scope.spawn(move || -> Result<()> {
                    for batch in batch_rx.iter() {
                        if cancel.load(Ordering::Relaxed) {
                            break;
                        }
                        let samples: Vec<&Sample> =
                            batch.items.iter().map(|item| &item.sample).collect();
                        let features = collate(&samples).inspect_err(|_| {
                            cancel.store(true, Ordering::Relaxed);
                        })?;
                        let logits =
                            model.predict_on_batch(features.view()).inspect_err(|_| {
                                cancel.store(true, Ordering::Relaxed);
                            })?;
                        stats.batches_dispatched.fetch_add(1, Ordering::Relaxed);
                        stats
                            .samples_inferred
                            .fetch_add(batch.items.len(), Ordering::Relaxed);
                        if decode_tx
                            .send(DecodeJob {
                                items: batch.items,
                                logits,
                            })
                            .is_err()
                        {
                            break;
                        }
                    }
                    Ok(())
                }));
            }
            drop(batch_rx);
            drop(decode_tx);

            let decode_handle = scope.spawn(move || -> Result<Vec<Decoded>> {
                let mut results: Vec<Decoded> = (0..n_items).map(|_| None).collect();
                for job in decode_rx.iter() {
                    let pairs = decoder.decode_bases(job.logits.view())?;
                    for (item, (seq, quals)) in job.items.into_iter().zip(pairs) {
                        let draft_start =
                            item.sample.positions_major[item.trim.start.max(0) as usize];
                        let result =
                            ConsensusResult::new(seq, quals, item.sample.seq_id, draft_start);
                        results[item.index] = Some((item.sample, item.trim, result));
                    }
                }
                Ok(results)
            });

            for batch in batches {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                if batch_tx.send(batch).is_err() {
                    break;
                }
            }
            drop(batch_tx);

            let mut first_error = None;
            for handle in infer_handles {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        first_error.get_or_insert(e);
                    }
                    Err(_) => {
                        first_error
                            .get_or_insert(GraylingError::predictor("Inference worker panicked"));
                    }
                }
            }
            let decoded = match decode_handle.join() {
                Ok(result) => result?,
                Err(_) => {
                    return Err(GraylingError::predictor("Decode worker panicked"));
                }
            };
            match first_error {
                Some(e) => Err(e),
                None => Ok(decoded),
            }
        })?;

        // Regroup by contig, restore coordinate order, stitch, and write.
        let mut groups: Vec<Vec<(i64, usize)>> = vec![Vec::new(); batch_lens.len()];
        for (idx, entry) in decoded.iter().enumerate() {
            if let Some((sample, trim, result)) = entry {
                if trim.is_discarded() || result.is_empty() {
                    continue;
                }
                groups[sample.seq_id as usize].push((result.draft_start, idx));
            }
        }
        for group in &mut groups {
            group.sort_unstable();
        }

        let drafts: Vec<Vec<u8>> = batch_lens
            .iter()
            .map(|(name, _)| draft.fetch_all(name))
            .collect::<Result<_>>()?;

        let stitched: Vec<ConsensusResult> = groups
            .par_iter()
            .enumerate()
            .map(|(seq_id, group)| {
                let (range_start, range_end) =
                    region_bounds.unwrap_or((0, batch_lens[seq_id].1));
                let entries: Vec<StitchEntry<'_>> = group
                    .iter()
                    .filter_map(|&(_, idx)| decoded[idx].as_ref())
                    .map(|(sample, trim, result)| StitchEntry {
                        sample,
                        trim,
                        result,
                    })
                    .collect();
                stitch_sequence(
                    &drafts[seq_id],
                    range_start,
                    range_end,
                    &entries,
                    seq_id as i32,
                )
            })
            .collect::<Result<_>>()?;

        for (seq_id, result) in stitched.iter().enumerate() {
            writer.write_record(&batch_lens[seq_id].0, result)?;
        }
        Ok(())
    }


    /// Encode the sub-windows of one BAM region, refine the samples, and
    /// resolve trims against the region's ownership range.
    fn process_region(
        &self,
        region: &Window,
        windows: &[Window],
        batch_lens: &[(String, i64)],
        encoder: &mut EncoderKind,
        stats: &PolishStats,
    ) -> Result<(Vec<Sample>, Vec<TrimInfo>)> {
        let config = &self.config;
        let mut samples = Vec::with_capacity(windows.len());
        for window in windows {
            let name = &batch_lens[window.seq_id as usize].0;
            let mut sample =
                encoder.encode_region(name, window.start, window.end, window.seq_id)?;
            if sample.is_empty() {
                warn!(
                    "Window {}:{}-{} produced no features (zero coverage), skipping",
                    name,
                    window.start + 1,
                    window.end
                );
                stats.windows_skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            sample.region_id = window.region_id;
            samples.push(sample);
        }

        let refined = refine_region_samples(
            samples,
            config.window_len as usize,
            config.window_overlap as usize,
        )?;
        let restriction = RegionRestriction {
            seq_id: region.seq_id,
            start: region.start_no_overlap,
            end: region.end_no_overlap,
        };
        let (trims, heuristic) =
            trim_samples(&refined, Some(&restriction), config.heuristic_min_majors)?;
        stats.heuristic_cuts.fetch_add(heuristic, Ordering::Relaxed);
        Ok((refined, trims))
    }
}
