//! # Predictors
//!
//! The inference contract and its native implementations. A predictor maps
//! a stacked `[batch, len, features]` tensor to `[batch, len, classes]`
//! logits; everything else about the network is opaque to the pipeline.
//!
//! `GruModel` and `LatentSpaceLstm` run natively: stacked, optionally
//! bidirectional recurrent layers with a linear readout, weights loaded
//! from a safetensors file. `ScriptedModel` names a TorchScript artifact
//! this build cannot execute and is rejected at load time.

use ndarray::{concatenate, Array1, Array2, Array3, ArrayView2, ArrayView3, Axis};
use safetensors::SafeTensors;
use std::path::Path;
use tracing::debug;

use crate::error::{GraylingError, Result};
use crate::model::config::ModelConfig;
use crate::model::device::{DeviceInfo, DeviceKind};

/// Inference capability contract.
pub trait Predictor: Send {
    /// Forward pass over a stacked batch.
    fn predict_on_batch(&self, batch: ArrayView3<'_, f32>) -> Result<Array3<f32>>;

    /// Move the model to a device. CPU is the only resident backend.
    fn to_device(&mut self, device: &DeviceInfo) -> Result<()>;

    /// Request half precision. Honored on accelerators only; CPU inference
    /// stays in f32.
    fn to_half(&mut self) -> Result<()>;

    /// Switch to inference mode.
    fn set_eval(&mut self);
}

/// Weights of one recurrent direction of one layer.
#[derive(Clone, Debug)]
struct RecurrentDirection {
    w_ih: Array2<f32>,
    w_hh: Array2<f32>,
    b_ih: Array1<f32>,
    b_hh: Array1<f32>,
}

#[derive(Clone, Debug)]
struct RecurrentLayer {
    forward: RecurrentDirection,
    backward: Option<RecurrentDirection>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CellKind {
    Gru,
    Lstm,
}

impl CellKind {
    fn prefix(&self) -> &'static str {
        match self {
            Self::Gru => "gru",
            Self::Lstm => "lstm",
        }
    }

    /// Gate rows per hidden unit in the stacked weight matrices.
    fn gate_mult(&self) -> usize {
        match self {
            Self::Gru => 3,
            Self::Lstm => 4,
        }
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// A stack of recurrent layers with a linear readout.
#[derive(Clone, Debug)]
struct RecurrentNet {
    cell: CellKind,
    layers: Vec<RecurrentLayer>,
    linear_w: Array2<f32>,
    linear_b: Array1<f32>,
    hidden: usize,
    in_features: usize,
    eval: bool,
}

impl RecurrentNet {
    fn load(path: &Path, cell: CellKind) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            GraylingError::format(format!("Cannot read weights '{}': {e}", path.display()))
        })?;
        let st = SafeTensors::deserialize(&bytes)
            .map_err(|e| GraylingError::format(format!("Bad weights file: {e}")))?;

        let prefix = cell.prefix();
        let mut layers = Vec::new();
        let mut layer = 0;
        while st
            .names()
            .iter()
            .any(|n| **n == format!("{prefix}.weight_ih_l{layer}"))
        {
            let forward = load_direction(&st, prefix, layer, "")?;
            let backward = if st
                .names()
                .iter()
                .any(|n| **n == format!("{prefix}.weight_ih_l{layer}_reverse"))
            {
                Some(load_direction(&st, prefix, layer, "_reverse")?)
            } else {
                None
            };
            layers.push(RecurrentLayer { forward, backward });
            layer += 1;
        }
        if layers.is_empty() {
            return Err(GraylingError::format(format!(
                "Weights file '{}' has no '{prefix}' layers",
                path.display()
            )));
        }

        let linear_w = tensor_2d(&st, "linear.weight")?;
        let linear_b = tensor_1d(&st, "linear.bias")?;

        let gate_mult = cell.gate_mult();
        let hidden = layers[0].forward.w_hh.ncols();
        let in_features = layers[0].forward.w_ih.ncols();
        let dirs = if layers[0].backward.is_some() { 2 } else { 1 };
        for (i, l) in layers.iter().enumerate() {
            if (l.backward.is_some() as usize + 1) != dirs {
                return Err(GraylingError::format(format!(
                    "Layer {i} does not match the directionality of layer 0"
                )));
            }
            let expected_in = if i == 0 { in_features } else { hidden * dirs };
            let directions: Vec<&RecurrentDirection> =
                std::iter::once(&l.forward).chain(l.backward.as_ref()).collect();
            for d in directions {
                if d.w_ih.dim() != (gate_mult * hidden, expected_in)
                    || d.w_hh.dim() != (gate_mult * hidden, hidden)
                    || d.b_ih.len() != gate_mult * hidden
                    || d.b_hh.len() != gate_mult * hidden
                {
                    return Err(GraylingError::format(format!(
                        "Inconsistent recurrent weight shapes in layer {i}"
                    )));
                }
            }
        }
        if linear_w.ncols() != hidden * dirs || linear_b.len() != linear_w.nrows() {
            return Err(GraylingError::format(
                "Linear readout shape does not match the recurrent stack",
            ));
        }

        Ok(Self {
            cell,
            layers,
            linear_w,
            linear_b,
            hidden,
            in_features,
            eval: false,
        })
    }

    /// Run one direction over `[len, in]`, producing `[len, hidden]`.
    fn run_direction(&self, x: ArrayView2<'_, f32>, dir: &RecurrentDirection, reverse: bool) -> Array2<f32> {
        let len = x.nrows();
        let hidden = self.hidden;
        let mut gates_x = x.dot(&dir.w_ih.t());
        gates_x += &dir.b_ih;

        let mut out = Array2::zeros((len, hidden));
        let mut h = Array1::<f32>::zeros(hidden);
        let mut c = Array1::<f32>::zeros(hidden);
        let order: Vec<usize> = if reverse {
            (0..len).rev().collect()
        } else {
            (0..len).collect()
        };
        for t in order {
            let mut gh = h.dot(&dir.w_hh.t());
            gh += &dir.b_hh;
            let gx = gates_x.row(t);
            match self.cell {
                CellKind::Gru => {
                    for j in 0..hidden {
                        let r = sigmoid(gx[j] + gh[j]);
                        let z = sigmoid(gx[hidden + j] + gh[hidden + j]);
                        let n = (gx[2 * hidden + j] + r * gh[2 * hidden + j]).tanh();
                        h[j] = (1.0 - z) * n + z * h[j];
                    }
                }
                CellKind::Lstm => {
                    for j in 0..hidden {
                        let i = sigmoid(gx[j] + gh[j]);
                        let f = sigmoid(gx[hidden + j] + gh[hidden + j]);
                        let g = (gx[2 * hidden + j] + gh[2 * hidden + j]).tanh();
                        let o = sigmoid(gx[3 * hidden + j] + gh[3 * hidden + j]);
                        c[j] = f * c[j] + i * g;
                        h[j] = o * c[j].tanh();
                    }
                }
            }
            out.row_mut(t).assign(&h);
        }
        out
    }

    /// Forward one sequence `[len, in_features]` to `[len, classes]`.
    fn forward_seq(&self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let mut current = x.to_owned();
        for layer in &self.layers {
            let fwd = self.run_direction(current.view(), &layer.forward, false);
            current = match &layer.backward {
                Some(backward) => {
                    let bwd = self.run_direction(current.view(), backward, true);
                    concatenate(Axis(1), &[fwd.view(), bwd.view()]).map_err(|e| {
                        GraylingError::predictor(format!("Failed to join directions: {e}"))
                    })?
                }
                None => fwd,
            };
        }
        let mut logits = current.dot(&self.linear_w.t());
        logits += &self.linear_b;
        Ok(logits)
    }

    fn predict(&self, batch: ArrayView3<'_, f32>) -> Result<Array3<f32>> {
        if !self.eval {
            debug!("Predictor called before set_eval()");
        }
        let (n, len, feats) = batch.dim();
        if feats != self.in_features {
            return Err(GraylingError::predictor(format!(
                "Batch has {feats} features but the model expects {}",
                self.in_features
            )));
        }
        let classes = self.linear_w.nrows();
        let mut out = Array3::zeros((n, len, classes));
        for b in 0..n {
            let logits = self.forward_seq(batch.index_axis(Axis(0), b))?;
            out.index_axis_mut(Axis(0), b).assign(&logits);
        }
        Ok(out)
    }
}

fn load_direction(
    st: &SafeTensors<'_>,
    prefix: &str,
    layer: usize,
    suffix: &str,
) -> Result<RecurrentDirection> {
    Ok(RecurrentDirection {
        w_ih: tensor_2d(st, &format!("{prefix}.weight_ih_l{layer}{suffix}"))?,
        w_hh: tensor_2d(st, &format!("{prefix}.weight_hh_l{layer}{suffix}"))?,
        b_ih: tensor_1d(st, &format!("{prefix}.bias_ih_l{layer}{suffix}"))?,
        b_hh: tensor_1d(st, &format!("{prefix}.bias_hh_l{layer}{suffix}"))?,
    })
}

fn tensor_f32(st: &SafeTensors<'_>, name: &str) -> Result<(Vec<usize>, Vec<f32>)> {
    let view = st
        .tensor(name)
        .map_err(|e| GraylingError::format(format!("Missing tensor '{name}': {e}")))?;
    if view.dtype() != safetensors::Dtype::F32 {
        return Err(GraylingError::format(format!(
            "Tensor '{name}' is not f32"
        )));
    }
    let values = view
        .data()
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((view.shape().to_vec(), values))
}

fn tensor_2d(st: &SafeTensors<'_>, name: &str) -> Result<Array2<f32>> {
    let (shape, values) = tensor_f32(st, name)?;
    if shape.len() != 2 {
        return Err(GraylingError::format(format!(
            "Tensor '{name}' is not 2-D"
        )));
    }
    Array2::from_shape_vec((shape[0], shape[1]), values)
        .map_err(|e| GraylingError::format(format!("Tensor '{name}': {e}")))
}

fn tensor_1d(st: &SafeTensors<'_>, name: &str) -> Result<Array1<f32>> {
    let (shape, values) = tensor_f32(st, name)?;
    if shape.len() != 1 {
        return Err(GraylingError::format(format!(
            "Tensor '{name}' is not 1-D"
        )));
    }
    Ok(Array1::from_vec(values))
}

/// Bidirectional GRU stack with a linear readout.
#[derive(Clone, Debug)]
pub struct GruModel {
    net: RecurrentNet,
}

impl GruModel {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            net: RecurrentNet::load(path, CellKind::Gru)?,
        })
    }
}

/// LSTM stack operating in the encoder's latent space.
#[derive(Clone, Debug)]
pub struct LatentSpaceLstm {
    net: RecurrentNet,
}

impl LatentSpaceLstm {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            net: RecurrentNet::load(path, CellKind::Lstm)?,
        })
    }
}

/// Predictor variant selected from the model config.
#[derive(Clone, Debug)]
pub enum ModelKind {
    Gru(GruModel),
    LatentSpaceLstm(LatentSpaceLstm),
}

impl ModelKind {
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let weights = config.weights_path();
        match config.model.model_type.as_str() {
            "GruModel" => Ok(Self::Gru(GruModel::load(&weights)?)),
            "LatentSpaceLstm" => Ok(Self::LatentSpaceLstm(LatentSpaceLstm::load(&weights)?)),
            "ScriptedModel" => Err(GraylingError::config(
                "ScriptedModel requires a TorchScript runtime, which this build does not \
                 include. Export the weights as safetensors and use GruModel or \
                 LatentSpaceLstm.",
            )),
            other => Err(GraylingError::format(format!(
                "Unknown model type: '{other}'"
            ))),
        }
    }

    fn net(&self) -> &RecurrentNet {
        match self {
            Self::Gru(m) => &m.net,
            Self::LatentSpaceLstm(m) => &m.net,
        }
    }

    fn net_mut(&mut self) -> &mut RecurrentNet {
        match self {
            Self::Gru(m) => &mut m.net,
            Self::LatentSpaceLstm(m) => &mut m.net,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.net().linear_w.nrows()
    }

    pub fn in_features(&self) -> usize {
        self.net().in_features
    }
}

impl Predictor for ModelKind {
    fn predict_on_batch(&self, batch: ArrayView3<'_, f32>) -> Result<Array3<f32>> {
        self.net().predict(batch)
    }

    fn to_device(&mut self, device: &DeviceInfo) -> Result<()> {
        match device.kind {
            DeviceKind::Cpu => Ok(()),
            DeviceKind::Cuda => Err(GraylingError::device(format!(
                "Cannot move the model to '{}': no CUDA runtime in this build",
                device.name
            ))),
        }
    }

    fn to_half(&mut self) -> Result<()> {
        debug!("Half precision requested; CPU inference keeps f32 weights");
        Ok(())
    }

    fn set_eval(&mut self) {
        self.net_mut().eval = true;
    }
}
