//! Per-frequency temporal-context gate, a small mask model that can be
//! trained in-process.
//!
//! For every bin `f` the mask at frame `t` is
//! `sigmoid(bias[f] + sum_k weight[f, k] * x[f, t + k])` with `k` running over
//! `2*offset + 1` frames, so each output frame consumes `offset` frames of
//! context on either side.

use std::{fs::File, path::Path};

use ndarray::{s, Array, Array1, Array2, Array4, ArrayView4, Dimension, Zip};
use ndarray_npy::{NpzReader, NpzWriter};
use tracing::debug;

use crate::{
    error::{Result, SeparationError},
    model::{MaskModel, TrainableModel},
};

const BETA1: f32 = 0.9;
const BETA2: f32 = 0.999;
const EPS: f32 = 1e-8;

#[derive(Clone, Debug)]
struct AdamMoments {
    m_weight: Array2<f32>,
    v_weight: Array2<f32>,
    m_bias: Array1<f32>,
    v_bias: Array1<f32>,
    step: i32,
}

impl AdamMoments {
    fn new(freq_bins: usize, taps: usize) -> Self {
        Self {
            m_weight: Array2::zeros((freq_bins, taps)),
            v_weight: Array2::zeros((freq_bins, taps)),
            m_bias: Array1::zeros(freq_bins),
            v_bias: Array1::zeros(freq_bins),
            step: 0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ContextGateNet {
    weight: Array2<f32>,
    bias: Array1<f32>,
    offset: usize,
    adam: AdamMoments,
    cache: Option<(Array4<f32>, Array4<f32>)>,
}

impl ContextGateNet {
    /// Zero-initialised gate (mask 0.5 everywhere until trained).
    pub fn new(freq_bins: usize, offset: usize) -> Self {
        let taps = 2 * offset + 1;
        Self {
            weight: Array2::zeros((freq_bins, taps)),
            bias: Array1::zeros(freq_bins),
            offset,
            adam: AdamMoments::new(freq_bins, taps),
            cache: None,
        }
    }

    pub fn from_parameters(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self> {
        let (freq_bins, taps) = weight.dim();
        if taps % 2 == 0 || bias.len() != freq_bins {
            return Err(SeparationError::Config(format!(
                "gate parameters need an odd tap count and one bias per bin, got weight {:?} and bias {}",
                weight.dim(),
                bias.len()
            )));
        }
        Ok(Self {
            weight,
            bias,
            offset: taps / 2,
            adam: AdamMoments::new(freq_bins, taps),
            cache: None,
        })
    }

    pub fn freq_bins(&self) -> usize {
        self.bias.len()
    }

    pub fn weight(&self) -> &Array2<f32> {
        &self.weight
    }

    pub fn bias(&self) -> &Array1<f32> {
        &self.bias
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut npz = NpzReader::new(File::open(path)?)?;
        let mut weight: Option<Array2<f32>> = None;
        let mut bias: Option<Array1<f32>> = None;
        for name in npz.names()? {
            match name.trim_end_matches(".npy") {
                "weight" => weight = Some(npz.by_name(&name)?),
                "bias" => bias = Some(npz.by_name(&name)?),
                _ => {}
            }
        }
        let (weight, bias) = weight.zip(bias).ok_or_else(|| {
            anyhow::anyhow!("checkpoint {:?} is missing `weight` or `bias`", path)
        })?;
        debug!(path = %path.display(), bins = bias.len(), "loaded gate checkpoint");
        Self::from_parameters(weight, bias)
    }

    fn check_input(&self, batch: &ArrayView4<f32>) -> Result<()> {
        let (n, c, f, w) = batch.dim();
        if f != self.freq_bins() || w <= 2 * self.offset {
            return Err(SeparationError::shape(
                "gate input",
                &[n, c, self.freq_bins(), w.max(2 * self.offset + 1)],
                &[n, c, f, w],
            ));
        }
        Ok(())
    }

    fn activate(&self, batch: ArrayView4<f32>) -> Array4<f32> {
        let (n, c, f, w) = batch.dim();
        let taps = self.weight.ncols();
        let mut mask = Array4::zeros((n, c, f, w - 2 * self.offset));
        for ((b, ch, fi, t), v) in mask.indexed_iter_mut() {
            let lane = batch.slice(s![b, ch, fi, t..t + taps]);
            let z = self.bias[fi] + lane.dot(&self.weight.row(fi));
            *v = 1.0 / (1.0 + (-z).exp());
        }
        mask
    }
}

fn adam_update<D: Dimension>(
    param: &mut Array<f32, D>,
    grad: &Array<f32, D>,
    m: &mut Array<f32, D>,
    v: &mut Array<f32, D>,
    lr_t: f32,
) {
    Zip::from(param)
        .and(grad)
        .and(m)
        .and(v)
        .for_each(|p, &g, m, v| {
            *m = BETA1 * *m + (1.0 - BETA1) * g;
            *v = BETA2 * *v + (1.0 - BETA2) * g * g;
            *p -= lr_t * *m / (v.sqrt() + EPS);
        });
}

impl MaskModel for ContextGateNet {
    fn offset(&self) -> usize {
        self.offset
    }

    fn predict(&mut self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        self.check_input(&batch)?;
        Ok(self.activate(batch))
    }
}

impl TrainableModel for ContextGateNet {
    fn forward(&mut self, batch: ArrayView4<f32>) -> Result<Array4<f32>> {
        self.check_input(&batch)?;
        let mask = self.activate(batch);
        self.cache = Some((batch.to_owned(), mask.clone()));
        Ok(mask)
    }

    fn backward(&mut self, grad_mask: ArrayView4<f32>, learning_rate: f32) -> Result<()> {
        let (input, mask) = self
            .cache
            .take()
            .ok_or_else(|| anyhow::anyhow!("backward called without a preceding forward"))?;
        if grad_mask.shape() != mask.shape() {
            return Err(SeparationError::shape(
                "gate gradient",
                mask.shape(),
                grad_mask.shape(),
            ));
        }

        let taps = self.weight.ncols();
        let mut grad_weight = Array2::<f32>::zeros(self.weight.raw_dim());
        let mut grad_bias = Array1::<f32>::zeros(self.bias.raw_dim());

        let dz = Zip::from(&grad_mask)
            .and(&mask)
            .map_collect(|&g, &m| g * m * (1.0 - m));
        for ((b, ch, fi, t), &d) in dz.indexed_iter() {
            if d == 0.0 {
                continue;
            }
            grad_bias[fi] += d;
            let lane = input.slice(s![b, ch, fi, t..t + taps]);
            grad_weight
                .row_mut(fi)
                .scaled_add(d, &lane);
        }

        self.adam.step += 1;
        let step = self.adam.step;
        let lr_t = learning_rate * (1.0 - BETA2.powi(step)).sqrt() / (1.0 - BETA1.powi(step));
        adam_update(
            &mut self.weight,
            &grad_weight,
            &mut self.adam.m_weight,
            &mut self.adam.v_weight,
            lr_t,
        );
        adam_update(
            &mut self.bias,
            &grad_bias,
            &mut self.adam.m_bias,
            &mut self.adam.v_bias,
            lr_t,
        );
        Ok(())
    }

    fn save_checkpoint(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let mut npz = NpzWriter::new(File::create(path)?);
        npz.add_array("weight", &self.weight)?;
        npz.add_array("bias", &self.bias)?;
        npz.finish()?;
        debug!(path = %path.display(), "saved gate checkpoint");
        Ok(())
    }
}
