//! Pluggable transforms applied to a freshly built training set.

use ndarray::{Array1, Axis};
use rand::{seq::index::sample, Rng, RngCore};
use rand_distr::{Beta, Distribution};
use tracing::debug;

use crate::{
    error::{Result, SeparationError},
    train::dataset::PatchSet,
};

pub trait BatchTransform {
    fn apply(&mut self, set: &mut PatchSet, rng: &mut dyn RngCore) -> Result<()>;
}

/// Replaces every example with a convex combination of itself and a random
/// partner, weights drawn from `Beta(alpha, alpha)`; targets are mixed with
/// the same weight.
pub struct Mixup {
    beta: Beta<f32>,
}

impl Mixup {
    pub fn new(alpha: f32) -> Result<Self> {
        let beta = Beta::new(alpha, alpha)
            .map_err(|e| SeparationError::Config(format!("mixup alpha {alpha}: {e}")))?;
        Ok(Self { beta })
    }
}

impl BatchTransform for Mixup {
    fn apply(&mut self, set: &mut PatchSet, rng: &mut dyn RngCore) -> Result<()> {
        let n = set.len();
        if n < 2 {
            return Ok(());
        }
        let source = set.clone();
        for i in 0..n {
            let j = rng.gen_range(0..n);
            let lam = self.beta.sample(rng);
            set.mixture
                .index_axis_mut(Axis(0), i)
                .zip_mut_with(&source.mixture.index_axis(Axis(0), j), |a, &b| {
                    *a = lam * *a + (1.0 - lam) * b
                });
            set.instrumental
                .index_axis_mut(Axis(0), i)
                .zip_mut_with(&source.instrumental.index_axis(Axis(0), j), |a, &b| {
                    *a = lam * *a + (1.0 - lam) * b
                });
        }
        Ok(())
    }
}

/// Keeps a random subset of the hardest examples of one epoch and plants them
/// back into the next epoch's set.
#[derive(Clone, Debug)]
pub struct OracleReplay {
    rate: f32,
    drop_rate: f32,
    buffer: Option<PatchSet>,
}

impl OracleReplay {
    pub fn new(rate: f32, drop_rate: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&rate) || !(0.0..1.0).contains(&drop_rate) {
            return Err(SeparationError::Config(format!(
                "oracle rate {rate} must lie in [0, 1] and drop rate {drop_rate} in [0, 1)"
            )));
        }
        Ok(Self {
            rate,
            drop_rate,
            buffer: None,
        })
    }

    pub fn buffered(&self) -> usize {
        self.buffer.as_ref().map_or(0, PatchSet::len)
    }

    /// Picks `floor(N*rate)` examples out of the `floor(N*rate/(1-drop_rate))`
    /// highest-loss ones and stores copies. Returns their mean loss.
    pub fn collect(
        &mut self,
        set: &PatchSet,
        instance_loss: &Array1<f32>,
        rng: &mut dyn RngCore,
    ) -> Option<f32> {
        let total = set.len().min(instance_loss.len());
        let keep = (total as f32 * self.rate) as usize;
        let candidates = ((total as f32 * self.rate / (1.0 - self.drop_rate)) as usize)
            .clamp(keep, total);
        if keep == 0 {
            self.buffer = None;
            return None;
        }

        let mut order: Vec<usize> = (0..total).collect();
        order.sort_by(|&a, &b| instance_loss[b].total_cmp(&instance_loss[a]));
        order.truncate(candidates);

        let chosen: Vec<usize> = sample(rng, candidates, keep)
            .into_iter()
            .map(|i| order[i])
            .collect();
        let loss = chosen.iter().map(|&i| instance_loss[i]).sum::<f32>() / keep as f32;
        debug!(keep, candidates, loss, "collected oracle examples");

        self.buffer = Some(set.select(&chosen));
        Some(loss)
    }
}

impl BatchTransform for OracleReplay {
    fn apply(&mut self, set: &mut PatchSet, rng: &mut dyn RngCore) -> Result<()> {
        let Some(buffer) = &self.buffer else {
            return Ok(());
        };
        if buffer.mixture.shape()[1..] != set.mixture.shape()[1..] {
            return Err(SeparationError::shape(
                "oracle examples",
                &set.mixture.shape()[1..],
                &buffer.mixture.shape()[1..],
            ));
        }
        let count = buffer.len().min(set.len());
        let positions = sample(rng, set.len(), count);
        for (src, dst) in positions.into_iter().enumerate() {
            set.mixture
                .index_axis_mut(Axis(0), dst)
                .assign(&buffer.mixture.index_axis(Axis(0), src));
            set.instrumental
                .index_axis_mut(Axis(0), dst)
                .assign(&buffer.instrumental.index_axis(Axis(0), src));
        }
        Ok(())
    }
}
