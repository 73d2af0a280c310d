use tracing::info;

use crate::train::augment::OracleReplay;

/// Cross-epoch bookkeeping of a training run.
#[derive(Clone, Debug)]
pub struct TrainingState {
    pub best_loss: f32,
    /// Inner epochs since the last validation improvement or decay.
    pub best_count: usize,
    pub learning_rate: f32,
    /// `[train_loss, valid_loss]` per inner epoch, append-only.
    pub log: Vec<[f32; 2]>,
    pub oracle: Option<OracleReplay>,
}

impl TrainingState {
    pub fn new(learning_rate: f32, oracle: Option<OracleReplay>) -> Self {
        Self {
            best_loss: f32::INFINITY,
            best_count: 0,
            learning_rate,
            log: Vec::new(),
            oracle,
        }
    }

    pub fn begin_inner_epoch(&mut self) {
        self.best_count += 1;
    }

    /// Appends one log row. Returns true when `valid_loss` is a new best.
    pub fn record(&mut self, train_loss: f32, valid_loss: f32) -> bool {
        self.log.push([train_loss, valid_loss]);
        if valid_loss < self.best_loss {
            self.best_loss = valid_loss;
            self.best_count = 0;
            true
        } else {
            false
        }
    }

    /// Multiplies the learning rate by `decay` once `interval` inner epochs
    /// passed without improvement, never before epoch 2. The rate is floored
    /// at `lr_min`; `Some(rate)` is returned only for a decay above the floor.
    pub fn maybe_decay(
        &mut self,
        epoch: usize,
        decay: f32,
        interval: usize,
        lr_min: f32,
    ) -> Option<f32> {
        if epoch <= 1 || self.best_count < interval {
            return None;
        }
        self.best_count = 0;
        self.learning_rate *= decay;
        if self.learning_rate < lr_min {
            self.learning_rate = lr_min;
            None
        } else {
            info!(learning_rate = self.learning_rate, "learning rate decay");
            Some(self.learning_rate)
        }
    }
}
