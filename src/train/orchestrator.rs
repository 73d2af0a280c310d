//! Epoch loop: patch sampling, augmentation, minibatch updates, validation,
//! checkpoint selection and learning-rate decay.

use std::{
    fs,
    path::{Path, PathBuf},
};

use chrono::Local;
use ndarray::{Array1, Array2};
use ndarray_npy::write_npy;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::info;

use crate::{
    core::padding::check_geometry,
    error::{Result, SeparationError},
    io::progress::{Progress, ProgressObserver},
    model::TrainableModel,
    train::{
        augment::{BatchTransform, Mixup, OracleReplay},
        dataset::{create_patches, pair_datasets, split_train_valid, FilePair, PatchSet},
        loss::masked_l1,
        state::TrainingState,
    },
    types::TrainOptions,
};

pub struct Trainer {
    options: TrainOptions,
    rng: StdRng,
    log_path: PathBuf,
}

impl Trainer {
    pub fn new(options: TrainOptions) -> Self {
        let rng = StdRng::seed_from_u64(options.seed);
        let log_path = options
            .log_dir
            .join(Local::now().format("%Y%m%d%H%M%S.npy").to_string());
        Self {
            options,
            rng,
            log_path,
        }
    }

    pub fn options(&self) -> &TrainOptions {
        &self.options
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn check_options(&self, offset: usize) -> Result<()> {
        let o = &self.options;
        if o.batch_size == 0 || o.val_batch_size == 0 {
            return Err(SeparationError::Config("batch sizes must be positive".into()));
        }
        if o.patches == 0 || o.val_patches == 0 || o.inner_epochs == 0 {
            return Err(SeparationError::Config(
                "patches, validation patches and inner epochs must be positive".into(),
            ));
        }
        check_geometry(o.cropsize, offset)
    }

    /// Pairs the dataset directories and splits them, before any audio is
    /// decoded.
    pub fn prepare(&mut self) -> Result<(Vec<FilePair>, Vec<FilePair>)> {
        let pairs = pair_datasets(
            &self.options.mixture_dataset,
            &self.options.instrumental_dataset,
        )?;
        let (train, valid) =
            split_train_valid(pairs, self.options.validation_rate, &mut self.rng)?;
        for pair in &valid {
            info!(
                mixture = %pair.mixture.display(),
                instrumental = %pair.instrumental.display(),
                "validation pair"
            );
        }
        Ok((train, valid))
    }

    pub fn run<M: TrainableModel + ?Sized>(
        &mut self,
        model: &mut M,
        observer: &mut dyn ProgressObserver,
    ) -> Result<TrainingState> {
        self.check_options(model.offset())?;
        let (train_pairs, valid_pairs) = self.prepare()?;

        fs::create_dir_all(&self.options.model_dir)?;
        if let Some(dir) = self.log_path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(
            self.log_path.with_extension("json"),
            serde_json::to_string_pretty(&self.options)?,
        )?;

        observer.on_progress(Progress::Stage("validation_set"));
        let valid = create_patches(
            &valid_pairs,
            self.options.cropsize,
            self.options.val_patches,
            self.options.sample_rate,
            self.options.hop_length,
            true,
            &mut self.rng,
        )?;

        let oracle = if self.options.oracle_rate > 0.0 {
            Some(OracleReplay::new(
                self.options.oracle_rate,
                self.options.oracle_drop_rate,
            )?)
        } else {
            None
        };
        let mut mixup = if self.options.mixup {
            Some(Mixup::new(self.options.mixup_alpha)?)
        } else {
            None
        };
        let mut state = TrainingState::new(self.options.learning_rate, oracle);

        for epoch in 0..self.options.epochs {
            observer.on_progress(Progress::Epoch {
                epoch,
                total: self.options.epochs,
            });
            let mut train = create_patches(
                &train_pairs,
                self.options.cropsize,
                self.options.patches,
                self.options.sample_rate,
                self.options.hop_length,
                false,
                &mut self.rng,
            )?;
            if let Some(mixup) = mixup.as_mut() {
                mixup.apply(&mut train, &mut self.rng)?;
            }
            if let Some(oracle) = state.oracle.as_mut() {
                oracle.apply(&mut train, &mut self.rng)?;
            }

            let mut instance_loss = Array1::<f32>::zeros(train.len());
            for inner in 0..self.options.inner_epochs {
                state.begin_inner_epoch();
                let train_loss =
                    self.train_pass(model, &train, state.learning_rate, &mut instance_loss)?;
                let valid_loss = self.validate(model, &valid)?;
                info!(epoch, inner, train_loss, valid_loss, "inner epoch done");
                observer.on_progress(Progress::InnerEpoch {
                    epoch,
                    inner,
                    train_loss,
                    valid_loss,
                });

                let improved = state.record(train_loss, valid_loss);
                self.write_log(&state.log)?;

                if improved {
                    let checkpoint = self
                        .options
                        .model_dir
                        .join(format!("model_iter{epoch}.npz"));
                    model.save_checkpoint(&checkpoint)?;
                    info!(loss = valid_loss, path = %checkpoint.display(), "best validation loss");
                    observer.on_progress(Progress::BestValidation {
                        loss: valid_loss,
                        checkpoint: checkpoint.as_path(),
                    });
                }
                if let Some(learning_rate) = state.maybe_decay(
                    epoch,
                    self.options.lr_decay,
                    self.options.lr_decay_interval,
                    self.options.lr_min,
                ) {
                    observer.on_progress(Progress::LearningRateDecay { learning_rate });
                }
            }

            if let Some(oracle) = state.oracle.as_mut() {
                instance_loss /= self.options.inner_epochs as f32;
                if let Some(loss) = oracle.collect(&train, &instance_loss, &mut self.rng) {
                    observer.on_progress(Progress::Oracle { loss });
                }
            }
        }

        Ok(state)
    }

    /// One shuffled pass over `set`; returns the example-weighted mean loss
    /// and adds each example's loss into `instance_loss`.
    fn train_pass<M: TrainableModel + ?Sized>(
        &mut self,
        model: &mut M,
        set: &PatchSet,
        learning_rate: f32,
        instance_loss: &mut Array1<f32>,
    ) -> Result<f32> {
        let mut perm: Vec<usize> = (0..set.len()).collect();
        perm.shuffle(&mut self.rng);

        let mut sum_loss = 0.0;
        for chunk in perm.chunks(self.options.batch_size) {
            let batch = set.select(chunk);
            let mask = model.forward(batch.mixture.view())?;
            let l = masked_l1(batch.mixture.view(), mask.view(), batch.instrumental.view())?;
            model.backward(l.grad_mask.view(), learning_rate)?;

            for (&i, &v) in chunk.iter().zip(l.instance_loss.iter()) {
                instance_loss[i] += v;
            }
            sum_loss += l.loss * chunk.len() as f32;
        }
        Ok(sum_loss / set.len().max(1) as f32)
    }

    fn validate<M: TrainableModel + ?Sized>(&self, model: &mut M, set: &PatchSet) -> Result<f32> {
        let mut sum_loss = 0.0;
        let indices: Vec<usize> = (0..set.len()).collect();
        for chunk in indices.chunks(self.options.val_batch_size) {
            let batch = set.select(chunk);
            let mask = model.predict(batch.mixture.view())?;
            let l = masked_l1(batch.mixture.view(), mask.view(), batch.instrumental.view())?;
            sum_loss += l.loss * chunk.len() as f32;
        }
        Ok(sum_loss / set.len().max(1) as f32)
    }

    fn write_log(&self, log: &[[f32; 2]]) -> Result<()> {
        let rows = Array2::from_shape_vec((log.len(), 2), log.concat())?;
        write_npy(&self.log_path, &rows)?;
        Ok(())
    }
}

/// Convenience wrapper: builds a [`Trainer`] and runs it.
pub fn train<M: TrainableModel + ?Sized>(
    options: TrainOptions,
    model: &mut M,
    observer: &mut dyn ProgressObserver,
) -> Result<TrainingState> {
    Trainer::new(options).run(model, observer)
}
