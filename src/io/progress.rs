use std::path::Path;

/// Events emitted by the separation pipeline and the trainer.
#[derive(Clone, Copy, Debug)]
pub enum Progress<'a> {
    Stage(&'a str),
    Windows {
        done: usize,
        total: usize,
    },
    Epoch {
        epoch: usize,
        total: usize,
    },
    InnerEpoch {
        epoch: usize,
        inner: usize,
        train_loss: f32,
        valid_loss: f32,
    },
    BestValidation {
        loss: f32,
        checkpoint: &'a Path,
    },
    LearningRateDecay {
        learning_rate: f32,
    },
    Oracle {
        loss: f32,
    },
}

pub trait ProgressObserver {
    fn on_progress(&mut self, progress: Progress<'_>);
}

impl<F> ProgressObserver for F
where
    F: FnMut(Progress<'_>),
{
    fn on_progress(&mut self, progress: Progress<'_>) {
        self(progress)
    }
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentProgress;

impl ProgressObserver for SilentProgress {
    fn on_progress(&mut self, _progress: Progress<'_>) {}
}
