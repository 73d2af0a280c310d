//! Training orchestrator for [`TrainableModel`](crate::model::TrainableModel)s.

pub mod augment;
pub mod dataset;
pub mod loss;
pub mod orchestrator;
pub mod state;

pub use augment::{BatchTransform, Mixup, OracleReplay};
pub use dataset::{create_patches, pair_datasets, split_train_valid, FilePair, PatchSet};
pub use loss::{crop_to, masked_l1, MaskedL1};
pub use orchestrator::{train, Trainer};
pub use state::TrainingState;
