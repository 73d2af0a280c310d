pub mod mask_image;
pub mod progress;
