pub mod audio;
pub mod dsp;
pub mod padding;
pub mod postprocess;
pub mod reconstruct;
pub mod splitter;
pub mod tiling;
