//! # Audio Handling
//!
//! Everything between the raw upload and the transcriber's input:
//! - **pcm**: decode any supported container to 16 kHz mono f32 samples
//! - **normalizer**: the container-format check and WAV transcoding step

pub mod normalizer;
pub mod pcm;
