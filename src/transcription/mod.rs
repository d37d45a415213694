//! # Transcription
//!
//! Speech-to-text over Candle's pure-Rust Whisper implementation; no FFI to
//! whisper.cpp. The model is downloaded through hf-hub on first use and
//! loaded once at process startup.
//!
//! ## Components:
//! - **model**: Whisper weights, tokenizer and the greedy decode loop
//! - **engine**: the process-wide transcription service handed to request
//!   handlers, plus the `SpeechToText` trait the HTTP layer depends on

pub mod engine;
pub mod model;

pub use engine::{SpeechToText, TranscriptionEngine};
pub use model::ModelSize;
