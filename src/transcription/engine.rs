//! # Transcription Engine
//!
//! The process-wide speech-to-text service. One `TranscriptionEngine` is
//! constructed at startup with the configured model and language, then
//! injected into request handlers as a shared handle.
//!
//! ## Thread safety:
//! Whisper inference mutates decoder state, so the model sits behind a
//! `tokio::sync::Mutex` and calls are serialized. Handlers stay concurrent
//! everywhere except the inference call itself.

use crate::audio::pcm;
use crate::error::{AppError, AppResult};
use crate::transcription::model::{ModelSize, WhisperModel};
use async_trait::async_trait;
use candle_core::Device;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::info;

/// The seam between the HTTP layer and speech recognition.
///
/// Handlers depend on this trait instead of the concrete engine, which keeps
/// the pipeline testable without model weights.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe a canonical-format audio file to plain text.
    async fn transcribe_file(&self, path: &Path) -> AppResult<String>;
}

/// Whisper-backed implementation of [`SpeechToText`].
pub struct TranscriptionEngine {
    model: Mutex<WhisperModel>,
    language: String,
}

impl TranscriptionEngine {
    /// Load the model and fix the spoken language for the process lifetime.
    pub async fn load(size: ModelSize, device: Device, language: String) -> anyhow::Result<Self> {
        let model = WhisperModel::load(size, device).await?;
        info!(model = %size, language = %language, "Transcription engine ready");

        Ok(Self {
            model: Mutex::new(model),
            language,
        })
    }
}

#[async_trait]
impl SpeechToText for TranscriptionEngine {
    async fn transcribe_file(&self, path: &Path) -> AppResult<String> {
        let samples = pcm::decode_file(path)?;

        // Serialized: the underlying inference call is not safe to share
        let mut model = self.model.lock().await;
        let text = model
            .transcribe(&samples, Some(&self.language))
            .await
            .map_err(|e| AppError::Transcription(e.to_string()))?;

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Handlers hold the engine as a trait object; keep that possible.
    #[test]
    fn speech_to_text_is_object_safe() {
        fn assert_object_safe(_: Option<&dyn SpeechToText>) {}
        assert_object_safe(None);
    }
}
