//! # Whisper Model
//!
//! Loads Whisper weights from HuggingFace via hf-hub and runs greedy
//! decoding with temperature fallback. Input is always 16 kHz mono f32 PCM;
//! output is the plain transcript text.
//!
//! ## Loading process:
//! 1. Download config, tokenizer and safetensors weights (cached locally)
//! 2. Build the model on the selected device
//! 3. Run a short silence through it to confirm it decodes

use anyhow::{anyhow, Result};
use candle_core::{Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use tokenizers::Tokenizer;
use tracing::{debug, info};

/// Whisper model variants, ordered by size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    /// HuggingFace repository holding this variant's weights.
    pub fn repo_name(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "openai/whisper-tiny",
            ModelSize::Base => "openai/whisper-base",
            ModelSize::Small => "openai/whisper-small",
            ModelSize::Medium => "openai/whisper-medium",
            ModelSize::Large => "openai/whisper-large-v2",
        }
    }

    /// Approximate weight size, for startup logging.
    pub fn size_mb(&self) -> u32 {
        match self {
            ModelSize::Tiny => 39,
            ModelSize::Base => 74,
            ModelSize::Small => 244,
            ModelSize::Medium => 769,
            ModelSize::Large => 1550,
        }
    }
}

impl std::str::FromStr for ModelSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            _ => Err(anyhow!("Unknown model size: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        };
        write!(f, "{}", name)
    }
}

/// A loaded Whisper model ready for inference.
///
/// Inference mutates decoder state, so `transcribe` takes `&mut self`; the
/// engine serializes access behind a mutex.
pub struct WhisperModel {
    model: m::model::Whisper,
    config: Config,
    device: Device,
    size: ModelSize,
    tokenizer: Tokenizer,
    mel_filters: Vec<f32>,
}

impl WhisperModel {
    /// Download (if needed) and load a Whisper variant onto `device`.
    pub async fn load(size: ModelSize, device: Device) -> Result<Self> {
        info!(model = %size, size_mb = size.size_mb(), "Loading Whisper model");
        let start_time = std::time::Instant::now();

        let api = Self::hub_api()?;
        let repo = api.model(size.repo_name().to_string());

        let config_filename = repo
            .get("config.json")
            .await
            .map_err(|e| anyhow!("Failed to download config.json from {}: {}", size.repo_name(), e))?;
        let tokenizer_filename = repo
            .get("tokenizer.json")
            .await
            .map_err(|e| anyhow!("Failed to download tokenizer.json from {}: {}", size.repo_name(), e))?;
        let model_filename = repo
            .get("model.safetensors")
            .await
            .map_err(|e| anyhow!("Failed to download model weights from {}: {}", size.repo_name(), e))?;

        let config: Config = serde_json::from_reader(std::fs::File::open(config_filename)?)?;

        let tokenizer = Tokenizer::from_file(tokenizer_filename)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        let mel_filters = Self::mel_filter_bank(&config);

        let vb = if model_filename.to_string_lossy().ends_with(".safetensors") {
            unsafe { VarBuilder::from_mmaped_safetensors(&[model_filename], m::DTYPE, &device)? }
        } else {
            return Err(anyhow!("Only safetensors weight format is supported"));
        };

        let model = m::model::Whisper::load(&vb, config.clone())?;

        info!(
            model = %size,
            elapsed_secs = format!("{:.2}", start_time.elapsed().as_secs_f64()),
            "Whisper model loaded"
        );

        let mut whisper = Self {
            model,
            config,
            device,
            size,
            tokenizer,
            mel_filters,
        };

        whisper.validate().await?;

        Ok(whisper)
    }

    /// Build the hf-hub client, honoring HF_TOKEN and cache overrides.
    fn hub_api() -> Result<hf_hub::api::tokio::Api> {
        use hf_hub::api::tokio::ApiBuilder;

        let mut builder = ApiBuilder::new().with_progress(false);

        builder = builder.with_token(std::env::var("HF_TOKEN").ok());

        if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
            builder = builder.with_cache_dir(cache_dir.into());
        } else if let Ok(hf_home) = std::env::var("HF_HOME") {
            builder = builder.with_cache_dir(std::path::PathBuf::from(hf_home).join("hub"));
        }

        builder
            .build()
            .map_err(|e| anyhow!("Failed to create HuggingFace API client: {}", e))
    }

    /// Triangular mel filter bank sized to the model configuration.
    fn mel_filter_bank(config: &Config) -> Vec<f32> {
        let n_fft = 400; // standard for 16kHz Whisper
        let n_mels = config.num_mel_bins as usize;
        let mut filters = vec![0.0f32; n_fft * n_mels];

        for i in 0..n_mels {
            let center = (i + 1) * n_fft / (n_mels + 1);
            let width = n_fft / (n_mels + 1);
            for j in center.saturating_sub(width)..=(center + width).min(n_fft - 1) {
                let distance = (j as i32 - center as i32).abs() as f32;
                filters[i * n_fft + j] = (1.0 - distance / width as f32).max(0.0);
            }
        }

        filters
    }

    /// Convert 16 kHz mono PCM to the log-mel tensor the encoder expects.
    fn pcm_to_mel(&self, pcm_data: &[f32]) -> Result<Tensor> {
        // Whisper operates on fixed 30-second windows
        let target_len = 30 * 16_000;
        let mut padded = vec![0.0f32; target_len];
        let copy_len = pcm_data.len().min(target_len);
        padded[..copy_len].copy_from_slice(&pcm_data[..copy_len]);

        let n_mels = self.config.num_mel_bins as usize;
        let n_frames = 3000; // frame count for a 30s window

        let n_fft = 400;
        let mut mel_data = vec![0.0f32; n_mels * n_frames];
        let frame_size = padded.len() / n_frames;

        for frame in 0..n_frames {
            let start = frame * frame_size;
            let end = (start + frame_size).min(padded.len());
            let window = &padded[start..end];

            for mel_bin in 0..n_mels {
                let filter = &self.mel_filters[mel_bin * n_fft..(mel_bin + 1) * n_fft];
                let mut energy = 0.0f32;
                for (i, sample) in window.iter().enumerate() {
                    energy += sample.abs() * filter[i % n_fft];
                }
                // -80 dB floor
                mel_data[mel_bin * n_frames + frame] =
                    (energy / frame_size as f32).ln().max(-11.5129);
            }
        }

        Ok(Tensor::from_vec(mel_data, (n_mels, n_frames), &self.device)?)
    }

    /// Transcribe 16 kHz mono PCM to text.
    ///
    /// `language` is an ISO 639-1 hint; unknown codes fall back to the
    /// model's default behavior.
    pub async fn transcribe(&mut self, audio_data: &[f32], language: Option<&str>) -> Result<String> {
        let start_time = std::time::Instant::now();

        if audio_data.is_empty() {
            return Err(anyhow!("Audio data is empty"));
        }

        let mel = self.pcm_to_mel(audio_data)?;
        let mel = mel.unsqueeze(0)?; // batch dimension

        let encoder_output = self.model.encoder.forward(&mel, false)?;

        let mut tokens = vec![self.sot_token()];
        if let Some(lang) = language {
            if let Some(lang_token) = self.language_token(lang) {
                tokens.push(lang_token);
            }
        }
        tokens.push(self.transcribe_token());
        let prefix_len = tokens.len();

        let mut output_tokens = Vec::new();

        const MAX_TOKENS: usize = 200;
        const TEMPERATURES: &[f32] = &[0.0, 0.2, 0.4, 0.6, 0.8, 1.0];

        for &temperature in TEMPERATURES {
            tokens.truncate(prefix_len);
            output_tokens.clear();

            let mut decode_success = true;

            for _ in 0..MAX_TOKENS {
                let token_tensor = Tensor::new(&tokens[..], &self.device)?.unsqueeze(0)?;
                let logits = self.model.decoder.forward(&token_tensor, &encoder_output, false)?;
                let last_logits = logits.i((.., tokens.len() - 1, ..))?;

                let next_token = if temperature > 0.0 {
                    self.sample_token(&last_logits, temperature)?
                } else {
                    last_logits.argmax_keepdim(1)?.to_scalar::<u32>()?
                };

                if next_token == self.eot_token() {
                    break;
                }

                if Self::is_repetitive(&output_tokens, next_token) {
                    decode_success = false;
                    break;
                }

                tokens.push(next_token);
                output_tokens.push(next_token);
            }

            if decode_success && !output_tokens.is_empty() {
                break;
            }
        }

        let text = self.decode_tokens(&output_tokens)?;

        debug!(
            model = %self.size,
            audio_secs = format!("{:.2}", audio_data.len() as f64 / 16_000.0),
            elapsed_secs = format!("{:.2}", start_time.elapsed().as_secs_f64()),
            "Transcription finished"
        );

        Ok(text)
    }

    /// Run a second of silence through the model to confirm it decodes.
    async fn validate(&mut self) -> Result<()> {
        let test_audio = vec![0.0f32; 16_000];
        let result = self.transcribe(&test_audio, None).await?;
        debug!(result = %result, "Model validation pass complete");
        Ok(())
    }

    fn sot_token(&self) -> u32 {
        50258
    }

    fn eot_token(&self) -> u32 {
        50257
    }

    fn transcribe_token(&self) -> u32 {
        50359
    }

    fn language_token(&self, language: &str) -> Option<u32> {
        match language.to_lowercase().as_str() {
            "en" | "english" => Some(50259),
            "zh" | "chinese" => Some(50260),
            "de" | "german" => Some(50261),
            "es" | "spanish" => Some(50262),
            "ru" | "russian" => Some(50263),
            "ko" | "korean" => Some(50264),
            "fr" | "french" => Some(50265),
            "ja" | "japanese" => Some(50266),
            "pt" | "portuguese" => Some(50267),
            "it" | "italian" => Some(50274),
            _ => None,
        }
    }

    fn sample_token(&self, logits: &Tensor, temperature: f32) -> Result<u32> {
        let temp_tensor = Tensor::from_vec(vec![temperature], (1,), &self.device)?;
        let logits = logits.broadcast_div(&temp_tensor)?;
        let probs = candle_nn::ops::softmax_last_dim(&logits)?;
        let token = probs.argmax_keepdim(1)?.to_scalar::<u32>()?;
        Ok(token)
    }

    /// Detect immediate or short-cycle token repetition, which signals a
    /// degenerate decode worth retrying at a higher temperature.
    fn is_repetitive(tokens: &[u32], new_token: u32) -> bool {
        if tokens.len() >= 3 && tokens[tokens.len() - 3..] == [new_token, new_token, new_token] {
            return true;
        }

        if tokens.len() >= 6 {
            let last_3 = &tokens[tokens.len() - 3..];
            let prev_3 = &tokens[tokens.len() - 6..tokens.len() - 3];
            if last_3 == prev_3 {
                return true;
            }
        }

        false
    }

    fn decode_tokens(&self, tokens: &[u32]) -> Result<String> {
        let text = self
            .tokenizer
            .decode(tokens, true)
            .map_err(|e| anyhow!("Tokenizer decode error: {}", e))?;

        let cleaned = text
            .replace("<|startoftranscript|>", "")
            .replace("<|endoftext|>", "")
            .replace("<|notimestamps|>", "");

        Ok(cleaned.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_size_parsing() {
        assert_eq!("large".parse::<ModelSize>().unwrap(), ModelSize::Large);
        assert_eq!("TINY".parse::<ModelSize>().unwrap(), ModelSize::Tiny);
        assert!("huge".parse::<ModelSize>().is_err());
    }

    #[test]
    fn test_repo_names() {
        assert_eq!(ModelSize::Large.repo_name(), "openai/whisper-large-v2");
        assert_eq!(ModelSize::Base.repo_name(), "openai/whisper-base");
    }

    #[test]
    fn test_repetition_detection() {
        assert!(WhisperModel::is_repetitive(&[5, 7, 7, 7], 7));
        assert!(WhisperModel::is_repetitive(&[1, 2, 3, 1, 2, 3], 9));
        assert!(!WhisperModel::is_repetitive(&[1, 2, 3], 4));
        assert!(!WhisperModel::is_repetitive(&[], 4));
    }
}
