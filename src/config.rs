//! # Configuration Management
//!
//! Loads application configuration from three layered sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix, plus bare HOST/PORT overrides
//!   for deployment platforms)
//!
//! The spoken language, webhook address, model variant and scratch directory
//! are all configuration, so deployments can change them without a rebuild.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub pipeline: PipelineConfig,
    pub dialogue: DialogueConfig,
}

/// HTTP server bind settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Speech model selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Whisper variant to load at startup (tiny, base, small, medium, large)
    pub whisper_model: String,

    /// Compute device preference (auto, cpu, cuda, metal)
    pub device: String,
}

/// Audio pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// ISO 639-1 code for the spoken language; no auto-detection
    pub language: String,

    /// Scratch directory for uploaded and normalized audio.
    /// Must exist and be writable; the server does not create it.
    pub scratch_dir: String,

    /// Reject uploads larger than this many bytes
    pub max_upload_bytes: usize,
}

/// Dialogue engine webhook settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    /// Full webhook URL the transcript is POSTed to
    pub webhook_url: String,

    /// Fixed sender identity placed in every outbound message
    pub sender: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            models: ModelsConfig {
                whisper_model: "large".to_string(),
                device: "auto".to_string(),
            },
            pipeline: PipelineConfig {
                language: "fr".to_string(),
                scratch_dir: "./audio".to_string(),
                max_upload_bytes: 50 * 1024 * 1024,
            },
            dialogue: DialogueConfig {
                webhook_url: "http://localhost:5005/webhooks/rest/webhook".to_string(),
                sender: "user".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration in priority order: defaults, then config.toml,
    /// then `APP_*` environment variables, then bare HOST/PORT.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        // Deployment platforms commonly inject these without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Reject configurations that cannot serve a single request.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.pipeline.language.is_empty() {
            return Err(anyhow::anyhow!("Transcription language cannot be empty"));
        }

        if self.pipeline.scratch_dir.is_empty() {
            return Err(anyhow::anyhow!("Scratch directory cannot be empty"));
        }

        if self.pipeline.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        if !self.dialogue.webhook_url.starts_with("http") {
            return Err(anyhow::anyhow!(
                "Dialogue webhook URL must be an http(s) address, got '{}'",
                self.dialogue.webhook_url
            ));
        }

        Ok(())
    }

    /// Apply a partial update from a JSON document, then re-validate.
    ///
    /// Only the fields present in the JSON are touched, so a client can send
    /// just `{"pipeline": {"language": "en"}}` to switch languages.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = port as u16;
            }
        }

        if let Some(models) = partial.get("models") {
            if let Some(whisper) = models.get("whisper_model").and_then(|v| v.as_str()) {
                self.models.whisper_model = whisper.to_string();
            }
            if let Some(device) = models.get("device").and_then(|v| v.as_str()) {
                self.models.device = device.to_string();
            }
        }

        if let Some(pipeline) = partial.get("pipeline") {
            if let Some(language) = pipeline.get("language").and_then(|v| v.as_str()) {
                self.pipeline.language = language.to_string();
            }
            if let Some(dir) = pipeline.get("scratch_dir").and_then(|v| v.as_str()) {
                self.pipeline.scratch_dir = dir.to_string();
            }
            if let Some(max) = pipeline.get("max_upload_bytes").and_then(|v| v.as_u64()) {
                self.pipeline.max_upload_bytes = max as usize;
            }
        }

        if let Some(dialogue) = partial.get("dialogue") {
            if let Some(url) = dialogue.get("webhook_url").and_then(|v| v.as_str()) {
                self.dialogue.webhook_url = url.to_string();
            }
            if let Some(sender) = dialogue.get("sender").and_then(|v| v.as_str()) {
                self.dialogue.sender = sender.to_string();
            }
        }

        self.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pipeline.language, "fr");
        assert_eq!(config.dialogue.sender, "user");
        assert!(config.dialogue.webhook_url.ends_with("/webhooks/rest/webhook"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.language.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.dialogue.webhook_url = "not-a-url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_update() {
        let mut config = AppConfig::default();
        let json = r#"{"pipeline": {"language": "en"}, "dialogue": {"sender": "kiosk-3"}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.pipeline.language, "en");
        assert_eq!(config.dialogue.sender, "kiosk-3");
        // Untouched fields keep their values
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.pipeline.scratch_dir, "./audio");
    }

    #[test]
    fn test_update_rejects_invalid_result() {
        let mut config = AppConfig::default();
        let json = r#"{"dialogue": {"webhook_url": "ftp://nope"}}"#;
        assert!(config.update_from_json(json).is_err());
    }
}
