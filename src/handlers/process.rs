//! # Audio Processing Endpoint
//!
//! `POST /process-audio/` runs the whole pipeline for one upload:
//!
//! 1. **Ingress** — read the multipart `file` field into scratch space
//! 2. **Normalizer** — transcode to WAV unless the upload already is one
//! 3. **Transcriber** — speech-to-text in the configured language
//! 4. **Dispatcher** — POST the transcript to the dialogue webhook
//!
//! Success returns `{"transcription", "action"}`. Any stage failure maps to
//! its taxonomy status via [`AppError`]. Scratch files are guards, so both
//! paths leave the scratch directory clean.

use crate::audio::normalizer;
use crate::dialogue::DialogueClient;
use crate::error::AppError;
use crate::scratch::ScratchFile;
use crate::state::AppState;
use crate::transcription::SpeechToText;
use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use serde_json::json;
use std::path::Path;
use tracing::info;

/// Multipart form field carrying the audio payload.
const UPLOAD_FIELD: &str = "file";

pub async fn process_audio(
    state: web::Data<AppState>,
    transcriber: web::Data<dyn SpeechToText>,
    dialogue: web::Data<DialogueClient>,
    payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    let (bytes, filename) = read_upload(payload, config.pipeline.max_upload_bytes).await?;

    // Scratch names come from a request-scoped UUID; only the extension is
    // taken from the client filename, to drive the format check below
    let extension = Path::new(&filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin")
        .to_lowercase();

    let raw = ScratchFile::allocate(Path::new(&config.pipeline.scratch_dir), &extension);
    tokio::fs::write(raw.path(), &bytes)
        .await
        .map_err(|e| AppError::Upload(format!("cannot write {}: {}", raw.path().display(), e)))?;

    // The only branch in the pipeline: convert unless already canonical
    let normalized = if normalizer::is_canonical(raw.path()) {
        None
    } else {
        let wav = raw.sibling(normalizer::CANONICAL_EXTENSION);
        normalizer::convert_to_wav(raw.path(), wav.path())?;
        Some(wav)
    };

    let wav_path = normalized.as_ref().map(|s| s.path()).unwrap_or(raw.path());

    let transcription = transcriber.transcribe_file(wav_path).await?;

    info!(
        filename = %filename,
        transcript_chars = transcription.len(),
        "Transcription complete, dispatching to dialogue engine"
    );

    let action = dialogue.dispatch(&transcription).await?;

    state.record_transcription(wav_duration_seconds(wav_path));

    Ok(HttpResponse::Ok().json(json!({
        "transcription": transcription,
        "action": action
    })))
}

/// Pull the upload field out of the multipart stream, enforcing the size cap
/// while reading.
async fn read_upload(
    mut payload: Multipart,
    max_bytes: usize,
) -> Result<(Vec<u8>, String), AppError> {
    let mut audio_data: Option<Vec<u8>> = None;
    let mut filename: Option<String> = None;

    while let Some(item) = payload.next().await {
        let mut field =
            item.map_err(|e| AppError::BadRequest(format!("multipart error: {}", e)))?;

        let content_disposition = field
            .content_disposition()
            .ok_or_else(|| AppError::BadRequest("missing content disposition".to_string()))?;

        let field_name = content_disposition
            .get_name()
            .ok_or_else(|| AppError::BadRequest("missing field name".to_string()))?;

        if field_name != UPLOAD_FIELD {
            continue;
        }

        filename = content_disposition.get_filename().map(|s| s.to_string());

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::BadRequest(format!("chunk error: {}", e)))?;
            if bytes.len() + chunk.len() > max_bytes {
                return Err(AppError::BadRequest(format!(
                    "file too large (max {} bytes)",
                    max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        audio_data = Some(bytes);
    }

    let bytes = audio_data
        .ok_or_else(|| AppError::BadRequest(format!("no '{}' field in upload", UPLOAD_FIELD)))?;
    let filename = filename.unwrap_or_else(|| "upload.bin".to_string());

    Ok((bytes, filename))
}

/// Audio duration for the pipeline metrics; zero if the header is unreadable.
fn wav_duration_seconds(path: &Path) -> f64 {
    hound::WavReader::open(path)
        .map(|r| r.duration() as f64 / r.spec().sample_rate as f64)
        .unwrap_or(0.0)
}
