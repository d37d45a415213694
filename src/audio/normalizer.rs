//! # Audio Normalizer
//!
//! Guarantees the transcriber only ever sees canonical-format audio: a PCM
//! WAV container at 16 kHz mono. Uploads that already carry the canonical
//! extension pass through untouched; everything else is decoded with
//! symphonia and re-encoded with hound.

use crate::audio::pcm;
use crate::error::AppError;
use std::path::Path;
use tracing::info;

/// Extension of the canonical audio container.
pub const CANONICAL_EXTENSION: &str = "wav";

/// True if the path already carries the canonical container extension.
///
/// This mirrors the ingress contract: the decision is made on the filename,
/// not the content. A mislabeled file will go through conversion, which is
/// harmless, or fail decoding, which is the right error anyway.
pub fn is_canonical(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(CANONICAL_EXTENSION))
        .unwrap_or(false)
}

/// Transcode `input` into a 16 kHz mono 16-bit PCM WAV at `output`.
///
/// Duration is preserved by the resampler, so the output plays for the same
/// time as the source within rounding tolerance.
pub fn convert_to_wav(input: &Path, output: &Path) -> Result<(), AppError> {
    let samples = pcm::decode_file(input)?;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: pcm::TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(output, spec)
        .map_err(|e| AppError::AudioDecode(format!("cannot create {}: {}", output.display(), e)))?;

    for sample in &samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        writer
            .write_sample(value)
            .map_err(|e| AppError::AudioDecode(format!("wav write: {}", e)))?;
    }

    writer
        .finalize()
        .map_err(|e| AppError::AudioDecode(format!("wav finalize: {}", e)))?;

    info!(
        input = %input.display(),
        output = %output.display(),
        samples = samples.len(),
        "Normalized audio to canonical WAV"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn write_sine_wav(path: &Path, sample_rate: u32, channels: u16, seconds: f32) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let total = (sample_rate as f32 * seconds) as u32;
        for n in 0..total {
            let t = n as f32 / sample_rate as f32;
            let value = ((t * 330.0 * 2.0 * std::f32::consts::PI).sin() * 12_000.0) as i16;
            for _ in 0..channels {
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn canonical_check_is_extension_based() {
        assert!(is_canonical(&PathBuf::from("/tmp/a.wav")));
        assert!(is_canonical(&PathBuf::from("/tmp/a.WAV")));
        assert!(!is_canonical(&PathBuf::from("/tmp/a.mp3")));
        assert!(!is_canonical(&PathBuf::from("/tmp/noext")));
    }

    #[test]
    fn converts_non_canonical_input_preserving_duration() {
        let dir = tempfile::tempdir().unwrap();
        // 44.1kHz stereo content behind a non-canonical extension
        let input = dir.path().join("upload.audio");
        write_sine_wav(&input, 44_100, 2, 1.5);
        let output = dir.path().join("upload.wav");

        convert_to_wav(&input, &output).unwrap();

        let reader = hound::WavReader::open(&output).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, pcm::TARGET_SAMPLE_RATE);

        let duration = reader.duration() as f32 / spec.sample_rate as f32;
        assert!((duration - 1.5).abs() < 0.05, "duration was {}", duration);
    }

    #[test]
    fn conversion_fails_on_corrupt_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("corrupt.mp3");
        std::fs::write(&input, vec![0x11; 2048]).unwrap();
        let output = dir.path().join("corrupt.wav");

        let err = convert_to_wav(&input, &output).unwrap_err();
        assert_eq!(err.kind(), "audio_decode");
    }
}
