//! # PCM Decoding
//!
//! Decodes an audio file of any supported container/codec to the fixed
//! representation the Whisper runtime consumes: 16 kHz, mono, f32 samples in
//! [-1.0, 1.0]. Multi-channel sources are downmixed by averaging; other
//! sample rates are resampled with a sinc interpolator.

use crate::error::AppError;
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Sample rate expected by the transcriber.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Decode a file to 16 kHz mono f32 PCM.
///
/// The container is probed from content with the file extension as a hint,
/// so a WAV payload with the wrong extension still decodes. Corrupt or
/// unsupported input surfaces as `AppError::AudioDecode`.
pub fn decode_file(path: &Path) -> Result<Vec<f32>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::AudioDecode(format!("cannot open {}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AppError::AudioDecode(format!("probe: {}", e)))?;

    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AppError::AudioDecode("no audio track found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_rate = codec_params
        .sample_rate
        .ok_or_else(|| AppError::AudioDecode("unknown sample rate".to_string()))?;
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AppError::AudioDecode(format!("codec: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(AppError::AudioDecode(format!("packet: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                warn!(error = %e, "Skipping corrupt audio frame");
                continue;
            }
            Err(e) => {
                return Err(AppError::AudioDecode(format!("decode: {}", e)));
            }
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();
        if num_frames == 0 {
            continue;
        }

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        let interleaved = sample_buf.samples();

        if channels > 1 {
            for frame in interleaved.chunks(channels) {
                let mono: f32 = frame.iter().sum::<f32>() / channels as f32;
                samples.push(mono);
            }
        } else {
            samples.extend_from_slice(interleaved);
        }
    }

    if samples.is_empty() {
        return Err(AppError::AudioDecode("no audio samples decoded".to_string()));
    }

    if source_rate != TARGET_SAMPLE_RATE {
        samples = resample(&samples, source_rate, TARGET_SAMPLE_RATE)?;
    }

    debug!(
        samples = samples.len(),
        duration_secs = samples.len() as f32 / TARGET_SAMPLE_RATE as f32,
        source_rate,
        "Audio decoded to 16kHz mono PCM"
    );

    Ok(samples)
}

fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AppError> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
    };

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = to_rate as f64 / from_rate as f64;
    let chunk_size = 1024;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| AppError::AudioDecode(format!("resampler init: {}", e)))?;

    let mut output = Vec::with_capacity((samples.len() as f64 * ratio) as usize + chunk_size);

    for chunk in samples.chunks(chunk_size) {
        let input = if chunk.len() < chunk_size {
            let mut padded = chunk.to_vec();
            padded.resize(chunk_size, 0.0);
            padded
        } else {
            chunk.to_vec()
        };

        let result = resampler
            .process(&[input], None)
            .map_err(|e| AppError::AudioDecode(format!("resample: {}", e)))?;

        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
    }

    // The final padded chunk overshoots; trim back to the expected length
    let expected_len = (samples.len() as f64 * ratio) as usize;
    output.truncate(expected_len);

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Write a sine-tone WAV fixture and return its path.
    fn write_sine_wav(
        dir: &Path,
        name: &str,
        sample_rate: u32,
        channels: u16,
        seconds: f32,
    ) -> std::path::PathBuf {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let path = dir.join(name);
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        let total = (sample_rate as f32 * seconds) as u32;
        for n in 0..total {
            let t = n as f32 / sample_rate as f32;
            let sample = (t * 440.0 * 2.0 * std::f32::consts::PI).sin();
            let value = (sample * i16::MAX as f32 * 0.5) as i16;
            for _ in 0..channels {
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn decodes_16k_mono_wav_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine_wav(dir.path(), "tone.wav", TARGET_SAMPLE_RATE, 1, 1.0);

        let samples = decode_file(&path).unwrap();
        assert_eq!(samples.len(), TARGET_SAMPLE_RATE as usize);
        assert!(samples.iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn resamples_and_downmixes_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_sine_wav(dir.path(), "stereo.wav", 44_100, 2, 2.0);

        let samples = decode_file(&path).unwrap();
        // Duration preserved within codec-rounding tolerance
        let duration = samples.len() as f32 / TARGET_SAMPLE_RATE as f32;
        assert!((duration - 2.0).abs() < 0.05, "duration was {}", duration);
    }

    #[test]
    fn probes_by_content_not_extension() {
        let dir = tempfile::tempdir().unwrap();
        // WAV data behind a misleading extension still decodes
        let path = write_sine_wav(dir.path(), "mislabeled.opus", TARGET_SAMPLE_RATE, 1, 0.5);

        let samples = decode_file(&path).unwrap();
        assert_eq!(samples.len(), TARGET_SAMPLE_RATE as usize / 2);
    }

    #[test]
    fn rejects_zero_byte_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        std::fs::write(&path, b"").unwrap();

        let err = decode_file(&path).unwrap_err();
        assert_eq!(err.kind(), "audio_decode");
    }

    #[test]
    fn rejects_garbage_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noise.mp3");
        std::fs::write(&path, vec![0xAB; 4096]).unwrap();

        assert!(decode_file(&path).is_err());
    }
}
