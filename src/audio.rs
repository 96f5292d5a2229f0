use crate::interface::RenderError;
use hound::WavReader;
use std::path::Path;

pub fn wav_duration_seconds(path: &Path) -> Result<f64, RenderError> {
    let reader = WavReader::open(path)
        .map_err(|e| RenderError::Encoding(format!("unreadable WAV {}: {e}", path.display())))?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    let duration = frames / spec.sample_rate as f64;
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    #[test]
    fn duration_counts_frames_not_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..22050 {
            writer.write_sample(0i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let duration = wav_duration_seconds(&path).unwrap();
        assert!((duration - 1.0).abs() < 1e-9);
    }

    #[test]
    fn missing_file_is_an_encoding_error() {
        let err = wav_duration_seconds(Path::new("/nonexistent/slide.wav")).unwrap_err();
        assert!(matches!(err, RenderError::Encoding(_)));
    }
}
