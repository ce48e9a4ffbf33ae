use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

pub fn wav_duration_seconds(path: &Path) -> anyhow::Result<f64> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    let duration = frames / spec.sample_rate as f64;
    Ok(duration)
}

/// Wrap raw 16-bit little-endian mono PCM into a WAV file.
pub fn write_pcm_wav(path: &Path, pcm: &[u8], sample_rate: u32) -> anyhow::Result<()> {
    if pcm.len() < 2 {
        anyhow::bail!("no audio samples in response");
    }
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for pair in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([pair[0], pair[1]]))?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_roundtrip_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vo.wav");
        // one second of silence at 22.05 kHz
        let pcm = vec![0u8; 22050 * 2];
        write_pcm_wav(&path, &pcm, 22050).unwrap();
        let dur = wav_duration_seconds(&path).unwrap();
        assert!((dur - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_pcm_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_pcm_wav(&dir.path().join("x.wav"), &[], 22050).is_err());
    }
}
