//! WAV file I/O for offline rendering.

use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Decoded WAV contents, one `Vec` per channel
pub struct WavData {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl WavData {
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }
}

/// Read any float or 16/24/32-bit integer WAV file as f32.
///
/// Integer samples are scaled by 2^(bits - 1), so they land in [-1, 1].
pub fn read_wav(path: &Path) -> Result<WavData> {
    let mut reader = WavReader::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;

    let spec = reader.spec();
    tracing::info!(
        "Input format: {} Hz, {} channels, {} bits, {:?}",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample,
        spec.sample_format
    );

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read float samples")?,
        SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|sample| f32::from(sample) / 32_768.0)) // 2^15
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read 16-bit samples")?,
            24 => {
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|sample| sample as f32 / 8_388_608.0)) // 2^23
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read 24-bit samples")?
            }
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|sample| sample as f32 / 2_147_483_648.0)) // 2^31
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read 32-bit samples")?,
            bits => anyhow::bail!("Unsupported bit depth: {bits}"),
        },
    };

    let channels = deinterleave(&samples, usize::from(spec.channels));
    Ok(WavData {
        sample_rate: spec.sample_rate,
        channels,
    })
}

/// Write channels as a 32-bit float WAV file.
pub fn write_wav(path: &Path, sample_rate: u32, channels: &[Vec<f32>]) -> Result<()> {
    let spec = WavSpec {
        channels: u16::try_from(channels.len()).context("Too many output channels")?,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;

    for sample in interleave(channels) {
        writer
            .write_sample(sample)
            .context("Failed to write float sample")?;
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(())
}

/// Split interleaved samples into channels; a trailing partial frame is dropped.
pub fn deinterleave(samples: &[f32], channel_count: usize) -> Vec<Vec<f32>> {
    if channel_count == 0 {
        return Vec::new();
    }
    let mut channels = vec![Vec::with_capacity(samples.len() / channel_count); channel_count];
    for frame in samples.chunks_exact(channel_count) {
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }
    channels
}

/// Interleave channels frame by frame; shorter channels are padded with silence.
pub fn interleave(channels: &[Vec<f32>]) -> Vec<f32> {
    let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
    let mut samples = Vec::with_capacity(frames * channels.len());
    for frame in 0..frames {
        for channel in channels {
            samples.push(channel.get(frame).copied().unwrap_or(0.0));
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave() {
        let channels = deinterleave(&[1.0, 2.0, 3.0, 4.0, 5.0], 2);
        assert_eq!(channels, vec![vec![1.0, 3.0], vec![2.0, 4.0]]);
        assert!(deinterleave(&[1.0], 0).is_empty());
    }

    #[test]
    fn test_interleave_pads_short_channels() {
        let samples = interleave(&[vec![1.0, 3.0], vec![2.0]]);
        assert_eq!(samples, vec![1.0, 2.0, 3.0, 0.0]);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        let channels = vec![vec![0.5, -0.5, 0.25], vec![0.0, 1.0, -1.0]];

        write_wav(&path, 22050, &channels).unwrap();
        let data = read_wav(&path).unwrap();
        assert_eq!(data.sample_rate, 22050);
        assert_eq!(data.frames(), 3);
        assert_eq!(data.channels, channels);
    }

    #[test]
    fn test_read_32_bit_stays_in_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int32.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        writer.write_sample(i32::MIN).unwrap();
        writer.write_sample(i32::MAX).unwrap();
        writer.finalize().unwrap();

        let data = read_wav(&path).unwrap();
        assert_eq!(data.channels[0][0], -1.0);
        assert!(data.channels[0][1] <= 1.0);
    }

    #[test]
    fn test_read_16_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("int.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        writer.write_sample(i16::MIN).unwrap();
        writer.write_sample(16_384_i16).unwrap();
        writer.write_sample(0_i16).unwrap();
        writer.finalize().unwrap();

        let data = read_wav(&path).unwrap();
        assert_eq!(data.channels, vec![vec![-1.0, 0.5, 0.0]]);
    }
}
