//! Engine configuration.

use crate::{ChannelCount, Error, Frames, MAX_CHANNELS, Result, SampleRate};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed audio format of an engine instance.
///
/// Set once at construction and never mutated. An invalid configuration is
/// accepted by constructors but rejected by `start` and `compute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sample_rate: SampleRate,
    pub block_size: Frames,
    pub input_channels: ChannelCount,
    pub output_channels: ChannelCount,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 512,
            input_channels: 2,
            output_channels: 2,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn new(
        sample_rate: SampleRate,
        block_size: Frames,
        input_channels: ChannelCount,
        output_channels: ChannelCount,
    ) -> Self {
        Self {
            sample_rate,
            block_size,
            input_channels,
            output_channels,
        }
    }

    /// Check the configuration can drive an engine.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(Error::InvalidConfig(
                "sample rate must be positive".to_string(),
            ));
        }
        if self.block_size == 0 {
            return Err(Error::InvalidConfig(
                "block size must be positive".to_string(),
            ));
        }
        if self.input_channels > MAX_CHANNELS || self.output_channels > MAX_CHANNELS {
            return Err(Error::InvalidConfig(format!(
                "channel counts {}in/{}out exceed the maximum of {MAX_CHANNELS}",
                self.input_channels, self.output_channels
            )));
        }
        Ok(())
    }

    /// Real-time budget for one block (`block_size / sample_rate`).
    ///
    /// Zero for a configuration with a zero sample rate.
    #[must_use]
    pub fn block_duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.block_size as f64 / f64::from(self.sample_rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.block_size, 512);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_sample_rate() {
        let config = EngineConfig::new(0, 512, 2, 2);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_zero_block_size() {
        let config = EngineConfig::new(48000, 0, 2, 2);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_channels_allowed() {
        // A pure generator has no inputs, a pure analyzer no outputs
        assert!(EngineConfig::new(48000, 64, 0, 2).validate().is_ok());
        assert!(EngineConfig::new(48000, 64, 2, 0).validate().is_ok());
    }

    #[test]
    fn test_rejects_too_many_channels() {
        let config = EngineConfig::new(48000, 64, MAX_CHANNELS + 1, 2);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_block_duration() {
        let config = EngineConfig::new(48000, 480, 2, 2);
        assert_eq!(config.block_duration().as_micros(), 10_000);
        assert_eq!(
            EngineConfig::new(0, 480, 2, 2).block_duration(),
            Duration::ZERO
        );
    }
}
