//! Built-in audio processors.
//!
//! These are simple, essential processors implemented directly in Rust.
//! They implement the same `Processor` interface any other DSP program
//! would, and can be named from patch files through [`BuiltinKind`].

pub mod gain;
pub mod lowpass;
pub mod pan;
pub mod sine;

use rtdsp_core::ChannelCount;
use rtdsp_processor::Processor;
use serde::{Deserialize, Serialize};

const fn stereo() -> ChannelCount {
    2
}

/// Serializable description of a built-in processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinKind {
    Gain {
        #[serde(default = "stereo")]
        channels: ChannelCount,
    },
    Pan,
    Sine,
    Lowpass {
        #[serde(default = "stereo")]
        channels: ChannelCount,
    },
}

impl BuiltinKind {
    /// Instantiate the processor.
    pub fn create(self) -> Box<dyn Processor> {
        match self {
            Self::Gain { channels } => Box::new(gain::GainProcessor::new(channels)),
            Self::Pan => Box::new(pan::PanProcessor::default()),
            Self::Sine => Box::new(sine::SineOscillator::default()),
            Self::Lowpass { channels } => Box::new(lowpass::LowpassFilter::new(channels)),
        }
    }

    /// Parse a short name (`gain`, `pan`, `sine`, `lowpass`), stereo where applicable.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "gain" => Some(Self::Gain {
                channels: stereo(),
            }),
            "pan" => Some(Self::Pan),
            "sine" => Some(Self::Sine),
            "lowpass" => Some(Self::Lowpass {
                channels: stereo(),
            }),
            _ => None,
        }
    }
}

/// Create a built-in processor by name
///
/// Returns `None` if the name doesn't match any known built-in processor.
///
/// # Examples
///
/// ```
/// use rtdsp_audio::builtin;
///
/// let gain = builtin::create_builtin("gain").expect("gain processor exists");
/// assert_eq!(gain.input_channels(), 2);
/// ```
pub fn create_builtin(name: &str) -> Option<Box<dyn Processor>> {
    BuiltinKind::from_name(name).map(BuiltinKind::create)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_each_builtin() {
        for name in ["gain", "pan", "sine", "lowpass"] {
            let processor = create_builtin(name);
            assert!(processor.is_some(), "missing builtin {name}");
        }
    }

    #[test]
    fn test_unknown_builtin() {
        let processor = create_builtin("nonexistent");
        assert!(processor.is_none());
    }

    #[test]
    fn test_channel_layouts() {
        let sine = BuiltinKind::Sine.create();
        assert_eq!((sine.input_channels(), sine.output_channels()), (0, 1));

        let gain = BuiltinKind::Gain { channels: 1 }.create();
        assert_eq!((gain.input_channels(), gain.output_channels()), (1, 1));

        let lowpass = BuiltinKind::Lowpass { channels: 4 }.create();
        assert_eq!(lowpass.output_channels(), 4);
    }

    #[test]
    fn test_kind_ron_roundtrip() {
        let kind: BuiltinKind = ron::from_str("Gain(channels: 1)").unwrap();
        assert_eq!(kind, BuiltinKind::Gain { channels: 1 });
        let kind: BuiltinKind = ron::from_str("Sine").unwrap();
        assert_eq!(kind, BuiltinKind::Sine);
    }
}
