//! Gain processor - simple volume control.

use rtdsp_core::{ChannelCount, Frames, Sample, SampleRate};
use rtdsp_processor::{
    AudioBuffer, ParamDescriptor, Processor, ProcessorError, ProcessorInfo, param_or,
};

/// Multi-channel gain/volume processor
///
/// Multiplies every input sample by a gain factor, channel for channel.
///
/// ## Parameter Range
///
/// Gain: 0.0 to 2.0 (linear)
/// - 0.0 = silence (−∞ dB)
/// - 1.0 = unity gain (0 dB, default)
/// - 2.0 = double amplitude (+6 dB)
pub struct GainProcessor {
    channels: ChannelCount,
    info: ProcessorInfo,
}

impl GainProcessor {
    /// Index of the gain parameter
    pub const GAIN: usize = 0;

    pub fn new(channels: ChannelCount) -> Self {
        Self {
            channels,
            info: ProcessorInfo {
                name: "Gain".to_string(),
                vendor: "rtdsp".to_string(),
                version: "1.0.0".to_string(),
                unique_id: "rtdsp.builtin.gain".to_string(),
            },
        }
    }
}

impl Default for GainProcessor {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Processor for GainProcessor {
    fn info(&self) -> &ProcessorInfo {
        &self.info
    }

    fn initialize(
        &mut self,
        _sample_rate: SampleRate,
        _max_block_size: Frames,
    ) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn parameters(&self) -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::new("gain", 0.0, 2.0, 1.0)
                .with_label("Gain")
                .with_step(0.01),
        ]
    }

    fn process(
        &mut self,
        params: &[Sample],
        audio: &mut AudioBuffer,
    ) -> Result<(), ProcessorError> {
        audio.check_layout(self.channels, self.channels)?;
        let gain = param_or(params, Self::GAIN, 1.0);
        let frames = audio.frames;

        for (output, input) in audio.outputs.iter_mut().zip(audio.inputs.iter()) {
            for (out, &sample) in output[..frames].iter_mut().zip(&input[..frames]) {
                *out = sample * gain;
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        // Stateless
    }

    fn input_channels(&self) -> ChannelCount {
        self.channels
    }

    fn output_channels(&self) -> ChannelCount {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gain_declares_one_parameter() {
        let processor = GainProcessor::default();
        let params = processor.parameters();
        assert_eq!(params.len(), 1);
        assert_eq!(params[0].id, "gain");
        assert_eq!(params[0].default, 1.0);
        assert_eq!(params[0].max, 2.0);
    }

    #[test]
    fn test_gain_processing() {
        let mut processor = GainProcessor::default();
        processor.initialize(48000, 512).unwrap();

        // Create test buffers
        let input_l = vec![1.0; 64];
        let input_r = vec![-1.0; 64];
        let mut output_l = vec![0.0; 64];
        let mut output_r = vec![0.0; 64];

        let inputs: Vec<&[f32]> = vec![&input_l, &input_r];
        let mut outputs: Vec<&mut [f32]> = vec![&mut output_l, &mut output_r];

        let mut audio = AudioBuffer {
            inputs: &inputs,
            outputs: &mut outputs,
            frames: 64,
        };

        processor.process(&[0.5], &mut audio).unwrap();

        assert!(output_l.iter().all(|&s| s == 0.5));
        assert!(output_r.iter().all(|&s| s == -0.5));
    }

    #[test]
    fn test_gain_mono() {
        let mut processor = GainProcessor::new(1);
        let input = vec![0.25; 16];
        let mut output = vec![0.0; 16];
        let inputs: Vec<&[f32]> = vec![&input];
        let mut outputs: Vec<&mut [f32]> = vec![&mut output];

        let mut audio = AudioBuffer {
            inputs: &inputs,
            outputs: &mut outputs,
            frames: 16,
        };
        processor.process(&[2.0], &mut audio).unwrap();
        assert!(output.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_gain_rejects_missing_channels() {
        let mut processor = GainProcessor::default();
        let input = vec![0.0; 16];
        let mut output = vec![0.0; 16];
        let inputs: Vec<&[f32]> = vec![&input];
        let mut outputs: Vec<&mut [f32]> = vec![&mut output];

        let mut audio = AudioBuffer {
            inputs: &inputs,
            outputs: &mut outputs,
            frames: 16,
        };
        assert!(matches!(
            processor.process(&[1.0], &mut audio),
            Err(ProcessorError::ChannelMismatch { expected: 2, got: 1 })
        ));
    }
}
