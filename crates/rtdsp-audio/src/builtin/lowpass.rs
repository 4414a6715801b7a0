//! One-pole lowpass filter.

use rtdsp_core::{ChannelCount, Frames, Sample, SampleRate};
use rtdsp_processor::{
    AudioBuffer, ParamDescriptor, Processor, ProcessorError, ProcessorInfo, param_or,
};
use std::f32::consts::TAU;

/// Multi-channel one-pole lowpass: `y[n] = y[n-1] + a * (x[n] - y[n-1])`
///
/// The coefficient is recomputed once per block from the snapshotted
/// cutoff. Cutoff is held below 0.45 × sample rate.
pub struct LowpassFilter {
    /// Previous output per channel
    state: Vec<Sample>,
    sample_rate: f32,
    info: ProcessorInfo,
}

impl LowpassFilter {
    pub const CUTOFF: usize = 0;

    pub fn new(channels: ChannelCount) -> Self {
        Self {
            state: vec![0.0; channels],
            sample_rate: 44100.0,
            info: ProcessorInfo {
                name: "Lowpass".to_string(),
                vendor: "rtdsp".to_string(),
                version: "1.0.0".to_string(),
                unique_id: "rtdsp.builtin.lowpass".to_string(),
            },
        }
    }

    fn coefficient(&self, cutoff: f32) -> f32 {
        let cutoff = cutoff.min(self.sample_rate * 0.45);
        1.0 - (-TAU * cutoff / self.sample_rate).exp()
    }
}

impl Default for LowpassFilter {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Processor for LowpassFilter {
    fn info(&self) -> &ProcessorInfo {
        &self.info
    }

    fn initialize(
        &mut self,
        sample_rate: SampleRate,
        _max_block_size: Frames,
    ) -> Result<(), ProcessorError> {
        if sample_rate == 0 {
            return Err(ProcessorError::InitializationFailed(
                "sample rate must be positive".to_string(),
            ));
        }
        self.sample_rate = sample_rate as f32;
        self.reset();
        Ok(())
    }

    fn parameters(&self) -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::new("cutoff", 20.0, 20000.0, 1000.0)
                .with_label("Cutoff")
                .with_step(1.0)
                .with_unit("Hz"),
        ]
    }

    fn process(
        &mut self,
        params: &[Sample],
        audio: &mut AudioBuffer,
    ) -> Result<(), ProcessorError> {
        let channels = self.state.len();
        audio.check_layout(channels, channels)?;
        let a = self.coefficient(param_or(params, Self::CUTOFF, 1000.0));
        let frames = audio.frames;

        for ((output, input), y) in audio
            .outputs
            .iter_mut()
            .zip(audio.inputs.iter())
            .zip(self.state.iter_mut())
        {
            for (out, &x) in output[..frames].iter_mut().zip(&input[..frames]) {
                *y += a * (x - *y);
                *out = *y;
            }
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.state.fill(0.0);
    }

    fn input_channels(&self) -> ChannelCount {
        self.state.len()
    }

    fn output_channels(&self) -> ChannelCount {
        self.state.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(filter: &mut LowpassFilter, input: &[f32], cutoff: f32) -> Vec<f32> {
        let mut output = vec![0.0; input.len()];
        let inputs: Vec<&[f32]> = vec![input];
        let mut outputs: Vec<&mut [f32]> = vec![&mut output];
        let mut audio = AudioBuffer {
            inputs: &inputs,
            outputs: &mut outputs,
            frames: input.len(),
        };
        filter.process(&[cutoff], &mut audio).unwrap();
        output
    }

    #[test]
    fn test_step_response_rises_monotonically() {
        let mut filter = LowpassFilter::new(1);
        filter.initialize(48000, 256).unwrap();
        let out = run(&mut filter, &[1.0; 256], 500.0);

        assert!(out[0] > 0.0 && out[0] < 1.0);
        assert!(out.windows(2).all(|w| w[1] >= w[0]));
        assert!(out[255] > 0.99);
    }

    #[test]
    fn test_state_carries_and_resets() {
        let mut filter = LowpassFilter::new(1);
        filter.initialize(48000, 16).unwrap();
        let first = run(&mut filter, &[1.0; 16], 200.0);
        let second = run(&mut filter, &[1.0; 16], 200.0);
        assert!(second[0] > first[15]);

        filter.reset();
        assert_eq!(run(&mut filter, &[1.0; 16], 200.0), first);
    }

    #[test]
    fn test_cutoff_limited_below_nyquist() {
        let mut filter = LowpassFilter::new(1);
        filter.initialize(8000, 16).unwrap();
        let a = filter.coefficient(20000.0);
        assert!(a > 0.0 && a < 1.0);
    }
}
