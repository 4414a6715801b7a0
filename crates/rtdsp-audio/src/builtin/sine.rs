//! Sine oscillator - a parameterized tone generator.

use rtdsp_core::{ChannelCount, Frames, Sample, SampleRate};
use rtdsp_processor::{
    AudioBuffer, ParamDescriptor, Processor, ProcessorError, ProcessorInfo, param_or,
};
use std::f64::consts::TAU;

/// Mono sine oscillator with no inputs.
///
/// Phase is kept in `f64` and carried across blocks, so consecutive blocks
/// join without discontinuity. `reset` rewinds it to zero.
pub struct SineOscillator {
    /// Phase in cycles, [0, 1)
    phase: f64,
    sample_rate: f64,
    info: ProcessorInfo,
}

impl Default for SineOscillator {
    fn default() -> Self {
        Self {
            phase: 0.0,
            sample_rate: 44100.0,
            info: ProcessorInfo {
                name: "Sine".to_string(),
                vendor: "rtdsp".to_string(),
                version: "1.0.0".to_string(),
                unique_id: "rtdsp.builtin.sine".to_string(),
            },
        }
    }
}

impl SineOscillator {
    pub const FREQ: usize = 0;
    pub const LEVEL: usize = 1;
}

impl Processor for SineOscillator {
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
        self.sample_rate = f64::from(sample_rate);
        Ok(())
    }

    fn parameters(&self) -> Vec<ParamDescriptor> {
        vec![
            ParamDescriptor::new("freq", 20.0, 20000.0, 440.0)
                .with_label("Frequency")
                .with_step(1.0)
                .with_unit("Hz"),
            ParamDescriptor::new("level", 0.0, 1.0, 0.5)
                .with_label("Level")
                .with_step(0.01),
        ]
    }

    fn process(
        &mut self,
        params: &[Sample],
        audio: &mut AudioBuffer,
    ) -> Result<(), ProcessorError> {
        audio.check_layout(0, 1)?;
        let increment = f64::from(param_or(params, Self::FREQ, 440.0)) / self.sample_rate;
        let level = param_or(params, Self::LEVEL, 0.5);
        let frames = audio.frames;

        for out in &mut audio.outputs[0][..frames] {
            *out = (self.phase * TAU).sin() as f32 * level;
            self.phase = (self.phase + increment).fract();
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.phase = 0.0;
    }

    fn input_channels(&self) -> ChannelCount {
        0
    }

    fn output_channels(&self) -> ChannelCount {
        1
    }

    fn metadata(&self) -> Vec<(&'static str, String)> {
        vec![("description", "band-unlimited sine tone".to_string())]
    }
}
