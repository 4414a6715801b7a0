//! Pan processor - stereo panning control.

use rtdsp_core::{ChannelCount, Frames, Sample, SampleRate};
use rtdsp_processor::{
    AudioBuffer, ParamDescriptor, Processor, ProcessorError, ProcessorInfo, param_or,
};
use std::f32::consts::FRAC_PI_2;

/// Stereo pan processor using constant-power panning
///
/// Constant-power panning maintains perceived loudness as the sound moves
/// across the stereo field by ensuring that L² + R² = constant.
pub struct PanProcessor {
    info: ProcessorInfo,
}

impl Default for PanProcessor {
    fn default() -> Self {
        Self {
            info: ProcessorInfo {
                name: "Pan".to_string(),
                vendor: "rtdsp".to_string(),
                version: "1.0.0".to_string(),
                unique_id: "rtdsp.builtin.pan".to_string(),
            },
        }
    }
}

impl PanProcessor {
    /// Index of the pan parameter
    pub const PAN: usize = 0;

    /// Calculate constant-power pan gains
    ///
    /// Returns (`left_gain`, `right_gain`) using constant-power law:
    /// - pan = -1.0: (1.0, 0.0) - full left
    /// - pan =  0.0: (0.707, 0.707) - center
    /// - pan =  1.0: (0.0, 1.0) - full right
    fn calculate_gains(pan: f32) -> (f32, f32) {
        // [-1, 1] -> [0, π/2]
        let angle = (pan + 1.0) * 0.5 * FRAC_PI_2;
        (angle.cos(), angle.sin())
    }
}

impl Processor for PanProcessor {
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
            ParamDescriptor::new("pan", -1.0, 1.0, 0.0)
                .with_label("Pan")
                .with_step(0.01),
        ]
    }

    fn process(
        &mut self,
        params: &[Sample],
        audio: &mut AudioBuffer,
    ) -> Result<(), ProcessorError> {
        audio.check_layout(2, 2)?;
        let (left_gain, right_gain) = Self::calculate_gains(param_or(params, Self::PAN, 0.0));

        let frames = audio.frames;
        let (left_out, right_out) = audio.outputs.split_at_mut(1);
        let left_in = &audio.inputs[0][..frames];
        let right_in = &audio.inputs[1][..frames];

        for (out, &sample) in left_out[0][..frames].iter_mut().zip(left_in) {
            *out = sample * left_gain;
        }
        for (out, &sample) in right_out[0][..frames].iter_mut().zip(right_in) {
            *out = sample * right_gain;
        }

        Ok(())
    }

    fn reset(&mut self) {}

    fn input_channels(&self) -> ChannelCount {
        2
    }

    fn output_channels(&self) -> ChannelCount {
        2
    }
}
