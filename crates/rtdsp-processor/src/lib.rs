//! Processor abstraction layer.
//!
//! This crate defines the fixed capability interface every DSP program
//! exposes to the engine (`Processor`), the block buffer handed to it, and
//! the parameter registry the engine reads once per block. The engine only
//! ever talks to processors through this trait, so version differences
//! between implementations are absorbed when a processor is constructed,
//! never by probing at call time.

pub mod params;
pub mod ui;

pub use params::{ParamDescriptor, ParamHandle, ParamKey, ParamRegistry, ParamSnapshot, Widget};
pub use ui::{Metadata, UiDescriptor, UiGroup, UiItem};

use rtdsp_core::{ChannelCount, Frames, Sample, SampleRate};

/// One block of audio, split per channel.
///
/// `'a` is the borrow of the channel tables, `'b` the borrow of the sample
/// storage; keeping them apart lets the tables live on the stack.
pub struct AudioBuffer<'a, 'b> {
    pub inputs: &'a [&'b [Sample]],
    pub outputs: &'a mut [&'b mut [Sample]],
    pub frames: Frames,
}

impl AudioBuffer<'_, '_> {
    /// Check the buffer carries at least the channels and frames a processor needs.
    pub fn check_layout(
        &self,
        inputs: ChannelCount,
        outputs: ChannelCount,
    ) -> Result<(), ProcessorError> {
        if self.inputs.len() < inputs {
            return Err(ProcessorError::ChannelMismatch {
                expected: inputs,
                got: self.inputs.len(),
            });
        }
        if self.outputs.len() < outputs {
            return Err(ProcessorError::ChannelMismatch {
                expected: outputs,
                got: self.outputs.len(),
            });
        }
        let shortest = self
            .inputs
            .iter()
            .take(inputs)
            .map(|ch| ch.len())
            .chain(self.outputs.iter().take(outputs).map(|ch| ch.len()))
            .min()
            .unwrap_or(self.frames);
        if shortest < self.frames {
            return Err(ProcessorError::BufferTooShort {
                needed: self.frames,
                got: shortest,
            });
        }
        Ok(())
    }
}

/// Processor metadata
#[derive(Debug, Clone)]
pub struct ProcessorInfo {
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub unique_id: String,
}

/// The capability interface of a DSP program.
///
/// `process` runs on the real-time thread: it must not allocate, lock, or
/// block, and must leave exactly `audio.frames` samples in every output.
pub trait Processor: Send {
    /// Get processor information
    fn info(&self) -> &ProcessorInfo;

    /// Prepare for the given sample rate and maximum block size.
    ///
    /// Called from the control thread before processing starts; this is the
    /// place to allocate internal state.
    fn initialize(
        &mut self,
        sample_rate: SampleRate,
        max_block_size: Frames,
    ) -> Result<(), ProcessorError>;

    /// Parameters this processor reads, in the order they appear in the
    /// `params` slice given to `process`.
    fn parameters(&self) -> Vec<ParamDescriptor>;

    /// Process one block.
    ///
    /// `params` holds the values snapshotted at the start of the block, one
    /// per declared parameter, already clamped to their ranges.
    fn process(&mut self, params: &[Sample], audio: &mut AudioBuffer)
    -> Result<(), ProcessorError>;

    /// Clear internal state (delay lines, oscillator phase, ...).
    fn reset(&mut self);

    /// Get number of input channels
    fn input_channels(&self) -> ChannelCount;

    /// Get number of output channels
    fn output_channels(&self) -> ChannelCount;

    /// Free-form key/value metadata (author, license, description, ...).
    fn metadata(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// Read the `index`-th parameter from a snapshot slice, falling back to `default`.
#[inline]
pub fn param_or(params: &[Sample], index: usize, default: Sample) -> Sample {
    params.get(index).copied().unwrap_or(default)
}

/// Processor errors
///
/// Everything except `InitializationFailed` can be raised on the audio
/// thread, so those variants hold no heap data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessorError {
    #[error("Processor initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Processing failed: {0}")]
    ProcessingFailed(&'static str),

    #[error("Channel mismatch: expected {expected}, got {got}")]
    ChannelMismatch { expected: usize, got: usize },

    #[error("Buffer too short: need {needed} frames, got {got}")]
    BufferTooShort { needed: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_layout_ok() {
        let input = vec![0.0; 64];
        let mut output = vec![0.0; 64];
        let inputs: Vec<&[f32]> = vec![&input];
        let mut outputs: Vec<&mut [f32]> = vec![&mut output];

        let audio = AudioBuffer {
            inputs: &inputs,
            outputs: &mut outputs,
            frames: 64,
        };
        assert!(audio.check_layout(1, 1).is_ok());
    }

    #[test]
    fn test_check_layout_missing_channel() {
        let input = vec![0.0; 64];
        let mut output = vec![0.0; 64];
        let inputs: Vec<&[f32]> = vec![&input];
        let mut outputs: Vec<&mut [f32]> = vec![&mut output];

        let audio = AudioBuffer {
            inputs: &inputs,
            outputs: &mut outputs,
            frames: 64,
        };
        assert_eq!(
            audio.check_layout(2, 1),
            Err(ProcessorError::ChannelMismatch {
                expected: 2,
                got: 1
            })
        );
    }

    #[test]
    fn test_check_layout_short_buffer() {
        let input = vec![0.0; 32];
        let mut output = vec![0.0; 64];
        let inputs: Vec<&[f32]> = vec![&input];
        let mut outputs: Vec<&mut [f32]> = vec![&mut output];

        let audio = AudioBuffer {
            inputs: &inputs,
            outputs: &mut outputs,
            frames: 64,
        };
        assert_eq!(
            audio.check_layout(1, 1),
            Err(ProcessorError::BufferTooShort {
                needed: 64,
                got: 32
            })
        );
    }

    #[test]
    fn test_param_or() {
        assert_eq!(param_or(&[0.25, 0.5], 1, 1.0), 0.5);
        assert_eq!(param_or(&[0.25], 3, 1.0), 1.0);
    }
}
