//! Audio backends: whatever drives the real-time callback.
//!
//! A backend owns the clock. Once started it calls the [`BlockCallback`]
//! once per block with exactly `block_size` frames in every channel:
//! `input_channels` input slices and `output_channels` output slices. The
//! backend is responsible for moving those blocks from and to the outside
//! world (a sound device, a file, memory).

mod clocked;
mod cpal_backend;

pub use clocked::ClockedBackend;
pub use cpal_backend::{BlockAdapter, CpalBackend};

use parking_lot::Mutex;
use rtdsp_core::{EngineConfig, Result, Sample};
use std::sync::Arc;

/// Real-time block callback handed to a backend at start.
pub type BlockCallback = Box<dyn FnMut(&[&[Sample]], &mut [&mut [Sample]]) + Send>;

/// The clock and I/O that drive the real-time loop.
///
/// Backends are `Send` so an engine can be started and stopped from any
/// control thread.
pub trait AudioBackend: Send {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Begin calling `callback` once per block.
    fn start(&mut self, config: &EngineConfig, callback: BlockCallback) -> Result<()>;

    /// Stop calling the callback. Must be a no-op when not started.
    ///
    /// Once this returns the backend will not start another callback.
    fn stop(&mut self) -> Result<()>;
}

/// Where the clocked backend pulls input blocks from
pub trait AudioSource: Send {
    /// Fill every channel with the next block of input.
    fn read_block(&mut self, block: &mut [Vec<Sample>]);
}

/// Where the clocked backend delivers output blocks
pub trait AudioSink: Send {
    /// Consume one block of output.
    fn write_block(&mut self, block: &[Vec<Sample>]);
}

/// Input that is always silent
#[derive(Debug, Default, Clone, Copy)]
pub struct SilenceSource;

impl AudioSource for SilenceSource {
    fn read_block(&mut self, block: &mut [Vec<Sample>]) {
        for channel in block {
            channel.fill(0.0);
        }
    }
}

/// Plays back pre-recorded channels, then silence (or loops)
#[derive(Debug, Clone)]
pub struct MemorySource {
    channels: Vec<Vec<Sample>>,
    position: usize,
    looping: bool,
}

impl MemorySource {
    pub fn new(channels: Vec<Vec<Sample>>) -> Self {
        Self {
            channels,
            position: 0,
            looping: false,
        }
    }

    /// Restart from the beginning when the material runs out.
    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    fn material_len(&self) -> usize {
        self.channels.iter().map(Vec::len).max().unwrap_or(0)
    }
}

impl AudioSource for MemorySource {
    fn read_block(&mut self, block: &mut [Vec<Sample>]) {
        let len = self.material_len();
        let frames = block.first().map_or(0, Vec::len);

        for (index, channel) in block.iter_mut().enumerate() {
            let material = self.channels.get(index);
            for (offset, sample) in channel.iter_mut().enumerate() {
                let mut pos = self.position + offset;
                if self.looping && len > 0 {
                    pos %= len;
                }
                *sample = material.and_then(|m| m.get(pos)).copied().unwrap_or(0.0);
            }
        }

        self.position += frames;
        if self.looping && len > 0 {
            self.position %= len;
        }
    }
}

/// Discards output
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn write_block(&mut self, _block: &[Vec<Sample>]) {}
}

/// Records every output block; read it back through a [`CaptureHandle`].
///
/// Appending grows a `Vec`, so this sink is meant for tests and tooling
/// rather than a production audio path.
#[derive(Debug, Clone)]
pub struct CaptureSink {
    captured: Arc<Mutex<Vec<Vec<Sample>>>>,
}

/// Shared view of what a [`CaptureSink`] recorded
#[derive(Debug, Clone)]
pub struct CaptureHandle {
    captured: Arc<Mutex<Vec<Vec<Sample>>>>,
}

impl CaptureSink {
    pub fn new(channels: usize) -> (Self, CaptureHandle) {
        let captured = Arc::new(Mutex::new(vec![Vec::new(); channels]));
        (
            Self {
                captured: Arc::clone(&captured),
            },
            CaptureHandle { captured },
        )
    }
}

impl AudioSink for CaptureSink {
    fn write_block(&mut self, block: &[Vec<Sample>]) {
        let mut captured = self.captured.lock();
        for (store, channel) in captured.iter_mut().zip(block) {
            store.extend_from_slice(channel);
        }
    }
}

impl CaptureHandle {
    /// Frames captured so far (per channel).
    pub fn frames(&self) -> usize {
        self.captured.lock().first().map_or(0, Vec::len)
    }

    /// Copy of everything captured so far.
    pub fn channels(&self) -> Vec<Vec<Sample>> {
        self.captured.lock().clone()
    }
}

/// A backend with no clock.
///
/// Starting it succeeds and never calls the callback; the host drives the
/// graph through `Engine::compute`.
#[derive(Debug, Default)]
pub struct OfflineBackend {
    started: bool,
}

impl AudioBackend for OfflineBackend {
    fn name(&self) -> &str {
        "offline"
    }

    fn start(&mut self, config: &EngineConfig, _callback: BlockCallback) -> Result<()> {
        tracing::debug!(
            "Offline backend ready at {} Hz, {} frames",
            config.sample_rate,
            config.block_size
        );
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_source() {
        let mut block = vec![vec![1.0; 4]; 2];
        SilenceSource.read_block(&mut block);
        assert!(block.iter().flatten().all(|&s| s == 0.0));
    }

    #[test]
    fn test_memory_source_then_silence() {
        let mut source = MemorySource::new(vec![vec![1.0, 2.0, 3.0]]);
        let mut block = vec![vec![0.0; 2]; 2];

        source.read_block(&mut block);
        assert_eq!(block[0], vec![1.0, 2.0]);
        // Missing channel reads as silence
        assert_eq!(block[1], vec![0.0, 0.0]);

        source.read_block(&mut block);
        assert_eq!(block[0], vec![3.0, 0.0]);
    }

    #[test]
    fn test_memory_source_looping() {
        let mut source = MemorySource::new(vec![vec![1.0, 2.0, 3.0]]).looping();
        let mut block = vec![vec![0.0; 2]];

        source.read_block(&mut block);
        source.read_block(&mut block);
        assert_eq!(block[0], vec![3.0, 1.0]);
        source.read_block(&mut block);
        assert_eq!(block[0], vec![2.0, 3.0]);
    }

    #[test]
    fn test_capture_sink() {
        let (mut sink, handle) = CaptureSink::new(2);
        sink.write_block(&[vec![1.0; 3], vec![2.0; 3]]);
        sink.write_block(&[vec![3.0; 3], vec![4.0; 3]]);

        assert_eq!(handle.frames(), 6);
        let channels = handle.channels();
        assert_eq!(channels[0], vec![1.0, 1.0, 1.0, 3.0, 3.0, 3.0]);
        assert_eq!(channels[1][5], 4.0);
    }

    #[test]
    fn test_offline_backend_never_calls_back() {
        let mut backend = OfflineBackend::default();
        let callback: BlockCallback = Box::new(|_, _| panic!("offline backend ran a block"));
        backend.start(&EngineConfig::default(), callback).unwrap();
        backend.stop().unwrap();
        backend.stop().unwrap();
    }
}
