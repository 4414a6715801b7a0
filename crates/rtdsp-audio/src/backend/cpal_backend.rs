//! Sound-device backend built on cpal.

use super::{AudioBackend, BlockCallback};
use cpal::Stream;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Sender, bounded};
use rtdsp_core::{EngineConfig, Error, Frames, MAX_CHANNELS, Result, Sample};
use smallvec::SmallVec;
use std::thread::JoinHandle;

/// Turns the device's variable-size interleaved callbacks into fixed blocks.
///
/// All buffers are allocated up front. Each time the pending output block
/// is used up the block callback runs once more; input is silence.
pub struct BlockAdapter {
    callback: BlockCallback,
    inputs: Vec<Vec<Sample>>,
    outputs: Vec<Vec<Sample>>,
    block_size: Frames,
    /// Next frame of `outputs` to hand to the device
    cursor: usize,
}

impl BlockAdapter {
    pub fn new(config: &EngineConfig, callback: BlockCallback) -> Self {
        Self {
            callback,
            inputs: vec![vec![0.0; config.block_size]; config.input_channels],
            outputs: vec![vec![0.0; config.block_size]; config.output_channels],
            block_size: config.block_size,
            cursor: config.block_size,
        }
    }

    /// Fill an interleaved device buffer with `outputs.len()` channels per frame.
    pub fn fill_interleaved(&mut self, data: &mut [Sample]) {
        let channels = self.outputs.len();
        if channels == 0 || self.block_size == 0 {
            data.fill(0.0);
            return;
        }

        for frame in data.chunks_mut(channels) {
            if self.cursor >= self.block_size {
                self.render_block();
            }
            let cursor = self.cursor;
            for (sample, channel) in frame.iter_mut().zip(&self.outputs) {
                *sample = channel[cursor];
            }
            self.cursor += 1;
        }
    }

    fn render_block(&mut self) {
        let input_refs: SmallVec<[&[Sample]; MAX_CHANNELS]> =
            self.inputs.iter().map(Vec::as_slice).collect();
        let mut output_refs: SmallVec<[&mut [Sample]; MAX_CHANNELS]> =
            self.outputs.iter_mut().map(Vec::as_mut_slice).collect();
        (self.callback)(&input_refs[..], &mut output_refs[..]);
        self.cursor = 0;
    }
}

struct StreamThread {
    stop_tx: Sender<()>,
    handle: JoinHandle<Result<()>>,
}

/// Plays through the default (or a named) output device.
///
/// cpal streams are tied to the thread that built them, so the stream lives
/// on its own thread from `start` to `stop`. That keeps the backend `Send`.
pub struct CpalBackend {
    device_name: Option<String>,
    stream: Option<StreamThread>,
}

impl CpalBackend {
    /// Use the host's default output device
    pub fn new() -> Self {
        Self {
            device_name: None,
            stream: None,
        }
    }

    /// Use the first output device whose name contains `name`
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
            stream: None,
        }
    }

    /// Whether the host reports any output device at all.
    pub fn output_available() -> bool {
        cpal::default_host().default_output_device().is_some()
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn find_device(host: &cpal::Host, wanted: Option<&str>) -> Result<cpal::Device> {
    match wanted {
        None => host
            .default_output_device()
            .ok_or_else(|| Error::Audio("No output device available".to_string())),
        Some(wanted) => host
            .output_devices()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|device| device.name().is_ok_and(|name| name.contains(wanted)))
            .ok_or_else(|| Error::Audio(format!("No output device matching '{wanted}'"))),
    }
}

fn open_stream(
    device_name: Option<&str>,
    config: &EngineConfig,
    callback: BlockCallback,
) -> Result<Stream> {
    let host = cpal::default_host();
    tracing::debug!("Using audio host: {}", host.id().name());
    let device = find_device(&host, device_name)?;
    tracing::info!(
        "Using output device: {}",
        device.name().unwrap_or_else(|_| "<unnamed>".to_string())
    );

    let channels = u16::try_from(config.output_channels)
        .map_err(|_| Error::InvalidConfig("too many output channels".to_string()))?;
    let stream_config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    tracing::debug!("Stream config: {:?}", stream_config);

    let mut adapter = BlockAdapter::new(config, callback);
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                adapter.fill_interleaved(data);
            },
            move |err| {
                tracing::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    Ok(stream)
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn start(&mut self, config: &EngineConfig, callback: BlockCallback) -> Result<()> {
        if self.stream.is_some() {
            return Err(Error::AlreadyRunning);
        }
        if config.output_channels == 0 {
            return Err(Error::InvalidConfig(
                "a device stream needs at least one output channel".to_string(),
            ));
        }

        let config = *config;
        let device_name = self.device_name.clone();
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("rtdsp-cpal".to_string())
            .spawn(move || {
                let stream = match open_stream(device_name.as_deref(), &config, callback) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return Ok(());
                    }
                };
                let _ = ready_tx.send(Ok(()));

                // Returns on a stop message or when the sender is dropped
                let _ = stop_rx.recv();
                let paused = stream.pause().map_err(|e| Error::Audio(e.to_string()));
                drop(stream);
                paused
            })?;

        let opened = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(Error::Audio("audio stream thread exited".to_string())));
        if let Err(e) = opened {
            let _ = handle.join();
            return Err(e);
        }

        tracing::info!("Audio stream started");
        self.stream = Some(StreamThread { stop_tx, handle });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(thread) = self.stream.take() else {
            return Ok(());
        };

        let _ = thread.stop_tx.try_send(());
        let paused = thread
            .handle
            .join()
            .map_err(|_| Error::Audio("audio stream thread panicked".to_string()))?;
        tracing::info!("Audio stream stopped");
        paused
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!("Error stopping audio stream: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Emits the block number on every sample of the block
    fn counting_adapter(block_size: usize, channels: usize) -> BlockAdapter {
        let config = EngineConfig::new(48000, block_size, 0, channels);
        let mut block = 0.0;
        BlockAdapter::new(
            &config,
            Box::new(move |_: &[&[Sample]], outputs: &mut [&mut [Sample]]| {
                block += 1.0;
                for (index, channel) in outputs.iter_mut().enumerate() {
                    channel.fill(block + index as f32 * 100.0);
                }
            }),
        )
    }

    #[test]
    fn test_adapter_spans_device_buffers() {
        let mut adapter = counting_adapter(4, 2);

        // 3 frames, then 3 more: blocks 1 and 2 straddle the callbacks
        let mut first = [0.0; 6];
        adapter.fill_interleaved(&mut first);
        assert_eq!(first, [1.0, 101.0, 1.0, 101.0, 1.0, 101.0]);

        let mut second = [0.0; 6];
        adapter.fill_interleaved(&mut second);
        assert_eq!(second, [1.0, 101.0, 2.0, 102.0, 2.0, 102.0]);
    }

    #[test]
    fn test_adapter_large_device_buffer() {
        let mut adapter = counting_adapter(2, 1);
        let mut data = [0.0; 7];
        adapter.fill_interleaved(&mut data);
        assert_eq!(data, [1.0, 1.0, 2.0, 2.0, 3.0, 3.0, 4.0]);
    }

    #[test]
    fn test_adapter_without_outputs_is_silent() {
        let mut adapter = counting_adapter(4, 0);
        let mut data = [5.0; 4];
        adapter.fill_interleaved(&mut data);
        assert!(data.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_backend_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CpalBackend>();
    }

    #[test]
    fn test_device_start_stop() {
        if !CpalBackend::output_available() {
            eprintln!("Skipping test: No audio device available (CI environment)");
            return;
        }

        let mut backend = CpalBackend::new();
        let config = EngineConfig::default();
        match backend.start(&config, Box::new(|_: &[&[Sample]], _: &mut [&mut [Sample]]| {})) {
            Ok(()) => {
                std::thread::sleep(Duration::from_millis(100));
                assert!(backend.stop().is_ok());
                assert!(backend.stop().is_ok());
            }
            Err(e) => {
                eprintln!("Skipping test: Audio device unavailable - {e}");
            }
        }
    }
}
