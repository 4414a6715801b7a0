//! Backend driven by a dedicated thread and a block-period ticker.

use super::{AudioBackend, AudioSink, AudioSource, BlockCallback, NullSink, SilenceSource};
use crossbeam_channel::{Sender, bounded, select, tick};
use rtdsp_core::{EngineConfig, Error, MAX_CHANNELS, Result, Sample};
use smallvec::SmallVec;
use std::thread::JoinHandle;

type Endpoints = (Box<dyn AudioSource>, Box<dyn AudioSink>);

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<Endpoints>,
}

/// Software clock: one block every `block_size / sample_rate` seconds.
///
/// Useful where there is no sound device (servers, CI) and as a
/// deterministic stand-in for one. The source and sink move onto the clock
/// thread while running and come back on `stop`.
pub struct ClockedBackend {
    endpoints: Option<Endpoints>,
    worker: Option<Worker>,
}

impl ClockedBackend {
    pub fn new(source: impl AudioSource + 'static, sink: impl AudioSink + 'static) -> Self {
        Self {
            endpoints: Some((Box::new(source), Box::new(sink))),
            worker: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }
}

impl Default for ClockedBackend {
    /// Silent input, discarded output
    fn default() -> Self {
        Self::new(SilenceSource, NullSink)
    }
}

impl AudioBackend for ClockedBackend {
    fn name(&self) -> &str {
        "clocked"
    }

    fn start(&mut self, config: &EngineConfig, mut callback: BlockCallback) -> Result<()> {
        if self.worker.is_some() {
            return Err(Error::AlreadyRunning);
        }
        let (mut source, mut sink) = self
            .endpoints
            .take()
            .ok_or_else(|| Error::Audio("clocked backend lost its source and sink".to_string()))?;

        let period = config.block_duration();
        let frames = config.block_size;
        let mut inputs = vec![vec![0.0; frames]; config.input_channels];
        let mut outputs = vec![vec![0.0; frames]; config.output_channels];
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("rtdsp-clock".to_string())
            .spawn(move || {
                let ticker = tick(period);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            source.read_block(&mut inputs);
                            {
                                let input_refs: SmallVec<[&[Sample]; MAX_CHANNELS]> =
                                    inputs.iter().map(Vec::as_slice).collect();
                                let mut output_refs: SmallVec<[&mut [Sample]; MAX_CHANNELS]> =
                                    outputs.iter_mut().map(Vec::as_mut_slice).collect();
                                callback(&input_refs[..], &mut output_refs[..]);
                            }
                            sink.write_block(&outputs);
                        }
                    }
                }
                (source, sink)
            })?;

        tracing::debug!("Clock thread started, period {:?}", period);
        self.worker = Some(Worker { stop_tx, handle });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        // A closed channel also wakes the select, so a full one is fine
        let _ = worker.stop_tx.try_send(());
        let endpoints = worker
            .handle
            .join()
            .map_err(|_| Error::Audio("clock thread panicked".to_string()))?;
        self.endpoints = Some(endpoints);
        tracing::debug!("Clock thread stopped");
        Ok(())
    }
}

impl Drop for ClockedBackend {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!("Error stopping clocked backend: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CaptureSink, MemorySource};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_clock_delivers_blocks() {
        let config = EngineConfig::new(48000, 64, 1, 1);
        let (sink, capture) = CaptureSink::new(1);
        let mut backend = ClockedBackend::new(MemorySource::new(vec![vec![0.25; 64]]), sink);

        // Doubles the input
        let callback: BlockCallback =
            Box::new(|inputs: &[&[Sample]], outputs: &mut [&mut [Sample]]| {
                for (out, input) in outputs.iter_mut().zip(inputs) {
                    for (o, &i) in out.iter_mut().zip(input.iter()) {
                        *o = i * 2.0;
                    }
                }
            });
        backend.start(&config, callback).unwrap();
        assert!(backend.is_running());
        assert!(wait_for(|| capture.frames() >= 256));
        backend.stop().unwrap();

        let captured = capture.channels();
        assert_eq!(captured[0].len() % 64, 0);
        assert!(captured[0][..64].iter().all(|&s| s == 0.5));
        assert!(captured[0][64..128].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_no_callbacks_after_stop() {
        let config = EngineConfig::new(48000, 32, 0, 2);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut backend = ClockedBackend::default();

        backend
            .start(
                &config,
                Box::new(move |inputs: &[&[Sample]], outputs: &mut [&mut [Sample]]| {
                    assert!(inputs.is_empty());
                    assert_eq!(outputs.len(), 2);
                    assert!(outputs.iter().all(|ch| ch.len() == 32));
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();
        assert!(wait_for(|| calls.load(Ordering::SeqCst) >= 3));
        backend.stop().unwrap();

        let after_stop = calls.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_restart_and_double_start() {
        let config = EngineConfig::new(48000, 32, 0, 1);
        let mut backend = ClockedBackend::default();

        backend.start(&config, Box::new(|_, _| {})).unwrap();
        assert!(matches!(
            backend.start(&config, Box::new(|_, _| {})),
            Err(Error::AlreadyRunning)
        ));
        backend.stop().unwrap();
        backend.stop().unwrap();

        // Source and sink came back, so it can start again
        backend.start(&config, Box::new(|_, _| {})).unwrap();
        backend.stop().unwrap();
        assert!(!backend.is_running());
    }
}
