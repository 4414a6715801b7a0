//! Audio I/O driver - the real-time callback loop.
//!
//! The driver wires a [`SignalGraph`] to an [`AudioBackend`]. Every block the
//! backend hands over goes through [`BlockRunner::run`]:
//!
//! 1. snapshot the parameter registry (once, at block start)
//! 2. `try_lock` the graph; if it is busy, output silence and move on
//! 3. process the block and time it against `block_size / sample_rate`
//! 4. report failures and overruns as events, publish the meter
//!
//! REAL-TIME SAFE: `run` never logs, blocks, or allocates. Everything the
//! control thread should hear about goes through `rtdsp-comms`.

use crate::backend::{AudioBackend, BlockCallback};
use crate::graph::{BlockFailure, SignalGraph};
use parking_lot::Mutex;
use rtdsp_comms::{AudioChannels, BlockMeter, ControlChannels, EngineEvent, create_channels};
use rtdsp_core::{EngineConfig, Error, Result, Sample};
use rtdsp_processor::{ParamRegistry, ParamSnapshot};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Capacity of the event ring
const EVENT_CAPACITY: usize = 256;

/// State owned by the real-time callback
pub(crate) struct BlockRunner {
    graph: Arc<Mutex<SignalGraph>>,
    params: Arc<ParamRegistry>,
    running: Arc<AtomicBool>,
    channels: AudioChannels,
    snapshot: ParamSnapshot,
    meter: BlockMeter,
    budget: Duration,
    sample_rate: u32,
    block_size: usize,
}

impl BlockRunner {
    fn new(
        config: &EngineConfig,
        graph: Arc<Mutex<SignalGraph>>,
        params: Arc<ParamRegistry>,
        running: Arc<AtomicBool>,
        channels: AudioChannels,
    ) -> Self {
        // Sized here so the first snapshot does not allocate
        let snapshot = params.snapshot();
        Self {
            graph,
            params,
            running,
            channels,
            snapshot,
            meter: BlockMeter::default(),
            budget: config.block_duration(),
            sample_rate: config.sample_rate,
            block_size: config.block_size,
        }
    }

    /// Process one block
    pub(crate) fn run(&mut self, inputs: &[&[Sample]], outputs: &mut [&mut [Sample]]) {
        let started = Instant::now();
        let block = self.meter.blocks;
        if block == 0 {
            self.channels.report(EngineEvent::Started {
                sample_rate: self.sample_rate,
                block_size: self.block_size,
            });
        }

        self.params.snapshot_into(&mut self.snapshot);

        if let Some(mut graph) = self.graph.try_lock() {
            // Checked under the lock: `stop` clears the flag and then takes
            // the lock, so no block starts processing after that
            if self.running.load(Ordering::Acquire) {
                match graph.process(&self.snapshot, inputs, outputs) {
                    Ok(()) => {}
                    Err(failure) => {
                        let node = match failure {
                            BlockFailure::NotPrepared => None,
                            BlockFailure::Node { index, .. } => Some(index),
                        };
                        self.meter.failures += 1;
                        self.channels
                            .report(EngineEvent::ProcessFailed { block, node });
                    }
                }
            } else {
                silence(outputs);
            }
        } else {
            silence(outputs);
            self.meter.contended += 1;
            self.channels.report(EngineEvent::Contended { block });
        }

        let elapsed = started.elapsed();
        if elapsed > self.budget {
            self.meter.overruns += 1;
            self.channels.report(EngineEvent::Overrun {
                block,
                elapsed,
                budget: self.budget,
            });
        }

        self.meter.peaks.fill(0.0);
        for (peak, channel) in self.meter.peaks.iter_mut().zip(outputs.iter()) {
            // fold instead of max_by: no panic on NaN
            *peak = channel.iter().fold(0.0_f32, |max, &s| max.max(s.abs()));
        }
        self.meter.blocks += 1;
        self.meter.last_elapsed = elapsed;
        self.channels.publish(self.meter);
    }
}

fn silence(outputs: &mut [&mut [Sample]]) {
    for channel in outputs {
        channel.fill(0.0);
    }
}

/// Owns the backend and the control end of the real-time channels
pub struct AudioDriver {
    backend: Box<dyn AudioBackend>,
    running: Arc<AtomicBool>,
    /// Graph shared with the running callback
    graph: Option<Arc<Mutex<SignalGraph>>>,
    control: Option<ControlChannels>,
}

impl AudioDriver {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend,
            running: Arc::new(AtomicBool::new(false)),
            graph: None,
            control: None,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Begin the real-time loop over an already prepared graph.
    pub fn start(
        &mut self,
        config: &EngineConfig,
        graph: Arc<Mutex<SignalGraph>>,
        params: Arc<ParamRegistry>,
    ) -> Result<()> {
        config.validate()?;
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }

        let (control, audio) = create_channels(EVENT_CAPACITY);
        let mut runner = BlockRunner::new(
            config,
            Arc::clone(&graph),
            params,
            Arc::clone(&self.running),
            audio,
        );
        let callback: BlockCallback =
            Box::new(move |inputs: &[&[Sample]], outputs: &mut [&mut [Sample]]| {
                runner.run(inputs, outputs);
            });

        self.running.store(true, Ordering::Release);
        if let Err(e) = self.backend.start(config, callback) {
            self.running.store(false, Ordering::Release);
            return Err(e);
        }

        tracing::info!(
            "Driver started on '{}' backend: {} Hz, {} frames, budget {:?}",
            self.backend.name(),
            config.sample_rate,
            config.block_size,
            config.block_duration()
        );
        self.graph = Some(graph);
        self.control = Some(control);
        Ok(())
    }

    /// Halt the loop. No-op when stopped.
    ///
    /// On return no block is being processed and none will be.
    pub fn stop(&mut self) {
        let Some(graph) = self.graph.take() else {
            return;
        };

        self.running.store(false, Ordering::Release);
        if let Err(e) = self.backend.stop() {
            tracing::error!("Error stopping '{}' backend: {}", self.backend.name(), e);
        }
        // Waits out a block still inside `process`
        drop(graph.lock());
        tracing::info!("Driver stopped");
    }

    /// Pop every event the callback reported since the last poll.
    pub fn poll_events(&mut self) -> Vec<EngineEvent> {
        self.control
            .as_mut()
            .map(ControlChannels::drain_events)
            .unwrap_or_default()
    }

    /// Latest meter published by the callback.
    pub fn meter(&mut self) -> BlockMeter {
        self.control
            .as_mut()
            .map(ControlChannels::meter)
            .unwrap_or_default()
    }
}

impl Drop for AudioDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CaptureSink, ClockedBackend, OfflineBackend, SilenceSource};
    use crate::builtin::sine::SineOscillator;
    use crate::graph::{CompiledGraph, GraphBuilder};

    fn sine_graph(prepare: bool) -> (Arc<Mutex<SignalGraph>>, Arc<ParamRegistry>) {
        let mut builder = GraphBuilder::new("t");
        builder
            .add_node("osc", Box::new(SineOscillator::default()))
            .unwrap();
        let CompiledGraph { mut graph, params } = builder.build().unwrap();
        if prepare {
            graph.prepare(48000, 64).unwrap();
        }
        (Arc::new(Mutex::new(graph)), Arc::new(params))
    }

    fn runner(
        graph: &Arc<Mutex<SignalGraph>>,
        params: &Arc<ParamRegistry>,
        running: bool,
    ) -> (BlockRunner, ControlChannels) {
        let (control, audio) = create_channels(16);
        let runner = BlockRunner::new(
            &EngineConfig::new(48000, 64, 0, 1),
            Arc::clone(graph),
            Arc::clone(params),
            Arc::new(AtomicBool::new(running)),
            audio,
        );
        (runner, control)
    }

    fn run_block(runner: &mut BlockRunner) -> Vec<f32> {
        let mut out = vec![9.0; 64];
        runner.run(&[], &mut [out.as_mut_slice()]);
        out
    }

    #[test]
    fn test_runner_processes_and_meters() {
        let (graph, params) = sine_graph(true);
        let (mut runner, mut control) = runner(&graph, &params, true);

        let out = run_block(&mut runner);
        assert!(out.iter().any(|&s| s != 0.0));

        let events = control.drain_events();
        assert!(events.contains(&EngineEvent::Started {
            sample_rate: 48000,
            block_size: 64
        }));

        let meter = control.meter();
        assert_eq!(meter.blocks, 1);
        assert!(meter.peaks[0] > 0.0 && meter.peaks[0] <= 0.5);
        assert_eq!(meter.peaks[1], 0.0);
    }

    #[test]
    fn test_runner_reads_parameters_at_block_start() {
        let (graph, params) = sine_graph(true);
        let (mut runner, _control) = runner(&graph, &params, true);

        params.set_value("/t/osc/level", 0.0).unwrap();
        let out = run_block(&mut runner);
        assert!(out.iter().all(|&s| s == 0.0));

        params.set_value("/t/osc/level", 1.0).unwrap();
        let out = run_block(&mut runner);
        assert!(out.iter().any(|&s| s.abs() > 0.5));
    }

    #[test]
    fn test_runner_contended_outputs_silence() {
        let (graph, params) = sine_graph(true);
        let (mut runner, mut control) = runner(&graph, &params, true);

        let guard = graph.lock();
        let out = run_block(&mut runner);
        drop(guard);

        assert!(out.iter().all(|&s| s == 0.0));
        assert!(
            control
                .drain_events()
                .contains(&EngineEvent::Contended { block: 0 })
        );
        assert_eq!(control.meter().contended, 1);
    }

    #[test]
    fn test_runner_not_running_is_silent() {
        let (graph, params) = sine_graph(true);
        let (mut runner, mut control) = runner(&graph, &params, false);

        let out = run_block(&mut runner);
        assert!(out.iter().all(|&s| s == 0.0));
        assert_eq!(control.meter().failures, 0);
    }

    #[test]
    fn test_runner_unprepared_graph_reports_failure() {
        let (graph, params) = sine_graph(false);
        let (mut runner, mut control) = runner(&graph, &params, true);

        let out = run_block(&mut runner);
        assert!(out.iter().all(|&s| s == 0.0));
        assert!(
            control
                .drain_events()
                .contains(&EngineEvent::ProcessFailed {
                    block: 0,
                    node: None
                })
        );
    }

    #[test]
    fn test_runner_reports_overrun() {
        let (graph, params) = sine_graph(true);
        let (mut runner, mut control) = runner(&graph, &params, true);
        runner.budget = Duration::ZERO;

        run_block(&mut runner);
        run_block(&mut runner);

        let overruns = control
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::Overrun { .. }))
            .count();
        assert_eq!(overruns, 2);
        assert_eq!(control.meter().overruns, 2);
    }

    #[test]
    fn test_driver_start_stop() {
        let (graph, params) = sine_graph(true);
        let config = EngineConfig::new(48000, 64, 0, 1);
        let (sink, capture) = CaptureSink::new(1);
        let mut driver = AudioDriver::new(Box::new(ClockedBackend::new(SilenceSource, sink)));

        driver
            .start(&config, Arc::clone(&graph), Arc::clone(&params))
            .unwrap();
        assert!(driver.is_running());
        assert!(matches!(
            driver.start(&config, Arc::clone(&graph), Arc::clone(&params)),
            Err(Error::AlreadyRunning)
        ));

        let deadline = Instant::now() + Duration::from_secs(5);
        while capture.frames() < 640 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        driver.stop();
        driver.stop();
        assert!(!driver.is_running());

        let frames = capture.frames();
        assert!(frames >= 640);
        assert!(driver.meter().blocks >= 10);
        assert!(capture.channels()[0].iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_driver_rejects_invalid_config() {
        let (graph, params) = sine_graph(true);
        let mut driver = AudioDriver::new(Box::new(OfflineBackend::default()));
        let config = EngineConfig::new(0, 64, 0, 1);

        assert!(matches!(
            driver.start(&config, graph, params),
            Err(Error::InvalidConfig(_))
        ));
        assert!(!driver.is_running());
        assert!(driver.poll_events().is_empty());
    }
}
