//! Engine controller - lifecycle, parameter access, and offline compute.
//!
//! An [`Engine`] is constructed explicitly by its owner around one compiled
//! program and one backend; there is no process-wide instance.
//!
//! ```text
//!            start()
//!  Stopped ───────────▶ Running
//!     ▲                    │
//!     └────────────────────┘
//!            stop()
//! ```
//!
//! `compute` drives the graph directly, outside the backend's callback
//! loop. It is only allowed while running, and it shares the graph with the
//! callback through a mutex held just around `process`.

use crate::backend::{AudioBackend, OfflineBackend};
use crate::driver::AudioDriver;
use crate::graph::{BlockFailure, CompiledGraph, SignalGraph};
use parking_lot::Mutex;
use rtdsp_comms::{BlockMeter, EngineEvent};
use rtdsp_core::{EngineConfig, Error, MAX_CHANNELS, Result, Sample};
use rtdsp_processor::{
    Metadata, ParamDescriptor, ParamKey, ParamRegistry, ParamSnapshot, UiDescriptor,
};
use smallvec::SmallVec;
use std::sync::Arc;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
}

/// A single real-time processing engine
///
/// `Send`, so lifecycle and parameter calls may come from any control
/// thread, e.g. behind an `Arc<Mutex<Engine>>`.
pub struct Engine {
    config: EngineConfig,
    state: EngineState,
    name: String,
    metadata: Metadata,
    graph: Arc<Mutex<SignalGraph>>,
    params: Arc<ParamRegistry>,
    driver: AudioDriver,
    /// Parameter snapshot for `compute`
    snapshot: ParamSnapshot,
    /// Input block for `compute`, sized at `start`
    scratch: Vec<Vec<Sample>>,
}

impl Engine {
    /// Create a stopped engine. The configuration is checked at `start`.
    pub fn new(
        config: EngineConfig,
        compiled: CompiledGraph,
        backend: Box<dyn AudioBackend>,
    ) -> Self {
        let CompiledGraph { graph, params } = compiled;
        tracing::debug!(
            "Engine for '{}' with {} parameters on '{}' backend",
            graph.name(),
            params.len(),
            backend.name()
        );

        Self {
            config,
            state: EngineState::Stopped,
            name: graph.name().to_string(),
            metadata: graph.metadata().clone(),
            snapshot: params.snapshot(),
            graph: Arc::new(Mutex::new(graph)),
            params: Arc::new(params),
            driver: AudioDriver::new(backend),
            scratch: Vec::new(),
        }
    }

    /// Engine without a real-time loop, driven only by `compute`.
    pub fn offline(config: EngineConfig, compiled: CompiledGraph) -> Self {
        Self::new(config, compiled, Box::new(OfflineBackend::default()))
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == EngineState::Running
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Program name (first segment of every parameter path)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prepare the graph and start the backend's callback loop.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::AlreadyRunning);
        }
        self.config.validate()?;

        // Nothing else holds the graph while stopped
        self.graph
            .lock()
            .prepare(self.config.sample_rate, self.config.block_size)?;
        self.scratch = vec![vec![0.0; self.config.block_size]; self.config.input_channels];

        self.driver.start(
            &self.config,
            Arc::clone(&self.graph),
            Arc::clone(&self.params),
        )?;
        self.state = EngineState::Running;
        tracing::info!("Engine '{}' started", self.name);
        Ok(())
    }

    /// Stop the engine. Idempotent.
    ///
    /// Once this returns the callback loop is quiesced and the graph is
    /// no longer in use by it.
    pub fn stop(&mut self) {
        if self.state == EngineState::Stopped {
            return;
        }
        self.driver.stop();
        self.state = EngineState::Stopped;
        tracing::info!("Engine '{}' stopped", self.name);
    }

    /// Process one block offline and return the output channels.
    ///
    /// Input channels shorter than the block are padded with silence,
    /// longer ones truncated, and missing ones read as silence. The result
    /// always holds `output_channels` blocks of exactly `block_size` samples.
    pub fn compute(&mut self, inputs: &[&[Sample]]) -> Result<Vec<Vec<Sample>>> {
        if !self.is_running() {
            return Err(Error::NotRunning);
        }
        let mut outputs = vec![vec![0.0; self.config.block_size]; self.config.output_channels];
        {
            let mut output_refs: SmallVec<[&mut [Sample]; MAX_CHANNELS]> =
                outputs.iter_mut().map(Vec::as_mut_slice).collect();
            self.compute_into(inputs, &mut output_refs[..])?;
        }
        Ok(outputs)
    }

    /// Allocation-free `compute` into caller buffers.
    ///
    /// `outputs` must hold exactly `output_channels` slices of `block_size`
    /// samples.
    pub fn compute_into(
        &mut self,
        inputs: &[&[Sample]],
        outputs: &mut [&mut [Sample]],
    ) -> Result<()> {
        if !self.is_running() {
            return Err(Error::NotRunning);
        }
        let frames = self.config.block_size;
        if outputs.len() != self.config.output_channels
            || outputs.iter().any(|channel| channel.len() != frames)
        {
            return Err(Error::InvalidConfig(format!(
                "output must be {} channels of {} frames",
                self.config.output_channels, frames
            )));
        }

        for (index, channel) in self.scratch.iter_mut().enumerate() {
            let source = inputs.get(index).copied().unwrap_or(&[]);
            let len = source.len().min(frames);
            channel[..len].copy_from_slice(&source[..len]);
            channel[len..].fill(0.0);
        }

        self.params.snapshot_into(&mut self.snapshot);

        let Some(mut graph) = self.graph.try_lock_for(self.config.block_duration()) else {
            return Err(Error::ConcurrentAccess);
        };
        let input_refs: SmallVec<[&[Sample]; MAX_CHANNELS]> =
            self.scratch.iter().map(Vec::as_slice).collect();

        match graph.process(&self.snapshot, &input_refs[..], outputs) {
            Ok(()) => {}
            Err(BlockFailure::NotPrepared) => {
                tracing::warn!("Graph '{}' is not prepared; block silenced", self.name);
            }
            Err(BlockFailure::Node { index, error }) => {
                tracing::warn!(
                    "Node {} of '{}' failed: {}; its output was silenced",
                    index,
                    self.name,
                    error
                );
            }
        }
        Ok(())
    }

    /// Set a parameter by path or index. Out-of-range values are clamped.
    pub fn set_parameter<'k>(&self, key: impl Into<ParamKey<'k>>, value: f32) -> Result<()> {
        self.params.set_value(key, value)
    }

    pub fn get_parameter<'k>(&self, key: impl Into<ParamKey<'k>>) -> Result<f32> {
        self.params.get_value(key)
    }

    /// Return every parameter to its default.
    pub fn reset_parameters(&self) {
        self.params.reset_all();
    }

    /// Parameter descriptors in registration order.
    pub fn parameters(&self) -> Vec<ParamDescriptor> {
        self.params.list()
    }

    /// Shared registry, for control threads other than the owner's.
    pub fn params(&self) -> Arc<ParamRegistry> {
        Arc::clone(&self.params)
    }

    /// Control surface description; empty groups for a program without
    /// parameters.
    pub fn ui(&self) -> UiDescriptor {
        UiDescriptor::from_registry(
            self.name.clone(),
            self.config.input_channels,
            self.config.output_channels,
            &self.params,
        )
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Clear the graph's internal state (filter memories, phases).
    pub fn reset(&mut self) -> Result<()> {
        let Some(mut graph) = self.graph.try_lock_for(self.config.block_duration()) else {
            return Err(Error::ConcurrentAccess);
        };
        graph.reset();
        tracing::debug!("Engine '{}' graph reset", self.name);
        Ok(())
    }

    /// Drain the callback's events, logging each one.
    pub fn poll_events(&mut self) -> Vec<EngineEvent> {
        let events = self.driver.poll_events();
        for event in &events {
            match *event {
                EngineEvent::Started {
                    sample_rate,
                    block_size,
                } => {
                    tracing::info!(
                        "Audio callback running at {} Hz, {} frames",
                        sample_rate,
                        block_size
                    );
                }
                EngineEvent::Overrun {
                    block,
                    elapsed,
                    budget,
                } => {
                    tracing::warn!(
                        "Block {} overran its budget: {:?} > {:?}",
                        block,
                        elapsed,
                        budget
                    );
                }
                EngineEvent::ProcessFailed { block, node } => match node {
                    Some(node) => {
                        tracing::warn!("Block {}: node {} failed and was silenced", block, node);
                    }
                    None => tracing::warn!("Block {}: graph not prepared", block),
                },
                EngineEvent::Contended { block } => {
                    tracing::warn!("Block {} silenced: graph busy with offline compute", block);
                }
            }
        }
        events
    }

    /// Latest statistics from the callback loop.
    pub fn meter(&mut self) -> BlockMeter {
        self.driver.meter()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}
