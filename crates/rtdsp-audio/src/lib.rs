//! Audio engine and processing graph.
//!
//! This crate provides the signal graph, the built-in processors, the audio
//! backends (clocked thread, cpal device, offline), the real-time driver loop
//! and the [`Engine`] controller that ties them together.

pub mod backend;
pub mod builtin;
pub mod driver;
pub mod engine;
pub mod graph;
pub mod patch;

pub use backend::{AudioBackend, BlockCallback, ClockedBackend, CpalBackend, OfflineBackend};
pub use driver::AudioDriver;
pub use engine::{Engine, EngineState};
pub use graph::{CompiledGraph, GraphBuilder, NodeId, SignalGraph};
pub use patch::{Patch, PatchError};
