//! Patch file format for saving/loading complete programs.
//!
//! Uses RON (Rust Object Notation) for human-readable, version-control-friendly
//! serialization of the engine configuration, the node graph (built-in
//! processors by kind) and initial parameter values.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;

use crate::builtin::BuiltinKind;
use crate::graph::{CompiledGraph, GraphBuilder, param_path};
use rtdsp_core::EngineConfig;
use rtdsp_processor::ParamRegistry;

/// Newest format version this build reads
pub const PATCH_VERSION: u32 = 1;

/// A node of the program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchNode {
    /// Unique node name; the middle segment of its parameter paths
    pub name: String,

    /// Which built-in processor to instantiate
    pub processor: BuiltinKind,

    /// Initial values by local parameter name (e.g. `"cutoff"`)
    #[serde(default)]
    pub parameters: BTreeMap<String, f32>,
}

impl PatchNode {
    /// Set an initial parameter value
    pub fn set(&mut self, param: impl Into<String>, value: f32) -> &mut Self {
        self.parameters.insert(param.into(), value);
        self
    }
}

/// Connection between two nodes, by name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatchConnection {
    /// Source node name
    pub from: String,

    /// Destination node name
    pub to: String,
}

/// Top-level patch structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    /// Format version for future compatibility
    pub version: u32,

    /// Program name; the first segment of every parameter path
    pub name: String,

    /// Engine format the program is meant to run at
    #[serde(default)]
    pub config: EngineConfig,

    /// Free-form program metadata
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,

    /// All nodes, in insertion order
    #[serde(default)]
    pub nodes: Vec<PatchNode>,

    /// Connections between nodes
    #[serde(default)]
    pub connections: Vec<PatchConnection>,
}

impl Patch {
    /// Create a new empty patch
    pub fn new(name: impl Into<String>, config: EngineConfig) -> Self {
        Self {
            version: PATCH_VERSION,
            name: name.into(),
            config,
            metadata: BTreeMap::new(),
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Append a node and return it for setting parameters
    pub fn add_node(&mut self, name: impl Into<String>, processor: BuiltinKind) -> &mut PatchNode {
        self.nodes.push(PatchNode {
            name: name.into(),
            processor,
            parameters: BTreeMap::new(),
        });
        let last = self.nodes.len() - 1;
        &mut self.nodes[last]
    }

    /// Connect two nodes by name
    pub fn connect(&mut self, from: impl Into<String>, to: impl Into<String>) {
        self.connections.push(PatchConnection {
            from: from.into(),
            to: to.into(),
        });
    }

    /// Serialize to pretty RON text
    pub fn to_ron_string(&self) -> Result<String, PatchError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| PatchError::SerializationFailed(e.to_string()))
    }

    /// Save patch to a RON file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be written or serialization fails
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PatchError> {
        let ron_string = self.to_ron_string()?;
        std::fs::write(path.as_ref(), ron_string)
            .map_err(|e| PatchError::IoError(e.to_string()))?;
        tracing::debug!("Saved patch '{}' to {}", self.name, path.as_ref().display());
        Ok(())
    }

    /// Load patch from a RON file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, deserialization fails, or the
    /// format version is newer than this build understands
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PatchError> {
        let ron_string = std::fs::read_to_string(path.as_ref())
            .map_err(|e| PatchError::IoError(e.to_string()))?;
        let patch: Self = ron_string.parse()?;
        tracing::debug!(
            "Loaded patch '{}' from {}: {} nodes, {} connections",
            patch.name,
            path.as_ref().display(),
            patch.nodes.len(),
            patch.connections.len()
        );
        Ok(patch)
    }

    /// Instantiate the program: processors, connections, metadata, and
    /// initial parameter values.
    ///
    /// # Errors
    ///
    /// Returns error for unknown connection endpoints, invalid node names,
    /// or initial values for parameters a processor does not declare
    pub fn build(&self) -> Result<CompiledGraph, PatchError> {
        let mut builder = GraphBuilder::new(self.name.clone());
        for (key, value) in &self.metadata {
            builder.insert_metadata(key.clone(), value.clone());
        }

        let mut ids = HashMap::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let id = builder.add_node(node.name.clone(), node.processor.create())?;
            ids.insert(node.name.as_str(), id);
        }

        for conn in &self.connections {
            let from = ids.get(conn.from.as_str()).ok_or_else(|| {
                PatchError::InvalidData(format!("Connection from unknown node '{}'", conn.from))
            })?;
            let to = ids.get(conn.to.as_str()).ok_or_else(|| {
                PatchError::InvalidData(format!("Connection to unknown node '{}'", conn.to))
            })?;
            builder.connect(*from, *to)?;
        }

        let compiled = builder.build()?;
        for node in &self.nodes {
            for (param, &value) in &node.parameters {
                compiled
                    .params
                    .set_value(param_path(&self.name, &node.name, param).as_str(), value)?;
            }
        }
        Ok(compiled)
    }

    /// Record the registry's current values as the nodes' initial values.
    pub fn store_parameters(&mut self, params: &ParamRegistry) {
        for node in &mut self.nodes {
            let prefix = param_path(&self.name, &node.name, "");
            for descriptor in params.iter() {
                let Some(local) = descriptor.id.strip_prefix(prefix.as_str()) else {
                    continue;
                };
                if let Ok(value) = params.get_value(descriptor.id.as_str()) {
                    node.parameters.insert(local.to_string(), value);
                }
            }
        }
    }
}

impl FromStr for Patch {
    type Err = PatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let patch: Self =
            ron::from_str(s).map_err(|e| PatchError::DeserializationFailed(e.to_string()))?;

        // Validate version
        if patch.version > PATCH_VERSION {
            return Err(PatchError::UnsupportedVersion(patch.version));
        }
        Ok(patch)
    }
}

/// Errors that can occur during patch operations
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    #[error("Unsupported patch version: {0}")]
    UnsupportedVersion(u32),

    #[error("Invalid patch data: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Engine(#[from] rtdsp_core::Error),
}
