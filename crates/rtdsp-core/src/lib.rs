//! Core types, configuration, and errors shared across the rtdsp crates.
//!
//! Everything else in the workspace depends on this crate; it has no
//! knowledge of processors, graphs, or audio devices.

mod config;

pub use config::EngineConfig;

/// Sample rate in Hz
pub type SampleRate = u32;

/// Number of audio frames (samples per channel)
pub type Frames = usize;

/// Audio sample type
pub type Sample = f32;

/// Number of audio channels
pub type ChannelCount = usize;

/// Upper bound on channels per node and per engine side.
///
/// The real-time path builds its channel tables on the stack, sized by this.
pub const MAX_CHANNELS: ChannelCount = 8;

/// Common sample rates
pub mod sample_rates {
    use super::SampleRate;

    /// 44.1 kHz sample rate (CD quality)
    pub const SR_44100: SampleRate = 44100;
    /// 48 kHz sample rate (professional audio standard)
    pub const SR_48000: SampleRate = 48000;
    /// 88.2 kHz sample rate (2x CD quality)
    pub const SR_88200: SampleRate = 88200;
    /// 96 kHz sample rate (high resolution audio)
    pub const SR_96000: SampleRate = 96000;
}

/// Audio buffer block sizes
pub mod block_sizes {
    use super::Frames;

    /// 64 frames per block (very low latency, ~1.3ms @ 48kHz)
    pub const BLOCK_64: Frames = 64;
    /// 128 frames per block (low latency, ~2.7ms @ 48kHz)
    pub const BLOCK_128: Frames = 128;
    /// 256 frames per block (balanced, ~5.3ms @ 48kHz)
    pub const BLOCK_256: Frames = 256;
    /// 512 frames per block (higher latency, ~10.7ms @ 48kHz)
    pub const BLOCK_512: Frames = 512;
}

/// Engine error taxonomy
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Engine configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `start` called while the engine or driver is already running
    #[error("Engine is already running")]
    AlreadyRunning,

    /// Operation requires a running engine
    #[error("Engine is not running")]
    NotRunning,

    /// No parameter registered under this id
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// A parameter with this id is already registered
    #[error("Duplicate parameter id: {0}")]
    DuplicateId(String),

    /// Parameter bounds or default are inconsistent
    #[error("Invalid range for {id}: min={min} max={max} default={default}")]
    InvalidRange {
        id: String,
        min: f32,
        max: f32,
        default: f32,
    },

    /// The signal graph is busy in another processing context
    #[error("Signal graph is busy in another processing context")]
    ConcurrentAccess,

    /// Graph construction error (unknown node, bad channel layout)
    #[error("Graph error: {0}")]
    Graph(String),

    /// Audio backend or device error
    #[error("Audio error: {0}")]
    Audio(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
