use std::time::Duration;

use thiserror::Error;

/// Invalid construction or call parameters
/// Fatal to setup, never retried
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("ring capacity must be greater than zero")]
    ZeroCapacity,

    #[error("channel count must be greater than zero")]
    ZeroChannels,

    #[error("kernel block length must be greater than zero")]
    ZeroKernelBlock,

    #[error("render quantum must be greater than zero")]
    ZeroQuantum,

    #[error("ring capacity of {capacity} frames cannot be allocated")]
    CapacityTooLarge { capacity: usize },

    #[error("{what} of {frames} frames exceeds ring capacity of {capacity} frames")]
    ExceedsCapacity {
        what: &'static str,
        frames: usize,
        capacity: usize,
    },

    #[error("expected {expected} channels, got {actual}")]
    ChannelCountMismatch { expected: usize, actual: usize },

    #[error("channel {channel} holds {len} frames but {frames} were requested")]
    ChannelTooShort {
        channel: usize,
        len: usize,
        frames: usize,
    },
}

/// Failure of a single push or pull
/// Insufficient space/data leaves the ring untouched
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("not enough space: {requested} frames requested, {available} writable")]
    InsufficientSpace { requested: usize, available: usize },

    #[error("not enough data: {requested} frames requested, {available} readable")]
    InsufficientData { requested: usize, available: usize },

    #[error(transparent)]
    Config(#[from] ConfigurationError),
}

impl QueueError {
    /// Whether the failure is a transient over/underrun rather than misuse
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            QueueError::InsufficientSpace { .. } | QueueError::InsufficientData { .. }
        )
    }
}

/// The compilation target cannot share atomics between threads
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("target has no native {0}-bit atomics")]
    MissingAtomics(u32),

    #[error("target has no shared-memory threads")]
    NoThreads,
}

/// Errors surfaced by session setup and teardown
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error("failed to spawn worker thread")]
    Spawn(#[source] std::io::Error),

    #[error("session is {actual:?}, expected {expected:?}")]
    InvalidPhase {
        expected: crate::render::SessionPhase,
        actual: crate::render::SessionPhase,
    },

    #[error("worker did not report ready within {0:?}")]
    SetupTimeout(Duration),

    #[error("worker did not acknowledge termination within {0:?}")]
    TeardownTimeout(Duration),

    #[error("worker thread exited unexpectedly")]
    WorkerGone,
}

/// Audio host setup failures
#[derive(Debug, Error)]
pub enum HostError {
    #[error("no audio output devices found")]
    NoDevices,

    #[error("audio device index {index} out of range (0-{last})")]
    DeviceIndexOutOfRange { index: usize, last: usize },

    #[error("audio device '{0}' not found")]
    DeviceNotFound(String),

    #[error("unsupported sample format {0}")]
    UnsupportedSampleFormat(String),

    #[error(transparent)]
    Devices(#[from] cpal::DevicesError),

    #[error(transparent)]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error(transparent)]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error(transparent)]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("failed to spawn clock thread")]
    Spawn(#[source] std::io::Error),
}
