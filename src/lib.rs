//! Lock-free single-producer/single-consumer multi-channel audio rings and a
//! two-thread render session built on them.
//!
//! A real-time callback pushes fixed-size quanta into an input
//! [`RingBuffer`], wakes a worker thread that processes whole kernel blocks,
//! and pulls processed audio back from an output ring.

pub mod config;
pub mod dsp;
pub mod error;
pub mod host;
pub mod queue;
pub mod render;
pub mod types;

pub use error::{CapabilityError, ConfigurationError, HostError, QueueError, SessionError};
pub use queue::{Consumer, Producer, RingBuffer};
pub use render::{
    CallbackProcessor, CallbackStatus, Gain, InitMessage, Kernel, Passthrough, PreReadyPolicy,
    RenderCoordinator, SessionOptions, SessionPhase, StreamStats,
};
