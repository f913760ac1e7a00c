pub mod capability;
pub mod coordinator;
pub mod kernel;
pub mod state_block;
pub mod wake;
pub mod worker;

pub use capability::detect_capabilities;
pub use coordinator::{
    CallbackProcessor, CallbackStatus, DEFAULT_QUANTUM_FRAMES, Handshake, InitMessage,
    PreReadyPolicy, RenderCoordinator, SessionOptions, SessionPhase, WorkerEvent,
};
pub use kernel::{Gain, Kernel, Passthrough};
pub use state_block::{StateBlock, StatsCounters, StreamStats};
pub use wake::{WaitOutcome, WakeFlag};
pub use worker::Worker;
