use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded, unbounded};
use tracing::{debug, info, warn};

use super::capability::detect_capabilities;
use super::kernel::Kernel;
use super::state_block::{StateBlock, StreamStats};
use super::worker::{self, WorkerLinks};
use crate::error::{CapabilityError, ConfigurationError, SessionError};
use crate::queue::{Consumer, Producer};

/// Render quantum of a Web Audio style host
pub const DEFAULT_QUANTUM_FRAMES: usize = 128;

/// Lifecycle of a render session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Initializing,
    Ready,
    TornDown,
}

/// One-time setup parameters sent from the control side to the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitMessage {
    pub ring_capacity: usize,
    pub channel_count: usize,
    pub kernel_block_length: usize,
}

impl InitMessage {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.ring_capacity == 0 {
            return Err(ConfigurationError::ZeroCapacity);
        }
        if self.channel_count == 0 {
            return Err(ConfigurationError::ZeroChannels);
        }
        if self.kernel_block_length == 0 {
            return Err(ConfigurationError::ZeroKernelBlock);
        }
        if self.kernel_block_length > self.ring_capacity {
            return Err(ConfigurationError::ExceedsCapacity {
                what: "kernel block",
                frames: self.kernel_block_length,
                capacity: self.ring_capacity,
            });
        }
        Ok(())
    }
}

/// What the callback does before the handshake has arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreReadyPolicy {
    #[default]
    Silence,
    /// Copy input straight to output
    Bypass,
}

/// Tunables of a session that are not part of the init message
#[derive(Debug, Clone, Copy)]
pub struct SessionOptions {
    pub quantum_frames: usize,
    /// Safety-net timeout for each worker wait
    pub wait_timeout: Duration,
    pub setup_timeout: Duration,
    pub teardown_timeout: Duration,
    pub pre_ready: PreReadyPolicy,
    /// Run by the worker before it allocates anything
    pub capability_check: fn() -> Result<(), CapabilityError>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            quantum_frames: DEFAULT_QUANTUM_FRAMES,
            wait_timeout: Duration::from_millis(100),
            setup_timeout: Duration::from_secs(2),
            teardown_timeout: Duration::from_secs(2),
            pre_ready: PreReadyPolicy::Silence,
            capability_check: detect_capabilities,
        }
    }
}

impl SessionOptions {
    /// Check the options against the rings the init message will create
    pub fn validate_for(&self, init: &InitMessage) -> Result<(), ConfigurationError> {
        init.validate()?;
        if self.quantum_frames == 0 {
            return Err(ConfigurationError::ZeroQuantum);
        }
        if self.quantum_frames > init.ring_capacity {
            return Err(ConfigurationError::ExceedsCapacity {
                what: "render quantum",
                frames: self.quantum_frames,
                capacity: init.ring_capacity,
            });
        }
        Ok(())
    }
}

pub(crate) enum ControlMessage {
    Init(InitMessage),
}

/// Shared-memory handles passed from the worker to the callback side
#[derive(Debug)]
pub struct Handshake {
    /// Callback pushes captured quanta here
    pub input: Producer,
    /// Callback pulls processed quanta from here
    pub output: Consumer,
    pub state: Arc<StateBlock>,
}

/// Notifications from the worker to the control side
#[derive(Debug)]
pub enum WorkerEvent {
    Ready { state: Arc<StateBlock> },
    ConfigurationError(ConfigurationError),
    CapabilityError(CapabilityError),
    /// Teardown acknowledgement: the worker no longer touches the rings
    Stopped(StreamStats),
}

/// Control-side owner of a session: worker thread, phase and teardown
pub struct RenderCoordinator {
    phase: SessionPhase,
    options: SessionOptions,
    control_tx: Option<Sender<ControlMessage>>,
    events_rx: Receiver<WorkerEvent>,
    worker: Option<JoinHandle<()>>,
    state: Option<Arc<StateBlock>>,
    final_stats: Option<StreamStats>,
    /// Set once the control side gives up on setup
    cancel: Arc<AtomicBool>,
}

impl RenderCoordinator {
    /// Start the worker thread and build the processor for the host callback
    ///
    /// The returned [`CallbackProcessor`] is inert (silence or bypass) until
    /// [`initialize`](Self::initialize) completes the handshake.
    pub fn spawn<K>(kernel: K, options: SessionOptions) -> Result<(Self, CallbackProcessor), SessionError>
    where
        K: Kernel + 'static,
    {
        if options.quantum_frames == 0 {
            return Err(ConfigurationError::ZeroQuantum.into());
        }

        let (control_tx, control_rx) = bounded(1);
        let (handshake_tx, handshake_rx) = bounded(1);
        let (events_tx, events_rx) = unbounded();
        let cancel = Arc::new(AtomicBool::new(false));

        let handle = worker::spawn(
            kernel,
            options.wait_timeout,
            WorkerLinks {
                control_rx,
                handshake_tx,
                events_tx,
                cancel: Arc::clone(&cancel),
                capability_check: options.capability_check,
            },
        )
        .map_err(SessionError::Spawn)?;

        let processor = CallbackProcessor::new(handshake_rx, options.quantum_frames, options.pre_ready);
        let coordinator = Self {
            phase: SessionPhase::Uninitialized,
            options,
            control_tx: Some(control_tx),
            events_rx,
            worker: Some(handle),
            state: None,
            final_stats: None,
            cancel,
        };
        Ok((coordinator, processor))
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Send the init message and wait for the worker to report ready
    pub fn initialize(&mut self, init: InitMessage) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Uninitialized {
            return Err(SessionError::InvalidPhase {
                expected: SessionPhase::Uninitialized,
                actual: self.phase,
            });
        }
        self.options.validate_for(&init)?;

        self.phase = SessionPhase::Initializing;
        debug!(?init, "sending init message");
        let sent = self
            .control_tx
            .as_ref()
            .map(|tx| tx.send(ControlMessage::Init(init)).is_ok())
            .unwrap_or(false);
        if !sent {
            self.abort();
            return Err(SessionError::WorkerGone);
        }

        match self.events_rx.recv_timeout(self.options.setup_timeout) {
            Ok(WorkerEvent::Ready { state }) => {
                self.state = Some(state);
                self.phase = SessionPhase::Ready;
                info!(
                    capacity = init.ring_capacity,
                    channels = init.channel_count,
                    kernel_block = init.kernel_block_length,
                    quantum = self.options.quantum_frames,
                    "session ready"
                );
                Ok(())
            }
            Ok(WorkerEvent::ConfigurationError(err)) => {
                self.abort();
                Err(err.into())
            }
            Ok(WorkerEvent::CapabilityError(err)) => {
                self.abort();
                Err(err.into())
            }
            Ok(WorkerEvent::Stopped(_)) | Err(RecvTimeoutError::Disconnected) => {
                self.abort();
                Err(SessionError::WorkerGone)
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("worker missed the setup deadline, detaching it");
                self.detach();
                Err(SessionError::SetupTimeout(self.options.setup_timeout))
            }
        }
    }

    /// Current counters, once the session is ready
    pub fn stats(&self) -> Option<StreamStats> {
        self.state
            .as_ref()
            .map(|state| state.counters().snapshot())
            .or(self.final_stats)
    }

    pub fn state(&self) -> Option<&Arc<StateBlock>> {
        self.state.as_ref()
    }

    /// Terminate handshake: signal the worker, wait for its acknowledgement,
    /// join it and release the shared state
    ///
    /// The host must already have stopped invoking the callback.
    pub fn shutdown(mut self) -> Result<StreamStats, SessionError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<StreamStats, SessionError> {
        match self.phase {
            SessionPhase::TornDown => return Ok(self.final_stats.unwrap_or_default()),
            SessionPhase::Uninitialized | SessionPhase::Initializing => {
                self.abort();
                return Ok(StreamStats::default());
            }
            SessionPhase::Ready => {}
        }

        let Some(state) = self.state.take() else {
            self.abort();
            return Ok(StreamStats::default());
        };
        state.request_terminate();

        let acknowledged = loop {
            match self.events_rx.recv_timeout(self.options.teardown_timeout) {
                Ok(WorkerEvent::Stopped(_)) => break true,
                Ok(other) => debug!(?other, "ignoring late worker event"),
                Err(_) => break false,
            }
        };

        let stats = state.counters().snapshot();
        self.final_stats = Some(stats);
        self.phase = SessionPhase::TornDown;
        self.control_tx = None;

        if !acknowledged && !state.worker_stopped() {
            warn!("worker did not acknowledge termination");
            // Leave the thread detached; the Arc keeps the rings alive for it
            self.worker = None;
            return Err(SessionError::TeardownTimeout(self.options.teardown_timeout));
        }

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("worker thread panicked");
                return Err(SessionError::WorkerGone);
            }
        }
        info!(
            quanta = stats.quanta,
            underruns = stats.underruns,
            dropped_input_frames = stats.dropped_input_frames,
            "session torn down"
        );
        Ok(stats)
    }

    /// Release the worker when no session was ever established
    fn abort(&mut self) {
        self.cancel_setup();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        self.phase = SessionPhase::TornDown;
    }

    /// Give up on an unresponsive worker without joining it
    ///
    /// The worker still sees the cancel flag: it either never hands out the
    /// rings or terminates the session as soon as it enters its loop.
    fn detach(&mut self) {
        self.cancel_setup();
        self.worker = None;
        self.phase = SessionPhase::TornDown;
    }

    fn cancel_setup(&mut self) {
        self.cancel.store(true, Ordering::Release);
        self.control_tx = None;
        // A late Ready still carries the state needed to stop the worker
        while let Ok(event) = self.events_rx.try_recv() {
            if let WorkerEvent::Ready { state } = event {
                state.request_terminate();
            }
        }
        if let Some(state) = self.state.take() {
            state.request_terminate();
        }
    }
}

impl Drop for RenderCoordinator {
    fn drop(&mut self) {
        if self.phase != SessionPhase::TornDown {
            if let Err(err) = self.teardown() {
                warn!(%err, "teardown on drop failed");
            }
        }
    }
}

/// Outcome of one callback invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackStatus {
    /// No handshake yet; pre-ready policy applied
    Bypassed,
    Rendered,
    /// Output ring ran dry; silence emitted
    Underrun,
    /// Host buffers do not match the session's channel layout; silence emitted
    Misconfigured,
    /// Terminate requested; silence emitted
    Stopped,
}

/// Real-time half of a session, owned by the host audio callback
///
/// [`process`](Self::process) never blocks, never allocates and never
/// panics on over/underrun.
pub struct CallbackProcessor {
    handshake_rx: Receiver<Handshake>,
    link: Option<Handshake>,
    quantum_frames: usize,
    pre_ready: PreReadyPolicy,
    stop_requested: bool,
}

impl CallbackProcessor {
    fn new(handshake_rx: Receiver<Handshake>, quantum_frames: usize, pre_ready: PreReadyPolicy) -> Self {
        Self {
            handshake_rx,
            link: None,
            quantum_frames,
            pre_ready,
            stop_requested: false,
        }
    }

    pub fn quantum_frames(&self) -> usize {
        self.quantum_frames
    }

    /// Whether the handshake has been received and the session is live
    pub fn is_ready(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| !link.state.is_terminating())
    }

    /// Session channel count, once the handshake has arrived
    ///
    /// Polls for the handshake, so call it from the control thread before
    /// the processor is handed to the host.
    pub fn channel_count(&mut self) -> Option<usize> {
        if self.link.is_none() {
            self.poll_handshake();
        }
        self.link.as_ref().map(|link| link.state.channel_count())
    }

    pub fn stats(&self) -> Option<StreamStats> {
        self.link
            .as_ref()
            .map(|link| link.state.counters().snapshot())
    }

    /// Render one quantum: push input, pull output, wake the worker if a
    /// kernel block is waiting
    ///
    /// Each channel of `input` and `output` must hold at least one quantum.
    pub fn process<I, O>(&mut self, input: &[I], output: &mut [O]) -> CallbackStatus
    where
        I: AsRef<[f32]>,
        O: AsMut<[f32]>,
    {
        if self.link.is_none() {
            self.poll_handshake();
        }
        let Some(link) = self.link.as_mut() else {
            match self.pre_ready {
                PreReadyPolicy::Silence => fill_silence(output),
                PreReadyPolicy::Bypass => bypass(input, output),
            }
            return CallbackStatus::Bypassed;
        };

        let state = &link.state;
        if state.is_terminating() {
            fill_silence(output);
            return CallbackStatus::Stopped;
        }

        let frames = self.quantum_frames;
        let counters = state.counters();
        let channels = state.channel_count();
        if input.len() != channels || output.len() != channels {
            fill_silence(output);
            counters.record_misconfigured();
            return CallbackStatus::Misconfigured;
        }
        counters.record_quantum();

        // A full input ring drops this quantum; never retry on this thread
        if let Err(err) = link.input.push(input, frames) {
            if !err.is_transient() {
                fill_silence(output);
                counters.record_misconfigured();
                return CallbackStatus::Misconfigured;
            }
            counters.record_dropped_input(frames);
        }

        let status = match link.output.pull(output, frames) {
            Ok(()) => CallbackStatus::Rendered,
            Err(err) if err.is_transient() => {
                fill_silence(output);
                counters.record_underrun();
                CallbackStatus::Underrun
            }
            Err(_) => {
                fill_silence(output);
                counters.record_misconfigured();
                CallbackStatus::Misconfigured
            }
        };

        if link.input.available_to_read() >= state.kernel_block_length() && state.wake().notify() {
            counters.record_wake_signal();
        }

        status
    }

    /// Stop touching the rings and tell the worker to terminate
    pub fn stop(&mut self) {
        self.stop_requested = true;
        if let Some(link) = &self.link {
            link.state.request_terminate();
        }
    }

    fn poll_handshake(&mut self) {
        if let Ok(handshake) = self.handshake_rx.try_recv() {
            if self.stop_requested {
                handshake.state.request_terminate();
            }
            self.link = Some(handshake);
        }
    }
}

fn fill_silence<O: AsMut<[f32]>>(output: &mut [O]) {
    for channel in output.iter_mut() {
        channel.as_mut().fill(0.0);
    }
}

fn bypass<I: AsRef<[f32]>, O: AsMut<[f32]>>(input: &[I], output: &mut [O]) {
    for (index, channel) in output.iter_mut().enumerate() {
        let dst = channel.as_mut();
        match input.get(index) {
            Some(src) => {
                let src = src.as_ref();
                let frames = src.len().min(dst.len());
                dst[..frames].copy_from_slice(&src[..frames]);
                dst[frames..].fill(0.0);
            }
            None => dst.fill(0.0),
        }
    }
}
