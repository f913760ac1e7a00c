use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use super::coordinator::{ControlMessage, Handshake, InitMessage, WorkerEvent};
use super::kernel::Kernel;
use super::state_block::StateBlock;
use super::wake::WaitOutcome;
use crate::error::{CapabilityError, ConfigurationError};
use crate::queue::{Consumer, Producer, RingBuffer};

/// Channels the worker thread talks through during setup and teardown
pub(crate) struct WorkerLinks {
    pub control_rx: Receiver<ControlMessage>,
    pub handshake_tx: Sender<Handshake>,
    pub events_tx: Sender<WorkerEvent>,
    /// Raised when the control side abandons setup
    pub cancel: Arc<AtomicBool>,
    pub capability_check: fn() -> Result<(), CapabilityError>,
}

/// Start the worker thread; it idles until the init message arrives
pub(crate) fn spawn<K>(
    kernel: K,
    wait_timeout: Duration,
    links: WorkerLinks,
) -> io::Result<JoinHandle<()>>
where
    K: Kernel + 'static,
{
    thread::Builder::new()
        .name("free-queue-worker".into())
        .spawn(move || run(kernel, wait_timeout, links))
}

fn run<K: Kernel>(kernel: K, wait_timeout: Duration, links: WorkerLinks) {
    let init = match links.control_rx.recv() {
        Ok(ControlMessage::Init(init)) => init,
        Err(_) => {
            debug!("control side went away before init");
            return;
        }
    };

    if let Err(err) = (links.capability_check)() {
        warn!(%err, "host cannot run a shared-memory session");
        let _ = links.events_tx.send(WorkerEvent::CapabilityError(err));
        return;
    }

    let mut worker = match Worker::allocate(kernel, init, wait_timeout) {
        Ok(setup) => setup,
        Err(err) => {
            warn!(%err, "rejected init message");
            let _ = links.events_tx.send(WorkerEvent::ConfigurationError(err));
            return;
        }
    };

    if links.cancel.load(Ordering::Acquire) {
        debug!("setup abandoned, releasing rings");
        return;
    }
    worker.set_cancel(Arc::clone(&links.cancel));

    let state = Arc::clone(worker.state());
    if let Some(handshake) = worker.take_handshake() {
        if links.handshake_tx.send(handshake).is_err() {
            warn!("callback side dropped before the handshake");
        }
    }
    let _ = links.events_tx.send(WorkerEvent::Ready {
        state: Arc::clone(&state),
    });
    info!(
        capacity = init.ring_capacity,
        channels = init.channel_count,
        kernel_block = init.kernel_block_length,
        "worker ready"
    );

    worker.run();

    let stats = state.counters().snapshot();
    info!(
        kernel_blocks = stats.kernel_blocks,
        spurious_wakes = stats.spurious_wakes,
        wait_timeouts = stats.wait_timeouts,
        "worker stopped"
    );
    let _ = links.events_tx.send(WorkerEvent::Stopped(stats));
}

/// Worker side of a session: input consumer, output producer and the kernel
pub struct Worker<K> {
    kernel: K,
    state: Arc<StateBlock>,
    input: Consumer,
    output: Producer,
    /// Callback halves, held until the handshake is sent
    callback_side: Option<(Producer, Consumer)>,
    input_block: Vec<Vec<f32>>,
    output_block: Vec<Vec<f32>>,
    wait_timeout: Duration,
    cancel: Option<Arc<AtomicBool>>,
}

impl<K: Kernel> Worker<K> {
    /// Allocate both rings and the state block on the calling thread
    pub fn allocate(
        kernel: K,
        init: InitMessage,
        wait_timeout: Duration,
    ) -> Result<Self, ConfigurationError> {
        init.validate()?;

        let (input_producer, input_consumer) =
            RingBuffer::new(init.ring_capacity, init.channel_count)?.split();
        let (output_producer, output_consumer) =
            RingBuffer::new(init.ring_capacity, init.channel_count)?.split();
        let state = Arc::new(StateBlock::new(
            init.ring_capacity,
            init.channel_count,
            init.kernel_block_length,
        ));

        let block = vec![vec![0.0f32; init.kernel_block_length]; init.channel_count];
        Ok(Self {
            kernel,
            state,
            input: input_consumer,
            output: output_producer,
            callback_side: Some((input_producer, output_consumer)),
            input_block: block.clone(),
            output_block: block,
            wait_timeout,
            cancel: None,
        })
    }

    /// Hand out the callback halves; `None` once they have been taken
    pub fn take_handshake(&mut self) -> Option<Handshake> {
        let (input, output) = self.callback_side.take()?;
        Some(Handshake {
            input,
            output,
            state: Arc::clone(&self.state),
        })
    }

    pub fn state(&self) -> &Arc<StateBlock> {
        &self.state
    }

    /// Flag that terminates the session once raised
    pub fn set_cancel(&mut self, cancel: Arc<AtomicBool>) {
        self.cancel = Some(cancel);
    }

    fn should_stop(&self) -> bool {
        if let Some(cancel) = &self.cancel {
            if cancel.load(Ordering::Acquire) && !self.state.is_terminating() {
                warn!("session cancelled by the control side");
                // also silences the callback side
                self.state.request_terminate();
            }
        }
        self.state.is_terminating()
    }

    /// Wait/drain loop; returns once terminate is requested
    pub fn run(&mut self) {
        let state = Arc::clone(&self.state);
        let wake = state.wake();
        loop {
            if self.should_stop() {
                break;
            }

            let outcome = wake.wait_while_idle(self.wait_timeout);
            if outcome == WaitOutcome::TimedOut {
                self.state.counters().record_wait_timeout();
            }
            if self.should_stop() {
                break;
            }

            // Re-arm before draining so a signal raised mid-drain is kept
            wake.reset();
            let blocks = self.drain();
            if blocks == 0 && outcome != WaitOutcome::TimedOut {
                self.state.counters().record_spurious_wake();
            }
        }
        self.state.mark_worker_stopped();
    }

    /// Process every whole kernel block waiting in the input ring
    pub fn drain(&mut self) -> usize {
        let block_length = self.state.kernel_block_length();
        let counters = self.state.counters();
        let mut blocks = 0;

        while self.input.available_to_read() >= block_length {
            if self.state.is_terminating() {
                break;
            }
            if let Err(err) = self.input.pull(&mut self.input_block, block_length) {
                warn!(%err, "input pull failed after availability check");
                break;
            }

            self.kernel.process(&self.input_block, &mut self.output_block);

            if self.output.push(&self.output_block, block_length).is_err() {
                counters.record_dropped_output(block_length);
            }
            counters.record_kernel_block();
            blocks += 1;
        }
        blocks
    }
}
