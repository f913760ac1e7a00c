use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

use super::wake::WakeFlag;

/// Session-wide shared state, created by the worker during setup
///
/// Ring read/write indices live inside each ring; everything else both
/// threads need (sizes, wake flag, teardown handshake, counters) lives here.
#[derive(Debug)]
pub struct StateBlock {
    capacity: usize,
    channel_count: usize,
    kernel_block_length: usize,
    wake: WakeFlag,
    terminate: AtomicBool,
    worker_stopped: AtomicBool,
    counters: StatsCounters,
}

impl StateBlock {
    /// Build the block with the wake flag bound to the calling (worker) thread
    pub fn new(capacity: usize, channel_count: usize, kernel_block_length: usize) -> Self {
        Self {
            capacity,
            channel_count,
            kernel_block_length,
            wake: WakeFlag::for_current_thread(),
            terminate: AtomicBool::new(false),
            worker_stopped: AtomicBool::new(false),
            counters: StatsCounters::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn kernel_block_length(&self) -> usize {
        self.kernel_block_length
    }

    pub fn wake(&self) -> &WakeFlag {
        &self.wake
    }

    pub fn counters(&self) -> &StatsCounters {
        &self.counters
    }

    /// Ask the worker to leave its loop; safe from the real-time thread
    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::Release);
        self.wake.force();
    }

    pub fn is_terminating(&self) -> bool {
        self.terminate.load(Ordering::Acquire)
    }

    /// Worker acknowledgement that it no longer touches the rings
    pub fn mark_worker_stopped(&self) {
        self.worker_stopped.store(true, Ordering::Release);
    }

    pub fn worker_stopped(&self) -> bool {
        self.worker_stopped.load(Ordering::Acquire)
    }
}

/// Relaxed event counters, written on the audio path and read anywhere
#[derive(Debug, Default)]
pub struct StatsCounters {
    quanta: AtomicU64,
    underruns: AtomicU64,
    dropped_input_frames: AtomicU64,
    dropped_output_frames: AtomicU64,
    misconfigured_quanta: AtomicU64,
    kernel_blocks: AtomicU64,
    wake_signals: AtomicU64,
    spurious_wakes: AtomicU64,
    wait_timeouts: AtomicU64,
}

impl StatsCounters {
    pub fn record_quantum(&self) {
        self.quanta.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_input(&self, frames: usize) {
        self.dropped_input_frames
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    pub fn record_dropped_output(&self, frames: usize) {
        self.dropped_output_frames
            .fetch_add(frames as u64, Ordering::Relaxed);
    }

    pub fn record_misconfigured(&self) {
        self.misconfigured_quanta.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_kernel_block(&self) {
        self.kernel_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wake_signal(&self) {
        self.wake_signals.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_spurious_wake(&self) {
        self.spurious_wakes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_wait_timeout(&self) {
        self.wait_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StreamStats {
        StreamStats {
            quanta: self.quanta.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            dropped_input_frames: self.dropped_input_frames.load(Ordering::Relaxed),
            dropped_output_frames: self.dropped_output_frames.load(Ordering::Relaxed),
            misconfigured_quanta: self.misconfigured_quanta.load(Ordering::Relaxed),
            kernel_blocks: self.kernel_blocks.load(Ordering::Relaxed),
            wake_signals: self.wake_signals.load(Ordering::Relaxed),
            spurious_wakes: self.spurious_wakes.load(Ordering::Relaxed),
            wait_timeouts: self.wait_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Copy of the session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    /// Callback invocations after the handshake
    pub quanta: u64,
    /// Quanta answered with silence because the output ring ran dry
    pub underruns: u64,
    /// Input frames dropped because the input ring was full
    pub dropped_input_frames: u64,
    /// Processed frames dropped because the output ring was full
    pub dropped_output_frames: u64,
    /// Quanta rejected because the host buffers did not match the session layout
    pub misconfigured_quanta: u64,
    /// Kernel blocks the worker processed
    pub kernel_blocks: u64,
    /// Wake notifications that actually raised the flag
    pub wake_signals: u64,
    /// Wakes that found no whole kernel block to process
    pub spurious_wakes: u64,
    /// Worker waits that ended on the safety-net timeout
    pub wait_timeouts: u64,
}
