use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

const IDLE: u32 = 0;
const SIGNALED: u32 = 1;

/// Result of [`WakeFlag::wait_while_idle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The flag was raised while parked
    Woken,
    /// The flag was already raised, no wait happened
    NotEqual,
    /// The safety-net timeout elapsed with the flag still idle
    TimedOut,
}

/// Wait-while-equal / notify signal bound to one waiting thread
///
/// The real-time side only calls [`notify`](Self::notify) or
/// [`force`](Self::force), neither of which blocks. The worker thread the flag
/// was created for is the only thread allowed to wait. Park tokens make the
/// check-then-park sequence atomic: an unpark that lands between the flag
/// check and the park makes the park return immediately.
#[derive(Debug)]
pub struct WakeFlag {
    value: AtomicU32,
    waiter: Thread,
}

impl WakeFlag {
    /// Bind a new idle flag to the calling thread
    pub fn for_current_thread() -> Self {
        Self::new(thread::current())
    }

    pub fn new(waiter: Thread) -> Self {
        Self {
            value: AtomicU32::new(IDLE),
            waiter,
        }
    }

    /// Raise the flag and wake the waiter
    /// Returns false when the flag was already raised (nothing to do)
    pub fn notify(&self) -> bool {
        if self.value.swap(SIGNALED, Ordering::AcqRel) == IDLE {
            self.waiter.unpark();
            true
        } else {
            false
        }
    }

    /// Raise the flag and unpark unconditionally
    pub fn force(&self) {
        self.value.store(SIGNALED, Ordering::Release);
        self.waiter.unpark();
    }

    pub fn is_set(&self) -> bool {
        self.value.load(Ordering::Acquire) != IDLE
    }

    /// Return the flag to idle, reporting whether it was raised
    pub fn reset(&self) -> bool {
        self.value.swap(IDLE, Ordering::AcqRel) != IDLE
    }

    /// Park while the flag is idle, for at most `timeout`
    pub fn wait_while_idle(&self, timeout: Duration) -> WaitOutcome {
        debug_assert_eq!(
            thread::current().id(),
            self.waiter.id(),
            "wake flag waited on from a foreign thread"
        );

        if self.is_set() {
            return WaitOutcome::NotEqual;
        }

        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                return WaitOutcome::TimedOut;
            }
            thread::park_timeout(deadline - now);
            // Stale tokens and spurious unparks fall through and re-arm
            if self.is_set() {
                return WaitOutcome::Woken;
            }
        }
    }
}
