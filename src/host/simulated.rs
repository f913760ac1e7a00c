use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::QuantumSource;
use super::quantum::QuantumDriver;
use crate::error::HostError;

/// Headless stand-in for an audio device
///
/// A clock thread renders one quantum per quantum period, paced against a
/// monotonic deadline so the average rate matches the sample rate.
pub struct SimulatedHost<S> {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<QuantumDriver<S>>>,
    period: Duration,
}

impl<S: QuantumSource + 'static> SimulatedHost<S> {
    pub fn start(mut driver: QuantumDriver<S>, sample_rate: u32) -> Result<Self, HostError> {
        let quantum = driver.processor().quantum_frames() as u64;
        let period = Duration::from_nanos(quantum * 1_000_000_000 / u64::from(sample_rate.max(1)));
        let running = Arc::new(AtomicBool::new(true));

        let flag = Arc::clone(&running);
        let handle = thread::Builder::new()
            .name("free-queue-clock".into())
            .spawn(move || {
                let mut deadline = Instant::now();
                while flag.load(Ordering::Acquire) {
                    driver.render_quantum();
                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else if now - deadline > period * 8 {
                        // Fell far behind; resync rather than burst
                        deadline = now;
                    }
                }
                driver
            })
            .map_err(HostError::Spawn)?;

        debug!(?period, "simulated host started");
        Ok(Self {
            running,
            handle: Some(handle),
            period,
        })
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Stop the clock and hand the driver back
    pub fn stop(mut self) -> Option<QuantumDriver<S>> {
        self.halt()
    }

    fn halt(&mut self) -> Option<QuantumDriver<S>> {
        self.running.store(false, Ordering::Release);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(driver) => Some(driver),
            Err(_) => {
                warn!("clock thread panicked");
                None
            }
        }
    }
}

impl<S> Drop for SimulatedHost<S> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
