use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use super::QuantumSource;
use crate::error::ConfigurationError;
use crate::render::{CallbackProcessor, CallbackStatus};

/// Highest absolute sample level rendered so far (stored as f32 bits)
#[derive(Debug, Default)]
pub struct PeakMeter {
    bits: AtomicU32,
}

impl PeakMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&self, level: f32) {
        if !level.is_finite() {
            return;
        }
        // Non-negative f32 bit patterns order the same way as their values
        self.bits.fetch_max(level.abs().to_bits(), Ordering::Relaxed);
    }

    pub fn peak(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.bits.store(0, Ordering::Relaxed);
    }
}

/// Adapts host buffers of arbitrary length to fixed render quanta
///
/// Each quantum is filled from the source, run through the callback
/// processor, and handed out frame by frame across as many host callbacks as
/// it takes. All buffers are sized once in [`new`](Self::new).
pub struct QuantumDriver<S> {
    processor: CallbackProcessor,
    source: S,
    input: Vec<Vec<f32>>,
    output: Vec<Vec<f32>>,
    /// Next unread frame of `output`; equal to the quantum when drained
    cursor: usize,
    meter: Arc<PeakMeter>,
    last_status: Option<CallbackStatus>,
}

impl<S: QuantumSource> QuantumDriver<S> {
    /// Size the buffers for `channel_count` channels
    ///
    /// Once the session is initialized the count must match its layout.
    pub fn new(
        mut processor: CallbackProcessor,
        source: S,
        channel_count: usize,
    ) -> Result<Self, ConfigurationError> {
        if channel_count == 0 {
            return Err(ConfigurationError::ZeroChannels);
        }
        if let Some(expected) = processor.channel_count() {
            if expected != channel_count {
                return Err(ConfigurationError::ChannelCountMismatch {
                    expected,
                    actual: channel_count,
                });
            }
        }
        let quantum = processor.quantum_frames();
        Ok(Self {
            processor,
            source,
            input: vec![vec![0.0; quantum]; channel_count],
            output: vec![vec![0.0; quantum]; channel_count],
            cursor: quantum,
            meter: Arc::new(PeakMeter::new()),
            last_status: None,
        })
    }

    pub fn meter(&self) -> Arc<PeakMeter> {
        Arc::clone(&self.meter)
    }

    pub fn processor(&self) -> &CallbackProcessor {
        &self.processor
    }

    pub fn last_status(&self) -> Option<CallbackStatus> {
        self.last_status
    }

    pub fn channel_count(&self) -> usize {
        self.output.len()
    }

    /// Run one quantum through the processor, discarding any leftover frames
    pub fn render_quantum(&mut self) -> CallbackStatus {
        let frames = self.processor.quantum_frames();
        self.source.fill(&mut self.input, frames);
        let status = self.processor.process(&self.input, &mut self.output);

        let peak = self
            .output
            .iter()
            .flat_map(|channel| channel[..frames].iter())
            .fold(0.0f32, |peak, sample| peak.max(sample.abs()));
        self.meter.observe(peak);

        self.cursor = 0;
        self.last_status = Some(status);
        status
    }

    /// Planar view of the last rendered quantum
    pub fn output(&self) -> &[Vec<f32>] {
        &self.output
    }

    /// Fill an interleaved host buffer, rendering new quanta as needed
    ///
    /// Host channels beyond the session's channel count repeat the session
    /// channels in order.
    pub fn render_interleaved<T, F>(&mut self, data: &mut [T], host_channels: usize, convert: F)
    where
        F: Fn(f32) -> T,
    {
        if host_channels == 0 {
            return;
        }
        let quantum = self.processor.quantum_frames();
        let channels = self.output.len();

        for frame in data.chunks_mut(host_channels) {
            if self.cursor >= quantum {
                self.render_quantum();
            }
            for (index, sample) in frame.iter_mut().enumerate() {
                *sample = convert(self.output[index % channels][self.cursor]);
            }
            self.cursor += 1;
        }
    }

    /// Signal termination from the callback side
    pub fn stop(&mut self) {
        self.processor.stop();
    }
}
