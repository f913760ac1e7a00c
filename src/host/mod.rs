pub mod cpal_host;
pub mod quantum;
pub mod simulated;

pub use cpal_host::{CpalHost, find_audio_device, list_audio_devices};
pub use quantum::{PeakMeter, QuantumDriver};
pub use simulated::SimulatedHost;

use crate::dsp::oscillator::ToneGenerator;

/// Producer of the "live" input fed into each render quantum
pub trait QuantumSource: Send {
    /// Fill the first `frames` samples of every channel
    fn fill(&mut self, input: &mut [Vec<f32>], frames: usize);
}

impl QuantumSource for ToneGenerator {
    fn fill(&mut self, input: &mut [Vec<f32>], frames: usize) {
        ToneGenerator::fill(self, input, frames);
    }
}

/// Input that is always zero
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentSource;

impl QuantumSource for SilentSource {
    fn fill(&mut self, input: &mut [Vec<f32>], frames: usize) {
        for channel in input.iter_mut() {
            channel[..frames].fill(0.0);
        }
    }
}
