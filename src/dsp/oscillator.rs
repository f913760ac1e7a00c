use crate::types::waveform::Waveform;

/// Phase-accumulating test tone, written identically to every channel
///
/// Stands in for live captured audio: the host adapters fill each input
/// quantum from it before handing the quantum to the callback processor.
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    /// Current phase position (0.0 to 1.0)
    phase: f32,
    /// Phase increment per frame (frequency / sample_rate)
    phase_delta: f32,
    amplitude: f32,
    waveform: Waveform,
}

impl ToneGenerator {
    pub fn new(sample_rate: f32, frequency: f32, amplitude: f32, waveform: Waveform) -> Self {
        Self {
            phase: 0.0,
            phase_delta: frequency / sample_rate,
            amplitude,
            waveform,
        }
    }

    pub fn next_sample(&mut self) -> f32 {
        let output = self.waveform.generate(self.phase) * self.amplitude;

        self.phase += self.phase_delta;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }

        output
    }

    /// Fill the first `frames` samples of every channel
    pub fn fill(&mut self, channels: &mut [Vec<f32>], frames: usize) {
        for frame in 0..frames {
            let sample = self.next_sample();
            for channel in channels.iter_mut() {
                channel[frame] = sample;
            }
        }
    }
}
