pub mod waveform;

pub use waveform::Waveform;
