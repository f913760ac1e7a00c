pub mod oscillator;

pub use oscillator::ToneGenerator;
