use serde::{Deserialize, Serialize};

/// Test-tone waveform shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Sine,
    Triangle,
    Sawtooth,
    Square,
}

impl Waveform {
    /// Sample at the given phase (0.0 to 1.0), range -1 to 1
    pub fn generate(&self, phase: f32) -> f32 {
        use std::f32::consts::TAU;

        match self {
            Waveform::Sine => (phase * TAU).sin(),
            Waveform::Triangle => {
                if phase < 0.5 {
                    4.0 * phase - 1.0
                } else {
                    3.0 - 4.0 * phase
                }
            }
            Waveform::Sawtooth => 2.0 * phase - 1.0,
            Waveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sine_at_zero() {
        assert!(Waveform::Sine.generate(0.0).abs() < 0.001);
        assert!((Waveform::Sine.generate(0.25) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_triangle_range() {
        let wf = Waveform::Triangle;
        assert!((wf.generate(0.0) - (-1.0)).abs() < 0.001);
        assert!((wf.generate(0.5) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_square() {
        assert_eq!(Waveform::Square.generate(0.49), 1.0);
        assert_eq!(Waveform::Square.generate(0.5), -1.0);
    }

    #[test]
    fn test_deserialize_lowercase() {
        let wf: Waveform = serde_yaml::from_str("sawtooth").unwrap();
        assert_eq!(wf, Waveform::Sawtooth);
        assert!(serde_yaml::from_str::<Waveform>("noise").is_err());
    }
}
