/// Block processor run on the worker thread
///
/// `input` and `output` hold one `Vec` per channel, each exactly one kernel
/// block long. The worker never calls this from the real-time thread, so
/// implementations may take their time (within the ring's latency budget).
pub trait Kernel: Send {
    fn process(&mut self, input: &[Vec<f32>], output: &mut [Vec<f32>]);
}

impl<F> Kernel for F
where
    F: FnMut(&[Vec<f32>], &mut [Vec<f32>]) + Send,
{
    fn process(&mut self, input: &[Vec<f32>], output: &mut [Vec<f32>]) {
        self(input, output)
    }
}

/// Copies input to output unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Kernel for Passthrough {
    fn process(&mut self, input: &[Vec<f32>], output: &mut [Vec<f32>]) {
        for (src, dst) in input.iter().zip(output.iter_mut()) {
            dst.copy_from_slice(src);
        }
    }
}

/// Scales every sample by a fixed factor, no clipping
#[derive(Debug, Clone, Copy)]
pub struct Gain {
    gain: f32,
}

impl Gain {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }
}

impl Default for Gain {
    fn default() -> Self {
        Self::new(0.1)
    }
}

impl Kernel for Gain {
    fn process(&mut self, input: &[Vec<f32>], output: &mut [Vec<f32>]) {
        for (src, dst) in input.iter().zip(output.iter_mut()) {
            for (o, &i) in dst.iter_mut().zip(src.iter()) {
                *o = i * self.gain;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        let input = vec![vec![0.5, -0.5], vec![1.0, 0.0]];
        let mut output = vec![vec![0.0; 2]; 2];
        Passthrough.process(&input, &mut output);
        assert_eq!(output, input);
    }

    #[test]
    fn test_gain_does_not_clip() {
        let input = vec![vec![1.0, -1.0, 20.0]];
        let mut output = vec![vec![0.0; 3]];
        Gain::new(0.5).process(&input, &mut output);
        assert_eq!(output[0], vec![0.5, -0.5, 10.0]);
    }

    #[test]
    fn test_default_gain() {
        assert_eq!(Gain::default().gain(), 0.1);
    }

    #[test]
    fn test_closure_kernel() {
        let mut calls = 0;
        let mut invert = |input: &[Vec<f32>], output: &mut [Vec<f32>]| {
            calls += 1;
            for (src, dst) in input.iter().zip(output.iter_mut()) {
                for (o, i) in dst.iter_mut().zip(src) {
                    *o = -i;
                }
            }
        };
        let mut output = vec![vec![0.0; 2]];
        invert.process(&[vec![0.25, -1.0]], &mut output);
        assert_eq!(output[0], vec![-0.25, 1.0]);
        drop(invert);
        assert_eq!(calls, 1);
    }
}
