use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::host::cpal_host::DEFAULT_DEVICE;
use crate::render::{InitMessage, PreReadyPolicy, SessionOptions};
use crate::types::waveform::Waveform;

/// Top-level configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub worker: WorkerConfig,

    #[serde(default)]
    pub kernel: KernelConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub device: DeviceConfig,
}

impl SessionConfig {
    /// Load configuration from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: SessionConfig =
            serde_yaml::from_str(content).context("Failed to parse YAML config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.session_options()
            .validate_for(&self.init_message())
            .context("Invalid stream configuration")?;
        self.worker.validate().context("Invalid worker configuration")?;
        self.kernel.validate().context("Invalid kernel configuration")?;
        self.source.validate().context("Invalid source configuration")?;
        Ok(())
    }

    pub fn init_message(&self) -> InitMessage {
        InitMessage {
            ring_capacity: self.stream.capacity,
            channel_count: self.stream.channels,
            kernel_block_length: self.stream.kernel_block,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            quantum_frames: self.stream.quantum,
            wait_timeout: Duration::from_millis(self.worker.wait_timeout_ms),
            setup_timeout: Duration::from_millis(self.worker.setup_timeout_ms),
            teardown_timeout: Duration::from_millis(self.worker.teardown_timeout_ms),
            pre_ready: if self.stream.bypass_until_ready {
                PreReadyPolicy::Bypass
            } else {
                PreReadyPolicy::Silence
            },
            ..SessionOptions::default()
        }
    }
}

/// Ring geometry and render quantum
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// Usable frames per ring
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default = "default_channels")]
    pub channels: usize,

    /// Frames per worker kernel call
    #[serde(default = "default_kernel_block", rename = "kernelblock")]
    pub kernel_block: usize,

    /// Frames per host callback step
    #[serde(default = "default_quantum")]
    pub quantum: usize,

    /// Copy input to output until the worker is ready (otherwise silence)
    #[serde(default, rename = "bypass")]
    pub bypass_until_ready: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            channels: default_channels(),
            kernel_block: default_kernel_block(),
            quantum: default_quantum(),
            bypass_until_ready: false,
        }
    }
}

/// Worker thread timing, all in milliseconds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerConfig {
    #[serde(default = "default_wait_timeout", rename = "waittimeout")]
    pub wait_timeout_ms: u64,

    #[serde(default = "default_setup_timeout", rename = "setuptimeout")]
    pub setup_timeout_ms: u64,

    #[serde(default = "default_teardown_timeout", rename = "teardowntimeout")]
    pub teardown_timeout_ms: u64,
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.wait_timeout_ms == 0 {
            return Err(anyhow!("Wait timeout must be at least 1 ms"));
        }
        if self.setup_timeout_ms == 0 || self.teardown_timeout_ms == 0 {
            return Err(anyhow!("Setup and teardown timeouts must be at least 1 ms"));
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            wait_timeout_ms: default_wait_timeout(),
            setup_timeout_ms: default_setup_timeout(),
            teardown_timeout_ms: default_teardown_timeout(),
        }
    }
}

/// Gain applied by the worker kernel
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KernelConfig {
    #[serde(default = "default_gain")]
    pub gain: f32,
}

impl KernelConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.gain.is_finite() || self.gain < 0.0 || self.gain > 4.0 {
            return Err(anyhow!("Gain must be between 0.0 and 4.0"));
        }
        Ok(())
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            gain: default_gain(),
        }
    }
}

/// Test tone standing in for live input
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub wave: Waveform,

    #[serde(default = "default_frequency")]
    pub frequency: f32,

    #[serde(default = "default_amplitude")]
    pub amplitude: f32,
}

impl SourceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.frequency < 20.0 || self.frequency > 20000.0 {
            return Err(anyhow!("Frequency must be between 20 and 20000 Hz"));
        }
        if self.amplitude < 0.0 || self.amplitude > 1.0 {
            return Err(anyhow!("Amplitude must be between 0.0 and 1.0"));
        }
        Ok(())
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            wave: Waveform::default(),
            frequency: default_frequency(),
            amplitude: default_amplitude(),
        }
    }
}

/// Device configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Output device index, name substring or "default"
    #[serde(default = "default_audioout")]
    pub audioout: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            audioout: default_audioout(),
        }
    }
}

// Default value functions for serde
fn default_capacity() -> usize {
    4096
}

fn default_channels() -> usize {
    2
}

fn default_kernel_block() -> usize {
    1024
}

fn default_quantum() -> usize {
    crate::render::DEFAULT_QUANTUM_FRAMES
}

fn default_wait_timeout() -> u64 {
    100
}

fn default_setup_timeout() -> u64 {
    2000
}

fn default_teardown_timeout() -> u64 {
    2000
}

fn default_gain() -> f32 {
    0.1
}

fn default_frequency() -> f32 {
    440.0
}

fn default_amplitude() -> f32 {
    0.5
}

fn default_audioout() -> String {
    DEFAULT_DEVICE.to_string()
}
