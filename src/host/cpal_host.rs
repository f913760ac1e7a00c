use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use super::QuantumSource;
use super::quantum::QuantumDriver;
use crate::error::HostError;

/// Device name that selects the host's default output
pub const DEFAULT_DEVICE: &str = "default";

/// Named output devices, with the default device appended if enumeration missed it
fn output_devices(host: &cpal::Host) -> Result<Vec<(String, cpal::Device)>, HostError> {
    let mut devices: Vec<(String, cpal::Device)> = host
        .output_devices()?
        .filter_map(|device| {
            device
                .description()
                .ok()
                .map(|desc| (desc.name().to_string(), device))
        })
        .collect();

    if let Some(default_device) = host.default_output_device() {
        if let Ok(desc) = default_device.description() {
            let name = desc.name().to_string();
            if !devices.iter().any(|(known, _)| *known == name) {
                devices.push((name, default_device));
            }
        }
    }

    if devices.is_empty() {
        return Err(HostError::NoDevices);
    }
    Ok(devices)
}

/// List available audio output devices
pub fn list_audio_devices() -> Result<Vec<String>, HostError> {
    let host = cpal::default_host();
    Ok(output_devices(&host)?
        .into_iter()
        .map(|(name, _)| name)
        .collect())
}

/// Find audio device index by index string or case-insensitive name substring
pub fn find_audio_device(devices: &[String], search: &str) -> Result<usize, HostError> {
    if let Ok(index) = search.parse::<usize>() {
        if index < devices.len() {
            return Ok(index);
        }
        return Err(HostError::DeviceIndexOutOfRange {
            index,
            last: devices.len().saturating_sub(1),
        });
    }

    let search_lower = search.to_lowercase();
    devices
        .iter()
        .position(|device| device.to_lowercase().contains(&search_lower))
        .ok_or_else(|| HostError::DeviceNotFound(search.to_string()))
}

/// An opened cpal output device and its default stream configuration
pub struct CpalHost {
    name: String,
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
}

impl CpalHost {
    /// Open the output device named by `search` (index, substring or "default")
    pub fn open(search: &str) -> Result<Self, HostError> {
        let host = cpal::default_host();
        let (name, device) = if search.is_empty() || search.eq_ignore_ascii_case(DEFAULT_DEVICE) {
            let device = host.default_output_device().ok_or(HostError::NoDevices)?;
            let name = device
                .description()
                .map(|desc| desc.name().to_string())
                .unwrap_or_else(|_| DEFAULT_DEVICE.to_string());
            (name, device)
        } else {
            let mut devices = output_devices(&host)?;
            let names: Vec<String> = devices.iter().map(|(name, _)| name.clone()).collect();
            let index = find_audio_device(&names, search)?;
            devices.swap_remove(index)
        };

        let supported = device.default_output_config()?;
        let sample_format = supported.sample_format();
        info!(
            device = %name,
            channels = supported.channels(),
            format = ?sample_format,
            "opened audio output"
        );

        Ok(Self {
            name,
            device,
            config: supported.into(),
            sample_format,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.config.channels as usize
    }

    /// Build and start the output stream; audio plays until it is dropped
    pub fn start<S>(&self, driver: QuantumDriver<S>) -> Result<cpal::Stream, HostError>
    where
        S: QuantumSource + 'static,
    {
        match self.sample_format {
            cpal::SampleFormat::F32 => self.build_stream::<f32, S>(driver),
            cpal::SampleFormat::I16 => self.build_stream::<i16, S>(driver),
            cpal::SampleFormat::U16 => self.build_stream::<u16, S>(driver),
            other => Err(HostError::UnsupportedSampleFormat(format!("{other:?}"))),
        }
    }

    fn build_stream<T, S>(&self, mut driver: QuantumDriver<S>) -> Result<cpal::Stream, HostError>
    where
        T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
        S: QuantumSource + 'static,
    {
        let channels = self.channels();
        let stream = self.device.build_output_stream(
            &self.config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                driver.render_interleaved(data, channels, |sample| T::from_sample(sample));
            },
            |err| error!(%err, "audio stream error"),
            None,
        )?;

        stream.play()?;
        Ok(stream)
    }
}
