//! Hardware audio I/O using CPAL, bridged to the async side.
//!
//! Playback pulls from an [`AudioBridge`] inside the output callback, so the
//! callback returns promptly even on an empty buffer (it plays silence).
//! Capture pushes into a bridge in the inverse direction. Both callbacks run
//! on the audio host's own thread; the bridge is the only thing they touch.

use crate::bridge::AudioBridge;
use crate::error::{CallError, CallResult};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Audio format for the local monitor path.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz (default 24000, the realtime backend's PCM rate).
    pub sample_rate: u32,
    /// Interleaved channel count (default 1).
    pub channels: u16,
    /// Callback block size in samples; small keeps latency low.
    pub block_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24000,
            channels: 1,
            block_size: 1024,
        }
    }
}

impl AudioConfig {
    fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            channels: self.channels,
            sample_rate: cpal::SampleRate(self.sample_rate),
            buffer_size: cpal::BufferSize::Fixed(self.block_size as u32),
        }
    }
}

/// Speaker-side output stream fed by an [`AudioBridge`].
pub struct AudioPlayback {
    config: AudioConfig,
    device: Device,
}

impl AudioPlayback {
    pub fn new(config: AudioConfig) -> CallResult<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| CallError::AudioDevice("no output device available".to_string()))?;
        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate = config.sample_rate,
            channels = config.channels,
            "audio playback initialized"
        );
        Ok(Self { config, device })
    }

    /// Start the output stream. The returned stream must be kept alive;
    /// dropping it stops playback.
    pub fn start(self, bridge: Arc<AudioBridge>) -> CallResult<Stream> {
        let stream = self.device.build_output_stream(
            &self.config.stream_config(),
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                // Hardware thread: fill or zero, never wait.
                bridge.read_into(data);
            },
            move |err| {
                warn!(error = %err, "audio output stream error");
            },
            None,
        )?;
        stream.play()?;
        info!("audio playback started");
        Ok(stream)
    }

    /// List available output devices.
    pub fn list_output_devices() -> CallResult<Vec<String>> {
        let devices = cpal::default_host().output_devices()?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

/// Microphone-side input stream writing into an [`AudioBridge`].
pub struct AudioCapture {
    config: AudioConfig,
    device: Device,
}

impl AudioCapture {
    pub fn new(config: AudioConfig) -> CallResult<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| CallError::AudioDevice("no input device available".to_string()))?;
        info!(
            device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate = config.sample_rate,
            channels = config.channels,
            "audio capture initialized"
        );
        Ok(Self { config, device })
    }

    /// Start the input stream. Captured blocks are appended to the bridge;
    /// the async side drains them at its own pace.
    pub fn start(self, bridge: Arc<AudioBridge>) -> CallResult<Stream> {
        let stream = self.device.build_input_stream(
            &self.config.stream_config(),
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                bridge.write_slice(data);
            },
            move |err| {
                warn!(error = %err, "audio input stream error");
            },
            None,
        )?;
        stream.play()?;
        info!("audio capture started");
        Ok(stream)
    }

    /// List available input devices.
    pub fn list_input_devices() -> CallResult<Vec<String>> {
        let devices = cpal::default_host().input_devices()?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = AudioConfig::default();
        assert_eq!(config.sample_rate, 24000);
        assert_eq!(config.channels, 1);
        assert_eq!(config.block_size, 1024);
    }

    #[test]
    fn list_devices_does_not_panic() {
        // May legitimately be empty in CI environments without audio.
        let _ = AudioPlayback::list_output_devices();
        let _ = AudioCapture::list_input_devices();
    }
}
