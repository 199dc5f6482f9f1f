//! cpal audio backend
//!
//! Output through the host's default device using cpal.

use super::{AudioBackend, RenderCallback, StreamSpec};
use cb_core::AudioSinkError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, Host, SampleFormat, SampleRate, Stream, StreamConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// cpal audio backend
pub struct CpalAudioBackend {
    host: Host,
    device: Option<Device>,
    config: Option<StreamConfig>,
    stream: Option<Stream>,
    errors: Arc<AtomicU64>,
}

impl CpalAudioBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
            device: None,
            config: None,
            stream: None,
            errors: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether the device supports `requested` directly as stereo `f32`
    fn supports(device: &Device, requested: &StreamSpec) -> Option<BufferSize> {
        let ranges = device.supported_output_configs().ok()?;
        for range in ranges {
            if range.channels() != requested.channels
                || range.sample_format() != SampleFormat::F32
                || range.min_sample_rate().0 > requested.sample_rate
                || range.max_sample_rate().0 < requested.sample_rate
            {
                continue;
            }
            let buffer = match range.buffer_size() {
                cpal::SupportedBufferSize::Range { min, max }
                    if (*min..=*max).contains(&requested.buffer_frames) =>
                {
                    BufferSize::Fixed(requested.buffer_frames)
                }
                _ => BufferSize::Default,
            };
            return Some(buffer);
        }
        None
    }
}

impl Default for CpalAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioBackend for CpalAudioBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn configure(&mut self, requested: StreamSpec) -> Result<StreamSpec, AudioSinkError> {
        let device = self
            .host
            .default_output_device()
            .ok_or(AudioSinkError::NoDevice)?;

        tracing::info!(
            "Audio device: {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string())
        );

        let (config, spec) = match Self::supports(&device, &requested) {
            Some(buffer_size) => {
                let config = StreamConfig {
                    channels: requested.channels,
                    sample_rate: SampleRate(requested.sample_rate),
                    buffer_size,
                };
                (config, requested)
            }
            None => {
                // Fall back to whatever the device prefers; the renderer
                // resamples and remaps channels to fit
                let default = device
                    .default_output_config()
                    .map_err(|e| AudioSinkError::Config(e.to_string()))?;
                if default.sample_format() != SampleFormat::F32 {
                    return Err(AudioSinkError::Config(format!(
                        "device prefers {:?} samples",
                        default.sample_format()
                    )));
                }
                let config = default.config();
                let spec = StreamSpec {
                    sample_rate: config.sample_rate.0,
                    channels: config.channels,
                    buffer_frames: requested.buffer_frames,
                };
                (config, spec)
            }
        };

        tracing::info!("Audio config: {:?}", config);
        self.device = Some(device);
        self.config = Some(config);
        Ok(spec)
    }

    fn start(&mut self, mut render: RenderCallback) -> Result<(), AudioSinkError> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| AudioSinkError::Stream("device not configured".to_string()))?;
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| AudioSinkError::Stream("stream not configured".to_string()))?;

        let errors = Arc::clone(&self.errors);
        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| render(data),
                move |err| {
                    errors.fetch_add(1, Ordering::Relaxed);
                    tracing::error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioSinkError::Stream(format!("Failed to build output stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioSinkError::Stream(format!("Failed to play stream: {}", e)))?;

        self.stream = Some(stream);
        tracing::info!("Audio stream started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                tracing::warn!("Failed to pause stream: {}", e);
            }
            tracing::info!("Audio stream stopped");
        }
        self.device = None;
        self.config = None;
    }

    fn is_running(&self) -> bool {
        self.stream.is_some()
    }

    fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

impl Drop for CpalAudioBackend {
    fn drop(&mut self) {
        self.stop();
    }
}
