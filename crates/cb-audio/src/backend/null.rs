//! Null audio backend
//!
//! Pulls one buffer per buffer period on its own thread and discards it,
//! keeping the producer drained exactly as a real device would. Output can
//! be captured for inspection.

use super::{AudioBackend, RenderCallback, StreamSpec};
use cb_core::AudioSinkError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Captured output, interleaved in the sink's channel layout
pub type Capture = Arc<Mutex<Vec<f32>>>;

/// Null audio backend
#[derive(Default)]
pub struct NullAudioBackend {
    spec: Option<StreamSpec>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    capture: Option<Capture>,
    /// Force a device rate different from the request
    device_rate: Option<u32>,
    /// Force a device channel count different from the request
    device_channels: Option<u16>,
    unavailable: bool,
}

impl NullAudioBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also record everything rendered
    pub fn with_capture(mut self) -> (Self, Capture) {
        let capture = Capture::default();
        self.capture = Some(Arc::clone(&capture));
        (self, capture)
    }

    /// Pretend the device only runs at `rate`
    pub fn with_device_rate(mut self, rate: u32) -> Self {
        self.device_rate = Some(rate);
        self
    }

    /// Pretend the device has `channels` outputs
    pub fn with_device_channels(mut self, channels: u16) -> Self {
        self.device_channels = Some(channels);
        self
    }

    /// A sink whose device can never be opened
    pub fn unavailable() -> Self {
        let mut backend = Self::default();
        backend.unavailable = true;
        backend
    }
}

impl AudioBackend for NullAudioBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn configure(&mut self, requested: StreamSpec) -> Result<StreamSpec, AudioSinkError> {
        if self.unavailable {
            return Err(AudioSinkError::NoDevice);
        }
        let spec = StreamSpec {
            sample_rate: self.device_rate.unwrap_or(requested.sample_rate),
            channels: self.device_channels.unwrap_or(requested.channels),
            buffer_frames: requested.buffer_frames.max(1),
        };
        self.spec = Some(spec);
        Ok(spec)
    }

    fn start(&mut self, mut render: RenderCallback) -> Result<(), AudioSinkError> {
        let spec = self
            .spec
            .ok_or_else(|| AudioSinkError::Stream("stream not configured".to_string()))?;
        if self.thread.is_some() {
            return Ok(());
        }

        let period = Duration::from_secs_f64(spec.buffer_frames as f64 / spec.sample_rate as f64);
        let running = Arc::clone(&self.running);
        let capture = self.capture.clone();
        running.store(true, Ordering::Release);

        let thread = std::thread::Builder::new()
            .name("null-audio".to_string())
            .spawn(move || {
                let mut buffer = vec![0.0f32; spec.buffer_frames as usize * spec.channels as usize];
                let mut deadline = Instant::now();
                while running.load(Ordering::Acquire) {
                    render(&mut buffer);
                    if let Some(capture) = &capture {
                        capture.lock().extend_from_slice(&buffer);
                    }
                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        std::thread::sleep(deadline - now);
                    } else {
                        deadline = now;
                    }
                }
            })
            .map_err(|e| AudioSinkError::Stream(e.to_string()))?;

        self.thread = Some(thread);
        tracing::info!("Null audio sink started at {} Hz", spec.sample_rate);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Null audio thread panicked");
            }
            tracing::info!("Null audio sink stopped");
        }
        self.spec = None;
    }

    fn is_running(&self) -> bool {
        self.thread.is_some()
    }

    fn error_count(&self) -> u64 {
        0
    }
}

impl Drop for NullAudioBackend {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> StreamSpec {
        StreamSpec {
            sample_rate: 48000,
            channels: 2,
            buffer_frames: 256,
        }
    }

    #[test]
    fn test_pulls_buffers_until_stopped() {
        let (mut backend, capture) = NullAudioBackend::new().with_capture();
        backend.configure(spec()).unwrap();
        backend
            .start(Box::new(|out: &mut [f32]| out.fill(0.25)))
            .unwrap();
        assert!(backend.is_running());

        std::thread::sleep(Duration::from_millis(30));
        backend.stop();
        assert!(!backend.is_running());

        let captured = capture.lock();
        assert!(!captured.is_empty());
        assert_eq!(captured.len() % 512, 0);
        assert!(captured.iter().all(|&s| s == 0.25));
    }

    #[test]
    fn test_unavailable_device() {
        let mut backend = NullAudioBackend::unavailable();
        assert!(matches!(backend.configure(spec()), Err(AudioSinkError::NoDevice)));
    }

    #[test]
    fn test_forced_device_format() {
        let mut backend = NullAudioBackend::new()
            .with_device_rate(22050)
            .with_device_channels(1);
        let got = backend.configure(spec()).unwrap();
        assert_eq!(got.sample_rate, 22050);
        assert_eq!(got.channels, 1);
    }

    #[test]
    fn test_start_requires_configure() {
        let mut backend = NullAudioBackend::new();
        assert!(backend.start(Box::new(|_: &mut [f32]| {})).is_err());
        // Stop on a never-started sink is harmless
        backend.stop();
    }
}
