//! Audio backends

pub mod cpal_backend;
pub mod null;

pub use cpal_backend::CpalAudioBackend;
pub use null::NullAudioBackend;

use cb_core::AudioSinkError;

/// Fills one host buffer of interleaved `f32` samples. Runs on the sink's
/// real-time thread.
pub type RenderCallback = Box<dyn FnMut(&mut [f32]) + Send>;

/// Negotiated stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per host buffer
    pub buffer_frames: u32,
}

/// A host audio sink
pub trait AudioBackend {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Pick a device and format as close to `requested` as it supports
    fn configure(&mut self, requested: StreamSpec) -> Result<StreamSpec, AudioSinkError>;

    /// Start calling `render` for every host buffer
    fn start(&mut self, render: RenderCallback) -> Result<(), AudioSinkError>;

    /// Stop the stream and release the device. Safe to call repeatedly.
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Errors reported by the stream after it started
    fn error_count(&self) -> u64;
}
