//! Audio output for corebridge
//!
//! Drains a running core's sample ring into a host audio device.

pub mod backend;
pub mod output;
pub mod resampler;

pub use backend::{AudioBackend, CpalAudioBackend, NullAudioBackend, StreamSpec};
pub use output::{AudioOutput, OutputStats, SampleRenderer, SampleSource};
pub use resampler::LinearResampler;
