//! Audio output driver
//!
//! Connects a running core's sample ring to a host sink. The sink's
//! real-time thread pulls through [`SampleRenderer`], which applies the
//! current gain, converts rate and maps channels. Nothing on that path
//! blocks on the core thread.

use crate::backend::{AudioBackend, CpalAudioBackend, NullAudioBackend, RenderCallback, StreamSpec};
use crate::resampler::LinearResampler;
use cb_core::config::{AudioBackendKind, AudioConfig};
use cb_core::AudioSinkError;
use cb_integration::{CoreHandle, CHANNELS};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Where rendered samples come from
pub trait SampleSource: Send + 'static {
    /// Fill `out` with interleaved stereo samples, padding with silence.
    /// Returns the number of real samples.
    fn pull(&mut self, out: &mut [i16]) -> usize;

    /// Linear gain to apply
    fn gain(&self) -> f32;

    /// Rate the samples are produced at
    fn sample_rate(&self) -> u32;
}

impl SampleSource for CoreHandle {
    fn pull(&mut self, out: &mut [i16]) -> usize {
        self.pull_audio(out)
    }

    fn gain(&self) -> f32 {
        self.mix().gain
    }

    fn sample_rate(&self) -> u32 {
        CoreHandle::sample_rate(self)
    }
}

/// Counters kept by the render callback
#[derive(Debug, Default)]
pub struct RenderStats {
    buffers: AtomicU64,
    underruns: AtomicU64,
}

/// Point-in-time copy of [`RenderStats`] plus sink errors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputStats {
    /// Host buffers rendered
    pub buffers: u64,
    /// Buffers padded with silence because the ring ran dry
    pub underruns: u64,
    /// Errors the sink reported mid-stream
    pub sink_errors: u64,
}

/// Turns source samples into host buffers
pub struct SampleRenderer<S: SampleSource> {
    source: S,
    sink: StreamSpec,
    source_rate: u32,
    resampler: Option<LinearResampler>,
    pulled: Vec<i16>,
    stereo: Vec<f32>,
    converted: Vec<f32>,
    stats: Arc<RenderStats>,
}

impl<S: SampleSource> SampleRenderer<S> {
    pub fn new(source: S, sink: StreamSpec, stats: Arc<RenderStats>) -> Self {
        let source_rate = source.sample_rate();
        let mut renderer = Self {
            source,
            sink,
            source_rate,
            resampler: None,
            pulled: Vec::new(),
            stereo: Vec::new(),
            converted: Vec::new(),
            stats,
        };
        renderer.update_resampler(source_rate);
        renderer
    }

    fn update_resampler(&mut self, source_rate: u32) {
        self.source_rate = source_rate;
        if source_rate == self.sink.sample_rate {
            self.resampler = None;
            return;
        }
        match &mut self.resampler {
            Some(resampler) => resampler.set_rates(source_rate, self.sink.sample_rate),
            None => {
                tracing::debug!(
                    "Resampling audio {} Hz -> {} Hz",
                    source_rate,
                    self.sink.sample_rate
                );
                self.resampler = Some(LinearResampler::new(
                    source_rate,
                    self.sink.sample_rate,
                    CHANNELS,
                ));
            }
        }
    }

    /// Pull `frames` source frames, scaled by `gain`, into `converted`
    fn pull_frames(&mut self, frames: usize, gain: f32) -> bool {
        let samples = frames * CHANNELS as usize;
        self.pulled.resize(samples, 0);
        let real = self.source.pull(&mut self.pulled);
        self.converted.clear();
        self.converted
            .extend(self.pulled.iter().map(|&s| s as f32 / 32768.0 * gain));
        real < samples
    }

    /// Fill one host buffer laid out as `sink.channels` interleaved
    pub fn render(&mut self, out: &mut [f32]) {
        let out_channels = self.sink.channels.max(1) as usize;
        let frames = out.len() / out_channels;

        let rate = self.source.sample_rate();
        if rate != self.source_rate {
            self.update_resampler(rate);
        }
        let gain = self.source.gain();

        let starved = match self.resampler.take() {
            Some(mut resampler) => {
                let needed = resampler.frames_needed(frames);
                let starved = self.pull_frames(needed, gain);
                resampler.push(&self.converted);
                self.stereo.resize(frames * CHANNELS as usize, 0.0);
                resampler.render(&mut self.stereo);
                self.resampler = Some(resampler);
                starved
            }
            None => {
                let starved = self.pull_frames(frames, gain);
                std::mem::swap(&mut self.stereo, &mut self.converted);
                starved
            }
        };

        map_channels(&self.stereo, out, out_channels);

        self.stats.buffers.fetch_add(1, Ordering::Relaxed);
        if starved {
            self.stats.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Spread stereo frames over `channels` outputs
fn map_channels(stereo: &[f32], out: &mut [f32], channels: usize) {
    let frames = stereo.chunks_exact(2);
    match channels {
        1 => {
            for (dst, src) in out.iter_mut().zip(frames) {
                *dst = (src[0] + src[1]) * 0.5;
            }
        }
        2 => {
            let n = out.len().min(stereo.len());
            out[..n].copy_from_slice(&stereo[..n]);
        }
        _ => {
            for (dst, src) in out.chunks_exact_mut(channels).zip(frames) {
                dst[0] = src[0];
                dst[1] = src[1];
                dst[2..].fill(0.0);
            }
        }
    }
}

/// Drives a host sink from a running core
pub struct AudioOutput {
    handle: CoreHandle,
    backend: Box<dyn AudioBackend>,
    stats: Arc<RenderStats>,
    spec: Option<StreamSpec>,
}

impl AudioOutput {
    /// Output through the sink named in `config`. A disabled config still
    /// drains the ring through the null sink.
    pub fn new(handle: CoreHandle, config: &AudioConfig) -> Self {
        let backend: Box<dyn AudioBackend> = match (config.enable, config.backend) {
            (true, AudioBackendKind::Auto) => Box::new(CpalAudioBackend::new()),
            _ => Box::new(NullAudioBackend::new()),
        };
        Self::with_backend(handle, backend)
    }

    pub fn with_backend(handle: CoreHandle, backend: Box<dyn AudioBackend>) -> Self {
        Self {
            handle,
            backend,
            stats: Arc::new(RenderStats::default()),
            spec: None,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Open the sink and start pulling. Returns the negotiated format;
    /// calling again while running returns it unchanged.
    pub fn start(&mut self) -> Result<StreamSpec, AudioSinkError> {
        if let Some(spec) = self.spec {
            return Ok(spec);
        }

        let requested = StreamSpec {
            sample_rate: self.handle.sample_rate(),
            channels: self.handle.channels(),
            buffer_frames: self.handle.buffer_frames(),
        };
        let spec = self.backend.configure(requested)?;
        if spec != requested {
            tracing::info!("Audio sink negotiated {:?} (requested {:?})", spec, requested);
        }

        let mut renderer = SampleRenderer::new(self.handle.clone(), spec, Arc::clone(&self.stats));
        let render: RenderCallback = Box::new(move |out: &mut [f32]| renderer.render(out));
        if let Err(e) = self.backend.start(render) {
            self.backend.stop();
            return Err(e);
        }

        tracing::info!(
            "Audio output started on {} sink at {} Hz",
            self.backend.name(),
            spec.sample_rate
        );
        self.spec = Some(spec);
        Ok(spec)
    }

    /// Stop the sink. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if self.spec.take().is_some() {
            self.backend.stop();
            tracing::info!("Audio output stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.spec.is_some() && self.backend.is_running()
    }

    /// Negotiated format while running
    pub fn stream_spec(&self) -> Option<StreamSpec> {
        self.spec
    }

    pub fn stats(&self) -> OutputStats {
        OutputStats {
            buffers: self.stats.buffers.load(Ordering::Relaxed),
            underruns: self.stats.underruns.load(Ordering::Relaxed),
            sink_errors: self.backend.error_count(),
        }
    }
}

impl Drop for AudioOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
