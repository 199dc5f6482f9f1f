//! Streaming sample rate conversion
//!
//! Linear interpolation between the core's rate and whatever rate the host
//! device ended up at. Input is pulled on demand so output buffers are
//! always filled exactly.

/// Linear resampler over interleaved `f32` frames
#[derive(Debug, Clone)]
pub struct LinearResampler {
    channels: usize,
    /// Input frames advanced per output frame
    step: f64,
    /// Read position within `pending`, in frames
    position: f64,
    /// Input frames not yet fully consumed
    pending: Vec<f32>,
}

impl LinearResampler {
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> Self {
        Self {
            channels: channels.max(1) as usize,
            step: Self::step_for(input_rate, output_rate),
            position: 0.0,
            pending: Vec::new(),
        }
    }

    fn step_for(input_rate: u32, output_rate: u32) -> f64 {
        input_rate.max(1) as f64 / output_rate.max(1) as f64
    }

    /// Change rates without dropping buffered input
    pub fn set_rates(&mut self, input_rate: u32, output_rate: u32) {
        self.step = Self::step_for(input_rate, output_rate);
    }

    pub fn ratio(&self) -> f64 {
        self.step
    }

    fn pending_frames(&self) -> usize {
        self.pending.len() / self.channels
    }

    /// Input frames to [`push`](Self::push) before rendering `output_frames`
    pub fn frames_needed(&self, output_frames: usize) -> usize {
        if output_frames == 0 {
            return 0;
        }
        let last = self.position + (output_frames - 1) as f64 * self.step;
        let needed = last.floor() as usize + 2;
        needed.saturating_sub(self.pending_frames())
    }

    /// Queue interleaved input frames
    pub fn push(&mut self, frames: &[f32]) {
        self.pending.extend_from_slice(frames);
    }

    /// Fill `output` with interleaved frames, consuming pending input
    pub fn render(&mut self, output: &mut [f32]) {
        let ch = self.channels;
        let available = self.pending_frames();
        if available == 0 {
            output.fill(0.0);
            return;
        }

        let last = available - 1;
        let output_frames = output.len() / ch;
        for (k, frame) in output.chunks_exact_mut(ch).enumerate() {
            let pos = self.position + k as f64 * self.step;
            let index = pos.floor() as usize;
            let frac = (pos - index as f64) as f32;
            let i0 = index.min(last) * ch;
            let i1 = (index + 1).min(last) * ch;
            for (c, sample) in frame.iter_mut().enumerate() {
                let s0 = self.pending[i0 + c];
                let s1 = self.pending[i1 + c];
                *sample = s0 + (s1 - s0) * frac;
            }
        }

        // Keep the frame under the next read position as the left neighbour
        let next = self.position + output_frames as f64 * self.step;
        let consumed = (next.floor() as usize).min(last);
        self.pending.drain(..consumed * ch);
        self.position = next - consumed as f64;
    }

    /// Drop buffered input and restart at the beginning
    pub fn reset(&mut self) {
        self.pending.clear();
        self.position = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(resampler: &mut LinearResampler, input: &mut impl Iterator<Item = f32>, frames: usize) -> Vec<f32> {
        let needed = resampler.frames_needed(frames);
        let chunk: Vec<f32> = input.take(needed).collect();
        resampler.push(&chunk);
        let mut out = vec![0.0; frames];
        resampler.render(&mut out);
        out
    }

    #[test]
    fn test_same_rate_passes_through() {
        let mut resampler = LinearResampler::new(48000, 48000, 1);
        let mut input = (0..).map(|i| i as f32);
        let mut output = Vec::new();
        for _ in 0..5 {
            output.extend(run(&mut resampler, &mut input, 7));
        }
        let expected: Vec<f32> = (0..35).map(|i| i as f32).collect();
        assert_eq!(output, expected);
    }

    #[test]
    fn test_upsample_interpolates_continuously() {
        // Half-rate input: every other output lands between two inputs
        let mut resampler = LinearResampler::new(24000, 48000, 1);
        let mut input = (0..).map(|i| i as f32 * 2.0);
        let mut output = Vec::new();
        for _ in 0..4 {
            output.extend(run(&mut resampler, &mut input, 5));
        }
        let expected: Vec<f32> = (0..20).map(|i| i as f32).collect();
        assert_eq!(output, expected);
    }

    #[test]
    fn test_downsample_consumes_proportionally() {
        let mut resampler = LinearResampler::new(44100, 22050, 2);
        let needed = resampler.frames_needed(100);
        assert!((199..=201).contains(&needed));

        let input: Vec<f32> = (0..needed).flat_map(|i| [i as f32, -(i as f32)]).collect();
        resampler.push(&input);
        let mut out = vec![0.0; 200];
        resampler.render(&mut out);
        for (k, frame) in out.chunks_exact(2).enumerate() {
            assert_eq!(frame[0], (k * 2) as f32);
            assert_eq!(frame[1], -((k * 2) as f32));
        }
    }

    #[test]
    fn test_starved_render_is_silent() {
        let mut resampler = LinearResampler::new(32000, 48000, 2);
        let mut out = vec![1.0; 8];
        resampler.render(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }
}
