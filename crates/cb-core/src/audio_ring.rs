//! Bounded sample ring between the core thread and the audio sink.
//!
//! The core thread pushes interleaved samples at emulated speed and the
//! audio context pulls them at host-clock speed. Neither side ever waits
//! for the other: a pull that finds too few samples returns what it has,
//! and a push that would overflow discards the oldest whole frames.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Host buffers worth of samples the ring holds before dropping
pub const RING_BUFFER_COUNT: usize = 4;

/// Ring statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RingStats {
    /// Samples currently queued
    pub queued: usize,
    /// Capacity in samples
    pub capacity: usize,
    /// Samples discarded because the consumer fell behind
    pub dropped: u64,
    /// Pulls that could not be fully served
    pub underruns: u64,
}

#[derive(Debug)]
struct RingInner {
    samples: VecDeque<i16>,
    capacity: usize,
    dropped: u64,
    underruns: u64,
}

/// Interleaved `i16` sample ring with drop-oldest overflow
#[derive(Debug)]
pub struct AudioRing {
    inner: Mutex<RingInner>,
    channels: usize,
}

impl AudioRing {
    /// Create a ring holding `capacity_frames` frames of `channels` samples
    pub fn new(channels: u16, capacity_frames: usize) -> Self {
        let channels = channels.max(1) as usize;
        let capacity = capacity_frames.max(1) * channels;
        Self {
            inner: Mutex::new(RingInner {
                samples: VecDeque::with_capacity(capacity),
                capacity,
                dropped: 0,
                underruns: 0,
            }),
            channels,
        }
    }

    /// Ring sized for a host buffer of `buffer_frames` frames
    pub fn for_host_buffer(channels: u16, buffer_frames: usize) -> Self {
        Self::new(channels, buffer_frames * RING_BUFFER_COUNT)
    }

    /// Interleaved channel count
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Push samples, discarding the oldest frames on overflow.
    ///
    /// Returns the number of samples dropped. A trailing partial frame in
    /// `samples` is ignored.
    pub fn push(&self, samples: &[i16]) -> usize {
        let usable = samples.len() - samples.len() % self.channels;
        let samples = &samples[..usable];
        if samples.is_empty() {
            return 0;
        }

        let mut inner = self.inner.lock();
        let capacity = inner.capacity;
        let mut dropped = 0;

        let incoming = if samples.len() > capacity {
            // Only the newest `capacity` samples can survive
            let skip = samples.len() - capacity;
            dropped += skip + inner.samples.len();
            inner.samples.clear();
            &samples[skip..]
        } else {
            samples
        };

        let overflow = (inner.samples.len() + incoming.len()).saturating_sub(capacity);
        if overflow > 0 {
            inner.samples.drain(..overflow);
            dropped += overflow;
        }
        inner.samples.extend(incoming.iter().copied());

        if dropped > 0 {
            inner.dropped += dropped as u64;
            tracing::trace!("Audio ring overflow, dropped {} samples", dropped);
        }
        dropped
    }

    /// Pull up to `out.len()` samples. Returns how many were written; the
    /// rest of `out` is left untouched.
    pub fn pull(&self, out: &mut [i16]) -> usize {
        let mut inner = self.inner.lock();
        let want = out.len() - out.len() % self.channels;
        let count = want.min(inner.samples.len());
        for (dst, src) in out.iter_mut().zip(inner.samples.drain(..count)) {
            *dst = src;
        }
        if count < want {
            inner.underruns += 1;
        }
        count
    }

    /// Fill `out` completely, padding any shortfall with silence.
    /// Returns how many real samples were written.
    pub fn pull_padded(&self, out: &mut [i16]) -> usize {
        let written = self.pull(out);
        out[written..].fill(0);
        written
    }

    /// Samples currently queued
    pub fn len(&self) -> usize {
        self.inner.lock().samples.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.inner.lock().samples.is_empty()
    }

    /// Capacity in samples
    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    /// Resize the ring, keeping the newest samples that still fit
    pub fn set_capacity_frames(&self, frames: usize) {
        let mut inner = self.inner.lock();
        inner.capacity = frames.max(1) * self.channels;
        let excess = inner.samples.len().saturating_sub(inner.capacity);
        if excess > 0 {
            inner.samples.drain(..excess);
            inner.dropped += excess as u64;
        }
    }

    /// Discard everything queued
    pub fn clear(&self) {
        self.inner.lock().samples.clear();
    }

    pub fn stats(&self) -> RingStats {
        let inner = self.inner.lock();
        RingStats {
            queued: inner.samples.len(),
            capacity: inner.capacity,
            dropped: inner.dropped,
            underruns: inner.underruns,
        }
    }
}
