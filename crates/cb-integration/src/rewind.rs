//! Rolling history of state snapshots for rewinding

use std::collections::VecDeque;

/// Bounded snapshot history, oldest dropped first
#[derive(Debug, Default)]
pub struct RewindBuffer {
    snapshots: VecDeque<Vec<u8>>,
    capacity: usize,
    interval_frames: u32,
    frames_since_capture: u32,
}

impl RewindBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size the history for `capacity_secs` seconds with one snapshot every
    /// `interval_ms` at `fps` frames per second.
    pub fn configure(&mut self, capacity_secs: u32, interval_ms: u32, fps: f64) {
        let interval_ms = interval_ms.max(1);
        let capacity = (capacity_secs as usize * 1000).div_ceil(interval_ms as usize).max(1);
        let interval_frames = ((interval_ms as f64 / 1000.0) * fps).round().max(1.0) as u32;

        if capacity != self.capacity || interval_frames != self.interval_frames {
            tracing::debug!(
                "Rewind history: {} snapshots, every {} frames",
                capacity,
                interval_frames
            );
        }
        self.capacity = capacity;
        self.interval_frames = interval_frames;
        while self.snapshots.len() > self.capacity {
            self.snapshots.pop_front();
        }
    }

    /// Count one emulated frame; returns whether a snapshot is due
    pub fn tick(&mut self) -> bool {
        self.frames_since_capture += 1;
        if self.frames_since_capture >= self.interval_frames {
            self.frames_since_capture = 0;
            true
        } else {
            false
        }
    }

    pub fn push(&mut self, snapshot: Vec<u8>) {
        if self.capacity == 0 {
            return;
        }
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
    }

    /// Take the most recent snapshot
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.frames_since_capture = 0;
        self.snapshots.pop_back()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
        self.frames_since_capture = 0;
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
