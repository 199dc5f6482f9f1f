//! Single-slot frame handoff between the core thread and the display
//!
//! The producer copies each frame into the pending slot, replacing any
//! frame the display has not taken yet. The display swaps the pending
//! buffer with its own, so neither side waits for more than a row copy.

use cb_core::FrameRef;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// An owned, packed RGBA8 frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredFrame {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Publish order, starting at 1
    pub sequence: u64,
}

impl StoredFrame {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Default)]
struct Slot {
    frame: StoredFrame,
    fresh: bool,
}

/// Latest-wins frame mailbox
#[derive(Debug, Default)]
pub struct FrameMailbox {
    slot: Mutex<Slot>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a copy of `frame`, overwriting an unconsumed one
    pub fn publish(&self, frame: &FrameRef<'_>) {
        let mut slot = self.slot.lock();
        let sequence = self.published.fetch_add(1, Ordering::AcqRel) + 1;
        if slot.fresh {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        frame.copy_packed_into(&mut slot.frame.pixels);
        slot.frame.width = frame.width();
        slot.frame.height = frame.height();
        slot.frame.sequence = sequence;
        slot.fresh = true;
    }

    /// Swap the newest unconsumed frame into `front`. Returns false and
    /// leaves `front` untouched when nothing new was published.
    pub fn take_into(&self, front: &mut StoredFrame) -> bool {
        let mut slot = self.slot.lock();
        if !slot.fresh {
            return false;
        }
        std::mem::swap(&mut slot.frame, front);
        slot.fresh = false;
        true
    }

    pub fn has_fresh(&self) -> bool {
        self.slot.lock().fresh
    }

    /// Frames published so far
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Acquire)
    }

    /// Frames overwritten before the display took them
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(value: u8, width: u32, height: u32) -> Vec<u8> {
        vec![value; (width * height * 4) as usize]
    }

    #[test]
    fn test_take_swaps_latest() {
        let mailbox = FrameMailbox::new();
        let mut front = StoredFrame::default();
        assert!(!mailbox.take_into(&mut front));

        let pixels = solid(7, 2, 2);
        mailbox.publish(&FrameRef::packed(&pixels, 2, 2).unwrap());
        assert!(mailbox.take_into(&mut front));
        assert_eq!(front.pixels, pixels);
        assert_eq!((front.width, front.height, front.sequence), (2, 2, 1));

        // Nothing new: front stays as it was
        assert!(!mailbox.take_into(&mut front));
        assert_eq!(front.sequence, 1);
    }

    #[test]
    fn test_overwrite_counts_dropped() {
        let mailbox = FrameMailbox::new();
        for value in 1..=3u8 {
            let pixels = solid(value, 1, 1);
            mailbox.publish(&FrameRef::packed(&pixels, 1, 1).unwrap());
        }
        assert_eq!(mailbox.published(), 3);
        assert_eq!(mailbox.dropped(), 2);

        let mut front = StoredFrame::default();
        assert!(mailbox.take_into(&mut front));
        assert_eq!(front.pixels, vec![3; 4]);
        assert_eq!(front.sequence, 3);
    }

    #[test]
    fn test_strided_source_is_packed() {
        // Two rows of one pixel with four bytes of padding each
        let pixels = [1, 1, 1, 1, 0, 0, 0, 0, 2, 2, 2, 2, 0, 0, 0, 0];
        let frame = FrameRef::new(&pixels, 1, 2, 8).unwrap();
        let mailbox = FrameMailbox::new();
        mailbox.publish(&frame);

        let mut front = StoredFrame::default();
        mailbox.take_into(&mut front);
        assert_eq!(front.pixels, vec![1, 1, 1, 1, 2, 2, 2, 2]);
    }
}
