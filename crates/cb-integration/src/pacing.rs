//! Frame pacing for the core thread

use std::time::{Duration, Instant};

/// Frames the pacer may fall behind before it stops trying to catch up
const MAX_LAG_FRAMES: u32 = 4;

/// Target interval for one frame at `fps_target` scaled by `ratio`.
///
/// `None` means unbounded: run as fast as the host allows.
pub fn frame_interval(fps_target: f64, ratio: f64) -> Option<Duration> {
    if ratio <= 0.0 {
        return None;
    }
    let fps = fps_target.clamp(1.0, 240.0) * ratio;
    Some(Duration::from_secs_f64(1.0 / fps))
}

/// Absolute-deadline frame scheduler.
///
/// Deadlines advance by whole intervals so short oversleeps do not
/// accumulate into drift. After a long stall the schedule restarts from
/// the current time instead of racing to catch up.
#[derive(Debug, Default)]
pub struct FramePacer {
    next: Option<Instant>,
}

impl FramePacer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deadline for the frame that just ran
    pub fn next_deadline(&mut self, now: Instant, interval: Duration) -> Instant {
        let next = match self.next {
            Some(prev) => {
                let candidate = prev + interval;
                if candidate + interval * MAX_LAG_FRAMES < now {
                    now + interval
                } else {
                    candidate
                }
            }
            None => now + interval,
        };
        self.next = Some(next);
        next
    }

    /// Forget the schedule, e.g. after a pause or unbounded run
    pub fn reset(&mut self) {
        self.next = None;
    }
}
