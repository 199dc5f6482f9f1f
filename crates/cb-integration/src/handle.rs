//! State shared between the bridge, its core thread and audio consumers

use cb_core::{AudioRing, CoreInfo, OptionSet};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Interleaved channels produced by every core
pub const CHANNELS: u16 = 2;

/// Speed and pause switches, owned by the bridge across sessions
#[derive(Debug, Default)]
pub(crate) struct Controls {
    pub paused: AtomicBool,
    pub fast_forward: AtomicBool,
    pub fast_forward_held: AtomicBool,
}

impl Controls {
    pub fn fast_forward_active(&self) -> bool {
        self.fast_forward.load(Ordering::Acquire) || self.fast_forward_held.load(Ordering::Acquire)
    }

    /// Speed ratio to pace at; held fast-forward wins over the toggle
    pub fn speed_ratio(&self, options: &OptionSet) -> f64 {
        if self.fast_forward_held.load(Ordering::Acquire) {
            options.fast_forward_held_ratio
        } else if self.fast_forward.load(Ordering::Acquire) {
            options.fast_forward_ratio
        } else {
            1.0
        }
    }
}

/// Everything one running session shares outside the core thread
#[derive(Debug)]
pub(crate) struct SessionShared {
    pub info: CoreInfo,
    pub rom_stem: String,
    pub ring: AudioRing,
    pub options: Arc<RwLock<OptionSet>>,
    pub controls: Arc<Controls>,
    pub frame_count: AtomicU64,
    /// Battery data taken from the core but not yet on disk
    pub pending_battery: Mutex<Option<Vec<u8>>>,
}

impl SessionShared {
    pub fn new(
        info: CoreInfo,
        rom_stem: String,
        options: Arc<RwLock<OptionSet>>,
        controls: Arc<Controls>,
    ) -> Self {
        let buffer_frames = options.read().audio_buffers as usize;
        Self {
            info,
            rom_stem,
            ring: AudioRing::for_host_buffer(CHANNELS, buffer_frames),
            options,
            controls,
            frame_count: AtomicU64::new(0),
            pending_battery: Mutex::new(None),
        }
    }
}

/// Output gain resolved from the volume and fast-forward options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioMix {
    /// Linear gain, 0.0 to 1.0
    pub gain: f32,
}

impl AudioMix {
    pub const SILENT: AudioMix = AudioMix { gain: 0.0 };

    fn resolve(options: &OptionSet, fast_forward: bool) -> Self {
        let (mute, volume) = if fast_forward {
            (options.fast_forward_mute, options.fast_forward_volume)
        } else {
            (options.mute, options.volume)
        };
        if mute {
            Self::SILENT
        } else {
            AudioMix {
                gain: volume.min(100) as f32 / 100.0,
            }
        }
    }
}

/// Non-owning reference to a running session.
///
/// Every call re-checks that the session is still alive. After the core
/// stops, audio pulls return silence and queries return defaults.
#[derive(Debug, Clone)]
pub struct CoreHandle {
    shared: Weak<SessionShared>,
}

impl CoreHandle {
    pub(crate) fn new(shared: &Arc<SessionShared>) -> Self {
        Self {
            shared: Arc::downgrade(shared),
        }
    }

    /// A handle that was never attached to a session
    pub fn detached() -> Self {
        Self { shared: Weak::new() }
    }

    pub fn is_live(&self) -> bool {
        self.shared.strong_count() > 0
    }

    /// Fill `out` with interleaved samples, padding any shortfall with
    /// silence. Returns how many real samples were delivered.
    pub fn pull_audio(&self, out: &mut [i16]) -> usize {
        match self.shared.upgrade() {
            Some(shared) => shared.ring.pull_padded(out),
            None => {
                out.fill(0);
                0
            }
        }
    }

    /// Current output gain
    pub fn mix(&self) -> AudioMix {
        match self.shared.upgrade() {
            Some(shared) => {
                let fast_forward = shared.controls.fast_forward_active();
                AudioMix::resolve(&shared.options.read(), fast_forward)
            }
            None => AudioMix::SILENT,
        }
    }

    /// Rate the core produces samples at
    pub fn sample_rate(&self) -> u32 {
        self.read_options(|o| o.sample_rate)
    }

    /// Host buffer size requested by the options, in frames
    pub fn buffer_frames(&self) -> u32 {
        self.read_options(|o| o.audio_buffers)
    }

    pub fn channels(&self) -> u16 {
        CHANNELS
    }

    /// Frames emulated in this session, 0 once it ended
    pub fn frame_count(&self) -> u64 {
        self.shared
            .upgrade()
            .map(|s| s.frame_count.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    /// Queued and dropped sample counts of the session's ring
    pub fn ring_stats(&self) -> cb_core::RingStats {
        self.shared
            .upgrade()
            .map(|s| s.ring.stats())
            .unwrap_or_default()
    }

    fn read_options<T>(&self, f: impl FnOnce(&OptionSet) -> T) -> T {
        match self.shared.upgrade() {
            Some(shared) => {
                let options = shared.options.read();
                f(&options)
            }
            None => f(&OptionSet::default()),
        }
    }
}
