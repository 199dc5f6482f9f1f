//! Contract between the bridge and an emulation core.
//!
//! A core is driven one video frame at a time from a single thread. It is
//! never shared: the bridge moves the boxed core onto its core thread at
//! start and takes it back when the thread exits.

use crate::error::LoadError;
use crate::frame::FrameRef;
use crate::keys::Keys;
use crate::options::{CoreOption, OptionSet};
use crate::rom::{Platform, RomImage};
use std::fmt::Debug;
use std::sync::Arc;

/// Static description of a loaded game
#[derive(Debug, Clone, PartialEq)]
pub struct CoreInfo {
    pub title: String,
    pub platform: Platform,
    /// Native frame width in pixels
    pub width: u32,
    /// Native frame height in pixels
    pub height: u32,
    /// Native frames per second
    pub fps: f64,
}

/// An emulation core instance with one game loaded
pub trait Core: Send {
    fn info(&self) -> CoreInfo;

    /// Return to power-on state, keeping the loaded game and battery data
    fn reset(&mut self);

    /// Emulate one video frame with `keys` held.
    ///
    /// Interleaved stereo samples produced during the frame are appended to
    /// `audio`. Returns whether a new frame was completed.
    fn run_frame(&mut self, keys: Keys, audio: &mut Vec<i16>) -> bool;

    /// The most recently completed frame
    fn current_frame(&self) -> FrameRef<'_>;

    /// Serialize the complete machine state
    fn save_state(&self) -> Result<Vec<u8>, String>;

    /// Restore a blob produced by [`Core::save_state`]
    fn load_state(&mut self, data: &[u8]) -> Result<(), String>;

    /// React to an option change. Unused options are ignored.
    fn apply_option(&mut self, option: &CoreOption);

    /// Seed battery-backed memory from a save file
    fn load_battery(&mut self, data: &[u8]);

    /// Battery memory if it changed since the last call
    fn take_dirty_battery(&mut self) -> Option<Vec<u8>>;

    /// Connect a link cable peer. Replaces any current link.
    fn attach_link(&mut self, link: Arc<dyn LockstepLink>);

    fn detach_link(&mut self);
}

/// Builds cores for ROM images
pub trait CoreFactory: Send + Sync {
    fn create(&self, rom: RomImage, options: &OptionSet) -> Result<Box<dyn Core>, LoadError>;
}

/// Multiplayer lockstep coordinator shared between several cores
pub trait LockstepLink: Send + Sync + Debug {
    /// This core's player number on the link
    fn player_index(&self) -> u8;

    /// Called by the core at each frame boundary to keep peers in step
    fn frame_boundary(&self, frame: u64);
}
