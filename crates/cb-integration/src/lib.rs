//! Core lifecycle management for corebridge
//!
//! This crate owns the running core: its thread, the control command
//! channel, save files, rewind history and frame pacing.

pub mod bridge;
mod core_thread;
pub mod handle;
pub mod pacing;
pub mod rewind;
pub mod storage;

pub use bridge::{BridgeState, CoreBridge};
pub use handle::{AudioMix, CoreHandle, CHANNELS};
pub use storage::{SaveStore, AUTOSAVE_SLOT, SLOT_COUNT};
