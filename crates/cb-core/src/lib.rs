//! Shared foundation for the corebridge host layer
//!
//! This crate provides the error types, configuration, runtime options,
//! keypad and frame types, the audio sample ring and the contract every
//! emulation core implements. A deterministic reference core lives in
//! [`pattern`].

pub mod audio_ring;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod keys;
pub mod logging;
pub mod options;
pub mod palette;
pub mod pattern;
pub mod rom;

pub use audio_ring::{AudioRing, RingStats};
pub use config::Config;
pub use engine::{Core, CoreFactory, CoreInfo, LockstepLink};
pub use error::{
    AudioSinkError, BridgeError, LoadError, OptionError, Result, StateIoError, SurfaceError,
};
pub use frame::{FrameCallback, FrameRef};
pub use keys::{KeyState, Keys};
pub use options::{CoreOption, IdleOptimization, OptionSet, OptionValue};
pub use rom::{Platform, RomImage};
