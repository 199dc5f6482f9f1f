//! Video presentation for corebridge
//!
//! Frames published by the core thread land in a single-slot mailbox and
//! are drawn by a [`VideoSurface`] at the host's display cadence.

pub mod backend;
pub mod mailbox;
pub mod scaling;
pub mod surface;

pub use backend::{NullPresenter, PresentBackend, PresentProbe};
pub use mailbox::{FrameMailbox, StoredFrame};
pub use scaling::{place, Rect, ScalingMode};
pub use surface::{DisplayOutcome, SurfaceStats, VideoSurface};
