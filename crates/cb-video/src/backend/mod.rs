//! Presentation backends

pub mod null;

pub use null::{NullPresenter, PresentProbe};

use crate::mailbox::StoredFrame;
use crate::scaling::Rect;
use cb_core::SurfaceError;

/// A host drawing target for emulated frames
pub trait PresentBackend: Send {
    fn name(&self) -> &'static str;

    /// Acquire GPU or window resources
    fn init(&mut self) -> Result<(), SurfaceError>;

    /// Release everything acquired by `init`
    fn shutdown(&mut self);

    /// Drawable size in pixels
    fn viewport_size(&self) -> (u32, u32);

    /// Replace the texture with `frame`
    fn upload(&mut self, frame: &StoredFrame) -> Result<(), SurfaceError>;

    /// Draw the current texture into `target`, clearing the rest
    fn present(&mut self, target: Rect) -> Result<(), SurfaceError>;
}
