//! Software presenter
//!
//! Composites the texture into a viewport-sized RGBA image with nearest
//! neighbour sampling. Used headless and by tests, which read the result
//! through a [`PresentProbe`].

use super::PresentBackend;
use crate::mailbox::StoredFrame;
use crate::scaling::Rect;
use cb_core::SurfaceError;
use parking_lot::Mutex;
use std::sync::Arc;

/// Shared view of what the presenter last drew
#[derive(Debug, Default)]
pub struct ProbeState {
    /// Viewport contents after the last present
    pub image: Vec<u8>,
    pub viewport: (u32, u32),
    pub uploads: u64,
    pub presents: u64,
    pub last_target: Option<Rect>,
    pub initialized: bool,
    /// Number of upcoming uploads to reject
    pub fail_uploads: u32,
}

pub type PresentProbe = Arc<Mutex<ProbeState>>;

/// Nearest-neighbour software presenter
pub struct NullPresenter {
    texture: StoredFrame,
    probe: PresentProbe,
    fail_init: bool,
}

impl NullPresenter {
    /// Presenter drawing into a `width` × `height` viewport
    pub fn new(width: u32, height: u32) -> (Self, PresentProbe) {
        let probe = Arc::new(Mutex::new(ProbeState {
            viewport: (width, height),
            ..ProbeState::default()
        }));
        let presenter = Self {
            texture: StoredFrame::default(),
            probe: Arc::clone(&probe),
            fail_init: false,
        };
        (presenter, probe)
    }

    /// Presenter whose initialisation always fails
    pub fn failing() -> Self {
        let (mut presenter, _) = Self::new(0, 0);
        presenter.fail_init = true;
        presenter
    }
}

/// Resize the viewport behind a probe; takes effect at the next present
pub fn resize(probe: &PresentProbe, width: u32, height: u32) {
    probe.lock().viewport = (width, height);
}

impl PresentBackend for NullPresenter {
    fn name(&self) -> &'static str {
        "null"
    }

    fn init(&mut self) -> Result<(), SurfaceError> {
        if self.fail_init {
            return Err(SurfaceError::Allocation("no drawable".to_string()));
        }
        self.probe.lock().initialized = true;
        Ok(())
    }

    fn shutdown(&mut self) {
        self.texture = StoredFrame::default();
        self.probe.lock().initialized = false;
    }

    fn viewport_size(&self) -> (u32, u32) {
        self.probe.lock().viewport
    }

    fn upload(&mut self, frame: &StoredFrame) -> Result<(), SurfaceError> {
        {
            let mut probe = self.probe.lock();
            if probe.fail_uploads > 0 {
                probe.fail_uploads -= 1;
                return Err(SurfaceError::Allocation("texture upload rejected".to_string()));
            }
        }
        self.texture.pixels.clone_from(&frame.pixels);
        self.texture.width = frame.width;
        self.texture.height = frame.height;
        self.texture.sequence = frame.sequence;
        self.probe.lock().uploads += 1;
        Ok(())
    }

    fn present(&mut self, target: Rect) -> Result<(), SurfaceError> {
        let mut probe = self.probe.lock();
        let (vw, vh) = probe.viewport;
        let image = &mut probe.image;
        image.clear();
        image.resize(vw as usize * vh as usize * 4, 0);

        let tex = &self.texture;
        if !target.is_empty() && !tex.is_empty() {
            let x_end = (target.x + target.width).min(vw);
            let y_end = (target.y + target.height).min(vh);
            for y in target.y..y_end {
                let sy = ((y - target.y) as u64 * tex.height as u64 / target.height as u64) as usize;
                for x in target.x..x_end {
                    let sx =
                        ((x - target.x) as u64 * tex.width as u64 / target.width as u64) as usize;
                    let src = (sy * tex.width as usize + sx) * 4;
                    let dst = (y as usize * vw as usize + x as usize) * 4;
                    image[dst..dst + 4].copy_from_slice(&tex.pixels[src..src + 4]);
                }
            }
        }

        probe.presents += 1;
        probe.last_target = Some(target);
        Ok(())
    }
}
