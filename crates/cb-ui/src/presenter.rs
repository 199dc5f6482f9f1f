//! Presents frames as an egui texture
//!
//! The surface drives uploads and scaling; this backend only keeps the
//! texture and remembers where the app should paint it.

use cb_core::SurfaceError;
use cb_video::{PresentBackend, Rect, StoredFrame};
use egui::{ColorImage, TextureHandle, TextureId, TextureOptions};
use parking_lot::Mutex;
use std::sync::Arc;

/// What the app paints this pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drawn {
    pub texture: TextureId,
    pub target: Rect,
}

/// State shared between the presenter and the egui app
#[derive(Debug, Default)]
pub struct Screen {
    /// Size of the game area in points
    pub viewport: (u32, u32),
    pub drawn: Option<Drawn>,
}

pub type SharedScreen = Arc<Mutex<Screen>>;

/// egui texture presenter
pub struct EguiPresenter {
    ctx: egui::Context,
    screen: SharedScreen,
    texture: Option<TextureHandle>,
}

impl EguiPresenter {
    pub fn new(ctx: egui::Context) -> (Self, SharedScreen) {
        let screen = SharedScreen::default();
        let presenter = Self {
            ctx,
            screen: Arc::clone(&screen),
            texture: None,
        };
        (presenter, screen)
    }
}

impl PresentBackend for EguiPresenter {
    fn name(&self) -> &'static str {
        "egui"
    }

    fn init(&mut self) -> Result<(), SurfaceError> {
        Ok(())
    }

    fn shutdown(&mut self) {
        self.texture = None;
        self.screen.lock().drawn = None;
    }

    fn viewport_size(&self) -> (u32, u32) {
        self.screen.lock().viewport
    }

    fn upload(&mut self, frame: &StoredFrame) -> Result<(), SurfaceError> {
        let size = [frame.width as usize, frame.height as usize];
        if frame.pixels.len() != size[0] * size[1] * 4 {
            return Err(SurfaceError::Present(format!(
                "frame {}x{} has {} bytes",
                frame.width,
                frame.height,
                frame.pixels.len()
            )));
        }
        let image = ColorImage::from_rgba_unmultiplied(size, &frame.pixels);
        match &mut self.texture {
            Some(texture) => texture.set(image, TextureOptions::NEAREST),
            None => {
                self.texture =
                    Some(self.ctx.load_texture("corebridge-frame", image, TextureOptions::NEAREST));
            }
        }
        Ok(())
    }

    fn present(&mut self, target: Rect) -> Result<(), SurfaceError> {
        let texture = self
            .texture
            .as_ref()
            .ok_or_else(|| SurfaceError::Present("no texture uploaded".to_string()))?;
        self.screen.lock().drawn = Some(Drawn {
            texture: texture.id(),
            target,
        });
        Ok(())
    }
}
