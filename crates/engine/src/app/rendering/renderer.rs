use std::sync::Arc;

use pixels::{Error, Pixels, SurfaceTexture, TextureError};
use tracing::warn;
use winit::window::Window;

use crate::canvas::{Canvas, FrameBuffer};

/// Presents a [`FrameBuffer`] in a window. The buffer keeps the scene's
/// surface size; pixels scales it to whatever the window is.
pub struct Renderer {
    pixels: Pixels<'static>,
    surface_width: u32,
    surface_height: u32,
}

impl Renderer {
    pub fn new(
        window: Arc<Window>,
        surface_width: u32,
        surface_height: u32,
    ) -> Result<Self, Error> {
        let size = window.inner_size();
        let surface = SurfaceTexture::new(size.width.max(1), size.height.max(1), window);
        let pixels = Pixels::new(surface_width, surface_height, surface)?;
        Ok(Self {
            pixels,
            surface_width,
            surface_height,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), TextureError> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels.resize_surface(width, height)
    }

    pub fn present(&mut self, frame: &FrameBuffer) -> Result<(), Error> {
        let target = self.pixels.frame_mut();
        if target.len() == frame.rgba().len() {
            target.copy_from_slice(frame.rgba());
        } else {
            let (width, height) = frame.size();
            warn!(
                frame_width = width,
                frame_height = height,
                surface_width = self.surface_width,
                surface_height = self.surface_height,
                "frame_size_mismatch"
            );
        }
        self.pixels.render()
    }
}
