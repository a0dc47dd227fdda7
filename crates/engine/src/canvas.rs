use crate::assets::LoadedImage;
use crate::script::{ActorId, Facing};
use crate::sprites::{Clip, SpriteSheet};

const CLEAR_COLOR: [u8; 4] = [20, 22, 28, 255];
const PLACEHOLDER_COLOR: [u8; 4] = [220, 220, 240, 255];
const PLACEHOLDER_HALF_WIDTH_PX: i32 = 12;
const PLACEHOLDER_HEIGHT_PX: i32 = 40;
const DEFAULT_GROUND_RATIO: f32 = 0.9;
const DEFAULT_SPRITE_SCALE: f32 = 2.0;

/// Everything a surface needs to draw one actor for one frame.
#[derive(Debug, Clone, Copy)]
pub struct ActorSprite<'a> {
    pub actor: ActorId,
    pub clip: Clip,
    pub frame_index: u32,
    pub position: f32,
    pub facing: Facing,
    pub sheet: Option<&'a SpriteSheet>,
}

/// Drawing surface owned by one director at a time.
pub trait Canvas {
    fn size(&self) -> (u32, u32);
    fn clear(&mut self);
    fn draw_backdrop(&mut self, image: &LoadedImage);
    fn draw_actor(&mut self, sprite: &ActorSprite<'_>);
}

/// Software RGBA target. Actors stand on a ground line with their horizontal
/// position at the left edge of the frame, matching the scene coordinate
/// system.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    ground_y: i32,
    sprite_scale: f32,
    rgba: Vec<u8>,
}

impl FrameBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let mut buffer = Self {
            width,
            height,
            ground_y: (height as f32 * DEFAULT_GROUND_RATIO).round() as i32,
            sprite_scale: DEFAULT_SPRITE_SCALE,
            rgba: vec![0; width as usize * height as usize * 4],
        };
        buffer.clear();
        buffer
    }

    pub fn with_sprite_scale(mut self, scale: f32) -> Self {
        self.sprite_scale = normalized_sprite_scale(scale);
        self
    }

    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let bytes = self.rgba.get(offset..offset + 4)?;
        Some([bytes[0], bytes[1], bytes[2], bytes[3]])
    }

    pub fn ground_y(&self) -> i32 {
        self.ground_y
    }
}

impl Canvas for FrameBuffer {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self) {
        for pixel in self.rgba.chunks_exact_mut(4) {
            pixel.copy_from_slice(&CLEAR_COLOR);
        }
    }

    fn draw_backdrop(&mut self, image: &LoadedImage) {
        stretch_image(&mut self.rgba, self.width, self.height, image);
    }

    fn draw_actor(&mut self, sprite: &ActorSprite<'_>) {
        let left = sprite.position.round() as i32;
        match sprite.sheet {
            Some(sheet) => {
                let frame_index = sprite.frame_index.min(sheet.last_frame());
                let (scaled_w, scaled_h) = scaled_frame_dimensions(sheet, self.sprite_scale);
                let top = self.ground_y - scaled_h as i32;
                blit_sheet_frame(
                    &mut self.rgba,
                    self.width,
                    self.height,
                    FrameBlit {
                        sheet,
                        frame_index,
                        left,
                        top,
                        scaled_w,
                        scaled_h,
                        flip: sprite.facing == Facing::Left,
                    },
                );
            }
            None => draw_placeholder(
                &mut self.rgba,
                self.width,
                self.height,
                left + PLACEHOLDER_HALF_WIDTH_PX,
                self.ground_y,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Clear,
    Backdrop {
        width: u32,
        height: u32,
    },
    Actor {
        actor: ActorId,
        clip: Clip,
        frame_index: u32,
        position: f32,
        facing: Facing,
        has_sheet: bool,
    },
}

/// Logs draw calls instead of touching pixels.
#[derive(Debug, Clone, Default)]
pub struct RecordingCanvas {
    width: u32,
    height: u32,
    commands: Vec<DrawCommand>,
}

impl RecordingCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.commands)
    }

    /// The most recent draw of `actor`, if any.
    pub fn last_actor_draw(&self, actor: ActorId) -> Option<&DrawCommand> {
        self.commands.iter().rev().find(
            |command| matches!(command, DrawCommand::Actor { actor: drawn, .. } if *drawn == actor),
        )
    }
}

impl Canvas for RecordingCanvas {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self) {
        self.commands.push(DrawCommand::Clear);
    }

    fn draw_backdrop(&mut self, image: &LoadedImage) {
        self.commands.push(DrawCommand::Backdrop {
            width: image.width,
            height: image.height,
        });
    }

    fn draw_actor(&mut self, sprite: &ActorSprite<'_>) {
        self.commands.push(DrawCommand::Actor {
            actor: sprite.actor,
            clip: sprite.clip,
            frame_index: sprite.frame_index,
            position: sprite.position,
            facing: sprite.facing,
            has_sheet: sprite.sheet.is_some(),
        });
    }
}

struct FrameBlit<'a> {
    sheet: &'a SpriteSheet,
    frame_index: u32,
    left: i32,
    top: i32,
    scaled_w: u32,
    scaled_h: u32,
    flip: bool,
}

fn normalized_sprite_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

fn scaled_frame_dimensions(sheet: &SpriteSheet, scale: f32) -> (u32, u32) {
    let scale = normalized_sprite_scale(scale);
    let width = (sheet.frame_width as f32 * scale).round().max(1.0) as u32;
    let height = (sheet.frame_height() as f32 * scale).round().max(1.0) as u32;
    (width, height)
}

fn blit_sheet_frame(frame: &mut [u8], width: u32, height: u32, blit: FrameBlit<'_>) {
    let sheet = blit.sheet;
    let image = &sheet.image;
    if image.width == 0 || image.height == 0 || width == 0 || height == 0 {
        return;
    }
    if image.rgba.len() < image.width as usize * image.height as usize * 4 {
        return;
    }

    let right = blit.left + blit.scaled_w as i32;
    let bottom = blit.top + blit.scaled_h as i32;
    let draw_left = blit.left.max(0);
    let draw_top = blit.top.max(0);
    let draw_right = right.min(width as i32);
    let draw_bottom = bottom.min(height as i32);
    if draw_left >= draw_right || draw_top >= draw_bottom {
        return;
    }

    let x_ratio = sheet.frame_width as f32 / blit.scaled_w as f32;
    let y_ratio = sheet.frame_height() as f32 / blit.scaled_h as f32;
    let frame_origin_x = blit.frame_index * sheet.frame_width;
    let frame_width = width as usize;
    let image_width = image.width as usize;

    for out_y in draw_top..draw_bottom {
        let dy = out_y - blit.top;
        let src_y = ((dy as f32) * y_ratio).floor() as u32;
        let src_y = src_y.min(image.height - 1) as usize;
        let src_row_offset = src_y * image_width * 4;
        let dst_row_offset = out_y as usize * frame_width * 4;

        for out_x in draw_left..draw_right {
            let mut dx = out_x - blit.left;
            if blit.flip {
                dx = blit.scaled_w as i32 - 1 - dx;
            }
            let local_x = ((dx as f32) * x_ratio).floor() as u32;
            let src_x = (frame_origin_x + local_x.min(sheet.frame_width - 1)) as usize;
            let src_offset = src_row_offset + src_x * 4;
            let alpha = image.rgba[src_offset + 3];
            if alpha == 0 {
                continue;
            }
            let dst_offset = dst_row_offset + out_x as usize * 4;
            frame[dst_offset..dst_offset + 3]
                .copy_from_slice(&image.rgba[src_offset..src_offset + 3]);
            frame[dst_offset + 3] = alpha;
        }
    }
}

fn stretch_image(frame: &mut [u8], width: u32, height: u32, image: &LoadedImage) {
    if image.width == 0 || image.height == 0 || width == 0 || height == 0 {
        return;
    }
    if image.rgba.len() < image.width as usize * image.height as usize * 4 {
        return;
    }
    let image_width = image.width as usize;
    for out_y in 0..height {
        let src_y = (out_y as u64 * image.height as u64 / height as u64) as usize;
        for out_x in 0..width {
            let src_x = (out_x as u64 * image.width as u64 / width as u64) as usize;
            let src_offset = (src_y * image_width + src_x) * 4;
            let dst_offset = (out_y as usize * width as usize + out_x as usize) * 4;
            frame[dst_offset..dst_offset + 4]
                .copy_from_slice(&image.rgba[src_offset..src_offset + 4]);
        }
    }
}

fn write_pixel_rgba_clipped(frame: &mut [u8], width: usize, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let x = x as usize;
    let y = y as usize;
    let Some(pixel_offset) = y.checked_mul(width).and_then(|row| row.checked_add(x)) else {
        return;
    };
    let Some(byte_offset) = pixel_offset.checked_mul(4) else {
        return;
    };
    let Some(end) = byte_offset.checked_add(4) else {
        return;
    };
    if end > frame.len() {
        return;
    }
    frame[byte_offset..end].copy_from_slice(&color);
}

fn draw_placeholder(frame: &mut [u8], width: u32, height: u32, cx: i32, ground_y: i32) {
    for y in (ground_y - PLACEHOLDER_HEIGHT_PX)..ground_y {
        for x in (cx - PLACEHOLDER_HALF_WIDTH_PX)..=(cx + PLACEHOLDER_HALF_WIDTH_PX) {
            if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                continue;
            }
            write_pixel_rgba_clipped(frame, width as usize, x, y, PLACEHOLDER_COLOR);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_frame_sheet() -> SpriteSheet {
        // Frame 0 is red on its left half only, frame 1 is solid blue.
        let mut rgba = Vec::new();
        for _y in 0..4 {
            for x in 0..8 {
                let color = match x {
                    0 | 1 => [255, 0, 0, 255],
                    2 | 3 => [0, 0, 0, 0],
                    _ => [0, 0, 255, 255],
                };
                rgba.extend_from_slice(&color);
            }
        }
        let image = LoadedImage::from_rgba(8, 4, rgba).expect("image");
        SpriteSheet::from_image(image, 4).expect("sheet")
    }

    fn sprite(sheet: &SpriteSheet, frame_index: u32, facing: Facing) -> ActorSprite<'_> {
        ActorSprite {
            actor: ActorId::Knight,
            clip: Clip::Idle,
            frame_index,
            position: 2.0,
            facing,
            sheet: Some(sheet),
        }
    }

    #[test]
    fn clear_fills_with_clear_color() {
        let buffer = FrameBuffer::new(3, 2);
        assert_eq!(buffer.pixel(2, 1), Some(CLEAR_COLOR));
        assert_eq!(buffer.rgba().len(), 3 * 2 * 4);
    }

    #[test]
    fn backdrop_is_stretched_to_surface() {
        let mut buffer = FrameBuffer::new(4, 4);
        let image = LoadedImage::from_rgba(
            2,
            1,
            vec![10, 10, 10, 255, 200, 200, 200, 255],
        )
        .expect("image");
        buffer.draw_backdrop(&image);
        assert_eq!(buffer.pixel(0, 3), Some([10, 10, 10, 255]));
        assert_eq!(buffer.pixel(3, 0), Some([200, 200, 200, 255]));
    }

    #[test]
    fn actor_frame_is_cut_from_sheet_and_flipped_when_facing_left() {
        let sheet = two_frame_sheet();
        let mut buffer = FrameBuffer::new(16, 10).with_sprite_scale(1.0);
        let top = (buffer.ground_y() - 4) as u32;

        buffer.draw_actor(&sprite(&sheet, 0, Facing::Right));
        assert_eq!(buffer.pixel(2, top), Some([255, 0, 0, 255]));
        assert_eq!(buffer.pixel(5, top), Some(CLEAR_COLOR));

        buffer.clear();
        buffer.draw_actor(&sprite(&sheet, 0, Facing::Left));
        assert_eq!(buffer.pixel(2, top), Some(CLEAR_COLOR));
        assert_eq!(buffer.pixel(5, top), Some([255, 0, 0, 255]));

        buffer.clear();
        buffer.draw_actor(&sprite(&sheet, 1, Facing::Right));
        assert_eq!(buffer.pixel(3, top), Some([0, 0, 255, 255]));
    }

    #[test]
    fn missing_sheet_draws_placeholder() {
        let mut buffer = FrameBuffer::new(64, 64);
        buffer.draw_actor(&ActorSprite {
            actor: ActorId::Orc,
            clip: Clip::Walk,
            frame_index: 3,
            position: 10.0,
            facing: Facing::Right,
            sheet: None,
        });
        let ground = buffer.ground_y() as u32;
        assert_eq!(buffer.pixel(22, ground - 1), Some(PLACEHOLDER_COLOR));
    }

    #[test]
    fn recording_canvas_logs_in_order() {
        let mut canvas = RecordingCanvas::new(800, 600);
        canvas.clear();
        canvas.draw_backdrop(&LoadedImage::solid(2, 2, [0, 0, 0, 255]));
        canvas.draw_actor(&ActorSprite {
            actor: ActorId::Slime,
            clip: Clip::Idle,
            frame_index: 0,
            position: 40.0,
            facing: Facing::Left,
            sheet: None,
        });
        assert_eq!(canvas.commands().len(), 3);
        assert_eq!(canvas.commands()[0], DrawCommand::Clear);
        assert!(matches!(
            canvas.last_actor_draw(ActorId::Slime),
            Some(DrawCommand::Actor { has_sheet: false, .. })
        ));
        assert!(canvas.last_actor_draw(ActorId::Orc).is_none());
    }
}
