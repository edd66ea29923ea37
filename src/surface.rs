use std::path::PathBuf;

use anyhow::{Context, Result};
use fast_image_resize::{PixelType, ResizeOptions, Resizer, images::Image};
use image::RgbaImage;

use crate::{types::Frame, viewport::Placement};

/// The fixed-size render target. One implementation draws into an owned RGBA
/// buffer; tests substitute a recording stub. Nothing persists across cycles:
/// every cycle clears and redraws the full surface.
pub trait RenderSurface {
    fn size(&self) -> (u32, u32);
    fn clear(&mut self, color: [u8; 4]);
    fn draw_frame(&mut self, frame: &Frame, placement: &Placement);
    fn draw_marker(&mut self, center: (i32, i32), radius: i32, color: [u8; 4]);
    fn present(&mut self) -> Result<()>;
}

/// Software canvas. `present` optionally writes a PNG snapshot of the
/// composited surface every `snapshot_every` cycles.
pub struct Canvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    resizer: Resizer,
    snapshot_dir: Option<PathBuf>,
    snapshot_every: u64,
    presented: u64,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; (width * height * 4) as usize],
            resizer: Resizer::new(),
            snapshot_dir: None,
            snapshot_every: 0,
            presented: 0,
        }
    }

    pub fn with_snapshots(mut self, dir: PathBuf, every: u64) -> Self {
        self.snapshot_dir = Some(dir);
        self.snapshot_every = every.max(1);
        self
    }

    #[cfg(test)]
    fn pixel_at(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * self.width + x) as usize) * 4;
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }

    fn write_snapshot(&self) -> Result<()> {
        let Some(dir) = &self.snapshot_dir else {
            return Ok(());
        };
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create snapshot directory {}", dir.display()))?;
        let path = dir.join(format!("surface_{:06}.png", self.presented));
        let img = RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
            .context("surface buffer does not match its dimensions")?;
        img.save(&path)
            .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        log::debug!("wrote snapshot {}", path.display());
        Ok(())
    }
}

impl RenderSurface for Canvas {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn clear(&mut self, color: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
    }

    fn draw_frame(&mut self, frame: &Frame, placement: &Placement) {
        let dst_w = placement.width.round().max(1.0) as u32;
        let dst_h = placement.height.round().max(1.0) as u32;
        let src = match Image::from_vec_u8(
            frame.width,
            frame.height,
            frame.rgba.clone(),
            PixelType::U8x4,
        ) {
            Ok(src) => src,
            Err(err) => {
                log::warn!("frame buffer rejected for blit: {err:?}");
                return;
            }
        };
        let mut dst = Image::new(dst_w, dst_h, PixelType::U8x4);
        if let Err(err) = self.resizer.resize(&src, &mut dst, &ResizeOptions::new()) {
            log::warn!("frame resize failed: {err:?}");
            return;
        }

        // Placement is always contained in the surface; clamp anyway so a
        // bad caller cannot index out of bounds.
        let off_x = (placement.offset_x.round() as i64).max(0);
        let off_y = (placement.offset_y.round() as i64).max(0);
        let scaled = dst.buffer();
        for row in 0..dst_h as i64 {
            let sy = off_y + row;
            if sy < 0 || sy >= self.height as i64 {
                continue;
            }
            let copy_w = (dst_w as i64).min(self.width as i64 - off_x).max(0) as usize;
            if copy_w == 0 {
                continue;
            }
            let src_start = (row * dst_w as i64 * 4) as usize;
            let dst_start = ((sy * self.width as i64 + off_x) * 4) as usize;
            self.pixels[dst_start..dst_start + copy_w * 4]
                .copy_from_slice(&scaled[src_start..src_start + copy_w * 4]);
        }
    }

    fn draw_marker(&mut self, center: (i32, i32), radius: i32, color: [u8; 4]) {
        let (cx, cy) = center;
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy <= radius * radius {
                    put_pixel_safe(
                        &mut self.pixels,
                        self.width,
                        self.height,
                        cx + dx,
                        cy + dy,
                        color,
                    );
                }
            }
        }
    }

    fn present(&mut self) -> Result<()> {
        self.presented += 1;
        if self.snapshot_dir.is_some() && self.presented % self.snapshot_every == 0 {
            self.write_snapshot()?;
        }
        Ok(())
    }
}

fn put_pixel_safe(buffer: &mut [u8], width: u32, height: u32, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 {
        return;
    }
    let (ux, uy) = (x as u32, y as u32);
    if ux >= width || uy >= height {
        return;
    }
    let idx = ((uy * width + ux) as usize) * 4;
    if idx + 3 < buffer.len() {
        buffer[idx..idx + 4].copy_from_slice(&color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::viewport::compute_placement;
    use std::time::Instant;

    fn solid_frame(width: u32, height: u32, color: [u8; 4]) -> Frame {
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for _ in 0..width * height {
            rgba.extend_from_slice(&color);
        }
        Frame {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
            generation: 0,
        }
    }

    #[test]
    fn clear_fills_every_pixel() {
        let mut canvas = Canvas::new(4, 3);
        canvas.clear([7, 8, 9, 255]);
        assert_eq!(canvas.pixel_at(0, 0), [7, 8, 9, 255]);
        assert_eq!(canvas.pixel_at(3, 2), [7, 8, 9, 255]);
    }

    #[test]
    fn frame_blit_lands_inside_placement() {
        let mut canvas = Canvas::new(100, 50);
        canvas.clear([0, 0, 0, 255]);
        let frame = solid_frame(10, 10, [255, 255, 255, 255]);
        // Square frame into 2:1 surface: pillarbox, width 50, offset 25.
        let placement = compute_placement(10, 10, 100, 50);
        canvas.draw_frame(&frame, &placement);

        assert_eq!(canvas.pixel_at(50, 25), [255, 255, 255, 255]);
        // Pillarbox bands stay untouched.
        assert_eq!(canvas.pixel_at(0, 25), [0, 0, 0, 255]);
        assert_eq!(canvas.pixel_at(99, 25), [0, 0, 0, 255]);
    }

    #[test]
    fn marker_clips_at_edges() {
        let mut canvas = Canvas::new(10, 10);
        canvas.clear([0, 0, 0, 255]);
        canvas.draw_marker((0, 0), 3, [255, 0, 0, 255]);
        canvas.draw_marker((20, 20), 3, [255, 0, 0, 255]);
        assert_eq!(canvas.pixel_at(0, 0), [255, 0, 0, 255]);
        assert_eq!(canvas.pixel_at(9, 9), [0, 0, 0, 255]);
    }

    #[test]
    fn marker_is_a_filled_disc() {
        let mut canvas = Canvas::new(20, 20);
        canvas.clear([0, 0, 0, 255]);
        canvas.draw_marker((10, 10), 3, [0, 255, 0, 255]);
        assert_eq!(canvas.pixel_at(10, 10), [0, 255, 0, 255]);
        assert_eq!(canvas.pixel_at(13, 10), [0, 255, 0, 255]);
        // Corner of the bounding square is outside the disc.
        assert_eq!(canvas.pixel_at(13, 13), [0, 0, 0, 255]);
    }
}
