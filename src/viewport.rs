use crate::types::LogicalTarget;

/// The rectangle within the render surface where the source frame is drawn.
/// Offsets are kept fractional; rounding happens only when a concrete pixel
/// is needed, so centering stays exact for odd paddings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub offset_x: f32,
    pub offset_y: f32,
    pub width: f32,
    pub height: f32,
}

/// Aspect-preserving letterbox/pillarbox placement of a frame inside the
/// surface. A frame wider than the surface fits to surface width and centers
/// vertically; otherwise (including exactly equal ratios) it fits to surface
/// height and centers horizontally.
pub fn compute_placement(frame_w: u32, frame_h: u32, surface_w: u32, surface_h: u32) -> Placement {
    let (vw, vh) = (frame_w as f32, frame_h as f32);
    let (sw, sh) = (surface_w as f32, surface_h as f32);
    let frame_ratio = vw / vh;
    let surface_ratio = sw / sh;

    if frame_ratio > surface_ratio {
        let height = sw / frame_ratio;
        Placement {
            offset_x: 0.0,
            offset_y: (sh - height) / 2.0,
            width: sw,
            height,
        }
    } else {
        let width = sh * frame_ratio;
        Placement {
            offset_x: (sw - width) / 2.0,
            offset_y: 0.0,
            width,
            height: sh,
        }
    }
}

/// Map a normalized target into surface pixel coordinates, rounding half away
/// from zero so the marker lands on a stable pixel center.
pub fn map_target(target: LogicalTarget, placement: &Placement) -> (i32, i32) {
    let x = (placement.offset_x + target.x * placement.width).round() as i32;
    let y = (placement.offset_y + target.y * placement.height).round() as i32;
    (x, y)
}
