use crate::{
    config::{DepthNormalization, PointerProfile},
    types::{LandmarkName, LogicalTarget, Subject, TargetClass},
};

/// Width and height of the box spanned by the qualifying facial landmarks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceExtent {
    pub width: f32,
    pub height: f32,
}

const FACE_LANDMARKS: [LandmarkName; 5] = [
    LandmarkName::LeftEye,
    LandmarkName::RightEye,
    LandmarkName::Nose,
    LandmarkName::LeftEar,
    LandmarkName::RightEar,
];

/// Reduce a subject's landmarks to one normalized pointer target.
///
/// Fallback tiers in strict priority order; the first tier that yields a
/// usable result wins:
/// 1. both eyes above threshold -> midpoint of the eyes
/// 2. a wrist above threshold, right preferred over left -> that wrist
/// 3. nothing usable -> `None`; the caller keeps its previous target.
///
/// Scores must be strictly greater than the threshold.
pub fn interpret(
    subject: &Subject,
    frame_w: u32,
    frame_h: u32,
    threshold: f32,
) -> Option<(LogicalTarget, TargetClass)> {
    if frame_w == 0 || frame_h == 0 {
        return None;
    }
    let (vw, vh) = (frame_w as f32, frame_h as f32);

    let qualified = |name: LandmarkName| {
        subject
            .get(name)
            .filter(|l| l.score > threshold)
            .map(|l| (l.x, l.y))
    };

    if let (Some(left), Some(right)) = (
        qualified(LandmarkName::LeftEye),
        qualified(LandmarkName::RightEye),
    ) {
        let target = LogicalTarget::new((left.0 + right.0) / 2.0 / vw, (left.1 + right.1) / 2.0 / vh);
        return Some((target, TargetClass::Eyes));
    }

    if let Some((x, y)) = qualified(LandmarkName::RightWrist) {
        return Some((LogicalTarget::new(x / vw, y / vh), TargetClass::RightWrist));
    }
    if let Some((x, y)) = qualified(LandmarkName::LeftWrist) {
        return Some((LogicalTarget::new(x / vw, y / vh), TargetClass::LeftWrist));
    }

    None
}

/// Bounding box over the facial landmarks clearing the threshold, or `None`
/// when fewer than two qualify.
pub fn face_extent(subject: &Subject, threshold: f32) -> Option<FaceExtent> {
    let mut min_x = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    let mut count = 0usize;

    for name in FACE_LANDMARKS {
        let Some(landmark) = subject.get(name).filter(|l| l.score > threshold) else {
            continue;
        };
        min_x = min_x.min(landmark.x);
        max_x = max_x.max(landmark.x);
        min_y = min_y.min(landmark.y);
        max_y = max_y.max(landmark.y);
        count += 1;
    }

    if count < 2 {
        return None;
    }
    Some(FaceExtent {
        width: max_x - min_x,
        height: max_y - min_y,
    })
}

/// Depth proxy from the apparent face size: `K / normalization(extent)`,
/// falling back to the profile constant when no extent is available or the
/// divisor is degenerate.
pub fn depth_estimate(extent: Option<FaceExtent>, profile: &PointerProfile) -> f32 {
    let Some(extent) = extent else {
        return profile.depth_fallback;
    };
    let divisor = match profile.depth_normalization {
        DepthNormalization::BoxWidth => extent.width,
        DepthNormalization::BoxExtent => extent.width + extent.height,
    };
    if divisor <= f32::EPSILON {
        return profile.depth_fallback;
    }
    profile.depth_constant / divisor
}
