use std::time::Instant;

/// One raw capture frame in source-pixel space.
///
/// `generation` identifies the capture-stream incarnation that produced the
/// frame. When the capture thread has to reopen its device, the generation is
/// bumped so downstream consumers can discard results computed against a
/// stream that no longer exists.
#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
    pub generation: u64,
}

/// The 17 MoveNet/COCO keypoint names, in model output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum LandmarkName {
    Nose = 0,
    LeftEye = 1,
    RightEye = 2,
    LeftEar = 3,
    RightEar = 4,
    LeftShoulder = 5,
    RightShoulder = 6,
    LeftElbow = 7,
    RightElbow = 8,
    LeftWrist = 9,
    RightWrist = 10,
    LeftHip = 11,
    RightHip = 12,
    LeftKnee = 13,
    RightKnee = 14,
    LeftAnkle = 15,
    RightAnkle = 16,
}

impl LandmarkName {
    pub const COUNT: usize = 17;

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Nose),
            1 => Some(Self::LeftEye),
            2 => Some(Self::RightEye),
            3 => Some(Self::LeftEar),
            4 => Some(Self::RightEar),
            5 => Some(Self::LeftShoulder),
            6 => Some(Self::RightShoulder),
            7 => Some(Self::LeftElbow),
            8 => Some(Self::RightElbow),
            9 => Some(Self::LeftWrist),
            10 => Some(Self::RightWrist),
            11 => Some(Self::LeftHip),
            12 => Some(Self::RightHip),
            13 => Some(Self::LeftKnee),
            14 => Some(Self::RightKnee),
            15 => Some(Self::LeftAnkle),
            16 => Some(Self::RightAnkle),
            _ => None,
        }
    }
}

/// A single detected keypoint, in source-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub name: LandmarkName,
    pub x: f32,
    pub y: f32,
    pub score: f32,
}

/// One detected person: an ordered set of landmarks. At most one subject is
/// considered per cycle.
#[derive(Debug, Clone, Default)]
pub struct Subject {
    pub landmarks: Vec<Landmark>,
}

impl Subject {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    pub fn get(&self, name: LandmarkName) -> Option<&Landmark> {
        self.landmarks.iter().find(|l| l.name == name)
    }
}

/// The persisted pointer position, normalized to [0,1]² of the source frame.
///
/// This is the pipeline's only cross-cycle mutable state: when a cycle yields
/// no usable landmark the previous value is retained unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogicalTarget {
    pub x: f32,
    pub y: f32,
}

impl LogicalTarget {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Default for LogicalTarget {
    fn default() -> Self {
        // Center of the frame until the first detection lands.
        Self { x: 0.5, y: 0.5 }
    }
}

/// Which fallback tier produced the current target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetClass {
    Eyes,
    RightWrist,
    LeftWrist,
}

impl TargetClass {
    /// Marker fill color for the overlay dot. Cycles without a fresh
    /// detection use [`MARKER_DEFAULT_COLOR`].
    pub fn marker_color(&self) -> [u8; 4] {
        match self {
            TargetClass::Eyes => [0, 255, 0, 255],
            TargetClass::RightWrist => [0, 0, 255, 255],
            TargetClass::LeftWrist => [255, 0, 0, 255],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TargetClass::Eyes => "eyes",
            TargetClass::RightWrist => "right_wrist",
            TargetClass::LeftWrist => "left_wrist",
        }
    }
}

/// Marker color when the cycle produced no fresh detection and the retained
/// target is drawn instead.
pub const MARKER_DEFAULT_COLOR: [u8; 4] = [255, 0, 0, 255];
