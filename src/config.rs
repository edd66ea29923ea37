use std::{str::FromStr, time::Duration};

/// How the face bounding box is collapsed into the divisor of the depth proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthNormalization {
    /// Divide by the box width alone.
    BoxWidth,
    /// Divide by width + height.
    BoxExtent,
}

/// Sort direction for the enumerated device list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSortOrder {
    Ascending,
    Descending,
}

/// What happens to the detection model when the active camera changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelReloadPolicy {
    /// Reload unconditionally on every switch.
    Always,
    /// Reuse the loaded model; load only if none is present.
    IfUnloaded,
}

/// Unified configuration for the two shipped pipeline variants.
///
/// The variants differ only in thresholds, pacing, depth normalization and
/// reconfiguration policy, so they collapse into one parameterized profile.
#[derive(Debug, Clone)]
pub struct PointerProfile {
    pub name: &'static str,
    /// Landmark scores must be strictly greater than this to count.
    pub confidence_threshold: f32,
    /// Minimum spacing between processed cycles. `None` processes every tick.
    pub min_frame_interval: Option<Duration>,
    /// K in `depth = K / normalization(face_extent)`.
    pub depth_constant: f32,
    pub depth_normalization: DepthNormalization,
    /// Depth reported when no face extent is available.
    pub depth_fallback: f32,
    pub device_sort: DeviceSortOrder,
    pub reload_policy: ModelReloadPolicy,
    pub surface_width: u32,
    pub surface_height: u32,
    /// Throttle for the human-readable detection summary line.
    pub summary_interval: Duration,
    /// Throttle for the load/fps/processing-time triple.
    pub stats_interval: Duration,
    pub marker_radius: i32,
}

impl PointerProfile {
    /// 1080p profile: permissive threshold, cycle rate capped at 70/s,
    /// width-only depth normalization, model reloaded on every switch.
    pub fn hd() -> Self {
        Self {
            name: "hd",
            confidence_threshold: 0.2,
            min_frame_interval: Some(Duration::from_micros(1_000_000 / 70)),
            depth_constant: 2000.0,
            depth_normalization: DepthNormalization::BoxWidth,
            depth_fallback: 40.0,
            device_sort: DeviceSortOrder::Ascending,
            reload_policy: ModelReloadPolicy::Always,
            surface_width: 1920,
            surface_height: 1080,
            summary_interval: Duration::from_millis(100),
            stats_interval: Duration::from_millis(250),
            marker_radius: 6,
        }
    }

    /// 4K profile: stricter threshold, no cycle-rate ceiling, width+height
    /// depth normalization, model kept across switches.
    pub fn uhd() -> Self {
        Self {
            name: "uhd",
            confidence_threshold: 0.4,
            min_frame_interval: None,
            depth_constant: 4000.0,
            depth_normalization: DepthNormalization::BoxExtent,
            depth_fallback: 40.0,
            device_sort: DeviceSortOrder::Descending,
            reload_policy: ModelReloadPolicy::IfUnloaded,
            surface_width: 3840,
            surface_height: 2160,
            summary_interval: Duration::from_millis(100),
            stats_interval: Duration::from_millis(250),
            marker_radius: 6,
        }
    }
}

impl Default for PointerProfile {
    fn default() -> Self {
        Self::hd()
    }
}

impl FromStr for PointerProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hd" | "1080p" => Ok(Self::hd()),
            "uhd" | "4k" => Ok(Self::uhd()),
            other => Err(format!("unknown profile '{other}' (expected hd or uhd)")),
        }
    }
}
