use std::time::{Duration, Instant};

use crate::config::PointerProfile;

/// Where the pipeline publishes its human-visible strings. The UI layer is an
/// external collaborator; the core only pushes a detection summary line and
/// the three throughput fields through this seam.
pub trait StatusSink {
    fn publish_summary(&mut self, line: &str);
    fn publish_stats(&mut self, load: &str, fps: &str, processing: &str);
}

/// Default sink: structured log lines.
#[derive(Debug, Default)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn publish_summary(&mut self, line: &str) {
        log::info!("detection: {line}");
    }

    fn publish_stats(&mut self, load: &str, fps: &str, processing: &str) {
        log::info!("load {load} | fps {fps} | processing {processing}");
    }
}

/// Raw timings of one completed cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleMetrics {
    /// Time spent inside the cycle (inference through render).
    pub processing: Duration,
    /// Wall-clock spacing to the previous cycle's end.
    pub delta: Duration,
}

impl CycleMetrics {
    pub fn load_percent(&self) -> u32 {
        let delta_ms = self.delta.as_secs_f32() * 1000.0;
        if delta_ms <= f32::EPSILON {
            return 0;
        }
        let processing_ms = self.processing.as_secs_f32() * 1000.0;
        (processing_ms / delta_ms * 100.0).round() as u32
    }

    pub fn frames_per_second(&self) -> u32 {
        let delta_ms = self.delta.as_secs_f32() * 1000.0;
        if delta_ms <= f32::EPSILON {
            return 0;
        }
        (1000.0 / delta_ms).round() as u32
    }

    pub fn processing_ms(&self) -> u32 {
        (self.processing.as_secs_f32() * 1000.0).round() as u32
    }
}

/// Computes per-cycle throughput metrics and throttles their publication.
///
/// Metrics are recomputed every cycle; the sink only sees a new summary line
/// after `summary_interval` and a new stat triple after `stats_interval` have
/// elapsed since the respective previous publication. The first publication
/// of each goes out immediately.
pub struct TelemetryAggregator {
    summary_interval: Duration,
    stats_interval: Duration,
    last_cycle_end: Instant,
    last_summary: Option<Instant>,
    last_stats: Option<Instant>,
}

impl TelemetryAggregator {
    pub fn new(profile: &PointerProfile, now: Instant) -> Self {
        Self {
            summary_interval: profile.summary_interval,
            stats_interval: profile.stats_interval,
            last_cycle_end: now,
            last_summary: None,
            last_stats: None,
        }
    }

    /// Close out one cycle. `now` is the cycle's end timestamp and becomes
    /// the reference point for the next cycle's delta.
    pub fn record_cycle(&mut self, cycle_start: Instant, now: Instant) -> CycleMetrics {
        let metrics = CycleMetrics {
            processing: now.saturating_duration_since(cycle_start),
            delta: now.saturating_duration_since(self.last_cycle_end),
        };
        self.last_cycle_end = now;
        metrics
    }

    /// Push the detection summary if the 100ms-class window has elapsed.
    /// Returns whether the sink was updated.
    pub fn publish_summary(
        &mut self,
        line: &str,
        now: Instant,
        sink: &mut dyn StatusSink,
    ) -> bool {
        if !due(self.last_summary, now, self.summary_interval) {
            return false;
        }
        sink.publish_summary(line);
        self.last_summary = Some(now);
        true
    }

    /// Push the stat triple if the 250ms-class window has elapsed. Returns
    /// whether the sink was updated.
    pub fn publish_stats(
        &mut self,
        metrics: &CycleMetrics,
        now: Instant,
        sink: &mut dyn StatusSink,
    ) -> bool {
        if !due(self.last_stats, now, self.stats_interval) {
            return false;
        }
        sink.publish_stats(
            &format!("{}%", metrics.load_percent()),
            &metrics.frames_per_second().to_string(),
            &format!("{}ms", metrics.processing_ms()),
        );
        self.last_stats = Some(now);
        true
    }
}

fn due(last: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match last {
        None => true,
        Some(last) => now.saturating_duration_since(last) > interval,
    }
}
