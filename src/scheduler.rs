use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::Result;
use crossbeam_channel::{Receiver, TryRecvError};

use crate::{
    camera::FrameSource,
    config::PointerProfile,
    interpreter,
    oracle::DetectionOracle,
    surface::RenderSurface,
    telemetry::{StatusSink, TelemetryAggregator},
    types::{LogicalTarget, MARKER_DEFAULT_COLOR, TargetClass},
    viewport,
};

/// How long to park when a cycle was skipped, so an idle loop does not spin.
const IDLE_TICK: Duration = Duration::from_millis(5);

const CLEAR_COLOR: [u8; 4] = [0, 0, 0, 255];

/// External commands polled between cycles.
#[derive(Debug, Clone)]
pub enum ControlEvent {
    SwitchDevice(String),
    Shutdown,
}

/// Why the scheduler returned control to the session controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    SwitchDevice(String),
    Shutdown,
    SourceLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Reconfiguring,
    Stopped,
}

/// Why a tick performed no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    OracleUnready,
    NoFrame,
    DegenerateFrame,
    Paced,
    DetectionFailed,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Skipped(SkipReason),
    /// Inference finished after its capture stream was replaced; the result
    /// was dropped without rendering or telemetry.
    DiscardedStale,
    Completed {
        target: LogicalTarget,
        pixel: (i32, i32),
        class: Option<TargetClass>,
        depth: f32,
    },
}

/// The cooperative per-frame loop: admission, inference, interpretation,
/// mapping, render, telemetry. Single-threaded; the oracle call is the only
/// suspension point and never overlaps itself, so cycles are strictly
/// sequential.
pub struct Scheduler {
    profile: PointerProfile,
    state: SchedulerState,
    /// The only cross-cycle mutable state: last-known-good pointer position.
    target: LogicalTarget,
    telemetry: TelemetryAggregator,
    last_processed: Option<Instant>,
}

impl Scheduler {
    pub fn new(profile: PointerProfile) -> Self {
        let telemetry = TelemetryAggregator::new(&profile, Instant::now());
        Self {
            profile,
            state: SchedulerState::Idle,
            target: LogicalTarget::default(),
            telemetry,
            last_processed: None,
        }
    }

    #[allow(dead_code)]
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    #[allow(dead_code)]
    pub fn target(&self) -> LogicalTarget {
        self.target
    }

    /// Drive cycles until a control event or source loss ends the session.
    /// The loop itself never terminates on a single cycle's failure: skips
    /// and errors re-arm the next tick unconditionally.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        oracle: &mut dyn DetectionOracle,
        surface: &mut dyn RenderSurface,
        sink: &mut dyn StatusSink,
        control: &Receiver<ControlEvent>,
    ) -> Result<SessionEnd> {
        self.state = SchedulerState::Running;
        log::info!("scheduler running ({} profile)", self.profile.name);

        loop {
            match control.try_recv() {
                Ok(ControlEvent::SwitchDevice(device)) => {
                    self.state = SchedulerState::Reconfiguring;
                    log::info!("reconfiguring for device '{device}'");
                    return Ok(SessionEnd::SwitchDevice(device));
                }
                Ok(ControlEvent::Shutdown) | Err(TryRecvError::Disconnected) => {
                    self.state = SchedulerState::Stopped;
                    log::info!("scheduler stopped");
                    return Ok(SessionEnd::Shutdown);
                }
                Err(TryRecvError::Empty) => {}
            }

            if !source.is_live() {
                self.state = SchedulerState::Stopped;
                log::error!("frame source lost, stopping session");
                return Ok(SessionEnd::SourceLost);
            }

            let now = Instant::now();
            match self.run_cycle(source, oracle, surface, sink, now) {
                Ok(CycleOutcome::Skipped(SkipReason::Paced)) => {
                    if let (Some(min), Some(last)) =
                        (self.profile.min_frame_interval, self.last_processed)
                    {
                        let elapsed = now.saturating_duration_since(last);
                        thread::sleep(min.saturating_sub(elapsed));
                    }
                }
                Ok(CycleOutcome::Skipped(_)) => thread::sleep(IDLE_TICK),
                Ok(_) => {}
                Err(err) => log::warn!("cycle failed: {err:?}"),
            }
        }
    }

    /// One tick. `now` is the tick timestamp used for admission and pacing;
    /// processing time is measured against the wall clock.
    pub fn run_cycle(
        &mut self,
        source: &mut dyn FrameSource,
        oracle: &mut dyn DetectionOracle,
        surface: &mut dyn RenderSurface,
        sink: &mut dyn StatusSink,
        now: Instant,
    ) -> Result<CycleOutcome> {
        // Admission guard: skip the tick entirely, no work, no telemetry.
        if !oracle.ready() {
            return Ok(CycleOutcome::Skipped(SkipReason::OracleUnready));
        }
        if let (Some(min), Some(last)) = (self.profile.min_frame_interval, self.last_processed) {
            if now.saturating_duration_since(last) < min {
                return Ok(CycleOutcome::Skipped(SkipReason::Paced));
            }
        }
        let Some(frame) = source.poll_frame() else {
            return Ok(CycleOutcome::Skipped(SkipReason::NoFrame));
        };
        if frame.width == 0 || frame.height == 0 {
            return Ok(CycleOutcome::Skipped(SkipReason::DegenerateFrame));
        }

        self.last_processed = Some(now);
        let cycle_start = Instant::now();

        // The only suspension point; exactly one inference in flight.
        let subjects = match oracle.detect(&frame, 1) {
            Ok(subjects) => subjects,
            Err(err) => {
                log::warn!("detection failed: {err:?}");
                return Ok(CycleOutcome::Skipped(SkipReason::DetectionFailed));
            }
        };

        // The result may have arrived after the capture stream it was
        // computed against was replaced. Discard it untouched.
        if frame.generation != source.generation() {
            log::debug!(
                "discarding stale result (frame generation {}, source {})",
                frame.generation,
                source.generation()
            );
            return Ok(CycleOutcome::DiscardedStale);
        }

        let subject = subjects.first();
        let detection = subject.and_then(|s| {
            interpreter::interpret(
                s,
                frame.width,
                frame.height,
                self.profile.confidence_threshold,
            )
        });
        let class = detection.map(|(target, class)| {
            self.target = target;
            class
        });
        // No usable landmark: self.target keeps its last-known-good value.

        let placement = viewport::compute_placement(
            frame.width,
            frame.height,
            self.profile.surface_width,
            self.profile.surface_height,
        );
        let pixel = viewport::map_target(self.target, &placement);

        let marker_color = class.map_or(MARKER_DEFAULT_COLOR, |c| c.marker_color());
        surface.clear(CLEAR_COLOR);
        surface.draw_frame(&frame, &placement);
        surface.draw_marker(pixel, self.profile.marker_radius, marker_color);
        surface.present()?;

        let extent = subject
            .and_then(|s| interpreter::face_extent(s, self.profile.confidence_threshold));
        let depth = interpreter::depth_estimate(extent, &self.profile);

        let cycle_end = Instant::now();
        let metrics = self.telemetry.record_cycle(cycle_start, cycle_end);
        let summary = match class {
            Some(class) => format!(
                "x:{} y:{} z:{} [{}]",
                pixel.0,
                pixel.1,
                depth.round() as i32,
                class.label()
            ),
            None => "No detection".to_string(),
        };
        self.telemetry.publish_summary(&summary, cycle_end, sink);
        self.telemetry.publish_stats(&metrics, cycle_end, sink);

        Ok(CycleOutcome::Completed {
            target: self.target,
            pixel,
            class,
            depth,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        types::{Frame, Landmark, LandmarkName, Subject},
        viewport::Placement,
    };
    use std::collections::VecDeque;

    struct MockSource {
        frame: Option<Frame>,
        generation: u64,
        live: bool,
    }

    impl MockSource {
        fn with_frame(width: u32, height: u32) -> Self {
            Self {
                frame: Some(test_frame(width, height, 0)),
                generation: 0,
                live: true,
            }
        }
    }

    impl FrameSource for MockSource {
        fn poll_frame(&mut self) -> Option<Frame> {
            self.frame.clone()
        }

        fn generation(&self) -> u64 {
            self.generation
        }

        fn is_live(&self) -> bool {
            self.live
        }
    }

    struct MockOracle {
        ready: bool,
        script: VecDeque<Vec<Subject>>,
    }

    impl MockOracle {
        fn with_script(script: Vec<Vec<Subject>>) -> Self {
            Self {
                ready: true,
                script: script.into(),
            }
        }
    }

    impl DetectionOracle for MockOracle {
        fn ready(&self) -> bool {
            self.ready
        }

        fn detect(&mut self, _frame: &Frame, max_subjects: usize) -> Result<Vec<Subject>> {
            let mut subjects = self.script.pop_front().unwrap_or_default();
            subjects.truncate(max_subjects);
            Ok(subjects)
        }
    }

    #[derive(Debug, PartialEq)]
    enum SurfaceOp {
        Clear,
        Frame(Placement),
        Marker((i32, i32), [u8; 4]),
    }

    #[derive(Default)]
    struct MockSurface {
        ops: Vec<SurfaceOp>,
    }

    impl RenderSurface for MockSurface {
        fn size(&self) -> (u32, u32) {
            (1920, 1080)
        }

        fn clear(&mut self, _color: [u8; 4]) {
            self.ops.push(SurfaceOp::Clear);
        }

        fn draw_frame(&mut self, _frame: &Frame, placement: &Placement) {
            self.ops.push(SurfaceOp::Frame(*placement));
        }

        fn draw_marker(&mut self, center: (i32, i32), _radius: i32, color: [u8; 4]) {
            self.ops.push(SurfaceOp::Marker(center, color));
        }

        fn present(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct NullSink {
        summaries: Vec<String>,
    }

    impl StatusSink for NullSink {
        fn publish_summary(&mut self, line: &str) {
            self.summaries.push(line.to_string());
        }

        fn publish_stats(&mut self, _load: &str, _fps: &str, _processing: &str) {}
    }

    fn test_frame(width: u32, height: u32, generation: u64) -> Frame {
        Frame {
            rgba: vec![0u8; (width * height * 4) as usize],
            width,
            height,
            timestamp: Instant::now(),
            generation,
        }
    }

    fn eyes_subject(x: f32, y: f32) -> Subject {
        Subject::new(vec![
            Landmark {
                name: LandmarkName::LeftEye,
                x: x - 20.0,
                y,
                score: 0.9,
            },
            Landmark {
                name: LandmarkName::RightEye,
                x: x + 20.0,
                y,
                score: 0.9,
            },
        ])
    }

    fn scheduler() -> Scheduler {
        Scheduler::new(PointerProfile::hd())
    }

    #[test]
    fn skips_when_oracle_not_ready() {
        let mut sched = scheduler();
        let mut source = MockSource::with_frame(1280, 720);
        let mut oracle = MockOracle::with_script(vec![]);
        oracle.ready = false;
        let mut surface = MockSurface::default();
        let mut sink = NullSink::default();

        let outcome = sched
            .run_cycle(&mut source, &mut oracle, &mut surface, &mut sink, Instant::now())
            .unwrap();
        assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::OracleUnready));
        assert!(surface.ops.is_empty());
    }

    #[test]
    fn skips_without_a_frame() {
        let mut sched = scheduler();
        let mut source = MockSource {
            frame: None,
            generation: 0,
            live: true,
        };
        let mut oracle = MockOracle::with_script(vec![]);
        let mut surface = MockSurface::default();
        let mut sink = NullSink::default();

        let outcome = sched
            .run_cycle(&mut source, &mut oracle, &mut surface, &mut sink, Instant::now())
            .unwrap();
        assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::NoFrame));
    }

    #[test]
    fn skips_degenerate_frame() {
        let mut sched = scheduler();
        let mut source = MockSource::with_frame(0, 720);
        let mut oracle = MockOracle::with_script(vec![]);
        let mut surface = MockSurface::default();
        let mut sink = NullSink::default();

        let outcome = sched
            .run_cycle(&mut source, &mut oracle, &mut surface, &mut sink, Instant::now())
            .unwrap();
        assert_eq!(outcome, CycleOutcome::Skipped(SkipReason::DegenerateFrame));
        assert!(surface.ops.is_empty());
    }

    #[test]
    fn pacing_caps_cycle_rate() {
        let mut sched = scheduler();
        let mut source = MockSource::with_frame(1280, 720);
        let mut oracle = MockOracle::with_script(vec![vec![], vec![]]);
        let mut surface = MockSurface::default();
        let mut sink = NullSink::default();

        let base = Instant::now();
        let first = sched
            .run_cycle(&mut source, &mut oracle, &mut surface, &mut sink, base)
            .unwrap();
        assert!(matches!(first, CycleOutcome::Completed { .. }));

        // 1ms later is inside the ~14ms minimum interval of the hd profile.
        let second = sched
            .run_cycle(
                &mut source,
                &mut oracle,
                &mut surface,
                &mut sink,
                base + Duration::from_millis(1),
            )
            .unwrap();
        assert_eq!(second, CycleOutcome::Skipped(SkipReason::Paced));

        let third = sched
            .run_cycle(
                &mut source,
                &mut oracle,
                &mut surface,
                &mut sink,
                base + Duration::from_millis(20),
            )
            .unwrap();
        assert!(matches!(third, CycleOutcome::Completed { .. }));
    }

    #[test]
    fn unpaced_profile_processes_every_tick() {
        let mut sched = Scheduler::new(PointerProfile::uhd());
        let mut source = MockSource::with_frame(1280, 720);
        let mut oracle = MockOracle::with_script(vec![vec![], vec![]]);
        let mut surface = MockSurface::default();
        let mut sink = NullSink::default();

        let base = Instant::now();
        for offset in [0u64, 1] {
            let outcome = sched
                .run_cycle(
                    &mut source,
                    &mut oracle,
                    &mut surface,
                    &mut sink,
                    base + Duration::from_millis(offset),
                )
                .unwrap();
            assert!(matches!(outcome, CycleOutcome::Completed { .. }));
        }
    }

    #[test]
    fn detection_updates_target_and_colors_marker() {
        let mut sched = scheduler();
        let mut source = MockSource::with_frame(1280, 720);
        let mut oracle = MockOracle::with_script(vec![vec![eyes_subject(640.0, 180.0)]]);
        let mut surface = MockSurface::default();
        let mut sink = NullSink::default();

        let outcome = sched
            .run_cycle(&mut source, &mut oracle, &mut surface, &mut sink, Instant::now())
            .unwrap();
        let CycleOutcome::Completed { target, pixel, class, .. } = outcome else {
            panic!("expected completed cycle");
        };
        assert_eq!(class, Some(TargetClass::Eyes));
        assert!((target.x - 0.5).abs() < 1e-6);
        assert!((target.y - 0.25).abs() < 1e-6);
        // 1280x720 fills 1920x1080 exactly.
        assert_eq!(pixel, (960, 270));
        assert_eq!(
            surface.ops,
            vec![
                SurfaceOp::Clear,
                SurfaceOp::Frame(viewport::compute_placement(1280, 720, 1920, 1080)),
                SurfaceOp::Marker((960, 270), [0, 255, 0, 255]),
            ]
        );
        assert_eq!(sink.summaries.len(), 1);
        assert!(sink.summaries[0].starts_with("x:960 y:270 z:"));
        assert!(sink.summaries[0].ends_with("[eyes]"));
    }

    #[test]
    fn empty_cycle_retains_previous_target_exactly() {
        let mut sched = Scheduler::new(PointerProfile::uhd());
        let mut source = MockSource::with_frame(1280, 720);
        let mut oracle = MockOracle::with_script(vec![
            vec![eyes_subject(320.0, 360.0)],
            vec![],
            vec![Subject::default()],
        ]);
        let mut surface = MockSurface::default();
        let mut sink = NullSink::default();

        let base = Instant::now();
        for offset in 0..3u64 {
            sched
                .run_cycle(
                    &mut source,
                    &mut oracle,
                    &mut surface,
                    &mut sink,
                    base + Duration::from_millis(offset),
                )
                .unwrap();
            // After the first detection the target never moves.
            assert!((sched.target().x - 0.25).abs() < 1e-6);
            assert!((sched.target().y - 0.5).abs() < 1e-6);
        }

        // Undetected cycles draw the retained target in the default color.
        let last_marker = surface
            .ops
            .iter()
            .rev()
            .find(|op| matches!(op, SurfaceOp::Marker(..)))
            .unwrap();
        let SurfaceOp::Marker(_, color) = last_marker else {
            unreachable!()
        };
        assert_eq!(*color, MARKER_DEFAULT_COLOR);
    }

    #[test]
    fn stale_result_is_discarded_untouched() {
        let mut sched = Scheduler::new(PointerProfile::uhd());
        let mut source = MockSource::with_frame(1280, 720);
        // The source has moved on to generation 1; the pending frame still
        // carries generation 0.
        source.generation = 1;
        let mut oracle = MockOracle::with_script(vec![vec![eyes_subject(100.0, 100.0)]]);
        let mut surface = MockSurface::default();
        let mut sink = NullSink::default();

        let before = sched.target();
        let outcome = sched
            .run_cycle(&mut source, &mut oracle, &mut surface, &mut sink, Instant::now())
            .unwrap();
        assert_eq!(outcome, CycleOutcome::DiscardedStale);
        assert_eq!(sched.target(), before);
        assert!(surface.ops.is_empty());
        assert!(sink.summaries.is_empty());
    }

    #[test]
    fn run_returns_on_control_events() {
        let mut sched = scheduler();
        let mut source = MockSource::with_frame(1280, 720);
        let mut oracle = MockOracle::with_script(vec![]);
        let mut surface = MockSurface::default();
        let mut sink = NullSink::default();

        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(ControlEvent::SwitchDevice("cam-2".into())).unwrap();
        let end = sched
            .run(&mut source, &mut oracle, &mut surface, &mut sink, &rx)
            .unwrap();
        assert_eq!(end, SessionEnd::SwitchDevice("cam-2".into()));
        assert_eq!(sched.state(), SchedulerState::Reconfiguring);

        tx.send(ControlEvent::Shutdown).unwrap();
        let end = sched
            .run(&mut source, &mut oracle, &mut surface, &mut sink, &rx)
            .unwrap();
        assert_eq!(end, SessionEnd::Shutdown);
        assert_eq!(sched.state(), SchedulerState::Stopped);
    }

    #[test]
    fn run_stops_when_source_is_lost() {
        let mut sched = scheduler();
        let mut source = MockSource::with_frame(1280, 720);
        source.live = false;
        let mut oracle = MockOracle::with_script(vec![]);
        let mut surface = MockSurface::default();
        let mut sink = NullSink::default();

        let (_tx, rx) = crossbeam_channel::unbounded::<ControlEvent>();
        let end = sched
            .run(&mut source, &mut oracle, &mut surface, &mut sink, &rx)
            .unwrap();
        assert_eq!(end, SessionEnd::SourceLost);
        assert_eq!(sched.state(), SchedulerState::Stopped);
    }
}
