use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
    time::Instant,
};

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender, bounded};
use nokhwa::{
    Camera,
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, CameraInfo, FrameFormat, RequestedFormat,
        RequestedFormatType, Resolution,
    },
};

use crate::types::Frame;

/// Consecutive read failures tolerated before the capture thread reopens the
/// device under a new generation.
const REOPEN_AFTER_FAILURES: u32 = 30;

/// What the scheduler pulls frames from. The camera implementation runs a
/// capture thread behind this; tests swap in a scripted source.
pub trait FrameSource {
    /// Latest available frame, or `None` while the source is not producing
    /// readable frames yet.
    fn poll_frame(&mut self) -> Option<Frame>;
    /// Capture-stream incarnation currently live. A frame whose generation
    /// no longer matches was captured by a stream that has been replaced.
    fn generation(&self) -> u64;
    /// False once the underlying device is unrecoverably gone.
    fn is_live(&self) -> bool;
}

#[derive(Clone, Debug)]
pub struct CameraDevice {
    pub index: CameraIndex,
    pub label: String,
}

impl CameraDevice {
    /// Matches either the backend index or the human label, case-insensitive.
    pub fn matches(&self, query: &str) -> bool {
        self.index.to_string() == query || self.label.eq_ignore_ascii_case(query)
    }
}

pub fn available_cameras() -> Result<Vec<CameraDevice>> {
    let cameras = query(ApiBackend::Auto)?;
    Ok(cameras
        .into_iter()
        .map(|info| CameraDevice {
            index: info.index().clone(),
            label: format_camera_label(&info),
        })
        .collect())
}

fn format_camera_label(info: &CameraInfo) -> String {
    info.human_name()
}

// Ask for 1080p first, then fall back to whatever the device offers.
fn requested_formats() -> [RequestedFormat<'static>; 3] {
    [
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            Resolution::new(1920, 1080),
            FrameFormat::MJPEG,
            30,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::None),
    ]
}

fn build_camera(index: CameraIndex) -> Result<Camera> {
    let mut last_err = None;

    for requested in requested_formats() {
        match Camera::new(index.clone(), requested) {
            Ok(mut camera) => match camera.open_stream() {
                Ok(()) => return Ok(camera),
                Err(err) => last_err = Some(err.into()),
            },
            Err(err) => last_err = Some(err.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
}

/// A live capture stream feeding a single-slot frame channel from its own
/// thread. Dropping (or `stop`ping) joins the thread, releasing the device
/// before a successor may be opened.
pub struct CameraSource {
    stop: Arc<AtomicBool>,
    lost: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
    handle: Option<thread::JoinHandle<()>>,
    frame_rx: Receiver<Frame>,
    latest: Option<Frame>,
}

impl CameraSource {
    pub fn open(device: &CameraDevice) -> Result<Self> {
        // Fail fast before spawning the capture thread.
        build_camera(device.index.clone())?;

        let (frame_tx, frame_rx) = bounded(1);
        let stop = Arc::new(AtomicBool::new(false));
        let lost = Arc::new(AtomicBool::new(false));
        let generation = Arc::new(AtomicU64::new(0));

        let index = device.index.clone();
        let stop_flag = stop.clone();
        let lost_flag = lost.clone();
        let gen_counter = generation.clone();
        let handle = thread::spawn(move || {
            capture_loop(index, frame_tx, stop_flag, lost_flag, gen_counter);
        });

        Ok(Self {
            stop,
            lost,
            generation,
            handle: Some(handle),
            frame_rx,
            latest: None,
        })
    }

    pub fn stop(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

impl FrameSource for CameraSource {
    fn poll_frame(&mut self) -> Option<Frame> {
        while let Ok(frame) = self.frame_rx.try_recv() {
            self.latest = Some(frame);
        }
        self.latest.clone()
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn is_live(&self) -> bool {
        !self.lost.load(Ordering::Acquire)
    }
}

fn capture_loop(
    index: CameraIndex,
    frame_tx: Sender<Frame>,
    stop: Arc<AtomicBool>,
    lost: Arc<AtomicBool>,
    generation: Arc<AtomicU64>,
) {
    let mut camera = match build_camera(index.clone()) {
        Ok(cam) => cam,
        Err(err) => {
            log::error!("failed to open camera: {err:?}");
            lost.store(true, Ordering::Release);
            return;
        }
    };

    let mut failures = 0u32;
    while !stop.load(Ordering::Relaxed) {
        let frame = match camera.frame() {
            Ok(frame) => frame,
            Err(err) => {
                failures += 1;
                log::warn!("camera frame read failed ({failures} in a row): {err:?}");
                if failures >= REOPEN_AFTER_FAILURES {
                    // Reopen under a new generation so results computed
                    // against the dead stream are discarded downstream.
                    match build_camera(index.clone()) {
                        Ok(cam) => {
                            camera = cam;
                            failures = 0;
                            let generation = generation.fetch_add(1, Ordering::AcqRel) + 1;
                            log::info!("camera reopened, generation {generation}");
                        }
                        Err(err) => {
                            log::error!("camera lost and could not be reopened: {err:?}");
                            lost.store(true, Ordering::Release);
                            return;
                        }
                    }
                }
                continue;
            }
        };
        failures = 0;

        let decoded = match frame.decode_image::<RgbFormat>() {
            Ok(img) => img,
            Err(err) => {
                log::warn!("failed to decode camera frame: {err:?}");
                continue;
            }
        };

        let (width, height) = decoded.dimensions();
        let rgb = decoded.into_raw();
        if rgb.is_empty() || width == 0 || height == 0 {
            continue;
        }

        // Expand RGB to RGBA for the render pipeline.
        let mut rgba = Vec::with_capacity(rgb.len() / 3 * 4);
        for chunk in rgb.chunks_exact(3) {
            rgba.extend_from_slice(&[chunk[0], chunk[1], chunk[2], 255]);
        }

        let frame = Frame {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
            generation: generation.load(Ordering::Acquire),
        };

        // Single-slot channel: drop the frame if the scheduler is mid-cycle,
        // it will pick up a fresher one on its next tick.
        let _ = frame_tx.try_send(frame);
    }
}
