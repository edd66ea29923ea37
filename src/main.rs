mod camera;
mod config;
mod interpreter;
mod model_download;
mod oracle;
mod scheduler;
mod session;
mod surface;
mod telemetry;
mod types;
mod viewport;

use std::{io::BufRead, path::PathBuf, thread};

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::{Sender, unbounded};

use crate::{
    config::PointerProfile,
    scheduler::ControlEvent,
    session::{SessionController, sort_devices},
    surface::Canvas,
    telemetry::LogStatusSink,
};

/// Webcam pose-tracking pointer overlay.
///
/// Tracks eyes (falling back to wrists) with a single-pose model and renders
/// a pointer marker onto a letterboxed copy of the camera feed, reporting
/// detection latency, frame rate and a load proxy.
#[derive(Parser, Debug)]
#[command(name = "pose-pointer", version)]
struct Args {
    /// Pipeline profile: hd (1080p surface, paced) or uhd (4K surface, unpaced)
    #[arg(long, default_value = "hd")]
    profile: PointerProfile,

    /// Preferred camera id or label; falls back to the first enumerated device
    #[arg(long)]
    camera: Option<String>,

    /// List capture devices in the profile's sort order and exit
    #[arg(long)]
    list_cameras: bool,

    /// Write PNG snapshots of the composited surface into this directory
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Snapshot every Nth presented frame
    #[arg(long, default_value_t = 30)]
    snapshot_every: u64,

    /// Path to the pose model, downloaded on first run if absent
    #[arg(long)]
    model: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let profile = args.profile.clone();

    if args.list_cameras {
        let mut devices = camera::available_cameras()?;
        sort_devices(&mut devices, profile.device_sort);
        for device in &devices {
            println!("{}\t{}", device.index, device.label);
        }
        return Ok(());
    }

    let mut surface = Canvas::new(profile.surface_width, profile.surface_height);
    if let Some(dir) = args.snapshot_dir.clone() {
        surface = surface.with_snapshots(dir, args.snapshot_every);
    }
    let mut sink = LogStatusSink;

    let (control_tx, control_rx) = unbounded();
    spawn_control_thread(control_tx);

    let model_path = args
        .model
        .clone()
        .unwrap_or_else(model_download::default_model_path);
    let controller = SessionController::new(profile, model_path, control_rx);
    controller.run(args.camera.as_deref(), &mut surface, &mut sink)
}

/// Runtime device switching from stdin, the CLI analog of a camera select
/// control: `switch <id-or-label>` swaps the device, `quit` ends the session.
fn spawn_control_thread(tx: Sender<ControlEvent>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(device) = line.strip_prefix("switch ") {
                let _ = tx.send(ControlEvent::SwitchDevice(device.trim().to_string()));
            } else if line == "quit" || line == "exit" {
                let _ = tx.send(ControlEvent::Shutdown);
                break;
            } else {
                log::warn!("unknown command: {line} (try 'switch <camera>' or 'quit')");
            }
        }
    });
}
