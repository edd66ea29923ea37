use std::path::PathBuf;

use anyhow::Result;
use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::{
    camera::{CameraDevice, CameraSource, available_cameras},
    config::{DeviceSortOrder, ModelReloadPolicy, PointerProfile},
    oracle::OrtPoseOracle,
    scheduler::{ControlEvent, Scheduler, SessionEnd},
    surface::RenderSurface,
    telemetry::StatusSink,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no capture devices available")]
    NoDevices,
    #[error("capture device '{device}' cannot be opened")]
    SourceUnavailable {
        device: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to load detection model")]
    OracleLoad(#[source] anyhow::Error),
    #[error("capture stream lost")]
    SourceLost,
}

/// Sort the enumerated devices by label, case-insensitive, in the profile's
/// configured direction.
pub fn sort_devices(devices: &mut [CameraDevice], order: DeviceSortOrder) {
    devices.sort_by(|a, b| {
        let ord = a.label.to_lowercase().cmp(&b.label.to_lowercase());
        match order {
            DeviceSortOrder::Ascending => ord,
            DeviceSortOrder::Descending => ord.reverse(),
        }
    });
}

/// Pick the preferred device if present, else the first enumerated one.
pub fn choose_device<'a>(
    devices: &'a [CameraDevice],
    preferred: Option<&str>,
) -> Option<&'a CameraDevice> {
    if let Some(query) = preferred {
        if let Some(device) = devices.iter().find(|d| d.matches(query)) {
            return Some(device);
        }
        log::warn!("requested camera '{query}' not found, using the first device");
    }
    devices.first()
}

/// Owns device selection and the model handle, and rebuilds the capture
/// stream in place when the active device changes. The previous stream is
/// always stopped and joined before the next one is opened, so two sessions
/// never contend for the same device.
pub struct SessionController {
    profile: PointerProfile,
    model_path: PathBuf,
    oracle: Option<OrtPoseOracle>,
    control_rx: Receiver<ControlEvent>,
}

impl SessionController {
    pub fn new(
        profile: PointerProfile,
        model_path: PathBuf,
        control_rx: Receiver<ControlEvent>,
    ) -> Self {
        Self {
            profile,
            model_path,
            oracle: None,
            control_rx,
        }
    }

    pub fn run(
        mut self,
        preferred: Option<&str>,
        surface: &mut dyn RenderSurface,
        sink: &mut dyn StatusSink,
    ) -> Result<()> {
        let mut devices = available_cameras()?;
        if devices.is_empty() {
            sink.publish_summary("No cameras available");
            return Err(SessionError::NoDevices.into());
        }
        sort_devices(&mut devices, self.profile.device_sort);
        for device in &devices {
            log::info!("camera {}: {}", device.index, device.label);
        }

        let Some(mut active) = choose_device(&devices, preferred).cloned() else {
            return Err(SessionError::NoDevices.into());
        };

        // The pointer target survives device switches: the scheduler (and
        // its last-known-good state) outlives each capture stream.
        let mut scheduler = Scheduler::new(self.profile.clone());

        loop {
            sink.publish_summary("Switching camera and reloading model...");
            log::info!("starting session on camera '{}'", active.label);

            let mut source = match CameraSource::open(&active) {
                Ok(source) => source,
                Err(err) => {
                    // Fatal to session start; surfaced, never retried.
                    sink.publish_summary(&format!("Camera '{}' unavailable", active.label));
                    return Err(SessionError::SourceUnavailable {
                        device: active.label.clone(),
                        source: err,
                    }
                    .into());
                }
            };

            if self.oracle.is_none() {
                let oracle =
                    OrtPoseOracle::load(&self.model_path).map_err(SessionError::OracleLoad)?;
                self.oracle = Some(oracle);
            }
            sink.publish_summary("Detecting...");

            let end = match self.oracle.as_mut() {
                Some(oracle) => {
                    scheduler.run(&mut source, oracle, surface, sink, &self.control_rx)?
                }
                None => return Err(SessionError::OracleLoad(anyhow::anyhow!("not loaded")).into()),
            };

            // Release the device fully before any successor is opened.
            source.stop();

            match end {
                SessionEnd::SwitchDevice(query) => {
                    match devices.iter().find(|d| d.matches(&query)) {
                        Some(device) => active = device.clone(),
                        None => {
                            log::warn!("camera '{query}' not found, keeping '{}'", active.label);
                        }
                    }
                    if self.profile.reload_policy == ModelReloadPolicy::Always {
                        self.oracle = None;
                    }
                }
                SessionEnd::Shutdown => {
                    log::info!("session shut down");
                    return Ok(());
                }
                SessionEnd::SourceLost => {
                    sink.publish_summary("Camera stream lost");
                    return Err(SessionError::SourceLost.into());
                }
            }
        }
    }
}
