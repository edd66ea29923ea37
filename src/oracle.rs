use std::path::Path;

use anyhow::{Context, Result, anyhow};
use image::{RgbaImage, imageops::FilterType};
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use crate::{
    model_download::ensure_model_available,
    types::{Frame, Landmark, LandmarkName, Subject},
};

/// MoveNet SinglePose Lightning input square.
pub const MODEL_INPUT_SIZE: u32 = 192;

/// Asynchronous-in-spirit detection seam: the scheduler treats this call as
/// its only suspension point and never issues a second call while one is
/// outstanding. Latency is variable and unbounded; no timeout is enforced.
pub trait DetectionOracle {
    /// False until the model is loaded; the scheduler skips cycles until then.
    fn ready(&self) -> bool;
    /// Zero or more subjects detected in the frame, at most `max_subjects`.
    fn detect(&mut self, frame: &Frame, max_subjects: usize) -> Result<Vec<Subject>>;
}

/// How the frame was letterboxed into the model input square, so decoded
/// keypoints can be projected back into source-frame pixels.
#[derive(Clone, Copy, Debug)]
struct ModelLetterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
    frame_w: u32,
    frame_h: u32,
}

pub struct OrtPoseOracle {
    session: Session,
}

impl OrtPoseOracle {
    pub fn load(model_path: &Path) -> Result<Self> {
        ensure_model_available(model_path)?;
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load ORT session from {}", model_path.display()))?;
        log::info!("pose oracle ready using {}", model_path.display());
        Ok(Self { session })
    }
}

impl DetectionOracle for OrtPoseOracle {
    fn ready(&self) -> bool {
        true
    }

    fn detect(&mut self, frame: &Frame, max_subjects: usize) -> Result<Vec<Subject>> {
        let (input, letterbox) = prepare_input(frame)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run pose session")?;

        if outputs.len() < 1 {
            return Err(anyhow!("model returned no outputs"));
        }

        let keypoints = outputs[0].try_extract_array::<f32>()?;
        let flattened: Vec<f32> = keypoints.iter().copied().collect();
        let subject = decode_subject(&flattened, &letterbox)?;

        let mut subjects = vec![subject];
        subjects.truncate(max_subjects);
        Ok(subjects)
    }
}

fn prepare_input(frame: &Frame) -> Result<(Array4<i32>, ModelLetterbox)> {
    let Some(img) = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone()) else {
        return Err(anyhow!("failed to build RGBA image from frame"));
    };

    let scale = MODEL_INPUT_SIZE as f32 / (frame.width.max(frame.height) as f32);
    let new_w = (frame.width as f32 * scale).round().max(1.0) as u32;
    let new_h = (frame.height as f32 * scale).round().max(1.0) as u32;
    let resized = image::imageops::resize(&img, new_w, new_h, FilterType::CatmullRom);

    let pad_x = ((MODEL_INPUT_SIZE as i64 - new_w as i64) / 2).max(0) as u32;
    let pad_y = ((MODEL_INPUT_SIZE as i64 - new_h as i64) / 2).max(0) as u32;

    // MoveNet takes raw 0-255 int32 RGB.
    let size = MODEL_INPUT_SIZE as usize;
    let mut input = Array4::<i32>::zeros((1, size, size, 3));
    for y in 0..new_h.min(MODEL_INPUT_SIZE - pad_y) {
        for x in 0..new_w.min(MODEL_INPUT_SIZE - pad_x) {
            let px = resized.get_pixel(x, y).0;
            let (ix, iy) = ((x + pad_x) as usize, (y + pad_y) as usize);
            input[[0, iy, ix, 0]] = px[0] as i32;
            input[[0, iy, ix, 1]] = px[1] as i32;
            input[[0, iy, ix, 2]] = px[2] as i32;
        }
    }

    let letterbox = ModelLetterbox {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
        frame_w: frame.width,
        frame_h: frame.height,
    };

    Ok((input, letterbox))
}

/// Decode the flat `[1,1,17,3]` MoveNet output (`y, x, score` normalized to
/// the input square) into a subject with landmarks in source-frame pixels.
fn decode_subject(flat: &[f32], letterbox: &ModelLetterbox) -> Result<Subject> {
    if flat.len() < LandmarkName::COUNT * 3 {
        return Err(anyhow!(
            "unexpected keypoint tensor length: got {}, need {}",
            flat.len(),
            LandmarkName::COUNT * 3
        ));
    }

    let mut landmarks = Vec::with_capacity(LandmarkName::COUNT);
    for (index, chunk) in flat.chunks_exact(3).take(LandmarkName::COUNT).enumerate() {
        let name = LandmarkName::from_index(index)
            .ok_or_else(|| anyhow!("keypoint index {index} out of range"))?;
        let (ny, nx, score) = (chunk[0], chunk[1], chunk[2]);
        let square_x = nx * MODEL_INPUT_SIZE as f32;
        let square_y = ny * MODEL_INPUT_SIZE as f32;
        let px = (square_x - letterbox.pad_x) / letterbox.scale;
        let py = (square_y - letterbox.pad_y) / letterbox.scale;
        landmarks.push(Landmark {
            name,
            x: px.clamp(0.0, letterbox.frame_w.saturating_sub(1) as f32),
            y: py.clamp(0.0, letterbox.frame_h.saturating_sub(1) as f32),
            score,
        });
    }

    Ok(Subject::new(landmarks))
}
