//! 33-point body pose landmarks.
//!
//! Runs a MediaPipe-style pose landmark model on the whole frame, letterboxed
//! to a 256x256 RGB input in [0, 1]. Each landmark comes back as
//! `x, y, z, visibility, presence` with `x, y` in input pixels.

use anyhow::{Context, Result};
use image::{DynamicImage, GenericImageView};
use ort::session::Session;

use crate::landmarks::{sigmoid, Landmark};
use crate::model::{self, OutputTensor};
use crate::tensor::{self, Letterbox, Normalization};

pub const POSE_LANDMARKS: usize = 33;
pub const POSE_INPUT_SIZE: u32 = 256;
const VALUES_PER_LANDMARK: usize = 5;

/// Map raw landmark values back to landmarks normalized to the source image.
pub fn project(raw: &[f32], letterbox: &Letterbox, width: u32, height: u32) -> Vec<Landmark> {
    raw.chunks_exact(VALUES_PER_LANDMARK)
        .take(POSE_LANDMARKS)
        .map(|p| {
            let (x, y) = letterbox.to_source(p[0], p[1]);
            Landmark {
                x: x / width as f32,
                y: y / height as f32,
                z: p[2] / letterbox.scale / width as f32,
                visibility: Some(sigmoid(p[3])),
                presence: Some(sigmoid(p[4])),
            }
        })
        .collect()
}

fn pose_outputs(outputs: &[OutputTensor]) -> Result<(&[f32], f32)> {
    let landmarks = outputs
        .iter()
        .find(|t| t.data.len() >= POSE_LANDMARKS * VALUES_PER_LANDMARK)
        .context("pose landmark output with 195 values not found")?;
    let flag = outputs
        .iter()
        .find(|t| t.data.len() == 1)
        .map(|t| t.data[0])
        .context("pose presence output not found")?;
    Ok((landmarks.data.as_slice(), flag))
}

pub struct PoseLandmarker {
    session: Session,
    pub presence_threshold: f32,
}

impl PoseLandmarker {
    pub fn new(session: Session, presence_threshold: f32) -> Self {
        Self {
            session,
            presence_threshold,
        }
    }

    pub fn infer(&mut self, img: &DynamicImage) -> Result<Option<Vec<Landmark>>> {
        let letterbox = Letterbox::new(img, POSE_INPUT_SIZE);
        let input = tensor::to_nhwc(&letterbox.image, Normalization::UNIT)?;
        let outputs = model::run(&mut self.session, input).context("running pose landmarks")?;
        let (raw, flag) = pose_outputs(&outputs)?;

        if flag <= self.presence_threshold {
            log::debug!("pose presence {:.3} below threshold", flag);
            return Ok(None);
        }

        let (width, height) = img.dimensions();
        Ok(Some(project(raw, &letterbox, width, height)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_undoes_letterbox() {
        // 512x256 frame: scale 0.5, 64px of padding on top
        let letterbox = Letterbox::new(&DynamicImage::new_rgb8(512, 256), POSE_INPUT_SIZE);
        let mut raw = vec![0.0f32; POSE_LANDMARKS * VALUES_PER_LANDMARK];
        raw[0] = 128.0;
        raw[1] = 128.0;
        raw[3] = 10.0;
        raw[4] = -10.0;

        let landmarks = project(&raw, &letterbox, 512, 256);
        assert_eq!(landmarks.len(), POSE_LANDMARKS);
        let nose = landmarks[0];
        assert!((nose.x - 0.5).abs() < 1e-5);
        assert!((nose.y - 0.5).abs() < 1e-5);
        assert!(nose.visibility.unwrap() > 0.99);
        assert!(!nose.is_drawable(0.5));
    }

    #[test]
    fn outputs_are_found_by_size() {
        let outputs = vec![
            OutputTensor {
                shape: vec![1, 195],
                data: vec![0.0; 195],
            },
            OutputTensor {
                shape: vec![1, 1],
                data: vec![0.8],
            },
        ];
        let (raw, flag) = pose_outputs(&outputs).unwrap();
        assert_eq!(raw.len(), 195);
        assert_eq!(flag, 0.8);
    }
}
