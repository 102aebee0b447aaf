//! 21-point hand landmarks, cropped around each wrist the pose model found.
//!
//! The crop is centered between the wrist and the knuckles, rotated so the
//! fingers point up, and fed to the model as a 224x224 RGB image in [0, 1].
//! The model returns `x, y, z` per landmark in crop pixels plus a
//! hand-presence logit.

use anyhow::{Context, Result};
use image::RgbImage;
use ort::session::Session;

use crate::landmarks::{sigmoid, Landmark};
use crate::mesh::{crop_roi, project_points, Roi};
use crate::model::{self, OutputTensor};
use crate::tensor::{self, Normalization};

pub const HAND_LANDMARKS: usize = 21;
pub const HAND_INPUT_SIZE: u32 = 224;
/// Crop edge relative to the wrist-to-knuckle span.
pub const HAND_ROI_SCALE: f32 = 2.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Pose indices of the wrist, pinky and index finger on this side.
    fn pose_points(self) -> [usize; 3] {
        match self {
            Side::Left => [15, 17, 19],
            Side::Right => [16, 18, 20],
        }
    }
}

/// Crop region for one hand, or `None` when the pose does not show that wrist.
pub fn hand_roi(pose: &[Landmark], side: Side, width: u32, height: u32, threshold: f32) -> Option<Roi> {
    let [wrist, pinky, index] = side.pose_points().map(|idx| pose.get(idx));
    let (wrist, pinky, index) = (wrist?, pinky?, index?);
    if !wrist.is_drawable(threshold) {
        return None;
    }

    let (wx, wy) = wrist.to_pixels(width, height);
    let (px, py) = pinky.to_pixels(width, height);
    let (ix, iy) = index.to_pixels(width, height);
    let (kx, ky) = ((px + ix) / 2.0, (py + iy) / 2.0);

    let (dx, dy) = (kx - wx, ky - wy);
    let span = dx.hypot(dy).max((ix - px).hypot(iy - py));
    if span < 1.0 {
        return None;
    }

    Some(Roi {
        cx: (wx + kx) / 2.0,
        cy: (wy + ky) / 2.0,
        size: span * HAND_ROI_SCALE,
        // crop "up" maps to the wrist-to-knuckle direction
        rotation: dx.atan2(-dy),
    })
}

/// Landmark tensor and presence score. The landmark tensor comes first; later
/// outputs of the same size hold world coordinates.
fn hand_outputs(outputs: &[OutputTensor]) -> Result<(&[f32], f32)> {
    let landmarks = outputs
        .iter()
        .find(|t| t.data.len() >= HAND_LANDMARKS * 3)
        .context("hand landmark output with 63 values not found")?;
    let presence = outputs
        .iter()
        .find(|t| t.data.len() == 1)
        .map(|t| sigmoid(t.data[0]))
        .context("hand presence output not found")?;
    Ok((landmarks.data.as_slice(), presence))
}

pub struct HandLandmarker {
    session: Session,
    pub presence_threshold: f32,
}

impl HandLandmarker {
    pub fn new(session: Session, presence_threshold: f32) -> Self {
        Self {
            session,
            presence_threshold,
        }
    }

    pub fn infer(&mut self, img: &RgbImage, roi: &Roi) -> Result<Option<Vec<Landmark>>> {
        let crop = crop_roi(img, roi, HAND_INPUT_SIZE);
        let input = tensor::to_nhwc(&crop, Normalization::UNIT)?;
        let outputs = model::run(&mut self.session, input).context("running hand landmarks")?;
        let (raw, presence) = hand_outputs(&outputs)?;

        if presence <= self.presence_threshold {
            log::debug!("hand presence {:.3} below threshold", presence);
            return Ok(None);
        }

        let (width, height) = img.dimensions();
        Ok(Some(project_points(
            raw,
            roi,
            HAND_INPUT_SIZE,
            width,
            height,
            HAND_LANDMARKS,
        )))
    }

    /// Both hands, left then right, for the wrists visible in `pose`.
    pub fn infer_both(
        &mut self,
        img: &RgbImage,
        pose: &[Landmark],
    ) -> Result<(Option<Vec<Landmark>>, Option<Vec<Landmark>>)> {
        let (width, height) = img.dimensions();
        let mut run = |side| match hand_roi(pose, side, width, height, self.presence_threshold) {
            Some(roi) => self.infer(img, &roi),
            None => Ok(None),
        };
        let left = run(Side::Left)?;
        let right = run(Side::Right)?;
        Ok((left, right))
    }
}
