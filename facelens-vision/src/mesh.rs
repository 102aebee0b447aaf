//! 468-point face mesh on a rotated face crop.
//!
//! The crop is a square around the detected face, enlarged by [`ROI_SCALE`]
//! and rotated so the eyes are level. The model sees a 192x192 RGB image in
//! [0, 1] and returns `x, y, z` per landmark in crop pixels plus one
//! face-presence logit.

use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use ort::session::Session;

use crate::face::Detection;
use crate::landmarks::{sigmoid, Landmark};
use crate::model::{self, OutputTensor};
use crate::tensor::{self, Normalization};

pub const MESH_LANDMARKS: usize = 468;
pub const MESH_INPUT_SIZE: u32 = 192;
pub const ROI_SCALE: f32 = 1.5;

/// A rotated square region of the source image, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub cx: f32,
    pub cy: f32,
    pub size: f32,
    /// Radians, positive when the right-hand eye sits lower in the image.
    pub rotation: f32,
}

impl Roi {
    pub fn from_detection(det: &Detection) -> Self {
        let (cx, cy) = det.center();
        let ((lx, ly), (rx, ry)) = det.eyes();
        Self {
            cx,
            cy,
            size: det.bbox[2].max(det.bbox[3]) * ROI_SCALE,
            rotation: (ry - ly).atan2(rx - lx),
        }
    }

    /// Map crop-relative coordinates (`u`, `v` in [0, 1]) to source pixels.
    pub fn to_image(&self, u: f32, v: f32) -> (f32, f32) {
        let dx = (u - 0.5) * self.size;
        let dy = (v - 0.5) * self.size;
        let (sin, cos) = self.rotation.sin_cos();
        (self.cx + dx * cos - dy * sin, self.cy + dx * sin + dy * cos)
    }
}

/// Sample the ROI into a `size x size` image with bilinear interpolation.
/// Pixels outside the source stay black.
pub fn crop_roi(img: &RgbImage, roi: &Roi, size: u32) -> RgbImage {
    let (img_w, img_h) = img.dimensions();
    let mut output = RgbImage::new(size, size);
    if img_w == 0 || img_h == 0 {
        return output;
    }

    for out_y in 0..size {
        for out_x in 0..size {
            let u = (out_x as f32 + 0.5) / size as f32;
            let v = (out_y as f32 + 0.5) / size as f32;
            let (in_x, in_y) = roi.to_image(u, v);

            if in_x < 0.0 || in_x >= img_w as f32 || in_y < 0.0 || in_y >= img_h as f32 {
                continue;
            }

            let x0 = in_x.floor() as u32;
            let y0 = in_y.floor() as u32;
            let x1 = (x0 + 1).min(img_w - 1);
            let y1 = (y0 + 1).min(img_h - 1);
            let fx = in_x - x0 as f32;
            let fy = in_y - y0 as f32;

            let p00 = img.get_pixel(x0, y0);
            let p10 = img.get_pixel(x1, y0);
            let p01 = img.get_pixel(x0, y1);
            let p11 = img.get_pixel(x1, y1);

            let w00 = (1.0 - fx) * (1.0 - fy);
            let w10 = fx * (1.0 - fy);
            let w01 = (1.0 - fx) * fy;
            let w11 = fx * fy;

            let mut px = [0u8; 3];
            for (c, value) in px.iter_mut().enumerate() {
                *value = (p00[c] as f32 * w00
                    + p10[c] as f32 * w10
                    + p01[c] as f32 * w01
                    + p11[c] as f32 * w11)
                    .round()
                    .clamp(0.0, 255.0) as u8;
            }
            output.put_pixel(out_x, out_y, Rgb(px));
        }
    }

    output
}

/// Project raw mesh output (crop pixels) to landmarks normalized to the source image.
pub fn project(raw: &[f32], roi: &Roi, input_size: u32, width: u32, height: u32) -> Vec<Landmark> {
    project_points(raw, roi, input_size, width, height, MESH_LANDMARKS)
}

/// Project up to `count` `x, y, z` triples from a crop of `roi` into the source image.
pub fn project_points(
    raw: &[f32],
    roi: &Roi,
    input_size: u32,
    width: u32,
    height: u32,
    count: usize,
) -> Vec<Landmark> {
    let input = input_size as f32;
    raw.chunks_exact(3)
        .take(count)
        .map(|p| {
            let (x, y) = roi.to_image(p[0] / input, p[1] / input);
            Landmark::new(
                x / width as f32,
                y / height as f32,
                p[2] / input * roi.size / width as f32,
            )
        })
        .collect()
}

/// Split mesh outputs into the landmark tensor and the presence score.
fn mesh_outputs(outputs: &[OutputTensor]) -> Result<(&[f32], f32)> {
    let landmarks = outputs
        .iter()
        .find(|t| t.data.len() >= MESH_LANDMARKS * 3)
        .context("face mesh output with 1404 values not found")?;
    let presence = outputs
        .iter()
        .find(|t| t.data.len() == 1)
        .map(|t| sigmoid(t.data[0]))
        .context("face mesh presence output not found")?;
    Ok((landmarks.data.as_slice(), presence))
}

pub struct FaceMesh {
    session: Session,
    pub presence_threshold: f32,
}

impl FaceMesh {
    pub fn new(session: Session, presence_threshold: f32) -> Self {
        Self {
            session,
            presence_threshold,
        }
    }

    /// Landmarks for the face inside `roi`, or `None` when the model sees no face there.
    pub fn infer(&mut self, img: &RgbImage, roi: &Roi) -> Result<Option<Vec<Landmark>>> {
        let crop = crop_roi(img, roi, MESH_INPUT_SIZE);
        let input = tensor::to_nhwc(&crop, Normalization::UNIT)?;
        let outputs = model::run(&mut self.session, input).context("running face mesh")?;
        let (raw, presence) = mesh_outputs(&outputs)?;

        if presence <= self.presence_threshold {
            log::debug!("face mesh presence {:.3} below threshold", presence);
            return Ok(None);
        }

        let (width, height) = img.dimensions();
        Ok(Some(project(raw, roi, MESH_INPUT_SIZE, width, height)))
    }
}
