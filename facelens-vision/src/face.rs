use anyhow::{Context, Result};
use image::DynamicImage;
use ort::session::Session;

use crate::model;
use crate::tensor::{self, ChannelOrder, Letterbox, Normalization};
use crate::yunet;

/// Detection result from YuNet, in source image pixels
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // 5 points: x1,y1,x2,y2,...,x5,y5
}

impl Detection {
    pub fn center(&self) -> (f32, f32) {
        (
            self.bbox[0] + self.bbox[2] / 2.0,
            self.bbox[1] + self.bbox[3] / 2.0,
        )
    }

    /// Eye centers ordered left to right as they appear in the image.
    pub fn eyes(&self) -> ((f32, f32), (f32, f32)) {
        let a = (self.landmarks[0], self.landmarks[1]);
        let b = (self.landmarks[2], self.landmarks[3]);
        if a.0 <= b.0 {
            (a, b)
        } else {
            (b, a)
        }
    }
}

/// Detect faces in an image using the YuNet detector
pub fn detect_faces(
    session: &mut Session,
    img: &DynamicImage,
    score_threshold: f32,
    nms_threshold: f32,
) -> Result<Vec<Detection>> {
    // YuNet takes a fixed [1, 3, 640, 640] BGR input in [0, 255]; pad to square to avoid distortion
    let letterbox = Letterbox::new(img, yunet::INPUT_SIZE as u32);
    let input = tensor::to_nchw(&letterbox.image, ChannelOrder::Bgr, Normalization::RAW)?;

    let outputs = model::run(session, input).context("running face detector")?;
    let heads = yunet::split_heads(&outputs, yunet::INPUT_SIZE)?;
    let candidates = yunet::decode(&heads, yunet::INPUT_SIZE, score_threshold);

    let mut detections: Vec<Detection> = candidates
        .into_iter()
        .map(|c| {
            let (x, y) = letterbox.to_source(c.bbox[0], c.bbox[1]);
            let mut landmarks = [0.0f32; 10];
            for i in 0..5 {
                let (lx, ly) = letterbox.to_source(c.landmarks[i * 2], c.landmarks[i * 2 + 1]);
                landmarks[i * 2] = lx;
                landmarks[i * 2 + 1] = ly;
            }
            Detection {
                bbox: [x, y, c.bbox[2] / letterbox.scale, c.bbox[3] / letterbox.scale],
                score: c.score,
                landmarks,
            }
        })
        .collect();

    if nms_threshold < 1.0 {
        detections = nms(&detections, nms_threshold);
    }

    log::debug!("detector kept {} face(s)", detections.len());
    Ok(detections)
}

/// The highest scoring detection, if any.
pub fn best(detections: &[Detection]) -> Option<&Detection> {
    detections.iter().max_by(|a, b| a.score.total_cmp(&b.score))
}

/// Greedy non-maximum suppression, highest score first.
pub fn nms(detections: &[Detection], iou_threshold: f32) -> Vec<Detection> {
    let mut sorted = detections.to_vec();
    sorted.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut keep: Vec<Detection> = Vec::new();
    for det in sorted {
        if keep
            .iter()
            .all(|kept| compute_iou(&kept.bbox, &det.bbox) <= iou_threshold)
        {
            keep.push(det);
        }
    }
    keep
}

/// Intersection over union of two `[x, y, w, h]` boxes.
fn compute_iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let overlap_w = ((a[0] + a[2]).min(b[0] + b[2]) - a[0].max(b[0])).max(0.0);
    let overlap_h = ((a[1] + a[3]).min(b[1] + b[3]) - a[1].max(b[1])).max(0.0);
    let inter = overlap_w * overlap_h;
    if inter == 0.0 {
        return 0.0;
    }
    inter / (a[2] * a[3] + b[2] * b[3] - inter)
}
