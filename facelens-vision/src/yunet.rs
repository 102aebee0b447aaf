//! YuNet detector post-processing.
//!
//! YuNet is anchor-free: every stride (8, 16, 32) predicts one face per grid
//! cell. The network exposes twelve outputs, grouped by kind then stride:
//! `cls_8, cls_16, cls_32, obj_8, obj_16, obj_32, bbox_8, .., kps_8, ..`.
//!
//! Decoding for the cell at row `r`, column `c`:
//! cx = (c + dx) * stride, cy = (r + dy) * stride
//! w = exp(dw) * stride,   h = exp(dh) * stride
//! score = sqrt(cls * obj)

use anyhow::Result;

use crate::model::OutputTensor;

pub const STRIDES: [usize; 3] = [8, 16, 32];

/// Fixed input edge of the exported model.
pub const INPUT_SIZE: usize = 640;

/// A decoded face in detector input pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub bbox: [f32; 4], // x, y, w, h
    pub score: f32,
    pub landmarks: [f32; 10], // right eye, left eye, nose, right mouth, left mouth
}

/// The four prediction maps of a single stride.
#[derive(Debug, Clone, Copy)]
pub struct StrideHead<'a> {
    pub stride: usize,
    pub cls: &'a [f32],
    pub obj: &'a [f32],
    pub bbox: &'a [f32],
    pub kps: &'a [f32],
}

impl StrideHead<'_> {
    fn columns(&self, input_size: usize) -> usize {
        input_size / self.stride
    }
}

/// Group raw outputs by stride, checking every map has one entry per cell.
pub fn split_heads(outputs: &[OutputTensor], input_size: usize) -> Result<Vec<StrideHead<'_>>> {
    if outputs.len() < 12 {
        anyhow::bail!("YuNet should produce 12 outputs, got {}", outputs.len());
    }

    let mut heads = Vec::with_capacity(STRIDES.len());
    for (s, &stride) in STRIDES.iter().enumerate() {
        let cells = (input_size / stride).pow(2);
        heads.push(StrideHead {
            stride,
            cls: output_map(outputs, s, stride, cells, 1)?,
            obj: output_map(outputs, 3 + s, stride, cells, 1)?,
            bbox: output_map(outputs, 6 + s, stride, cells, 4)?,
            kps: output_map(outputs, 9 + s, stride, cells, 10)?,
        });
    }
    Ok(heads)
}

fn output_map(
    outputs: &[OutputTensor],
    idx: usize,
    stride: usize,
    cells: usize,
    width: usize,
) -> Result<&[f32]> {
    let tensor = &outputs[idx];
    if tensor.data.len() != cells * width {
        anyhow::bail!(
            "output {} (stride {}) has {} values with shape {:?}, expected {}x{}",
            idx,
            stride,
            tensor.data.len(),
            tensor.shape,
            cells,
            width
        );
    }
    Ok(tensor.data.as_slice())
}

pub fn score(cls: f32, obj: f32) -> f32 {
    (cls.clamp(0.0, 1.0) * obj.clamp(0.0, 1.0)).sqrt()
}

/// Decode every cell scoring at least `score_threshold`.
pub fn decode(heads: &[StrideHead<'_>], input_size: usize, score_threshold: f32) -> Vec<Candidate> {
    let mut candidates = Vec::new();

    for head in heads {
        let cols = head.columns(input_size);
        let stride = head.stride as f32;

        for idx in 0..head.cls.len() {
            let score = score(head.cls[idx], head.obj[idx]);
            if score < score_threshold {
                continue;
            }

            let col = (idx % cols) as f32;
            let row = (idx / cols) as f32;
            let b = &head.bbox[idx * 4..idx * 4 + 4];

            let cx = (col + b[0]) * stride;
            let cy = (row + b[1]) * stride;
            let w = b[2].exp() * stride;
            let h = b[3].exp() * stride;

            let k = &head.kps[idx * 10..idx * 10 + 10];
            let mut landmarks = [0.0f32; 10];
            for (p, pair) in k.chunks_exact(2).enumerate() {
                landmarks[p * 2] = (col + pair[0]) * stride;
                landmarks[p * 2 + 1] = (row + pair[1]) * stride;
            }

            candidates.push(Candidate {
                bbox: [cx - w / 2.0, cy - h / 2.0, w, h],
                score,
                landmarks,
            });
        }
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_outputs(input_size: usize) -> Vec<OutputTensor> {
        let widths = [1, 1, 4, 10];
        let mut outputs = Vec::new();
        for width in widths {
            for stride in STRIDES {
                let cells = (input_size / stride).pow(2);
                outputs.push(OutputTensor {
                    shape: vec![1, cells as i64, width as i64],
                    data: vec![0.0; cells * width],
                });
            }
        }
        outputs
    }

    #[test]
    fn test_score_is_geometric_mean() {
        assert!((score(0.81, 1.0) - 0.9).abs() < 1e-6);
        assert_eq!(score(-0.5, 0.9), 0.0);
        assert!((score(1.5, 0.25) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_wrong_output_count() {
        let outputs = empty_outputs(INPUT_SIZE);
        assert!(split_heads(&outputs[..11], INPUT_SIZE).is_err());
    }

    #[test]
    fn test_rejects_wrong_grid() {
        let outputs = empty_outputs(320);
        let err = split_heads(&outputs, INPUT_SIZE).unwrap_err();
        assert!(err.to_string().contains("stride 8"));
    }

    #[test]
    fn test_decode_single_cell() {
        let mut outputs = empty_outputs(INPUT_SIZE);

        // Stride 32 is the third map of each group: 20x20 cells
        let cols = INPUT_SIZE / 32;
        let idx = 10 * cols + 10;
        outputs[2].data[idx] = 0.81;
        outputs[5].data[idx] = 1.0;
        outputs[8].data[idx * 4..idx * 4 + 4].copy_from_slice(&[0.5, 0.25, 2f32.ln(), 2f32.ln()]);
        outputs[11].data[idx * 10] = 0.5;
        outputs[11].data[idx * 10 + 1] = -0.5;

        let heads = split_heads(&outputs, INPUT_SIZE).unwrap();
        let detections = decode(&heads, INPUT_SIZE, 0.5);
        assert_eq!(detections.len(), 1);
        let det = &detections[0];

        // center (10.5 * 32, 10.25 * 32) = (336, 328), size 64x64
        assert!((det.score - 0.9).abs() < 1e-5);
        assert!((det.bbox[0] - 304.0).abs() < 1e-3);
        assert!((det.bbox[1] - 296.0).abs() < 1e-3);
        assert!((det.bbox[2] - 64.0).abs() < 1e-3);
        assert!((det.bbox[3] - 64.0).abs() < 1e-3);
        assert!((det.landmarks[0] - 336.0).abs() < 1e-3);
        assert!((det.landmarks[1] - 304.0).abs() < 1e-3);
        // untouched points sit on the cell origin
        assert!((det.landmarks[2] - 320.0).abs() < 1e-3);
    }

    #[test]
    fn test_threshold_filters_everything() {
        let outputs = empty_outputs(INPUT_SIZE);
        let heads = split_heads(&outputs, INPUT_SIZE).unwrap();
        assert!(decode(&heads, INPUT_SIZE, 0.5).is_empty());
    }
}
