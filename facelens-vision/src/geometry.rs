//! Facial measurements over the 468-point face mesh.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::landmarks::Landmark;
use crate::mesh::MESH_LANDMARKS;

pub type Point = (f32, f32);

// Face mesh indices
const LEFT_FACE_EDGE: usize = 234;
const RIGHT_FACE_EDGE: usize = 454;
const LEFT_EYEBROW: usize = 66;
const RIGHT_EYEBROW: usize = 296;
const LEFT_UPPER_LID: usize = 159;
const LEFT_LOWER_LID: usize = 145;
const RIGHT_UPPER_LID: usize = 386;
const RIGHT_LOWER_LID: usize = 374;
const UPPER_LIP: usize = 13;
const LOWER_LIP: usize = 14;
const CHIN: usize = 152;
const NOSE_TIP: usize = 1;
const FOREHEAD: usize = 10;
const LEFT_EYE_OUTER: usize = 33;
const RIGHT_EYE_OUTER: usize = 263;

/// Distances are in source image pixels, tilts in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceAnalysis {
    pub face_width: f32,
    pub left_eyebrow_distance: f32,
    pub right_eyebrow_distance: f32,
    pub mouth_openness: f32,
    pub left_eye_openness: f32,
    pub right_eye_openness: f32,
    pub vertical_tilt: f32,
    pub horizontal_tilt: f32,
}

pub fn distance(p1: Point, p2: Point) -> f32 {
    ((p1.0 - p2.0).powi(2) + (p1.1 - p2.1).powi(2)).sqrt()
}

/// Angle at `p3` of the triangle `p1 p2 p3`, in degrees. Degenerate sides give 0.
pub fn angle(p1: Point, p2: Point, p3: Point) -> f32 {
    let a = distance(p2, p3);
    let b = distance(p1, p3);
    let c = distance(p1, p2);
    if a * b == 0.0 {
        return 0.0;
    }
    let cos = ((a * a + b * b - c * c) / (2.0 * a * b)).clamp(-1.0, 1.0);
    cos.acos().to_degrees()
}

pub fn analyze_face(landmarks: &[Landmark], width: u32, height: u32) -> Result<FaceAnalysis> {
    if landmarks.len() < MESH_LANDMARKS {
        anyhow::bail!(
            "face mesh has {} landmarks, expected {}",
            landmarks.len(),
            MESH_LANDMARKS
        );
    }
    let at = |idx: usize| landmarks[idx].to_pixels(width, height);

    let left_face_edge = at(LEFT_FACE_EDGE);

    Ok(FaceAnalysis {
        face_width: distance(left_face_edge, at(RIGHT_FACE_EDGE)),
        left_eyebrow_distance: distance(at(LEFT_EYEBROW), at(LEFT_UPPER_LID)),
        right_eyebrow_distance: distance(at(RIGHT_EYEBROW), at(RIGHT_UPPER_LID)),
        mouth_openness: distance(at(UPPER_LIP), at(LOWER_LIP)),
        left_eye_openness: distance(at(LEFT_UPPER_LID), at(LEFT_LOWER_LID)),
        right_eye_openness: distance(at(RIGHT_UPPER_LID), at(RIGHT_LOWER_LID)),
        vertical_tilt: angle(at(FOREHEAD), at(NOSE_TIP), at(CHIN)),
        horizontal_tilt: angle(left_face_edge, at(RIGHT_EYE_OUTER), at(LEFT_EYE_OUTER)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        assert_eq!(distance((0.0, 0.0), (3.0, 4.0)), 5.0);
        assert_eq!(distance((2.0, 2.0), (2.0, 2.0)), 0.0);
    }

    #[test]
    fn test_right_angle() {
        // angle sits at p3
        let a = angle((4.0, 0.0), (0.0, 3.0), (0.0, 0.0));
        assert!((a - 90.0).abs() < 1e-4);
    }

    #[test]
    fn test_straight_line_does_not_produce_nan() {
        let a = angle((0.0, 0.0), (2.0, 0.0), (1.0, 0.0));
        assert!((a - 180.0).abs() < 1e-3);
        let b = angle((0.0, 0.0), (1.0, 0.0), (3.0, 0.0));
        assert!(b.abs() < 1e-3);
    }

    #[test]
    fn test_degenerate_angle_is_zero() {
        assert_eq!(angle((1.0, 1.0), (5.0, 5.0), (5.0, 5.0)), 0.0);
        assert_eq!(angle((1.0, 1.0), (5.0, 5.0), (1.0, 1.0)), 0.0);
    }

    #[test]
    fn test_short_mesh_is_an_error() {
        let landmarks = vec![Landmark::new(0.5, 0.5, 0.0); 10];
        assert!(analyze_face(&landmarks, 100, 100).is_err());
    }

    #[test]
    fn test_analysis_uses_image_scale() {
        let mut landmarks = vec![Landmark::new(0.5, 0.5, 0.0); MESH_LANDMARKS];
        landmarks[LEFT_FACE_EDGE] = Landmark::new(0.25, 0.5, 0.0);
        landmarks[RIGHT_FACE_EDGE] = Landmark::new(0.75, 0.5, 0.0);
        landmarks[UPPER_LIP] = Landmark::new(0.5, 0.6, 0.0);
        landmarks[LOWER_LIP] = Landmark::new(0.5, 0.7, 0.0);
        landmarks[FOREHEAD] = Landmark::new(0.5, 0.1, 0.0);
        landmarks[NOSE_TIP] = Landmark::new(0.6, 0.5, 0.0);
        landmarks[CHIN] = Landmark::new(0.5, 0.9, 0.0);

        let analysis = analyze_face(&landmarks, 200, 100).unwrap();
        assert!((analysis.face_width - 100.0).abs() < 1e-3);
        assert!((analysis.mouth_openness - 10.0).abs() < 1e-3);
        // every other eye/brow point collapses onto the center
        assert_eq!(analysis.left_eye_openness, 0.0);
        assert!(analysis.vertical_tilt > 0.0 && analysis.vertical_tilt < 180.0);
    }

    #[test]
    fn test_serializes_with_wire_names() {
        let analysis = FaceAnalysis {
            face_width: 1.0,
            left_eyebrow_distance: 2.0,
            right_eyebrow_distance: 3.0,
            mouth_openness: 4.0,
            left_eye_openness: 5.0,
            right_eye_openness: 6.0,
            vertical_tilt: 7.0,
            horizontal_tilt: 8.0,
        };
        let json = serde_json::to_value(analysis).unwrap();
        assert_eq!(json["mouth_openness"], 4.0);
        assert_eq!(json["horizontal_tilt"], 8.0);
    }
}
