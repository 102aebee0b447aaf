use std::path::PathBuf;

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage};
use ort::session::Session;

use crate::classifier::{Classifier, ClassifierConfig, Labels, Prediction};
use crate::face;
use crate::geometry::{self, FaceAnalysis};
use crate::hand::HandLandmarker;
use crate::landmarks::Landmark;
use crate::mesh::{FaceMesh, Roi, MESH_LANDMARKS};
use crate::model;
use crate::pose::PoseLandmarker;
use crate::render::{
    self, Connections, DrawStyle, HAND_CONNECTIONS, POSE_CONNECTIONS, TESSELATION_EDGES,
};

/// Edge of the square image handed to the classifier.
pub const CLASSIFIER_CANVAS_SIZE: u32 = 224;

#[derive(Debug, Clone, PartialEq)]
pub struct ModelPaths {
    pub detector: PathBuf,
    pub face_mesh: PathBuf,
    pub pose: Option<PathBuf>,
    /// Hands are looked for only when a pose model is loaded too.
    pub hand: Option<PathBuf>,
    pub classifier: PathBuf,
    pub labels: Option<PathBuf>,
    /// Face mesh tesselation edges. The face contours are drawn without it.
    pub face_tesselation: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub min_detection_confidence: f32,
    pub min_presence_confidence: f32,
    pub nms_threshold: f32,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub classifier: ClassifierConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_detection_confidence: 0.5,
            min_presence_confidence: 0.5,
            nms_threshold: 0.3,
            canvas_width: 1920,
            canvas_height: 1080,
            classifier: ClassifierConfig::default(),
        }
    }
}

/// Landmarks found in one frame, normalized to that frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameLandmarks {
    pub face: Option<Vec<Landmark>>,
    pub pose: Option<Vec<Landmark>>,
    pub left_hand: Option<Vec<Landmark>>,
    pub right_hand: Option<Vec<Landmark>>,
}

impl FrameLandmarks {
    /// Draw every landmark set onto a black canvas, the face with `face_connections`.
    pub fn render(
        &self,
        width: u32,
        height: u32,
        face_connections: &Connections,
        style: &DrawStyle,
    ) -> RgbImage {
        let mut canvas = render::blank_canvas(width, height);
        if let Some(face) = &self.face {
            render::draw_landmarks(&mut canvas, face, face_connections.as_slice(), style);
        }
        if let Some(pose) = &self.pose {
            render::draw_landmarks(&mut canvas, pose, &POSE_CONNECTIONS, style);
        }
        for hand in [&self.left_hand, &self.right_hand].into_iter().flatten() {
            render::draw_landmarks(&mut canvas, hand, &HAND_CONNECTIONS, style);
        }
        canvas
    }
}

#[derive(Debug, Clone)]
pub struct FrameResult {
    pub landmarks: FrameLandmarks,
    pub face_analysis: Option<FaceAnalysis>,
    pub canvas: RgbImage,
    pub predictions: Vec<Prediction>,
}

/// Full pipeline: detect face → mesh (+ pose, hands) → render → classify
pub struct Pipeline {
    pub detector: Session,
    pub mesh: FaceMesh,
    pub pose: Option<PoseLandmarker>,
    pub hands: Option<HandLandmarker>,
    pub classifier: Classifier,
    pub face_connections: Connections,
    pub config: PipelineConfig,
}

impl Pipeline {
    pub fn new(paths: &ModelPaths, config: PipelineConfig) -> Result<Self> {
        let detector = model::load_session(&paths.detector, "face detector")?;
        let mesh = FaceMesh::new(
            model::load_session(&paths.face_mesh, "face mesh")?,
            config.min_presence_confidence,
        );
        let pose = match &paths.pose {
            Some(path) => Some(PoseLandmarker::new(
                model::load_session(path, "pose")?,
                config.min_presence_confidence,
            )),
            None => None,
        };
        let hands = match (&paths.hand, &pose) {
            (Some(path), Some(_)) => Some(HandLandmarker::new(
                model::load_session(path, "hand")?,
                config.min_presence_confidence,
            )),
            (Some(path), None) => {
                log::warn!(
                    "hand model {} needs a pose model, hands are skipped",
                    path.display()
                );
                None
            }
            (None, _) => None,
        };
        let face_connections = match &paths.face_tesselation {
            Some(path) => {
                let table = Connections::load(path, MESH_LANDMARKS)?;
                if table.len() != TESSELATION_EDGES {
                    log::warn!(
                        "face tesselation {} has {} edges, expected {}",
                        path.display(),
                        table.len(),
                        TESSELATION_EDGES
                    );
                }
                table
            }
            None => {
                log::warn!("no face tesselation configured, drawing face contours only");
                Connections::face_contours()
            }
        };
        let labels = match &paths.labels {
            Some(path) => Labels::load(path)?,
            None => Labels::default(),
        };
        let classifier = Classifier::new(
            model::load_session(&paths.classifier, "classifier")?,
            labels,
            config.classifier,
        );

        Ok(Self {
            detector,
            mesh,
            pose,
            hands,
            classifier,
            face_connections,
            config,
        })
    }

    pub fn landmarks(&mut self, img: &DynamicImage) -> Result<FrameLandmarks> {
        let detections = face::detect_faces(
            &mut self.detector,
            img,
            self.config.min_detection_confidence,
            self.config.nms_threshold,
        )
        .context("detecting faces")?;

        let face = match face::best(&detections) {
            Some(best) => {
                let roi = Roi::from_detection(best);
                self.mesh
                    .infer(&img.to_rgb8(), &roi)
                    .context("computing face mesh")?
            }
            None => None,
        };

        let pose = match self.pose.as_mut() {
            Some(pose) => pose.infer(img).context("computing pose")?,
            None => None,
        };

        let (left_hand, right_hand) = match (self.hands.as_mut(), &pose) {
            (Some(hands), Some(pose)) => hands
                .infer_both(&img.to_rgb8(), pose)
                .context("computing hand landmarks")?,
            _ => (None, None),
        };

        Ok(FrameLandmarks {
            face,
            pose,
            left_hand,
            right_hand,
        })
    }

    /// Process a frame: landmarks, facial geometry and the classification of the rendered canvas
    pub fn process(&mut self, img: &DynamicImage) -> Result<FrameResult> {
        let landmarks = self.landmarks(img)?;
        let style = DrawStyle::with_threshold(self.config.min_presence_confidence);
        let canvas = landmarks.render(
            self.config.canvas_width,
            self.config.canvas_height,
            &self.face_connections,
            &style,
        );

        let face_analysis = match &landmarks.face {
            Some(mesh) => {
                let (width, height) = img.dimensions();
                Some(geometry::analyze_face(mesh, width, height)?)
            }
            None => None,
        };

        let small = DynamicImage::ImageRgb8(canvas.clone()).resize_exact(
            CLASSIFIER_CANVAS_SIZE,
            CLASSIFIER_CANVAS_SIZE,
            FilterType::CatmullRom,
        );
        let predictions = self
            .classifier
            .classify(&small)
            .context("classifying landmark canvas")?;

        Ok(FrameResult {
            landmarks,
            face_analysis,
            canvas,
            predictions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_reports_missing_models() {
        let paths = ModelPaths {
            detector: PathBuf::from("/nonexistent/yunet.onnx"),
            face_mesh: PathBuf::from("/nonexistent/face_mesh.onnx"),
            pose: None,
            hand: None,
            classifier: PathBuf::from("/nonexistent/classifier.onnx"),
            labels: None,
            face_tesselation: None,
        };
        let err = Pipeline::new(&paths, PipelineConfig::default())
            .err()
            .expect("models are missing");
        assert!(err.to_string().contains("face detector"));
    }

    #[test]
    fn test_empty_frame_renders_black_canvas() {
        let canvas = FrameLandmarks::default().render(
            64,
            36,
            &Connections::face_contours(),
            &DrawStyle::default(),
        );
        assert_eq!(canvas.dimensions(), (64, 36));
        assert!(canvas.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_face_is_drawn_on_canvas() {
        let landmarks = FrameLandmarks {
            face: Some(vec![Landmark::new(0.5, 0.5, 0.0); 468]),
            ..Default::default()
        };
        let canvas = landmarks.render(
            64,
            36,
            &Connections::face_contours(),
            &DrawStyle::default(),
        );
        // point ring around the center
        assert_eq!(canvas.get_pixel(34, 18).0, [128, 128, 128]);
    }

    #[test]
    fn test_pose_below_presence_threshold_is_not_drawn() {
        let mut lm = Landmark::new(0.5, 0.5, 0.0);
        lm.visibility = Some(0.9);
        lm.presence = Some(0.6);
        let landmarks = FrameLandmarks {
            pose: Some(vec![lm; 33]),
            ..Default::default()
        };
        let contours = Connections::face_contours();

        let strict = landmarks.render(64, 36, &contours, &DrawStyle::with_threshold(0.8));
        assert!(strict.pixels().all(|p| p.0 == [0, 0, 0]));

        let loose = landmarks.render(64, 36, &contours, &DrawStyle::with_threshold(0.5));
        assert_eq!(loose.get_pixel(34, 18).0, [128, 128, 128]);
    }

    #[test]
    fn test_hands_are_drawn() {
        let hand = (0..21)
            .map(|i| Landmark::new(0.1 + i as f32 * 0.01, 0.5, 0.0))
            .collect::<Vec<_>>();
        let landmarks = FrameLandmarks {
            right_hand: Some(hand),
            ..Default::default()
        };
        let canvas = landmarks.render(
            200,
            100,
            &Connections::face_contours(),
            &DrawStyle::default(),
        );
        assert!(canvas.pixels().any(|p| p.0 == [224, 224, 224]));
    }
}
