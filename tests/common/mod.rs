#![allow(dead_code)]

use std::io::Cursor;
use std::path::Path;
use std::sync::mpsc;

use anyhow::Result;
use base64::Engine;
use facelens::features_log::FeatureLog;
use facelens::processor::{Analysis, Analyzer, FrameProcessor};
use facelens::server::AppState;
use facelens::{FaceAnalysis, Prediction};
use image::{DynamicImage, ImageFormat, RgbImage};
use serde_json::json;

/// Answers every frame with the same face and a "smile" prediction.
pub struct Fixed;

impl Analyzer for Fixed {
    fn analyze(&mut self, img: &DynamicImage) -> Result<Analysis> {
        Ok(Analysis {
            face_analysis: Some(FaceAnalysis {
                face_width: img.width() as f32,
                left_eyebrow_distance: 1.0,
                right_eyebrow_distance: 1.0,
                mouth_openness: 0.0,
                left_eye_openness: 2.0,
                right_eye_openness: 2.0,
                vertical_tilt: 5.0,
                horizontal_tilt: 90.0,
            }),
            predictions: vec![
                Prediction {
                    label: "smile".to_string(),
                    score: 0.8,
                },
                Prediction {
                    label: "neutral".to_string(),
                    score: 0.2,
                },
            ],
            canvas: RgbImage::new(4, 4),
        })
    }
}

/// Signals when it starts, then holds the frame until released.
pub struct Blocking {
    pub started: mpsc::Sender<()>,
    pub release: mpsc::Receiver<()>,
}

impl Analyzer for Blocking {
    fn analyze(&mut self, img: &DynamicImage) -> Result<Analysis> {
        let _ = self.started.send(());
        let _ = self.release.recv();
        Fixed.analyze(img)
    }
}

pub fn state(analyzer: impl Analyzer + 'static, dir: &Path) -> AppState {
    let processor = FrameProcessor::new(
        Box::new(analyzer),
        Some(FeatureLog::new(dir.join("features.csv"))),
        dir.join("output"),
        false,
    )
    .expect("frame processor");
    AppState::new(processor)
}

pub fn data_url(width: u32, height: u32) -> String {
    let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("png encode");
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

pub fn frame_message(data: &str) -> String {
    json!({"event": "process_frame", "data": data}).to_string()
}

/// Rows in the feature log, header included.
pub fn log_lines(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("features.csv"))
        .map(|csv| csv.lines().map(str::to_string).collect())
        .unwrap_or_default()
}
