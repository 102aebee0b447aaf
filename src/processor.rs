use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use facelens_vision::{FaceAnalysis, Pipeline, Prediction};
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::features_log::FeatureLog;
use crate::frame;

/// What the models make of one frame.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub face_analysis: Option<FaceAnalysis>,
    pub predictions: Vec<Prediction>,
    pub canvas: RgbImage,
}

/// The model stage, kept behind a trait so the frame flow can run without model files.
pub trait Analyzer: Send {
    fn analyze(&mut self, img: &DynamicImage) -> Result<Analysis>;
}

impl Analyzer for Pipeline {
    fn analyze(&mut self, img: &DynamicImage) -> Result<Analysis> {
        let result = self.process(img)?;
        Ok(Analysis {
            face_analysis: result.face_analysis,
            predictions: result.predictions,
            canvas: result.canvas,
        })
    }
}

/// The payload of a successful `frame_processed` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameReport {
    pub predictions: Prediction,
    pub face_analysis: Option<FaceAnalysis>,
}

pub struct FrameProcessor {
    analyzer: Box<dyn Analyzer>,
    log: Option<FeatureLog>,
    output_dir: PathBuf,
    save_frames: bool,
}

impl FrameProcessor {
    /// Without a `log`, measurements are returned but not recorded.
    pub fn new(
        analyzer: Box<dyn Analyzer>,
        log: Option<FeatureLog>,
        output_dir: impl Into<PathBuf>,
        save_frames: bool,
    ) -> Result<Self> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("creating output directory {}", output_dir.display()))?;
        Ok(Self {
            analyzer,
            log,
            output_dir,
            save_frames,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Decode a browser data URL and process it.
    pub fn process_data_url(&mut self, data: &str) -> Result<FrameReport> {
        let img = frame::decode_data_url(data)?;
        self.process_image(&img)
    }

    pub fn process_image(&mut self, img: &DynamicImage) -> Result<FrameReport> {
        let frame_path = self.frame_path();
        let frame_name = frame_path.to_string_lossy();

        let analysis = self.analyzer.analyze(img)?;

        if let (Some(log), Some(features)) = (&self.log, &analysis.face_analysis) {
            log.append(&frame_name, features)
                .context("logging facial features")?;
        }

        if self.save_frames {
            analysis
                .canvas
                .save(&frame_path)
                .with_context(|| format!("saving {}", frame_path.display()))?;
        }

        let top = analysis
            .predictions
            .into_iter()
            .next()
            .context("classifier returned no predictions")?;

        log::debug!(
            "{}: {} ({:.3}), face: {}",
            frame_name,
            top.label,
            top.score,
            analysis.face_analysis.is_some()
        );

        Ok(FrameReport {
            predictions: top,
            face_analysis: analysis.face_analysis,
        })
    }

    fn frame_path(&self) -> PathBuf {
        let millis = chrono::Utc::now().timestamp_millis();
        self.output_dir
            .join(format!("processed_frame_{}.jpg", millis))
    }
}
