use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use facelens_vision::classifier::ClassifierConfig;
use facelens_vision::{ModelPaths, PipelineConfig};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub static CONFIG_PATH: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var_os("FACELENS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("facelens.toml"))
});

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub analysis: AnalysisConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub cors_origin: String,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
            cors_origin: "http://localhost:5173".to_string(),
            static_dir: PathBuf::from("static"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub detector: PathBuf,
    pub face_mesh: PathBuf,
    pub pose: Option<PathBuf>,
    pub hand: Option<PathBuf>,
    pub classifier: Option<PathBuf>,
    pub labels: Option<PathBuf>,
    /// Face mesh tesselation edges, JSON `[[a, b], ...]` or one pair per line.
    pub face_tesselation: Option<PathBuf>,
    pub classifier_input: ClassifierConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            detector: PathBuf::from("models/face_detection_yunet_2023mar.onnx"),
            face_mesh: PathBuf::from("models/face_landmark.onnx"),
            pose: None,
            hand: None,
            classifier: None,
            labels: None,
            face_tesselation: None,
            classifier_input: ClassifierConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub min_detection_confidence: f32,
    pub min_presence_confidence: f32,
    pub nms_threshold: f32,
    pub canvas_width: u32,
    pub canvas_height: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let pipeline = PipelineConfig::default();
        Self {
            min_detection_confidence: pipeline.min_detection_confidence,
            min_presence_confidence: pipeline.min_presence_confidence,
            nms_threshold: pipeline.nms_threshold,
            canvas_width: pipeline.canvas_width,
            canvas_height: pipeline.canvas_height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub csv_path: PathBuf,
    pub output_dir: PathBuf,
    pub save_frames: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            csv_path: PathBuf::from("facial_features_log.csv"),
            output_dir: PathBuf::from("output"),
            save_frames: false,
        }
    }
}

impl Config {
    /// Model locations; fails when no classifier is configured.
    pub fn model_paths(&self) -> Result<ModelPaths> {
        let classifier = self.models.classifier.clone().context(
            "classifier model not configured: set FACELENS_CLASSIFIER_MODEL or models.classifier",
        )?;
        Ok(ModelPaths {
            detector: self.models.detector.clone(),
            face_mesh: self.models.face_mesh.clone(),
            pose: self.models.pose.clone(),
            hand: self.models.hand.clone(),
            classifier,
            labels: self.models.labels.clone(),
            face_tesselation: self.models.face_tesselation.clone(),
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            min_detection_confidence: self.analysis.min_detection_confidence,
            min_presence_confidence: self.analysis.min_presence_confidence,
            nms_threshold: self.analysis.nms_threshold,
            canvas_width: self.analysis.canvas_width,
            canvas_height: self.analysis.canvas_height,
            classifier: self.models.classifier_input,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.model_paths()?;

        let thresholds = [
            ("min_detection_confidence", self.analysis.min_detection_confidence),
            ("min_presence_confidence", self.analysis.min_presence_confidence),
            ("nms_threshold", self.analysis.nms_threshold),
        ];
        for (name, value) in thresholds {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("analysis.{} must be within [0, 1], got {}", name, value);
            }
        }

        if self.analysis.canvas_width == 0 || self.analysis.canvas_height == 0 {
            anyhow::bail!("analysis canvas dimensions must be non-zero");
        }
        if self.models.classifier_input.input_size == 0 || self.models.classifier_input.top_k == 0
        {
            anyhow::bail!("classifier input_size and top_k must be non-zero");
        }
        Ok(())
    }

    /// Apply environment overrides; `lookup` is `std::env::var` outside tests.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.server.host = host
                .parse()
                .with_context(|| format!("HOST {:?} is not an IP address", host))?;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("PORT {:?} is not a port number", port))?;
        }
        if let Some(origin) = lookup("CORS_ORIGIN") {
            self.server.cors_origin = origin;
        }

        let path = |key: &str| lookup(key).filter(|v| !v.is_empty()).map(PathBuf::from);
        if let Some(p) = path("FACELENS_CLASSIFIER_MODEL") {
            self.models.classifier = Some(p);
        }
        if let Some(p) = path("FACELENS_CLASSIFIER_LABELS") {
            self.models.labels = Some(p);
        }
        if let Some(p) = path("FACELENS_DETECTOR_MODEL") {
            self.models.detector = p;
        }
        if let Some(p) = path("FACELENS_FACE_MESH_MODEL") {
            self.models.face_mesh = p;
        }
        if let Some(p) = path("FACELENS_POSE_MODEL") {
            self.models.pose = Some(p);
        }
        if let Some(p) = path("FACELENS_HAND_MODEL") {
            self.models.hand = Some(p);
        }
        if let Some(p) = path("FACELENS_FACE_TESSELATION") {
            self.models.face_tesselation = Some(p);
        }
        if let Some(p) = path("FACELENS_CSV_PATH") {
            self.output.csv_path = p;
        }
        if let Some(p) = path("FACELENS_OUTPUT_DIR") {
            self.output.output_dir = p;
        }
        Ok(())
    }
}

/// The file `load_config` reads: `explicit` when given, else [`CONFIG_PATH`].
pub fn config_path(explicit: Option<&Path>) -> &Path {
    explicit.unwrap_or(&CONFIG_PATH)
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = config_path(path);
    if !path.exists() {
        log::debug!("no config at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

/// File config, then `.env` and process environment on top.
pub fn load_effective(path: Option<&Path>) -> Result<Config> {
    dotenvy::dotenv().ok();
    let mut cfg = load_config(path)?;
    cfg.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(cfg)
}
