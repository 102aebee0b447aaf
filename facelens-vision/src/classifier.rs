use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use image::{imageops::FilterType, DynamicImage};
use ort::session::Session;
use serde::{Deserialize, Serialize};

use crate::model;
use crate::tensor::{self, ChannelOrder, Normalization};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub score: f32,
}

/// Class names indexed by model output position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Labels(Vec<String>);

#[derive(Deserialize)]
struct HfConfig {
    id2label: BTreeMap<String, String>,
}

impl Labels {
    pub fn new(labels: Vec<String>) -> Self {
        Self(labels)
    }

    /// Read a Hugging Face `config.json` (`id2label`) or a text file with one label per line.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading labels {}", path.display()))?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_hf_config(&raw).with_context(|| format!("parsing labels {}", path.display()))
        } else {
            Ok(Self::from_lines(&raw))
        }
    }

    pub fn from_lines(raw: &str) -> Self {
        Self(
            raw.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
        )
    }

    pub fn from_hf_config(raw: &str) -> Result<Self> {
        let config: HfConfig = serde_json::from_str(raw)?;
        let mut indexed = Vec::with_capacity(config.id2label.len());
        for (id, label) in config.id2label {
            let id: usize = id
                .parse()
                .with_context(|| format!("id2label key {:?} is not an index", id))?;
            indexed.push((id, label));
        }
        indexed.sort_by_key(|(id, _)| *id);

        let len = indexed.last().map_or(0, |(id, _)| id + 1);
        let mut labels: Vec<String> = (0..len).map(fallback_label).collect();
        for (id, label) in indexed {
            labels[id] = label;
        }
        Ok(Self(labels))
    }

    pub fn get(&self, idx: usize) -> String {
        self.0.get(idx).cloned().unwrap_or_else(|| fallback_label(idx))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn fallback_label(idx: usize) -> String {
    format!("LABEL_{}", idx)
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// The `k` most likely classes, best first.
pub fn top_k(probs: &[f32], labels: &Labels, k: usize) -> Vec<Prediction> {
    let mut ranked: Vec<(usize, f32)> = probs.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
        .into_iter()
        .take(k)
        .map(|(idx, score)| Prediction {
            label: labels.get(idx),
            score,
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub input_size: u32,
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub top_k: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        // ViT image processor defaults
        Self {
            input_size: 224,
            mean: [0.5; 3],
            std: [0.5; 3],
            top_k: 5,
        }
    }
}

impl ClassifierConfig {
    fn normalization(&self) -> Normalization {
        Normalization {
            scale: 1.0 / 255.0,
            mean: self.mean,
            std: self.std,
        }
    }
}

pub struct Classifier {
    session: Session,
    labels: Labels,
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(session: Session, labels: Labels, config: ClassifierConfig) -> Self {
        Self {
            session,
            labels,
            config,
        }
    }

    pub fn classify(&mut self, img: &DynamicImage) -> Result<Vec<Prediction>> {
        let size = self.config.input_size;
        let rgb = img.resize_exact(size, size, FilterType::Triangle).to_rgb8();
        let input = tensor::to_nchw(&rgb, ChannelOrder::Rgb, self.config.normalization())?;

        let outputs = model::run(&mut self.session, input).context("running classifier")?;
        let logits = outputs.first().context("classifier produced no output")?;
        if !self.labels.is_empty() && self.labels.len() != logits.data.len() {
            log::warn!(
                "classifier has {} classes but {} labels are loaded",
                logits.data.len(),
                self.labels.len()
            );
        }

        let probs = softmax(&logits.data);
        Ok(top_k(&probs, &self.labels, self.config.top_k))
    }
}
