pub mod classifier;
pub mod face;
pub mod geometry;
pub mod hand;
pub mod landmarks;
pub mod mesh;
pub mod model;
pub mod pipeline;
pub mod pose;
pub mod render;
pub mod tensor;
pub mod yunet;

// Re-export commonly used types
pub use classifier::{Classifier, Prediction};
pub use face::Detection;
pub use geometry::FaceAnalysis;
pub use landmarks::Landmark;
pub use pipeline::{FrameResult, ModelPaths, Pipeline, PipelineConfig};
