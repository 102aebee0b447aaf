pub mod config;
pub mod features_log;
pub mod frame;
pub mod gate;
pub mod processor;
pub mod protocol;
pub mod server;

// Re-export vision types for convenience
pub use facelens_vision::{FaceAnalysis, Pipeline, Prediction};
