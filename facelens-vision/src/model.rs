use std::path::Path;

use anyhow::{Context, Result};
use ndarray::Array4;
use ort::{
    ep::{self, ExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
    value::Value,
};

/// A model output copied out of the runtime.
#[derive(Debug, Clone)]
pub struct OutputTensor {
    pub shape: Vec<i64>,
    pub data: Vec<f32>,
}

pub fn session_builder() -> Result<SessionBuilder> {
    let mut builder =
        Session::builder()?.with_optimization_level(GraphOptimizationLevel::Level3)?;

    #[cfg(feature = "openvino")]
    {
        let ep = ep::OpenVINO::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("openvino feature is enabled, onnx runtime not compiled with openvino")
        }
    }

    #[cfg(feature = "cuda")]
    {
        let ep = ep::CUDA::default();
        if ep.is_available()? {
            ep.register(&mut builder)?;
        } else {
            log::warn!("cuda feature is enabled, onnx runtime not compiled with cuda")
        }
    }

    Ok(builder)
}

/// Load an ONNX model from disk. `what` names the model in error messages.
pub fn load_session(path: &Path, what: &str) -> Result<Session> {
    if !path.exists() {
        anyhow::bail!("{} model not found at {}", what, path.display());
    }
    log::info!("Loading {} model from {}", what, path.display());
    session_builder()?
        .commit_from_file(path)
        .with_context(|| format!("load {} model {}", what, path.display()))
}

/// Run a single-input model and copy every output tensor out as f32.
pub fn run(session: &mut Session, input: Array4<f32>) -> Result<Vec<OutputTensor>> {
    let input_tensor = Value::from_array(input)?;
    let outputs = session.run(ort::inputs![input_tensor])?;

    let mut tensors = Vec::with_capacity(outputs.len());
    for (_name, output) in outputs.iter() {
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        tensors.push(OutputTensor {
            shape: shape.iter().copied().collect(),
            data: data.to_vec(),
        });
    }
    Ok(tensors)
}
