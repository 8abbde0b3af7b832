use std::path::Path;

use anyhow::{Context, Result};
use ndarray::{Array4, ArrayD, IxDyn};
use ort::{
    ep::{self, ExecutionProvider},
    session::{
        builder::{GraphOptimizationLevel, SessionBuilder},
        Session,
    },
    value::Value,
};

/// Something that runs a model graph on one NCHW input batch.
///
/// Outputs come back in the graph's output order, fully materialised.
pub trait Engine: Send {
    fn infer(&mut self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>>;
}

impl Engine for Session {
    fn infer(&mut self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        let input_tensor = Value::from_array(input)?;
        let outputs = self.run(ort::inputs![input_tensor])?;

        let mut tensors = Vec::with_capacity(outputs.len());
        for (_name, output) in outputs.iter() {
            let (shape, data) = output.try_extract_tensor::<f32>()?;
            let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            tensors.push(ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())?);
        }
        Ok(tensors)
    }
}

/// Runtime options shared by every model session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelOptions {
    /// Intra-op thread count; `None` leaves the runtime default
    pub threads: Option<usize>,
}

pub fn session_builder(options: ModelOptions) -> Result<SessionBuilder> {
    let mut builder =
        Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(ort::Error::<()>::from)?;

    if let Some(threads) = options.threads {
        builder = builder.with_intra_threads(threads).map_err(ort::Error::<()>::from)?;
    }

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

/// Load a model file into a session. Failure here is fatal to the caller.
pub fn load_session(path: &Path, options: ModelOptions) -> Result<Session> {
    log::debug!("loading model {}", path.display());
    session_builder(options)?
        .commit_from_file(path)
        .with_context(|| format!("load model {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_fails() {
        let result = load_session(Path::new("models/does-not-exist.onnx"), ModelOptions::default());
        assert!(result.is_err());
    }
}
