use thiserror::Error;

/// Failures the pipeline reports to its callers.
///
/// These are raised inside `anyhow::Error` and can be recovered with
/// `downcast_ref::<VisionError>()`.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("image dimensions are zero")]
    EmptyImage,

    #[error("failed to decode image: {0}")]
    ImageDecode(String),

    #[error("unexpected tensor shape {shape:?}: {reason}")]
    TensorShape { shape: Vec<usize>, reason: String },

    #[error("model produced no output tensor")]
    EmptyOutput,

    #[error("probe count must be > 0")]
    InvalidProbes,

    #[error("{0} not found in PATH")]
    ToolNotFound(&'static str),
}

impl VisionError {
    pub fn tensor_shape(shape: &[usize], reason: impl Into<String>) -> Self {
        Self::TensorShape {
            shape: shape.to_vec(),
            reason: reason.into(),
        }
    }
}
