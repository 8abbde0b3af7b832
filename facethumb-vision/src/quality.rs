use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::Array4;

use crate::engine::Engine;
use crate::error::VisionError;

/// Side of the square quality-model input.
pub const QUALITY_INPUT_SIZE: u32 = 112;

const MEANS: [f32; 3] = [0.5, 0.5, 0.5];
const STD_DEVS: [f32; 3] = [0.5, 0.5, 0.5];

/// Face quality model.
///
/// Input contract: `[1, 3, 112, 112]`, RGB, `(v / 255 - mean) / std` per channel.
/// The first output tensor is reduced to its mean.
pub struct QualityAssessor {
    engine: Box<dyn Engine>,
}

impl QualityAssessor {
    pub fn new(engine: Box<dyn Engine>) -> Self {
        Self { engine }
    }

    pub fn assess(&mut self, face: &RgbImage) -> Result<f32> {
        let (width, height) = face.dimensions();
        if width == 0 || height == 0 {
            return Err(VisionError::EmptyImage.into());
        }

        let input = to_input_tensor(face)?;
        let outputs = self.engine.infer(input).context("running quality model")?;
        let first = outputs.first().ok_or(VisionError::EmptyOutput)?;
        first.mean().ok_or_else(|| VisionError::EmptyOutput.into())
    }
}

/// Quality assessment is optional; without it every face scores 0.
pub enum QualityAssessment {
    Disabled,
    Enabled(QualityAssessor),
}

impl QualityAssessment {
    pub fn is_enabled(&self) -> bool {
        matches!(self, QualityAssessment::Enabled(_))
    }

    pub fn assess(&mut self, face: &RgbImage) -> Result<f32> {
        match self {
            QualityAssessment::Disabled => Ok(0.0),
            QualityAssessment::Enabled(assessor) => assessor.assess(face),
        }
    }
}

fn to_input_tensor(face: &RgbImage) -> Result<Array4<f32>> {
    let size = QUALITY_INPUT_SIZE;
    let resized =
        image::imageops::resize(face, size, size, image::imageops::FilterType::Triangle);

    let pixel_count = (size * size) as usize;
    let mut input_data = vec![0.0f32; 3 * pixel_count];
    for (i, px) in resized.as_raw().chunks_exact(3).enumerate() {
        for c in 0..3 {
            input_data[c * pixel_count + i] = (px[c] as f32 / 255.0 - MEANS[c]) / STD_DEVS[c];
        }
    }

    Ok(Array4::from_shape_vec(
        (1, 3, size as usize, size as usize),
        input_data,
    )?)
}
