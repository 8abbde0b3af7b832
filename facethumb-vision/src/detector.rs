use anyhow::{Context, Result};
use image::RgbImage;
use ndarray::{Array4, Ix4};

use crate::decode::{self, ScaledProposal};
use crate::engine::Engine;
use crate::error::VisionError;
use crate::filter;
use crate::geometry::Letterbox;
use crate::primitives::{image_pad_square, image_scale};

/// Side of the square detector input.
pub const INPUT_SIZE: u32 = 640;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.60,
            nms_threshold: 0.5,
        }
    }
}

/// The resized and padded square the detector actually ran on.
#[derive(Debug, Clone)]
pub struct WorkingImage {
    pub image: RgbImage,
    pub letterbox: Letterbox,
}

/// Filtered proposals, in working-image pixels, plus the image they refer to.
#[derive(Debug, Clone)]
pub struct DetectorOutput {
    pub working: WorkingImage,
    pub proposals: Vec<ScaledProposal>,
}

/// Face detector over a distribution-decoded detection model.
///
/// Input contract: `[1, 3, 640, 640]`, RGB, values in [0, 1].
/// Output contract: one or more heads shaped `[1, 80, H, W]`, see [`decode`].
pub struct FaceDetector {
    engine: Box<dyn Engine>,
    config: DetectorConfig,
}

impl FaceDetector {
    pub fn new(engine: Box<dyn Engine>, config: DetectorConfig) -> Self {
        Self { engine, config }
    }

    pub fn detect(&mut self, img: &RgbImage) -> Result<DetectorOutput> {
        let working = prepare(img)?;
        let input = to_input_tensor(&working.image)?;

        let outputs = self.engine.infer(input).context("running detector")?;
        if outputs.is_empty() {
            return Err(VisionError::EmptyOutput.into());
        }

        let mut heads = Vec::with_capacity(outputs.len());
        for output in outputs {
            let shape = output.shape().to_vec();
            let head = output
                .into_dimensionality::<Ix4>()
                .map_err(|_| VisionError::tensor_shape(&shape, "detection head must be 4-D"))?;
            heads.push(head);
        }
        let views: Vec<_> = heads.iter().map(|h| h.view()).collect();

        let proposals = decode::decode_heads(
            &views,
            working.image.height(),
            self.config.confidence_threshold,
        )?;
        let proposals = filter::filter_proposals(proposals, self.config.nms_threshold);

        Ok(DetectorOutput { working, proposals })
    }
}

/// Resize to fit the detector input, then pad to a centred square.
pub fn prepare(img: &RgbImage) -> Result<WorkingImage> {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(VisionError::EmptyImage.into());
    }

    let letterbox = Letterbox::compute(width, height, INPUT_SIZE);
    let mut image = image_pad_square(image_scale(img, INPUT_SIZE, INPUT_SIZE));
    if image.dimensions() != (INPUT_SIZE, INPUT_SIZE) {
        image = image::imageops::resize(
            &image,
            INPUT_SIZE,
            INPUT_SIZE,
            image::imageops::FilterType::Triangle,
        );
    }

    Ok(WorkingImage { image, letterbox })
}

/// NCHW, RGB, scaled to [0, 1]
fn to_input_tensor(img: &RgbImage) -> Result<Array4<f32>> {
    let (width, height) = img.dimensions();
    let pixel_count = (width * height) as usize;
    let mut input_data = vec![0.0f32; 3 * pixel_count];

    let (r_channel, rest) = input_data.split_at_mut(pixel_count);
    let (g_channel, b_channel) = rest.split_at_mut(pixel_count);

    for (i, px) in img.as_raw().chunks_exact(3).enumerate() {
        r_channel[i] = px[0] as f32 / 255.0;
        g_channel[i] = px[1] as f32 / 255.0;
        b_channel[i] = px[2] as f32 / 255.0;
    }

    Ok(Array4::from_shape_vec(
        (1, 3, height as usize, width as usize),
        input_data,
    )?)
}
