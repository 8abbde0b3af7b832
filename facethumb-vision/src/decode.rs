//! Detection head post-processing
//! Decodes anchor-free distribution outputs into face proposals
//!
//! Each detection head emits one tensor shaped `[1, C, H, W]` where
//! `C = REG_MAX * 4 + 1 + NUM_KEYPOINTS * 3`. For a grid cell `(i, j)` the
//! channels hold, in order:
//! - 4 box-edge distributions (left, top, right, bottom), `REG_MAX` bins each
//! - 1 face logit
//! - 5 keypoint triples `(x, y, visibility)`
//!
//! Edge offsets are the expectation of the softmaxed distribution, in grid
//! cells, measured from the cell centre `(j + 0.5, i + 0.5)`:
//! xmin = cx - l, ymin = cy - t, xmax = cx + r, ymax = cy + b
//!
//! Keypoints are `(2 * kx + j, 2 * ky + i)`, also in grid cells.

use anyhow::Result;
use ndarray::ArrayView4;

use crate::error::VisionError;
use crate::geometry::{PixelRect, Point, Rect};
use crate::primitives::{sigmoid, softmax};

pub const REG_MAX: usize = 16;
pub const NUM_KEYPOINTS: usize = 5;
pub const HEAD_CHANNELS: usize = REG_MAX * 4 + 1 + NUM_KEYPOINTS * 3;

const CLS_CHANNEL: usize = REG_MAX * 4;
const KPS_CHANNEL: usize = CLS_CHANNEL + 1;

/// A face candidate in output-grid coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    /// Post-sigmoid face probability
    pub confidence: f32,
    pub box_raw: Rect,
    pub landmarks_raw: [Point; NUM_KEYPOINTS],
}

/// A proposal together with its box in working-image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledProposal {
    pub proposal: Proposal,
    pub box_scaled: PixelRect,
    pub landmarks_scaled: [Point; NUM_KEYPOINTS],
}

impl ScaledProposal {
    pub fn confidence(&self) -> f32 {
        self.proposal.confidence
    }
}

/// Expected bin index of a softmaxed distribution
fn dfl_expectation(bins: &[f32; REG_MAX]) -> f32 {
    softmax(bins)
        .iter()
        .enumerate()
        .map(|(n, p)| n as f32 * p)
        .sum()
}

/// Decode one detection head.
///
/// Cells whose face probability is below `confidence_threshold` are skipped.
/// Box corners are clamped to the grid: x against the grid width, y against
/// the grid height.
pub fn decode_head(output: ArrayView4<f32>, confidence_threshold: f32) -> Result<Vec<Proposal>> {
    let shape = output.shape();
    if shape[0] != 1 || shape[1] != HEAD_CHANNELS {
        return Err(VisionError::tensor_shape(
            shape,
            format!("expected [1, {}, H, W]", HEAD_CHANNELS),
        )
        .into());
    }

    let grid_h = shape[2];
    let grid_w = shape[3];
    let mut proposals = Vec::new();

    for i in 0..grid_h {
        for j in 0..grid_w {
            let box_prob = sigmoid(output[[0, CLS_CHANNEL, i, j]]);
            // NaN never passes
            if !(box_prob >= confidence_threshold) {
                continue;
            }

            let mut ltrb = [0.0f32; 4];
            for (k, edge) in ltrb.iter_mut().enumerate() {
                let mut bins = [0.0f32; REG_MAX];
                for (n, bin) in bins.iter_mut().enumerate() {
                    *bin = output[[0, k * REG_MAX + n, i, j]];
                }
                *edge = dfl_expectation(&bins);
            }

            let cx = j as f32 + 0.5;
            let cy = i as f32 + 0.5;
            let xmin = (cx - ltrb[0]).max(0.0);
            let ymin = (cy - ltrb[1]).max(0.0);
            let xmax = (cx + ltrb[2]).min(grid_w as f32);
            let ymax = (cy + ltrb[3]).min(grid_h as f32);

            let mut landmarks_raw = [Point::default(); NUM_KEYPOINTS];
            for (k, lm) in landmarks_raw.iter_mut().enumerate() {
                let kx = output[[0, KPS_CHANNEL + k * 3, i, j]];
                let ky = output[[0, KPS_CHANNEL + k * 3 + 1, i, j]];
                *lm = Point::new(kx * 2.0 + j as f32, ky * 2.0 + i as f32);
            }

            proposals.push(Proposal {
                confidence: box_prob,
                box_raw: Rect::new(xmin, ymin, xmax - xmin, ymax - ymin),
                landmarks_raw,
            });
        }
    }

    Ok(proposals)
}

/// Pixels per grid cell for a head whose grid is `grid_h` rows tall.
pub fn head_stride(image_height: u32, grid_h: usize) -> i32 {
    (image_height as f32 / grid_h as f32).ceil() as i32
}

/// Scale a grid-space proposal into working-image pixels.
///
/// Coordinates are truncated toward zero.
pub fn scale_proposal(proposal: Proposal, stride: i32) -> ScaledProposal {
    let s = stride as f32;
    let b = &proposal.box_raw;
    let box_scaled = PixelRect::new(
        (b.x * s) as i32,
        (b.y * s) as i32,
        (b.width * s) as i32,
        (b.height * s) as i32,
    );
    let landmarks_scaled = proposal.landmarks_raw.map(|p| Point::new(p.x * s, p.y * s));
    ScaledProposal {
        proposal,
        box_scaled,
        landmarks_scaled,
    }
}

/// Decode every head of one image and scale the results into working-image pixels.
///
/// Heads are decoded independently and concatenated in order.
pub fn decode_heads(
    heads: &[ArrayView4<f32>],
    image_height: u32,
    confidence_threshold: f32,
) -> Result<Vec<ScaledProposal>> {
    let mut proposals = Vec::new();
    for head in heads {
        let grid_h = head.shape()[2];
        if grid_h == 0 {
            continue;
        }
        let stride = head_stride(image_height, grid_h);
        let decoded = decode_head(head.view(), confidence_threshold)?;
        log::debug!(
            "head {}x{} stride {}: {} proposals",
            grid_h,
            head.shape()[3],
            stride,
            decoded.len()
        );
        proposals.extend(decoded.into_iter().map(|p| scale_proposal(p, stride)));
    }
    Ok(proposals)
}
