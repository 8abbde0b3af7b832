//! Synthetic detector/quality engines and an in-memory video.
//!
//! Frames are uniform 640x640 squares whose colour is a scene code; the fake
//! engines read the code back out of their input tensor and look up the faces
//! or quality scripted for it.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use facethumb_vision::decode::{HEAD_CHANNELS, REG_MAX};
use facethumb_vision::{Engine, VideoSource};
use image::{Rgb, RgbImage};
use ndarray::{s, Array4, ArrayD, IxDyn};

pub const FRAME_SIZE: u32 = 640;
pub const GRID: usize = 20;

/// One face on the 20x20 head: centred on cell (row, col), `half` cells each side.
#[derive(Debug, Clone, Copy)]
pub struct FakeFace {
    pub row: usize,
    pub col: usize,
    pub half: usize,
    pub confidence: f32,
}

impl FakeFace {
    /// Side in working-image pixels (stride 32)
    pub fn side(&self) -> i64 {
        (self.half as i64 * 2) * 32
    }
}

pub fn frame(code: u8) -> RgbImage {
    RgbImage::from_pixel(FRAME_SIZE, FRAME_SIZE, Rgb([code, code, code]))
}

fn logit(p: f32) -> f32 {
    (p / (1.0 - p)).ln()
}

pub fn head_with(faces: &[FakeFace]) -> Array4<f32> {
    let mut head = Array4::zeros((1, HEAD_CHANNELS, GRID, GRID));
    head.slice_mut(s![0, REG_MAX * 4, .., ..]).fill(-20.0);
    for f in faces {
        head[[0, REG_MAX * 4, f.row, f.col]] = logit(f.confidence);
        // every edge peaks sharply at `half`, so the box is symmetric about the cell centre
        for k in 0..4 {
            for n in 0..REG_MAX {
                head[[0, k * REG_MAX + n, f.row, f.col]] = if n == f.half { 50.0 } else { 0.0 };
            }
        }
    }
    head
}

/// Detector engine scripted by scene code
pub struct ScriptedDetector {
    pub scenes: HashMap<u8, Vec<FakeFace>>,
}

impl Engine for ScriptedDetector {
    fn infer(&mut self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        let code = (input[[0, 0, 320, 320]] * 255.0).round() as u8;
        let faces = self.scenes.get(&code).cloned().unwrap_or_default();
        Ok(vec![head_with(&faces).into_dyn()])
    }
}

/// Quality engine scripted by scene code
pub struct ScriptedQuality {
    pub scores: HashMap<u8, f32>,
}

impl Engine for ScriptedQuality {
    fn infer(&mut self, input: Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        // undo (v / 255 - 0.5) / 0.5
        let code = ((input[[0, 0, 56, 56]] + 1.0) / 2.0 * 255.0).round() as u8;
        let q = self.scores.get(&code).copied().unwrap_or(0.0);
        Ok(vec![ArrayD::from_shape_vec(IxDyn(&[1, 2]), vec![q, q])?])
    }
}

/// In-memory video; `None` entries fail to decode, seeking to `broken_seek` errors.
pub struct FakeVideo {
    pub frames: Vec<Option<u8>>,
    pub position: usize,
    pub broken_seek: Option<usize>,
    pub seeks: Arc<Mutex<Vec<usize>>>,
}

impl FakeVideo {
    pub fn new(frames: Vec<Option<u8>>) -> Self {
        Self {
            frames,
            position: 0,
            broken_seek: None,
            seeks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn uniform(frame_count: usize, code: u8) -> Self {
        Self::new(vec![Some(code); frame_count])
    }

    pub fn seeks(&self) -> Vec<usize> {
        self.seeks.lock().unwrap().clone()
    }
}

impl VideoSource for FakeVideo {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn seek(&mut self, frame: usize) -> Result<()> {
        self.seeks.lock().unwrap().push(frame);
        if self.broken_seek == Some(frame) {
            anyhow::bail!("cannot seek to frame {}", frame);
        }
        self.position = frame;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        let code = self.frames.get(self.position).copied().flatten();
        self.position += 1;
        Ok(code.map(frame))
    }
}
