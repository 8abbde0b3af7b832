use std::io::Cursor;
use std::path::Path;

use anyhow::{Context, Result};
use image::{codecs::jpeg::JpegEncoder, ImageFormat, RgbImage};

use crate::decode::NUM_KEYPOINTS;
use crate::detector::{DetectorConfig, DetectorOutput, FaceDetector};
use crate::engine::{self, Engine, ModelOptions};
use crate::error::VisionError;
use crate::geometry::{PixelRect, Point};
use crate::primitives::image_scale;
use crate::quality::{QualityAssessment, QualityAssessor};
use crate::video::{FfmpegVideo, VideoSource};

pub const DEFAULT_PROBES: usize = 8;
pub const DEFAULT_QUALITY_CAP: f32 = 0.4;

/// A frame qualifies only when its faces cover more than this many pixels.
pub const MIN_CANDIDATE_AREA: i64 = 10_000;

/// Detection-only mode returns at most this many faces.
pub const MAX_IMAGE_RESULTS: usize = 16;

pub const THUMBNAIL_WIDTH: u32 = 960;
pub const THUMBNAIL_HEIGHT: u32 = 540;
const JPEG_QUALITY: u8 = 95;

/// One face, in original-image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub area: i64,
    pub confidence: f32,
    /// 0 when quality assessment is disabled
    pub quality: f32,
    pub bbox: PixelRect,
    pub landmarks: [Point; NUM_KEYPOINTS],
}

impl Detection {
    /// Combined face score: `sqrt(area) * confidence * quality`.
    pub fn score(&self) -> f32 {
        (self.area.max(0) as f32).sqrt() * self.confidence * self.quality
    }
}

/// A sampled frame with its faces folded into one signal.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub image: RgbImage,
    pub frame_index: usize,
    /// Best face quality in the frame
    pub quality: f32,
    /// Best face confidence in the frame
    pub confidence: f32,
    /// Sum of face areas in the frame
    pub total_area: i64,
}

impl Candidate {
    pub fn aggregate(image: RgbImage, frame_index: usize, detections: &[Detection]) -> Self {
        let mut candidate = Candidate {
            image,
            frame_index,
            quality: 0.0,
            confidence: 0.0,
            total_area: 0,
        };
        for d in detections {
            candidate.quality = candidate.quality.max(d.quality);
            candidate.confidence = candidate.confidence.max(d.confidence);
            candidate.total_area += d.area;
        }
        candidate
    }

    pub fn is_eligible(&self) -> bool {
        self.total_area > MIN_CANDIDATE_AREA
    }

    /// Ranking score. Quality saturates at `quality_cap`; without a cap
    /// (quality assessment disabled) confidence alone decides.
    pub fn score(&self, quality_cap: Option<f32>) -> f32 {
        match quality_cap {
            Some(cap) => self.confidence * self.quality.min(cap),
            None => self.confidence,
        }
    }
}

/// Frame indices probed for a video of `frame_count` frames.
///
/// `stride = frame_count / probes`, `offset = stride / 2`, probe `i` lands on
/// `offset + i * stride`. When there are fewer frames than probes the stride
/// is 0 and every probe lands on frame 0, which is visited once.
pub fn probe_positions(frame_count: usize, probes: usize) -> Vec<usize> {
    if probes == 0 {
        return Vec::new();
    }
    let stride = frame_count / probes;
    let offset = stride / 2;
    let mut positions: Vec<usize> = (0..probes).map(|i| offset + i * stride).collect();
    positions.dedup();
    positions
}

/// Sort best first. Equal scores keep frame order.
pub fn rank(candidates: &mut [Candidate], quality_cap: Option<f32>) {
    candidates.sort_by(|a, b| b.score(quality_cap).total_cmp(&a.score(quality_cap)));
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThumbnailerConfig {
    pub detector: DetectorConfig,
    pub quality_cap: f32,
    pub model: ModelOptions,
}

impl Default for ThumbnailerConfig {
    fn default() -> Self {
        Self {
            detector: DetectorConfig::default(),
            quality_cap: DEFAULT_QUALITY_CAP,
            model: ModelOptions::default(),
        }
    }
}

/// Full pipeline: sample frames → detect → assess → rank → write
pub struct Thumbnailer {
    detector: FaceDetector,
    quality: QualityAssessment,
    quality_cap: f32,
}

impl Thumbnailer {
    /// Load the detection model and, when given, the quality model.
    pub fn init(
        path_detect: &Path,
        path_assess: Option<&Path>,
        config: &ThumbnailerConfig,
    ) -> Result<Self> {
        let detect = engine::load_session(path_detect, config.model)
            .context("load detection model")?;
        let assess = match path_assess {
            Some(path) => Some(Box::new(
                engine::load_session(path, config.model).context("load quality model")?,
            ) as Box<dyn Engine>),
            None => None,
        };
        Ok(Self::with_engines(Box::new(detect), assess, config))
    }

    pub fn with_engines(
        detect: Box<dyn Engine>,
        assess: Option<Box<dyn Engine>>,
        config: &ThumbnailerConfig,
    ) -> Self {
        let quality = match assess {
            Some(engine) => QualityAssessment::Enabled(QualityAssessor::new(engine)),
            None => QualityAssessment::Disabled,
        };
        Self {
            detector: FaceDetector::new(detect, config.detector),
            quality,
            quality_cap: config.quality_cap,
        }
    }

    fn ranking_cap(&self) -> Option<f32> {
        self.quality.is_enabled().then_some(self.quality_cap)
    }

    /// Detect every face in `img`, assess each one, and map boxes back to `img`.
    pub fn find(&mut self, img: &RgbImage) -> Result<Vec<Detection>> {
        let DetectorOutput { working, proposals } =
            self.detector.detect(img).context("detecting faces")?;

        let mut detections = Vec::with_capacity(proposals.len());
        for p in proposals {
            let quality = if self.quality.is_enabled() {
                match p.box_scaled.clip(working.image.width(), working.image.height()) {
                    Some(r) => {
                        let face = image::imageops::crop_imm(
                            &working.image,
                            r.x as u32,
                            r.y as u32,
                            r.width as u32,
                            r.height as u32,
                        )
                        .to_image();
                        self.quality.assess(&face).context("assessing face")?
                    }
                    None => {
                        log::warn!("face box {:?} lies outside the working image", p.box_scaled);
                        0.0
                    }
                }
            } else {
                0.0
            };

            let bbox = working.letterbox.map_rect(&p.box_scaled);
            let landmarks = p.landmarks_scaled.map(|pt| working.letterbox.map_point(pt));
            detections.push(Detection {
                area: bbox.area(),
                confidence: p.confidence(),
                quality,
                bbox,
                landmarks,
            });
        }

        Ok(detections)
    }

    /// Probe `video` and return the best qualifying frame, if any.
    ///
    /// Sampling stops at the first frame that cannot be sought or decoded;
    /// frames gathered before that still compete.
    pub fn select<V: VideoSource + ?Sized>(
        &mut self,
        video: &mut V,
        probes: usize,
    ) -> Result<Option<Candidate>> {
        if probes == 0 {
            return Err(VisionError::InvalidProbes.into());
        }

        let mut candidates = Vec::new();
        for frame_index in probe_positions(video.frame_count(), probes) {
            let frame = match video.seek(frame_index).and_then(|_| video.read()) {
                Ok(Some(frame)) if frame.width() > 0 && frame.height() > 0 => frame,
                Ok(_) => {
                    log::debug!("frame {}: end of stream", frame_index);
                    break;
                }
                Err(e) => {
                    log::debug!("frame {}: {:#}, stopping", frame_index, e);
                    break;
                }
            };

            let detections = self.find(&frame)?;
            if detections.is_empty() {
                log::debug!("frame {}: no faces", frame_index);
                continue;
            }

            let candidate = Candidate::aggregate(frame, frame_index, &detections);
            log::debug!(
                "frame {}: faces={} confidence={:.3} quality={:.3} area={}",
                frame_index,
                detections.len(),
                candidate.confidence,
                candidate.quality,
                candidate.total_area
            );
            if candidate.is_eligible() {
                candidates.push(candidate);
            }
        }

        rank(&mut candidates, self.ranking_cap());
        Ok(candidates.into_iter().next())
    }

    /// Write a thumbnail for the video at `video_path` to `out_path`.
    ///
    /// Returns `false`, writing nothing, when no frame qualifies.
    pub fn run(&mut self, video_path: &Path, out_path: &Path, probes: usize) -> Result<bool> {
        let mut video = FfmpegVideo::open(video_path)
            .with_context(|| format!("opening video {}", video_path.display()))?;
        self.run_source(&mut video, out_path, probes)
    }

    pub fn run_source<V: VideoSource + ?Sized>(
        &mut self,
        video: &mut V,
        out_path: &Path,
        probes: usize,
    ) -> Result<bool> {
        match self.select(video, probes)? {
            Some(best) => {
                log::info!(
                    "selected frame {} (confidence {:.3}, quality {:.3})",
                    best.frame_index,
                    best.confidence,
                    best.quality
                );
                write_thumbnail(&best.image, out_path)?;
                Ok(true)
            }
            None => {
                log::info!("no qualifying face found");
                Ok(false)
            }
        }
    }

    /// Detection-only mode over an image file.
    pub fn run_image(&mut self, path: &Path) -> Result<Vec<Detection>> {
        let img = image::open(path)
            .map_err(|e| VisionError::ImageDecode(format!("{}: {}", path.display(), e)))?;
        self.detect_only(&img.to_rgb8())
    }

    /// Detection-only mode over an encoded image in memory.
    pub fn run_image_buf(&mut self, buf: &[u8]) -> Result<Vec<Detection>> {
        let img =
            image::load_from_memory(buf).map_err(|e| VisionError::ImageDecode(e.to_string()))?;
        self.detect_only(&img.to_rgb8())
    }

    fn detect_only(&mut self, img: &RgbImage) -> Result<Vec<Detection>> {
        let mut detections = self.find(img)?;
        detections.truncate(MAX_IMAGE_RESULTS);
        Ok(detections)
    }
}

/// Shrink (or grow) to fit 960x540 and encode by the path's extension.
pub fn write_thumbnail(img: &RgbImage, path: &Path) -> Result<()> {
    let scaled = image_scale(img, THUMBNAIL_WIDTH, THUMBNAIL_HEIGHT);
    let format = ImageFormat::from_path(path)
        .with_context(|| format!("unknown image format for {}", path.display()))?;

    let mut buf = Vec::new();
    if format == ImageFormat::Jpeg {
        JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(&scaled)?;
    } else {
        scaled.write_to(&mut Cursor::new(&mut buf), format)?;
    }
    std::fs::write(path, buf).with_context(|| format!("writing {}", path.display()))
}
