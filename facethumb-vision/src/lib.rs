pub mod decode;
pub mod detector;
pub mod engine;
pub mod error;
pub mod filter;
pub mod geometry;
pub mod primitives;
pub mod quality;
pub mod thumbnailer;
pub mod video;

// Re-export commonly used types
pub use detector::{DetectorConfig, FaceDetector};
pub use engine::{Engine, ModelOptions};
pub use error::VisionError;
pub use quality::{QualityAssessment, QualityAssessor};
pub use thumbnailer::{Candidate, Detection, Thumbnailer, ThumbnailerConfig};
pub use video::{FfmpegVideo, VideoSource};
