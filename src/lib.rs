pub mod config;
pub mod report;

// Re-export vision types for convenience
pub use facethumb_vision::{thumbnailer, video, Candidate, Detection, Thumbnailer};
