use anyhow::{Context, Result};
use facethumb_vision::{
    thumbnailer::{DEFAULT_PROBES, DEFAULT_QUALITY_CAP},
    DetectorConfig, ModelOptions, ThumbnailerConfig,
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(
        option_env!("FACETHUMB_CONFIG_PATH").unwrap_or("/usr/local/etc/facethumb/config.toml"),
    )
});

pub static MODEL_PREFIX: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("FACETHUMB_MODEL_PREFIX").unwrap_or("/usr/local/share/facethumb"))
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detect_model: PathBuf,
    /// Without a quality model frames are ranked by confidence alone.
    /// Leaving the key out of a config file disables assessment.
    #[serde(default)]
    pub assess_model: Option<PathBuf>,
    /// Inference threads per model; unset leaves the runtime default
    pub threads: Option<usize>,
    pub probes: usize,
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub quality_cap: f32,
}

impl Default for Config {
    fn default() -> Self {
        let detector = DetectorConfig::default();
        Self {
            detect_model: MODEL_PREFIX.join("yolov8n-face.onnx"),
            assess_model: Some(MODEL_PREFIX.join("face-quality-assessment.onnx")),
            threads: None,
            probes: DEFAULT_PROBES,
            confidence_threshold: detector.confidence_threshold,
            nms_threshold: detector.nms_threshold,
            quality_cap: DEFAULT_QUALITY_CAP,
        }
    }
}

impl Config {
    pub fn thumbnailer_config(&self) -> ThumbnailerConfig {
        ThumbnailerConfig {
            detector: DetectorConfig {
                confidence_threshold: self.confidence_threshold,
                nms_threshold: self.nms_threshold,
            },
            quality_cap: self.quality_cap,
            model: ModelOptions {
                threads: self.threads,
            },
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let cfg = load_config(Some(Path::new("/nonexistent/facethumb.toml"))).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.probes, 8);
        assert_eq!(cfg.confidence_threshold, 0.6);
        assert_eq!(cfg.nms_threshold, 0.5);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "probes = 12\nquality_cap = 0.7\nthreads = 2\n").unwrap();

        let cfg = load_config(Some(&path)).unwrap();
        assert_eq!(cfg.probes, 12);
        assert_eq!(cfg.quality_cap, 0.7);
        assert_eq!(cfg.threads, Some(2));
        assert_eq!(cfg.nms_threshold, 0.5);
        assert_eq!(cfg.assess_model, None);

        let t = cfg.thumbnailer_config();
        assert_eq!(t.model.threads, Some(2));
        assert_eq!(t.quality_cap, 0.7);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let cfg = Config {
            assess_model: None,
            ..Config::default()
        };
        save_config(&cfg, Some(&path)).unwrap();
        assert_eq!(load_config(Some(&path)).unwrap(), cfg);
    }
}
