use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, Result};
use image::RgbImage;
use serde::Deserialize;

use crate::error::VisionError;

/// Random-access frame source.
pub trait VideoSource {
    /// Total number of frames the container reports.
    fn frame_count(&self) -> usize;

    /// Position the source so the next [`read`](Self::read) returns `frame`.
    fn seek(&mut self, frame: usize) -> Result<()>;

    /// Decode the next frame. `None` means the stream is exhausted.
    fn read(&mut self) -> Result<Option<RgbImage>>;
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
    nb_frames: Option<String>,
    duration: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

/// Video file decoded through the `ffprobe`/`ffmpeg` command-line tools.
pub struct FfmpegVideo {
    path: PathBuf,
    width: u32,
    height: u32,
    fps: f64,
    frame_count: usize,
    position: usize,
}

impl FfmpegVideo {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        which::which("ffprobe").map_err(|_| VisionError::ToolNotFound("ffprobe"))?;
        which::which("ffmpeg").map_err(|_| VisionError::ToolNotFound("ffmpeg"))?;

        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .context("run ffprobe")?;

        if !output.status.success() {
            anyhow::bail!(
                "ffprobe failed on {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let probe: FfprobeOutput =
            serde_json::from_slice(&output.stdout).context("parse ffprobe output")?;
        let StreamInfo {
            width,
            height,
            fps,
            frame_count,
        } = StreamInfo::from_probe(&probe)
            .ok_or_else(|| anyhow::anyhow!("no video stream in {}", path.display()))?;

        log::debug!(
            "opened video: path={} width={} height={} fps={:.3} frames={}",
            path.display(),
            width,
            height,
            fps,
            frame_count
        );

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            fps,
            frame_count,
            position: 0,
        })
    }
}

impl VideoSource for FfmpegVideo {
    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn seek(&mut self, frame: usize) -> Result<()> {
        self.position = frame;
        Ok(())
    }

    fn read(&mut self) -> Result<Option<RgbImage>> {
        // an unknown frame count still gets a decode attempt
        if self.width == 0
            || self.height == 0
            || (self.frame_count > 0 && self.position >= self.frame_count)
        {
            return Ok(None);
        }

        let timestamp = format!("{:.6}", self.position as f64 / self.fps);
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-noautorotate", "-ss"])
            .arg(&timestamp)
            .arg("-i")
            .arg(&self.path)
            .args([
                "-frames:v",
                "1",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgb24",
                "-",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .context("run ffmpeg")?;

        if !output.status.success() {
            log::debug!(
                "ffmpeg failed at frame {}: {}",
                self.position,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(None);
        }

        let expected = (self.width * self.height * 3) as usize;
        let mut buf = output.stdout;
        if buf.len() < expected {
            log::debug!(
                "short frame at {}: got {} bytes, expected {}",
                self.position,
                buf.len(),
                expected
            );
            return Ok(None);
        }
        buf.truncate(expected);

        self.position += 1;
        Ok(RgbImage::from_raw(self.width, self.height, buf))
    }
}

/// What the first video stream tells us about geometry and length.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StreamInfo {
    width: u32,
    height: u32,
    fps: f64,
    frame_count: usize,
}

impl StreamInfo {
    /// Frame count comes from `nb_frames`, else stream duration × fps, else
    /// container duration × fps (Matroska/WebM only carry the latter).
    fn from_probe(probe: &FfprobeOutput) -> Option<Self> {
        let stream = probe.streams.first()?;
        let fps = stream
            .avg_frame_rate
            .as_deref()
            .and_then(parse_frame_rate)
            .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
            .unwrap_or(30.0);

        let frames_for = |duration: Option<&str>| {
            let duration = duration?.parse::<f64>().ok()?;
            (duration.is_finite() && duration > 0.0).then(|| (duration * fps).round() as usize)
        };
        let frame_count = stream
            .nb_frames
            .as_deref()
            .and_then(|n| n.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .or_else(|| frames_for(stream.duration.as_deref()))
            .or_else(|| frames_for(probe.format.as_ref()?.duration.as_deref()))
            .unwrap_or(0);

        Some(Self {
            width: stream.width.unwrap_or(0),
            height: stream.height.unwrap_or(0),
            fps,
            frame_count,
        })
    }
}

/// Parse an ffprobe rational like `30000/1001`.
fn parse_frame_rate(rate: &str) -> Option<f64> {
    let fps = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("garbage"), None);
    }

    #[test]
    fn test_parse_ffprobe_stream() {
        let raw = r#"{"streams":[{"index":0,"codec_type":"video","width":1920,"height":1080,
            "avg_frame_rate":"25/1","r_frame_rate":"25/1","nb_frames":"800","duration":"32.000000"}]}"#;
        let probe: FfprobeOutput = serde_json::from_str(raw).unwrap();
        let stream = &probe.streams[0];
        assert_eq!(stream.width, Some(1920));
        assert_eq!(stream.nb_frames.as_deref(), Some("800"));

        let info = StreamInfo::from_probe(&probe).unwrap();
        assert_eq!(info.frame_count, 800);
        assert_eq!((info.width, info.height), (1920, 1080));
    }

    #[test]
    fn test_matroska_falls_back_to_container_duration() {
        let raw = r#"{"streams":[{"index":0,"codec_type":"video","width":1280,"height":720,
            "avg_frame_rate":"25/1","r_frame_rate":"25/1","tags":{"DURATION":"00:00:32.000000000"}}],
            "format":{"format_name":"matroska,webm","duration":"32.000000"}}"#;
        let probe: FfprobeOutput = serde_json::from_str(raw).unwrap();
        let info = StreamInfo::from_probe(&probe).unwrap();
        assert_eq!(info.frame_count, 800);
        assert_eq!(info.fps, 25.0);
    }

    #[test]
    fn test_stream_duration_beats_container() {
        let raw = r#"{"streams":[{"width":640,"height":480,"avg_frame_rate":"0/0",
            "r_frame_rate":"10/1","duration":"5.0"}],"format":{"duration":"9.0"}}"#;
        let probe: FfprobeOutput = serde_json::from_str(raw).unwrap();
        let info = StreamInfo::from_probe(&probe).unwrap();
        assert_eq!(info.fps, 10.0);
        assert_eq!(info.frame_count, 50);
    }

    #[test]
    fn test_no_length_information() {
        let raw = r#"{"streams":[{"width":640,"height":480}]}"#;
        let probe: FfprobeOutput = serde_json::from_str(raw).unwrap();
        assert_eq!(StreamInfo::from_probe(&probe).unwrap().frame_count, 0);

        let empty: FfprobeOutput = serde_json::from_str(r#"{"streams":[]}"#).unwrap();
        assert!(StreamInfo::from_probe(&empty).is_none());
    }
}
