// Common data models for the download engine

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// What kind of output a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Audio,
    Video,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => write!(f, "audio"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// One encoded stream as reported by the resolver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamFormat {
    #[serde(default)]
    pub format_id: String,
    #[serde(default)]
    pub ext: String,
    /// Video codec identifier, or "none" for audio-only streams
    pub vcodec: Option<String>,
    /// Audio codec identifier, or "none" for video-only streams
    pub acodec: Option<String>,
    pub fps: Option<f32>,
    pub height: Option<u32>,
    pub width: Option<u32>,
    pub filesize: Option<u64>,
}

impl StreamFormat {
    /// True when this stream carries a video track.
    pub fn has_video(&self) -> bool {
        self.vcodec.as_deref().is_some_and(|v| v != "none" && !v.is_empty())
    }

    /// True when this stream carries an audio track.
    pub fn has_audio(&self) -> bool {
        self.acodec.as_deref().is_some_and(|a| a != "none" && !a.is_empty())
    }
}

/// Per-item metadata returned by `MediaResolver::resolve`.
///
/// Read once to drive filtering and then discarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub title: String,
    /// Uploader or channel name; resolvers fall back from channel to uploader
    #[serde(default)]
    pub uploader: String,
    #[serde(default)]
    pub duration_seconds: u64,
    #[serde(default)]
    pub webpage_url: String,
    #[serde(default)]
    pub formats: Vec<StreamFormat>,
}

/// Stage of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStage {
    Downloading,
    Finished,
}

/// Normalized progress event forwarded to the progress sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    /// 0.0..=100.0
    pub percent: f32,
    pub bytes_per_second: f64,
    pub eta_seconds: u64,
    /// Item title or file name, whichever the resolver knows
    pub label: String,
}

impl ProgressEvent {
    pub fn finished(label: impl Into<String>) -> Self {
        Self {
            stage: ProgressStage::Finished,
            percent: 100.0,
            bytes_per_second: 0.0,
            eta_seconds: 0,
            label: label.into(),
        }
    }

    /// Clamp percent into the 0..=100 range resolvers sometimes overshoot.
    pub fn clamped(mut self) -> Self {
        self.percent = self.percent.clamp(0.0, 100.0);
        self
    }
}

/// Aggregate outcome of one run, handed to the completion sink exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub mode: RunMode,
    /// Output paths in completion order
    pub completed_files: Vec<PathBuf>,
    pub succeeded: u32,
    pub failed: u32,
    pub output_dir: PathBuf,
}

impl RunResult {
    pub fn new(mode: RunMode, output_dir: PathBuf) -> Self {
        Self {
            mode,
            completed_files: Vec::new(),
            succeeded: 0,
            failed: 0,
            output_dir,
        }
    }
}

/// Default download destination, mirroring the desktop app's behavior.
pub fn default_output_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_track_flags() {
        let audio_only = StreamFormat {
            vcodec: Some("none".into()),
            acodec: Some("mp4a.40.2".into()),
            ..Default::default()
        };
        assert!(!audio_only.has_video());
        assert!(audio_only.has_audio());

        let video_only = StreamFormat {
            vcodec: Some("avc1.4d401f".into()),
            acodec: Some("none".into()),
            ..Default::default()
        };
        assert!(video_only.has_video());
        assert!(!video_only.has_audio());

        assert!(!StreamFormat::default().has_video());
    }

    #[test]
    fn percent_is_clamped() {
        let ev = ProgressEvent {
            stage: ProgressStage::Downloading,
            percent: 104.2,
            bytes_per_second: 0.0,
            eta_seconds: 0,
            label: String::new(),
        };
        assert_eq!(ev.clamped().percent, 100.0);
    }
}
