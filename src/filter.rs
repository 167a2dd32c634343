// Low-value stream filter
//
// Decides whether a resolved video result is likely a static-image or
// audio-only upload that would waste a video download slot. Only consulted
// for video-mode runs; in audio mode such uploads are exactly what we want.

use crate::models::MediaInfo;

/// Frame rates below this are treated as slideshow/static uploads.
///
/// Hand-tuned in the field, like the phrase lists; kept configurable on
/// `StaticFilter` rather than baked in.
pub const DEFAULT_MIN_MOTION_FPS: f32 = 12.0;

const DEFAULT_TITLE_MARKERS: [&str; 5] = [
    "official audio",
    "art track",
    "visualizer",
    "audio only",
    "static image",
];

/// Channel suffix used by auto-generated music-label channels that publish
/// audio-only "art track" uploads.
const DEFAULT_TOPIC_SUFFIX: &str = " - topic";

#[derive(Debug, Clone)]
pub struct StaticFilter {
    title_markers: Vec<String>,
    topic_suffix: String,
    min_motion_fps: f32,
}

impl Default for StaticFilter {
    fn default() -> Self {
        Self {
            title_markers: DEFAULT_TITLE_MARKERS.iter().map(|s| s.to_string()).collect(),
            topic_suffix: DEFAULT_TOPIC_SUFFIX.to_string(),
            min_motion_fps: DEFAULT_MIN_MOTION_FPS,
        }
    }
}

impl StaticFilter {
    pub fn with_min_motion_fps(mut self, fps: f32) -> Self {
        self.min_motion_fps = fps;
        self
    }

    pub fn with_title_markers(mut self, markers: Vec<String>) -> Self {
        self.title_markers = markers;
        self
    }

    /// Heuristic check, first match wins. Never fails; unknown fields are
    /// treated as absent.
    pub fn is_likely_static(&self, info: &MediaInfo) -> bool {
        let title = info.title.to_lowercase();
        if self.title_markers.iter().any(|m| title.contains(m.as_str())) {
            return true;
        }

        let channel = info.uploader.to_lowercase();
        if channel.ends_with(&self.topic_suffix) {
            return true;
        }

        if !info.formats.is_empty() && info.formats.iter().all(|f| !f.has_video()) {
            return true;
        }

        let max_fps = info
            .formats
            .iter()
            .filter(|f| f.has_video())
            .filter_map(|f| f.fps)
            .fold(0.0f32, f32::max);
        max_fps > 0.0 && max_fps < self.min_motion_fps
    }
}
