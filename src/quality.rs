// Quality profiles and the directive compiler
//
// Translates user-facing quality knobs into stream-selection expressions and
// post-processing steps for the resolver. Selection syntax follows yt-dlp
// format-spec conventions; the resolver is responsible for translating the
// structured steps into tool flags.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::filter::DEFAULT_MIN_MOTION_FPS;
use crate::models::RunMode;

/// How video output is produced.
///
/// `Compat` constrains selection so no re-encode is needed; `Reencode` takes
/// the best streams and transcodes them. The trade-off is deliberate and
/// user-visible: zero transcode cost versus guaranteed output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoMode {
    #[default]
    Compat,
    Reencode,
}

/// Target video codec. Only H.264 is produced today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    #[default]
    H264,
}

/// x264 encoder presets, slowest-to-fastest trade-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum X264Preset {
    Ultrafast,
    Superfast,
    Veryfast,
    Faster,
    Fast,
    #[default]
    Medium,
    Slow,
    Slower,
    Veryslow,
}

impl X264Preset {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ultrafast => "ultrafast",
            Self::Superfast => "superfast",
            Self::Veryfast => "veryfast",
            Self::Faster => "faster",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
            Self::Slower => "slower",
            Self::Veryslow => "veryslow",
        }
    }
}

impl fmt::Display for X264Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub const AUDIO_BITRATES_KBPS: [u32; 5] = [128, 160, 192, 256, 320];
pub const AUDIO_SAMPLE_RATES_HZ: [u32; 2] = [44_100, 48_000];
pub const VIDEO_MAX_HEIGHTS: [u32; 3] = [360, 480, 720];
pub const VIDEO_FPS_CAPS: [u32; 3] = [24, 25, 30];
pub const VIDEO_CRF_RANGE: std::ops::RangeInclusive<u8> = 18..=28;

/// Immutable per-run quality configuration.
///
/// Created once from user settings before a run starts; never mutated
/// mid-run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityProfile {
    pub audio_bitrate_kbps: u32,
    pub audio_sample_rate_hz: u32,
    pub audio_channels: u8,
    pub video_mode: VideoMode,
    pub video_codec: VideoCodec,
    pub video_max_height: u32,
    pub video_fps: u32,
    pub video_crf: u8,
    pub video_preset: X264Preset,
    pub video_audio_bitrate_kbps: u32,
}

impl Default for QualityProfile {
    fn default() -> Self {
        Self {
            audio_bitrate_kbps: 320,
            audio_sample_rate_hz: 44_100,
            audio_channels: 2,
            video_mode: VideoMode::Compat,
            video_codec: VideoCodec::H264,
            video_max_height: 480,
            video_fps: 30,
            video_crf: 23,
            video_preset: X264Preset::Medium,
            video_audio_bitrate_kbps: 192,
        }
    }
}

impl QualityProfile {
    /// Check every numeric field against its enumerated domain.
    ///
    /// UI layers populate profiles from fixed choice lists, so a violation
    /// here indicates a programming error, not user input.
    pub fn validate(&self) -> Result<(), String> {
        if !AUDIO_BITRATES_KBPS.contains(&self.audio_bitrate_kbps) {
            return Err(format!("unsupported audio bitrate: {}k", self.audio_bitrate_kbps));
        }
        if !AUDIO_SAMPLE_RATES_HZ.contains(&self.audio_sample_rate_hz) {
            return Err(format!("unsupported sample rate: {}", self.audio_sample_rate_hz));
        }
        if !(1..=2).contains(&self.audio_channels) {
            return Err(format!("unsupported channel count: {}", self.audio_channels));
        }
        if !VIDEO_MAX_HEIGHTS.contains(&self.video_max_height) {
            return Err(format!("unsupported max height: {}", self.video_max_height));
        }
        if !VIDEO_FPS_CAPS.contains(&self.video_fps) {
            return Err(format!("unsupported fps cap: {}", self.video_fps));
        }
        if !VIDEO_CRF_RANGE.contains(&self.video_crf) {
            return Err(format!("CRF out of range: {}", self.video_crf));
        }
        Ok(())
    }
}

/// One post-processing step applied after stream materialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PostProcessing {
    /// Convert to a lossy audio file at the given parameters
    ExtractAudio {
        codec: String,
        bitrate_kbps: u32,
        sample_rate_hz: u32,
        channels: u8,
    },
    /// Copy source tags into the output container
    EmbedMetadata,
    /// Embed thumbnail art when the source provides one
    EmbedThumbnail,
    /// Rewrap streams without re-encoding; faststart moves the container
    /// index to the front for progressive playback
    Remux { container: String, faststart: bool },
    /// Full transcode to H.264/AAC
    Reencode {
        max_height: u32,
        fps: u32,
        crf: u8,
        preset: X264Preset,
        audio_bitrate_kbps: u32,
        faststart: bool,
    },
}

/// Compiled instructions handed to the resolver for every item of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterializationDirectives {
    /// yt-dlp format selection expression
    pub format_spec: String,
    /// Container to merge separate streams into, when applicable
    pub merge_container: Option<String>,
    pub postprocessing: Vec<PostProcessing>,
}

impl MaterializationDirectives {
    /// True when any step performs a re-encode.
    pub fn requests_reencode(&self) -> bool {
        self.postprocessing
            .iter()
            .any(|p| matches!(p, PostProcessing::Reencode { .. }))
    }
}

/// Compile a quality profile into concrete materialization directives.
///
/// Pure: identical inputs always yield structurally identical output.
pub fn compile(mode: RunMode, profile: &QualityProfile) -> MaterializationDirectives {
    match mode {
        RunMode::Audio => compile_audio(profile),
        RunMode::Video => match profile.video_mode {
            VideoMode::Compat => compile_video_compat(profile),
            VideoMode::Reencode => compile_video_reencode(profile),
        },
    }
}

fn compile_audio(profile: &QualityProfile) -> MaterializationDirectives {
    MaterializationDirectives {
        format_spec: "bestaudio/best".to_string(),
        merge_container: None,
        postprocessing: vec![
            PostProcessing::ExtractAudio {
                codec: "mp3".to_string(),
                bitrate_kbps: profile.audio_bitrate_kbps,
                sample_rate_hz: profile.audio_sample_rate_hz,
                channels: profile.audio_channels,
            },
            PostProcessing::EmbedMetadata,
            PostProcessing::EmbedThumbnail,
        ],
    }
}

fn compile_video_compat(profile: &QualityProfile) -> MaterializationDirectives {
    // H.264-family selection with an fps floor to exclude slideshow uploads
    // and M4A audio for container-native pairing. Falls back to a combined
    // mp4 stream when no separate pair satisfies the caps.
    let h = profile.video_max_height;
    let fps = profile.video_fps;
    let floor = DEFAULT_MIN_MOTION_FPS as u32;
    let format_spec = format!(
        "bv*[vcodec~='(?i)(?:avc1|h264|x264)'][fps>={floor}][height<={h}][fps<={fps}]\
         +ba[ext=m4a]/b[ext=mp4][vcodec~='(?i)(?:avc1|h264|x264)'][fps>={floor}][height<={h}]"
    );
    MaterializationDirectives {
        format_spec,
        merge_container: Some("mp4".to_string()),
        postprocessing: vec![
            PostProcessing::Remux {
                container: "mp4".to_string(),
                faststart: true,
            },
            PostProcessing::EmbedMetadata,
        ],
    }
}

fn compile_video_reencode(profile: &QualityProfile) -> MaterializationDirectives {
    MaterializationDirectives {
        format_spec: "bestvideo*+bestaudio/best".to_string(),
        merge_container: Some("mp4".to_string()),
        postprocessing: vec![
            PostProcessing::Reencode {
                max_height: profile.video_max_height,
                fps: profile.video_fps,
                crf: profile.video_crf,
                preset: profile.video_preset,
                audio_bitrate_kbps: profile.video_audio_bitrate_kbps,
                faststart: true,
            },
            PostProcessing::EmbedMetadata,
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_is_pure() {
        let profile = QualityProfile::default();
        assert_eq!(
            compile(RunMode::Audio, &profile),
            compile(RunMode::Audio, &profile)
        );
        assert_eq!(
            compile(RunMode::Video, &profile),
            compile(RunMode::Video, &profile)
        );
    }

    #[test]
    fn audio_directives_carry_profile_values() {
        let profile = QualityProfile {
            audio_bitrate_kbps: 192,
            audio_sample_rate_hz: 48_000,
            audio_channels: 1,
            ..Default::default()
        };
        let directives = compile(RunMode::Audio, &profile);
        assert_eq!(directives.format_spec, "bestaudio/best");
        assert!(matches!(
            directives.postprocessing[0],
            PostProcessing::ExtractAudio {
                bitrate_kbps: 192,
                sample_rate_hz: 48_000,
                channels: 1,
                ..
            }
        ));
        assert!(directives
            .postprocessing
            .contains(&PostProcessing::EmbedThumbnail));
    }

    #[test]
    fn compat_never_reencodes() {
        let profile = QualityProfile::default();
        let directives = compile(RunMode::Video, &profile);
        assert!(!directives.requests_reencode());
        assert!(directives.format_spec.contains("height<=480"));
        assert!(directives.format_spec.contains("fps>=12"));
        assert!(directives.format_spec.contains("fps<=30"));
        assert_eq!(directives.merge_container.as_deref(), Some("mp4"));
    }

    #[test]
    fn reencode_always_has_crf_and_preset() {
        let profile = QualityProfile {
            video_mode: VideoMode::Reencode,
            video_crf: 20,
            video_preset: X264Preset::Slow,
            ..Default::default()
        };
        let directives = compile(RunMode::Video, &profile);
        assert!(directives.requests_reencode());
        assert!(matches!(
            directives.postprocessing[0],
            PostProcessing::Reencode {
                crf: 20,
                preset: X264Preset::Slow,
                faststart: true,
                ..
            }
        ));
        // selection is unconstrained in reencode mode
        assert_eq!(directives.format_spec, "bestvideo*+bestaudio/best");
    }

    #[test]
    fn default_profile_validates() {
        assert!(QualityProfile::default().validate().is_ok());
        let bad = QualityProfile {
            video_crf: 40,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
