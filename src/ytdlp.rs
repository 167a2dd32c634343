// yt-dlp backed MediaResolver
//
// Spawns the yt-dlp binary for metadata resolution (--dump-json) and for
// materialization, translating `MaterializationDirectives` into CLI flags
// and parsing --newline progress output into normalized events.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::DownloadError;
use crate::models::{MediaInfo, ProgressEvent, ProgressStage, StreamFormat};
use crate::quality::{MaterializationDirectives, PostProcessing};
use crate::resolver::{MediaResolver, ResolverSettings};

// Find yt-dlp executable in common install locations
fn find_ytdlp() -> String {
    let common_paths = [
        "/opt/homebrew/bin/yt-dlp",
        "/usr/local/bin/yt-dlp",
        "/usr/bin/yt-dlp",
    ];

    for path in common_paths {
        if std::path::Path::new(path).exists() {
            return path.to_string();
        }
    }

    if let Ok(output) = std::process::Command::new("which").arg("yt-dlp").output() {
        if output.status.success() {
            if let Ok(path) = String::from_utf8(output.stdout) {
                let trimmed = path.trim();
                if !trimmed.is_empty() {
                    return trimmed.to_string();
                }
            }
        }
    }

    // Last resort: hope it's in PATH
    "yt-dlp".to_string()
}

/// What one stdout line of a running download told us.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum OutputLine {
    Progress {
        percent: f32,
        bytes_per_second: f64,
        eta_seconds: u64,
    },
    /// A new download target was announced
    Destination(PathBuf),
    /// A post-processor rewrote the output into a new file
    PostProcessed(PathBuf),
    /// Separate streams were merged into one container
    Merged(PathBuf),
    /// The archive ledger already contains this item
    AlreadyDownloaded(Option<PathBuf>),
}

lazy_static! {
    // [download]   6.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32 (frag 29/454)
    static ref PROGRESS_RE: Regex = Regex::new(
        r"\[download\]\s+(\d+\.?\d*)%\s+of\s+~?\s*[\d.]+\s*\w+\s+at\s+([\d.]+\s*\w+)/s(?:\s+ETA\s+(\S+))?"
    )
    .unwrap();
    static ref DEST_RE: Regex = Regex::new(r"\[download\]\s+Destination:\s+(.+)").unwrap();
    static ref PP_DEST_RE: Regex =
        Regex::new(r"\[(?:ExtractAudio|VideoConvertor|VideoRemuxer)\]\s+Destination:\s+(.+)")
            .unwrap();
    static ref MERGE_RE: Regex =
        Regex::new(r#"\[Merger\]\s+Merging formats into "(.+)""#).unwrap();
    static ref ALREADY_RE: Regex =
        Regex::new(r"\[download\]\s+(.+?)\s+has already been downloaded").unwrap();
}

/// Parse a transfer rate like "420.30KiB" (the "/s" suffix is stripped by
/// the caller's regex) into bytes per second.
pub(crate) fn parse_rate(rate: &str) -> f64 {
    let rate = rate.trim();
    let split = rate
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(rate.len());
    let value: f64 = rate[..split].trim().parse().unwrap_or(0.0);
    let multiplier = match rate[split..].trim() {
        "B" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    };
    value * multiplier
}

/// Parse an ETA clock like "12:32" or "1:02:03" into seconds.
pub(crate) fn parse_clock(clock: &str) -> u64 {
    let mut seconds = 0u64;
    for part in clock.split(':') {
        match part.parse::<u64>() {
            Ok(v) => seconds = seconds * 60 + v,
            Err(_) => return 0,
        }
    }
    seconds
}

pub(crate) fn parse_output_line(line: &str) -> Option<OutputLine> {
    if let Some(caps) = PROGRESS_RE.captures(line) {
        let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
        let bytes_per_second = caps.get(2).map(|m| parse_rate(m.as_str())).unwrap_or(0.0);
        let eta_seconds = caps.get(3).map(|m| parse_clock(m.as_str())).unwrap_or(0);
        return Some(OutputLine::Progress {
            percent,
            bytes_per_second,
            eta_seconds,
        });
    }
    if let Some(caps) = PP_DEST_RE.captures(line) {
        return Some(OutputLine::PostProcessed(PathBuf::from(
            caps.get(1)?.as_str().trim(),
        )));
    }
    if let Some(caps) = DEST_RE.captures(line) {
        return Some(OutputLine::Destination(PathBuf::from(
            caps.get(1)?.as_str().trim(),
        )));
    }
    if let Some(caps) = MERGE_RE.captures(line) {
        return Some(OutputLine::Merged(PathBuf::from(caps.get(1)?.as_str())));
    }
    if let Some(caps) = ALREADY_RE.captures(line) {
        return Some(OutputLine::AlreadyDownloaded(Some(PathBuf::from(
            caps.get(1)?.as_str(),
        ))));
    }
    if line.contains("has already been downloaded") {
        return Some(OutputLine::AlreadyDownloaded(None));
    }
    None
}

/// Translate compiled directives plus per-run settings into the argument
/// vector for one materialization. Pure, covered by unit tests.
pub(crate) fn build_download_args(
    reference: &str,
    directives: &MaterializationDirectives,
    settings: &ResolverSettings,
) -> Vec<String> {
    let mut args = vec![
        "-f".to_string(),
        directives.format_spec.clone(),
        "--newline".to_string(),
        "--no-warnings".to_string(),
        "--no-check-certificates".to_string(),
        "--ignore-no-formats-error".to_string(),
        "-P".to_string(),
        settings.output_dir.to_string_lossy().to_string(),
        // group outputs per channel, falling back to uploader
        "-o".to_string(),
        "%(channel,uploader)s/%(title)s.%(ext)s".to_string(),
        "--download-archive".to_string(),
        settings.archive_path().to_string_lossy().to_string(),
        "--retries".to_string(),
        settings.retries.to_string(),
        "--fragment-retries".to_string(),
        settings.fragment_retries.to_string(),
        "--concurrent-fragments".to_string(),
        settings.concurrent_fragments.to_string(),
        "--socket-timeout".to_string(),
        settings.socket_timeout_secs.to_string(),
    ];

    if settings.restrict_filenames {
        args.push("--restrict-filenames".to_string());
    }
    if let Some(proxy) = &settings.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }
    if let Some(container) = &directives.merge_container {
        args.push("--merge-output-format".to_string());
        args.push(container.clone());
    }

    for step in &directives.postprocessing {
        match step {
            PostProcessing::ExtractAudio {
                codec,
                bitrate_kbps,
                sample_rate_hz,
                channels,
            } => {
                args.push("-x".to_string());
                args.push("--audio-format".to_string());
                args.push(codec.clone());
                args.push("--audio-quality".to_string());
                args.push(format!("{bitrate_kbps}K"));
                args.push("--postprocessor-args".to_string());
                args.push(format!("ExtractAudio:-ar {sample_rate_hz} -ac {channels}"));
            }
            PostProcessing::EmbedMetadata => args.push("--embed-metadata".to_string()),
            PostProcessing::EmbedThumbnail => args.push("--embed-thumbnail".to_string()),
            PostProcessing::Remux { container, faststart } => {
                args.push("--remux-video".to_string());
                args.push(container.clone());
                if *faststart {
                    args.push("--postprocessor-args".to_string());
                    args.push("VideoRemuxer:-movflags +faststart".to_string());
                }
            }
            PostProcessing::Reencode {
                max_height,
                fps,
                crf,
                preset,
                audio_bitrate_kbps,
                faststart,
            } => {
                args.push("--recode-video".to_string());
                args.push("mp4".to_string());
                let mut ffmpeg = format!(
                    "VideoConvertor:-vf scale=-2:{max_height} -r {fps} -c:v libx264 \
                     -crf {crf} -preset {preset} -c:a aac -b:a {audio_bitrate_kbps}k"
                );
                if *faststart {
                    ffmpeg.push_str(" -movflags +faststart");
                }
                args.push("--postprocessor-args".to_string());
                args.push(ffmpeg);
            }
        }
    }

    args.push(reference.to_string());
    args
}

/// Pick the most useful line of a failed run's stderr: the last ERROR line
/// when one exists, otherwise the last non-empty line.
pub(crate) fn failure_reason(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .find(|l| l.contains("ERROR"))
        .or_else(|| stderr.lines().rev().find(|l| !l.trim().is_empty()))
        .unwrap_or("unknown error")
        .to_string()
}

/// Run a command to completion with a hard timeout, capturing both pipes.
async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, DownloadError> {
    let mut child = Command::new(program)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| DownloadError::Execution(format!("failed to start {program}: {e}")))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| DownloadError::Execution(format!("failed to capture stdout from {program}")))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| DownloadError::Execution(format!("failed to capture stderr from {program}")))?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    match timeout(Duration::from_secs(timeout_secs), child.wait()).await {
        Ok(status_res) => {
            let status = status_res
                .map_err(|e| DownloadError::Execution(format!("failed to wait for {program}: {e}")))?;
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            Ok(std::process::Output {
                status,
                stdout,
                stderr,
            })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(DownloadError::Execution(format!(
                "{program} timed out after {timeout_secs}s"
            )))
        }
    }
}

fn parse_media_info(stdout: &[u8]) -> Result<MediaInfo, DownloadError> {
    let json_str = String::from_utf8_lossy(stdout);
    // --dump-json prints one object per entry; the first is enough for
    // single references and ytsearch expressions
    let first_line = json_str
        .lines()
        .find(|l| l.trim_start().starts_with('{'))
        .ok_or_else(|| DownloadError::Parse("no JSON in yt-dlp output".to_string()))?;
    let json: serde_json::Value = serde_json::from_str(first_line)
        .map_err(|e| DownloadError::Parse(format!("invalid JSON: {e}")))?;

    let formats = json["formats"]
        .as_array()
        .map(|formats| {
            formats
                .iter()
                .map(|f| StreamFormat {
                    format_id: f["format_id"].as_str().unwrap_or_default().to_string(),
                    ext: f["ext"].as_str().unwrap_or_default().to_string(),
                    vcodec: f["vcodec"].as_str().map(str::to_string),
                    acodec: f["acodec"].as_str().map(str::to_string),
                    fps: f["fps"].as_f64().map(|v| v as f32),
                    height: f["height"].as_u64().map(|v| v as u32),
                    width: f["width"].as_u64().map(|v| v as u32),
                    filesize: f["filesize"]
                        .as_u64()
                        .or_else(|| f["filesize_approx"].as_u64()),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(MediaInfo {
        title: json["title"].as_str().unwrap_or("Unknown").to_string(),
        uploader: json["channel"]
            .as_str()
            .or_else(|| json["uploader"].as_str())
            .unwrap_or_default()
            .to_string(),
        duration_seconds: json["duration"].as_f64().unwrap_or(0.0) as u64,
        webpage_url: json["webpage_url"].as_str().unwrap_or_default().to_string(),
        formats,
    })
}

/// `MediaResolver` implementation shelling out to the yt-dlp binary.
pub struct YtDlpResolver {
    binary: String,
    resolve_timeout_secs: u64,
}

impl YtDlpResolver {
    pub fn new() -> Self {
        Self {
            binary: find_ytdlp(),
            resolve_timeout_secs: 60,
        }
    }

    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            resolve_timeout_secs: 60,
        }
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn is_available(&self) -> bool {
        std::path::Path::new(&self.binary).exists()
            || std::process::Command::new(&self.binary)
                .arg("--version")
                .output()
                .map(|o| o.status.success())
                .unwrap_or(false)
    }

    async fn resolve(
        &self,
        reference: &str,
        settings: &ResolverSettings,
    ) -> Result<MediaInfo, DownloadError> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            settings.socket_timeout_secs.to_string(),
            "--retries".to_string(),
            settings.retries.to_string(),
        ];
        if let Some(proxy) = &settings.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }
        args.push(reference.to_string());

        let output =
            run_output_with_timeout(&self.binary, args, self.resolve_timeout_secs).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DownloadError::resolve(
                reference,
                stderr.lines().take(3).collect::<Vec<_>>().join(" | "),
            ));
        }
        parse_media_info(&output.stdout)
    }

    async fn materialize(
        &self,
        reference: &str,
        directives: &MaterializationDirectives,
        settings: &ResolverSettings,
        progress: mpsc::Sender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> Result<Vec<PathBuf>, DownloadError> {
        let args = build_download_args(reference, directives, settings);
        debug!(target: "ytdlp", %reference, "spawning yt-dlp");

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DownloadError::ToolNotFound(format!("{}: {e}", self.binary)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DownloadError::Execution("failed to capture stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| DownloadError::Execution("failed to capture stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = Vec::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push(line);
            }
            collected.join("\n")
        });

        let mut completed: Vec<PathBuf> = Vec::new();
        let mut label = reference.to_string();
        let mut lines = BufReader::new(stdout).lines();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(target: "ytdlp", %reference, "stop requested, killing download");
                    let _ = child.kill().await;
                    stderr_task.abort();
                    return Err(DownloadError::Cancelled);
                }
                line = lines.next_line() => {
                    let Ok(Some(line)) = line else { break };
                    match parse_output_line(&line) {
                        Some(OutputLine::Progress { percent, bytes_per_second, eta_seconds }) => {
                            let event = ProgressEvent {
                                stage: ProgressStage::Downloading,
                                percent,
                                bytes_per_second,
                                eta_seconds,
                                label: label.clone(),
                            };
                            let _ = progress.send(event).await;
                        }
                        Some(OutputLine::Destination(path)) => {
                            if let Some(name) = path.file_name() {
                                label = name.to_string_lossy().to_string();
                            }
                            completed.push(path);
                        }
                        Some(OutputLine::PostProcessed(path) | OutputLine::Merged(path)) => {
                            // post-processor output supersedes the raw
                            // download destination(s)
                            completed.clear();
                            if let Some(name) = path.file_name() {
                                label = name.to_string_lossy().to_string();
                            }
                            completed.push(path);
                        }
                        Some(OutputLine::AlreadyDownloaded(path)) => {
                            let name = path
                                .as_ref()
                                .and_then(|p| p.file_name())
                                .map(|n| n.to_string_lossy().to_string())
                                .unwrap_or_else(|| label.clone());
                            let _ = progress.send(ProgressEvent::finished(name)).await;
                        }
                        None => {}
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| DownloadError::Execution(format!("wait failed: {e}")))?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if !status.success() {
            warn!(target: "ytdlp", %reference, %status, "yt-dlp exited with error");
            return Err(DownloadError::materialize(
                reference,
                failure_reason(&stderr_output),
            ));
        }

        let _ = progress.send(ProgressEvent::finished(label)).await;
        Ok(completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RunMode;
    use crate::quality::{compile, QualityProfile, VideoMode};

    #[test]
    fn parses_progress_with_fragments() {
        let line = "[download]   6.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32 (frag 29/454)";
        match parse_output_line(line) {
            Some(OutputLine::Progress {
                percent,
                bytes_per_second,
                eta_seconds,
            }) => {
                assert!((percent - 6.2).abs() < f32::EPSILON);
                assert!((bytes_per_second - 420.30 * 1024.0).abs() < 1.0);
                assert_eq!(eta_seconds, 12 * 60 + 32);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_progress_without_eta() {
        let line = "[download] 100% of 5.02MiB at 1.20MiB/s";
        match parse_output_line(line) {
            Some(OutputLine::Progress {
                percent,
                eta_seconds,
                ..
            }) => {
                assert_eq!(percent, 100.0);
                assert_eq!(eta_seconds, 0);
            }
            other => panic!("unexpected parse: {other:?}"),
        }
    }

    #[test]
    fn parses_destinations_and_merges() {
        assert_eq!(
            parse_output_line("[download] Destination: /out/Artist/Song.webm"),
            Some(OutputLine::Destination(PathBuf::from(
                "/out/Artist/Song.webm"
            )))
        );
        assert_eq!(
            parse_output_line("[ExtractAudio] Destination: /out/Artist/Song.mp3"),
            Some(OutputLine::PostProcessed(PathBuf::from(
                "/out/Artist/Song.mp3"
            )))
        );
        assert_eq!(
            parse_output_line(r#"[Merger] Merging formats into "/out/Artist/Song.mp4""#),
            Some(OutputLine::Merged(PathBuf::from("/out/Artist/Song.mp4")))
        );
        assert_eq!(
            parse_output_line("[download] /out/Artist/Song.mp4 has already been downloaded"),
            Some(OutputLine::AlreadyDownloaded(Some(PathBuf::from(
                "/out/Artist/Song.mp4"
            ))))
        );
        assert_eq!(parse_output_line("[info] Writing video metadata"), None);
    }

    #[test]
    fn failure_reason_prefers_error_lines() {
        let stderr = "WARNING: unable to fetch thumbnail\n\
                      ERROR: [youtube] abc123: Video unavailable\n\
                      \n\
                      Deleting original file tmp.part";
        assert_eq!(
            failure_reason(stderr),
            "ERROR: [youtube] abc123: Video unavailable"
        );
        // no ERROR line: fall back to the last non-empty line
        assert_eq!(
            failure_reason("some warning\nconnection reset by peer\n\n"),
            "connection reset by peer"
        );
        assert_eq!(failure_reason(""), "unknown error");
    }

    #[test]
    fn rate_and_clock_parsing() {
        assert_eq!(parse_rate("512B"), 512.0);
        assert_eq!(parse_rate("2KiB"), 2048.0);
        assert_eq!(parse_rate("1.5MiB"), 1.5 * 1024.0 * 1024.0);
        assert_eq!(parse_clock("45"), 45);
        assert_eq!(parse_clock("12:32"), 752);
        assert_eq!(parse_clock("1:02:03"), 3723);
        assert_eq!(parse_clock("n/a"), 0);
    }

    #[test]
    fn audio_args_request_extraction() {
        let directives = compile(RunMode::Audio, &QualityProfile::default());
        let settings = ResolverSettings::new("/out");
        let args = build_download_args("https://example/v", &directives, &settings);

        assert!(args.contains(&"-x".to_string()));
        assert!(args.contains(&"--audio-quality".to_string()));
        assert!(args.contains(&"320K".to_string()));
        assert!(args.contains(&"ExtractAudio:-ar 44100 -ac 2".to_string()));
        assert!(args.contains(&"--embed-thumbnail".to_string()));
        assert!(args.contains(&"--download-archive".to_string()));
        assert!(args.contains(&"/out/downloaded.txt".to_string()));
        assert_eq!(args.last().unwrap(), "https://example/v");
    }

    #[test]
    fn compat_args_remux_without_reencode() {
        let directives = compile(RunMode::Video, &QualityProfile::default());
        let settings = ResolverSettings::new("/out");
        let args = build_download_args("https://example/v", &directives, &settings);

        assert!(args.contains(&"--remux-video".to_string()));
        assert!(args.contains(&"VideoRemuxer:-movflags +faststart".to_string()));
        assert!(!args.contains(&"--recode-video".to_string()));
        assert!(args.contains(&"--merge-output-format".to_string()));
        assert!(args.contains(&"--concurrent-fragments".to_string()));
    }

    #[test]
    fn reencode_args_carry_encoder_settings() {
        let profile = QualityProfile {
            video_mode: VideoMode::Reencode,
            ..Default::default()
        };
        let directives = compile(RunMode::Video, &profile);
        let settings = ResolverSettings::new("/out");
        let args = build_download_args("https://example/v", &directives, &settings);

        assert!(args.contains(&"--recode-video".to_string()));
        let ppa = args
            .iter()
            .find(|a| a.starts_with("VideoConvertor:"))
            .expect("convertor args present");
        assert!(ppa.contains("scale=-2:480"));
        assert!(ppa.contains("-crf 23"));
        assert!(ppa.contains("-preset medium"));
        assert!(ppa.contains("-b:a 192k"));
        assert!(ppa.contains("+faststart"));
    }

    #[test]
    fn media_info_parsing_falls_back_to_uploader() {
        let json = br#"{"title":"Song","uploader":"Artist","duration":215.3,"webpage_url":"https://example/v","formats":[{"format_id":"140","ext":"m4a","vcodec":"none","acodec":"mp4a.40.2"},{"format_id":"137","ext":"mp4","vcodec":"avc1.64001f","acodec":"none","fps":29.97,"height":1080,"width":1920,"filesize":1000}]}"#;
        let info = parse_media_info(json).unwrap();
        assert_eq!(info.title, "Song");
        assert_eq!(info.uploader, "Artist");
        assert_eq!(info.duration_seconds, 215);
        assert_eq!(info.formats.len(), 2);
        assert!(info.formats[1].has_video());
        assert_eq!(info.formats[1].height, Some(1080));
    }
}
