// MediaResolver trait and per-run resolver settings

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::errors::DownloadError;
use crate::models::{MediaInfo, ProgressEvent};
use crate::quality::MaterializationDirectives;

/// File name of the per-run deduplication ledger kept inside the output
/// directory. The resolver appends completed item identifiers and skips
/// them on re-runs; the engine configures it but never reads it.
pub const ARCHIVE_FILE_NAME: &str = "downloaded.txt";

/// Configuration handed to the resolver once per run.
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub output_dir: PathBuf,
    pub archive_file: String,
    /// Retry budget for transient network failures
    pub retries: u32,
    pub fragment_retries: u32,
    /// Parallel sub-range fetches within a single item
    pub concurrent_fragments: u32,
    pub socket_timeout_secs: u32,
    pub restrict_filenames: bool,
    pub proxy: Option<String>,
}

impl ResolverSettings {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            archive_file: ARCHIVE_FILE_NAME.to_string(),
            retries: 5,
            fragment_retries: 10,
            concurrent_fragments: 3,
            socket_timeout_secs: 30,
            restrict_filenames: true,
            proxy: None,
        }
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn archive_path(&self) -> PathBuf {
        self.output_dir.join(&self.archive_file)
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self::new(crate::models::default_output_dir())
    }
}

/// Boundary to the external media resolver/fetcher.
///
/// References are opaque: direct URLs or search expressions such as
/// `ytsearch1:artist song`. Implementations stream progress through the
/// supplied channel and poll the cancellation token so an in-flight
/// transfer unwinds promptly.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Name for log lines
    fn name(&self) -> &'static str;

    /// Whether the backing tool is installed and usable.
    fn is_available(&self) -> bool;

    /// Resolve metadata only; no download happens here.
    async fn resolve(
        &self,
        reference: &str,
        settings: &ResolverSettings,
    ) -> Result<MediaInfo, DownloadError>;

    /// Materialize one reference to local files according to the compiled
    /// directives. Returns the final output paths.
    async fn materialize(
        &self,
        reference: &str,
        directives: &MaterializationDirectives,
        settings: &ResolverSettings,
        progress: mpsc::Sender<ProgressEvent>,
        cancel: CancellationToken,
    ) -> Result<Vec<PathBuf>, DownloadError>;
}
