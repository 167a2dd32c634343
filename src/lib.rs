//! Batch media download engine.
//!
//! Drives an external resolver (yt-dlp) over a queue of opaque references:
//! direct URLs or `ytsearch1:` expressions. Quality profiles compile into
//! per-run materialization directives, a heuristic filter drops static
//! "art track" uploads from video runs, and the queue runner walks items
//! sequentially with per-item error recovery, progress streaming and
//! cooperative stop.

pub mod errors;
pub mod filter;
pub mod models;
pub mod quality;
pub mod resolver;
pub mod runner;
pub mod scoring;
pub mod search;
pub mod ytdlp;

pub use errors::DownloadError;
pub use filter::StaticFilter;
pub use models::{MediaInfo, ProgressEvent, ProgressStage, RunMode, RunResult, StreamFormat};
pub use quality::{compile, MaterializationDirectives, QualityProfile, VideoMode, X264Preset};
pub use resolver::{MediaResolver, ResolverSettings};
pub use runner::{CompletionSink, ProgressSink, QueueRunner, RunState};
pub use scoring::{official_score, rank_candidates, RankedCandidate, SearchCandidate};
pub use search::{CatalogClient, CatalogError, Recording};
pub use ytdlp::YtDlpResolver;
