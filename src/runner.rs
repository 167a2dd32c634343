// Sequential download queue runner
//
// Owns the lifecycle of one batch run: validates the request, spawns a
// worker task that walks the queue in order, recovers at item boundaries,
// and reports the aggregate outcome through the completion sink exactly
// once. Only one run may be active at a time.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::errors::DownloadError;
use crate::filter::StaticFilter;
use crate::models::{ProgressEvent, RunMode, RunResult};
use crate::quality::{compile, QualityProfile};
use crate::resolver::{MediaResolver, ResolverSettings};

/// Receives normalized progress events during a run.
pub trait ProgressSink: Send + Sync + 'static {
    fn on_progress(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync + 'static,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Receives the aggregate result when a run finishes, stops or fails.
pub trait CompletionSink: Send + Sync + 'static {
    fn on_complete(&self, result: RunResult);
}

impl<F> CompletionSink for F
where
    F: Fn(RunResult) + Send + Sync + 'static,
{
    fn on_complete(&self, result: RunResult) {
        self(result)
    }
}

/// Lifecycle of the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    /// The queue was walked to the end
    Completed,
    /// A cooperative stop was honored
    Stopped,
    /// The run aborted on a configuration error before processing items
    Failed,
}

/// Drives a batch of opaque references through resolve/filter/materialize.
pub struct QueueRunner {
    resolver: Arc<dyn MediaResolver>,
    settings: ResolverSettings,
    filter: StaticFilter,
    state: Arc<Mutex<RunState>>,
    cancel: Arc<Mutex<CancellationToken>>,
}

impl QueueRunner {
    pub fn new(resolver: Arc<dyn MediaResolver>, settings: ResolverSettings) -> Self {
        Self {
            resolver,
            settings,
            filter: StaticFilter::default(),
            state: Arc::new(Mutex::new(RunState::Idle)),
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    pub fn with_filter(mut self, filter: StaticFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap()
    }

    /// Request a cooperative stop. The worker honors it before the next
    /// item and mid-transfer; already-finished items are kept.
    pub fn stop(&self) {
        self.cancel.lock().unwrap().cancel();
    }

    /// Start a run over `references` in queue order.
    ///
    /// Rejects overlapping runs and empty queues synchronously; everything
    /// else, including output-directory failures, finishes through the
    /// completion sink. The returned handle resolves when the run is over.
    pub fn start(
        &self,
        mode: RunMode,
        references: Vec<String>,
        profile: &QualityProfile,
        progress: Arc<dyn ProgressSink>,
        completion: Arc<dyn CompletionSink>,
    ) -> Result<JoinHandle<()>, DownloadError> {
        if references.is_empty() {
            return Err(DownloadError::EmptyQueue);
        }
        if !self.resolver.is_available() {
            return Err(DownloadError::ToolNotFound(self.resolver.name().to_string()));
        }
        {
            let mut state = self.state.lock().unwrap();
            if *state == RunState::Running {
                return Err(DownloadError::AlreadyRunning);
            }
            *state = RunState::Running;
        }

        let token = CancellationToken::new();
        *self.cancel.lock().unwrap() = token.clone();

        let resolver = Arc::clone(&self.resolver);
        let settings = self.settings.clone();
        let filter = self.filter.clone();
        let state = Arc::clone(&self.state);
        let directives = compile(mode, profile);

        let handle = tokio::spawn(async move {
            let mut result = RunResult::new(mode, settings.output_dir.clone());

            if let Err(e) = tokio::fs::create_dir_all(&settings.output_dir).await {
                warn!(path = %settings.output_dir.display(), error = %e,
                    "cannot create output directory, aborting run");
                *state.lock().unwrap() = RunState::Failed;
                completion.on_complete(result);
                return;
            }

            info!(%mode, items = references.len(), "starting download run");
            let mut stopped = false;

            for reference in &references {
                if token.is_cancelled() {
                    stopped = true;
                    break;
                }

                let info = match resolver.resolve(reference, &settings).await {
                    Ok(info) => info,
                    Err(e) => {
                        warn!(%reference, error = %e, "resolution failed, skipping item");
                        result.failed += 1;
                        continue;
                    }
                };

                // The static filter only applies to video runs; audio runs
                // want exactly the uploads it would reject.
                if mode == RunMode::Video && filter.is_likely_static(&info) {
                    info!(%reference, title = %info.title,
                        "skipping likely static upload");
                    continue;
                }

                let (tx, mut rx) = mpsc::channel::<ProgressEvent>(32);
                let sink = Arc::clone(&progress);
                let forward = tokio::spawn(async move {
                    while let Some(event) = rx.recv().await {
                        sink.on_progress(event.clamped());
                    }
                });

                let outcome = resolver
                    .materialize(reference, &directives, &settings, tx, token.clone())
                    .await;
                let _ = forward.await;

                match outcome {
                    Ok(paths) => {
                        result.succeeded += 1;
                        result.completed_files.extend(paths);
                    }
                    Err(DownloadError::Cancelled) => {
                        // Neither a success nor a failure
                        stopped = true;
                        break;
                    }
                    Err(e) => {
                        warn!(%reference, error = %e, "item failed, continuing");
                        result.failed += 1;
                    }
                }
            }

            info!(succeeded = result.succeeded, failed = result.failed,
                stopped, "download run finished");
            *state.lock().unwrap() = if stopped {
                RunState::Stopped
            } else {
                RunState::Completed
            };
            completion.on_complete(result);
        });

        Ok(handle)
    }
}
