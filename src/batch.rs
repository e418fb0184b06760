//! Sequential batch driver.
//!
//! [`BatchDriver`] runs one operation over a list of files, strictly in
//! submission order, and reports everything it does on an [`EventBus`]:
//! a `BatchStarted`, then per file any `FileProgress` and `LogLine` events
//! followed by `ItemFinished` and `Progress`, and finally `BatchDone`.
//! A failure on one file is recorded and the batch moves on.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tf_av::{FfprobeProber, ToolRegistry, Transcoder, FFMPEG};
use tf_core::config::Config;
use tf_core::events::{
    BatchOperation, BatchSummary, Event, EventBus, EventPayload, ItemOutcome, LogLevel,
};
use tf_core::{
    BatchId, CoverAction, Error, Lenient, MediaKind, ProbeResult, ProgressEvent, Result, TagSet,
};
use tokio::sync::broadcast;

use crate::naming::{genre_string, sanitize_stem};

/// One file selected for a save or export, with the user's edits.
#[derive(Debug, Clone, Default)]
pub struct MediaItem {
    pub path: PathBuf,
    /// Requested new file stem (without extension). Sanitized before use.
    pub new_stem: Option<String>,
    /// Genres to store; joined with `"; "` in sorted order.
    pub genres: BTreeSet<String>,
}

impl MediaItem {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

/// Expand command-line inputs into media files.
///
/// Files are kept as given. Directories contribute their direct children
/// that look like audio or video, sorted by name.
pub fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && MediaKind::from_path(p).is_some())
                .collect();
            found.sort();
            files.extend(found);
        } else {
            files.push(input.clone());
        }
    }
    Ok(files)
}

/// Runs batch operations and publishes their events.
pub struct BatchDriver {
    config: Arc<Config>,
    tools: ToolRegistry,
    events: Arc<EventBus>,
    prober: FfprobeProber,
    transcoder: Option<Transcoder>,
}

impl BatchDriver {
    /// Create a driver over already-resolved tools.
    pub fn new(config: Arc<Config>, tools: ToolRegistry) -> Self {
        let prober = FfprobeProber::from_registry(&tools);
        let transcoder = Transcoder::from_registry(&tools, &config).ok();
        Self {
            config,
            tools,
            events: Arc::new(EventBus::default()),
            prober,
            transcoder,
        }
    }

    /// Resolve ffmpeg/ffprobe per the config, then create the driver.
    pub async fn discover(config: Arc<Config>) -> Self {
        let tools = ToolRegistry::discover(&config.tools).await;
        Self::new(config, tools)
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Subscribe to the event stream. Subscribe before starting a batch to
    /// see all of its events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    /// Probe one file outside of a batch.
    pub async fn probe(&self, path: &Path) -> Lenient<ProbeResult> {
        self.prober.probe(path).await
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Classify, stat and probe each file.
    pub async fn scan(&self, paths: &[PathBuf]) -> BatchSummary {
        let mut run = BatchRun::start(&self.events, BatchOperation::Scan, paths.len());

        for path in paths {
            let kind = MediaKind::from_path(path);
            let size_bytes = tokio::fs::metadata(path).await.ok().map(|m| m.len());
            let (probe, degraded) = self.prober.probe(path).await.into_parts();

            if let Some(e) = &degraded {
                if self.prober.is_available() {
                    run.log(LogLevel::Warn, format!("{}: probe incomplete: {e}", path.display()));
                }
            }

            self.events.publish(EventPayload::ItemScanned {
                path: path.clone(),
                kind,
                size_bytes,
                probe,
            });

            let outcome = match kind {
                Some(kind) => ItemOutcome::Succeeded {
                    message: format!("scanned ({kind})"),
                },
                None => ItemOutcome::Skipped {
                    reason: "not an audio or video file".into(),
                },
            };
            run.finish_item(path, outcome);
        }

        run.done()
    }

    /// Replace the tags of every taggable file with `tags` and apply `cover`.
    pub async fn write_tags(&self, paths: &[PathBuf], tags: TagSet, cover: CoverAction) -> BatchSummary {
        let mut run = BatchRun::start(&self.events, BatchOperation::WriteTags, paths.len());
        let tags = Arc::new(tags);
        let cover = Arc::new(cover);

        for path in paths {
            if !tf_tags::is_taggable(path) {
                run.finish_item(path, skipped_untaggable());
                continue;
            }

            let (p, t, c) = (path.clone(), Arc::clone(&tags), Arc::clone(&cover));
            let outcome = match blocking(move || tf_tags::write_tags(&p, &t, &c)).await {
                Ok(()) => ItemOutcome::Succeeded {
                    message: "tags written".into(),
                },
                Err(e) => failed(&e),
            };
            run.finish_item(path, outcome);
        }

        run.done()
    }

    /// Strip every tag (covers included) from each taggable file.
    pub async fn remove_tags(&self, paths: &[PathBuf]) -> BatchSummary {
        let mut run = BatchRun::start(&self.events, BatchOperation::RemoveTags, paths.len());

        for path in paths {
            if !tf_tags::is_taggable(path) {
                run.finish_item(path, skipped_untaggable());
                continue;
            }

            let p = path.clone();
            let outcome = match blocking(move || tf_tags::remove_tags(&p)).await {
                Ok(()) => ItemOutcome::Succeeded {
                    message: "tags removed".into(),
                },
                Err(e) => failed(&e),
            };
            run.finish_item(path, outcome);
        }

        run.done()
    }

    /// Rename each file (optional) and rewrite its genre in place.
    ///
    /// Without ffmpeg the rename still happens and the genre write is
    /// skipped with a warning.
    pub async fn save_in_place(&self, items: &[MediaItem]) -> BatchSummary {
        let mut run = BatchRun::start(&self.events, BatchOperation::SaveInPlace, items.len());

        if self.transcoder.is_none() {
            let reason = self
                .tools
                .require(FFMPEG)
                .err()
                .map(|e| e.to_string())
                .unwrap_or_default();
            run.log(LogLevel::Warn, format!("genres will not be written: {reason}"));
        }

        for item in items {
            let outcome = match self.save_one(&run, item).await {
                Ok(outcome) => outcome,
                Err(e) => failed(&e),
            };
            run.finish_item(&item.path, outcome);
        }

        run.done()
    }

    async fn save_one(&self, run: &BatchRun<'_>, item: &MediaItem) -> Result<ItemOutcome> {
        if !item.path.is_file() {
            return Err(not_found(&item.path));
        }

        let path = match item.new_stem.as_deref().map(sanitize_stem) {
            Some(stem) if !stem.is_empty() => rename_to_stem(&item.path, &stem).await?,
            _ => item.path.clone(),
        };
        if path != item.path {
            run.log(
                LogLevel::Info,
                format!("renamed {} -> {}", display_name(&item.path), display_name(&path)),
            );
        }

        let Some(transcoder) = &self.transcoder else {
            return Ok(if path != item.path {
                ItemOutcome::Succeeded {
                    message: format!("renamed to {} (genre not written)", display_name(&path)),
                }
            } else {
                ItemOutcome::Skipped {
                    reason: "ffmpeg unavailable and no rename requested".into(),
                }
            });
        };

        let genre = genre_string(&item.genres);
        let hint = self.prober.probe(&path).await.into_value().duration_seconds;
        let remuxed = transcoder
            .remux_genre(&path, &genre, hint, |progress| self.publish_progress(&path, progress))
            .await;
        let outcome = match remuxed {
            Ok(outcome) => outcome,
            Err(e) if path != item.path => {
                return Ok(ItemOutcome::Failed {
                    stage: e.stage().to_string(),
                    message: format!("renamed to {}, genre not written: {e}", path.display()),
                });
            }
            Err(e) => return Err(e),
        };
        if let Some(stray) = &outcome.stray_backup {
            run.log(LogLevel::Warn, format!("backup left behind: {}", stray.display()));
        }

        let stored = self.prober.probe(&path).await.into_value().genre.unwrap_or_default();
        Ok(ItemOutcome::Succeeded {
            message: format!("saved {} (genre '{stored}')", display_name(&path)),
        })
    }

    /// Transcode each file into `dest_dir` with the configured formats, then
    /// write its genre on the exported copy.
    ///
    /// # Errors
    ///
    /// Fails before touching any file when `dest_dir` is not an existing
    /// directory or ffmpeg is unavailable.
    pub async fn export(&self, items: &[MediaItem], dest_dir: &Path) -> Result<BatchSummary> {
        if !dest_dir.is_dir() {
            return Err(Error::Configuration(format!(
                "export directory does not exist: {}",
                dest_dir.display()
            )));
        }
        let Some(transcoder) = &self.transcoder else {
            return Err(self.tools.require(FFMPEG).err().unwrap_or_else(|| {
                Error::tool_unavailable(FFMPEG, "export requires ffmpeg")
            }));
        };

        let mut run = BatchRun::start(&self.events, BatchOperation::Export, items.len());
        let mut produced = HashSet::new();

        for item in items {
            let exported = self.export_one(&run, transcoder, item, dest_dir, &mut produced);
            let outcome = match exported.await {
                Ok(outcome) => outcome,
                Err(e) => failed(&e),
            };
            run.finish_item(&item.path, outcome);
        }

        Ok(run.done())
    }

    async fn export_one(
        &self,
        run: &BatchRun<'_>,
        transcoder: &Transcoder,
        item: &MediaItem,
        dest_dir: &Path,
        produced: &mut HashSet<PathBuf>,
    ) -> Result<ItemOutcome> {
        let Some(kind) = MediaKind::from_path(&item.path) else {
            return Ok(ItemOutcome::Skipped {
                reason: "not an audio or video file".into(),
            });
        };
        if !item.path.is_file() {
            return Err(not_found(&item.path));
        }

        let extension = match kind {
            MediaKind::Video => self.config.export.video_format()?.extension(),
            MediaKind::Audio => self.config.export.audio_format()?.extension(),
        };
        let stem = item
            .new_stem
            .as_deref()
            .map(sanitize_stem)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| original_stem(&item.path));
        let dst = dest_dir.join(format!("{stem}.{extension}"));
        if produced.contains(&dst) {
            run.log(
                LogLevel::Warn,
                format!(
                    "{} would overwrite {} exported earlier in this batch",
                    display_name(&item.path),
                    display_name(&dst)
                ),
            );
            return Err(Error::from(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("already exported to {} in this batch", dst.display()),
            )));
        }

        let hint = self.prober.probe(&item.path).await.into_value().duration_seconds;
        let report = |progress: ProgressEvent| self.publish_progress(&item.path, progress);
        transcoder.export(&item.path, &dst, kind, hint, report).await?;
        produced.insert(dst.clone());

        let genre = genre_string(&item.genres);
        if let Err(e) = transcoder.remux_genre(&dst, &genre, hint, |_| {}).await {
            run.log(
                LogLevel::Warn,
                format!("could not write genre on {}: {e}", display_name(&dst)),
            );
        }

        Ok(ItemOutcome::Succeeded {
            message: format!("exported to {}", dst.display()),
        })
    }

    fn publish_progress(&self, path: &Path, progress: ProgressEvent) {
        self.events.publish(EventPayload::FileProgress {
            path: path.to_path_buf(),
            progress,
        });
    }
}

// ---------------------------------------------------------------------------
// Batch bookkeeping
// ---------------------------------------------------------------------------

/// Event and count bookkeeping for one running batch.
struct BatchRun<'a> {
    events: &'a EventBus,
    batch_id: BatchId,
    operation: BatchOperation,
    summary: BatchSummary,
}

impl<'a> BatchRun<'a> {
    fn start(events: &'a EventBus, operation: BatchOperation, total: usize) -> Self {
        let batch_id = BatchId::new();
        tracing::info!("Starting {operation} batch {batch_id} ({total} files)");
        events.publish(EventPayload::BatchStarted {
            batch_id,
            operation,
            total,
        });
        Self {
            events,
            batch_id,
            operation,
            summary: BatchSummary {
                total,
                ..BatchSummary::default()
            },
        }
    }

    fn log(&self, level: LogLevel, message: String) {
        match level {
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warn => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
        self.events.log(level, message);
    }

    fn finish_item(&mut self, path: &Path, outcome: ItemOutcome) {
        match &outcome {
            ItemOutcome::Succeeded { message } => {
                self.log(LogLevel::Info, format!("[OK] {}: {message}", display_name(path)));
            }
            ItemOutcome::Failed { stage, message } => {
                tracing::warn!("{} failed at {stage}: {message}", path.display());
                self.events.log(
                    LogLevel::Error,
                    format!("[FAILED] {} ({stage}): {message}", path.display()),
                );
            }
            ItemOutcome::Skipped { reason } => {
                self.log(LogLevel::Info, format!("[SKIPPED] {}: {reason}", display_name(path)));
            }
        }

        self.summary.record(&outcome);
        self.events.publish(EventPayload::ItemFinished {
            path: path.to_path_buf(),
            outcome,
        });
        self.events.publish(EventPayload::Progress {
            done: self.summary.done(),
            total: self.summary.total,
        });
    }

    fn done(self) -> BatchSummary {
        let s = self.summary;
        tracing::info!(
            "{} batch {} done: {} ok, {} failed, {} skipped",
            self.operation,
            self.batch_id,
            s.succeeded,
            s.failed,
            s.skipped
        );
        self.events.publish(EventPayload::BatchDone {
            batch_id: self.batch_id,
            summary: s,
        });
        s
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run blocking tag I/O off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::from(std::io::Error::other(e)))?
}

fn failed(e: &Error) -> ItemOutcome {
    ItemOutcome::Failed {
        stage: e.stage().to_string(),
        message: e.to_string(),
    }
}

fn skipped_untaggable() -> ItemOutcome {
    ItemOutcome::Skipped {
        reason: "no tag support for this file type".into(),
    }
}

fn not_found(path: &Path) -> Error {
    Error::from(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        format!("file not found: {}", path.display()),
    ))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn original_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Rename `path` to `<stem><original extension>` in the same directory.
/// Refuses to overwrite an existing file.
async fn rename_to_stem(path: &Path, stem: &str) -> Result<PathBuf> {
    let file_name = match path.extension() {
        Some(ext) => format!("{stem}.{}", ext.to_string_lossy()),
        None => stem.to_string(),
    };
    let target = path.with_file_name(file_name);
    if target == path {
        return Ok(target);
    }
    if target.exists() {
        return Err(Error::from(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("file already exists: {}", display_name(&target)),
        )));
    }
    tokio::fs::rename(path, &target).await?;
    Ok(target)
}
