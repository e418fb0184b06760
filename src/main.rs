mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands, Selection, TagsCommand};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tf_av::ToolRegistry;
use tf_core::config::Config;
use tf_core::events::{BatchSummary, Event, EventPayload, LogLevel};
use tf_core::{CoverAction, CoverArt, TagField, TagSet};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use trackforge::naming::{numbered_stem, parse_genre_string, sanitize_stem};
use trackforge::{expand_inputs, BatchDriver, MediaItem};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "trackforge=debug,tf_av=debug,tf_tags=debug,tf_core=debug".to_string()
        } else {
            // Batch events are printed on stdout already
            "warn".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Probe { paths, json } => {
            let config = Config::load_or_default(config_path);
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_files(config, &paths, json))
        }
        Commands::CheckTools => {
            let config = Config::load_or_default(config_path);
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_tools(&config))
        }
        Commands::Tags { action } => {
            let config = Config::load_or_default(config_path);
            match action {
                TagsCommand::Read { file, json } => read_tags(&file, json),
                TagsCommand::Clear { paths } => {
                    let rt = tokio::runtime::Runtime::new()?;
                    rt.block_on(clear_tags(config, &paths))
                }
                TagsCommand::Write {
                    paths,
                    title,
                    artist,
                    album,
                    track,
                    year,
                    genre,
                    comment,
                    cover,
                    remove_cover,
                } => {
                    let mut tags = TagSet::default();
                    tags.set_text(TagField::Title, title.as_deref());
                    tags.set_text(TagField::Artist, artist.as_deref());
                    tags.set_text(TagField::Album, album.as_deref());
                    tags.set_text(TagField::Track, track.as_deref());
                    tags.set_text(TagField::Year, year.as_deref());
                    tags.set_text(TagField::Genre, genre.as_deref());
                    tags.set_text(TagField::Comment, comment.as_deref());

                    let cover = match (cover, remove_cover) {
                        (Some(image), _) => CoverAction::Set(
                            CoverArt::from_file(&image)
                                .with_context(|| format!("reading cover {}", image.display()))?,
                        ),
                        (None, true) => CoverAction::Remove,
                        (None, false) => CoverAction::NoChange,
                    };

                    let rt = tokio::runtime::Runtime::new()?;
                    rt.block_on(write_tags(config, &paths, tags, cover))
                }
            }
        }
        Commands::Save { selection } => {
            let config = Config::load_or_default(config_path);
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(save(config, selection))
        }
        Commands::Export { to, selection } => {
            let config = Config::load_or_default(config_path);
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(export(config, selection, &to))
        }
        Commands::Recover { paths } => recover(&paths),
        Commands::Validate {
            config: validate_path,
        } => {
            let path = validate_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn probe_files(config: Config, inputs: &[PathBuf], json: bool) -> Result<()> {
    let paths = expand_inputs(inputs)?;
    let driver = BatchDriver::discover(Arc::new(config)).await;

    if !json {
        let renderer = spawn_renderer(driver.subscribe());
        let summary = driver.scan(&paths).await;
        drop(driver);
        renderer.await?;
        return check_summary(&summary);
    }

    let collector = spawn_scan_collector(driver.subscribe());
    driver.scan(&paths).await;
    drop(driver);
    let scanned = collector.await?;
    println!("{}", serde_json::to_string_pretty(&scanned)?);
    Ok(())
}

async fn check_tools(config: &Config) -> Result<()> {
    println!("Checking external tools...\n");

    let registry = ToolRegistry::discover(&config.tools).await;
    let mut all_ok = true;

    for tool in registry.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        if let Some(ref message) = tool.message {
            print!(": {}", message);
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All tools are available!");
    } else {
        println!("Some tools are missing. Probing, genre writes and export need ffmpeg/ffprobe.");
    }

    Ok(())
}

fn read_tags(file: &Path, json: bool) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {}", file.display());
    }

    let (tags, degraded) = tf_tags::read_tags(file).into_parts();
    if let Some(e) = degraded {
        eprintln!("warning: {e}");
    }

    if json {
        let value = serde_json::json!({
            "path": file,
            "title": tags.title,
            "artist": tags.artist,
            "album": tags.album,
            "track": tags.track.map(|t| t.to_string()),
            "year": tags.year,
            "genre": tags.genre,
            "comment": tags.comment,
            "cover": tags.cover.as_ref().map(|c| serde_json::json!({
                "mime": c.mime.as_mime(),
                "bytes": c.data.len(),
            })),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    for (label, field) in [
        ("Title", TagField::Title),
        ("Artist", TagField::Artist),
        ("Album", TagField::Album),
        ("Year", TagField::Year),
        ("Genre", TagField::Genre),
        ("Comment", TagField::Comment),
    ] {
        println!("{label:>8}: {}", tags.text(field).unwrap_or(""));
    }
    println!(
        "{:>8}: {}",
        "Track",
        tags.track.map(|t| t.to_string()).unwrap_or_default()
    );
    match &tags.cover {
        Some(cover) => println!("{:>8}: {} ({} bytes)", "Cover", cover.mime, cover.data.len()),
        None => println!("{:>8}: none", "Cover"),
    }

    Ok(())
}

async fn write_tags(config: Config, inputs: &[PathBuf], tags: TagSet, cover: CoverAction) -> Result<()> {
    let paths = expand_inputs(inputs)?;
    // Tag I/O needs no external tools.
    let driver = BatchDriver::new(Arc::new(config), ToolRegistry::default());
    let renderer = spawn_renderer(driver.subscribe());
    let summary = driver.write_tags(&paths, tags, cover).await;
    drop(driver);
    renderer.await?;
    check_summary(&summary)
}

async fn clear_tags(config: Config, inputs: &[PathBuf]) -> Result<()> {
    let paths = expand_inputs(inputs)?;
    let driver = BatchDriver::new(Arc::new(config), ToolRegistry::default());
    let renderer = spawn_renderer(driver.subscribe());
    let summary = driver.remove_tags(&paths).await;
    drop(driver);
    renderer.await?;
    check_summary(&summary)
}

async fn save(config: Config, selection: Selection) -> Result<()> {
    let driver = BatchDriver::discover(Arc::new(config)).await;
    let items = build_items(&driver, &selection).await?;

    let renderer = spawn_renderer(driver.subscribe());
    let summary = driver.save_in_place(&items).await;
    drop(driver);
    renderer.await?;
    check_summary(&summary)
}

async fn export(config: Config, selection: Selection, dest: &Path) -> Result<()> {
    let driver = BatchDriver::discover(Arc::new(config)).await;
    let items = build_items(&driver, &selection).await?;

    let renderer = spawn_renderer(driver.subscribe());
    let result = driver.export(&items, dest).await;
    drop(driver);
    renderer.await?;
    check_summary(&result?)
}

fn recover(paths: &[PathBuf]) -> Result<()> {
    for path in paths {
        let report = tf_av::recover(path).with_context(|| format!("recovering {}", path.display()))?;
        if report.is_clean() {
            println!("✓ {}: nothing to recover", path.display());
            continue;
        }
        if report.restored_backup {
            println!("✓ {}: restored from backup", path.display());
        }
        if report.removed_stale_backup {
            println!("✓ {}: removed stale backup", path.display());
        }
        if report.removed_temp {
            println!("✓ {}: removed leftover temp file", path.display());
        }
    }
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {}", p.display());
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("reading {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Video export: {}", config.export.video_format);
    println!("  Audio export: {}", config.export.audio_format);
    println!("  Progress interval: {} ms", config.transcode.progress_interval_ms);

    let warnings = config.validate();
    if !warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &warnings {
            println!("  - {warning}");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn build_items(driver: &BatchDriver, selection: &Selection) -> Result<Vec<MediaItem>> {
    let paths = expand_inputs(&selection.paths)?;

    let base = match &selection.name {
        Some(name) => {
            let base = sanitize_stem(name);
            if base.is_empty() {
                anyhow::bail!("--name {name:?} is empty after removing forbidden characters");
            }
            Some(base)
        }
        None => None,
    };

    let requested: BTreeSet<String> = selection
        .genres
        .iter()
        .flat_map(|g| parse_genre_string(g))
        .collect();

    let total = paths.len();
    let mut items = Vec::with_capacity(total);
    for (index, path) in paths.into_iter().enumerate() {
        let genres = if requested.is_empty() {
            let existing = driver.probe(&path).await.into_value().genre;
            existing.as_deref().map(parse_genre_string).unwrap_or_default()
        } else {
            requested.clone()
        };
        items.push(MediaItem {
            new_stem: base.as_deref().map(|b| numbered_stem(b, index, total)),
            genres,
            path,
        });
    }
    Ok(items)
}

fn check_summary(summary: &BatchSummary) -> Result<()> {
    if summary.failed > 0 {
        anyhow::bail!("{} of {} files failed", summary.failed, summary.total);
    }
    Ok(())
}

fn spawn_renderer(mut rx: broadcast::Receiver<Event>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => render(&event.payload),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("renderer skipped {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn spawn_scan_collector(mut rx: broadcast::Receiver<Event>) -> JoinHandle<Vec<EventPayload>> {
    tokio::spawn(async move {
        let mut scanned = Vec::new();
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if matches!(event.payload, EventPayload::ItemScanned { .. }) {
                        scanned.push(event.payload);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!("probe output missed {n} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        scanned
    })
}

fn render(payload: &EventPayload) {
    match payload {
        EventPayload::BatchStarted { operation, total, .. } => {
            println!("Starting {operation} of {total} file(s)");
        }
        EventPayload::ItemScanned {
            path,
            kind,
            size_bytes,
            probe,
        } => {
            println!("File: {}", path.display());
            if let Some(kind) = kind {
                println!("  Kind: {kind}");
            }
            if let Some(size) = size_bytes {
                println!("  Size: {size} bytes");
            }
            if let Some(duration) = probe.duration_seconds {
                println!("  Duration: {}", format_duration(duration));
            }
            if let (Some(w), Some(h)) = (probe.width, probe.height) {
                println!("  Resolution: {w}x{h}");
            }
            if let Some(genre) = &probe.genre {
                println!("  Genre: {genre}");
            }
        }
        EventPayload::LogLine { level, message } => match level {
            LogLevel::Info => println!("{message}"),
            LogLevel::Warn => println!("warning: {message}"),
            LogLevel::Error => println!("error: {message}"),
        },
        EventPayload::FileProgress { path, progress } => {
            if let Some(percent) = progress.percent {
                let name = path.file_name().unwrap_or(path.as_os_str()).to_string_lossy();
                println!("  {name}: {percent:.0}%");
            }
        }
        EventPayload::ItemFinished { .. } => {}
        EventPayload::Progress { done, total } => println!("[{done}/{total}]"),
        EventPayload::BatchDone { summary, .. } => {
            println!(
                "Done: {} succeeded, {} failed, {} skipped",
                summary.succeeded, summary.failed, summary.skipped
            );
        }
    }
}

/// `m:ss`, or `h:mm:ss` from one hour up.
fn format_duration(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}
