//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries the
//! tool, export, and transcode settings. Every section defaults sensibly so a
//! completely empty `{}` file is valid. The value is handed to the batch
//! driver at construction; nothing reads configuration from global state.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::media::{AudioFormat, VideoFormat};
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub export: ExportConfig,
    pub transcode: TranscodeConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Configuration(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Err(e) = self.export.video_format() {
            warnings.push(format!("export.video_format: {e}"));
        }
        if let Err(e) = self.export.audio_format() {
            warnings.push(format!("export.audio_format: {e}"));
        }
        if self.export.video_crf > 51 {
            warnings.push(format!(
                "export.video_crf {} is outside the x264 range 0-51",
                self.export.video_crf
            ));
        }
        if self.transcode.stderr_tail_lines == 0 {
            warnings.push("transcode.stderr_tail_lines is 0; failures will carry no diagnostics".into());
        }
        if self.transcode.timeout_secs == 0 {
            warnings.push("transcode.timeout_secs is 0; every transcode will time out".into());
        }

        for (name, path) in [
            ("tools.ffmpeg_path", &self.tools.ffmpeg_path),
            ("tools.ffprobe_path", &self.tools.ffprobe_path),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!("{name} {} does not exist", p.display()));
                }
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// External tool path overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// Directory searched before `PATH`. Defaults to `tools/` next to the
    /// running executable.
    pub bundled_dir: Option<PathBuf>,
}

/// Export encoding settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub video_format: String,
    pub audio_format: String,
    pub video_crf: u32,
    pub video_preset: String,
    pub audio_bitrate: String,
    /// LAME VBR quality (`-q:a`).
    pub mp3_quality: u32,
    /// Vorbis quality (`-q:a`).
    pub vorbis_quality: u32,
}

impl ExportConfig {
    pub fn video_format(&self) -> Result<VideoFormat> {
        self.video_format.parse()
    }

    pub fn audio_format(&self) -> Result<AudioFormat> {
        self.audio_format.parse()
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            video_format: "mp4".into(),
            audio_format: "m4a".into(),
            video_crf: 20,
            video_preset: "veryfast".into(),
            audio_bitrate: "192k".into(),
            mp3_quality: 2,
            vorbis_quality: 6,
        }
    }
}

/// Transcoder process handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// Minimum gap between delivered progress events.
    pub progress_interval_ms: u64,
    /// How many trailing stderr lines to keep for error reports.
    pub stderr_tail_lines: usize,
    pub timeout_secs: u64,
}

impl TranscodeConfig {
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            progress_interval_ms: 120,
            stderr_tail_lines: 30,
            timeout_secs: 86_400,
        }
    }
}
