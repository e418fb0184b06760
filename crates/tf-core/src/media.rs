//! Media-domain types: file kinds, export formats, probe results and
//! transcode progress.
//!
//! Enums serialize in lowercase and implement `Display` manually for
//! consistent string representation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::Error;

/// Extensions treated as video files.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "m4v", "avi", "wmv", "flv", "webm"];

/// Extensions treated as audio files.
pub const AUDIO_EXTENSIONS: &[&str] = &["m4a", "mp3", "ogg", "wav", "flac", "aac", "alac", "aiff"];

fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

// ---------------------------------------------------------------------------
// MediaKind
// ---------------------------------------------------------------------------

/// Broad classification of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
}

impl MediaKind {
    /// Classify by extension (case-insensitive). `None` for anything else.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = extension_lower(path)?;
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Audio)
        } else {
            None
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

// ---------------------------------------------------------------------------
// Export formats
// ---------------------------------------------------------------------------

/// Audio-only export targets, chosen by output extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    /// AAC in an MP4 audio container.
    M4a,
    /// MPEG-1 Layer III.
    Mp3,
    /// Vorbis in Ogg.
    Ogg,
}

impl AudioFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::M4a => "m4a",
            Self::Mp3 => "mp3",
            Self::Ogg => "ogg",
        }
    }

    /// Select the format from an output path's extension.
    pub fn from_path(path: &Path) -> crate::Result<Self> {
        let ext = extension_lower(path).unwrap_or_default();
        ext.parse()
    }
}

impl FromStr for AudioFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "m4a" => Ok(Self::M4a),
            "mp3" => Ok(Self::Mp3),
            "ogg" => Ok(Self::Ogg),
            other => Err(Error::Configuration(format!(
                "unsupported audio export format: '{other}' (expected m4a, mp3 or ogg)"
            ))),
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Video export containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    Mkv,
    Mov,
}

impl VideoFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Mov => "mov",
        }
    }
}

impl FromStr for VideoFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "mkv" => Ok(Self::Mkv),
            "mov" => Ok(Self::Mov),
            other => Err(Error::Configuration(format!(
                "unsupported video export format: '{other}' (expected mp4, mkv or mov)"
            ))),
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

// ---------------------------------------------------------------------------
// ProbeResult
// ---------------------------------------------------------------------------

/// What the prober could learn about a file. Every field is independent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub duration_seconds: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub genre: Option<String>,
}

impl ProbeResult {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Lifecycle phase of a transcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressPhase {
    Running,
    Finished,
}

/// One progress update from a transcode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Percent complete in `0.0..=100.0`; `None` while the duration is unknown.
    pub percent: Option<f64>,
    pub phase: ProgressPhase,
}

impl ProgressEvent {
    pub fn running(percent: Option<f64>) -> Self {
        Self {
            percent,
            phase: ProgressPhase::Running,
        }
    }

    pub fn finished() -> Self {
        Self {
            percent: Some(100.0),
            phase: ProgressPhase::Finished,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.phase == ProgressPhase::Finished
    }
}
