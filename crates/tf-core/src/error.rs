//! Unified error type for trackforge.
//!
//! All crates funnel their failures into [`Error`]. Each variant maps to a
//! processing stage via [`Error::stage`], which the batch driver uses to build
//! per-file messages that name both the file and where it failed.

use std::fmt;
use std::path::PathBuf;

/// Outcome of the rollback step of an atomic replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rollback {
    /// No backup existed yet, so there was nothing to restore.
    NotAttempted,
    /// The original file was moved back into place.
    Restored,
    /// Restoring the backup failed; the original is left at the backup path.
    Failed(String),
}

impl fmt::Display for Rollback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAttempted => write!(f, "no rollback needed"),
            Self::Restored => write!(f, "original restored"),
            Self::Failed(msg) => write!(f, "rollback failed: {msg}"),
        }
    }
}

/// Unified error type covering all failure modes in trackforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An external tool is missing or failed its version check.
    #[error("Tool unavailable [{tool}]: {message}")]
    ToolUnavailable {
        /// Name of the tool (e.g. "ffmpeg").
        tool: String,
        /// Why the tool could not be used.
        message: String,
    },

    /// Media probing failed (subprocess or parse error).
    #[error("Probe error: {0}")]
    Probe(String),

    /// A tag container was present but could not be read.
    #[error("Tag read error [{}]: {message}", path.display())]
    TagRead {
        /// File whose tags were being read.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// Writing a tag container failed.
    #[error("Tag write error [{}]: {message}", path.display())]
    TagWrite {
        /// File whose tags were being written.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// The transcoder could not be spawned or exited unsuccessfully.
    #[error("Transcode error [{tool}]: {message}")]
    Transcode {
        /// Name of the tool that failed.
        tool: String,
        /// Stderr tail or spawn failure description.
        message: String,
    },

    /// The rename sequence that swaps a new file into place failed.
    #[error("Replace error [{}]: {message} ({rollback})", path.display())]
    AtomicReplace {
        /// The file that was being replaced.
        path: PathBuf,
        /// Which step failed and why.
        message: String,
        /// Whether the original could be put back.
        rollback: Rollback,
    },

    /// A request or configuration value is invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The file's container has no tag codec.
    #[error("Unsupported format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    /// Stable label of the processing stage this error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            Error::ToolUnavailable { .. } => "tool",
            Error::Probe(_) => "probe",
            Error::TagRead { .. } => "tag-read",
            Error::TagWrite { .. } => "tag-write",
            Error::Transcode { .. } => "transcode",
            Error::AtomicReplace { .. } => "replace",
            Error::Configuration(_) => "config",
            Error::UnsupportedFormat(_) => "format",
            Error::Io { .. } => "io",
        }
    }

    /// Convenience constructor for [`Error::ToolUnavailable`].
    pub fn tool_unavailable(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolUnavailable {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::TagRead`].
    pub fn tag_read(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Error::TagRead {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`Error::TagWrite`].
    pub fn tag_write(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Error::TagWrite {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Transcode`].
    pub fn transcode(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Transcode {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::AtomicReplace`].
    pub fn replace(path: impl Into<PathBuf>, message: impl Into<String>, rollback: Rollback) -> Self {
        Error::AtomicReplace {
            path: path.into(),
            message: message.into(),
            rollback,
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
