//! # tf-av
//!
//! External tool plumbing for trackforge.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- resolve ffmpeg and ffprobe
//!   from config, a bundled tools directory or `PATH`, verified by a
//!   `-version` run.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support, plus a streaming mode that drains stderr concurrently.
//! - **Metadata probe** ([`FfprobeProber`]) -- duration, dimensions and genre
//!   via `ffprobe`, degrading to an empty result on failure.
//! - **Progress decoding** ([`ProgressParser`], [`ProgressThrottle`]) -- the
//!   `-progress pipe:1` key=value stream.
//! - **Transcoding** ([`Transcoder`]) -- in-place genre remux and exports.
//! - **Atomic replace** ([`Workspace`], [`replace`], [`recover`]) --
//!   temp/backup sibling protocol with rollback and crash recovery.

pub mod command;
pub mod probe;
pub mod progress;
pub mod tools;
pub mod transcode;
pub mod workspace;

// ---- Re-exports for convenience ----

pub use command::{StreamOutput, ToolCommand, ToolOutput};
pub use probe::{parse_probe_json, FfprobeProber};
pub use progress::{ProgressParser, ProgressThrottle};
pub use tools::{ResolvedTool, ToolInfo, ToolRegistry, FFMPEG, FFPROBE};
pub use transcode::Transcoder;
pub use workspace::{recover, replace, RecoveryReport, ReplaceOutcome, Workspace};
