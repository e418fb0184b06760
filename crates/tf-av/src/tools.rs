//! External tool detection and management.
//!
//! The [`ToolRegistry`] locates ffmpeg and ffprobe, confirms each one runs by
//! asking for its version, and hands out the verified paths. A tool that is
//! missing or fails the check is recorded as unavailable together with the
//! reason, so callers can degrade instead of aborting.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tf_core::config::ToolsConfig;
use tf_core::{Error, Result};

use crate::command::ToolCommand;

/// Name of the transcoder binary.
pub const FFMPEG: &str = "ffmpeg";
/// Name of the prober binary.
pub const FFPROBE: &str = "ffprobe";

/// Known tool names that the registry manages.
const KNOWN_TOOLS: &[&str] = &[FFMPEG, FFPROBE];

/// Limit for the `-version` availability check.
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// A tool that was found and passed its version check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedTool {
    /// Tool name (e.g. "ffmpeg").
    pub name: String,
    /// Path to the executable.
    pub path: PathBuf,
    /// First line of `-version` output.
    pub version: Option<String>,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool is usable.
    pub available: bool,
    /// Version string, if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
    /// Why the tool is unavailable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Registry holding verified tool locations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ResolvedTool>,
    unavailable: HashMap<String, String>,
}

impl ToolRegistry {
    /// Resolve and verify every known tool.
    ///
    /// Candidates are tried in order: the explicit path from
    /// [`ToolsConfig`], the bundled tools directory, then `PATH`. The first
    /// candidate whose `-version` run succeeds is kept.
    pub async fn discover(config: &ToolsConfig) -> Self {
        let mut registry = Self::default();

        for &name in KNOWN_TOOLS {
            let candidates = candidates(name, config);
            if candidates.is_empty() {
                tracing::warn!("{name} not found (config, bundled tools, PATH)");
                registry
                    .unavailable
                    .insert(name.to_string(), format!("{name} not found"));
                continue;
            }

            let mut last_failure = None;
            for path in candidates {
                match check_version(name, &path).await {
                    Ok(version) => {
                        tracing::debug!("{name} resolved to {}", path.display());
                        registry.tools.insert(
                            name.to_string(),
                            ResolvedTool {
                                name: name.to_string(),
                                path,
                                version,
                            },
                        );
                        last_failure = None;
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("{name} candidate {} rejected: {e}", path.display());
                        last_failure = Some(e.to_string());
                    }
                }
            }

            if let Some(reason) = last_failure {
                tracing::warn!("{name} unavailable: {reason}");
                registry.unavailable.insert(name.to_string(), reason);
            }
        }

        registry
    }

    /// Return the verified tool, or [`Error::ToolUnavailable`] explaining
    /// why it cannot be used.
    pub fn require(&self, name: &str) -> Result<&ResolvedTool> {
        self.tools.get(name).ok_or_else(|| {
            let reason = self
                .unavailable
                .get(name)
                .cloned()
                .unwrap_or_else(|| format!("{name} not found; is it installed and in PATH?"));
            Error::tool_unavailable(name, reason)
        })
    }

    pub fn is_available(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Availability of every known tool, in a fixed order.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(tool) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: tool.version.clone(),
                    path: Some(tool.path.clone()),
                    message: None,
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                    message: self.unavailable.get(name).cloned(),
                },
            })
            .collect()
    }
}

/// Platform file name of a tool (`ffmpeg.exe` on Windows).
fn executable_name(name: &str) -> String {
    format!("{name}{}", std::env::consts::EXE_SUFFIX)
}

/// The `tools/` directory next to the running executable.
fn default_bundled_dir() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    exe.parent().map(|dir| dir.join("tools"))
}

/// Existing candidate paths for `name`, most preferred first.
fn candidates(name: &str, config: &ToolsConfig) -> Vec<PathBuf> {
    let explicit = match name {
        FFMPEG => config.ffmpeg_path.as_deref(),
        FFPROBE => config.ffprobe_path.as_deref(),
        _ => None,
    };

    let bundled = config
        .bundled_dir
        .clone()
        .or_else(default_bundled_dir)
        .map(|dir| dir.join(executable_name(name)));

    let mut out: Vec<PathBuf> = Vec::new();
    for path in [explicit.map(Path::to_path_buf), bundled, which::which(name).ok()]
        .into_iter()
        .flatten()
    {
        if path.is_file() && !out.contains(&path) {
            out.push(path);
        }
    }
    out
}

/// Run `<tool> -version` and return the first line of stdout.
async fn check_version(name: &str, path: &Path) -> Result<Option<String>> {
    let output = ToolCommand::new(path.to_path_buf())
        .arg("-version")
        .timeout(VERSION_CHECK_TIMEOUT)
        .execute()
        .await
        .map_err(|e| Error::tool_unavailable(name, format!("{} could not be run: {e}", path.display())))?;

    Ok(output.stdout.lines().next().map(|s| s.trim().to_string()))
}
