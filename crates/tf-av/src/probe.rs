//! FFprobe-based metadata probe.
//!
//! Shells out to `ffprobe -v error -print_format json -show_format
//! -show_streams` and maps the JSON into a [`ProbeResult`]. Probing never
//! fails outright: any spawn, exit or parse problem produces an empty result
//! wrapped in [`Lenient`] with the reason attached.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tf_core::{Error, Lenient, ProbeResult, Result};

use crate::command::ToolCommand;
use crate::tools::{ToolRegistry, FFPROBE};

const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    /// Path to the ffprobe binary; `None` when the tool is unavailable.
    ffprobe_path: Option<PathBuf>,
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self {
            ffprobe_path: Some(ffprobe_path),
        }
    }

    /// Use the registry's ffprobe, if it has one.
    pub fn from_registry(tools: &ToolRegistry) -> Self {
        Self {
            ffprobe_path: tools.require(FFPROBE).ok().map(|t| t.path.clone()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.ffprobe_path.is_some()
    }

    /// Probe a file. Degrades to an empty result on any failure.
    pub async fn probe(&self, path: &Path) -> Lenient<ProbeResult> {
        let result = self.probe_strict(path).await;
        if let Err(e) = &result {
            tracing::debug!("probe of {} degraded: {e}", path.display());
        }
        Lenient::from_result(result)
    }

    async fn probe_strict(&self, path: &Path) -> Result<ProbeResult> {
        let Some(ffprobe) = &self.ffprobe_path else {
            return Err(Error::tool_unavailable(FFPROBE, "ffprobe is not available"));
        };

        let output = ToolCommand::new(ffprobe.clone())
            .args(probe_args(path))
            .timeout(PROBE_TIMEOUT)
            .execute()
            .await
            .map_err(|e| Error::Probe(e.to_string()))?;

        parse_probe_json(&output.stdout)
    }
}

/// Arguments for one probe run.
pub fn probe_args(path: &Path) -> Vec<String> {
    let mut args: Vec<String> = [
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_format",
        "-show_streams",
    ]
    .into_iter()
    .map(String::from)
    .collect();
    args.push(path.to_string_lossy().into_owned());
    args
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    // ffprobe writes a string; some builds and wrappers emit a number.
    duration: Option<Value>,
    #[serde(default)]
    tags: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<Value>,
    height: Option<Value>,
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Map ffprobe's JSON output to a [`ProbeResult`].
///
/// # Errors
///
/// Returns [`Error::Probe`] if the text is not a JSON object of the expected
/// shape. Individual unparsable fields become `None` instead.
pub fn parse_probe_json(json: &str) -> Result<ProbeResult> {
    let output: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::Probe(format!("ffprobe JSON parse error: {e}")))?;

    let genre = ["genre", "GENRE"]
        .iter()
        .filter_map(|key| output.format.tags.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|g| !g.is_empty())
        .map(str::to_string);

    let duration_seconds = output.format.duration.as_ref().and_then(number);

    let (width, height) = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .map(|s| (dimension(s.width.as_ref()), dimension(s.height.as_ref())))
        .unwrap_or((None, None));

    Ok(ProbeResult {
        duration_seconds,
        width,
        height,
        genre,
    })
}

fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn dimension(value: Option<&Value>) -> Option<u32> {
    value
        .and_then(number)
        .filter(|n| *n >= 0.0 && *n <= f64::from(u32::MAX))
        .map(|n| n as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VIDEO_JSON: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "audio", "codec_name": "aac"},
            {"index": 1, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080},
            {"index": 2, "codec_type": "video", "codec_name": "mjpeg", "width": 600, "height": 600}
        ],
        "format": {
            "filename": "clip.mp4",
            "duration": "12.345000",
            "tags": {"genre": "  Documentary  ", "title": "Clip"}
        }
    }"#;

    #[test]
    fn parse_video_output() {
        let result = parse_probe_json(VIDEO_JSON).unwrap();
        assert_eq!(result.duration_seconds, Some(12.345));
        assert_eq!(result.width, Some(1920));
        assert_eq!(result.height, Some(1080));
        assert_eq!(result.genre.as_deref(), Some("Documentary"));
    }

    #[test]
    fn uppercase_genre_key() {
        let json = r#"{"format": {"tags": {"GENRE": "Jazz"}}, "streams": []}"#;
        assert_eq!(parse_probe_json(json).unwrap().genre.as_deref(), Some("Jazz"));
    }

    #[test]
    fn blank_genre_is_none() {
        let json = r#"{"format": {"tags": {"genre": "   "}}}"#;
        assert_eq!(parse_probe_json(json).unwrap().genre, None);
    }

    #[test]
    fn stream_level_genre_is_ignored() {
        let json = r#"{"format": {}, "streams": [{"codec_type": "audio", "tags": {"genre": "Rock"}}]}"#;
        assert_eq!(parse_probe_json(json).unwrap().genre, None);
    }

    #[test]
    fn audio_only_has_no_dimensions() {
        let json = r#"{"format": {"duration": "200.5"}, "streams": [{"codec_type": "audio"}]}"#;
        let result = parse_probe_json(json).unwrap();
        assert_eq!(result.duration_seconds, Some(200.5));
        assert_eq!((result.width, result.height), (None, None));
    }

    #[test]
    fn numeric_and_bad_durations() {
        let json = r#"{"format": {"duration": 3.5}}"#;
        assert_eq!(parse_probe_json(json).unwrap().duration_seconds, Some(3.5));

        let json = r#"{"format": {"duration": "N/A"}}"#;
        assert_eq!(parse_probe_json(json).unwrap().duration_seconds, None);
    }

    #[test]
    fn invalid_json_is_probe_error() {
        let err = parse_probe_json("not json").unwrap_err();
        assert!(matches!(err, Error::Probe(_)));
        assert!(parse_probe_json("{}").unwrap().is_empty());
    }

    #[test]
    fn fixed_argument_set() {
        let args = probe_args(Path::new("/m/a b.mp4"));
        assert_eq!(
            args,
            ["-v", "error", "-print_format", "json", "-show_format", "-show_streams", "/m/a b.mp4"]
        );
    }

    #[tokio::test]
    async fn unavailable_prober_degrades() {
        let prober = FfprobeProber::from_registry(&ToolRegistry::default());
        assert!(!prober.is_available());
        let result = prober.probe(Path::new("/nowhere.mp4")).await;
        assert!(result.value().is_empty());
        assert_eq!(result.degradation().map(Error::stage), Some("tool"));
    }

    #[cfg(unix)]
    mod fake_tool {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        fn fake_ffprobe(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("ffprobe");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[tokio::test]
        async fn probe_runs_tool_and_parses() {
            let dir = tempfile::tempdir().unwrap();
            let json = dir.path().join("out.json");
            std::fs::write(&json, VIDEO_JSON).unwrap();
            let tool = fake_ffprobe(dir.path(), &format!("cat '{}'", json.display()));

            let result = FfprobeProber::new(tool).probe(Path::new("clip.mp4")).await;
            assert!(!result.is_degraded());
            assert_eq!(result.value().width, Some(1920));
        }

        #[tokio::test]
        async fn nonzero_exit_degrades_to_empty() {
            let dir = tempfile::tempdir().unwrap();
            let tool = fake_ffprobe(dir.path(), "echo 'clip.mp4: Invalid data' >&2; exit 1");

            let result = FfprobeProber::new(tool).probe(Path::new("clip.mp4")).await;
            assert!(result.value().is_empty());
            assert_eq!(result.degradation().map(Error::stage), Some("probe"));
        }

        #[tokio::test]
        async fn garbage_output_degrades_to_empty() {
            let dir = tempfile::tempdir().unwrap();
            let tool = fake_ffprobe(dir.path(), "echo '{{{'");

            let result = FfprobeProber::new(tool).probe(Path::new("clip.mp4")).await;
            assert!(result.is_degraded());
            assert!(result.into_value().is_empty());
        }
    }
}
