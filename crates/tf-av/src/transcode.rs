//! ffmpeg invocations: in-place genre remux and export transcodes.
//!
//! Both run ffmpeg with `-progress pipe:1 -nostats`, decode the progress
//! stream with [`ProgressParser`], rate-limit delivery with
//! [`ProgressThrottle`], and write to a [`Workspace`] temp file that is
//! swapped into place only after ffmpeg exits cleanly.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tf_core::config::{Config, ExportConfig, TranscodeConfig};
use tf_core::{AudioFormat, MediaKind, ProgressEvent, Result};

use crate::command::ToolCommand;
use crate::progress::{ProgressParser, ProgressThrottle};
use crate::tools::{ToolRegistry, FFMPEG};
use crate::workspace::{ReplaceOutcome, Workspace};

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Arguments that rewrite only the `genre` tag, copying every stream.
pub fn genre_remux_args(src: &Path, out: &Path, genre: &str) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        path_arg(src),
        "-map".into(),
        "0".into(),
        "-c".into(),
        "copy".into(),
        "-metadata".into(),
        format!("genre={genre}"),
        "-progress".into(),
        "pipe:1".into(),
        "-nostats".into(),
        path_arg(out),
    ]
}

/// Encoder arguments for an export to `dst`.
///
/// Video keeps the first video stream and any audio, re-encoded to H.264 and
/// AAC. Audio picks its codec from the extension of `dst`.
///
/// # Errors
///
/// [`tf_core::Error::Configuration`] for an audio target whose extension is
/// not `.m4a`, `.mp3` or `.ogg`.
pub fn export_codec_args(kind: MediaKind, dst: &Path, export: &ExportConfig) -> Result<Vec<String>> {
    let args: Vec<String> = match kind {
        MediaKind::Video => vec![
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "0:a?".into(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            export.video_preset.clone(),
            "-crf".into(),
            export.video_crf.to_string(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            export.audio_bitrate.clone(),
        ],
        MediaKind::Audio => {
            let (encoder, quality_flag, quality) = match AudioFormat::from_path(dst)? {
                AudioFormat::M4a => ("aac", "-b:a", export.audio_bitrate.clone()),
                AudioFormat::Mp3 => ("libmp3lame", "-q:a", export.mp3_quality.to_string()),
                AudioFormat::Ogg => ("libvorbis", "-q:a", export.vorbis_quality.to_string()),
            };
            vec![
                "-vn".into(),
                "-c:a".into(),
                encoder.into(),
                quality_flag.into(),
                quality,
            ]
        }
    };
    Ok(args)
}

/// Full export command line writing to `out`.
pub fn export_args(src: &Path, out: &Path, codec_args: Vec<String>) -> Vec<String> {
    let mut args = vec!["-y".to_string(), "-i".into(), path_arg(src)];
    args.extend(codec_args);
    args.extend(["-progress".into(), "pipe:1".into(), "-nostats".into()]);
    args.push(path_arg(out));
    args
}

/// Runs ffmpeg jobs with progress reporting.
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg: PathBuf,
    export: ExportConfig,
    transcode: TranscodeConfig,
}

impl Transcoder {
    pub fn new(ffmpeg: PathBuf, config: &Config) -> Self {
        Self {
            ffmpeg,
            export: config.export.clone(),
            transcode: config.transcode.clone(),
        }
    }

    /// Use the registry's ffmpeg.
    ///
    /// # Errors
    ///
    /// [`tf_core::Error::ToolUnavailable`] when ffmpeg was not resolved.
    pub fn from_registry(tools: &ToolRegistry, config: &Config) -> Result<Self> {
        let ffmpeg = tools.require(FFMPEG)?;
        Ok(Self::new(ffmpeg.path.clone(), config))
    }

    /// Rewrite the `genre` tag of `src` in place without re-encoding.
    pub async fn remux_genre(
        &self,
        src: &Path,
        genre: &str,
        duration_hint: Option<f64>,
        on_progress: impl FnMut(ProgressEvent),
    ) -> Result<ReplaceOutcome> {
        let ws = Workspace::new(src)?;
        let args = genre_remux_args(src, ws.temp_path(), genre);

        tracing::info!("genre remux: {} (genre={genre:?})", src.display());
        self.run(args, duration_hint, on_progress).await?;
        ws.finalize()
    }

    /// Transcode `src` to `dst`, replacing `dst` if it exists.
    ///
    /// The target format is validated before anything touches the disk.
    pub async fn export(
        &self,
        src: &Path,
        dst: &Path,
        kind: MediaKind,
        duration_hint: Option<f64>,
        on_progress: impl FnMut(ProgressEvent),
    ) -> Result<ReplaceOutcome> {
        let codec_args = export_codec_args(kind, dst, &self.export)?;
        let ws = Workspace::new(dst)?;
        let args = export_args(src, ws.temp_path(), codec_args);

        tracing::info!("{kind} export: {} -> {}", src.display(), dst.display());
        self.run(args, duration_hint, on_progress).await?;
        ws.finalize()
    }

    async fn run(
        &self,
        args: Vec<String>,
        duration_hint: Option<f64>,
        mut on_progress: impl FnMut(ProgressEvent),
    ) -> Result<()> {
        let mut parser = ProgressParser::with_duration_hint(duration_hint);
        let mut throttle = ProgressThrottle::new(self.transcode.progress_interval());

        tracing::debug!("ffmpeg {}", args.join(" "));
        ToolCommand::new(self.ffmpeg.clone())
            .args(args)
            .timeout(self.transcode.timeout())
            .stderr_tail(self.transcode.stderr_tail_lines)
            .execute_streaming(|line| {
                if let Some(event) = parser.feed(line) {
                    if throttle.admit(&event, Instant::now()) {
                        on_progress(event);
                    }
                }
            })
            .await?;

        // Clean exit without a terminal marker still completes the job.
        if !parser.is_finished() {
            on_progress(ProgressEvent::finished());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tf_core::Error;

    fn strs(args: &[String]) -> Vec<&str> {
        args.iter().map(String::as_str).collect()
    }

    #[test]
    fn genre_remux_command_shape() {
        let args = genre_remux_args(
            Path::new("/v/clip.mp4"),
            Path::new("/v/clip.__tmp__.mp4"),
            "Nature; Travel",
        );
        assert_eq!(
            strs(&args),
            [
                "-y", "-i", "/v/clip.mp4", "-map", "0", "-c", "copy", "-metadata",
                "genre=Nature; Travel", "-progress", "pipe:1", "-nostats", "/v/clip.__tmp__.mp4"
            ]
        );
    }

    #[test]
    fn video_export_shape() {
        let codec = export_codec_args(MediaKind::Video, Path::new("/out/a.mp4"), &ExportConfig::default())
            .unwrap();
        let args = export_args(Path::new("/in/a.mkv"), Path::new("/out/a.__tmp__.mp4"), codec);
        assert_eq!(
            strs(&args),
            [
                "-y", "-i", "/in/a.mkv", "-map", "0:v:0", "-map", "0:a?", "-c:v", "libx264",
                "-preset", "veryfast", "-crf", "20", "-c:a", "aac", "-b:a", "192k", "-progress",
                "pipe:1", "-nostats", "/out/a.__tmp__.mp4"
            ]
        );
    }

    #[test]
    fn audio_codecs_follow_extension() {
        let cfg = ExportConfig::default();
        let codec = |name: &str| export_codec_args(MediaKind::Audio, Path::new(name), &cfg).unwrap();

        assert_eq!(strs(&codec("x.m4a")), ["-vn", "-c:a", "aac", "-b:a", "192k"]);
        assert_eq!(strs(&codec("x.MP3")), ["-vn", "-c:a", "libmp3lame", "-q:a", "2"]);
        assert_eq!(strs(&codec("x.ogg")), ["-vn", "-c:a", "libvorbis", "-q:a", "6"]);
    }

    #[test]
    fn unknown_audio_extension_is_configuration_error() {
        let err = export_codec_args(MediaKind::Audio, Path::new("x.wma"), &ExportConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn unknown_extension_rejected_before_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.mp3");
        std::fs::write(&src, b"audio").unwrap();
        let dst = dir.path().join("out.wma");
        // Would be removed by a Workspace if one were created.
        let stale = crate::workspace::temp_path(&dst);
        std::fs::write(&stale, b"stale").unwrap();

        // The binary does not exist: reaching the spawn would be a transcode error.
        let transcoder = Transcoder::new(dir.path().join("no-ffmpeg"), &Config::default());
        let err = transcoder
            .export(&src, &dst, MediaKind::Audio, None, |_| {})
            .await
            .unwrap_err();

        assert_eq!(err.stage(), "config");
        assert!(stale.exists());
        assert!(!dst.exists());
    }

    #[test]
    fn from_registry_requires_ffmpeg() {
        let err = Transcoder::from_registry(&ToolRegistry::default(), &Config::default()).unwrap_err();
        assert!(matches!(err, Error::ToolUnavailable { .. }));
    }

    #[cfg(unix)]
    mod fake_ffmpeg {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tf_core::ProgressPhase;

        /// A stand-in ffmpeg: copies `-i` input to the last argument, prints a
        /// progress stream, and honours `FAIL` in the genre value.
        const SCRIPT: &str = r#"#!/bin/sh
in=""; prev=""; out=""; genre=""
for a in "$@"; do
  if [ "$prev" = "-i" ]; then in="$a"; fi
  case "$a" in genre=*) genre="${a#genre=}";; esac
  prev="$a"; out="$a"
done
case "$genre" in *FAIL*) echo "Error opening output: $out" >&2; echo "Conversion failed!" >&2; exit 1;; esac
echo "duration_ms=1000"
echo "out_time_ms=500"
echo "progress=continue"
echo "out_time_ms=1000"
echo "progress=end"
cp "$in" "$out"
printf '\ngenre=%s' "$genre" >> "$out"
"#;

        fn fake(dir: &Path) -> Transcoder {
            let path = dir.join("ffmpeg");
            std::fs::write(&path, SCRIPT).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            Transcoder::new(path, &Config::default())
        }

        fn listing(dir: &Path) -> Vec<String> {
            let mut names: Vec<String> = std::fs::read_dir(dir)
                .unwrap()
                .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                .filter(|n| n != "ffmpeg")
                .collect();
            names.sort();
            names
        }

        #[tokio::test]
        async fn remux_replaces_in_place() {
            let dir = tempfile::tempdir().unwrap();
            let src = dir.path().join("clip.mp4");
            std::fs::write(&src, b"video").unwrap();

            let mut events = Vec::new();
            let outcome = fake(dir.path())
                .remux_genre(&src, "Rock; Pop", None, |e| events.push(e))
                .await
                .unwrap();

            assert_eq!(outcome.target, src);
            assert_eq!(std::fs::read_to_string(&src).unwrap(), "video\ngenre=Rock; Pop");
            assert_eq!(listing(dir.path()), ["clip.mp4"]);

            // First event always passes; the terminal one is never dropped.
            assert_eq!(events.first().unwrap().percent, Some(50.0));
            let last = events.last().unwrap();
            assert_eq!(last.phase, ProgressPhase::Finished);
            assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));
        }

        #[tokio::test]
        async fn failed_remux_leaves_original_and_no_temp() {
            let dir = tempfile::tempdir().unwrap();
            let src = dir.path().join("clip.mp4");
            std::fs::write(&src, b"video").unwrap();

            let err = fake(dir.path())
                .remux_genre(&src, "FAIL", None, |_| {})
                .await
                .unwrap_err();

            assert_eq!(err.stage(), "transcode");
            assert!(err.to_string().contains("Conversion failed!"), "{err}");
            assert_eq!(std::fs::read(&src).unwrap(), b"video");
            assert_eq!(listing(dir.path()), ["clip.mp4"]);
        }

        #[tokio::test]
        async fn export_writes_destination() {
            let dir = tempfile::tempdir().unwrap();
            let src = dir.path().join("song.flac");
            std::fs::write(&src, b"lossless").unwrap();
            let out_dir = dir.path().join("out");
            std::fs::create_dir(&out_dir).unwrap();
            let dst = out_dir.join("song.ogg");

            fake(dir.path())
                .export(&src, &dst, MediaKind::Audio, Some(1.0), |_| {})
                .await
                .unwrap();

            assert!(std::fs::read_to_string(&dst).unwrap().starts_with("lossless"));
            assert_eq!(listing(&out_dir), ["song.ogg"]);
        }
    }
}
