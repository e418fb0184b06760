//! Shared helpers for integration tests.
//!
//! Provides stand-in `ffmpeg`/`ffprobe` shell scripts (unix only) and a
//! [`Config`] pointing at them, so transcode flows can run without real
//! tools installed.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tf_core::config::Config;

/// Bytes that look enough like an MPEG audio frame for tagging tests.
pub const MP3_BODY: &[u8] = &[0xFF, 0xFB, 0x90, 0x64, 0x00, 0x00, 0x00, 0x00, 0x12, 0x34];

/// Copies the `-i` input to the last argument, prints a progress stream,
/// and appends `\ngenre=<value>` so the remuxed genre is observable.
/// A genre containing `FAIL` makes it exit 1.
const FAKE_FFMPEG: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffmpeg version 6.1-fake"; exit 0; fi
in=""; prev=""; out=""; genre=""
for a in "$@"; do
  if [ "$prev" = "-i" ]; then in="$a"; fi
  case "$a" in genre=*) genre="${a#genre=}";; esac
  prev="$a"; out="$a"
done
case "$genre" in *FAIL*) echo "Error writing trailer of $out" >&2; exit 1;; esac
echo "duration_ms=2000"
echo "out_time_ms=1000"
echo "progress=continue"
echo "out_time_ms=2000"
echo "progress=end"
cp "$in" "$out"
printf '\ngenre=%s' "$genre" >> "$out"
"#;

/// Reports the genre found on the file's last `genre=` line.
const FAKE_FFPROBE: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then echo "ffprobe version 6.1-fake"; exit 0; fi
for a in "$@"; do f="$a"; done
g=$(tail -n 1 "$f" | sed -n 's/^genre=//p')
printf '{"format":{"duration":"2.0","tags":{"genre":"%s"}},"streams":[]}' "$g"
"#;

#[cfg(unix)]
fn install(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Install fake tools into `dir` and return a config that uses them.
#[cfg(unix)]
pub fn fake_tools_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.tools.ffmpeg_path = Some(install(dir, "ffmpeg", FAKE_FFMPEG));
    config.tools.ffprobe_path = Some(install(dir, "ffprobe", FAKE_FFPROBE));
    config.tools.bundled_dir = Some(dir.to_path_buf());
    config
}

/// Write `body` to `dir/name` and return the path.
pub fn write_file(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    path
}

/// Sorted file names in `dir`.
pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
