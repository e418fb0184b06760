//! # tf-tags
//!
//! Reading and rewriting embedded metadata in two container families:
//!
//! - **MP3** ([`Mp3Codec`]) -- ID3v2 frames (`TIT2`, `TPE1`, `APIC`, ...).
//! - **MP4/M4A** ([`Mp4Codec`]) -- iTunes-style `ilst` atoms (`©nam`,
//!   `trkn`, `covr`, ...).
//!
//! Both implement [`TagCodec`]. Reads never fail: an untagged or unreadable
//! file yields an empty [`TagSet`] wrapped in [`Lenient`]. Writes apply a
//! complete [`TagSet`], deleting every field that is blank, and perform the
//! requested [`CoverAction`] so that at most one cover remains.

mod mp3;
mod mp4;

use std::path::Path;

use tf_core::{CoverAction, Error, Lenient, Result, TagSet};

pub use mp3::Mp3Codec;
pub use mp4::Mp4Codec;

/// A tag container implementation.
pub trait TagCodec: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this codec handles the file, judged by extension.
    fn supports(&self, path: &Path) -> bool;

    /// Read the file's tags. Missing or corrupt containers yield an empty set.
    fn read(&self, path: &Path) -> Lenient<TagSet>;

    /// Replace the file's tags with `tags` and apply `cover`.
    fn write(&self, path: &Path, tags: &TagSet, cover: &CoverAction) -> Result<()>;

    /// Strip the whole tag container. A file without tags is left as is.
    fn remove_all(&self, path: &Path) -> Result<()>;
}

static MP3: Mp3Codec = Mp3Codec;
static MP4: Mp4Codec = Mp4Codec;

/// Pick the codec for a file by its extension.
pub fn codec_for(path: &Path) -> Option<&'static dyn TagCodec> {
    if MP3.supports(path) {
        Some(&MP3)
    } else if MP4.supports(path) {
        Some(&MP4)
    } else {
        None
    }
}

/// Whether any codec can tag this file.
pub fn is_taggable(path: &Path) -> bool {
    codec_for(path).is_some()
}

/// Read tags with whichever codec fits the file.
pub fn read_tags(path: &Path) -> Lenient<TagSet> {
    match codec_for(path) {
        Some(codec) => codec.read(path),
        None => Lenient::degraded(TagSet::default(), Error::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Write tags with whichever codec fits the file.
pub fn write_tags(path: &Path, tags: &TagSet, cover: &CoverAction) -> Result<()> {
    let codec = codec_for(path).ok_or_else(|| Error::UnsupportedFormat(path.to_path_buf()))?;
    tracing::debug!("writing {} tags to {}", codec.name(), path.display());
    codec.write(path, tags, cover)
}

/// Remove all tags with whichever codec fits the file.
pub fn remove_tags(path: &Path) -> Result<()> {
    let codec = codec_for(path).ok_or_else(|| Error::UnsupportedFormat(path.to_path_buf()))?;
    tracing::debug!("removing {} tags from {}", codec.name(), path.display());
    codec.remove_all(path)
}

pub(crate) fn has_extension(path: &Path, candidates: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| candidates.iter().any(|c| e.eq_ignore_ascii_case(c)))
        .unwrap_or(false)
}
