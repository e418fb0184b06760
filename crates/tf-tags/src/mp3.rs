//! ID3v2 tags in MPEG audio files.

use std::path::Path;

use id3::frame::{Comment, Picture, PictureType};
use id3::{ErrorKind, Tag, TagLike, Version};
use tf_core::{
    CoverAction, CoverArt, CoverMime, Error, FieldValue, Lenient, Result, TagField, TagSet,
    TrackNumber,
};

/// Language code written on `COMM` frames.
const COMMENT_LANG: &str = "eng";
const COVER_FRAME: &str = "APIC";
const COVER_DESCRIPTION: &str = "Cover";

/// Frame identifier for each field.
const fn frame_id(field: TagField) -> &'static str {
    match field {
        TagField::Title => "TIT2",
        TagField::Artist => "TPE1",
        TagField::Album => "TALB",
        TagField::Track => "TRCK",
        TagField::Year => "TDRC",
        TagField::Genre => "TCON",
        TagField::Comment => "COMM",
    }
}

/// ID3v2 codec for `.mp3` files. Tags are always saved as ID3v2.4.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mp3Codec;

impl super::TagCodec for Mp3Codec {
    fn name(&self) -> &'static str {
        "id3v2"
    }

    fn supports(&self, path: &Path) -> bool {
        super::has_extension(path, &["mp3"])
    }

    fn read(&self, path: &Path) -> Lenient<TagSet> {
        match load(path) {
            Ok(Some(tag)) => Lenient::ok(tag_set_from(&tag)),
            // Untagged is normal, not a failure.
            Ok(None) => Lenient::ok(TagSet::default()),
            Err(e) => {
                tracing::debug!("{e}");
                Lenient::degraded(TagSet::default(), e)
            }
        }
    }

    fn write(&self, path: &Path, tags: &TagSet, cover: &CoverAction) -> Result<()> {
        let mut tag = match load(path) {
            Ok(existing) => existing.unwrap_or_default(),
            Err(e) => return Err(Error::tag_write(path, e)),
        };

        apply(&mut tag, tags, cover).map_err(|msg| Error::tag_write(path, msg))?;

        tag.write_to_path(path, Version::Id3v24)
            .map_err(|e| Error::tag_write(path, e))
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let removed = Tag::remove_from_path(path).map_err(|e| Error::tag_write(path, e))?;
        if !removed {
            tracing::debug!("no ID3 tag in {}; nothing to remove", path.display());
        }
        Ok(())
    }
}

/// Read the existing tag; `Ok(None)` when the file has no ID3v2 header.
fn load(path: &Path) -> Result<Option<Tag>> {
    match Tag::read_from_path(path) {
        Ok(tag) => Ok(Some(tag)),
        Err(e) if matches!(e.kind, ErrorKind::NoTag) => Ok(None),
        Err(e) => Err(Error::tag_read(path, e)),
    }
}

fn text_of(tag: &Tag, field: TagField) -> Option<&str> {
    tag.get(frame_id(field)).and_then(|f| f.content().text())
}

fn tag_set_from(tag: &Tag) -> TagSet {
    let mut set = TagSet::default();
    for field in [
        TagField::Title,
        TagField::Artist,
        TagField::Album,
        TagField::Year,
        TagField::Genre,
    ] {
        set.set_text(field, text_of(tag, field));
    }

    set.track = text_of(tag, TagField::Track)
        .map(TrackNumber::parse)
        .filter(TrackNumber::is_set);

    set.set_text(TagField::Comment, tag.comments().next().map(|c| c.text.as_str()));

    set.cover = tag
        .pictures()
        .next()
        .map(|p| CoverArt::new(p.data.clone(), CoverMime::from_mime(&p.mime_type)));

    set
}

fn apply(tag: &mut Tag, tags: &TagSet, cover: &CoverAction) -> std::result::Result<(), String> {
    for (field, value) in tags.updates() {
        let id = frame_id(field);
        match value {
            FieldValue::Text(text) if field == TagField::Comment => {
                tag.remove(id);
                tag.add_frame(Comment {
                    lang: COMMENT_LANG.to_string(),
                    description: String::new(),
                    text,
                });
            }
            FieldValue::Text(text) => tag.set_text(id, text),
            FieldValue::Track(track) => tag.set_text(id, track.to_string()),
            FieldValue::Clear => {
                tag.remove(id);
            }
        }
    }

    match cover {
        CoverAction::NoChange => {}
        CoverAction::Remove => {
            tag.remove(COVER_FRAME);
        }
        CoverAction::Set(art) => {
            if art.data.is_empty() {
                return Err("cover image is empty".into());
            }
            tag.remove(COVER_FRAME);
            tag.add_frame(Picture {
                mime_type: art.mime.as_mime().to_string(),
                picture_type: PictureType::CoverFront,
                description: COVER_DESCRIPTION.to_string(),
                data: art.data.clone(),
            });
        }
    }

    Ok(())
}
