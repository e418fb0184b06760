//! iTunes-style `ilst` metadata in MPEG-4 files.

use std::path::Path;

use mp4ameta::{Data, DataIdent, Fourcc, Img, ImgFmt, Tag};
use tf_core::{
    CoverAction, CoverArt, CoverMime, Error, FieldValue, Lenient, Result, TagField, TagSet,
    TrackNumber,
};

const TITLE: Fourcc = Fourcc(*b"\xa9nam");
const ARTIST: Fourcc = Fourcc(*b"\xa9ART");
const ALBUM: Fourcc = Fourcc(*b"\xa9alb");
const YEAR: Fourcc = Fourcc(*b"\xa9day");
const GENRE: Fourcc = Fourcc(*b"\xa9gen");
const COMMENT: Fourcc = Fourcc(*b"\xa9cmt");

/// Atom for a text field; `None` for the track pair, which has its own
/// binary layout.
fn text_atom(field: TagField) -> Option<Fourcc> {
    match field {
        TagField::Title => Some(TITLE),
        TagField::Artist => Some(ARTIST),
        TagField::Album => Some(ALBUM),
        TagField::Year => Some(YEAR),
        TagField::Genre => Some(GENRE),
        TagField::Comment => Some(COMMENT),
        TagField::Track => None,
    }
}

/// MP4 codec for `.m4a`, `.m4b`, `.mp4` and `.m4v`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mp4Codec;

impl super::TagCodec for Mp4Codec {
    fn name(&self) -> &'static str {
        "mp4"
    }

    fn supports(&self, path: &Path) -> bool {
        super::has_extension(path, &["m4a", "m4b", "mp4", "m4v"])
    }

    fn read(&self, path: &Path) -> Lenient<TagSet> {
        match Tag::read_from_path(path) {
            Ok(tag) => Lenient::ok(tag_set_from(&tag)),
            Err(e) => {
                let err = Error::tag_read(path, e);
                tracing::debug!("{err}");
                Lenient::degraded(TagSet::default(), err)
            }
        }
    }

    fn write(&self, path: &Path, tags: &TagSet, cover: &CoverAction) -> Result<()> {
        let mut tag = Tag::read_from_path(path).map_err(|e| Error::tag_write(path, e))?;
        apply(&mut tag, tags, cover).map_err(|msg| Error::tag_write(path, msg))?;
        tag.write_to_path(path).map_err(|e| Error::tag_write(path, e))
    }

    fn remove_all(&self, path: &Path) -> Result<()> {
        let mut tag = Tag::read_from_path(path).map_err(|e| Error::tag_write(path, e))?;
        if clear(&mut tag) == 0 {
            tracing::debug!("no MP4 metadata in {}; nothing to remove", path.display());
            return Ok(());
        }
        tag.write_to_path(path).map_err(|e| Error::tag_write(path, e))
    }
}

fn tag_set_from(tag: &Tag) -> TagSet {
    let mut set = TagSet::default();
    for field in TagField::ALL {
        if let Some(atom) = text_atom(field) {
            set.set_text(field, tag.strings_of(&atom).next());
        }
    }

    set.track = tag
        .track_number()
        .map(|n| TrackNumber::new(n.into(), tag.total_tracks().map_or(0, u32::from)))
        .filter(TrackNumber::is_set);

    set.cover = tag.artworks().next().map(|img| {
        let mime = match img.fmt {
            ImgFmt::Png => CoverMime::Png,
            _ => CoverMime::Jpeg,
        };
        CoverArt::new(img.data.to_vec(), mime)
    });

    set
}

fn apply(tag: &mut Tag, tags: &TagSet, cover: &CoverAction) -> std::result::Result<(), String> {
    for (field, value) in tags.updates() {
        match (text_atom(field), value) {
            (Some(atom), FieldValue::Text(text)) => {
                tag.set_data(atom, Data::Utf8(text));
            }
            (Some(atom), _) => {
                tag.remove_data_of(&atom);
            }
            (None, FieldValue::Track(track)) => set_track(tag, track)?,
            (None, _) => {
                tag.remove_track();
            }
        }
    }

    match cover {
        CoverAction::NoChange => {}
        CoverAction::Remove => {
            tag.remove_artworks();
        }
        CoverAction::Set(art) => {
            if art.data.is_empty() {
                return Err("cover image is empty".into());
            }
            let img = match art.mime {
                CoverMime::Png => Img::png(art.data.clone()),
                CoverMime::Jpeg => Img::jpeg(art.data.clone()),
            };
            // Replaces every existing `covr` entry.
            tag.set_artwork(img);
        }
    }

    Ok(())
}

/// `trkn` stores both halves as 16-bit values.
fn set_track(tag: &mut Tag, track: TrackNumber) -> std::result::Result<(), String> {
    let number = u16::try_from(track.number)
        .map_err(|_| format!("track number {} does not fit in trkn", track.number))?;
    let total = u16::try_from(track.total)
        .map_err(|_| format!("track total {} does not fit in trkn", track.total))?;

    tag.remove_track();
    tag.set_track_number(number);
    if total != 0 {
        tag.set_total_tracks(total);
    }
    Ok(())
}

/// Remove every metadata item; returns how many identifiers were dropped.
fn clear(tag: &mut Tag) -> usize {
    let idents: Vec<DataIdent> = tag.data().map(|(ident, _)| ident.clone()).collect();
    for ident in &idents {
        tag.remove_data_of(ident);
    }
    idents.len()
}
