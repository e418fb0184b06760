//! Container-neutral tag model.
//!
//! A [`TagSet`] is the full desired state of a file's editable metadata: a
//! field that is `None` or blank is deleted on write, not left alone. Cover
//! art is handled separately through [`CoverAction`] so that "leave the cover
//! as it is" can be expressed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

// ---------------------------------------------------------------------------
// TrackNumber
// ---------------------------------------------------------------------------

/// Track position within an album. Zero means "absent" for either part.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackNumber {
    pub number: u32,
    pub total: u32,
}

impl TrackNumber {
    pub fn new(number: u32, total: u32) -> Self {
        Self { number, total }
    }

    /// Parse `"N"` or `"N/M"`. Anything else yields `(0, 0)`.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return Self::default();
        }
        match s.split_once('/') {
            Some((n, t)) => match (n.trim().parse(), t.trim().parse()) {
                (Ok(number), Ok(total)) => Self { number, total },
                _ => Self::default(),
            },
            None => match s.parse() {
                Ok(number) => Self { number, total: 0 },
                Err(_) => Self::default(),
            },
        }
    }

    /// Whether this value should be written at all.
    pub fn is_set(&self) -> bool {
        self.number != 0
    }
}

impl fmt::Display for TrackNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total != 0 {
            write!(f, "{}/{}", self.number, self.total)
        } else {
            write!(f, "{}", self.number)
        }
    }
}

// ---------------------------------------------------------------------------
// Cover art
// ---------------------------------------------------------------------------

/// Image encodings a cover may declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverMime {
    #[default]
    Jpeg,
    Png,
}

impl CoverMime {
    /// Map a mime string; anything other than `image/png` is JPEG.
    pub fn from_mime(mime: &str) -> Self {
        if mime.trim().eq_ignore_ascii_case("image/png") {
            Self::Png
        } else {
            Self::Jpeg
        }
    }

    /// Guess from an image file's extension; `.png` is PNG, the rest JPEG.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("png") => Self::Png,
            _ => Self::Jpeg,
        }
    }

    pub fn as_mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

impl fmt::Display for CoverMime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// Embedded cover image. The declared mime is trusted as-is.
#[derive(Clone, PartialEq, Eq)]
pub struct CoverArt {
    pub data: Vec<u8>,
    pub mime: CoverMime,
}

impl CoverArt {
    pub fn new(data: Vec<u8>, mime: CoverMime) -> Self {
        Self { data, mime }
    }

    /// Read an image file, inferring the mime from its extension.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let data = std::fs::read(path)?;
        Ok(Self {
            data,
            mime: CoverMime::from_path(path),
        })
    }
}

// Image bytes make derived Debug output unreadable.
impl fmt::Debug for CoverArt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoverArt")
            .field("mime", &self.mime)
            .field("len", &self.data.len())
            .finish()
    }
}

/// What to do with the embedded cover on write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CoverAction {
    /// Leave any existing cover untouched.
    #[default]
    NoChange,
    /// Replace every existing cover with this one.
    Set(CoverArt),
    /// Delete every existing cover.
    Remove,
}

// ---------------------------------------------------------------------------
// TagField
// ---------------------------------------------------------------------------

/// Every editable field. Codecs map each variant to their own identifier
/// with an exhaustive `match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagField {
    Title,
    Artist,
    Album,
    Track,
    Year,
    Genre,
    Comment,
}

impl TagField {
    /// All fields in write order.
    pub const ALL: [TagField; 7] = [
        TagField::Title,
        TagField::Artist,
        TagField::Album,
        TagField::Track,
        TagField::Year,
        TagField::Genre,
        TagField::Comment,
    ];
}

/// The value a codec must store for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Track(TrackNumber),
    /// Delete the frame/atom.
    Clear,
}

// ---------------------------------------------------------------------------
// TagSet
// ---------------------------------------------------------------------------

/// Editable metadata of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub track: Option<TrackNumber>,
    pub year: Option<String>,
    pub genre: Option<String>,
    pub comment: Option<String>,
    /// Populated on read only; writes go through [`CoverAction`].
    pub cover: Option<CoverArt>,
}

impl TagSet {
    /// Trimmed, non-empty text for a text field.
    pub fn text(&self, field: TagField) -> Option<&str> {
        let raw = match field {
            TagField::Title => &self.title,
            TagField::Artist => &self.artist,
            TagField::Album => &self.album,
            TagField::Year => &self.year,
            TagField::Genre => &self.genre,
            TagField::Comment => &self.comment,
            TagField::Track => return None,
        };
        raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    /// Store a read value, treating blank text as absent.
    pub fn set_text(&mut self, field: TagField, value: Option<&str>) {
        let value = value
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned);
        match field {
            TagField::Title => self.title = value,
            TagField::Artist => self.artist = value,
            TagField::Album => self.album = value,
            TagField::Year => self.year = value,
            TagField::Genre => self.genre = value,
            TagField::Comment => self.comment = value,
            TagField::Track => self.track = value.map(|s| TrackNumber::parse(&s)).filter(TrackNumber::is_set),
        }
    }

    /// What the codec has to store for `field`.
    pub fn value_for(&self, field: TagField) -> FieldValue {
        match field {
            TagField::Track => match self.track {
                Some(track) if track.is_set() => FieldValue::Track(track),
                _ => FieldValue::Clear,
            },
            other => match self.text(other) {
                Some(text) => FieldValue::Text(text.to_owned()),
                None => FieldValue::Clear,
            },
        }
    }

    /// The full list of per-field writes, in [`TagField::ALL`] order.
    pub fn updates(&self) -> Vec<(TagField, FieldValue)> {
        TagField::ALL
            .iter()
            .map(|&field| (field, self.value_for(field)))
            .collect()
    }

    /// True when no field and no cover is present.
    pub fn is_empty(&self) -> bool {
        self.cover.is_none()
            && TagField::ALL
                .iter()
                .all(|&f| self.value_for(f) == FieldValue::Clear)
    }
}
