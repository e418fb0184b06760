//! File-name and genre-list helpers used by the save and export flows.

use std::collections::BTreeSet;

/// Characters that are not allowed in a file stem on common filesystems.
const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Make a user-supplied name safe to use as a file stem.
///
/// Forbidden characters become spaces, whitespace runs collapse to a single
/// space and the result is trimmed. May return an empty string.
pub fn sanitize_stem(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) { ' ' } else { c })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stem for the `index`-th (0-based) file of a batch rename to `base`.
///
/// A lone file keeps `base`; otherwise a two-digit, 1-based counter is
/// appended (`"Holiday 01"`, `"Holiday 02"`, ...).
pub fn numbered_stem(base: &str, index: usize, total: usize) -> String {
    if total > 1 {
        format!("{base} {:02}", index + 1)
    } else {
        base.to_string()
    }
}

/// Join a genre set into the single string stored in the `genre` tag.
pub fn genre_string(genres: &BTreeSet<String>) -> String {
    genres
        .iter()
        .map(|g| g.trim())
        .filter(|g| !g.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Split a stored genre string on `;`, `,` or `/` into a set.
pub fn parse_genre_string(s: &str) -> BTreeSet<String> {
    s.split([';', ',', '/'])
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}
