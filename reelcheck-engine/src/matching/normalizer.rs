//! Title and name normalization
//!
//! `normalize` is used for every similarity comparison. It lowercases, drops
//! in-word punctuation (periods, apostrophes, quotes), turns separating punctuation
//! (colons, hyphens, `!`, `?`, ...) into spaces, and collapses whitespace.
//! Non-Latin scripts (e.g. Telugu) pass through unchanged.
//!
//! `aggressive_normalize` additionally removes everything that is not a letter or
//! digit. It destroys word boundaries, so it is only used for exact-key comparisons
//! (slug-like keys, spacing variants), never for similarity scoring.

use serde::Serialize;
use std::fmt;

/// Punctuation removed outright ("S.S." → "ss", "Don't" → "dont")
const REMOVED: &[char] = &['.', '\'', '"', '`', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}'];

/// Punctuation that separates words ("RRR: Rise" → "rrr rise")
const SEPARATORS: &[char] = &[
    ':', ';', ',', '!', '?', '-', '\u{2010}', '\u{2013}', '\u{2014}', '/', '\\', '(', ')', '[',
    ']', '{', '}', '&', '*', '_', '|', '~',
];

/// Normalized text; only constructed through [`normalize`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NormalizedString(String);

impl NormalizedString {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whitespace-separated tokens
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.0.split(' ').filter(|t| !t.is_empty())
    }

    /// First token, used for coarse bucketing
    pub fn first_token(&self) -> Option<&str> {
        self.tokens().next()
    }
}

impl fmt::Display for NormalizedString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedString {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonicalize free text for comparison
///
/// Pure, total and deterministic.
pub fn normalize(text: &str) -> NormalizedString {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for c in text.chars() {
        if REMOVED.contains(&c) {
            continue;
        }
        if c.is_whitespace() || SEPARATORS.contains(&c) {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.extend(c.to_lowercase());
    }

    NormalizedString(out)
}

/// Normalize and strip every non-alphanumeric character
///
/// ASCII keeps letters and digits only. Non-ASCII characters are kept unless they are
/// whitespace or general punctuation, so combining vowel signs of Indic scripts survive.
pub fn aggressive_normalize(text: &str) -> String {
    normalize(text)
        .as_str()
        .chars()
        .filter(|c| {
            if c.is_ascii() {
                c.is_ascii_alphanumeric()
            } else {
                !c.is_whitespace() && !is_general_punctuation(*c)
            }
        })
        .collect()
}

fn is_general_punctuation(c: char) -> bool {
    matches!(c as u32, 0x2000..=0x206F | 0x3000..=0x303F | 0x00A0..=0x00BF)
}

/// Main title of a title carrying a subtitle
///
/// "RRR: Rise Roar Revolt" → "rrr"; "Baahubali - The Beginning" → "baahubali".
/// Returns `None` when the title has no subtitle separator or the main part is empty.
pub fn main_title(text: &str) -> Option<NormalizedString> {
    let cut = [":", " - ", " \u{2013} ", " \u{2014} ", "("]
        .iter()
        .filter_map(|sep| text.find(sep))
        .min()?;

    let main = normalize(&text[..cut]);
    if main.is_empty() || main == normalize(text) {
        None
    } else {
        Some(main)
    }
}
