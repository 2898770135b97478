//! Title normalization
//!
//! Turns the inconsistent raw titles published by radio servers into clean
//! `(song, artist)` pairs. Cleaning is idempotent: a cleaned string passes
//! through `clean_song_text` unchanged.

use crate::config::CleanerSettings;
use once_cell::sync::Lazy;
use onair_common::{FetchSource, SongData, DEFAULT_SPLIT_CHARACTER};
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::collections::HashSet;
use tracing::warn;

static NUMERIC_ENTITY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|([0-9]{1,7}));").expect("valid entity regex")
});

const NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&nbsp;", " "),
];

/// Literal removed from titles; some servers print it for missing fields
const UNDEFINED: &str = "undefined";

static UNDEFINED_ANY_CASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)undefined").expect("valid undefined regex"));

/// Title cleaner and splitter with a configurable letter allow-list
#[derive(Debug, Clone)]
pub struct Normalizer {
    extra_letters: HashSet<char>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new(&CleanerSettings::default())
    }
}

impl Normalizer {
    pub fn new(settings: &CleanerSettings) -> Self {
        Self {
            extra_letters: settings.extra_letters.chars().collect(),
        }
    }

    fn is_allowed(&self, c: char) -> bool {
        c.is_ascii_alphanumeric()
            || matches!(c, ' ' | '\'' | '&' | '-' | '?')
            || self.extra_letters.contains(&c)
    }

    /// Clean one raw song or artist string
    ///
    /// Returns `None` for empty input, the literal "undefined", and anything
    /// that is two characters or shorter before or after cleaning.
    pub fn clean_song_text(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() || text.eq_ignore_ascii_case(UNDEFINED) || text.chars().count() <= 2 {
            return None;
        }

        // Percent-escapes are decoded first: '%' itself is not on the allow-list.
        let decoded = url_decode(text);
        let decoded = decode_html_entities(&decoded);

        let filtered: String = decoded
            .chars()
            .map(|c| if c == '_' || c.is_whitespace() { ' ' } else { c })
            .filter(|c| self.is_allowed(*c))
            .collect();

        // Same case rule as the whole-input check above
        let mut without_undefined = filtered;
        while UNDEFINED_ANY_CASE.is_match(&without_undefined) {
            without_undefined = UNDEFINED_ANY_CASE
                .replace_all(&without_undefined, "")
                .into_owned();
        }

        let collapsed = without_undefined
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let trimmed = collapsed.trim_matches(|c| c == '-' || c == ' ');

        let result = self.capitalize_first(trimmed);
        if result.chars().count() <= 2 {
            return None;
        }
        Some(result)
    }

    fn capitalize_first(&self, text: &str) -> String {
        let mut chars = text.chars();
        let Some(first) = chars.next() else {
            return String::new();
        };
        let mut upper = first.to_uppercase();
        let replacement = match (upper.next(), upper.next()) {
            (Some(u), None) if self.is_allowed(u) => u,
            _ => first,
        };
        let mut out = String::with_capacity(text.len());
        out.push(replacement);
        out.extend(chars);
        out
    }

    /// Split a raw title into song name and artist
    ///
    /// Without a source configuration the title is split naively on `" - "`.
    /// With one, the station name is removed first, then regex extraction is
    /// tried, then the configured split character is used. The first split
    /// part is the artist and the remaining parts form the song name.
    pub fn parse_title_artist(&self, raw_title: &str, source: Option<&FetchSource>) -> SongData {
        let raw = Some(raw_title.to_string()).filter(|r| !r.trim().is_empty());

        let Some(source) = source else {
            let (artist, name) = split_artist_title(raw_title, DEFAULT_SPLIT_CHARACTER);
            return self.song(name, artist, raw);
        };

        let separator = source.split_character();
        let mut working: Cow<'_, str> = Cow::Borrowed(raw_title);

        if let Some(re) = compile(source.station_name_regex.as_deref(), "station_name_regex") {
            working = Cow::Owned(re.replacen(&working, 1, "").into_owned());
            working = Cow::Owned(trim_separator_edges(&working, separator).to_string());
        }

        if let (Some(artist_re), Some(title_re)) = (
            compile(source.artist_regex.as_deref(), "artist_regex"),
            compile(source.title_regex.as_deref(), "title_regex"),
        ) {
            if let (Some(artist), Some(title)) = (
                first_group(&artist_re, &working),
                first_group(&title_re, &working),
            ) {
                return self.song(Some(title), Some(artist), raw);
            }
        }

        let (artist, name) = split_artist_title(&working, separator);
        self.song(name, artist, raw)
    }

    fn song(&self, name: Option<String>, artist: Option<String>, raw: Option<String>) -> SongData {
        SongData {
            name: name.and_then(|n| self.clean_song_text(&n)),
            artist: artist.and_then(|a| self.clean_song_text(&a)),
            thumbnail_url: None,
            raw_title: raw,
        }
    }
}

/// `(artist, title)` from a split on `separator`, empty parts dropped
fn split_artist_title(text: &str, separator: &str) -> (Option<String>, Option<String>) {
    let parts: Vec<&str> = text
        .split(separator)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    match parts.as_slice() {
        [] => (None, None),
        [only] => (None, Some(only.to_string())),
        [artist, rest @ ..] => (Some(artist.to_string()), Some(rest.join(separator))),
    }
}

/// Strip whitespace and dangling separators left over after a removal
fn trim_separator_edges<'a>(text: &'a str, separator: &str) -> &'a str {
    let sep = separator.trim();
    let mut current = text.trim();
    if sep.is_empty() {
        return current;
    }
    loop {
        let next = current
            .strip_prefix(sep)
            .or_else(|| current.strip_suffix(sep))
            .map(str::trim);
        match next {
            Some(n) => current = n,
            None => return current,
        }
    }
}

fn compile(pattern: Option<&str>, field: &str) -> Option<Regex> {
    let pattern = pattern.filter(|p| !p.is_empty())?;
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(field, pattern, error = %e, "Ignoring invalid source regex");
            None
        }
    }
}

/// First capture group, or the whole match when the pattern has no groups
fn first_group(re: &Regex, text: &str) -> Option<String> {
    let caps = re.captures(text)?;
    caps.get(1)
        .or_else(|| caps.get(0))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn url_decode(text: &str) -> Cow<'_, str> {
    if !text.contains('%') {
        return Cow::Borrowed(text);
    }
    match urlencoding::decode(text) {
        Ok(decoded) => Cow::Owned(decoded.into_owned()),
        Err(_) => Cow::Borrowed(text),
    }
}

/// Decode numeric (`&#NNN;`, `&#xHH;`) and the common named entities
pub fn decode_html_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let numeric = NUMERIC_ENTITY.replace_all(text, |caps: &Captures<'_>| {
        let code = match (caps.get(1), caps.get(2)) {
            (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
            (None, Some(dec)) => dec.as_str().parse::<u32>().ok(),
            _ => None,
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });
    NAMED_ENTITIES
        .iter()
        .fold(numeric.into_owned(), |acc, (entity, plain)| acc.replace(entity, plain))
}

/// Clean with the default allow-list
pub fn clean_song_text(text: &str) -> Option<String> {
    DEFAULT_NORMALIZER.clean_song_text(text)
}

/// Split with the default allow-list
pub fn parse_title_artist(raw_title: &str, source: Option<&FetchSource>) -> SongData {
    DEFAULT_NORMALIZER.parse_title_artist(raw_title, source)
}

static DEFAULT_NORMALIZER: Lazy<Normalizer> = Lazy::new(Normalizer::default);
