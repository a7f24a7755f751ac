//!
//! src/strategy.rs  
//!
//! Decides whether an album query has to be rewritten before it is retried 
//! against the providers (soundtracks, various-artists compilations, 
//! decorative bracketed subtitles)
//!

use serde::Serialize;

use crate::config::StrategyConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    Normal, 
    Soundtrack, 
    VariousArtists, 
    StripBrackets
}

/// Outcome of strategy detection. `artist`/`album` hold the rewritten query 
/// text when the strategy changes it; an empty `artist` means the artist is 
/// dropped from the query. 
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyInfo {
    pub strategy: SearchStrategy, 
    pub detected_pattern: Option<String>, 
    pub artist: Option<String>, 
    pub album: Option<String>
}

impl StrategyInfo {
    fn normal() -> Self {
        Self { strategy: SearchStrategy::Normal, detected_pattern: None, artist: None, album: None }
    }

    pub fn is_normal(&self) -> bool {
        self.strategy == SearchStrategy::Normal
    }

    /// Query text after applying the rewrite to the original strings 
    pub fn rewrite<'a>(&'a self, artist: &'a str, album: &'a str) -> (&'a str, &'a str) {
        (
            self.artist.as_deref().unwrap_or(artist), 
            self.album.as_deref().unwrap_or(album)
        )
    }
}

// a plain hyphen only separates as " - ", so "X-Men" stays whole 
const SEPARATORS: [char; 4] = ['(', '\u{2013}', '\u{2014}', '['];
const SPACED_HYPHEN: &str = " - ";
const BENIGN_TAGS: [&str; 6] = ["deluxe", "remaster", "bonus", "disc", "cd", "version"];
const BENIGN_SUFFIXES: [&str; 4] = ["", "s", "ed", "ing"];
const MAX_PLAIN_BRACKET_LEN: usize = 10; 

/// Byte offset of the first case-insensitive occurrence of `needle` in `haystack` 
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let needle: Vec<char> = needle.chars().flat_map(char::to_lowercase).collect();
    if needle.is_empty() {
        return None; 
    }
    haystack.char_indices().map(|(i, _)| i).find(|&i| {
        let mut rest = haystack[i..].chars().flat_map(char::to_lowercase);
        needle.iter().all(|n| rest.next() == Some(*n))
    })
}

/// Byte offset of the last separator in `text` 
fn last_separator(text: &str) -> Option<usize> {
    let bracket = text.rfind(SEPARATORS);
    let hyphen = text.rfind(SPACED_HYPHEN);
    bracket.max(hyphen)
}

/// "cd", "CD2", "Discs", "Remastered" are tags; "ABCD" and "Disco" are not 
fn is_benign_word(word: &str) -> bool {
    BENIGN_TAGS.iter().any(|tag| word.strip_prefix(tag).is_some_and(|rest| {
        BENIGN_SUFFIXES.contains(&rest) || rest.chars().all(|c| c.is_ascii_digit())
    }))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub struct StrategyDetector {
    soundtrack_keywords: Vec<String>, 
    various_artists: Vec<String> 
}

impl StrategyDetector {
    pub fn new(cfg: &StrategyConfig) -> Self {
        Self {
            soundtrack_keywords: cfg.soundtrack_keywords.iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            various_artists: cfg.various_artists.iter()
                .map(|n| n.trim().to_lowercase())
                .filter(|n| !n.is_empty())
                .collect()
        }
    }

    pub fn detect(&self, artist: &str, album: &str) -> StrategyInfo {
        if album.trim().is_empty() {
            return StrategyInfo::normal();
        }

        if let Some(info) = self.detect_soundtrack(album) {
            return info; 
        }

        let artist_lower = artist.trim().to_lowercase();
        if self.various_artists.iter().any(|name| *name == artist_lower) {
            return StrategyInfo {
                strategy: SearchStrategy::VariousArtists, 
                detected_pattern: Some(artist.trim().to_string()),
                artist: Some(String::new()),
                album: Some(album.to_string())
            };
        }

        if let Some(info) = Self::detect_brackets(album) {
            return info; 
        }

        StrategyInfo::normal()
    }

    fn detect_soundtrack(&self, album: &str) -> Option<StrategyInfo> {
        let (keyword, at) = self.soundtrack_keywords.iter()
            .find_map(|k| find_ci(album, k).map(|at| (k, at)))?;

        let before = &album[..at];
        let movie = last_separator(before)
            .map(|sep| before[..sep].trim())
            .filter(|name| !name.is_empty())
            .map(str::to_string);

        Some(StrategyInfo {
            strategy: SearchStrategy::Soundtrack, 
            detected_pattern: Some(keyword.clone()),
            artist: movie.clone(),
            album: movie
        })
    }

    fn detect_brackets(album: &str) -> Option<StrategyInfo> {
        let mut stripped = String::with_capacity(album.len());
        let mut pattern = None; 
        let mut rest = album; 

        while let Some(open) = rest.find('[') {
            let Some(len) = rest[open + 1..].find(']') else { break };
            let close = open + 1 + len; 
            let content = &rest[open + 1..close];

            stripped.push_str(&rest[..open]);
            if Self::is_noise_bracket(content) {
                pattern.get_or_insert_with(|| format!("[{content}]"));
            } else {
                stripped.push_str(&rest[open..=close]);
            }
            rest = &rest[close + 1..];
        }
        stripped.push_str(rest);

        let pattern = pattern?;
        let album = collapse_whitespace(&stripped);
        if album.is_empty() {
            return None; 
        }
        Some(StrategyInfo {
            strategy: SearchStrategy::StripBrackets, 
            detected_pattern: Some(pattern),
            artist: None, 
            album: Some(album)
        })
    }

    fn is_noise_bracket(content: &str) -> bool {
        let lower = content.to_lowercase();
        if lower.split(|c: char| !c.is_alphanumeric()).any(is_benign_word) {
            return false; 
        }
        let has_letters = content.chars().any(char::is_alphabetic);
        let upper = has_letters && content.chars()
            .filter(|c| c.is_alphabetic())
            .all(char::is_uppercase);
        content.trim().chars().count() > MAX_PLAIN_BRACKET_LEN || upper
    }
}
