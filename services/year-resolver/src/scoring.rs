//!
//! src/scoring.rs  
//!
//! Scores one candidate release against the album being resolved. Every 
//! signal is an additive, independently tunable weight 
//!

use crate::script::{classify_script, is_cross_script};
use crate::types::{is_valid_year, ArtistPeriod, CandidateRelease, ReleaseSource};

#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights {
    pub base: i32, 
    pub artist_exact: i32, 
    pub artist_variation: i32, 
    pub artist_unrelated: i32, 
    pub artist_cross_script: i32, 
    pub album_exact: i32, 
    pub album_variation: i32, 
    pub album_substring: i32, 
    pub album_unrelated: i32, 
    pub perfect_match: i32, 
    pub unofficial_status: i32, 
    pub region_match: i32, 
    pub album_type: i32, 
    pub compilation_type: i32, 
    pub within_period: i32, 
    pub outside_period: i32, 
    pub source_musicbrainz: i32, 
    pub source_discogs: i32, 
    pub source_lastfm: i32, 
    pub source_other: i32, 
    pub similarity_threshold: f64   // normalized levenshtein for "near" names 
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            base: 10, 
            artist_exact: 20, 
            artist_variation: 10, 
            artist_unrelated: -30, 
            artist_cross_script: -10, 
            album_exact: 25, 
            album_variation: 10, 
            album_substring: -15, 
            album_unrelated: -40, 
            perfect_match: 15, 
            unofficial_status: -50, 
            region_match: 5, 
            album_type: 5, 
            compilation_type: -10, 
            within_period: 10, 
            outside_period: -20, 
            source_musicbrainz: 5, 
            source_discogs: 2, 
            source_lastfm: -5, 
            source_other: 0, 
            similarity_threshold: 0.85 
        }
    }
}

/// Lowercased, punctuation-free, whitespace-collapsed form used for matching 
/// and for provider queries 
pub fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '&' {
            out.push_str(" and ");
        } else if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
        } else {
            out.push(' ');
        }
    }
    let collapsed = out.split_whitespace().collect::<Vec<_>>().join(" ");
    match collapsed.strip_prefix("the ") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => collapsed 
    }
}

const EDITION_WORDS: [&str; 16] = [
    "deluxe", "edition", "remaster", "remastered", "expanded", "anniversary", 
    "bonus", "track", "tracks", "version", "special", "limited", "reissue", 
    "mono", "stereo", "ep"
];

/// Normalized title without edition decorations or bare years 
fn core_title(normalized: &str) -> String {
    normalized.split(' ')
        .filter(|w| !EDITION_WORDS.contains(w))
        .filter(|w| !is_valid_year(w))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtistMatch {
    Exact, 
    Variation, 
    CrossScript, 
    Unrelated, 
    Skipped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlbumMatch {
    Exact, 
    Variation, 
    Substring, 
    Unrelated 
}

/// The normalized query a candidate is scored against 
#[derive(Debug, Clone, Copy)]
pub struct ScoreTarget<'a> {
    pub artist: &'a str, 
    pub album: &'a str, 
    pub region: Option<&'a str>
}

/// Per-signal contributions, kept for debug logging 
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub parts: Vec<(&'static str, i32)>, 
    pub total: u32 
}

impl ScoreBreakdown {
    fn add(&mut self, signal: &'static str, value: i32) {
        if value != 0 {
            self.parts.push((signal, value));
        }
    }

    pub fn get(&self, signal: &str) -> Option<i32> {
        self.parts.iter().find(|(name, _)| *name == signal).map(|(_, v)| *v)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReleaseScorer {
    weights: ScoringWeights 
}

impl ReleaseScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights 
    }

    pub fn score(
        &self, 
        candidate: &CandidateRelease, 
        target: ScoreTarget<'_>, 
        period: Option<ArtistPeriod>
    ) -> u32 {
        self.breakdown(candidate, target, period).total 
    }

    /// Zero only for a year that is not exactly four digits; every valid 
    /// candidate scores at least one 
    pub fn breakdown(
        &self, 
        candidate: &CandidateRelease, 
        target: ScoreTarget<'_>, 
        period: Option<ArtistPeriod>
    ) -> ScoreBreakdown {
        let mut out = ScoreBreakdown::default(); 
        // padded years are invalid too; providers hand back bare digits 
        let year = candidate.year.as_str();
        if !is_valid_year(year) {
            return out; 
        }
        let w = &self.weights; 
        out.add("base", w.base);

        let artist = self.match_artist(target.artist, &candidate.artist);
        out.add("artist", match artist {
            ArtistMatch::Exact => w.artist_exact,
            ArtistMatch::Variation => w.artist_variation,
            ArtistMatch::CrossScript => w.artist_cross_script,
            ArtistMatch::Unrelated => w.artist_unrelated,
            ArtistMatch::Skipped => 0 
        });

        let album = self.match_album(target.album, &candidate.title);
        out.add("album", match album {
            AlbumMatch::Exact => w.album_exact,
            AlbumMatch::Variation => w.album_variation,
            AlbumMatch::Substring => w.album_substring,
            AlbumMatch::Unrelated => w.album_unrelated
        });

        if artist == ArtistMatch::Exact && album == AlbumMatch::Exact {
            out.add("perfect", w.perfect_match);
        }

        if let Some(status) = candidate.status.as_deref() {
            let status = status.to_ascii_lowercase();
            if status.contains("bootleg") || status.contains("unofficial") {
                out.add("status", w.unofficial_status);
            }
        }

        out.add("source", match candidate.source {
            ReleaseSource::MusicBrainz => w.source_musicbrainz,
            ReleaseSource::Discogs => w.source_discogs,
            ReleaseSource::LastFm => w.source_lastfm,
            ReleaseSource::AppleMusic => w.source_other
        });

        if let (Some(region), Some(country)) = (target.region, candidate.country.as_deref()) {
            if region.trim().eq_ignore_ascii_case(country.trim()) {
                out.add("region", w.region_match);
            }
        }

        if let Some(kind) = candidate.release_type.as_deref() {
            let kind = kind.to_ascii_lowercase();
            if kind.contains("compilation") {
                out.add("type", w.compilation_type);
            } else if kind == "album" {
                out.add("type", w.album_type);
            }
        }

        if let (Some(period), Ok(year)) = (period, year.parse::<i32>()) {
            out.add("period", if period.contains(year) { 
                w.within_period 
            } else { 
                w.outside_period 
            });
        }

        let sum: i32 = out.parts.iter().map(|(_, v)| *v).sum();
        out.total = sum.max(1) as u32; 
        out 
    }

    pub fn match_artist(&self, target: &str, candidate: &str) -> ArtistMatch {
        if target.trim().is_empty() {
            return ArtistMatch::Skipped; 
        }
        let candidate_norm = normalize_name(candidate);
        if candidate_norm == target {
            return ArtistMatch::Exact; 
        }
        if !candidate_norm.is_empty() && (
            candidate_norm.contains(target) 
            || target.contains(candidate_norm.as_str())
            || strsim::normalized_levenshtein(target, &candidate_norm) 
                >= self.weights.similarity_threshold
        ) {
            return ArtistMatch::Variation; 
        }
        if is_cross_script(classify_script(target), classify_script(candidate)) {
            return ArtistMatch::CrossScript; 
        }
        ArtistMatch::Unrelated 
    }

    pub fn match_album(&self, target: &str, candidate: &str) -> AlbumMatch {
        let candidate_norm = normalize_name(candidate);
        if candidate_norm == target {
            return AlbumMatch::Exact; 
        }
        let target_core = core_title(target);
        let candidate_core = core_title(&candidate_norm);
        if !target_core.is_empty() && (
            target_core == candidate_core 
            || strsim::normalized_levenshtein(&target_core, &candidate_core) 
                >= self.weights.similarity_threshold
        ) {
            return AlbumMatch::Variation; 
        }
        if !candidate_norm.is_empty() && !target.is_empty() 
            && (candidate_norm.contains(target) || target.contains(candidate_norm.as_str())) {
            return AlbumMatch::Substring; 
        }
        AlbumMatch::Unrelated 
    }
}
