//!
//! src/types.rs  
//!
//! Value types passed between the resolution stages 
//!

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::provenance::YearProvenance;

/// Where a candidate release came from. Declaration order is the provider 
/// priority order used to break score ties. 
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseSource {
    MusicBrainz, 
    Discogs, 
    AppleMusic, 
    LastFm
}

impl ReleaseSource {
    pub const ALL: [ReleaseSource; 4] = [
        ReleaseSource::MusicBrainz, 
        ReleaseSource::Discogs, 
        ReleaseSource::AppleMusic, 
        ReleaseSource::LastFm
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReleaseSource::MusicBrainz => "musicbrainz",
            ReleaseSource::Discogs     => "discogs",
            ReleaseSource::AppleMusic  => "applemusic",
            ReleaseSource::LastFm      => "lastfm"
        }
    }

    pub fn parse(s: &str) -> Option<ReleaseSource> {
        match s.trim().to_ascii_lowercase().as_str() {
            "musicbrainz" | "mb"           => Some(ReleaseSource::MusicBrainz),
            "discogs"                      => Some(ReleaseSource::Discogs),
            "applemusic" | "apple_music" | "itunes" => Some(ReleaseSource::AppleMusic),
            "lastfm" | "last.fm"           => Some(ReleaseSource::LastFm),
            _ => None 
        }
    }

    pub fn priority(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for ReleaseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provider's answer to an album query 
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRelease {
    pub title: String, 
    pub artist: String, 
    pub year: String, 
    pub country: Option<String>, 
    pub release_type: Option<String>, 
    pub status: Option<String>, 
    pub source: ReleaseSource
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoredCandidate {
    pub release: CandidateRelease, 
    pub score: u32
}

/// Known active span of an artist, used only to bias scoring 
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistPeriod {
    pub start_year: i32, 
    pub end_year: Option<i32>
}

impl ArtistPeriod {
    pub fn new(start_year: i32, end_year: Option<i32>) -> Self {
        Self { start_year, end_year }
    }

    pub fn contains(&self, year: i32) -> bool {
        year >= self.start_year && self.end_year.is_none_or(|end| year <= end)
    }
}

/// A track of the album being resolved, as read from the host library 
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryTrack {
    pub id: String, 
    pub name: String, 
    pub artist: String, 
    pub album: String, 
    pub year: Option<String>, 
    pub genre: Option<String>, 
    pub date_added: Option<NaiveDate>, 
    pub provenance: YearProvenance
}

impl LibraryTrack {
    /// Year if present and non-zero 
    pub fn year_value(&self) -> Option<&str> {
        self.year.as_deref()
            .map(str::trim)
            .filter(|y| !y.is_empty() && y.parse::<i32>().map_or(true, |n| n != 0))
    }
}

/// Final answer handed back to the rest of the application 
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct YearResolution {
    pub year: Option<String>, 
    pub is_reliable: bool, 
    pub confidence: u32, 
    pub year_scores: BTreeMap<String, u32>, 
    pub needs_verification: bool
}

/// Exactly four ASCII digits 
pub fn is_valid_year(year: &str) -> bool {
    year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit())
}

/// Pulls the first plausible four digit year out of a provider date string 
/// ("2018-06-01T07:00:00Z", " 6 Apr 1999, 00:00", "1999") 
pub fn extract_year(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut start = 0; 
    while start < bytes.len() {
        if !bytes[start].is_ascii_digit() {
            start += 1; 
            continue; 
        }
        let mut end = start; 
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1; 
        }
        if end - start == 4 {
            let year = &raw[start..end];
            if matches!(year.as_bytes()[0], b'1' | b'2') {
                return Some(year.to_string());
            }
        }
        start = end; 
    }
    None 
}
