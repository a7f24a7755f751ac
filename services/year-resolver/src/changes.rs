//!
//! src/changes.rs  
//!
//! Per-field change detection for the metadata fields the engine writes 
//!

use std::str::FromStr;

use serde::Serialize;

use crate::errors::ResolverError;
use crate::types::{is_valid_year, LibraryTrack};

/// Metadata fields with change detection 
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Genre, 
    Year 
}

impl FieldKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Genre => "genre",
            FieldKind::Year  => "year"
        }
    }

    /// Returns the change from `old` to `new`, or `None` when writing `new` 
    /// would not change anything. An empty `new` never counts as a change. 
    pub fn detect_change(self, old: Option<&str>, new: &str) -> Option<FieldChange> {
        let old = old.map(str::trim).filter(|v| !v.is_empty());
        let new = new.trim();
        let changed = match self {
            FieldKind::Genre => {
                !new.is_empty() && old.is_none_or(|o| !o.eq_ignore_ascii_case(new))
            }
            FieldKind::Year => {
                // "0" is how the host library spells a missing year 
                let old = old.filter(|o| *o != "0");
                is_valid_year(new) && old != Some(new)
            }
        };
        changed.then(|| FieldChange {
            field: self, 
            old: old.map(str::to_string), 
            new: new.to_string() 
        })
    }

    /// The track's current value for this field, blank treated as missing 
    pub fn value_of(self, track: &LibraryTrack) -> Option<&str> {
        match self {
            FieldKind::Genre => track.genre.as_deref()
                .map(str::trim)
                .filter(|g| !g.is_empty()),
            FieldKind::Year => track.year_value()
        }
    }

    /// Changes, keyed by track id, that writing `new` to every track would make 
    pub fn plan_changes(self, tracks: &[LibraryTrack], new: &str) -> Vec<(String, FieldChange)> {
        tracks.iter()
            .filter_map(|track| {
                self.detect_change(self.value_of(track), new)
                    .map(|change| (track.id.clone(), change))
            })
            .collect()
    }
}

impl FromStr for FieldKind {
    type Err = ResolverError; 

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label.trim().to_ascii_lowercase().as_str() {
            "genre" => Ok(FieldKind::Genre),
            "year"  => Ok(FieldKind::Year),
            other => Err(ResolverError::Policy(format!("unknown field kind {other:?}")))
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: FieldKind, 
    pub old: Option<String>, 
    pub new: String 
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_label_is_a_policy_error() {
        assert_eq!("Year".parse::<FieldKind>().ok(), Some(FieldKind::Year));
        assert_eq!("genre".parse::<FieldKind>().ok(), Some(FieldKind::Genre));
        match "rating".parse::<FieldKind>() {
            Err(ResolverError::Policy(msg)) => assert!(msg.contains("rating")),
            other => panic!("expected policy error, got {other:?}")
        }
    }

    #[test]
    fn year_change_ignores_zero_and_invalid_values() {
        let change = FieldKind::Year.detect_change(Some("0"), "1997").unwrap();
        assert_eq!(change.old, None);
        assert_eq!(change.new, "1997");
        assert!(FieldKind::Year.detect_change(Some("1997"), " 1997 ").is_none());
        assert!(FieldKind::Year.detect_change(Some("1997"), "97").is_none());
        assert!(FieldKind::Year.detect_change(None, "").is_none());
    }

    fn track(id: &str, year: Option<&str>, genre: Option<&str>) -> LibraryTrack {
        LibraryTrack {
            id: id.to_string(), 
            year: year.map(str::to_string), 
            genre: genre.map(str::to_string), 
            ..Default::default()
        }
    }

    #[test]
    fn genre_changes_read_the_track_genre() {
        let tracks = vec![
            track("1", Some("1997"), Some("Rock")), 
            track("2", Some("1997"), Some("  ")), 
            track("3", Some("1997"), Some("shoegaze")), 
            track("4", Some("1997"), None)
        ];
        assert_eq!(FieldKind::Genre.value_of(&tracks[1]), None);
        assert_eq!(FieldKind::Genre.value_of(&tracks[0]), Some("Rock"));

        let changes = FieldKind::Genre.plan_changes(&tracks, "Shoegaze");
        let ids: Vec<&str> = changes.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "4"]);
        assert_eq!(changes[0].1.old.as_deref(), Some("Rock"));
        assert_eq!(changes[1].1.old, None);
        assert!(changes.iter().all(|(_, c)| c.field == FieldKind::Genre && c.new == "Shoegaze"));
    }

    #[test]
    fn year_changes_read_the_track_year() {
        let tracks = vec![
            track("1", Some("0"), Some("Rock")), 
            track("2", Some("1997"), Some("Rock")), 
            track("3", Some("2009"), None)
        ];
        let changes = FieldKind::Year.plan_changes(&tracks, "1997");
        let ids: Vec<&str> = changes.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert_eq!(changes[1].1.old.as_deref(), Some("2009"));
    }

    #[test]
    fn genre_change_is_case_insensitive() {
        assert!(FieldKind::Genre.detect_change(Some("Rock"), "rock").is_none());
        let change = FieldKind::Genre.detect_change(Some("Rock"), "Shoegaze").unwrap();
        assert_eq!(change.old.as_deref(), Some("Rock"));
        assert!(FieldKind::Genre.detect_change(Some("Rock"), "  ").is_none());
    }
}
