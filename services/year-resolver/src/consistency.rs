//!
//! src/consistency.rs  
//!
//! Decides whether an album's existing track years already agree well enough 
//! that no external search is needed 
//!

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::YearPolicyConfig;
use crate::types::{is_valid_year, LibraryTrack};

/// Why no dominant year was returned. `BelowThreshold` and `Suspicious` are 
/// different outcomes and are logged under different events. 
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NoDominance {
    NoYears, 
    BelowThreshold { year: String, share: f64 }, 
    Suspicious { year: String, share: f64, gap: i32 } 
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DominanceVerdict {
    Dominant { year: String, share: f64 }, 
    Inconclusive(NoDominance) 
}

impl DominanceVerdict {
    pub fn year(&self) -> Option<&str> {
        match self {
            DominanceVerdict::Dominant { year, .. } => Some(year), 
            DominanceVerdict::Inconclusive(_) => None 
        }
    }
}

/// Valid years on `tracks` with their counts 
fn year_counts(tracks: &[LibraryTrack]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new(); 
    for year in tracks.iter().filter_map(LibraryTrack::year_value).filter(|y| is_valid_year(y)) {
        *counts.entry(year).or_insert(0) += 1; 
    }
    counts 
}

/// Most frequent valid year and its count. Ties go to the earlier year. 
pub fn most_common_year(tracks: &[LibraryTrack]) -> Option<(String, usize)> {
    let counts = year_counts(tracks);
    // max_by_key keeps the last maximum, so walk years descending 
    counts.into_iter()
        .rev()
        .max_by_key(|(_, n)| *n)
        .map(|(year, n)| (year.to_string(), n))
}

#[derive(Debug, Clone)]
pub struct ConsistencyChecker {
    dominance_threshold: f64, 
    suspicion_threshold_years: i32 
}

impl ConsistencyChecker {
    pub fn new(policy: &YearPolicyConfig) -> Self {
        Self {
            dominance_threshold: policy.dominance_threshold, 
            suspicion_threshold_years: policy.suspicion_threshold_years 
        }
    }

    pub fn check(&self, tracks: &[LibraryTrack]) -> DominanceVerdict {
        let Some((year, count)) = most_common_year(tracks) else {
            debug!(tracks = tracks.len(), "consistency.no_years");
            return DominanceVerdict::Inconclusive(NoDominance::NoYears);
        };

        // share of the whole album, tracks without a year included 
        let share = count as f64 / tracks.len() as f64; 
        if share <= self.dominance_threshold {
            info!(
                year = %year, 
                share, 
                threshold = self.dominance_threshold, 
                "no dominant year below threshold"
            );
            return DominanceVerdict::Inconclusive(NoDominance::BelowThreshold { year, share });
        }

        let earliest_added = tracks.iter()
            .filter_map(|t| t.date_added)
            .map(|d| d.year())
            .min();
        if let (Some(added), Ok(claimed)) = (earliest_added, year.parse::<i32>()) {
            let gap = added - claimed; 
            if gap > self.suspicion_threshold_years {
                warn!(
                    year = %year, 
                    share, 
                    earliest_added = added, 
                    gap, 
                    "consistency.dominant_year_suspicious"
                );
                return DominanceVerdict::Inconclusive(
                    NoDominance::Suspicious { year, share, gap });
            }
        }

        debug!(year = %year, share, "consistency.dominant");
        DominanceVerdict::Dominant { year, share }
    }
}
