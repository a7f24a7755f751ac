//!
//! src/provenance.rs  
//!
//! Year provenance kept alongside each track and the write plan built from it 
//!

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::changes::{FieldChange, FieldKind};
use crate::types::LibraryTrack;

/// `original_year` is the year before the engine first touched the track and 
/// is never replaced once set. `engine_year` is the last year the engine 
/// wrote. A live year that differs from `engine_year` was edited by a human. 
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearProvenance {
    pub original_year: Option<String>, 
    pub engine_year: Option<String> 
}

impl YearProvenance {
    pub fn record_original(&mut self, live: Option<&str>) {
        let empty = self.original_year.as_deref().is_none_or(|y| y.trim().is_empty());
        if empty {
            self.original_year = live.map(str::trim)
                .filter(|y| !y.is_empty())
                .map(str::to_string);
        }
    }

    pub fn record_write(&mut self, year: &str) {
        self.engine_year = Some(year.trim().to_string());
    }

    pub fn is_user_modified(&self, live: Option<&str>) -> bool {
        let Some(written) = self.engine_year.as_deref() else {
            return false; 
        };
        let live = live.map(str::trim).unwrap_or_default();
        written != live 
    }
}

/// A year write for one track together with the provenance to store with it 
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackUpdate {
    pub track_id: String, 
    pub change: FieldChange, 
    pub provenance: YearProvenance 
}

/// Updates that move `tracks` to `year`. Tracks already at `year` and tracks 
/// whose year a human edited are left out. 
pub fn plan_year_updates(tracks: &[LibraryTrack], year: &str) -> Vec<TrackUpdate> {
    tracks.iter().filter_map(|track| {
        let live = FieldKind::Year.value_of(track);
        if track.provenance.is_user_modified(live) {
            debug!(track = %track.id, live = ?live, "provenance.skip_user_modified");
            return None; 
        }
        let change = FieldKind::Year.detect_change(live, year)?;
        let mut provenance = track.provenance.clone();
        provenance.record_original(live);
        provenance.record_write(&change.new);
        Some(TrackUpdate { track_id: track.id.clone(), change, provenance })
    }).collect()
}
