//!
//! src/resolver.rs  
//!
//! `resolve_year`: consistency pre-check, provider search, year aggregation 
//! and the fallback decision, in that order 
//!

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::consistency::{most_common_year, ConsistencyChecker, DominanceVerdict};
use crate::coordinator::{AlbumQuery, SearchCoordinator};
use crate::errors::ResolverError;
use crate::fallback::{ArtistActivity, FallbackRequest, FallbackResolver, VerificationReason};
use crate::provenance::{plan_year_updates, TrackUpdate};
use crate::types::{is_valid_year, ArtistPeriod, LibraryTrack, ScoredCandidate, YearResolution};

/// Best score seen for each valid year 
pub fn aggregate_year_scores(candidates: &[ScoredCandidate]) -> BTreeMap<String, u32> {
    let mut scores = BTreeMap::new(); 
    for c in candidates.iter().filter(|c| c.score > 0 && is_valid_year(&c.release.year)) {
        let best = scores.entry(c.release.year.clone()).or_insert(0);
        *best = (*best).max(c.score);
    }
    scores 
}

/// Highest score; ties go to the higher priority provider, then the earlier 
/// year 
pub fn pick_best(candidates: &[ScoredCandidate]) -> Option<&ScoredCandidate> {
    candidates.iter()
        .filter(|c| c.score > 0 && is_valid_year(&c.release.year))
        .min_by(|a, b| b.score.cmp(&a.score)
            .then(a.release.source.priority().cmp(&b.release.source.priority()))
            .then(a.release.year.cmp(&b.release.year)))
}

pub struct YearResolver {
    coordinator: SearchCoordinator, 
    checker: ConsistencyChecker, 
    fallback: FallbackResolver, 
    activity: Option<Arc<dyn ArtistActivity>>, 
    region: Option<String> 
}

impl YearResolver {
    pub fn new(coordinator: SearchCoordinator, fallback: FallbackResolver) -> Self {
        let checker = ConsistencyChecker::new(fallback.policy());
        Self { coordinator, checker, fallback, activity: None, region: None }
    }

    /// Source of the artist period used to bias scoring 
    pub fn with_activity(mut self, activity: Arc<dyn ArtistActivity>) -> Self {
        self.activity = Some(activity);
        self 
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region; 
        self 
    }

    #[instrument(skip(self, tracks), fields(tracks = tracks.len()))]
    pub async fn resolve_year(&self, artist: &str, album: &str, tracks: &[LibraryTrack]) 
        -> Result<YearResolution, ResolverError> {
        if album.trim().is_empty() {
            return Err(ResolverError::Policy("resolve_year needs an album name".to_string()));
        }

        if let DominanceVerdict::Dominant { year, share } = self.checker.check(tracks) {
            info!(year = %year, share, "resolve.dominant_existing_year");
            return Ok(YearResolution {
                year: Some(year), 
                is_reliable: true, 
                confidence: (share * 100.0).round() as u32, 
                year_scores: BTreeMap::new(), 
                needs_verification: false 
            });
        }

        let query = AlbumQuery::new(artist, album, self.region.as_deref());
        let period = self.artist_period(artist).await; 
        let candidates = self.coordinator.search(&query, period).await; 
        let year_scores = aggregate_year_scores(&candidates);

        let Some(best) = pick_best(&candidates) else {
            warn!(candidates = candidates.len(), "resolve.no_year_found");
            let existing = most_common_year(tracks).map(|(y, _)| y);
            self.fallback.mark(artist, album, VerificationReason::NoYearFound, json!({
                "existing_year": existing, 
                "candidates": candidates.len() 
            })).await; 
            return Ok(YearResolution {
                year: None, 
                is_reliable: false, 
                confidence: 0, 
                year_scores, 
                needs_verification: true 
            });
        };

        let proposed = best.release.year.as_str();
        let is_definitive = best.score >= self.fallback.policy().definitive_score; 
        let confidence = best.score.min(100);
        debug!(
            proposed = %proposed, 
            score = best.score, 
            source = %best.release.source, 
            is_definitive, 
            years = ?year_scores, 
            "resolve.best_candidate"
        );

        let decision = self.fallback.resolve(FallbackRequest {
            artist, 
            album, 
            proposed_year: proposed, 
            tracks, 
            is_definitive, 
            confidence, 
            year_scores: Some(&year_scores)
        }).await; 

        let is_reliable = is_definitive 
            && !decision.needs_verification 
            && decision.year.as_deref() == Some(proposed);
        info!(
            year = ?decision.year, 
            is_reliable, 
            confidence, 
            needs_verification = decision.needs_verification, 
            "resolve.done"
        );
        Ok(YearResolution {
            year: decision.year, 
            is_reliable, 
            confidence, 
            year_scores, 
            needs_verification: decision.needs_verification 
        })
    }

    /// Track writes for a resolution; nothing when no year was found 
    pub fn plan_updates(&self, tracks: &[LibraryTrack], resolution: &YearResolution) 
        -> Vec<TrackUpdate> {
        match resolution.year.as_deref() {
            Some(year) => plan_year_updates(tracks, year),
            None => Vec::new()
        }
    }

    async fn artist_period(&self, artist: &str) -> Option<ArtistPeriod> {
        let activity = self.activity.as_ref()?;
        match activity.get_artist_period(artist).await {
            Ok(period) => period, 
            Err(e) => {
                warn!(artist = %artist, error = %e, "resolve.artist_period_failed");
                None 
            }
        }
    }
}
