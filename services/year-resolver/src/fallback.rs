//!
//! src/fallback.rs  
//!
//! Decides whether a freshly proposed album year replaces the year already 
//! on the album's tracks, is rejected, or needs a human to look at it. 
//!

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::YearPolicyConfig;
use crate::consistency::most_common_year;
use crate::errors::ResolverError;
use crate::types::{ArtistPeriod, LibraryTrack};

/// Lookup of an artist's known active period 
#[async_trait]
pub trait ArtistActivity: Send + Sync {
    async fn get_artist_start_year(&self, artist: &str) -> Result<Option<i32>, ResolverError>;

    async fn get_artist_period(&self, artist: &str) -> Result<Option<ArtistPeriod>, ResolverError> {
        Ok(self.get_artist_start_year(artist).await?.map(|start| ArtistPeriod::new(start, None)))
    }
}

/// Destination for albums that need a human decision 
#[async_trait]
pub trait PendingReviewSink: Send + Sync {
    async fn mark_for_verification(
        &self, 
        artist: &str, 
        album: &str, 
        reason: VerificationReason, 
        metadata: Value, 
        recheck_days: u32 
    ) -> Result<(), ResolverError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationReason {
    SuspiciousYearChange, 
    UserModifiedYear, 
    YearBeforeArtistStart, 
    AbsurdYear, 
    FutureYear, 
    NoYearFound 
}

impl VerificationReason {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationReason::SuspiciousYearChange  => "suspicious_year_change",
            VerificationReason::UserModifiedYear      => "user_modified_year",
            VerificationReason::YearBeforeArtistStart => "year_before_artist_start",
            VerificationReason::AbsurdYear            => "absurd_year",
            VerificationReason::FutureYear            => "future_year",
            VerificationReason::NoYearFound           => "no_year_found"
        }
    }
}

impl std::fmt::Display for VerificationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the resolver knows about one proposal 
#[derive(Debug, Clone, Copy)]
pub struct FallbackRequest<'a> {
    pub artist: &'a str, 
    pub album: &'a str, 
    pub proposed_year: &'a str, 
    pub tracks: &'a [LibraryTrack], 
    /// the proposal's score met the definitive cutoff 
    pub is_definitive: bool, 
    pub confidence: u32, 
    /// year -> best score. `None` when scores are unknown, which is not the 
    /// same as an empty map. 
    pub year_scores: Option<&'a BTreeMap<String, u32>> 
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackDecision {
    pub year: Option<String>, 
    pub needs_verification: bool, 
    pub reason: Option<VerificationReason> 
}

impl FallbackDecision {
    fn accept(year: &str) -> Self {
        Self { year: Some(year.to_string()), needs_verification: false, reason: None }
    }

    fn hold(existing: Option<String>, reason: VerificationReason) -> Self {
        Self { year: existing, needs_verification: true, reason: Some(reason) }
    }
}

pub struct FallbackResolver {
    policy: YearPolicyConfig, 
    activity: Option<Arc<dyn ArtistActivity>>, 
    sink: Option<Arc<dyn PendingReviewSink>>, 
    current_year: Option<i32> 
}

impl FallbackResolver {
    pub fn new(policy: YearPolicyConfig) -> Self {
        Self { policy, activity: None, sink: None, current_year: None }
    }

    pub fn with_activity(mut self, activity: Arc<dyn ArtistActivity>) -> Self {
        self.activity = Some(activity);
        self 
    }

    pub fn with_sink(mut self, sink: Arc<dyn PendingReviewSink>) -> Self {
        self.sink = Some(sink);
        self 
    }

    /// Pins "now" for the future-year bound 
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = Some(year);
        self 
    }

    pub fn policy(&self) -> &YearPolicyConfig {
        &self.policy 
    }

    fn now_year(&self) -> i32 {
        self.current_year.unwrap_or_else(|| Utc::now().year())
    }

    pub async fn resolve(&self, req: FallbackRequest<'_>) -> FallbackDecision {
        if !self.policy.fallback_enabled {
            return FallbackDecision::accept(req.proposed_year);
        }

        let existing = most_common_year(req.tracks).map(|(year, _)| year);
        let Ok(proposed) = req.proposed_year.parse::<i32>() else {
            warn!(artist = %req.artist, album = %req.album, proposed = %req.proposed_year, 
                "fallback.proposed_unparseable");
            return self.flag(&req, existing, VerificationReason::AbsurdYear, None).await;
        };

        let corroborated_by_tracks = existing.as_deref() == Some(req.proposed_year);
        if proposed < self.policy.absurd_year_floor && !req.is_definitive && !corroborated_by_tracks {
            return self.flag(&req, existing, VerificationReason::AbsurdYear, None).await;
        }
        if proposed > self.now_year() + self.policy.max_future_years {
            return self.flag(&req, existing, VerificationReason::FutureYear, None).await;
        }

        let Some(existing_year) = existing.as_deref() else {
            return FallbackDecision::accept(req.proposed_year);
        };
        if corroborated_by_tracks {
            return FallbackDecision::accept(req.proposed_year);
        }

        if self.set_by_human(req.tracks, existing_year) {
            info!(artist = %req.artist, album = %req.album, existing = %existing_year, 
                proposed = %req.proposed_year, "fallback.user_modified");
            return self.flag(&req, existing, VerificationReason::UserModifiedYear, None).await;
        }

        let Ok(existing_num) = existing_year.parse::<i32>() else {
            return FallbackDecision::accept(req.proposed_year);
        };
        let difference = (proposed - existing_num).abs();
        if difference <= self.policy.year_difference_tolerance {
            debug!(existing = %existing_year, proposed = %req.proposed_year, difference, 
                "fallback.within_tolerance");
            return FallbackDecision::accept(req.proposed_year);
        }

        info!(artist = %req.artist, album = %req.album, existing = %existing_year, 
            proposed = %req.proposed_year, difference, confidence = req.confidence, 
            "fallback.conflict");

        let start_year = self.artist_start_year(req.artist).await;
        if let Some(start) = start_year {
            if proposed < start {
                return self.flag(
                    &req, existing, VerificationReason::YearBeforeArtistStart, start_year).await;
            }
            if existing_num < start {
                info!(existing = %existing_year, start, "fallback.existing_before_artist_start");
                return FallbackDecision::accept(req.proposed_year);
            }
        }

        let existing_supported = req.year_scores.map(|scores| scores.contains_key(existing_year));
        if existing_supported == Some(false) {
            info!(existing = %existing_year, proposed = %req.proposed_year, 
                "fallback.existing_uncorroborated");
            return FallbackDecision::accept(req.proposed_year);
        }

        if req.confidence < self.policy.min_confidence_for_new_year {
            return self.flag(
                &req, existing, VerificationReason::SuspiciousYearChange, start_year).await;
        }

        FallbackDecision::accept(req.proposed_year)
    }

    /// Some track carrying `year` was edited after the engine last wrote it 
    fn set_by_human(&self, tracks: &[LibraryTrack], year: &str) -> bool {
        tracks.iter()
            .filter(|t| t.year_value() == Some(year))
            .any(|t| t.provenance.is_user_modified(t.year_value()))
    }

    async fn artist_start_year(&self, artist: &str) -> Option<i32> {
        let activity = self.activity.as_ref()?;
        match activity.get_artist_start_year(artist).await {
            Ok(start) => start, 
            Err(e) => {
                warn!(artist = %artist, error = %e, "fallback.artist_activity_failed");
                None 
            }
        }
    }

    async fn flag(
        &self, 
        req: &FallbackRequest<'_>, 
        existing: Option<String>, 
        reason: VerificationReason, 
        artist_start_year: Option<i32> 
    ) -> FallbackDecision {
        let score_of = |year: Option<&str>| year
            .and_then(|y| req.year_scores.and_then(|s| s.get(y)).copied());
        let metadata = json!({
            "existing_year": existing, 
            "proposed_year": req.proposed_year, 
            "existing_score": score_of(existing.as_deref()), 
            "proposed_score": score_of(Some(req.proposed_year)), 
            "confidence": req.confidence, 
            "artist_start_year": artist_start_year 
        });
        warn!(artist = %req.artist, album = %req.album, reason = %reason, 
            existing = ?existing, proposed = %req.proposed_year, "fallback.needs_verification");
        self.mark(req.artist, req.album, reason, metadata).await; 
        FallbackDecision::hold(existing, reason)
    }

    /// Sink failures are logged; the decision stands either way 
    pub async fn mark(&self, artist: &str, album: &str, reason: VerificationReason, metadata: Value) {
        let Some(sink) = &self.sink else {
            return; 
        };
        if let Err(e) = sink.mark_for_verification(
            artist, album, reason, metadata, self.policy.recheck_days).await {
            warn!(artist = %artist, album = %album, error = %e, "fallback.sink_failed");
        }
    }
}
