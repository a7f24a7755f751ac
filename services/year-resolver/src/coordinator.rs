//!
//! src/coordinator.rs  
//!
//! Fans an album query out to the configured providers, routing non-Latin 
//! queries through per-script provider lists and retrying with a rewritten 
//! query when nothing comes back. Every provider call runs under one 
//! engine-wide semaphore and a per-call timeout. 
//!

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{ConcurrencyConfig, ScriptPriority, SearchConfig};
use crate::errors::ResolverError;
use crate::fetch::ReleaseProvider;
use crate::scoring::{normalize_name, ReleaseScorer, ScoreTarget};
use crate::script::{classify_script, ScriptType};
use crate::strategy::StrategyDetector;
use crate::types::{ArtistPeriod, CandidateRelease, ReleaseSource, ScoredCandidate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Results(usize), 
    Failed, 
    TimedOut 
}

/// Opt-in hook for callers that want per-call tracking of provider traffic 
pub trait CallTracker: Send + Sync {
    fn record_call(&self, source: ReleaseSource, outcome: CallOutcome, elapsed: Duration);
}

/// Album query in display and normalized form 
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumQuery {
    pub artist: String, 
    pub album: String, 
    pub artist_norm: String, 
    pub album_norm: String, 
    pub region: Option<String> 
}

impl AlbumQuery {
    pub fn new(artist: &str, album: &str, region: Option<&str>) -> Self {
        Self {
            artist: artist.trim().to_string(), 
            album: album.trim().to_string(), 
            artist_norm: normalize_name(artist), 
            album_norm: normalize_name(album), 
            region: region.map(|r| r.trim().to_ascii_lowercase()).filter(|r| !r.is_empty())
        }
    }

    /// Script used for routing: the artist's, or the album's when the artist 
    /// has no letters 
    pub fn script(&self) -> ScriptType {
        match classify_script(&self.artist) {
            ScriptType::Unknown => classify_script(&self.album),
            script => script 
        }
    }
}

pub struct SearchCoordinator {
    providers: Vec<Arc<dyn ReleaseProvider>>, 
    search: SearchConfig, 
    scorer: ReleaseScorer, 
    detector: Arc<StrategyDetector>, 
    budget: Arc<Semaphore>, 
    call_timeout: Duration, 
    tracker: Option<Arc<dyn CallTracker>> 
}

impl SearchCoordinator {
    pub fn new(
        providers: Vec<Arc<dyn ReleaseProvider>>, 
        search: SearchConfig, 
        concurrency: &ConcurrencyConfig, 
        scorer: ReleaseScorer, 
        detector: Arc<StrategyDetector> 
    ) -> Self {
        Self {
            providers, 
            search, 
            scorer, 
            detector, 
            budget: Arc::new(Semaphore::new(concurrency.provider_limit.max(1))), 
            call_timeout: concurrency.call_timeout, 
            tracker: None 
        }
    }

    pub fn with_tracker(mut self, tracker: Arc<dyn CallTracker>) -> Self {
        self.tracker = Some(tracker);
        self 
    }

    /// Shares one call budget between several coordinators 
    pub fn with_budget(mut self, budget: Arc<Semaphore>) -> Self {
        self.budget = budget; 
        self 
    }

    pub fn budget(&self) -> Arc<Semaphore> {
        self.budget.clone()
    }

    fn provider(&self, source: ReleaseSource) -> Option<&Arc<dyn ReleaseProvider>> {
        self.providers.iter().find(|p| p.source() == source)
    }

    /// Unsorted scored candidates for `query` 
    pub async fn search(&self, query: &AlbumQuery, period: Option<ArtistPeriod>) 
        -> Vec<ScoredCandidate> {
        let script = query.script();
        let region = query.region.as_deref();

        if script.is_non_latin() {
            let routed = self.search_by_script(script, query, period).await;
            if !routed.is_empty() {
                return routed; 
            }
            debug!(script = %script, "search.script.empty");
        }

        let standard = self.standard_search(
            &query.artist_norm, &query.album_norm, region, period).await;
        if !standard.is_empty() {
            return standard; 
        }

        let info = self.detector.detect(&query.artist, &query.album);
        if info.is_normal() {
            debug!(artist = %query.artist, album = %query.album, "search.no_results");
            return Vec::new(); 
        }

        let (artist, album) = info.rewrite(&query.artist, &query.album);
        let (artist, album) = (normalize_name(artist), normalize_name(album));
        if artist == query.artist_norm && album == query.album_norm {
            debug!(strategy = ?info.strategy, pattern = ?info.detected_pattern, 
                "search.strategy.no_rewrite");
            return Vec::new(); 
        }

        info!(
            strategy = ?info.strategy, 
            pattern = ?info.detected_pattern, 
            artist = %artist, 
            album = %album, 
            "search.strategy.retry"
        );
        self.standard_search(&artist, &album, region, period).await 
    }

    async fn search_by_script(
        &self, 
        script: ScriptType, 
        query: &AlbumQuery, 
        period: Option<ArtistPeriod>
    ) -> Vec<ScoredCandidate> {
        let default_priority = ScriptPriority::default(); 
        let priority = self.search.script_priorities.get(&script).unwrap_or_else(|| {
            warn!(script = %script, "search.script.no_priorities");
            &default_priority 
        });

        for list in [&priority.primary, &priority.fallback] {
            if list.is_empty() {
                continue; 
            }
            let ordered = preferred_first(list, self.search.preferred_provider);
            debug!(script = %script, providers = ?ordered, "search.script.route");
            let found = self.fan_out(
                &ordered, &query.artist_norm, &query.album_norm, 
                query.region.as_deref(), period
            ).await;
            if !found.is_empty() {
                return found; 
            }
        }
        Vec::new()
    }

    async fn standard_search(
        &self, 
        artist: &str, 
        album: &str, 
        region: Option<&str>, 
        period: Option<ArtistPeriod>
    ) -> Vec<ScoredCandidate> {
        let order = self.search.standard_order.clone();
        self.fan_out(&order, artist, album, region, period).await 
    }

    /// One concurrent call per source; merged in `sources` order 
    async fn fan_out(
        &self, 
        sources: &[ReleaseSource], 
        artist: &str, 
        album: &str, 
        region: Option<&str>, 
        period: Option<ArtistPeriod>
    ) -> Vec<ScoredCandidate> {
        let calls = sources.iter()
            .filter_map(|source| {
                let provider = self.provider(*source);
                if provider.is_none() {
                    debug!(provider = %source, "search.provider.unconfigured");
                }
                provider 
            })
            .map(|provider| self.call_provider(provider.clone(), artist, album, region));
        let batches = join_all(calls).await;

        let target = ScoreTarget { artist, album, region };
        batches.into_iter()
            .flatten()
            .map(|release| {
                let score = self.scorer.score(&release, target, period);
                ScoredCandidate { release, score }
            })
            .collect()
    }

    /// Never fails: errors, timeouts and a closed budget are logged and count 
    /// as zero results 
    async fn call_provider(
        &self, 
        provider: Arc<dyn ReleaseProvider>, 
        artist: &str, 
        album: &str, 
        region: Option<&str>
    ) -> Vec<CandidateRelease> {
        let source = provider.source();
        let started = Instant::now();
        let call = async {
            let _permit = self.budget.acquire().await
                .map_err(|_| ResolverError::Policy("provider budget closed".to_string()))?;
            provider.get_scored_releases(artist, album, region).await 
        };

        let (releases, outcome) = match tokio::time::timeout(self.call_timeout, call).await {
            Ok(Ok(releases)) => {
                let n = releases.len();
                debug!(provider = %source, results = n, "search.provider.done");
                (releases, CallOutcome::Results(n))
            }
            Ok(Err(e)) => {
                warn!(provider = %source, error = %e, "search.provider.failed");
                (Vec::new(), CallOutcome::Failed)
            }
            Err(_) => {
                warn!(provider = %source, timeout_ms = self.call_timeout.as_millis() as u64, 
                    "search.provider.timeout");
                (Vec::new(), CallOutcome::TimedOut)
            }
        };

        if let Some(tracker) = &self.tracker {
            tracker.record_call(source, outcome, started.elapsed());
        }
        releases 
    }
}

fn preferred_first(list: &[ReleaseSource], preferred: Option<ReleaseSource>) -> Vec<ReleaseSource> {
    let mut ordered = list.to_vec();
    if let Some(preferred) = preferred {
        if let Some(at) = ordered.iter().position(|s| *s == preferred) {
            let source = ordered.remove(at);
            ordered.insert(0, source);
        }
    }
    ordered 
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::StrategyConfig;

    /// Provider double answering from a fixed table keyed by normalized album 
    pub(crate) struct MockProvider {
        pub source: ReleaseSource, 
        pub answers: HashMap<String, Vec<CandidateRelease>>, 
        pub fail: bool, 
        pub delay: Duration, 
        pub queries: Mutex<Vec<(String, String)>>, 
        pub in_flight: Arc<AtomicUsize>, 
        pub max_in_flight: Arc<AtomicUsize> 
    }

    impl MockProvider {
        pub(crate) fn new(source: ReleaseSource) -> Self {
            Self {
                source, 
                answers: HashMap::new(), 
                fail: false, 
                delay: Duration::ZERO, 
                queries: Mutex::new(Vec::new()), 
                in_flight: Arc::new(AtomicUsize::new(0)), 
                max_in_flight: Arc::new(AtomicUsize::new(0)) 
            }
        }

        pub(crate) fn answer(mut self, album_norm: &str, artist: &str, title: &str, years: &[&str]) 
            -> Self {
            let releases = years.iter().map(|y| CandidateRelease {
                title: title.to_string(), 
                artist: artist.to_string(), 
                year: y.to_string(), 
                country: None, 
                release_type: Some("Album".to_string()), 
                status: None, 
                source: self.source 
            }).collect();
            self.answers.insert(album_norm.to_string(), releases);
            self 
        }

        pub(crate) fn query_count(&self) -> usize {
            self.queries.lock().map(|q| q.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl ReleaseProvider for MockProvider {
        fn source(&self) -> ReleaseSource { self.source }

        async fn get_scored_releases(&self, artist: &str, album: &str, _region: Option<&str>) 
            -> Result<Vec<CandidateRelease>, ResolverError> {
            self.queries.lock().unwrap().push((artist.to_string(), album.to_string()));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await; 
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail {
                return Err(ResolverError::Http("boom".to_string()));
            }
            Ok(self.answers.get(album).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    struct RecordingTracker {
        calls: Mutex<Vec<(ReleaseSource, CallOutcome)>> 
    }

    impl CallTracker for RecordingTracker {
        fn record_call(&self, source: ReleaseSource, outcome: CallOutcome, _elapsed: Duration) {
            self.calls.lock().unwrap().push((source, outcome));
        }
    }

    fn coordinator(providers: Vec<Arc<MockProvider>>, search: SearchConfig) -> SearchCoordinator {
        let providers = providers.into_iter()
            .map(|p| p as Arc<dyn ReleaseProvider>)
            .collect();
        SearchCoordinator::new(
            providers, 
            search, 
            &ConcurrencyConfig::default(), 
            ReleaseScorer::default(), 
            Arc::new(StrategyDetector::new(&StrategyConfig::default()))
        )
    }

    #[tokio::test]
    async fn latin_query_merges_all_providers_in_priority_order() {
        let lastfm = Arc::new(MockProvider::new(ReleaseSource::LastFm)
            .answer("ok computer", "Radiohead", "OK Computer", &["1997"]));
        let mb = Arc::new(MockProvider::new(ReleaseSource::MusicBrainz)
            .answer("ok computer", "Radiohead", "OK Computer", &["1997", "2009"]));
        let mut discogs = MockProvider::new(ReleaseSource::Discogs);
        discogs.fail = true; 
        let discogs = Arc::new(discogs);

        let c = coordinator(vec![lastfm.clone(), mb.clone(), discogs.clone()], SearchConfig::default());
        let results = c.search(&AlbumQuery::new("Radiohead", "OK Computer", None), None).await;

        let sources: Vec<_> = results.iter().map(|r| r.release.source).collect();
        assert_eq!(sources, vec![
            ReleaseSource::MusicBrainz, ReleaseSource::MusicBrainz, ReleaseSource::LastFm
        ]);
        assert_eq!(discogs.query_count(), 1);
        assert!(results.iter().all(|r| r.score > 0));
    }

    #[tokio::test]
    async fn cyrillic_query_uses_script_lists_before_standard_path() {
        let mb = Arc::new(MockProvider::new(ReleaseSource::MusicBrainz));
        let lastfm = Arc::new(MockProvider::new(ReleaseSource::LastFm)
            .answer("группа крови", "Кино", "Группа крови", &["1988"]));
        let discogs = Arc::new(MockProvider::new(ReleaseSource::Discogs)
            .answer("группа крови", "Kino", "Gruppa Krovi", &["1988"]));

        let c = coordinator(vec![mb.clone(), lastfm.clone(), discogs.clone()], SearchConfig::default());
        let results = c.search(&AlbumQuery::new("Кино", "Группа крови", None), None).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].release.source, ReleaseSource::LastFm);
        assert_eq!(mb.query_count(), 1);
        // fallback list answered, standard path never ran 
        assert_eq!(discogs.query_count(), 0);
    }

    #[tokio::test]
    async fn empty_script_lists_fall_through_to_standard_path() {
        let mb = Arc::new(MockProvider::new(ReleaseSource::MusicBrainz));
        let lastfm = Arc::new(MockProvider::new(ReleaseSource::LastFm));
        let discogs = Arc::new(MockProvider::new(ReleaseSource::Discogs)
            .answer("группа крови", "Кино", "Группа крови", &["1988"]));

        let c = coordinator(vec![mb.clone(), lastfm.clone(), discogs.clone()], SearchConfig::default());
        let results = c.search(&AlbumQuery::new("Кино", "Группа крови", None), None).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].release.source, ReleaseSource::Discogs);
        // primary, fallback, then standard 
        assert_eq!(mb.query_count(), 2);
        assert_eq!(lastfm.query_count(), 2);
    }

    #[tokio::test]
    async fn preferred_provider_leads_the_script_list() {
        let mb = Arc::new(MockProvider::new(ReleaseSource::MusicBrainz)
            .answer("ひとり", "宇多田ヒカル", "ひとり", &["2001"]));
        let apple = Arc::new(MockProvider::new(ReleaseSource::AppleMusic)
            .answer("ひとり", "宇多田ヒカル", "ひとり", &["2002"]));

        let mut search = SearchConfig::default();
        search.preferred_provider = Some(ReleaseSource::AppleMusic);
        search.script_priorities.insert(ScriptType::Japanese, ScriptPriority {
            primary: vec![ReleaseSource::MusicBrainz, ReleaseSource::AppleMusic], 
            fallback: vec![]
        });
        let c = coordinator(vec![mb, apple], search);
        let results = c.search(&AlbumQuery::new("宇多田ヒカル", "ひとり", None), None).await;

        assert_eq!(results[0].release.source, ReleaseSource::AppleMusic);
        assert_eq!(results[1].release.source, ReleaseSource::MusicBrainz);
    }

    #[tokio::test]
    async fn strategy_rewrite_retries_once() {
        let mb = Arc::new(MockProvider::new(ReleaseSource::MusicBrainz)
            .answer("prequelle", "Ghost", "Prequelle", &["2018"]));
        let c = coordinator(vec![mb.clone()], SearchConfig::default());

        let results = c.search(
            &AlbumQuery::new("Ghost", "Prequelle [MESSAGE FROM THE CLERGY]", None), None).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].release.year, "2018");
        let queries = mb.queries.lock().unwrap().clone();
        assert_eq!(queries, vec![
            ("ghost".to_string(), "prequelle message from the clergy".to_string()), 
            ("ghost".to_string(), "prequelle".to_string())
        ]);
    }

    #[tokio::test]
    async fn no_rewrite_means_no_retry() {
        let mb = Arc::new(MockProvider::new(ReleaseSource::MusicBrainz));
        let c = coordinator(vec![mb.clone()], SearchConfig::default());
        let results = c.search(&AlbumQuery::new("Nobody", "Nothing", None), None).await;
        assert!(results.is_empty());
        assert_eq!(mb.query_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out_without_blocking_siblings() {
        let mut slow = MockProvider::new(ReleaseSource::Discogs)
            .answer("ok computer", "Radiohead", "OK Computer", &["1997"]);
        slow.delay = Duration::from_secs(60);
        let fast = MockProvider::new(ReleaseSource::MusicBrainz)
            .answer("ok computer", "Radiohead", "OK Computer", &["1997"]);

        let tracker = Arc::new(RecordingTracker::default());
        let c = coordinator(vec![Arc::new(slow), Arc::new(fast)], SearchConfig::default())
            .with_tracker(tracker.clone());
        let results = c.search(&AlbumQuery::new("Radiohead", "OK Computer", None), None).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].release.source, ReleaseSource::MusicBrainz);
        let calls = tracker.calls.lock().unwrap().clone();
        assert!(calls.contains(&(ReleaseSource::Discogs, CallOutcome::TimedOut)));
        assert!(calls.contains(&(ReleaseSource::MusicBrainz, CallOutcome::Results(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_on_an_exhausted_budget_times_out() {
        let mb = Arc::new(MockProvider::new(ReleaseSource::MusicBrainz)
            .answer("ok computer", "Radiohead", "OK Computer", &["1997"]));
        let tracker = Arc::new(RecordingTracker::default());
        let concurrency = ConcurrencyConfig { provider_limit: 1, call_timeout: Duration::from_secs(1) };
        let c = SearchCoordinator::new(
            vec![mb.clone() as Arc<dyn ReleaseProvider>], 
            SearchConfig::default(), 
            &concurrency, 
            ReleaseScorer::default(), 
            Arc::new(StrategyDetector::new(&StrategyConfig::default()))
        ).with_tracker(tracker.clone());

        let held = c.budget().acquire_owned().await.unwrap();
        let results = c.search(&AlbumQuery::new("Radiohead", "OK Computer", None), None).await;

        assert!(results.is_empty());
        assert_eq!(mb.query_count(), 0);
        let calls = tracker.calls.lock().unwrap().clone();
        assert_eq!(calls, vec![(ReleaseSource::MusicBrainz, CallOutcome::TimedOut)]);

        drop(held);
        assert_eq!(c.budget().available_permits(), 1);
    }

    #[tokio::test]
    async fn letterless_artist_routes_by_album_script() {
        let query = AlbumQuery::new("!!!", "Группа крови", None);
        assert_eq!(query.script(), ScriptType::Cyrillic);

        let mb = Arc::new(MockProvider::new(ReleaseSource::MusicBrainz));
        let lastfm = Arc::new(MockProvider::new(ReleaseSource::LastFm)
            .answer("группа крови", "!!!", "Группа крови", &["2013"]));
        let discogs = Arc::new(MockProvider::new(ReleaseSource::Discogs)
            .answer("группа крови", "!!!", "Группа крови", &["2013"]));

        let c = coordinator(vec![mb.clone(), lastfm.clone(), discogs.clone()], SearchConfig::default());
        let results = c.search(&query, None).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].release.source, ReleaseSource::LastFm);
        assert_eq!(mb.query_count(), 1);
        assert_eq!(discogs.query_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_calls_never_exceed_the_budget() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));
        let providers: Vec<Arc<MockProvider>> = ReleaseSource::ALL.iter().map(|source| {
            let mut p = MockProvider::new(*source)
                .answer("ok computer", "Radiohead", "OK Computer", &["1997"]);
            p.delay = Duration::from_millis(20);
            p.in_flight = in_flight.clone();
            p.max_in_flight = max_in_flight.clone();
            Arc::new(p)
        }).collect();

        let concurrency = ConcurrencyConfig { provider_limit: 3, call_timeout: Duration::from_secs(30) };
        let c = Arc::new(SearchCoordinator::new(
            providers.iter().map(|p| p.clone() as Arc<dyn ReleaseProvider>).collect(), 
            SearchConfig::default(), 
            &concurrency, 
            ReleaseScorer::default(), 
            Arc::new(StrategyDetector::new(&StrategyConfig::default()))
        ));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let c = c.clone();
            handles.push(tokio::spawn(async move {
                c.search(&AlbumQuery::new("Radiohead", "OK Computer", None), None).await.len()
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), 4);
        }

        assert!(max_in_flight.load(Ordering::SeqCst) <= 3);
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 3);
        let total: usize = providers.iter().map(|p| p.query_count()).sum();
        assert_eq!(total, 40);
        assert_eq!(c.budget().available_permits(), 3);
    }

    #[test]
    fn preferred_first_only_moves_listed_sources() {
        let list = [ReleaseSource::MusicBrainz, ReleaseSource::LastFm];
        assert_eq!(preferred_first(&list, Some(ReleaseSource::LastFm)), 
            vec![ReleaseSource::LastFm, ReleaseSource::MusicBrainz]);
        assert_eq!(preferred_first(&list, Some(ReleaseSource::Discogs)), list.to_vec());
    }
}
