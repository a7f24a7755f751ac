//!
//! src/main.rs  
//! 
//! `year-resolver <artist> <album>`: resolves one album against the live 
//! providers and prints the result as JSON 
//!

use std::sync::Arc;

use year_resolver::activity::CachedActivity;
use year_resolver::config;
use year_resolver::coordinator::SearchCoordinator;
use year_resolver::fallback::{ArtistActivity, FallbackResolver};
use year_resolver::fetch::{build_providers, MusicBrainzClient};
use year_resolver::logging;
use year_resolver::pending::SqlitePendingStore;
use year_resolver::scoring::ReleaseScorer;
use year_resolver::strategy::StrategyDetector;
use year_resolver::{ResolverError, YearResolver};

#[tokio::main]
async fn main() -> Result<(), ResolverError> {
    let cfgs = config::load_config()?;
    let _guard = logging::init_logging(&cfgs.logging)?;

    tracing::info!(
        service="year-resolver", 
        version=%env!("CARGO_PKG_VERSION"), 
        "starting"
    );

    let mut args = std::env::args().skip(1);
    let (Some(artist), Some(album)) = (args.next(), args.next()) else {
        return Err(ResolverError::Config("usage: year-resolver <artist> <album>".to_string()));
    };

    // sqlite does not create missing directories 
    if let Some(dir) = cfgs.persistence.pending_db_url
        .strip_prefix("sqlite://")
        .and_then(|path| std::path::Path::new(path).parent())
        .filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let pending = Arc::new(SqlitePendingStore::init(&cfgs.persistence.pending_db_url).await?);

    // one client for releases and artist periods, so both share its rate gate 
    let musicbrainz = Arc::new(
        MusicBrainzClient::new(&cfgs.http, &cfgs.identity, &cfgs.musicbrainz)?);
    let activity: Arc<dyn ArtistActivity> = Arc::new(CachedActivity::new(musicbrainz.clone()));
    let detector = Arc::new(StrategyDetector::new(&cfgs.strategy));

    let coordinator = SearchCoordinator::new(
        build_providers(&cfgs, musicbrainz)?, 
        cfgs.search.clone(), 
        &cfgs.concurrency, 
        ReleaseScorer::new(cfgs.scoring.clone()), 
        detector 
    );
    let fallback = FallbackResolver::new(cfgs.policy.clone())
        .with_activity(activity.clone())
        .with_sink(pending.clone());
    let resolver = YearResolver::new(coordinator, fallback)
        .with_activity(activity)
        .with_region(cfgs.search.region.clone());

    let resolution = resolver.resolve_year(&artist, &album, &[]).await?;
    println!("{}", serde_json::to_string_pretty(&resolution)?);

    let due = pending.count().await?;
    tracing::info!(pending = due, "done");
    Ok(())
}
