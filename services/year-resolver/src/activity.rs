//!
//! src/activity.rs  
//!
//! Memoizes artist activity lookups for the life of the process. The resolver 
//! asks for the same artist's period once for scoring and again when vetting 
//! a conflict. 
//!

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::errors::ResolverError;
use crate::fallback::ArtistActivity;
use crate::scoring::normalize_name;
use crate::types::ArtistPeriod;

pub struct CachedActivity {
    inner: Arc<dyn ArtistActivity>, 
    periods: Mutex<HashMap<String, Option<ArtistPeriod>>> 
}

impl CachedActivity {
    pub fn new(inner: Arc<dyn ArtistActivity>) -> Self {
        Self { inner, periods: Mutex::new(HashMap::new()) }
    }

    pub async fn cached_count(&self) -> usize {
        self.periods.lock().await.len()
    }
}

#[async_trait]
impl ArtistActivity for CachedActivity {
    async fn get_artist_start_year(&self, artist: &str) -> Result<Option<i32>, ResolverError> {
        Ok(self.get_artist_period(artist).await?.map(|p| p.start_year))
    }

    /// Misses are cached too; errors are not 
    async fn get_artist_period(&self, artist: &str) -> Result<Option<ArtistPeriod>, ResolverError> {
        let key = normalize_name(artist);
        if let Some(hit) = self.periods.lock().await.get(&key) {
            debug!(artist = %artist, "activity.cache_hit");
            return Ok(*hit);
        }
        let period = self.inner.get_artist_period(artist).await?;
        self.periods.lock().await.insert(key, period);
        Ok(period)
    }
}
