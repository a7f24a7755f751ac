//!
//! src/fetch.rs  
//!
//! Defines the provider clients, the requests they build against each 
//! endpoint and the mapping of each response onto candidate releases 
//!

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, header, redirect, RequestBuilder};
use serde_json::Value;
use url::Url;

use crate::config::{
    AppleMusicConfig, DiscogsConfig, HttpConfig, IdentityConfig, LastFmConfig, 
    MusicBrainzConfig, RetryConfig
}; 
use crate::errors::ResolverError; 
use crate::fallback::ArtistActivity;
use crate::retry::{execute_with_retry, RateGate};
use crate::scoring::normalize_name;
use crate::types::{extract_year, ArtistPeriod, CandidateRelease, ReleaseSource};

/// A source of candidate releases for an album query. Implementations return 
/// an empty list for empty or unmatched input; errors are reserved for 
/// transport, status and decoding failures. 
#[async_trait]
pub trait ReleaseProvider: Send + Sync {
    fn source(&self) -> ReleaseSource; 

    async fn get_scored_releases(
        &self, 
        artist: &str, 
        album: &str, 
        region: Option<&str>
    ) -> Result<Vec<CandidateRelease>, ResolverError>;
}

/// Client building functionality 
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder  {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
}

fn client_with_headers(http: &HttpConfig, headers: header::HeaderMap) ->
    Result<Client, ResolverError> {
    client_helper(http)
        .default_headers(headers)
        .build()
        .map_err(|e| ResolverError::Http(format!("build client: {e}")))
}

fn json_headers(identity: Option<&IdentityConfig>) -> Result<header::HeaderMap, ResolverError> {
    let mut h = header::HeaderMap::new(); 
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    if let Some(id) = identity {
        h.insert(
            header::USER_AGENT, 
            header::HeaderValue::from_str(&id.user_agent)
                .map_err(|e| ResolverError::Config(format!("invalid user-agent {e}")))?
        );
    }
    Ok(h)
}

fn join(base: &Url, path: &str) -> Result<Url, ResolverError> {
    base.join(path).map_err(|e| ResolverError::Config(format!("join {path}: {e}")))
}

/// String or number field as a string 
fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None 
    }
}

/// Escapes lucene query syntax for MusicBrainz search 
fn lucene_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if "+-&|!(){}[]^\"~*?:\\/".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out 
}

#[derive(Debug, Clone)]
pub struct MusicBrainzClient {
    pub http: Client, 
    pub base: Url, 
    pub search_limit: u32, 
    retry: RetryConfig, 
    gate: Arc<RateGate>
}

impl MusicBrainzClient {
    pub fn new(
        http_config: &HttpConfig, 
        id: &IdentityConfig, 
        cfg: &MusicBrainzConfig) -> Result<Self, ResolverError> {
        let http = client_with_headers(http_config, json_headers(Some(id))?)?; 
        Ok( Self{ 
            http, 
            base: cfg.base_url.clone(),
            search_limit: cfg.search_limit, 
            retry: http_config.retry.clone(), 
            gate: Arc::new(RateGate::new(cfg.min_interval))
        })
    }

    /// GET /ws/2/release?query=release:"..." AND artist:"..."&fmt=json&limit=
    pub fn search_release(&self, artist: &str, album: &str) -> Result<RequestBuilder, ResolverError> {
        let mut query = format!("release:\"{}\"", lucene_escape(album));
        if !artist.trim().is_empty() {
            query.push_str(&format!(" AND artist:\"{}\"", lucene_escape(artist)));
        }
        let url = join(&self.base, "release")?;
        Ok(self.http.get(url).query(&[
            ("query", query.as_str()),
            ("fmt", "json"),
            ("limit", &self.search_limit.to_string())
        ]))
    }

    /// GET /ws/2/artist?query=artist:"..."&fmt=json&limit=5
    pub fn search_artist(&self, artist: &str) -> Result<RequestBuilder, ResolverError> {
        let query = format!("artist:\"{}\"", lucene_escape(artist));
        let url = join(&self.base, "artist")?;
        Ok(self.http.get(url).query(&[
            ("query", query.as_str()),
            ("fmt", "json"),
            ("limit", "5")
        ]))
    }
}

/// Life span of the best matching artist in a MusicBrainz artist search: an 
/// exact normalized name match, else the top hit when its score is at least 90 
pub fn parse_musicbrainz_artist(value: &Value, artist: &str) -> Option<ArtistPeriod> {
    let artists = value.get("artists").and_then(Value::as_array)?;
    let wanted = normalize_name(artist);
    let best = artists.iter()
        .find(|a| a.get("name").and_then(Value::as_str)
            .is_some_and(|name| normalize_name(name) == wanted))
        .or_else(|| artists.first()
            .filter(|a| a.get("score").and_then(Value::as_u64).is_some_and(|s| s >= 90)))?;

    let year_of = |key: &str| best.pointer(&format!("/life-span/{key}"))
        .and_then(text)
        .and_then(|d| extract_year(&d))
        .and_then(|y| y.parse::<i32>().ok());
    Some(ArtistPeriod::new(year_of("begin")?, year_of("end")))
}

/// Maps a MusicBrainz release search response 
pub fn parse_musicbrainz(value: &Value) -> Vec<CandidateRelease> {
    let Some(releases) = value.get("releases").and_then(Value::as_array) else {
        return Vec::new(); 
    };
    releases.iter().filter_map(|r| {
        let year = r.get("date").and_then(text).and_then(|d| extract_year(&d))?;
        let artist = r.get("artist-credit")
            .and_then(Value::as_array)
            .map(|credits| credits.iter()
                .map(|c| format!(
                    "{}{}", 
                    c.get("name").and_then(Value::as_str).unwrap_or_default(),
                    c.get("joinphrase").and_then(Value::as_str).unwrap_or_default()
                ))
                .collect::<String>())
            .unwrap_or_default();
        let group = r.get("release-group");
        let compilation = group
            .and_then(|g| g.get("secondary-types"))
            .and_then(Value::as_array)
            .is_some_and(|types| types.iter()
                .any(|t| t.as_str().is_some_and(|t| t.eq_ignore_ascii_case("compilation"))));
        let release_type = if compilation {
            Some("Compilation".to_string())
        } else {
            group.and_then(|g| g.get("primary-type")).and_then(text)
        };

        Some(CandidateRelease {
            title: r.get("title").and_then(text).unwrap_or_default(),
            artist, 
            year, 
            country: r.get("country").and_then(text), 
            release_type, 
            status: r.get("status").and_then(text), 
            source: ReleaseSource::MusicBrainz 
        })
    }).collect()
}

#[async_trait]
impl ReleaseProvider for MusicBrainzClient {
    fn source(&self) -> ReleaseSource { ReleaseSource::MusicBrainz }

    async fn get_scored_releases(&self, artist: &str, album: &str, _region: Option<&str>) 
        -> Result<Vec<CandidateRelease>, ResolverError> {
        if album.trim().is_empty() {
            return Ok(Vec::new());
        }
        self.gate.wait().await; 
        let value = execute_with_retry(
            self.search_release(artist, album)?, &self.retry, "musicbrainz.search_release"
        ).await?;
        Ok(parse_musicbrainz(&value))
    }
}

#[derive(Clone, Debug)]
pub struct DiscogsClient {
    pub http: Client, 
    pub cfg: DiscogsConfig, 
    token: String, 
    retry: RetryConfig 
}

impl DiscogsClient {
    /// Disabled (`Ok(None)`) when no token is configured 
    pub fn new(http_cfg: &HttpConfig, identity: &IdentityConfig, dg_cfg: &DiscogsConfig) 
        -> Result<Option<Self>, ResolverError> {
        let Some(token) = dg_cfg.token.clone() else {
            return Ok(None);
        };
        let http = client_with_headers(http_cfg, json_headers(Some(identity))?)?;
        Ok(Some(Self { http, cfg: dg_cfg.clone(), token, retry: http_cfg.retry.clone() }))
    }

    /// GET /database/search?artist=...&release_title=...&type=release&per_page=
    pub fn search_release(&self, artist: &str, album: &str) -> Result<RequestBuilder, ResolverError> {
        let url = join(&self.cfg.base_url, "database/search")?;
        let mut params = vec![
            ("release_title", album.to_string()),
            ("type", "release".to_string()),
            ("per_page", self.cfg.per_page.to_string()),
        ];
        if !artist.trim().is_empty() {
            params.push(("artist", artist.to_string()));
        }
        Ok(self.http.get(url)
            .query(&params)
            .header(header::AUTHORIZATION, format!("Discogs token={}", self.token)))
    }
}

/// Maps a Discogs database search response 
pub fn parse_discogs(value: &Value) -> Vec<CandidateRelease> {
    let Some(results) = value.get("results").and_then(Value::as_array) else {
        return Vec::new(); 
    };
    results.iter().filter_map(|r| {
        let year = r.get("year").and_then(text)?;
        // "Artist - Title" 
        let full = r.get("title").and_then(text).unwrap_or_default();
        let (artist, title) = match full.split_once(" - ") {
            Some((a, t)) => (a.trim().to_string(), t.trim().to_string()),
            None => (String::new(), full.clone())
        };
        let formats: Vec<String> = r.get("format")
            .and_then(Value::as_array)
            .map(|f| f.iter().filter_map(text).collect())
            .unwrap_or_default();
        let has = |name: &str| formats.iter().any(|f| f.eq_ignore_ascii_case(name));
        let release_type = if has("Compilation") {
            Some("Compilation".to_string())
        } else if has("Album") || has("LP") {
            Some("Album".to_string())
        } else {
            None 
        };
        let status = has("Unofficial Release").then(|| "Unofficial".to_string());

        Some(CandidateRelease {
            title, 
            artist, 
            year, 
            country: r.get("country").and_then(text), 
            release_type, 
            status, 
            source: ReleaseSource::Discogs 
        })
    }).collect()
}

#[async_trait]
impl ReleaseProvider for DiscogsClient {
    fn source(&self) -> ReleaseSource { ReleaseSource::Discogs }

    async fn get_scored_releases(&self, artist: &str, album: &str, _region: Option<&str>) 
        -> Result<Vec<CandidateRelease>, ResolverError> {
        if album.trim().is_empty() {
            return Ok(Vec::new());
        }
        let value = execute_with_retry(
            self.search_release(artist, album)?, &self.retry, "discogs.search_release"
        ).await?;
        Ok(parse_discogs(&value))
    }
}

#[derive(Clone, Debug)]
pub struct LastFmClient {
    pub http: Client, 
    pub cfg: LastFmConfig,
    api_key: String, 
    retry: RetryConfig 
}

impl LastFmClient {
    /// Disabled (`Ok(None)`) when no api key is configured 
    pub fn new(http_cfg: &HttpConfig, last_cfg: &LastFmConfig) -> 
        Result<Option<Self>, ResolverError> {
        let Some(api_key) = last_cfg.api_key.clone() else {
            return Ok(None);
        };
        let http = client_with_headers(http_cfg, json_headers(None)?)?; 
        Ok(Some(Self{ http, cfg: last_cfg.clone(), api_key, retry: http_cfg.retry.clone() }))
    }

    /// GET /?method=album.getInfo&artist=...&album=...&autocorrect=1&api_key=...&format=json
    pub fn album_info(&self, artist: &str, album: &str) -> RequestBuilder {
        self.http.get(self.cfg.base_url.clone()).query(&[
            ("method", "album.getInfo"),
            ("artist", artist),
            ("album", album),
            ("autocorrect", "1"),
            ("api_key", &self.api_key),
            ("format", "json"),
        ])
    }
}

/// Maps an album.getInfo response. The year comes from `releasedate` when 
/// present, otherwise from a four digit user tag. 
pub fn parse_lastfm(value: &Value) -> Vec<CandidateRelease> {
    let Some(album) = value.get("album") else {
        return Vec::new(); 
    };
    let from_date = album.get("releasedate").and_then(text).and_then(|d| extract_year(&d));
    let from_tags = || album.pointer("/tags/tag")
        .and_then(Value::as_array)
        .and_then(|tags| tags.iter()
            .filter_map(|t| t.get("name").and_then(text))
            .find(|name| crate::types::is_valid_year(name)));
    let Some(year) = from_date.or_else(from_tags) else {
        return Vec::new(); 
    };
    vec![CandidateRelease {
        title: album.get("name").and_then(text).unwrap_or_default(), 
        artist: album.get("artist").and_then(text).unwrap_or_default(), 
        year, 
        country: None, 
        release_type: None, 
        status: None, 
        source: ReleaseSource::LastFm 
    }]
}

#[async_trait]
impl ReleaseProvider for LastFmClient {
    fn source(&self) -> ReleaseSource { ReleaseSource::LastFm }

    async fn get_scored_releases(&self, artist: &str, album: &str, _region: Option<&str>) 
        -> Result<Vec<CandidateRelease>, ResolverError> {
        // album.getInfo needs both 
        if artist.trim().is_empty() || album.trim().is_empty() {
            return Ok(Vec::new());
        }
        let request = self.album_info(artist, album);
        match execute_with_retry(request, &self.retry, "lastfm.album_info").await {
            Ok(value) => Ok(parse_lastfm(&value)),
            // unknown albums come back as a 404 with an error payload 
            Err(ResolverError::NotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e)
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppleMusicClient {
    pub http: Client, 
    pub cfg: AppleMusicConfig, 
    retry: RetryConfig 
}

impl AppleMusicClient {
    pub fn new(http_cfg: &HttpConfig, cfg: &AppleMusicConfig) -> Result<Self, ResolverError> {
        let http = client_with_headers(http_cfg, json_headers(None)?)?; 
        Ok(Self { http, cfg: cfg.clone(), retry: http_cfg.retry.clone() })
    }

    /// GET /search?term=...&entity=album&country=..&limit=
    pub fn search_album(&self, artist: &str, album: &str, country: &str) -> 
        Result<RequestBuilder, ResolverError> {
        let url = join(&self.cfg.base_url, "search")?;
        let term = format!("{artist} {album}");
        Ok(self.http.get(url).query(&[
            ("term", term.trim()),
            ("entity", "album"),
            ("media", "music"),
            ("country", country),
            ("limit", &self.cfg.limit.to_string())
        ]))
    }
}

/// Maps an iTunes search response; `storefront` is the country queried 
pub fn parse_apple_music(value: &Value, storefront: &str) -> Vec<CandidateRelease> {
    let Some(results) = value.get("results").and_then(Value::as_array) else {
        return Vec::new(); 
    };
    results.iter().filter_map(|r| {
        let year = r.get("releaseDate").and_then(text).and_then(|d| extract_year(&d))?;
        let title = r.get("collectionName").and_then(text).unwrap_or_default();
        let release_type = if title.to_ascii_lowercase().contains("greatest hits") 
            || title.to_ascii_lowercase().contains("best of") {
            Some("Compilation".to_string())
        } else {
            r.get("collectionType").and_then(text)
        };
        Some(CandidateRelease {
            title, 
            artist: r.get("artistName").and_then(text).unwrap_or_default(), 
            year, 
            country: Some(storefront.to_ascii_uppercase()), 
            release_type, 
            status: None, 
            source: ReleaseSource::AppleMusic 
        })
    }).collect()
}

#[async_trait]
impl ReleaseProvider for AppleMusicClient {
    fn source(&self) -> ReleaseSource { ReleaseSource::AppleMusic }

    async fn get_scored_releases(&self, artist: &str, album: &str, region: Option<&str>) 
        -> Result<Vec<CandidateRelease>, ResolverError> {
        if album.trim().is_empty() {
            return Ok(Vec::new());
        }
        let country = region.unwrap_or(&self.cfg.default_country);
        let value = execute_with_retry(
            self.search_album(artist, album, country)?, &self.retry, "applemusic.search"
        ).await?;
        Ok(parse_apple_music(&value, country))
    }
}

#[async_trait]
impl ArtistActivity for MusicBrainzClient {
    async fn get_artist_start_year(&self, artist: &str) -> Result<Option<i32>, ResolverError> {
        Ok(self.get_artist_period(artist).await?.map(|p| p.start_year))
    }

    async fn get_artist_period(&self, artist: &str) -> Result<Option<ArtistPeriod>, ResolverError> {
        if artist.trim().is_empty() {
            return Ok(None);
        }
        self.gate.wait().await; 
        let value = execute_with_retry(
            self.search_artist(artist)?, &self.retry, "musicbrainz.search_artist"
        ).await?;
        Ok(parse_musicbrainz_artist(&value, artist))
    }
}

/// Builds every provider the configuration enables, in standard priority order. 
/// `musicbrainz` is taken rather than built so the artist lookups made through 
/// the same client share its rate gate. 
pub fn build_providers(cfg: &crate::config::AppConfig, musicbrainz: Arc<MusicBrainzClient>) -> 
    Result<Vec<Arc<dyn ReleaseProvider>>, ResolverError> {
    let mut providers: Vec<Arc<dyn ReleaseProvider>> = Vec::new();

    providers.push(musicbrainz);
    match DiscogsClient::new(&cfg.http, &cfg.identity, &cfg.discogs)? {
        Some(client) => providers.push(Arc::new(client)),
        None => tracing::warn!(provider = "discogs", "provider.disabled.no_token")
    }
    providers.push(Arc::new(AppleMusicClient::new(&cfg.http, &cfg.apple_music)?));
    match LastFmClient::new(&cfg.http, &cfg.lastfm)? {
        Some(client) => providers.push(Arc::new(client)),
        None => tracing::warn!(provider = "lastfm", "provider.disabled.no_api_key")
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn live() -> bool {
        std::env::var("LIVE_HTTP").ok().as_deref() == Some("1")
    } 

    #[test]
    fn musicbrainz_releases_map_to_candidates() {
        let body = json!({
            "releases": [
                {
                    "title": "OK Computer", "date": "1997-05-21", "country": "GB", 
                    "status": "Official",
                    "artist-credit": [{ "name": "Radiohead", "joinphrase": "" }],
                    "release-group": { "primary-type": "Album", "secondary-types": [] }
                },
                {
                    "title": "The Best Of", "date": "2008", "status": "Official",
                    "artist-credit": [{ "name": "Radiohead" }],
                    "release-group": { "primary-type": "Album", "secondary-types": ["Compilation"] }
                },
                { "title": "Undated", "artist-credit": [] }
            ]
        });
        let out = parse_musicbrainz(&body);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].year, "1997");
        assert_eq!(out[0].artist, "Radiohead");
        assert_eq!(out[0].release_type.as_deref(), Some("Album"));
        assert_eq!(out[1].release_type.as_deref(), Some("Compilation"));
        assert!(parse_musicbrainz(&json!({"error": "bad"})).is_empty());
    }

    #[test]
    fn discogs_results_split_artist_and_flag_unofficial() {
        let body = json!({
            "results": [
                { "title": "Radiohead - OK Computer", "year": "1997", "country": "UK", 
                  "format": ["CD", "Album"] },
                { "title": "Radiohead - Live Tapes", "year": 1998, 
                  "format": ["CD", "Unofficial Release"] },
                { "title": "Radiohead - No Year" }
            ]
        });
        let out = parse_discogs(&body);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].artist, "Radiohead");
        assert_eq!(out[0].title, "OK Computer");
        assert_eq!(out[0].release_type.as_deref(), Some("Album"));
        assert_eq!(out[1].year, "1998");
        assert_eq!(out[1].status.as_deref(), Some("Unofficial"));
    }

    #[test]
    fn lastfm_year_falls_back_to_tags() {
        let dated = json!({ "album": { "name": "OK Computer", "artist": "Radiohead", 
            "releasedate": "    21 May 1997, 00:00" } });
        assert_eq!(parse_lastfm(&dated)[0].year, "1997");

        let tagged = json!({ "album": { "name": "OK Computer", "artist": "Radiohead", 
            "tags": { "tag": [ { "name": "alternative" }, { "name": "1997" } ] } } });
        assert_eq!(parse_lastfm(&tagged)[0].year, "1997");

        let bare = json!({ "album": { "name": "OK Computer", "artist": "Radiohead" } });
        assert!(parse_lastfm(&bare).is_empty());
        assert!(parse_lastfm(&json!({ "error": 6, "message": "Album not found" })).is_empty());
    }

    #[test]
    fn apple_music_uses_storefront_country() {
        let body = json!({ "results": [
            { "collectionName": "OK Computer", "artistName": "Radiohead", 
              "releaseDate": "1997-05-21T07:00:00Z", "collectionType": "Album" },
            { "collectionName": "Radiohead: The Best Of", "artistName": "Radiohead", 
              "releaseDate": "2008-06-02T07:00:00Z", "collectionType": "Album" }
        ]});
        let out = parse_apple_music(&body, "gb");
        assert_eq!(out[0].country.as_deref(), Some("GB"));
        assert_eq!(out[0].year, "1997");
        assert_eq!(out[1].release_type.as_deref(), Some("Compilation"));
    }

    #[test]
    fn musicbrainz_artist_life_span() {
        let body = json!({ "artists": [
            { "name": "Ghost Town", "score": 100, "life-span": { "begin": "2011" } },
            { "name": "Ghost", "score": 98, 
              "life-span": { "begin": "2006-03", "end": null, "ended": null } }
        ]});
        assert_eq!(parse_musicbrainz_artist(&body, "GHOST"), Some(ArtistPeriod::new(2006, None)));
        assert_eq!(parse_musicbrainz_artist(&body, "Ghost B.C."), Some(ArtistPeriod::new(2011, None)));

        let weak = json!({ "artists": [ { "name": "Kino Lorber", "score": 60, 
            "life-span": { "begin": "1990", "end": "2000" } } ] });
        assert_eq!(parse_musicbrainz_artist(&weak, "Кино"), None);
        let no_span = json!({ "artists": [ { "name": "Kino", "score": 100 } ] });
        assert_eq!(parse_musicbrainz_artist(&no_span, "Kino"), None);
    }

    #[test]
    fn musicbrainz_provider_is_the_shared_client() -> Result<(), ResolverError> {
        let cfg = crate::config::AppConfig::from_lookup(&|_| None)?;
        let musicbrainz = Arc::new(
            MusicBrainzClient::new(&cfg.http, &cfg.identity, &cfg.musicbrainz)?);
        let providers = build_providers(&cfg, musicbrainz.clone())?;

        let first = Arc::as_ptr(&providers[0]) as *const ();
        assert_eq!(first, Arc::as_ptr(&musicbrainz) as *const ());
        assert_eq!(providers.iter().filter(|p| p.source() == ReleaseSource::MusicBrainz).count(), 1);
        Ok(())
    }

    #[test]
    fn lucene_specials_are_escaped() {
        assert_eq!(lucene_escape("AC/DC: Live!"), "AC\\/DC\\: Live\\!");
    }

    #[tokio::test]
    async fn musicbrainz_client_testbench() -> Result<(), ResolverError> {
        dotenvy::dotenv().ok();

        if !live() {
            eprintln!("Set LIVE_HTTP=1 to run");
            return Ok(())
        }

        let cfgs = crate::config::load_config()?;
        let musicbrainz = MusicBrainzClient::new(&cfgs.http, &cfgs.identity, &cfgs.musicbrainz)?;
        let releases = musicbrainz.get_scored_releases("radiohead", "ok computer", None).await?;
        assert!(releases.iter().any(|r| r.year == "1997"));
        println!("releases: {}", serde_json::to_string_pretty(&releases)?);
        Ok(())
    }
}
