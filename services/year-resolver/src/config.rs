//!
//! src/config.rs  
//!
//! Environment driven configuration for providers, HTTP, concurrency, 
//! search routing, scoring and the year policy 
//!

use std::collections::HashMap;
use std::str::FromStr;
use std::time; 

use url::Url; 

use crate::errors::ResolverError; 
use crate::scoring::ScoringWeights;
use crate::script::ScriptType;
use crate::types::ReleaseSource;

/// Constants for HTTP Config  
pub const HTTP_TIMEOUT: u64 = 8000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 2000;
pub const HTTP_POOL_MAX_IDLE: usize = 16;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

pub const RETRY_MAX_ATTEMPTS: u8 = 3;
pub const RETRY_BASE_BACKOFF: u64 = 250;
pub const RETRY_JITTER: bool = true;
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Constants for provider concurrency 
pub const PROVIDER_CONCURRENCY: usize = 50; 
pub const PROVIDER_CALL_TIMEOUT: u64 = 20000; 
pub const MUSICBRAINZ_MIN_INTERVAL: u64 = 1100; 

/// Constants for the year policy 
pub const DOMINANCE_THRESHOLD: f64 = 0.6; 
pub const SUSPICION_THRESHOLD_YEARS: i32 = 10; 
pub const YEAR_DIFFERENCE_TOLERANCE: i32 = 5; 
pub const MIN_CONFIDENCE_FOR_NEW_YEAR: u32 = 70; 
pub const DEFINITIVE_SCORE: u32 = 85; 
pub const ABSURD_YEAR_FLOOR: i32 = 1970; 
pub const MAX_FUTURE_YEARS: i32 = 1; 
pub const RECHECK_DAYS: u32 = 30; 

/// Source of raw configuration values, `std::env::var` in production 
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Wrapper over lookup to return an invalid enviroment var error
fn env_check(env: Lookup, s: &str) -> Result<String, ResolverError> {
    match env(s) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ResolverError::Config(format!("{s} was not set"))),
    }
}

fn env_optional(env: Lookup, s: &str) -> Option<String> {
    env_check(env, s).ok().map(|v| v.trim().to_string())
}

/// Parsed value or default when unset or malformed 
fn env_parse<T: FromStr>(env: Lookup, s: &str, default: T) -> T {
    match env(s) {
        Some(v) => v.trim().parse::<T>().unwrap_or(default),
        None => default 
    }
}

fn env_list(env: Lookup, s: &str, default: &[&str]) -> Vec<String> {
    match env_optional(env, s) {
        Some(v) => v.split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect(),
        None => default.iter().map(|item| item.to_string()).collect()
    }
}

/// Ensures that url is https 
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

fn ensure_host(url: &Url, expected_host: &str) -> Result<(), String> {
    match url.host_str() {
        Some(h) if h.eq_ignore_ascii_case(expected_host) => Ok(()),
        Some(h) => Err(
            format!("Unexpected host for {url} (got {h}, expected {expected_host})")
        ),
        None => Err(format!("URL missing host: {url}"))
    }
}

/// Parses, validates and normalizes a provider base url 
fn provider_url(env: Lookup, key: &str, default: &str, host: &str) -> 
    Result<Url, ResolverError> {

    let raw = env_optional(env, key).unwrap_or_else(|| default.to_string());
    let mut url = Url::parse(&raw)
        .map_err(|e| ResolverError::Config(format!("{key} invalid {e}")))?;

    ensure_https(&url).map_err(ResolverError::Config)?;
    ensure_host(&url, host).map_err(ResolverError::Config)?;

    // ensure trailing slash
    if !url.path().ends_with('/') {
        let mut path = url.path().to_string();
        path.push('/');
        url.set_path(&path);
    }
    Ok(url)
}

/// Configuration for Identity expected by musicbrainz and discogs 
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv { Dev, Staging, Prod }

impl AppEnv {
    fn parse(s: &str) -> AppEnv {
        match s.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => AppEnv::Prod,
            "staging" => AppEnv::Staging,
            _ => AppEnv::Dev 
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub app_env: AppEnv,
    pub user_agent: String,
}

fn build_identity(env: Lookup) -> IdentityConfig {
    let application = env_optional(env, "APPLICATION")
        .unwrap_or_else(|| format!("year-resolver/{}", env!("CARGO_PKG_VERSION")));
    let header = env_optional(env, "MUSIC_BRAINZ_HEADER")
        .unwrap_or_else(|| "( contact not configured )".to_string());
    let app_env = env_optional(env, "APP_ENV")
        .map(|v| AppEnv::parse(&v))
        .unwrap_or(AppEnv::Dev);

    IdentityConfig { app_env, user_agent: format!("{application} {header}") }
}

/// 
/// Configuration for the canonical discography registry 
///
#[derive(Debug, Clone)]
pub struct MusicBrainzConfig {
    pub base_url: Url,         // https://musicbrainz.org/ws/2/  
    pub search_limit: u32,     // default 10
    pub min_interval: time::Duration 
}

fn build_musicbrainz(env: Lookup) -> Result<MusicBrainzConfig, ResolverError> {
    let base_url = provider_url(
        env, "MB_BASE_URL", "https://musicbrainz.org/ws/2/", "musicbrainz.org")?;

    Ok( MusicBrainzConfig {
        base_url,
        search_limit: env_parse(env, "MB_SEARCH_LIMIT", 10),
        min_interval: time::Duration::from_millis(
            env_parse(env, "MB_MIN_INTERVAL_MS", MUSICBRAINZ_MIN_INTERVAL)
        )
    })
}

/// Configuration for the marketplace release database 
#[derive(Debug, Clone)]
pub struct DiscogsConfig {
    pub base_url: Url, 
    pub token: Option<String>, 
    pub per_page: u32 
}

fn build_discogs(env: Lookup) -> Result<DiscogsConfig, ResolverError> {
    Ok(DiscogsConfig {
        base_url: provider_url(
            env, "DISCOGS_BASE_URL", "https://api.discogs.com/", "api.discogs.com")?,
        token: env_optional(env, "DISCOGS_API_KEY"),
        per_page: env_parse(env, "DISCOGS_PER_PAGE", 10)
    })
}

/// Configuration for the scrobbling service 
#[derive(Debug, Clone)]
pub struct LastFmConfig {
    pub base_url: Url, 
    pub api_key: Option<String>
}

fn build_lastfm(env: Lookup) -> Result<LastFmConfig, ResolverError> {
    Ok(LastFmConfig {
        base_url: provider_url(
            env, "LASTFM_BASE_URL", "https://ws.audioscrobbler.com/2.0/", 
            "ws.audioscrobbler.com")?,
        api_key: env_optional(env, "LASTFM_API_KEY")
    })
}

/// Configuration for the storefront catalog (iTunes search api) 
#[derive(Debug, Clone)]
pub struct AppleMusicConfig {
    pub base_url: Url, 
    pub default_country: String, 
    pub limit: u32 
}

fn build_apple_music(env: Lookup) -> Result<AppleMusicConfig, ResolverError> {
    Ok(AppleMusicConfig {
        base_url: provider_url(
            env, "ITUNES_BASE_URL", "https://itunes.apple.com/", "itunes.apple.com")?,
        default_country: env_optional(env, "ITUNES_COUNTRY")
            .unwrap_or_else(|| "us".to_string()),
        limit: env_parse(env, "ITUNES_LIMIT", 25)
    })
}

/// 
/// Configuration for Http timeouts, retries, etc. 
///
#[derive(Debug, Clone)]
pub struct RetryConfig { 
    pub max_attempts: u8, 
    pub base_backoff: time::Duration, 
    pub jitter: bool, 
    pub retryable_statuses: Vec<u16> 
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RETRY_MAX_ATTEMPTS, 
            base_backoff: time::Duration::from_millis(RETRY_BASE_BACKOFF),
            jitter: RETRY_JITTER, 
            retryable_statuses: RETRYABLE_STATUSES.to_vec()
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration, 
    pub connect_timeout: time::Duration, 
    pub pool_max_idle_per_host: usize, 
    pub pool_idle_timeout: time::Duration, 
    pub max_redirects: u8, 
    pub retry: RetryConfig
} 

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS, 
            retry: RetryConfig::default()
        }
    }
}

fn build_http(env: Lookup) -> HttpConfig {
    let defaults = HttpConfig::default(); 
    HttpConfig {
        timeout: time::Duration::from_millis(env_parse(env, "HTTP_TIMEOUT_MS", HTTP_TIMEOUT)),
        retry: RetryConfig {
            max_attempts: env_parse(env, "HTTP_MAX_RETRY", RETRY_MAX_ATTEMPTS), 
            ..RetryConfig::default()
        },
        ..defaults
    }
}

/// 
/// Limits on outstanding provider calls across the whole engine 
///
#[derive(Debug, Clone)]
pub struct ConcurrencyConfig {
    pub provider_limit: usize, 
    pub call_timeout: time::Duration 
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            provider_limit: PROVIDER_CONCURRENCY, 
            call_timeout: time::Duration::from_millis(PROVIDER_CALL_TIMEOUT)
        }
    }
}

fn build_concurrency(env: Lookup) -> ConcurrencyConfig {
    ConcurrencyConfig {
        provider_limit: env_parse(env, "PROVIDER_CONCURRENCY", PROVIDER_CONCURRENCY).max(1),
        call_timeout: time::Duration::from_millis(
            env_parse(env, "PROVIDER_CALL_TIMEOUT_MS", PROVIDER_CALL_TIMEOUT)
        )
    }
}

/// 
/// Provider routing for queries written in a non-Latin script 
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptPriority {
    pub primary: Vec<ReleaseSource>, 
    pub fallback: Vec<ReleaseSource> 
}

impl Default for ScriptPriority {
    fn default() -> Self {
        Self {
            primary: vec![ReleaseSource::MusicBrainz], 
            fallback: vec![ReleaseSource::LastFm]
        }
    }
}

pub fn default_script_priorities() -> HashMap<ScriptType, ScriptPriority> {
    ScriptType::DETECTED.iter()
        .copied()
        .filter(|s| s.is_non_latin())
        .map(|s| (s, ScriptPriority::default()))
        .collect()
}

fn parse_sources(raw: &str) -> Result<Vec<ReleaseSource>, ResolverError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| ReleaseSource::parse(s)
            .ok_or_else(|| ResolverError::Config(format!("unknown provider {s:?}"))))
        .collect()
}

/// Parses `script=primary,..|fallback,..;script=...` 
pub fn parse_script_priorities(raw: &str) -> 
    Result<HashMap<ScriptType, ScriptPriority>, ResolverError> {

    let mut table = HashMap::new();
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (script, lists) = entry.split_once('=')
            .ok_or_else(|| ResolverError::Config(format!("missing '=' in {entry:?}")))?;
        let script = ScriptType::parse(script)
            .filter(|s| s.is_non_latin())
            .ok_or_else(|| ResolverError::Config(format!("unknown script {script:?}")))?;

        let (primary, fallback) = lists.split_once('|').unwrap_or((lists, ""));
        let primary = parse_sources(primary)?;
        if primary.is_empty() {
            return Err(ResolverError::Config(format!("empty primary list for {script}")));
        }
        table.insert(script, ScriptPriority { primary, fallback: parse_sources(fallback)? });
    }
    if table.is_empty() {
        return Err(ResolverError::Config("empty script priority table".to_string()));
    }
    Ok(table)
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub region: Option<String>, 
    pub preferred_provider: Option<ReleaseSource>, 
    pub standard_order: Vec<ReleaseSource>, 
    pub script_priorities: HashMap<ScriptType, ScriptPriority>
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            region: None, 
            preferred_provider: None, 
            standard_order: ReleaseSource::ALL.to_vec(),
            script_priorities: default_script_priorities()
        }
    }
}

fn build_search(env: Lookup) -> SearchConfig {
    let script_priorities = match env_optional(env, "SCRIPT_PRIORITIES") {
        Some(raw) => parse_script_priorities(&raw).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "config.script_priorities.default");
            default_script_priorities()
        }),
        None => default_script_priorities()
    };

    let standard_order = env_optional(env, "STANDARD_PROVIDERS")
        .and_then(|raw| parse_sources(&raw).ok())
        .filter(|order| !order.is_empty())
        .unwrap_or_else(|| ReleaseSource::ALL.to_vec());

    SearchConfig {
        region: env_optional(env, "SEARCH_REGION").map(|r| r.to_ascii_lowercase()),
        preferred_provider: env_optional(env, "PREFERRED_PROVIDER")
            .and_then(|p| ReleaseSource::parse(&p)),
        standard_order, 
        script_priorities 
    }
}

/// Keyword tables used by the search strategy detector 
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub soundtrack_keywords: Vec<String>, 
    pub various_artists: Vec<String> 
}

const SOUNDTRACK_KEYWORDS: [&str; 6] = [
    "soundtrack", "original score", "motion picture", "music from the", 
    "original cast", "саундтрек"
];

const VARIOUS_ARTISTS: [&str; 6] = [
    "various artists", "various", "va", "v.a.", "сборник", "разные исполнители"
];

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            soundtrack_keywords: SOUNDTRACK_KEYWORDS.iter().map(|k| k.to_string()).collect(),
            various_artists: VARIOUS_ARTISTS.iter().map(|k| k.to_string()).collect()
        }
    }
}

fn build_strategy(env: Lookup) -> StrategyConfig {
    StrategyConfig {
        soundtrack_keywords: env_list(env, "SOUNDTRACK_KEYWORDS", &SOUNDTRACK_KEYWORDS),
        various_artists: env_list(env, "VARIOUS_ARTISTS_NAMES", &VARIOUS_ARTISTS)
    }
}

fn build_scoring(env: Lookup) -> ScoringWeights {
    let d = ScoringWeights::default(); 
    ScoringWeights {
        base: env_parse(env, "SCORE_BASE", d.base),
        artist_exact: env_parse(env, "SCORE_ARTIST_EXACT", d.artist_exact),
        artist_variation: env_parse(env, "SCORE_ARTIST_VARIATION", d.artist_variation),
        artist_unrelated: env_parse(env, "SCORE_ARTIST_UNRELATED", d.artist_unrelated),
        artist_cross_script: env_parse(env, "SCORE_ARTIST_CROSS_SCRIPT", d.artist_cross_script),
        album_exact: env_parse(env, "SCORE_ALBUM_EXACT", d.album_exact),
        album_variation: env_parse(env, "SCORE_ALBUM_VARIATION", d.album_variation),
        album_substring: env_parse(env, "SCORE_ALBUM_SUBSTRING", d.album_substring),
        album_unrelated: env_parse(env, "SCORE_ALBUM_UNRELATED", d.album_unrelated),
        perfect_match: env_parse(env, "SCORE_PERFECT_MATCH", d.perfect_match),
        unofficial_status: env_parse(env, "SCORE_UNOFFICIAL", d.unofficial_status),
        region_match: env_parse(env, "SCORE_REGION_MATCH", d.region_match),
        album_type: env_parse(env, "SCORE_ALBUM_TYPE", d.album_type),
        compilation_type: env_parse(env, "SCORE_COMPILATION_TYPE", d.compilation_type),
        within_period: env_parse(env, "SCORE_WITHIN_PERIOD", d.within_period),
        outside_period: env_parse(env, "SCORE_OUTSIDE_PERIOD", d.outside_period),
        source_musicbrainz: env_parse(env, "SCORE_SOURCE_MUSICBRAINZ", d.source_musicbrainz),
        source_discogs: env_parse(env, "SCORE_SOURCE_DISCOGS", d.source_discogs),
        source_lastfm: env_parse(env, "SCORE_SOURCE_LASTFM", d.source_lastfm),
        source_other: env_parse(env, "SCORE_SOURCE_OTHER", d.source_other),
        similarity_threshold: env_parse(env, "SCORE_SIMILARITY", d.similarity_threshold),
    }
}

/// 
/// Thresholds of the consistency pre-check and the fallback policy 
///
#[derive(Debug, Clone)]
pub struct YearPolicyConfig {
    pub fallback_enabled: bool, 
    pub dominance_threshold: f64, 
    pub suspicion_threshold_years: i32, 
    pub year_difference_tolerance: i32, 
    pub min_confidence_for_new_year: u32, 
    pub definitive_score: u32, 
    pub absurd_year_floor: i32, 
    pub max_future_years: i32, 
    pub recheck_days: u32 
}

impl Default for YearPolicyConfig {
    fn default() -> Self {
        Self {
            fallback_enabled: true, 
            dominance_threshold: DOMINANCE_THRESHOLD, 
            suspicion_threshold_years: SUSPICION_THRESHOLD_YEARS, 
            year_difference_tolerance: YEAR_DIFFERENCE_TOLERANCE, 
            min_confidence_for_new_year: MIN_CONFIDENCE_FOR_NEW_YEAR, 
            definitive_score: DEFINITIVE_SCORE, 
            absurd_year_floor: ABSURD_YEAR_FLOOR, 
            max_future_years: MAX_FUTURE_YEARS, 
            recheck_days: RECHECK_DAYS 
        }
    }
}

fn build_policy(env: Lookup) -> YearPolicyConfig {
    let d = YearPolicyConfig::default(); 
    let dominance = env_parse(env, "DOMINANCE_THRESHOLD", d.dominance_threshold);
    YearPolicyConfig {
        fallback_enabled: env_parse(env, "YEAR_FALLBACK_ENABLED", d.fallback_enabled),
        dominance_threshold: if (0.0..=1.0).contains(&dominance) { 
            dominance 
        } else { 
            d.dominance_threshold 
        },
        suspicion_threshold_years: env_parse(
            env, "SUSPICION_THRESHOLD_YEARS", d.suspicion_threshold_years),
        year_difference_tolerance: env_parse(
            env, "YEAR_DIFFERENCE_TOLERANCE", d.year_difference_tolerance),
        min_confidence_for_new_year: env_parse(
            env, "MIN_CONFIDENCE_NEW_YEAR", d.min_confidence_for_new_year),
        definitive_score: env_parse(env, "DEFINITIVE_SCORE", d.definitive_score),
        absurd_year_floor: env_parse(env, "ABSURD_YEAR_FLOOR", d.absurd_year_floor),
        max_future_years: env_parse(env, "MAX_FUTURE_YEARS", d.max_future_years),
        recheck_days: env_parse(env, "VERIFICATION_RECHECK_DAYS", d.recheck_days)
    }
}

/// 
/// Configuration for the pending verification store 
///
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub pending_db_url: String 
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { pending_db_url: "sqlite://data/pending.db".to_string() }
    }
}

/// 
/// Configuration for Logger 
///

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty, 
    Json
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String, 
    pub format: LogFormat, 
    pub with_ansi: bool, 
    pub include_file_line: bool, 
    pub include_target: bool 
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,year_resolver=debug,reqwest=warn,sqlx=warn".to_string(),
            format: LogFormat::Json,
            with_ansi: true, 
            include_file_line: true, 
            include_target: true 
        }
    }
}

fn build_logging(env: Lookup, identity: &IdentityConfig) -> LoggingConfig {
    let format = match env_optional(env, "LOG_FORMAT").as_deref() {
        Some("pretty") => LogFormat::Pretty,
        Some("json") => LogFormat::Json,
        _ if identity.app_env == AppEnv::Dev => LogFormat::Pretty,
        _ => LogFormat::Json
    };
    LoggingConfig {
        filter_directives: env_optional(env, "LOG_FILTER")
            .unwrap_or_else(|| LoggingConfig::default().filter_directives),
        format, 
        ..LoggingConfig::default()
    }
}

///
/// AppConfig which holds everything the resolver and its providers need 
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub identity: IdentityConfig, 
    pub musicbrainz: MusicBrainzConfig, 
    pub discogs: DiscogsConfig,
    pub lastfm: LastFmConfig, 
    pub apple_music: AppleMusicConfig, 
    pub http: HttpConfig, 
    pub concurrency: ConcurrencyConfig, 
    pub search: SearchConfig, 
    pub strategy: StrategyConfig, 
    pub scoring: ScoringWeights, 
    pub policy: YearPolicyConfig, 
    pub persistence: PersistenceConfig, 
    pub logging: LoggingConfig
}

impl AppConfig {
    pub fn from_lookup(env: Lookup) -> Result<AppConfig, ResolverError> {
        let identity = build_identity(env);
        let logging  = build_logging(env, &identity);
        let persistence = PersistenceConfig {
            pending_db_url: env_optional(env, "PENDING_DB_URL")
                .unwrap_or_else(|| PersistenceConfig::default().pending_db_url)
        };

        Ok( AppConfig {
            musicbrainz: build_musicbrainz(env)?, 
            discogs: build_discogs(env)?, 
            lastfm: build_lastfm(env)?, 
            apple_music: build_apple_music(env)?, 
            http: build_http(env), 
            concurrency: build_concurrency(env), 
            search: build_search(env), 
            strategy: build_strategy(env), 
            scoring: build_scoring(env), 
            policy: build_policy(env), 
            identity, persistence, logging 
        })
    }
}

///
/// Return all environment variables to caller at program start. 
///
pub fn load_config() -> Result<AppConfig, ResolverError> {
    dotenvy::dotenv().ok();
    AppConfig::from_lookup(&|key| std::env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ResolverError> {
        let map: HashMap<String, String> = pairs.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(&|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_environment() -> Result<(), ResolverError> {
        let cfg = config_from(&[])?;

        assert_eq!(cfg.concurrency.provider_limit, 50);
        assert_eq!(cfg.policy.dominance_threshold, 0.6);
        assert_eq!(cfg.policy.absurd_year_floor, 1970);
        assert_eq!(cfg.search.standard_order, ReleaseSource::ALL.to_vec());
        assert!(cfg.discogs.token.is_none());
        assert_eq!(cfg.musicbrainz.base_url.as_str(), "https://musicbrainz.org/ws/2/");
        assert_eq!(cfg.logging.format, LogFormat::Pretty);
        Ok(())
    }

    #[test]
    fn malformed_numbers_fall_back_to_defaults() -> Result<(), ResolverError> {
        let cfg = config_from(&[
            ("DOMINANCE_THRESHOLD", "sixty"), 
            ("SUSPICION_THRESHOLD_YEARS", "12"),
            ("PROVIDER_CONCURRENCY", "0")
        ])?;
        assert_eq!(cfg.policy.dominance_threshold, DOMINANCE_THRESHOLD);
        assert_eq!(cfg.policy.suspicion_threshold_years, 12);
        assert_eq!(cfg.concurrency.provider_limit, 1);
        Ok(())
    }

    #[test]
    fn provider_urls_must_be_https_on_expected_host() {
        let plain_http = config_from(&[("MB_BASE_URL", "http://musicbrainz.org/ws/2")]);
        assert!(matches!(plain_http, Err(ResolverError::Config(_))));

        let wrong_host = config_from(&[("DISCOGS_BASE_URL", "https://evil.example.com/")]);
        assert!(matches!(wrong_host, Err(ResolverError::Config(_))));
    }

    #[test]
    fn trailing_slash_is_added() -> Result<(), ResolverError> {
        let cfg = config_from(&[("MB_BASE_URL", "https://musicbrainz.org/ws/2")])?;
        assert_eq!(cfg.musicbrainz.base_url.path(), "/ws/2/");
        Ok(())
    }

    #[test]
    fn script_priorities_parse() -> Result<(), ResolverError> {
        let table = parse_script_priorities(
            "cyrillic=musicbrainz,discogs|lastfm; japanese=applemusic")?;
        assert_eq!(table[&ScriptType::Cyrillic].primary, 
            vec![ReleaseSource::MusicBrainz, ReleaseSource::Discogs]);
        assert_eq!(table[&ScriptType::Cyrillic].fallback, vec![ReleaseSource::LastFm]);
        assert!(table[&ScriptType::Japanese].fallback.is_empty());
        Ok(())
    }

    #[test]
    fn malformed_script_priorities_use_builtin_defaults() -> Result<(), ResolverError> {
        assert!(parse_script_priorities("klingon=musicbrainz").is_err());
        assert!(parse_script_priorities("cyrillic=napster").is_err());
        assert!(parse_script_priorities("cyrillic").is_err());
        assert!(parse_script_priorities("latin=musicbrainz").is_err());

        let cfg = config_from(&[("SCRIPT_PRIORITIES", "cyrillic=")])?;
        assert_eq!(cfg.search.script_priorities[&ScriptType::Korean], ScriptPriority::default());
        assert_eq!(cfg.search.script_priorities.len(), 9);
        Ok(())
    }

    #[test]
    fn keyword_lists_are_overridable() -> Result<(), ResolverError> {
        let cfg = config_from(&[("VARIOUS_ARTISTS_NAMES", "Sampler, Diverse")])?;
        assert_eq!(cfg.strategy.various_artists, vec!["Sampler", "Diverse"]);
        assert_eq!(cfg.strategy.soundtrack_keywords.len(), SOUNDTRACK_KEYWORDS.len());
        Ok(())
    }
}
