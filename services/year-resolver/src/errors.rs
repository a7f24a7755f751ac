//!
//! src/errors.rs  
//!
//! Defines enums and methods of error conversion 
//! for errors the resolver uses 
//!
//!

use thiserror::Error; 

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("rate limited: retry {0:?}")]
    RateLimited(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("policy violation: {0}")]
    Policy(String),
    #[error("db error: {0}")]
    Db(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error)
}

impl From<reqwest::Error> for ResolverError {
    fn from(e: reqwest::Error) -> Self { 
        if e.is_timeout() {
            ResolverError::Timeout(e.to_string())
        } else {
            ResolverError::Http(e.to_string()) 
        }
    }
}

impl From<serde_json::Error> for ResolverError {
    fn from(e: serde_json::Error) -> Self { ResolverError::Parse(e.to_string()) }
}

impl From<sqlx::Error> for ResolverError {
    fn from(e: sqlx::Error) -> Self { ResolverError::Db(e.to_string()) }
}
