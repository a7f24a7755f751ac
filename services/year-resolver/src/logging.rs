//! 
//! src/logging.rs  
//!
//! Installs the global subscriber: env filter, JSON or pretty output on a 
//! non-blocking stdout writer, and span traces for errors 
//!

use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tracing_error::ErrorLayer; 
use tracing_appender::non_blocking; 

use crate::config::{LogFormat, LoggingConfig};
use crate::errors::ResolverError;

/// Dropping the guard flushes and stops the writer thread 
pub struct LoggingGuard(tracing_appender::non_blocking::WorkerGuard);

/// `RUST_LOG` wins over the configured directives 
fn build_filter(cfg: &LoggingConfig) -> Result<EnvFilter, ResolverError> {
    let directives = std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| cfg.filter_directives.clone());
    EnvFilter::try_new(&directives)
        .map_err(|e| ResolverError::Config(format!("log filter {directives:?}: {e}")))
}

pub fn init_logging(cfg: &LoggingConfig) -> Result<LoggingGuard, ResolverError> {
    let (writer, guard) = non_blocking(std::io::stdout());
    let filter = build_filter(cfg)?;
    let time = fmt::time::UtcTime::rfc_3339();

    let json_layer = (cfg.format == LogFormat::Json).then(|| fmt::layer()
        .with_writer(writer.clone())
        .with_timer(time.clone())
        .with_target(cfg.include_target)
        .with_file(cfg.include_file_line)
        .with_line_number(cfg.include_file_line)
        .json()
        .flatten_event(true)
        .with_current_span(true)
        .with_span_list(true));

    let pretty_layer = (cfg.format == LogFormat::Pretty).then(|| fmt::layer()
        .with_writer(writer)
        .with_timer(time)
        .with_ansi(cfg.with_ansi)
        .with_target(cfg.include_target)
        .with_file(cfg.include_file_line)
        .with_line_number(cfg.include_file_line)
        .pretty());

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer)
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|e| ResolverError::Config(format!("logging already initialised: {e}")))?;

    Ok( LoggingGuard(guard) )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_directives_are_a_config_error() {
        if std::env::var("RUST_LOG").is_ok() {
            return; 
        }
        let cfg = LoggingConfig { filter_directives: "info,year_resolver=loud".to_string(), ..Default::default() };
        assert!(matches!(build_filter(&cfg), Err(ResolverError::Config(_))));
        assert!(build_filter(&LoggingConfig::default()).is_ok());
    }
}
