//! Tracing setup for the playback core.
//!
//! The configured level applies to the nexa crates; dependencies stay at
//! `warn` unless `RUST_LOG` overrides the whole filter. Playback-path
//! events attach their correlation fields (`session_id`, `generator_id`,
//! `job_id`, `part_id`) at the call sites; the format here just has to
//! keep them visible, so the JSON output flattens event fields.

use std::sync::Arc;

use tracing_subscriber::{
    fmt,
    fmt::writer::BoxMakeWriter,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

const CORE_CRATES: &[&str] = &["nexa", "nexa_core", "nexa_transcode", "nexa_api"];

/// Install the global subscriber from configuration.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = build_filter(&config.level)?;
    let writer = match &config.file_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            BoxMakeWriter::new(Arc::new(file))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let events = fmt::layer().with_target(true).with_writer(writer);
    let registry = tracing_subscriber::registry().with(filter);

    if config.format.as_str() == "json" {
        registry
            .with(events.json().flatten_event(true).with_current_span(true))
            .init();
    } else {
        registry.with(events.compact()).init();
    }

    Ok(())
}

/// `RUST_LOG` wins outright; otherwise the configured level is scoped to
/// the nexa crates with everything else at `warn`.
fn build_filter(level: &str) -> anyhow::Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let level: tracing::Level = level
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid log level: {level}"))?;

    let mut directives = String::from("warn");
    for krate in CORE_CRATES {
        directives.push_str(&format!(",{krate}={level}"));
    }
    Ok(EnvFilter::new(directives))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_scopes_level_to_core_crates() {
        let filter = build_filter("debug").unwrap();
        let rendered = filter.to_string();
        assert!(rendered.contains("nexa_core=debug"));
        assert!(rendered.contains("nexa_transcode=debug"));
        assert!(rendered.starts_with("warn"));
    }

    #[test]
    fn test_filter_rejects_unknown_level() {
        assert!(build_filter("noisy").is_err());
        assert!(build_filter("trace").is_ok());
        assert!(build_filter("ERROR").is_ok());
    }
}
