//! Structured logging configuration.

use std::path::PathBuf;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directives.
    pub filter: String,
    /// Output format.
    pub format: LogFormat,
    /// Optional log file (appended); stderr otherwise.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
            format: LogFormat::Pretty,
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from the process environment.
    ///
    /// Reads `RUST_LOG`, `ECOTAG_LOG_FORMAT` and `ECOTAG_LOG_FILE`.
    #[must_use]
    pub fn from_env(verbose: bool) -> Self {
        Self::from_lookup(verbose, |key| std::env::var(key).ok())
    }

    /// Builds logging configuration from an arbitrary variable lookup.
    ///
    /// `RUST_LOG` wins over `verbose`, which raises the default to `debug`.
    #[must_use]
    pub fn from_lookup(verbose: bool, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let filter = non_empty("RUST_LOG")
            .unwrap_or_else(|| if verbose { "debug" } else { "warn" }.to_string());
        let format = non_empty("ECOTAG_LOG_FORMAT")
            .and_then(|v| LogFormat::parse(&v))
            .unwrap_or_default();
        let file = non_empty("ECOTAG_LOG_FILE").map(PathBuf::from);

        Self {
            filter,
            format,
            file,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LoggingConfig::from_lookup(false, lookup(&[]));
        assert_eq!(config, LoggingConfig::default());
    }

    #[test]
    fn test_verbose_raises_level() {
        let config = LoggingConfig::from_lookup(true, lookup(&[]));
        assert_eq!(config.filter, "debug");
    }

    #[test]
    fn test_rust_log_wins() {
        let config = LoggingConfig::from_lookup(true, lookup(&[("RUST_LOG", "ecotag_cache=trace")]));
        assert_eq!(config.filter, "ecotag_cache=trace");
    }

    #[test]
    fn test_format_and_file() {
        let config = LoggingConfig::from_lookup(
            false,
            lookup(&[("ECOTAG_LOG_FORMAT", "JSON"), ("ECOTAG_LOG_FILE", "/tmp/ecotag.log")]),
        );
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.file, Some(PathBuf::from("/tmp/ecotag.log")));

        let fallback = LoggingConfig::from_lookup(false, lookup(&[("ECOTAG_LOG_FORMAT", "xml")]));
        assert_eq!(fallback.format, LogFormat::Pretty);
    }
}
