//! Configuration management.
//!
//! Cache behaviour is driven by a handful of values: the enabled flag, the
//! resolution mode, the similarity threshold, capacity, the fingerprint version
//! tag, and the embedder selection. They come from environment variables,
//! optionally layered over a TOML file.
//!
//! # Environment Variables
//!
//! | Variable | Type | Default | Description |
//! |----------|------|---------|-------------|
//! | `CACHE_ENABLED` | bool | `true` | Enable the cache |
//! | `CACHE_DB_PATH` | path | `./cache/ecotag-cache.sqlite` | `SQLite` file |
//! | `CACHE_SIMILARITY_THRESHOLD` | f32 | `0.9` | Semantic hit threshold, clamped to [0, 1] |
//! | `CACHE_MAX_ENTRIES` | usize | `5000` | Capacity (positive) |
//! | `CACHE_FINGERPRINT_VERSION` | string | `v1` | Vector generation tag |
//! | `CACHE_MODE` | string | `tiered` | `exact`, `semantic` or `tiered` |
//! | `CACHE_SEMANTIC_EMBEDDER` | string | `clip` | `clip` or `fingerprint` |
//! | `CACHE_SEMANTIC_CLIP_MODEL` | string | `Xenova/clip-vit-base-patch32` | Model identifier |
//! | `CACHE_SEMANTIC_FALLBACK` | string | `none` | `none` or `fingerprint` |
//!
//! Values that fail to parse fall back to the default.

use crate::models::CacheMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default `SQLite` location.
pub const DEFAULT_DB_PATH: &str = "./cache/ecotag-cache.sqlite";
/// Default similarity threshold.
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.9;
/// Default capacity.
pub const DEFAULT_MAX_ENTRIES: usize = 5000;
/// Default fingerprint version tag.
pub const DEFAULT_FINGERPRINT_VERSION: &str = "v1";
/// Default visual-embedding model.
pub const DEFAULT_CLIP_MODEL: &str = "Xenova/clip-vit-base-patch32";

/// Primary embedder selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbedderChoice {
    /// External visual-embedding model.
    #[default]
    Clip,
    /// Local perceptual fingerprint.
    Fingerprint,
}

impl EmbedderChoice {
    /// Parses an embedder string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "clip" => Some(Self::Clip),
            "fingerprint" => Some(Self::Fingerprint),
            _ => None,
        }
    }

    /// Returns the choice as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Clip => "clip",
            Self::Fingerprint => "fingerprint",
        }
    }
}

/// Embedder used when the primary model fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackChoice {
    /// Propagate the failure.
    #[default]
    None,
    /// Substitute the perceptual fingerprint.
    Fingerprint,
}

impl FallbackChoice {
    /// Parses a fallback string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Some(Self::None),
            "fingerprint" => Some(Self::Fingerprint),
            _ => None,
        }
    }

    /// Returns the choice as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Fingerprint => "fingerprint",
        }
    }
}

/// Embedder selection, shared with [`crate::embedding::SemanticEmbedder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedderSettings {
    /// Primary embedder.
    pub embedder: EmbedderChoice,
    /// Model identifier for the `clip` embedder.
    pub clip_model: String,
    /// Fallback on primary failure.
    pub fallback: FallbackChoice,
}

impl Default for EmbedderSettings {
    fn default() -> Self {
        Self {
            embedder: EmbedderChoice::default(),
            clip_model: DEFAULT_CLIP_MODEL.to_string(),
            fallback: FallbackChoice::default(),
        }
    }
}

/// Main cache configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Whether lookups and stores do anything.
    pub enabled: bool,
    /// Path to the `SQLite` database.
    pub db_path: PathBuf,
    /// Similarity threshold in [0, 1].
    pub similarity_threshold: f32,
    /// Maximum number of entries kept after any store.
    pub max_entries: usize,
    /// Vector generation tag partitioning the candidate space.
    pub fingerprint_version: String,
    /// Resolution mode.
    pub mode: CacheMode,
    /// Embedder selection.
    pub embedding: EmbedderSettings,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            max_entries: DEFAULT_MAX_ENTRIES,
            fingerprint_version: DEFAULT_FINGERPRINT_VERSION.to_string(),
            mode: CacheMode::default(),
            embedding: EmbedderSettings::default(),
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Cache section.
    pub cache: Option<ConfigFileCache>,
}

/// `[cache]` section in config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileCache {
    /// Enabled flag.
    pub enabled: Option<bool>,
    /// Database path.
    pub db_path: Option<String>,
    /// Similarity threshold.
    pub similarity_threshold: Option<f32>,
    /// Capacity.
    pub max_entries: Option<usize>,
    /// Fingerprint version tag.
    pub fingerprint_version: Option<String>,
    /// Mode name.
    pub mode: Option<String>,
    /// Embedder name.
    pub semantic_embedder: Option<String>,
    /// Model identifier.
    pub semantic_clip_model: Option<String>,
    /// Fallback name.
    pub semantic_fallback: Option<String>,
}

impl CacheConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds configuration from process environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from a variable lookup on top of `self`.
    ///
    /// `lookup` maps a variable name to its raw value; unset or unparseable
    /// values leave the current setting untouched.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(enabled) = lookup("CACHE_ENABLED").and_then(|v| parse_bool(&v)) {
            self.enabled = enabled;
        }
        if let Some(path) = lookup("CACHE_DB_PATH")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        {
            self.db_path = PathBuf::from(path);
        }
        if let Some(threshold) =
            lookup("CACHE_SIMILARITY_THRESHOLD").and_then(|v| parse_threshold(&v))
        {
            self.similarity_threshold = threshold;
        }
        if let Some(max) = lookup("CACHE_MAX_ENTRIES").and_then(|v| parse_positive(&v)) {
            self.max_entries = max;
        }
        if let Some(version) = lookup("CACHE_FINGERPRINT_VERSION")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        {
            self.fingerprint_version = version;
        }
        if let Some(mode) = lookup("CACHE_MODE").and_then(|v| CacheMode::parse(&v)) {
            self.mode = mode;
        }
        if let Some(embedder) =
            lookup("CACHE_SEMANTIC_EMBEDDER").and_then(|v| EmbedderChoice::parse(&v))
        {
            self.embedding.embedder = embedder;
        }
        if let Some(model) = lookup("CACHE_SEMANTIC_CLIP_MODEL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
        {
            self.embedding.clip_model = model;
        }
        if let Some(fallback) =
            lookup("CACHE_SEMANTIC_FALLBACK").and_then(|v| FallbackChoice::parse(&v))
        {
            self.embedding.fallback = fallback;
        }
        self
    }

    /// Loads configuration from a file path, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;

        let file: ConfigFile =
            toml::from_str(&contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file).with_overrides(|key| std::env::var(key).ok()))
    }

    /// Loads configuration from the default location.
    ///
    /// Checks `<platform config dir>/ecotag/config.toml`; environment variables
    /// override whatever is found. Returns env-only configuration if no file
    /// exists or it fails to parse.
    #[must_use]
    pub fn load_default() -> Self {
        if let Some(dirs) = directories::ProjectDirs::from("", "", "ecotag") {
            let path = dirs.config_dir().join("config.toml");
            if path.exists() {
                match Self::load_from_file(&path) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                    },
                }
            }
        }
        Self::from_env()
    }

    /// Converts a `ConfigFile` to `CacheConfig`.
    ///
    /// File values go through the same validation as environment values.
    fn from_config_file(file: ConfigFile) -> Self {
        let Some(cache) = file.cache else {
            return Self::default();
        };

        let values: Vec<(&str, Option<String>)> = vec![
            ("CACHE_ENABLED", cache.enabled.map(|b| b.to_string())),
            ("CACHE_DB_PATH", cache.db_path),
            (
                "CACHE_SIMILARITY_THRESHOLD",
                cache.similarity_threshold.map(|t| t.to_string()),
            ),
            ("CACHE_MAX_ENTRIES", cache.max_entries.map(|m| m.to_string())),
            ("CACHE_FINGERPRINT_VERSION", cache.fingerprint_version),
            ("CACHE_MODE", cache.mode),
            ("CACHE_SEMANTIC_EMBEDDER", cache.semantic_embedder),
            ("CACHE_SEMANTIC_CLIP_MODEL", cache.semantic_clip_model),
            ("CACHE_SEMANTIC_FALLBACK", cache.semantic_fallback),
        ];

        Self::default().with_overrides(|key| {
            values
                .iter()
                .find(|(name, _)| *name == key)
                .and_then(|(_, value)| value.clone())
        })
    }
}

/// Parses a boolean flag (`1/true/yes/on`, `0/false/no/off`).
#[must_use]
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parses a positive integer; zero and negatives are rejected.
#[must_use]
pub fn parse_positive(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok().filter(|n| *n > 0)
}

/// Parses a finite float and clamps it to [0, 1].
#[must_use]
pub fn parse_threshold(value: &str) -> Option<f32> {
    value
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|t| t.is_finite())
        .map(|t| t.clamp(0.0, 1.0))
}
