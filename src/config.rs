//! Configuration management for the CFI bridge server

use serde::Deserialize;
use std::env;
use thiserror::Error;

use crate::cfi::Blacklist;

/// Class given to injected marker elements unless configured otherwise
pub const DEFAULT_MARKER_CLASS: &str = "cfi-marker";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Class put on marker elements created by `/cfi/mark`
    pub marker_class: String,
    /// Filters applied to every request, merged with per-request ones
    pub blacklist: Blacklist,
    /// Reject id/text assertion mismatches instead of reporting them
    pub strict_assertions: bool,
    /// Upper bound on posted XHTML documents
    pub max_document_bytes: usize,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            engine: EngineConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            marker_class: DEFAULT_MARKER_CLASS.to_string(),
            blacklist: Blacklist::new().with_class(DEFAULT_MARKER_CLASS),
            strict_assertions: false,
            max_document_bytes: 4 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup, falling back to defaults for
    /// unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let marker_class = lookup("CFI_MARKER_CLASS")
            .filter(|class| !class.trim().is_empty())
            .unwrap_or(defaults.engine.marker_class);

        // The marker class is always blacklisted so marking never shifts CFIs
        let mut blacklist = Blacklist::new().with_class(marker_class.clone());
        let configured = Blacklist {
            classes: list(lookup("CFI_CLASS_BLACKLIST")),
            elements: list(lookup("CFI_ELEMENT_BLACKLIST")),
            ids: list(lookup("CFI_ID_BLACKLIST")),
        };
        blacklist = blacklist.merge(&configured);

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_or("SERVER_PORT", lookup("SERVER_PORT"), defaults.server.port)?,
            },
            engine: EngineConfig {
                marker_class,
                blacklist,
                strict_assertions: parse_bool(
                    "CFI_STRICT_ASSERTIONS",
                    lookup("CFI_STRICT_ASSERTIONS"),
                    defaults.engine.strict_assertions,
                )?,
                max_document_bytes: parse_or(
                    "MAX_DOCUMENT_BYTES",
                    lookup("MAX_DOCUMENT_BYTES"),
                    defaults.engine.max_document_bytes,
                )?,
            },
        })
    }
}

/// Comma-separated list, blanks dropped
fn list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_or<T: std::str::FromStr>(
    key: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}

fn parse_bool(key: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(value) = value else {
        return Ok(default);
    };
    let normalized = value.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue { key, value }),
    }
}
