use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::client::DEFAULT_EXCHANGE_RATE_URL;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExporterConfig {
    #[serde(default = "default_opencost_url")]
    pub opencost_url: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// OpenCost query window, passed through verbatim (e.g. "2d", "7d")
    #[serde(default = "default_window")]
    pub window: String,
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: String,
    #[serde(default = "default_max_stale")]
    pub max_stale: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
    #[serde(default)]
    pub emit_kube_percent_metrics: bool,
    #[serde(default = "default_currency_symbols")]
    pub currency_symbols: Vec<String>,
    #[serde(default = "default_exchange_rate_url")]
    pub exchange_rate_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_opencost_url() -> String {
    "http://opencost.opencost:9003".to_string()
}
fn default_port() -> u16 {
    9100
}
fn default_window() -> String {
    "2d".to_string()
}
fn default_cache_ttl() -> String {
    "1h".to_string()
}
fn default_max_stale() -> String {
    "6h".to_string()
}
fn default_max_retries() -> u32 {
    3
}
fn default_request_timeout() -> String {
    "30s".to_string()
}
fn default_currency_symbols() -> Vec<String> {
    vec!["CNY".to_string(), "EUR".to_string()]
}
fn default_exchange_rate_url() -> String {
    DEFAULT_EXCHANGE_RATE_URL.to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            opencost_url: default_opencost_url(),
            port: default_port(),
            window: default_window(),
            cache_ttl: default_cache_ttl(),
            max_stale: default_max_stale(),
            max_retries: default_max_retries(),
            request_timeout: default_request_timeout(),
            emit_kube_percent_metrics: false,
            currency_symbols: default_currency_symbols(),
            exchange_rate_url: default_exchange_rate_url(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl ExporterConfig {
    /// Get the config file path, respecting XDG_CONFIG_HOME
    pub fn config_path() -> PathBuf {
        let config_dir = std::env::var("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("~"))
                    .join(".config")
            });
        config_dir.join("cloudcost-exporter").join("config.toml")
    }

    /// Load config from `path`, or from the default path when none is given.
    /// A missing default file yields defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = Self::config_path();
                if !p.exists() {
                    return Ok(Self::default());
                }
                p
            }
        };
        let content = std::fs::read_to_string(&path)?;
        let config: ExporterConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Serialize and write this config to `path`.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn cache_ttl(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.cache_ttl)
    }

    pub fn max_stale(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.max_stale)
    }

    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.request_timeout)
    }

    /// Validate the config
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();
        for (name, url) in [
            ("opencost_url", &self.opencost_url),
            ("exchange_rate_url", &self.exchange_rate_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                issues.push(format!("Invalid {}: '{}' (must be http or https)", name, url));
            }
        }
        if self.window.trim().is_empty() {
            issues.push("window must not be empty".to_string());
        }
        match self.cache_ttl() {
            Ok(ttl) if ttl.is_zero() => issues.push("cache_ttl must be greater than zero".to_string()),
            Ok(_) => {}
            Err(e) => issues.push(format!("cache_ttl: {}", e)),
        }
        if let Err(e) = self.max_stale() {
            issues.push(format!("max_stale: {}", e));
        }
        match self.request_timeout() {
            Ok(t) if t.is_zero() => {
                issues.push("request_timeout must be greater than zero".to_string())
            }
            Ok(_) => {}
            Err(e) => issues.push(format!("request_timeout: {}", e)),
        }
        for symbol in &self.currency_symbols {
            if symbol.len() != 3 || !symbol.chars().all(|c| c.is_ascii_uppercase()) {
                issues.push(format!(
                    "Invalid currency symbol: '{}' (must be a 3-letter ISO code)",
                    symbol
                ));
            }
        }
        if !["debug", "info", "warn", "error", "trace"].contains(&self.log_level.as_str()) {
            issues.push(format!(
                "Invalid log_level: '{}' (must be debug|info|warn|error)",
                self.log_level
            ));
        }
        if !["json", "text"].contains(&self.log_format.as_str()) {
            issues.push(format!(
                "Invalid log_format: '{}' (must be 'json' or 'text')",
                self.log_format
            ));
        }
        issues
    }
}

/// Split a comma-separated currency list, dropping blanks.
pub fn parse_symbols(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a Go-style duration such as "90s", "1h30m", "1.5h" or "250ms".
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::InvalidDuration(input.to_string());
    let s = input.trim();
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut seconds = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        if num_end == 0 {
            return Err(invalid());
        }
        let value: f64 = rest[..num_end].parse().map_err(|_| invalid())?;
        rest = &rest[num_end..];

        let unit_end = rest.find(is_number).unwrap_or(rest.len());
        let scale = match &rest[..unit_end] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return Err(invalid()),
        };
        seconds += value * scale;
        rest = &rest[unit_end..];
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| invalid())
}
