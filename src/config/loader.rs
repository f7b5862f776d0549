//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{LoopGuardConfig, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};
use crate::forward::loop_guard::BlockedHostnames;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ProxyConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a blocklist file body.
///
/// One hostname per line; blank lines and `#` comments are skipped, and
/// anything from the first `:` on is a description.
///
/// ```text
/// p.requestbite.com: Production proxy
/// 127.0.0.1: Localhost
/// # This is a comment
/// ```
pub fn parse_blocklist(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match line.split_once(':') {
            Some((host, _description)) => host.trim(),
            None => line,
        })
        .filter(|host| !host.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn load_blocklist(path: &Path) -> Result<Vec<String>, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_blocklist(&contents))
}

/// Seed hostnames plus the optional blocklist file.
pub fn resolve_blocked_hostnames(config: &LoopGuardConfig) -> Result<BlockedHostnames, ConfigError> {
    let mut blocked = BlockedHostnames::new(&config.blocked_hostnames);

    if let Some(path) = &config.blocklist_file {
        let extra = load_blocklist(path)?;
        tracing::info!(
            path = %path.display(),
            count = extra.len(),
            "Loaded hostname blocklist"
        );
        blocked.extend(extra);
    }

    Ok(blocked)
}
