//! Environment variable helpers shared by the facemark crates.

use thiserror::Error;

/// Errors raised while reading `FACEMARK_*` configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Value could not be parsed into the expected type.
    #[error("failed to parse {key}='{value}'")]
    Unparsable { key: String, value: String },

    /// Value parsed but is outside the accepted range.
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Read `key` and parse it, returning `default` when the variable is unset.
///
/// A set-but-unparsable value is an error rather than a silent fallback.
pub fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Unparsable {
            key: key.to_string(),
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}

pub fn env_f32(key: &str, default: f32) -> Result<f32, ConfigError> {
    env_parse(key, default)
}

pub fn env_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    env_parse(key, default)
}

/// Read a boolean flag; anything other than `0`, `false` or `no` is true.
pub fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
        .unwrap_or(default)
}
