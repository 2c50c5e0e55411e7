//! Board endpoint and retry settings.

use facemark_core::config::{env_parse, env_u64};
use facemark_core::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Board address used in the field deployment.
pub const DEFAULT_BOARD_HOST: &str = "172.16.151.175";
/// Default board port. Some firmware builds listen on 8888 instead.
pub const DEFAULT_BOARD_PORT: u16 = 8887;

/// Where and how to reach the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    pub host: String,
    pub port: u16,
    /// Total connection attempts before giving up.
    pub max_retries: u32,
    /// Per-attempt connect timeout, also used as the write timeout.
    pub connect_timeout_ms: u64,
    /// Sleep between failed attempts.
    pub retry_delay_ms: u64,
    /// Pause after each of the three frame writes. Not required by the
    /// protocol; older board firmware reads each part separately.
    pub write_pacing_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_BOARD_HOST.to_string(),
            port: DEFAULT_BOARD_PORT,
            max_retries: 3,
            connect_timeout_ms: 5_000,
            retry_delay_ms: 2_000,
            write_pacing_ms: 50,
        }
    }
}

impl LinkConfig {
    const ENV_HOST: &'static str = "FACEMARK_BOARD_HOST";
    const ENV_PORT: &'static str = "FACEMARK_BOARD_PORT";
    const ENV_RETRIES: &'static str = "FACEMARK_CONNECT_RETRIES";
    const ENV_TIMEOUT_MS: &'static str = "FACEMARK_CONNECT_TIMEOUT_MS";
    const ENV_RETRY_DELAY_MS: &'static str = "FACEMARK_RETRY_DELAY_MS";
    const ENV_PACING_MS: &'static str = "FACEMARK_WRITE_PACING_MS";

    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Apply `FACEMARK_*` overrides on top of `base`.
    pub fn from_env_over(base: Self) -> Result<Self, ConfigError> {
        let config = Self {
            host: std::env::var(Self::ENV_HOST).unwrap_or(base.host),
            port: env_parse(Self::ENV_PORT, base.port)?,
            max_retries: env_parse(Self::ENV_RETRIES, base.max_retries)?,
            connect_timeout_ms: env_u64(Self::ENV_TIMEOUT_MS, base.connect_timeout_ms)?,
            retry_delay_ms: env_u64(Self::ENV_RETRY_DELAY_MS, base.retry_delay_ms)?,
            write_pacing_ms: env_u64(Self::ENV_PACING_MS, base.write_pacing_ms)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the socket layer cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, value: String| ConfigError::InvalidValue {
            key: key.to_string(),
            value,
        };
        if self.host.trim().is_empty() {
            return Err(invalid(Self::ENV_HOST, self.host.clone()));
        }
        if self.port == 0 {
            return Err(invalid(Self::ENV_PORT, self.port.to_string()));
        }
        // A zero timeout is rejected by `TcpStream::connect_timeout`.
        if self.connect_timeout_ms == 0 {
            return Err(invalid(Self::ENV_TIMEOUT_MS, "0".to_string()));
        }
        Ok(())
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_over(Self::default())
    }

    /// `host:port`, for logs.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Attempts actually made; zero retries still means one attempt.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn write_pacing(&self) -> Duration {
        Duration::from_millis(self.write_pacing_ms)
    }

    /// Longest `connect` can block: every attempt times out and every gap
    /// between attempts sleeps.
    pub fn worst_case_connect(&self) -> Duration {
        let n = self.attempts();
        self.connect_timeout() * n + self.retry_delay() * (n - 1)
    }
}
