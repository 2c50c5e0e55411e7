use facemark_core::config::{env_flag, env_u64};
use facemark_core::{CommandEncoder, ConfigError, ThresholdPolicy};
use facemark_link::LinkConfig;
use std::path::PathBuf;

/// Which message bus the service registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Session,
    System,
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug)]
pub struct Config {
    /// Directory holding `<unique_id>.jpg` reference images.
    pub reference_dir: PathBuf,
    /// Bus to serve on (default: session).
    pub bus: BusKind,
    /// Forward the probe descriptor to the board on a present verdict.
    pub forward_to_board: bool,
    /// Upper bound in seconds for one engine request.
    pub request_timeout_secs: u64,
    pub thresholds: ThresholdPolicy,
    pub link: LinkConfig,
    /// External recognition command; `None` means every image reports no face.
    pub encoder: Option<CommandEncoder>,
}

impl Config {
    /// Load configuration from `FACEMARKD_*` and `FACEMARK_*` environment
    /// variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let reference_dir = std::env::var("FACEMARKD_REFERENCE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_reference_dir());

        let bus = match std::env::var("FACEMARKD_BUS").as_deref() {
            Ok("system") => BusKind::System,
            Ok("session") | Err(_) => BusKind::Session,
            Ok(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "FACEMARKD_BUS".into(),
                    value: other.to_string(),
                })
            }
        };

        Ok(Self {
            reference_dir,
            bus,
            forward_to_board: env_flag("FACEMARKD_FORWARD_TO_BOARD", false),
            // Daemon-only knob: garbage falls back to the default.
            request_timeout_secs: env_u64("FACEMARKD_REQUEST_TIMEOUT_SECS", 30).unwrap_or(30),
            thresholds: ThresholdPolicy::from_env()?,
            link: LinkConfig::from_env()?,
            encoder: CommandEncoder::from_env(),
        })
    }
}

/// `$XDG_DATA_HOME/facemark/references`, falling back to `~/.local/share`.
fn default_reference_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facemark")
        .join("references")
}
