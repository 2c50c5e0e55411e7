//! CLI configuration: optional TOML file, then `FACEMARK_*` environment,
//! then command-line flags (applied in `main`).

use anyhow::{Context, Result};
use facemark_core::{CommandEncoder, ThresholdPolicy};
use facemark_hw::ImageSource;
use facemark_link::LinkConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Contents of `facemark.toml`.
///
/// ```toml
/// [board]
/// host = "172.16.151.175"
/// port = 8888
///
/// [thresholds]
/// lenient = 0.6
///
/// [encoder]
/// command = "python3 encode_face.py"
///
/// [source]
/// kind = "camera"
/// device = "/dev/video0"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub board: LinkConfig,
    pub thresholds: ThresholdPolicy,
    pub encoder: EncoderSection,
    pub source: Option<ImageSource>,
    /// Where captured images are written. Default: `photo.jpg`.
    pub capture_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EncoderSection {
    pub command: Option<String>,
}

/// Resolved settings after file and environment layering.
#[derive(Debug)]
pub struct Settings {
    pub link: LinkConfig,
    pub thresholds: ThresholdPolicy,
    pub encoder: Option<CommandEncoder>,
    pub source: ImageSource,
    pub capture_path: PathBuf,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

impl Settings {
    pub fn resolve(file: FileConfig) -> Result<Self> {
        let link = LinkConfig::from_env_over(file.board).context("board settings")?;
        let thresholds = ThresholdPolicy::from_env_over(file.thresholds).context("thresholds")?;
        let encoder = CommandEncoder::from_env().or_else(|| {
            file.encoder
                .command
                .as_deref()
                .and_then(CommandEncoder::from_command_line)
        });
        Ok(Self {
            link,
            thresholds,
            encoder,
            source: file.source.unwrap_or_default(),
            capture_path: file.capture_path.unwrap_or_else(|| PathBuf::from("photo.jpg")),
        })
    }
}
