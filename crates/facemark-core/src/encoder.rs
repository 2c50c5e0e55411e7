//! Boundary to the external face recognition step.
//!
//! Detection and embedding are not done in-process. An encoder takes an image
//! file and returns a descriptor, or `None` when no face was found.

use crate::descriptor::Descriptor;
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("failed to run encoder command '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("encoder command failed ({status}): {stderr}")]
    CommandFailed { status: String, stderr: String },
    #[error("encoder output is not a descriptor: {0}")]
    Invalid(String),
}

/// Turns an image into a face descriptor.
///
/// `Ok(None)` means the image was readable but contained no face.
pub trait FaceEncoder {
    fn encode(&mut self, image: &Path) -> Result<Option<Descriptor>, EncoderError>;
}

impl<F> FaceEncoder for F
where
    F: FnMut(&Path) -> Result<Option<Descriptor>, EncoderError>,
{
    fn encode(&mut self, image: &Path) -> Result<Option<Descriptor>, EncoderError> {
        self(image)
    }
}

/// Runs an external recognition program once per image.
///
/// The image path is appended as the last argument. The program prints a
/// JSON array of 128 floats on stdout, a list of such arrays (the first face
/// is used), or `[]`/`null` when no face is present.
#[derive(Debug, Clone)]
pub struct CommandEncoder {
    program: String,
    args: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EncoderOutput {
    Single(Vec<f32>),
    Many(Vec<Vec<f32>>),
    Nothing(()),
}

impl CommandEncoder {
    const ENV_CMD: &'static str = "FACEMARK_ENCODER_CMD";

    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parse a whitespace-separated command line (`program arg1 arg2`).
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self::new(program, parts.collect()))
    }

    /// Build from `FACEMARK_ENCODER_CMD`, if set.
    pub fn from_env() -> Option<Self> {
        std::env::var(Self::ENV_CMD)
            .ok()
            .and_then(|line| Self::from_command_line(&line))
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn parse_output(stdout: &[u8]) -> Result<Option<Descriptor>, EncoderError> {
        let text = String::from_utf8_lossy(stdout);
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let parsed: EncoderOutput =
            serde_json::from_str(text).map_err(|e| EncoderError::Invalid(e.to_string()))?;
        let values = match parsed {
            EncoderOutput::Single(v) if v.is_empty() => return Ok(None),
            EncoderOutput::Single(v) => v,
            EncoderOutput::Many(faces) => match faces.into_iter().next() {
                Some(first) => first,
                None => return Ok(None),
            },
            EncoderOutput::Nothing(_) => return Ok(None),
        };
        Descriptor::new(values)
            .map(Some)
            .map_err(|e| EncoderError::Invalid(e.to_string()))
    }
}

impl FaceEncoder for CommandEncoder {
    fn encode(&mut self, image: &Path) -> Result<Option<Descriptor>, EncoderError> {
        tracing::debug!(program = %self.program, image = %image.display(), "running encoder");
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(image)
            .output()
            .map_err(|source| EncoderError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(EncoderError::CommandFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let descriptor = Self::parse_output(&output.stdout)?;
        if descriptor.is_none() {
            tracing::info!(image = %image.display(), "encoder found no face");
        }
        Ok(descriptor)
    }
}
