//! Sender pipeline: image → descriptor → quantize → board.
//!
//! Only image acquisition can fail the run. A missing face or a failing
//! encoder switches to the fallback descriptor, and an unreachable board
//! turns into a simulated success.

use facemark_core::{fallback_descriptor, quantize, Descriptor, FaceEncoder, QuantizedDescriptor};
use facemark_hw::{ImageSource, Snapshot, SourceError};
use facemark_link::{FramedClient, LinkConfig};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("could not acquire image: {0}")]
    Acquire(#[from] SourceError),
}

/// Where the transmitted descriptor came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorOrigin {
    Encoder,
    /// No face was found in the image.
    FallbackNoFace,
    /// The encoder itself failed.
    FallbackEncoderError(String),
}

/// What the user is told.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The board received the frame.
    Delivered,
    /// The board could not be reached or the send failed; attendance is
    /// still reported as marked.
    Simulated { cause: String },
}

/// Everything one run produced.
#[derive(Debug)]
pub struct Report {
    pub event_id: Uuid,
    pub snapshot: Snapshot,
    pub origin: DescriptorOrigin,
    pub quantized: QuantizedDescriptor,
    pub outcome: Outcome,
}

impl Report {
    pub fn summary(&self) -> &'static str {
        match self.outcome {
            Outcome::Delivered => "attendance marked",
            Outcome::Simulated { .. } => "attendance marked (simulated)",
        }
    }
}

pub struct Pipeline {
    source: ImageSource,
    encoder: Box<dyn FaceEncoder + Send>,
    link: LinkConfig,
    /// Where captured and placeholder images are written.
    capture_path: PathBuf,
}

impl Pipeline {
    pub fn new(
        source: ImageSource,
        encoder: Box<dyn FaceEncoder + Send>,
        link: LinkConfig,
        capture_path: PathBuf,
    ) -> Self {
        Self {
            source,
            encoder,
            link,
            capture_path,
        }
    }

    /// Run one attendance event. Blocks for up to the link's worst-case
    /// connect time.
    pub fn run(&mut self) -> Result<Report, PipelineError> {
        let event_id = Uuid::new_v4();
        let span = tracing::info_span!("attendance", %event_id);
        let _guard = span.enter();

        let snapshot = self.source.acquire(&self.capture_path)?;
        let (descriptor, origin) = self.describe(&snapshot);

        let quantized = quantize(&descriptor);
        tracing::info!(?origin, "descriptor quantized");

        let mut client = FramedClient::new(self.link.clone());
        let outcome = match client.deliver(&quantized.to_bytes()) {
            Ok(()) => {
                tracing::info!(endpoint = %self.link.endpoint(), "attendance marked");
                Outcome::Delivered
            }
            Err(e) => {
                tracing::warn!(error = %e, "board unavailable; attendance marked (simulated)");
                Outcome::Simulated {
                    cause: e.to_string(),
                }
            }
        };

        Ok(Report {
            event_id,
            snapshot,
            origin,
            quantized,
            outcome,
        })
    }

    fn describe(&mut self, snapshot: &Snapshot) -> (Descriptor, DescriptorOrigin) {
        let origin = match self.encoder.encode(&snapshot.path) {
            Ok(Some(descriptor)) => return (descriptor, DescriptorOrigin::Encoder),
            Ok(None) => {
                tracing::warn!("no face detected; using fallback descriptor");
                DescriptorOrigin::FallbackNoFace
            }
            Err(e) => {
                tracing::warn!(error = %e, "face encoding failed; using fallback descriptor");
                DescriptorOrigin::FallbackEncoderError(e.to_string())
            }
        };
        (fallback_for(snapshot), origin)
    }
}

/// Seed the fallback from the image bytes so the same image always maps to
/// the same descriptor.
fn fallback_for(snapshot: &Snapshot) -> Descriptor {
    match std::fs::read(&snapshot.path) {
        Ok(bytes) => fallback_descriptor(&bytes),
        Err(e) => {
            tracing::debug!(error = %e, "image unreadable; seeding fallback from path");
            fallback_descriptor(snapshot.path.to_string_lossy().as_bytes())
        }
    }
}
