use facemark_core::{compare, DecisionError, Descriptor, EncoderError, FaceEncoder, Verdict};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("encoder error: {0}")]
    Encoder(#[from] EncoderError),
    #[error("decision error: {0}")]
    Decision(#[from] DecisionError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of a comparison request.
pub struct Comparison {
    pub verdict: Verdict,
    /// Probe descriptor, when a face was found in the probe image.
    pub probe: Option<Descriptor>,
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Compare {
        probe: PathBuf,
        reference: PathBuf,
        threshold: f32,
        reply: oneshot::Sender<Result<Comparison, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Encode both images and decide against `threshold`.
    pub async fn compare(
        &self,
        probe: PathBuf,
        reference: PathBuf,
        threshold: f32,
    ) -> Result<Comparison, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Compare {
                probe,
                reference,
                threshold,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread that owns `encoder`.
///
/// Encoders may shell out or hold model state, so requests are served one
/// at a time in arrival order.
pub fn spawn_engine(mut encoder: Box<dyn FaceEncoder + Send>) -> std::io::Result<EngineHandle> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facemark-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Compare {
                        probe,
                        reference,
                        threshold,
                        reply,
                    } => {
                        let result = run_compare(encoder.as_mut(), &probe, &reference, threshold);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

/// Encode the reference first; a reference without a face makes encoding
/// the probe pointless.
fn run_compare(
    encoder: &mut (dyn FaceEncoder + Send),
    probe: &std::path::Path,
    reference: &std::path::Path,
    threshold: f32,
) -> Result<Comparison, EngineError> {
    let reference_desc = encoder.encode(reference)?;
    let probe_desc = match reference_desc {
        Some(_) => encoder.encode(probe)?,
        None => None,
    };
    let verdict = compare(probe_desc.as_ref(), reference_desc.as_ref(), threshold)?;
    tracing::debug!(?verdict, "comparison finished");
    Ok(Comparison {
        verdict,
        probe: probe_desc,
    })
}
