use crate::engine::{Comparison, EngineError, EngineHandle};
use crate::reference::{reference_path, unique_id};
use chrono::{DateTime, Utc};
use facemark_core::{quantize, Side, ThresholdPolicy, Verdict};
use facemark_link::{FramedClient, LinkConfig};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;
use zbus::interface;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("no reference image for '{0}'")]
    UnknownReference(String),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("image path must be absolute: {0}")]
    RelativePath(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Settings the service needs per request.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub reference_dir: PathBuf,
    pub thresholds: ThresholdPolicy,
    pub link: LinkConfig,
    pub forward_to_board: bool,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Present,
    Absent,
}

/// Reply to `MarkAttendance`.
#[derive(Debug, Clone, Serialize)]
pub struct MarkReply {
    pub success: bool,
    pub message: String,
    pub status: Status,
    pub face_distance: Option<f32>,
    pub threshold: f32,
    #[serde(rename = "match")]
    pub is_match: bool,
    pub unique_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl MarkReply {
    fn failed(message: impl Into<String>, unique_id: Option<String>, threshold: f32) -> Self {
        Self {
            success: false,
            message: message.into(),
            status: Status::Absent,
            face_distance: None,
            threshold,
            is_match: false,
            unique_id,
            timestamp: Utc::now(),
        }
    }
}

/// Reply to `CompareImage`.
#[derive(Debug, Clone, Serialize)]
pub struct CompareReply {
    #[serde(rename = "match")]
    pub is_match: bool,
    pub distance: Option<f32>,
}

/// D-Bus interface for the attendance comparison service.
///
/// Bus name: org.facemark.Attendance1
/// Object path: /org/facemark/Attendance1
pub struct AttendanceService {
    engine: EngineHandle,
    settings: ServiceSettings,
}

impl AttendanceService {
    pub fn new(engine: EngineHandle, settings: ServiceSettings) -> Self {
        Self { engine, settings }
    }

    async fn compare_with(
        &self,
        probe: PathBuf,
        reference: PathBuf,
        threshold: f32,
    ) -> Result<Comparison, ServiceError> {
        let timeout = self.settings.request_timeout;
        tokio::time::timeout(timeout, self.engine.compare(probe, reference, threshold))
            .await
            .map_err(|_| ServiceError::Timeout(timeout.as_secs()))?
            .map_err(ServiceError::from)
    }

    fn require_absolute(image_path: &str) -> Result<PathBuf, ServiceError> {
        let path = PathBuf::from(image_path);
        if path.is_absolute() {
            Ok(path)
        } else {
            Err(ServiceError::RelativePath(image_path.to_string()))
        }
    }

    fn reference_for(&self, id: &str) -> Result<PathBuf, ServiceError> {
        reference_path(&self.settings.reference_dir, id)
            .filter(|p| p.is_file())
            .ok_or_else(|| ServiceError::UnknownReference(id.to_string()))
    }

    pub async fn handle_mark(&self, user_name: &str, user_email: &str, image_path: &str) -> MarkReply {
        let event_id = Uuid::new_v4();
        let threshold = self.settings.thresholds.lenient;

        let Some(id) = unique_id(user_name, user_email) else {
            return MarkReply::failed("user name or email is required", None, threshold);
        };
        tracing::info!(%event_id, unique_id = %id, "mark attendance requested");

        let probe = match Self::require_absolute(image_path) {
            Ok(p) => p,
            Err(e) => return MarkReply::failed(e.to_string(), Some(id), threshold),
        };

        let reference = match self.reference_for(&id) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(%event_id, error = %e, "attendance rejected");
                return MarkReply::failed(e.to_string(), Some(id), threshold);
            }
        };

        let comparison = match self.compare_with(probe, reference, threshold).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(%event_id, error = %e, "comparison failed");
                return MarkReply::failed(e.to_string(), Some(id), threshold);
            }
        };

        let result = match comparison.verdict {
            Verdict::NoFaceDetected { side } => {
                let which = match side {
                    Side::Probe => "captured",
                    Side::Reference => "reference",
                };
                tracing::info!(%event_id, ?side, "no face detected");
                return MarkReply::failed(
                    format!("no face detected in {which} image"),
                    Some(id),
                    threshold,
                );
            }
            Verdict::Compared(r) => r,
        };

        tracing::info!(
            %event_id,
            distance = result.distance,
            threshold,
            is_match = result.is_match,
            "attendance decided"
        );

        if result.is_match && self.settings.forward_to_board {
            if let Some(probe) = comparison.probe {
                self.forward(event_id, quantize(&probe).to_bytes()).await;
            }
        }

        MarkReply {
            success: true,
            message: if result.is_match {
                "attendance marked".into()
            } else {
                "face did not match the reference".into()
            },
            status: if result.is_match {
                Status::Present
            } else {
                Status::Absent
            },
            face_distance: Some(result.distance),
            threshold,
            is_match: result.is_match,
            unique_id: Some(id),
            timestamp: Utc::now(),
        }
    }

    /// Deliver on a fresh connection; an unreachable board is only logged.
    ///
    /// The reply waits at most `request_timeout`. A session still connecting
    /// after that keeps running in the blocking pool and only logs.
    async fn forward(&self, event_id: Uuid, payload: [u8; 128]) {
        let link = self.settings.link.clone();
        let timeout = self.settings.request_timeout;
        let task = tokio::task::spawn_blocking(move || {
            let sent = FramedClient::new(link).deliver(&payload);
            if let Err(e) = &sent {
                tracing::warn!(%event_id, error = %e, "board unavailable; attendance marked (simulated)");
            }
            sent
        });
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(()))) => tracing::info!(%event_id, "descriptor forwarded to board"),
            Ok(Ok(Err(_))) => {}
            Ok(Err(e)) => tracing::error!(%event_id, error = %e, "forwarding task failed"),
            Err(_) => tracing::warn!(
                %event_id,
                timeout_secs = timeout.as_secs(),
                "board still connecting; replying without waiting"
            ),
        }
    }

    pub async fn handle_compare(&self, id: &str, image_path: &str) -> Result<CompareReply, ServiceError> {
        let probe = Self::require_absolute(image_path)?;
        let reference = self.reference_for(&id.to_lowercase())?;
        let comparison = self
            .compare_with(probe, reference, self.settings.thresholds.strict)
            .await?;
        Ok(match comparison.verdict {
            Verdict::NoFaceDetected { .. } => CompareReply {
                is_match: false,
                distance: None,
            },
            Verdict::Compared(r) => CompareReply {
                is_match: r.is_match,
                distance: Some(r.distance),
            },
        })
    }

    pub fn status_json(&self) -> serde_json::Value {
        serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "reference_dir": self.settings.reference_dir.display().to_string(),
            "thresholds": self.settings.thresholds,
            "board": self.settings.link.endpoint(),
            "forward_to_board": self.settings.forward_to_board,
        })
    }
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.facemark.Attendance1")]
impl AttendanceService {
    /// Compare an image against the user's reference and mark attendance.
    async fn mark_attendance(
        &self,
        user_name: &str,
        user_email: &str,
        image_path: &str,
    ) -> zbus::fdo::Result<String> {
        to_json(&self.handle_mark(user_name, user_email, image_path).await)
    }

    /// Compare an image against a stored reference with the strict threshold.
    async fn compare_image(&self, unique_id: &str, image_path: &str) -> zbus::fdo::Result<String> {
        let reply = self
            .handle_compare(unique_id, image_path)
            .await
            .map_err(|e| match e {
                ServiceError::RelativePath(_) => zbus::fdo::Error::InvalidArgs(e.to_string()),
                _ => zbus::fdo::Error::Failed(e.to_string()),
            })?;
        to_json(&reply)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(self.status_json().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use facemark_core::{Descriptor, EncoderError};
    use facemark_link::FrameReader;
    use std::net::TcpListener;
    use std::path::Path;

    /// One float per file, splatted to 128 values; an empty file has no face.
    fn file_encoder(image: &Path) -> Result<Option<Descriptor>, EncoderError> {
        let text = std::fs::read_to_string(image).map_err(|e| EncoderError::Invalid(e.to_string()))?;
        match text.trim() {
            "" => Ok(None),
            t => t
                .parse()
                .map(|v| Some(Descriptor::splat(v)))
                .map_err(|_| EncoderError::Invalid(t.to_string())),
        }
    }

    fn service(dir: &Path, link: LinkConfig, forward: bool) -> AttendanceService {
        service_with_timeout(dir, link, forward, Duration::from_secs(5))
    }

    fn service_with_timeout(
        dir: &Path,
        link: LinkConfig,
        forward: bool,
        request_timeout: Duration,
    ) -> AttendanceService {
        let engine = spawn_engine(Box::new(file_encoder)).unwrap();
        AttendanceService::new(
            engine,
            ServiceSettings {
                reference_dir: dir.to_path_buf(),
                thresholds: ThresholdPolicy::default(),
                link,
                forward_to_board: forward,
                request_timeout,
            },
        )
    }

    fn fixture(dir: &Path, reference: &str, probe: &str) -> String {
        std::fs::write(dir.join("cs23i1010.jpg"), reference).unwrap();
        let probe_path = dir.join("probe.jpg");
        std::fs::write(&probe_path, probe).unwrap();
        probe_path.to_string_lossy().into_owned()
    }

    fn link_to(port: u16) -> LinkConfig {
        LinkConfig {
            host: "127.0.0.1".into(),
            port,
            max_retries: 1,
            connect_timeout_ms: 500,
            retry_delay_ms: 0,
            write_pacing_ms: 0,
        }
    }

    fn closed_port() -> u16 {
        TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_mark_present() {
        let dir = tempfile::tempdir().unwrap();
        let probe = fixture(dir.path(), "0.10", "0.12");
        let svc = service(dir.path(), link_to(closed_port()), false);

        let reply = svc.handle_mark("CS23I1010 Asha", "", &probe).await;
        assert!(reply.success);
        assert!(reply.is_match);
        assert_eq!(reply.unique_id.as_deref(), Some("cs23i1010"));
        assert_eq!(reply.threshold, 0.6);

        let json: serde_json::Value = serde_json::from_str(&to_json(&reply).unwrap()).unwrap();
        assert_eq!(json["status"], "present");
        assert_eq!(json["match"], true);
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_mark_absent_on_distance() {
        let dir = tempfile::tempdir().unwrap();
        let probe = fixture(dir.path(), "0.0", "0.1");
        let svc = service(dir.path(), link_to(closed_port()), false);

        let reply = svc.handle_mark("", "cs23i1010@example.edu", &probe).await;
        assert!(reply.success);
        assert!(!reply.is_match);
        assert!(matches!(reply.status, Status::Absent));
        assert!(reply.face_distance.unwrap() > 0.6);
    }

    #[tokio::test]
    async fn test_mark_missing_reference() {
        let dir = tempfile::tempdir().unwrap();
        let probe = fixture(dir.path(), "0.1", "0.1");
        let svc = service(dir.path(), link_to(closed_port()), false);

        let reply = svc.handle_mark("someone", "", &probe).await;
        assert!(!reply.success);
        assert!(matches!(reply.status, Status::Absent));
        assert!(reply.message.contains("someone"));
    }

    #[tokio::test]
    async fn test_mark_no_face_in_probe() {
        let dir = tempfile::tempdir().unwrap();
        let probe = fixture(dir.path(), "0.1", "");
        let svc = service(dir.path(), link_to(closed_port()), false);

        let reply = svc.handle_mark("cs23i1010", "", &probe).await;
        assert!(!reply.success);
        assert_eq!(reply.message, "no face detected in captured image");
        assert!(reply.face_distance.is_none());
    }

    #[tokio::test]
    async fn test_mark_requires_identity() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), link_to(closed_port()), false);
        let reply = svc.handle_mark(" ", "", "/nowhere.jpg").await;
        assert!(!reply.success);
        assert!(reply.unique_id.is_none());
    }

    #[tokio::test]
    async fn test_present_verdict_is_forwarded() {
        let dir = tempfile::tempdir().unwrap();
        let probe = fixture(dir.path(), "0.5", "0.5");
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let board = std::thread::spawn(move || {
            let (sock, _) = listener.accept().unwrap();
            FrameReader::new(sock).read_frame().unwrap()
        });
        let svc = service(dir.path(), link_to(port), true);

        let reply = svc.handle_mark("cs23i1010", "", &probe).await;
        assert!(reply.is_match);
        assert_eq!(board.join().unwrap(), Some([64u8; 128]));
    }

    #[tokio::test]
    async fn test_unreachable_board_still_marks() {
        let dir = tempfile::tempdir().unwrap();
        let probe = fixture(dir.path(), "0.5", "0.5");
        let svc = service(dir.path(), link_to(closed_port()), true);

        let reply = svc.handle_mark("cs23i1010", "", &probe).await;
        assert!(reply.success);
        assert!(matches!(reply.status, Status::Present));
    }

    #[tokio::test]
    async fn test_compare_uses_strict_threshold() {
        let dir = tempfile::tempdir().unwrap();
        // distance = sqrt(128) * 0.05 ≈ 0.566: matches at 0.6, not at 0.5
        let probe = fixture(dir.path(), "0.0", "0.05");
        let svc = service(dir.path(), link_to(closed_port()), false);

        let reply = svc.handle_compare("CS23I1010", &probe).await.unwrap();
        assert!(!reply.is_match);
        assert!((reply.distance.unwrap() - 0.5657).abs() < 1e-3);

        let marked = svc.handle_mark("cs23i1010", "", &probe).await;
        assert!(marked.is_match);
    }

    #[tokio::test]
    async fn test_compare_unknown_reference() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), link_to(closed_port()), false);
        let err = svc.handle_compare("nobody", "/tmp/x.jpg").await.err().unwrap();
        assert!(matches!(err, ServiceError::UnknownReference(ref id) if id == "nobody"));
    }

    #[tokio::test]
    async fn test_slow_board_does_not_hold_the_reply() {
        let dir = tempfile::tempdir().unwrap();
        let probe = fixture(dir.path(), "0.5", "0.5");
        // Non-routable: each attempt runs to its connect timeout.
        let link = LinkConfig {
            host: "10.255.255.1".into(),
            port: 8887,
            max_retries: 1,
            connect_timeout_ms: 1_500,
            retry_delay_ms: 0,
            write_pacing_ms: 0,
        };
        let svc = service_with_timeout(dir.path(), link, true, Duration::from_millis(300));

        let start = std::time::Instant::now();
        let reply = svc.handle_mark("cs23i1010", "", &probe).await;
        assert!(reply.success);
        assert!(matches!(reply.status, Status::Present));
        assert!(start.elapsed() < Duration::from_millis(1_200), "{:?}", start.elapsed());
    }

    #[tokio::test]
    async fn test_relative_image_path_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fixture(dir.path(), "0.1", "0.1");
        let svc = service(dir.path(), link_to(closed_port()), false);

        let reply = svc.handle_mark("cs23i1010", "", "probe.jpg").await;
        assert!(!reply.success);
        assert!(reply.message.contains("must be absolute"));

        let err = svc.handle_compare("cs23i1010", "probe.jpg").await.err().unwrap();
        assert!(matches!(err, ServiceError::RelativePath(ref p) if p == "probe.jpg"));
    }

    #[tokio::test]
    async fn test_status_json() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path(), link_to(8887), false);
        let status = svc.status_json();
        assert_eq!(status["board"], "127.0.0.1:8887");
        assert_eq!(status["forward_to_board"], false);
    }
}
