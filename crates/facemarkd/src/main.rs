use anyhow::{Context, Result};
use facemark_core::{Descriptor, EncoderError, FaceEncoder};
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;
mod reference;

use config::{BusKind, Config};
use dbus_interface::{AttendanceService, ServiceSettings};

const BUS_NAME: &str = "org.facemark.Attendance1";
const OBJECT_PATH: &str = "/org/facemark/Attendance1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facemarkd starting");

    let config = Config::from_env().context("loading configuration")?;
    tracing::info!(
        reference_dir = %config.reference_dir.display(),
        lenient = config.thresholds.lenient,
        strict = config.thresholds.strict,
        board = %config.link.endpoint(),
        forward_to_board = config.forward_to_board,
        "configuration loaded"
    );

    let encoder: Box<dyn FaceEncoder + Send> = match config.encoder {
        Some(enc) => {
            tracing::info!(program = enc.program(), "using external face encoder");
            Box::new(enc)
        }
        None => {
            tracing::warn!("FACEMARK_ENCODER_CMD not set; every image will report no face");
            Box::new(|_: &Path| -> Result<Option<Descriptor>, EncoderError> { Ok(None) })
        }
    };
    let engine = engine::spawn_engine(encoder).context("spawning engine thread")?;

    let service = AttendanceService::new(
        engine,
        ServiceSettings {
            reference_dir: config.reference_dir,
            thresholds: config.thresholds,
            link: config.link,
            forward_to_board: config.forward_to_board,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        },
    );

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("registering on D-Bus")?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "facemarkd ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facemarkd shutting down");

    Ok(())
}
