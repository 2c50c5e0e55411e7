use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use facemark_core::{Descriptor, EncoderError, FaceEncoder};
use facemark_hw::ImageSource;
use std::net::TcpListener;
use std::path::{Path, PathBuf};

mod board;
mod config;
mod pipeline;

use config::{FileConfig, Settings};
use pipeline::{DescriptorOrigin, Outcome, Pipeline};

#[derive(Parser)]
#[command(name = "facemark", about = "Face attendance marking CLI")]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Talk to facemarkd on the system bus instead of the session bus
    #[arg(long, global = true)]
    system: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Camera,
    File,
    Synthetic,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a face and send its descriptor to the board
    Mark {
        /// Image source (default from config, else camera)
        #[arg(short, long, value_enum)]
        source: Option<SourceArg>,
        /// Image to use with `--source file`
        #[arg(short, long)]
        image: Option<PathBuf>,
        /// V4L2 device for `--source camera`
        #[arg(short, long)]
        device: Option<String>,
        /// Board host
        #[arg(long)]
        host: Option<String>,
        /// Board port (8887 or 8888 depending on firmware)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Emulate the board: receive frames and log them
    Listen {
        #[arg(short, long, default_value = "0.0.0.0:8887")]
        bind: String,
        /// Exit after this many frames
        #[arg(short = 'n', long)]
        frames: Option<usize>,
    },
    /// Mark attendance through facemarkd against the stored reference
    Attend {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long)]
        image: PathBuf,
    },
    /// Compare an image against a stored reference through facemarkd
    Compare {
        /// Reference identifier (e.g., "cs23i1010")
        #[arg(long)]
        id: String,
        #[arg(long)]
        image: PathBuf,
    },
    /// Show daemon status
    Status,
}

#[zbus::proxy(
    interface = "org.facemark.Attendance1",
    default_service = "org.facemark.Attendance1",
    default_path = "/org/facemark/Attendance1"
)]
trait Attendance {
    async fn mark_attendance(&self, user_name: &str, user_email: &str, image_path: &str) -> zbus::Result<String>;
    async fn compare_image(&self, unique_id: &str, image_path: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };

    match cli.command {
        Commands::Mark {
            source,
            image,
            device,
            host,
            port,
        } => {
            let mut settings = Settings::resolve(file)?;
            if let Some(host) = host {
                settings.link.host = host;
            }
            if let Some(port) = port {
                settings.link.port = port;
            }
            settings.link.validate()?;
            if let Some(kind) = source {
                settings.source = source_from_args(kind, image, device)?;
            }
            run_mark(settings).await?;
        }
        Commands::Listen { bind, frames } => {
            let listener =
                TcpListener::bind(&bind).with_context(|| format!("binding {bind}"))?;
            let received =
                tokio::task::spawn_blocking(move || board::serve(listener, frames)).await??;
            println!("received {} frame(s)", received.len());
        }
        Commands::Attend { name, email, image } => {
            let proxy = daemon_proxy(cli.system).await?;
            let reply = proxy
                .mark_attendance(&name, &email, &absolute(&image)?)
                .await?;
            print_json(&reply);
        }
        Commands::Compare { id, image } => {
            let proxy = daemon_proxy(cli.system).await?;
            let reply = proxy.compare_image(&id, &absolute(&image)?).await?;
            print_json(&reply);
        }
        Commands::Status => match daemon_proxy(cli.system).await {
            Ok(proxy) => print_json(&proxy.status().await?),
            Err(e) => println!("facemarkd: not connected ({e})"),
        },
    }

    Ok(())
}

async fn run_mark(settings: Settings) -> Result<()> {
    let encoder: Box<dyn FaceEncoder + Send> = match settings.encoder {
        Some(enc) => {
            tracing::info!(program = enc.program(), "using external face encoder");
            Box::new(enc)
        }
        None => {
            tracing::warn!("no encoder configured (FACEMARK_ENCODER_CMD); every run uses the fallback descriptor");
            Box::new(|_: &Path| -> Result<Option<Descriptor>, EncoderError> { Ok(None) })
        }
    };

    println!("=== Face Recognition Attendance ===");
    println!("board: {}", settings.link.endpoint());
    println!("source: {:?}", settings.source.kind());
    tracing::debug!(
        lenient = settings.thresholds.lenient,
        strict = settings.thresholds.strict,
        "decision thresholds (applied by facemarkd)"
    );

    let mut pipeline = Pipeline::new(settings.source, encoder, settings.link, settings.capture_path);
    let report = tokio::task::spawn_blocking(move || pipeline.run()).await??;

    match &report.origin {
        DescriptorOrigin::Encoder => println!("[OK] face recognized"),
        DescriptorOrigin::FallbackNoFace => println!("[WARNING] no face detected; sent fallback descriptor"),
        DescriptorOrigin::FallbackEncoderError(e) => {
            println!("[WARNING] face recognition failed ({e}); sent fallback descriptor")
        }
    }
    if let Outcome::Simulated { cause } = &report.outcome {
        println!("[WARNING] board unavailable: {cause}");
    }
    println!("[SUCCESS] {} (event {})", report.summary(), report.event_id);
    Ok(())
}

fn source_from_args(
    kind: SourceArg,
    image: Option<PathBuf>,
    device: Option<String>,
) -> Result<ImageSource> {
    Ok(match kind {
        SourceArg::Camera => ImageSource::Camera {
            device: device.unwrap_or_else(|| "/dev/video0".to_string()),
        },
        SourceArg::File => ImageSource::UploadedFile {
            path: image.context("--source file needs --image")?,
        },
        SourceArg::Synthetic => ImageSource::SyntheticPlaceholder,
    })
}

async fn daemon_proxy(system: bool) -> Result<AttendanceProxy<'static>> {
    let conn = if system {
        zbus::Connection::system().await?
    } else {
        zbus::Connection::session().await?
    };
    Ok(AttendanceProxy::new(&conn).await?)
}

/// The daemon resolves paths in its own working directory.
fn absolute(path: &Path) -> Result<String> {
    let abs = std::fs::canonicalize(path).with_context(|| format!("{}", path.display()))?;
    Ok(abs.to_string_lossy().into_owned())
}

fn print_json(reply: &str) {
    match serde_json::from_str::<serde_json::Value>(reply) {
        Ok(v) => println!("{}", serde_json::to_string_pretty(&v).unwrap_or_else(|_| reply.to_string())),
        Err(_) => println!("{reply}"),
    }
}
