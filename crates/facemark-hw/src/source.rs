//! Where the attendance image comes from.
//!
//! The source is chosen once from configuration. There is no runtime
//! fallback from one source to another; a deployment without a camera
//! configures `SyntheticPlaceholder` explicitly.

use crate::camera::{Camera, CameraError};
use crate::frame::FrameError;
use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Placeholder canvas size.
const PLACEHOLDER_WIDTH: u32 = 640;
const PLACEHOLDER_HEIGHT: u32 = 480;
/// Grey block roughly where a face would sit: (200,150) to (440,330).
const PLACEHOLDER_BLOCK: (u32, u32, u32, u32) = (200, 150, 440, 330);
const PLACEHOLDER_GREY: Rgb<u8> = Rgb([100, 100, 100]);

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("camera: {0}")]
    Camera(#[from] CameraError),
    #[error("frame: {0}")]
    Frame(#[from] FrameError),
    #[error("image {}: {source}", path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Which variant produced a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Camera,
    UploadedFile,
    SyntheticPlaceholder,
}

/// An image on disk, ready for the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub kind: SourceKind,
}

/// The image acquisition capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    /// Grab one frame from a V4L2 device.
    Camera { device: String },
    /// Use an image that was already captured elsewhere.
    UploadedFile { path: PathBuf },
    /// Draw a fixed stand-in image.
    SyntheticPlaceholder,
}

impl Default for ImageSource {
    fn default() -> Self {
        ImageSource::Camera {
            device: "/dev/video0".to_string(),
        }
    }
}

impl ImageSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            ImageSource::Camera { .. } => SourceKind::Camera,
            ImageSource::UploadedFile { .. } => SourceKind::UploadedFile,
            ImageSource::SyntheticPlaceholder => SourceKind::SyntheticPlaceholder,
        }
    }

    /// Produce an image file.
    ///
    /// Camera and placeholder images are written to `out` (format from its
    /// extension). An uploaded file is decoded in place and `out` is unused.
    pub fn acquire(&self, out: &Path) -> Result<Snapshot, SourceError> {
        let snapshot = match self {
            ImageSource::Camera { device } => {
                let camera = Camera::open(device)?;
                let frame = camera.capture_frame()?;
                tracing::debug!(seq = frame.sequence, "captured frame");
                let img = frame.into_image()?;
                let (width, height) = img.dimensions();
                save(DynamicImage::ImageLuma8(img), out)?;
                Snapshot {
                    path: out.to_path_buf(),
                    width,
                    height,
                    kind: SourceKind::Camera,
                }
            }
            ImageSource::UploadedFile { path } => {
                let img = image::open(path).map_err(|source| SourceError::Image {
                    path: path.clone(),
                    source,
                })?;
                Snapshot {
                    path: path.clone(),
                    width: img.width(),
                    height: img.height(),
                    kind: SourceKind::UploadedFile,
                }
            }
            ImageSource::SyntheticPlaceholder => {
                let img = placeholder_image();
                let (width, height) = img.dimensions();
                save(DynamicImage::ImageRgb8(img), out)?;
                Snapshot {
                    path: out.to_path_buf(),
                    width,
                    height,
                    kind: SourceKind::SyntheticPlaceholder,
                }
            }
        };
        tracing::info!(
            kind = ?snapshot.kind,
            path = %snapshot.path.display(),
            width = snapshot.width,
            height = snapshot.height,
            "image acquired"
        );
        Ok(snapshot)
    }
}

/// Dark canvas with a grey block in the face region.
pub fn placeholder_image() -> RgbImage {
    let (x0, y0, x1, y1) = PLACEHOLDER_BLOCK;
    RgbImage::from_fn(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, |x, y| {
        if (x0..=x1).contains(&x) && (y0..=y1).contains(&y) {
            PLACEHOLDER_GREY
        } else {
            Rgb([0, 0, 0])
        }
    })
}

fn save(img: DynamicImage, out: &Path) -> Result<(), SourceError> {
    img.save(out).map_err(|source| SourceError::Image {
        path: out.to_path_buf(),
        source,
    })
}
