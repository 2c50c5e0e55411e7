//! One-frame V4L2 capture for attendance snapshots.
//!
//! The attendance flow takes a single still per event, so the device is
//! opened, one buffer is dequeued and the stream is dropped again. Only YUYV
//! and GREY are accepted; both reduce to 8-bit luma.

use crate::frame::{self, Frame};
use std::io;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const SNAPSHOT_WIDTH: u32 = 640;
const SNAPSHOT_HEIGHT: u32 = 480;
/// Mmap buffers queued for the single dequeue.
const STREAM_BUFFERS: u32 = 2;
const EBUSY: i32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no camera at {0}")]
    DeviceNotFound(String),
    #[error("camera is in use by another process")]
    DeviceBusy,
    #[error("snapshot capture failed: {0}")]
    CaptureFailed(String),
    #[error("camera format rejected: {0}")]
    FormatNegotiationFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Luma {
    /// Packed 4:2:2, luma on even bytes.
    Yuyv,
    /// Already 8-bit grayscale.
    Grey,
}

impl Luma {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        match &fourcc.repr {
            b"YUYV" => Some(Luma::Yuyv),
            b"GREY" => Some(Luma::Grey),
            _ => None,
        }
    }

    fn extract(self, buf: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CameraError> {
        let pixels = (width * height) as usize;
        match self {
            Luma::Grey => buf
                .get(..pixels)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| {
                    CameraError::CaptureFailed(format!("short GREY buffer ({} of {pixels} bytes)", buf.len()))
                }),
            Luma::Yuyv => frame::yuyv_to_grayscale(buf, width, height)
                .map_err(|e| CameraError::CaptureFailed(e.to_string())),
        }
    }
}

fn open_error(path: &str, e: io::Error) -> CameraError {
    if e.raw_os_error() == Some(EBUSY) {
        CameraError::DeviceBusy
    } else {
        CameraError::DeviceNotFound(format!("{path} ({e})"))
    }
}

/// A capture device negotiated for snapshots.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    luma: Luma,
}

impl Camera {
    pub fn open(path: &str) -> Result<Self, CameraError> {
        if !Path::new(path).exists() {
            return Err(CameraError::DeviceNotFound(path.to_string()));
        }
        let device = Device::with_path(path).map_err(|e| open_error(path, e))?;

        let mut wanted = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(e.to_string()))?;
        wanted.fourcc = FourCC::new(b"YUYV");
        wanted.width = SNAPSHOT_WIDTH;
        wanted.height = SNAPSHOT_HEIGHT;
        let got = device
            .set_format(&wanted)
            .map_err(|e| CameraError::FormatNegotiationFailed(e.to_string()))?;

        let luma = Luma::from_fourcc(got.fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!("driver offered {}, need YUYV or GREY", got.fourcc))
        })?;

        tracing::info!(device = path, width = got.width, height = got.height, ?luma, "camera ready");
        Ok(Self {
            device,
            width: got.width,
            height: got.height,
            luma,
        })
    }

    /// Dequeue one buffer and reduce it to grayscale.
    pub fn capture_frame(&self) -> Result<Frame, CameraError> {
        let mut stream = MmapStream::with_buffers(&self.device, BufType::VideoCapture, STREAM_BUFFERS)
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        Ok(Frame {
            data: self.luma.extract(buf, self.width, self.height)?,
            width: self.width,
            height: self.height,
            sequence: meta.sequence,
        })
    }
}
