//! facemark-hw: Image acquisition for the attendance pipeline.
//!
//! Provides V4L2 single-frame capture, uploaded-file validation and a
//! synthetic placeholder, all behind one [`ImageSource`] selected from
//! configuration.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError};
pub use frame::Frame;
pub use source::{placeholder_image, ImageSource, Snapshot, SourceError, SourceKind};
