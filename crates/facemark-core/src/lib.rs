//! facemark-core: Descriptor quantization and similarity decisions.
//!
//! Face detection and embedding happen outside this crate behind the
//! [`FaceEncoder`] trait; everything here works on the resulting 128-value
//! descriptors.

pub mod config;
pub mod decision;
pub mod descriptor;
pub mod encoder;
pub mod fallback;

pub use config::ConfigError;
pub use decision::{compare, decide, distance, DecisionError, MatchResult, Side, ThresholdPolicy, Verdict};
pub use descriptor::{quantize, Descriptor, DescriptorError, QuantizedDescriptor, DESCRIPTOR_DIM};
pub use encoder::{CommandEncoder, EncoderError, FaceEncoder};
pub use fallback::fallback_descriptor;
