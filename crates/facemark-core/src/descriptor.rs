//! Face descriptors and their signed 8-bit quantized form.
//!
//! The quantized form is the numeric contract with the board: 128 `i8`
//! values, one per dimension, in descriptor order. A receiver decodes the
//! payload without metadata by reading each byte as two's-complement.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of dimensions in a face descriptor.
pub const DESCRIPTOR_DIM: usize = 128;

/// Scale applied before rounding to `i8`.
const QUANT_SCALE: f32 = 128.0;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("descriptor must have 128 dimensions, got {0}")]
    WrongLength(usize),
}

/// A 128-dimensional face feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Descriptor {
    values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.len() != DESCRIPTOR_DIM {
            return Err(DescriptorError::WrongLength(values.len()));
        }
        Ok(Self { values })
    }

    pub fn from_array(values: [f32; DESCRIPTOR_DIM]) -> Self {
        Self {
            values: values.to_vec(),
        }
    }

    /// Descriptor with every dimension set to `value`.
    pub fn splat(value: f32) -> Self {
        Self {
            values: vec![value; DESCRIPTOR_DIM],
        }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }
}

impl TryFrom<Vec<f32>> for Descriptor {
    type Error = DescriptorError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Descriptor> for Vec<f32> {
    fn from(d: Descriptor) -> Self {
        d.values
    }
}

/// A descriptor quantized to `i8`, ready for the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantizedDescriptor([i8; DESCRIPTOR_DIM]);

impl QuantizedDescriptor {
    /// Quantize each dimension as `clamp(round(v * 128), -128, 127)`.
    ///
    /// NaN becomes 0; infinities saturate to the nearest bound.
    pub fn quantize(descriptor: &Descriptor) -> Self {
        let mut out = [0i8; DESCRIPTOR_DIM];
        for (q, &v) in out.iter_mut().zip(descriptor.values.iter()) {
            *q = quantize_value(v);
        }
        Self(out)
    }

    /// Serialize to the 128-byte payload, one two's-complement byte per value.
    pub fn to_bytes(&self) -> [u8; DESCRIPTOR_DIM] {
        let mut out = [0u8; DESCRIPTOR_DIM];
        for (b, &q) in out.iter_mut().zip(self.0.iter()) {
            *b = q as u8;
        }
        out
    }

    /// Decode a payload received from the wire.
    pub fn from_bytes(bytes: &[u8; DESCRIPTOR_DIM]) -> Self {
        let mut out = [0i8; DESCRIPTOR_DIM];
        for (q, &b) in out.iter_mut().zip(bytes.iter()) {
            *q = b as i8;
        }
        Self(out)
    }

    /// Approximate the unquantized descriptor (`q / 128`).
    pub fn dequantize(&self) -> Descriptor {
        Descriptor {
            values: self.0.iter().map(|&q| q as f32 / QUANT_SCALE).collect(),
        }
    }

    pub fn values(&self) -> &[i8; DESCRIPTOR_DIM] {
        &self.0
    }
}

/// Shorthand for [`QuantizedDescriptor::quantize`].
pub fn quantize(descriptor: &Descriptor) -> QuantizedDescriptor {
    QuantizedDescriptor::quantize(descriptor)
}

fn quantize_value(v: f32) -> i8 {
    if v.is_nan() {
        return 0;
    }
    (v * QUANT_SCALE)
        .round()
        .clamp(i8::MIN as f32, i8::MAX as f32) as i8
}
