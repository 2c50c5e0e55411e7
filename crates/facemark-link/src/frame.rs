//! Wire framing: `START` ‖ 128-byte payload ‖ `ENDD`.
//!
//! The sender writes the three parts separately, but a reader must not rely
//! on that. [`FrameReader`] buffers until the full frame has arrived and then
//! checks both markers.

use facemark_core::DESCRIPTOR_DIM;
use std::io::{ErrorKind, Read};
use thiserror::Error;

/// Start marker. Five ASCII bytes, as the board firmware expects.
pub const START_MARKER: &[u8; 5] = b"START";
/// End marker.
pub const END_MARKER: &[u8; 4] = b"ENDD";
/// Payload length in bytes.
pub const PAYLOAD_LEN: usize = DESCRIPTOR_DIM;
/// Total frame length on the wire.
pub const FRAME_LEN: usize = START_MARKER.len() + PAYLOAD_LEN + END_MARKER.len();

pub type Payload = [u8; PAYLOAD_LEN];

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("bad start marker: {0:02x?}")]
    BadStartMarker(Vec<u8>),
    #[error("bad end marker: {0:02x?}")]
    BadEndMarker(Vec<u8>),
    #[error("stream ended after {read} bytes of a frame")]
    Truncated { read: usize },
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Lay out one frame contiguously.
pub fn encode_frame(payload: &Payload) -> [u8; FRAME_LEN] {
    let mut out = [0u8; FRAME_LEN];
    let (start, rest) = out.split_at_mut(START_MARKER.len());
    let (body, end) = rest.split_at_mut(PAYLOAD_LEN);
    start.copy_from_slice(START_MARKER);
    body.copy_from_slice(payload);
    end.copy_from_slice(END_MARKER);
    out
}

/// Check markers on a complete frame and extract the payload.
pub fn decode_frame(frame: &[u8; FRAME_LEN]) -> Result<Payload, FrameError> {
    let (start, rest) = frame.split_at(START_MARKER.len());
    let (body, end) = rest.split_at(PAYLOAD_LEN);
    if start != START_MARKER {
        return Err(FrameError::BadStartMarker(start.to_vec()));
    }
    if end != END_MARKER {
        return Err(FrameError::BadEndMarker(end.to_vec()));
    }
    let mut payload = [0u8; PAYLOAD_LEN];
    payload.copy_from_slice(body);
    Ok(payload)
}

/// Reads whole frames from a byte stream, independent of read boundaries.
pub struct FrameReader<R> {
    inner: R,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read exactly one frame.
    ///
    /// Returns `Ok(None)` on a clean end of stream before any byte of the
    /// frame arrived.
    pub fn read_frame(&mut self) -> Result<Option<Payload>, FrameError> {
        let mut buf = [0u8; FRAME_LEN];
        let mut filled = 0;
        while filled < FRAME_LEN {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => return Err(FrameError::Truncated { read: filled }),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        decode_frame(&buf).map(Some)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Yields at most `chunk` bytes per read.
    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_frame_len() {
        assert_eq!(FRAME_LEN, 137);
        assert_eq!(encode_frame(&[0u8; PAYLOAD_LEN]).len(), FRAME_LEN);
    }

    #[test]
    fn test_encode_layout() {
        let frame = encode_frame(&[0x7f; PAYLOAD_LEN]);
        let mut expected = b"START".to_vec();
        expected.extend_from_slice(&[0x7f; 128]);
        expected.extend_from_slice(b"ENDD");
        assert_eq!(frame.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_marker_bytes_in_payload_are_data() {
        let mut payload = [0u8; PAYLOAD_LEN];
        payload[..4].copy_from_slice(b"ENDD");
        payload[4..9].copy_from_slice(b"START");
        let frame = encode_frame(&payload);
        assert_eq!(decode_frame(&frame).unwrap(), payload);
    }

    #[test]
    fn test_reader_one_byte_at_a_time() {
        let payload: Payload = std::array::from_fn(|i| i as u8);
        let frame = encode_frame(&payload);
        let mut reader = FrameReader::new(Trickle { data: &frame, chunk: 1 });
        assert_eq!(reader.read_frame().unwrap(), Some(payload));
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_reader_two_frames_back_to_back() {
        let mut bytes = encode_frame(&[1u8; PAYLOAD_LEN]).to_vec();
        bytes.extend_from_slice(&encode_frame(&[2u8; PAYLOAD_LEN]));
        let mut reader = FrameReader::new(Trickle { data: &bytes, chunk: 50 });
        assert_eq!(reader.read_frame().unwrap(), Some([1u8; PAYLOAD_LEN]));
        assert_eq!(reader.read_frame().unwrap(), Some([2u8; PAYLOAD_LEN]));
    }

    #[test]
    fn test_reader_truncated() {
        let frame = encode_frame(&[0u8; PAYLOAD_LEN]);
        let mut reader = FrameReader::new(&frame[..100]);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::Truncated { read: 100 })
        ));
    }

    #[test]
    fn test_reader_bad_start() {
        let mut frame = encode_frame(&[0u8; PAYLOAD_LEN]);
        frame[0] = b'X';
        let mut reader = FrameReader::new(&frame[..]);
        assert!(matches!(reader.read_frame(), Err(FrameError::BadStartMarker(_))));
    }

    #[test]
    fn test_reader_bad_end() {
        let mut frame = encode_frame(&[0u8; PAYLOAD_LEN]);
        frame[FRAME_LEN - 1] = b'X';
        let mut reader = FrameReader::new(&frame[..]);
        assert!(matches!(reader.read_frame(), Err(FrameError::BadEndMarker(_))));
    }
}
