//! Stand-in for the board's receiving side, for bench testing without
//! hardware. Handles one connection at a time, one frame per connection.

use facemark_core::QuantizedDescriptor;
use facemark_link::FrameReader;
use std::net::TcpListener;

/// Accept connections and read one frame from each.
///
/// Stops after `max_frames` frames when set; otherwise runs until the
/// listener fails. Malformed frames are logged and skipped.
pub fn serve(
    listener: TcpListener,
    max_frames: Option<usize>,
) -> std::io::Result<Vec<QuantizedDescriptor>> {
    let mut received = Vec::new();
    tracing::info!(addr = %listener.local_addr()?, "board emulator listening");

    while max_frames.map_or(true, |max| received.len() < max) {
        let (sock, peer) = listener.accept()?;
        match FrameReader::new(sock).read_frame() {
            Ok(Some(payload)) => {
                let q = QuantizedDescriptor::from_bytes(&payload);
                let v = q.values();
                let (min, max) = v
                    .iter()
                    .fold((i8::MAX, i8::MIN), |(lo, hi), &x| (lo.min(x), hi.max(x)));
                tracing::info!(%peer, head = ?&v[..8], min, max, "frame received");
                received.push(q);
            }
            Ok(None) => tracing::warn!(%peer, "connection closed before any frame"),
            Err(e) => tracing::warn!(%peer, error = %e, "rejected frame"),
        }
    }

    Ok(received)
}
