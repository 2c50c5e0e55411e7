//! facemark-link: Framed delivery of quantized descriptors to the board.
//!
//! One TCP connection per attendance event, one frame per connection, no
//! reply. Connects are retried a bounded number of times; sends are not.

pub mod client;
pub mod config;
pub mod frame;

pub use client::{connect, send_frame, ClientState, Connection, FramedClient, LinkError};
pub use config::LinkConfig;
pub use frame::{encode_frame, FrameError, FrameReader, Payload, FRAME_LEN, PAYLOAD_LEN};
