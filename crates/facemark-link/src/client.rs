//! Blocking TCP client that delivers one frame per session.
//!
//! A session is `Idle → Connecting → Connected → Sending → Closed`. Failed
//! attempts go through `Retrying` until the attempt budget is spent, which
//! ends in `Failed`. A write error while sending also ends in `Failed`;
//! sends are never retried, only connects are.
//!
//! Nothing is read back from the board.

use crate::config::LinkConfig;
use crate::frame::{Payload, END_MARKER, START_MARKER};
use std::io::{self, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinkError {
    /// Every connection attempt failed. Callers fall back rather than fail.
    #[error("board unreachable after {attempts} attempt(s): {last_cause}")]
    ConnectFailure { attempts: u32, last_cause: io::Error },
    /// A write failed mid-frame. The frame counts as not delivered.
    #[error("frame send failed: {cause}")]
    SendFailure { cause: io::Error },
}

/// Where a session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Connecting { attempt: u32 },
    Retrying { attempt: u32 },
    Connected,
    Sending,
    Closed,
    Failed,
}

/// An open TCP session to the board. Closed on drop.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    pacing: Duration,
}

impl Connection {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send start marker, payload and end marker as three writes.
    pub fn send_frame(&mut self, payload: &Payload) -> Result<(), LinkError> {
        write_frame(&mut self.stream, payload, self.pacing)
            .map_err(|cause| LinkError::SendFailure { cause })?;
        tracing::info!(peer = %self.peer, "frame sent to board");
        Ok(())
    }

    /// Shut the socket down in both directions.
    pub fn close(self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            // The peer may already have gone away; the fd is released either way.
            tracing::debug!(peer = %self.peer, error = %e, "shutdown after send");
        }
    }
}

/// Write one frame to `w`, pausing `pacing` after each part.
pub fn write_frame<W: Write>(w: &mut W, payload: &Payload, pacing: Duration) -> io::Result<()> {
    for part in [&START_MARKER[..], &payload[..], &END_MARKER[..]] {
        w.write_all(part)?;
        w.flush()?;
        if !pacing.is_zero() {
            std::thread::sleep(pacing);
        }
    }
    Ok(())
}

/// Connect to the board, retrying per `config`.
pub fn connect(config: &LinkConfig) -> Result<Connection, LinkError> {
    connect_observed(config, &mut |_| {})
}

/// Send one frame over an open connection.
pub fn send_frame(conn: &mut Connection, payload: &Payload) -> Result<(), LinkError> {
    conn.send_frame(payload)
}

fn connect_observed(
    config: &LinkConfig,
    on_state: &mut dyn FnMut(ClientState),
) -> Result<Connection, LinkError> {
    let attempts = config.attempts();
    let timeout = config.connect_timeout();
    let mut last_cause = io::Error::new(ErrorKind::Other, "no connection attempt made");

    tracing::info!(endpoint = %config.endpoint(), attempts, "connecting to board");

    for attempt in 1..=attempts {
        on_state(ClientState::Connecting { attempt });
        match connect_once(&config.host, config.port, timeout) {
            Ok((stream, peer)) => {
                on_state(ClientState::Connected);
                tracing::info!(%peer, attempt, "connected to board");
                return Ok(Connection {
                    stream,
                    peer,
                    pacing: config.write_pacing(),
                });
            }
            Err(e) => {
                log_attempt_failure(attempt, &e);
                last_cause = e;
            }
        }

        if attempt < attempts {
            on_state(ClientState::Retrying { attempt });
            tracing::info!(
                delay_ms = config.retry_delay_ms,
                next = attempt + 1,
                of = attempts,
                "retrying board connection"
            );
            std::thread::sleep(config.retry_delay());
        }
    }

    on_state(ClientState::Failed);
    tracing::warn!(endpoint = %config.endpoint(), attempts, "board unreachable");
    Err(LinkError::ConnectFailure {
        attempts,
        last_cause,
    })
}

/// One attempt: resolve, then try each address until `timeout` has passed
/// since the attempt began. Every address shares the same deadline.
fn connect_once(host: &str, port: u16, timeout: Duration) -> io::Result<(TcpStream, SocketAddr)> {
    let deadline = Instant::now() + timeout;
    let mut last = io::Error::new(
        ErrorKind::NotFound,
        format!("{host}:{port} resolved to no addresses"),
    );
    for addr in (host, port).to_socket_addrs()? {
        let Some(budget) = remaining(deadline, Instant::now()) else {
            last = io::Error::new(ErrorKind::TimedOut, format!("{host}:{port} connect deadline passed"));
            break;
        };
        match TcpStream::connect_timeout(&addr, budget) {
            Ok(stream) => {
                stream.set_write_timeout(Some(timeout))?;
                stream.set_nodelay(true)?;
                return Ok((stream, addr));
            }
            Err(e) => {
                tracing::debug!(%addr, error = %e, "address failed");
                last = e;
            }
        }
    }
    Err(last)
}

/// Time left before `deadline`, or `None` once it has passed.
fn remaining(deadline: Instant, now: Instant) -> Option<Duration> {
    let left = deadline.saturating_duration_since(now);
    (!left.is_zero()).then_some(left)
}

fn log_attempt_failure(attempt: u32, e: &io::Error) {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => {
            tracing::warn!(attempt, "connection attempt timed out")
        }
        ErrorKind::ConnectionRefused => {
            tracing::warn!(attempt, "connection refused; board server may not be running")
        }
        _ => tracing::warn!(attempt, error = %e, "connection attempt failed"),
    }
}

/// Runs sessions against one board and tracks the state of the latest one.
pub struct FramedClient {
    config: LinkConfig,
    state: ClientState,
}

impl FramedClient {
    pub fn new(config: LinkConfig) -> Self {
        Self {
            config,
            state: ClientState::Idle,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn connect(&mut self) -> Result<Connection, LinkError> {
        let state = &mut self.state;
        connect_observed(&self.config, &mut |s| *state = s)
    }

    pub fn send(&mut self, conn: &mut Connection, payload: &Payload) -> Result<(), LinkError> {
        self.state = ClientState::Sending;
        match conn.send_frame(payload) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.state = ClientState::Failed;
                Err(e)
            }
        }
    }

    pub fn close(&mut self, conn: Connection) {
        conn.close();
        if self.state != ClientState::Failed {
            self.state = ClientState::Closed;
        }
    }

    /// One complete session: connect, send, close. The connection is closed
    /// on every path.
    pub fn deliver(&mut self, payload: &Payload) -> Result<(), LinkError> {
        let mut conn = self.connect()?;
        let sent = self.send(&mut conn, payload);
        self.close(conn);
        sent
    }
}
