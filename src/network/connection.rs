//! Connection Handler
//!
//! Runs one render session over an accepted TCP stream.

use std::io::ErrorKind;
use std::net::TcpStream;
use std::time::Duration;

use crate::command::CommandEvaluator;
use crate::config::Config;
use crate::engine::{ServerContext, ServerLoop};
use crate::error::{Result, VizError};
use crate::renderer::Renderer;

/// Handles a single client connection
pub struct Connection {
    stream: TcpStream,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Wrap an accepted stream
    ///
    /// The stream is switched to blocking mode; read timeouts, when
    /// configured, are the only way a read returns without data.
    pub fn new(stream: TcpStream) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        stream.set_nonblocking(false)?;
        // Frames are written whole; no point waiting for more
        stream.set_nodelay(true)?;

        Ok(Self { stream, peer_addr })
    }

    /// Configure connection timeouts (0 leaves the stream blocking)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.stream
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.stream
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Serve the session until the client goes away
    ///
    /// A client hanging up, at any point, is a normal end of session.
    pub fn handle<E>(self, config: Config, renderer: Box<dyn Renderer>, evaluator: &E) -> Result<()>
    where
        E: CommandEvaluator<ServerContext> + ?Sized,
    {
        tracing::debug!("Connection established from {}", self.peer_addr);

        let input = Box::new(self.stream.try_clone()?);
        let output = Box::new(self.stream);

        match ServerLoop::run(config, input, output, renderer, evaluator) {
            Ok(stats) => {
                tracing::debug!(
                    "Client {} disconnected after {} commands",
                    self.peer_addr,
                    stats.n_commands
                );
                Ok(())
            }
            Err(VizError::Io(ref e)) if is_disconnect(e.kind()) => {
                tracing::debug!("Client {} dropped the connection: {}", self.peer_addr, e);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Session with {} failed: {}", self.peer_addr, e);
                Err(e)
            }
        }
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    )
}
