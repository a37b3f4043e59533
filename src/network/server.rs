//! TCP Server
//!
//! Accepts connections and runs each session on its own thread with its own
//! renderer.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::command::CommandEvaluator;
use crate::config::Config;
use crate::engine::ServerContext;
use crate::error::Result;
use crate::renderer::Renderer;

use super::Connection;

/// Evaluator shared by every session
pub type SharedEvaluator = Arc<dyn CommandEvaluator<ServerContext> + Send + Sync>;

/// Builds a fresh renderer for each session
pub type RendererFactory = Arc<dyn Fn() -> Box<dyn Renderer> + Send + Sync>;

/// How long the accept loop sleeps when no client is waiting
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// TCP render server
pub struct Server {
    config: Config,
    listener: TcpListener,
    evaluator: SharedEvaluator,
    renderers: RendererFactory,
    shutdown: Arc<AtomicBool>,
    /// Sessions currently running
    active: Arc<AtomicUsize>,
}

impl Server {
    /// Validate the config and bind the listen address
    pub fn bind(config: Config, evaluator: SharedEvaluator, renderers: RendererFactory) -> Result<Self> {
        config.validate()?;

        let listener = TcpListener::bind(&config.listen_addr)?;
        // Non-blocking so the loop can notice shutdown
        listener.set_nonblocking(true)?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            listener,
            evaluator,
            renderers,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of sessions currently running
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Accept connections until `shutdown` is called (blocking)
    ///
    /// Running sessions are left to finish on their own.
    pub fn run(&self) -> Result<()> {
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => self.spawn_session(stream, peer),
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL_INTERVAL),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::error!("Accept failed: {}", e);
                    return Err(e.into());
                }
            }
        }

        tracing::info!(
            "Accept loop stopped with {} sessions still running",
            self.active_connections()
        );
        Ok(())
    }

    /// Signal the accept loop to stop
    pub fn shutdown(&self) {
        tracing::debug!("Server shutdown requested");
        self.shutdown.store(true, Ordering::SeqCst);
    }

    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) {
        if self.active.load(Ordering::SeqCst) >= self.config.max_connections {
            tracing::warn!(
                "Rejecting {}: {} connections already open",
                peer,
                self.config.max_connections
            );
            return;
        }

        let guard = ActiveGuard::new(Arc::clone(&self.active));
        let config = self.config.clone();
        let evaluator = Arc::clone(&self.evaluator);
        let renderer = (self.renderers)();

        let spawned = thread::Builder::new()
            .name(format!("vizserver-session-{}", peer))
            .spawn(move || {
                let _guard = guard;
                let result = Connection::new(stream).and_then(|mut conn| {
                    conn.set_timeouts(config.read_timeout_ms, config.write_timeout_ms)?;
                    conn.handle(config, renderer, evaluator.as_ref())
                });
                if let Err(e) = result {
                    tracing::warn!("Session for {} ended with error: {}", peer, e);
                }
            });

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn session thread for {}: {}", peer, e);
        }
    }
}

/// Counts a running session; decrements when the session thread ends
struct ActiveGuard(Arc<AtomicUsize>);

impl ActiveGuard {
    fn new(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self(active)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
