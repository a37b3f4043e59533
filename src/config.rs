//! Configuration for vizserver
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::protocol::ImageFormat;

/// Main configuration for a render server instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Identity
    // -------------------------------------------------------------------------
    /// Name used in the greeting line and in error payloads
    /// (`<server_name> Server Error: ...`)
    pub server_name: String,

    /// Send `<server_name> <version>` when a session starts
    pub send_greeting: bool,

    // -------------------------------------------------------------------------
    // Frame Configuration
    // -------------------------------------------------------------------------
    /// Wire encoding of image frames
    pub image_format: ImageFormat,

    /// Bytes per pixel for TGA frames (3 or 4)
    pub tga_bytes_per_pixel: usize,

    /// When set, every image frame is also written here as a file
    pub frame_dump_dir: Option<PathBuf>,

    // -------------------------------------------------------------------------
    // Session Configuration
    // -------------------------------------------------------------------------
    /// Run a dedicated writer thread fed by the response channel
    pub threaded: bool,

    /// Defer rendering while more complete lines are already buffered
    pub coalesce_renders: bool,

    /// Refill chunk size of the input buffer (bytes)
    pub read_buffer_size: usize,

    /// Largest raw payload a statement may announce (bytes)
    pub max_payload_size: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection read timeout (milliseconds, 0 = block forever)
    ///
    /// A timeout while waiting for a statement is not an error; it only gives
    /// a deferred render the chance to run.
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds, 0 = block forever)
    pub write_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_name: "VizServer".to_string(),
            send_greeting: true,
            image_format: ImageFormat::Ppm,
            tga_bytes_per_pixel: 3,
            frame_dump_dir: None,
            threaded: true,
            coalesce_renders: false,
            read_buffer_size: 1 << 12,
            max_payload_size: 256 * 1024 * 1024, // 256 MB
            listen_addr: "127.0.0.1:2000".to_string(),
            max_connections: 64,
            read_timeout_ms: 0,
            write_timeout_ms: 0,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the server name
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.config.server_name = name.into();
        self
    }

    /// Enable or disable the session greeting line
    pub fn send_greeting(mut self, enabled: bool) -> Self {
        self.config.send_greeting = enabled;
        self
    }

    /// Set the image frame encoding
    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.config.image_format = format;
        self
    }

    /// Set the TGA bytes per pixel (3 or 4)
    pub fn tga_bytes_per_pixel(mut self, bytes: usize) -> Self {
        self.config.tga_bytes_per_pixel = bytes;
        self
    }

    /// Dump every image frame into a directory
    pub fn frame_dump_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.frame_dump_dir = Some(path.into());
        self
    }

    /// Select threaded (reader + writer) or synchronous mode
    pub fn threaded(mut self, threaded: bool) -> Self {
        self.config.threaded = threaded;
        self
    }

    /// Enable render coalescing
    pub fn coalesce_renders(mut self, enabled: bool) -> Self {
        self.config.coalesce_renders = enabled;
        self
    }

    /// Set the input buffer refill size (in bytes)
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the maximum announced payload size (in bytes)
    pub fn max_payload_size(mut self, size: usize) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Config {
    /// Check values that would otherwise fail deep inside a session
    pub fn validate(&self) -> crate::Result<()> {
        if !matches!(self.tga_bytes_per_pixel, 3 | 4) {
            return Err(crate::VizError::Config(format!(
                "tga_bytes_per_pixel must be 3 or 4, got {}",
                self.tga_bytes_per_pixel
            )));
        }
        if self.read_buffer_size == 0 {
            return Err(crate::VizError::Config(
                "read_buffer_size must be non-zero".to_string(),
            ));
        }
        if self.server_name.trim().is_empty() {
            return Err(crate::VizError::Config(
                "server_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
