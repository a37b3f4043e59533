//! Server context
//!
//! Everything a command handler may touch during a session: the input
//! buffer (for raw payloads), the renderer, the output path and the session
//! statistics. One context exists per session and only the command thread
//! uses it.

use std::io::{BufWriter, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::channel::ResponseChannel;
use crate::config::Config;
use crate::error::{Result, VizError};
use crate::protocol::{
    encode_image, save_ppm_file, save_tga_file, Frame, FrameKind, ImageFormat, PixelBuffer,
    ReadBuffer, ReadOutcome,
};
use crate::renderer::Renderer;

/// Input stream type used by sessions
pub type SessionInput = Box<dyn Read + Send>;

/// Output stream type used by sessions
pub type SessionOutput = Box<dyn Write + Send>;

// =============================================================================
// Statistics
// =============================================================================

/// Per-session counters
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub start: Instant,
    /// Statements executed
    pub n_commands: u64,
    /// Time spent executing statements
    pub cmd_time: Duration,
    /// Image and legend frames produced
    pub n_frames: u64,
    pub n_frame_bytes: u64,
    /// Raw payloads received
    pub n_data_sets: u64,
    pub n_data_bytes: u64,
    /// Bytes that reached the output stream
    pub n_bytes_written: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            n_commands: 0,
            cmd_time: Duration::ZERO,
            n_frames: 0,
            n_frame_bytes: 0,
            n_data_sets: 0,
            n_data_bytes: 0,
            n_bytes_written: 0,
        }
    }

    /// One-line `key value` summary for the session log
    pub fn summary(&self, server_name: &str, status: i32) -> String {
        format!(
            "render_stop renderer {} pid {} num_data_sets {} data_set_bytes {} num_frames {} \
             frame_bytes {} num_commands {} cmd_time {:.3} session_time {:.3} bytes_written {} status {}",
            server_name,
            std::process::id(),
            self.n_data_sets,
            self.n_data_bytes,
            self.n_frames,
            self.n_frame_bytes,
            self.n_commands,
            self.cmd_time.as_secs_f64(),
            self.start.elapsed().as_secs_f64(),
            self.n_bytes_written,
            status
        )
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics shared between the command and writer threads
pub type SharedStats = Arc<Mutex<SessionStats>>;

// =============================================================================
// Responder
// =============================================================================

/// Where frames go
pub enum Responder {
    /// Synchronous mode: written on the command thread
    Direct(BufWriter<SessionOutput>),
    /// Threaded mode: handed to the writer thread
    Queued(ResponseChannel),
}

impl Responder {
    fn send(&mut self, frame: Frame, stats: &SharedStats) -> Result<()> {
        match self {
            Responder::Direct(writer) => {
                frame.write_to(writer)?;
                writer.flush()?;
                stats.lock().n_bytes_written += frame.len() as u64;
                Ok(())
            }
            Responder::Queued(channel) => channel.enqueue(frame),
        }
    }

    fn flush(&mut self) -> Result<()> {
        if let Responder::Direct(writer) = self {
            writer.flush()?;
        }
        Ok(())
    }
}

// =============================================================================
// Context
// =============================================================================

/// Per-session state passed to every command handler
pub struct ServerContext {
    config: Config,
    input: ReadBuffer<SessionInput>,
    renderer: Box<dyn Renderer>,
    responder: Responder,
    stats: SharedStats,
    /// Sequence number for dumped frame files
    dump_seq: u64,
}

impl ServerContext {
    pub fn new(
        config: Config,
        input: SessionInput,
        renderer: Box<dyn Renderer>,
        responder: Responder,
        stats: SharedStats,
    ) -> Self {
        let input = ReadBuffer::with_chunk_size(input, config.read_buffer_size);
        Self {
            config,
            input,
            renderer,
            responder,
            stats,
            dump_seq: 0,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn input(&mut self) -> &mut ReadBuffer<SessionInput> {
        &mut self.input
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }

    pub fn renderer_mut(&mut self) -> &mut dyn Renderer {
        self.renderer.as_mut()
    }

    /// Snapshot of the session statistics
    pub fn stats(&self) -> SessionStats {
        self.stats.lock().clone()
    }

    /// Token reported in acks and error frames (statements executed so far)
    pub fn token(&self) -> u64 {
        self.stats.lock().n_commands
    }

    pub(crate) fn record_command(&self, elapsed: Duration) {
        let mut stats = self.stats.lock();
        stats.n_commands += 1;
        stats.cmd_time += elapsed;
    }

    // =========================================================================
    // Input
    // =========================================================================

    /// Read a payload announced by the current statement
    ///
    /// Every failure here is fatal: once a payload is cut short the stream
    /// cannot be resynchronized.
    pub fn read_payload(&mut self, len: usize) -> Result<Bytes> {
        if len > self.config.max_payload_size {
            return Err(VizError::PayloadTooLarge {
                size: len,
                max: self.config.max_payload_size,
            });
        }

        match self.input.read_exact(len)? {
            ReadOutcome::Data(bytes) => {
                let mut stats = self.stats.lock();
                stats.n_data_sets += 1;
                stats.n_data_bytes += len as u64;
                Ok(bytes)
            }
            ReadOutcome::EndFile | ReadOutcome::Continue => {
                Err(VizError::ShortPayload { expected: len })
            }
        }
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Send a frame to the client
    pub fn send(&mut self, frame: Frame) -> Result<()> {
        tracing::trace!("Sending {:?} frame ({} bytes)", frame.kind(), frame.len());
        self.responder.send(frame, &self.stats)
    }

    /// Encode an image in the configured format and send it
    ///
    /// With a frame dump directory configured the image is also written
    /// there; dump failures are logged and otherwise ignored.
    pub fn send_image(&mut self, kind: FrameKind, tag: &str, image: &PixelBuffer) -> Result<()> {
        let frame = encode_image(
            self.config.image_format,
            kind,
            tag,
            image,
            self.config.tga_bytes_per_pixel,
        )?;

        {
            let mut stats = self.stats.lock();
            stats.n_frames += 1;
            stats.n_frame_bytes += frame.payload_len() as u64;
        }

        self.send(frame)?;

        // A failed dump never costs the client its frame
        if let Err(e) = self.dump_image(image) {
            tracing::warn!("Frame dump failed: {}", e);
        }
        Ok(())
    }

    /// Write an image into the dump directory as `frame-NNNNN.<ext>`
    fn dump_image(&mut self, image: &PixelBuffer) -> Result<()> {
        let Some(dir) = self.config.frame_dump_dir.as_ref() else {
            return Ok(());
        };
        self.dump_seq += 1;

        let format = self.config.image_format;
        let path = dir.join(format!("frame-{:05}.{}", self.dump_seq, format.extension()));
        tracing::debug!("Dumping frame to {}", path.display());
        match format {
            ImageFormat::Ppm => save_ppm_file(&path, image),
            ImageFormat::Tga => save_tga_file(&path, image, self.config.tga_bytes_per_pixel),
        }
    }

    pub(crate) fn flush(&mut self) -> Result<()> {
        self.responder.flush()
    }
}
