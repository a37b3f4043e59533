//! Incremental input buffer
//!
//! Accumulates bytes from a single input stream and hands them out either as
//! complete newline-terminated lines or as exact-length raw payloads.
//!
//! ## Buffer Layout
//! ```text
//! ┌────────────────────┬──────────────────────┬──────────────┐
//! │  consumed (split)  │  buffered, unread    │  spare       │
//! └────────────────────┴──────────────────────┴──────────────┘
//!                      ▲ mark                 ▲ fill
//! ```
//! Consumed bytes are split off the front of the `BytesMut`, so the mark is
//! always offset 0 and the fill is `buffer.len()`. The source is only read
//! when the buffered bytes cannot satisfy the request.

use std::io::{ErrorKind, Read};
use std::thread;
use std::time::Duration;

use bytes::{Bytes, BytesMut};

use crate::error::{Result, VizError};

/// First pause after a payload read would block
const PAYLOAD_BACKOFF_MIN: Duration = Duration::from_millis(1);

/// Longest pause between payload read attempts
const PAYLOAD_BACKOFF_MAX: Duration = Duration::from_millis(32);

/// Status of the last buffer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Data was returned
    Ok,
    /// No complete line yet; the source would block
    Continue,
    /// The source reached end of file
    EndFile,
    /// The source failed
    Error,
}

/// Outcome of a read request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A complete line (including its `\n`) or an exact payload
    Data(Bytes),
    /// Nothing complete is available yet; ask again later
    Continue,
    /// The stream closed before the request could be satisfied
    EndFile,
}

/// Buffered reader for the control stream
pub struct ReadBuffer<R> {
    /// Underlying byte source (pipe, socket, stdin)
    source: R,
    /// Unconsumed bytes
    buffer: BytesMut,
    /// Bytes requested from the source per refill
    chunk_size: usize,
    /// Result of the last operation
    status: ReadStatus,
}

impl<R: Read> ReadBuffer<R> {
    /// Default refill size (4 KB)
    pub const DEFAULT_CHUNK_SIZE: usize = 1 << 12;

    /// Create a buffer with the default refill size
    pub fn new(source: R) -> Self {
        Self::with_chunk_size(source, Self::DEFAULT_CHUNK_SIZE)
    }

    /// Create a buffer that refills `chunk_size` bytes at a time
    pub fn with_chunk_size(source: R, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            source,
            buffer: BytesMut::with_capacity(chunk_size),
            chunk_size,
            status: ReadStatus::Ok,
        }
    }

    /// Status of the last `next_line` / `read_exact` call
    pub fn status(&self) -> ReadStatus {
        self.status
    }

    /// Number of bytes buffered but not yet handed out
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Whether a complete line can be returned without touching the source
    pub fn is_line_available(&self) -> bool {
        self.buffer.contains(&b'\n')
    }

    /// Borrow the underlying source
    pub fn get_ref(&self) -> &R {
        &self.source
    }

    /// Return the next complete line, including the trailing newline.
    ///
    /// Refills from the source until a newline shows up. A source that would
    /// block (or times out) yields `Continue` with the partial line kept
    /// buffered. A line cut off by end of file is discarded.
    pub fn next_line(&mut self) -> Result<ReadOutcome> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
                self.status = ReadStatus::Ok;
                return Ok(ReadOutcome::Data(self.buffer.split_to(pos + 1).freeze()));
            }

            match self.fill() {
                Ok(0) => {
                    if !self.buffer.is_empty() {
                        tracing::debug!(
                            "Discarding {} bytes of unterminated input at end of file",
                            self.buffer.len()
                        );
                        self.buffer.clear();
                    }
                    self.status = ReadStatus::EndFile;
                    return Ok(ReadOutcome::EndFile);
                }
                Ok(_) => continue,
                Err(ref e) if is_would_block(e) => {
                    self.status = ReadStatus::Continue;
                    return Ok(ReadOutcome::Continue);
                }
                Err(e) => {
                    self.status = ReadStatus::Error;
                    return Err(VizError::Io(e));
                }
            }
        }
    }

    /// Return exactly `len` raw bytes, bypassing line parsing.
    ///
    /// Keeps reading across short reads until `len` bytes are collected. A
    /// would-block or timeout is retried because the caller has already
    /// committed to this payload. Returns `EndFile` only if the stream closes
    /// first; the bytes collected so far are dropped since the stream can no
    /// longer be resynchronized.
    ///
    /// Sessions normally run on blocking streams. On a non-blocking source
    /// the retries back off from 1 ms up to 32 ms, resetting whenever bytes
    /// arrive.
    pub fn read_exact(&mut self, len: usize) -> Result<ReadOutcome> {
        let mut backoff = PAYLOAD_BACKOFF_MIN;
        while self.buffer.len() < len {
            match self.fill_at_most(len - self.buffer.len()) {
                Ok(0) => {
                    tracing::warn!(
                        "End of file after {} of {} payload bytes",
                        self.buffer.len(),
                        len
                    );
                    self.buffer.clear();
                    self.status = ReadStatus::EndFile;
                    return Ok(ReadOutcome::EndFile);
                }
                Ok(_) => backoff = PAYLOAD_BACKOFF_MIN,
                Err(ref e) if is_would_block(e) => {
                    thread::sleep(backoff);
                    backoff = (backoff * 2).min(PAYLOAD_BACKOFF_MAX);
                }
                Err(e) => {
                    self.status = ReadStatus::Error;
                    return Err(VizError::Io(e));
                }
            }
        }

        self.status = ReadStatus::Ok;
        Ok(ReadOutcome::Data(self.buffer.split_to(len).freeze()))
    }

    /// Read one chunk from the source into the spare area
    fn fill(&mut self) -> std::io::Result<usize> {
        self.fill_at_most(self.chunk_size)
    }

    /// Read at most `limit` bytes (capped at the chunk size) from the source.
    ///
    /// `Interrupted` is retried here; every other error goes to the caller.
    fn fill_at_most(&mut self, limit: usize) -> std::io::Result<usize> {
        let want = limit.clamp(1, self.chunk_size);
        let start = self.buffer.len();
        self.buffer.resize(start + want, 0);

        loop {
            match self.source.read(&mut self.buffer[start..]) {
                Ok(n) => {
                    self.buffer.truncate(start + n);
                    return Ok(n);
                }
                Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.buffer.truncate(start);
                    return Err(e);
                }
            }
        }
    }
}

/// Would-block and timeouts both mean "no data yet"
///
/// Windows reports an expired socket read timeout as `TimedOut`.
fn is_would_block(e: &std::io::Error) -> bool {
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
