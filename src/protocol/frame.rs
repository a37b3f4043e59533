//! Outbound frames
//!
//! A frame is one self-delimited message on the output stream: a text command
//! line followed by zero or more binary segments. Segments are `Bytes`, so a
//! frame can point straight into a rendered pixel buffer without copying it.

use std::io::{IoSlice, Write};

use bytes::Bytes;

/// Kind of an outbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Rendered image (`nv>image ...`)
    Image,
    /// Colour legend image (`nv>legend ...`)
    Legend,
    /// Per-statement error (`nv>viserror ...`)
    Error,
    /// Acknowledgement when nothing was rendered (`nv>ok ...`)
    Ok,
    /// Textual reply produced by a command
    Data,
}

/// An immutable outbound message
#[derive(Debug, Clone)]
pub struct Frame {
    kind: FrameKind,
    /// Command line, e.g. `nv>image -type image -bytes 1234\n`
    header: Bytes,
    /// Binary body in wire order
    segments: Vec<Bytes>,
    /// Sum of the segment lengths
    payload_len: usize,
}

impl Frame {
    /// Build a frame from its command line and body segments
    pub fn new(kind: FrameKind, header: impl Into<Bytes>, segments: Vec<Bytes>) -> Self {
        let payload_len = segments.iter().map(Bytes::len).sum();
        Self {
            kind,
            header: header.into(),
            segments,
            payload_len,
        }
    }

    /// A frame that is only a line of text
    pub fn line(kind: FrameKind, text: impl Into<String>) -> Self {
        let mut text = text.into();
        if !text.ends_with('\n') {
            text.push('\n');
        }
        Self::new(kind, text, Vec::new())
    }

    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    /// The command line as text
    pub fn header_text(&self) -> &str {
        std::str::from_utf8(&self.header).unwrap_or("")
    }

    /// Body segments in the order they go on the wire
    pub fn segments(&self) -> &[Bytes] {
        &self.segments
    }

    /// Length of the binary body (what the command line announces)
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Total bytes on the wire
    pub fn len(&self) -> usize {
        self.header.len() + self.payload_len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenate the frame into one buffer (copies; meant for tests/files)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len());
        out.extend_from_slice(&self.header);
        for segment in &self.segments {
            out.extend_from_slice(segment);
        }
        out
    }

    /// The binary body only, concatenated
    pub fn payload_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload_len);
        for segment in &self.segments {
            out.extend_from_slice(segment);
        }
        out
    }

    /// Write the whole frame with gather writes
    pub fn write_to<W: Write + ?Sized>(&self, writer: &mut W) -> std::io::Result<()> {
        let mut slices: Vec<IoSlice<'_>> = Vec::with_capacity(self.segments.len() + 1);
        slices.push(IoSlice::new(&self.header));
        slices.extend(
            self.segments
                .iter()
                .filter(|s| !s.is_empty())
                .map(|s| IoSlice::new(s)),
        );
        write_all_vectored(writer, &mut slices)
    }
}

/// `Write::write_all_vectored` is not stable; this is the same loop.
fn write_all_vectored<W: Write + ?Sized>(
    writer: &mut W,
    mut slices: &mut [IoSlice<'_>],
) -> std::io::Result<()> {
    IoSlice::advance_slices(&mut slices, 0);
    while !slices.is_empty() {
        match writer.write_vectored(slices) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "failed to write whole frame",
                ));
            }
            Ok(n) => IoSlice::advance_slices(&mut slices, n),
            Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
