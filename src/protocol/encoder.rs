//! Frame encoder
//!
//! Turns raw pixel buffers into self-describing image frames.
//!
//! ## Wire Format
//! ```text
//! ┌──────────────────────────┬──────────────┬─────────────────────────┐
//! │ "<tag> <len>\n"          │ image header │ pixel rows              │
//! └──────────────────────────┴──────────────┴─────────────────────────┘
//!                            └──────────── len bytes ─────────────────┘
//! ```
//!
//! ### PPM
//! Header `P6 <w> <h> 255\n`, 3 bytes per pixel. Rows are emitted in reverse
//! order of the source buffer: source row 0 goes out last. Each row is a
//! zero-copy slice of the source.
//!
//! ### TGA
//! 18-byte header, uncompressed true-colour, B-G-R(-A) pixels, rows in source
//! order. R-G-B(-A) sources are swapped on the fly, which copies.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use bytes::{Bytes, BytesMut};

use crate::error::{Result, VizError};
use super::{Frame, FrameKind};

/// Maximum sample value written into PPM headers
pub const PPM_MAXVAL: u32 = 255;

/// Size of the TGA header
pub const TGA_HEADER_SIZE: usize = 18;

/// TGA image type: uncompressed true-colour
const TGA_TYPE_TRUE_COLOR: u8 = 2;

// =============================================================================
// Pixel Buffers
// =============================================================================

/// Byte order of the channels in a pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOrder {
    Rgb,
    Bgr,
}

/// A rendered image as delivered by a renderer
///
/// Rows are stored one after another starting with row 0; every row is
/// `width * bytes_per_pixel` bytes with no padding.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub width: usize,
    pub height: usize,
    /// 3 (no alpha) or 4 (alpha)
    pub bytes_per_pixel: usize,
    pub order: PixelOrder,
    pub data: Bytes,
}

impl PixelBuffer {
    /// Wrap pixel data, checking that its size matches the dimensions
    pub fn new(
        width: usize,
        height: usize,
        bytes_per_pixel: usize,
        order: PixelOrder,
        data: impl Into<Bytes>,
    ) -> Result<Self> {
        let image = Self {
            width,
            height,
            bytes_per_pixel,
            order,
            data: data.into(),
        };
        image.validate()?;
        Ok(image)
    }

    /// Check that the pixel data matches the dimensions
    ///
    /// The fields are public, so the encoders re-check before slicing rows.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.bytes_per_pixel, 3 | 4) {
            return Err(VizError::Encode(format!(
                "unsupported bytes per pixel {}",
                self.bytes_per_pixel
            )));
        }
        let expected = self
            .width
            .checked_mul(self.height)
            .and_then(|n| n.checked_mul(self.bytes_per_pixel));
        if expected != Some(self.data.len()) {
            return Err(VizError::Encode(format!(
                "pixel buffer is {} bytes, {}x{}x{} does not match",
                self.data.len(),
                self.width,
                self.height,
                self.bytes_per_pixel
            )));
        }
        Ok(())
    }

    /// Bytes in one row
    pub fn row_len(&self) -> usize {
        self.width * self.bytes_per_pixel
    }

    /// Zero-copy slice of row `y`
    pub fn row(&self, y: usize) -> Bytes {
        let len = self.row_len();
        self.data.slice(y * len..(y + 1) * len)
    }
}

// =============================================================================
// Image Formats
// =============================================================================

/// Wire encoding for image frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Ppm,
    Tga,
}

impl ImageFormat {
    /// File extension used when frames are dumped to disk
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Ppm => "ppm",
            ImageFormat::Tga => "tga",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = VizError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ppm" => Ok(ImageFormat::Ppm),
            "tga" | "targa" => Ok(ImageFormat::Tga),
            other => Err(VizError::Config(format!("unknown image format \"{}\"", other))),
        }
    }
}

impl std::fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

// =============================================================================
// Headers
// =============================================================================

/// `P6 <w> <h> 255\n`
pub fn ppm_header(width: usize, height: usize) -> String {
    format!("P6 {} {} {}\n", width, height, PPM_MAXVAL)
}

/// 18-byte uncompressed true-colour TGA header
pub fn tga_header(width: usize, height: usize, bytes_per_pixel: usize) -> [u8; TGA_HEADER_SIZE] {
    let mut header = [0u8; TGA_HEADER_SIZE];
    header[2] = TGA_TYPE_TRUE_COLOR;
    header[12..14].copy_from_slice(&(width as u16).to_le_bytes());
    header[14..16].copy_from_slice(&(height as u16).to_le_bytes());
    header[16] = (bytes_per_pixel * 8) as u8;
    header
}

/// `<tag> <len>\n` command line preceding every binary frame
fn command_line(tag: &str, len: usize) -> String {
    format!("{} {}\n", tag, len)
}

// =============================================================================
// Frame Encoding
// =============================================================================

/// Encode an image in the given format
pub fn encode_image(
    format: ImageFormat,
    kind: FrameKind,
    tag: &str,
    image: &PixelBuffer,
    tga_bytes_per_pixel: usize,
) -> Result<Frame> {
    match format {
        ImageFormat::Ppm => encode_ppm(kind, tag, image),
        ImageFormat::Tga => encode_tga(kind, tag, image, tga_bytes_per_pixel),
    }
}

/// Encode a PPM frame with rows reversed
///
/// RGB sources with 3 bytes per pixel are not copied: each row segment
/// points into the source buffer. Anything else is converted row by row.
pub fn encode_ppm(kind: FrameKind, tag: &str, image: &PixelBuffer) -> Result<Frame> {
    check_dimensions(image)?;

    let header = ppm_header(image.width, image.height);
    let data_len = image.width * image.height * 3;

    let mut segments = Vec::with_capacity(image.height + 1);
    segments.push(Bytes::from(header.clone()));

    let direct = image.bytes_per_pixel == 3 && image.order == PixelOrder::Rgb;
    for y in (0..image.height).rev() {
        if direct {
            segments.push(image.row(y));
        } else {
            segments.push(to_rgb_row(image, y));
        }
    }

    Ok(Frame::new(
        kind,
        command_line(tag, header.len() + data_len),
        segments,
    ))
}

/// Encode a TGA frame
///
/// BGR(A) sources at the requested depth go out as a single zero-copy
/// segment. RGB(A) sources or a depth change take the slow path.
pub fn encode_tga(
    kind: FrameKind,
    tag: &str,
    image: &PixelBuffer,
    bytes_per_pixel: usize,
) -> Result<Frame> {
    check_dimensions(image)?;
    if !matches!(bytes_per_pixel, 3 | 4) {
        return Err(VizError::Encode(format!(
            "TGA needs 3 or 4 bytes per pixel, got {}",
            bytes_per_pixel
        )));
    }

    let header = tga_header(image.width, image.height, bytes_per_pixel);
    let data_len = image.width * image.height * bytes_per_pixel;

    let body = if image.order == PixelOrder::Bgr && image.bytes_per_pixel == bytes_per_pixel {
        image.data.clone()
    } else {
        tracing::trace!(
            "Converting {:?}/{} source to BGR/{} for TGA",
            image.order,
            image.bytes_per_pixel,
            bytes_per_pixel
        );
        to_bgr(image, bytes_per_pixel)
    };

    Ok(Frame::new(
        kind,
        command_line(tag, TGA_HEADER_SIZE + data_len),
        vec![Bytes::copy_from_slice(&header), body],
    ))
}

/// Error frame: `<tag> <len>\n<server> Server Error: <message>\n`
pub fn encode_error(server_name: &str, token: u64, message: &str) -> Frame {
    let body = format!("{} Server Error: {}\n", server_name, message.trim_end());
    let tag = format!("nv>viserror -type error -token {} -bytes", token);
    Frame::new(
        FrameKind::Error,
        command_line(&tag, body.len()),
        vec![Bytes::from(body)],
    )
}

/// Acknowledgement sent when a statement batch rendered nothing
pub fn encode_ack(token: u64) -> Frame {
    Frame::line(FrameKind::Ok, format!("nv>ok -token {}", token))
}

fn check_dimensions(image: &PixelBuffer) -> Result<()> {
    image.validate()?;
    if image.width > u16::MAX as usize || image.height > u16::MAX as usize {
        return Err(VizError::Encode(format!(
            "image {}x{} exceeds {} pixels per side",
            image.width,
            image.height,
            u16::MAX
        )));
    }
    Ok(())
}

/// Copy row `y` as packed RGB
fn to_rgb_row(image: &PixelBuffer, y: usize) -> Bytes {
    let bpp = image.bytes_per_pixel;
    let row = image.row(y);
    let mut out = BytesMut::with_capacity(image.width * 3);
    for px in row.chunks_exact(bpp) {
        match image.order {
            PixelOrder::Rgb => out.extend_from_slice(&[px[0], px[1], px[2]]),
            PixelOrder::Bgr => out.extend_from_slice(&[px[2], px[1], px[0]]),
        }
    }
    out.freeze()
}

/// Copy the whole image as BGR(A) with the requested depth
fn to_bgr(image: &PixelBuffer, bytes_per_pixel: usize) -> Bytes {
    let mut out = BytesMut::with_capacity(image.width * image.height * bytes_per_pixel);
    for px in image.data.chunks_exact(image.bytes_per_pixel) {
        let (b, g, r) = match image.order {
            PixelOrder::Rgb => (px[2], px[1], px[0]),
            PixelOrder::Bgr => (px[0], px[1], px[2]),
        };
        out.extend_from_slice(&[b, g, r]);
        if bytes_per_pixel == 4 {
            out.extend_from_slice(&[px.get(3).copied().unwrap_or(u8::MAX)]);
        }
    }
    out.freeze()
}

// =============================================================================
// Image Files
// =============================================================================

/// Write an image as a PPM file (rows reversed, same as on the wire)
pub fn save_ppm_file(path: &Path, image: &PixelBuffer) -> Result<()> {
    let frame = encode_ppm(FrameKind::Image, "", image)?;
    write_segments(path, frame.segments())
}

/// Write an image as a TGA file
pub fn save_tga_file(path: &Path, image: &PixelBuffer, bytes_per_pixel: usize) -> Result<()> {
    let frame = encode_tga(FrameKind::Image, "", image, bytes_per_pixel)?;
    write_segments(path, frame.segments())
}

fn write_segments(path: &Path, segments: &[Bytes]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for segment in segments {
        writer.write_all(segment)?;
    }
    writer.flush()?;
    Ok(())
}
