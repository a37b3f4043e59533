//! Encoder Tests
//!
//! Tests for PPM/TGA image frames, error frames and frame files.

use std::fs;

use bytes::Bytes;
use tempfile::tempdir;
use vizserver::protocol::{
    encode_ack, encode_error, encode_image, encode_ppm, encode_tga, ppm_header, save_ppm_file,
    save_tga_file, FrameKind, ImageFormat, PixelBuffer, PixelOrder, ResponseLine,
    TGA_HEADER_SIZE,
};
use vizserver::VizError;

// =============================================================================
// Helper Functions
// =============================================================================

/// RGB buffer where every byte of row r is r
fn row_indexed(width: usize, height: usize) -> PixelBuffer {
    let mut data = Vec::with_capacity(width * height * 3);
    for r in 0..height {
        data.extend(std::iter::repeat(r as u8).take(width * 3));
    }
    PixelBuffer::new(width, height, 3, PixelOrder::Rgb, data).unwrap()
}

/// Buffer of one repeated pixel
fn solid(width: usize, height: usize, order: PixelOrder, pixel: &[u8]) -> PixelBuffer {
    let data: Vec<u8> = pixel.iter().copied().cycle().take(width * height * pixel.len()).collect();
    PixelBuffer::new(width, height, pixel.len(), order, data).unwrap()
}

/// Split a frame into (command line, body)
fn split_frame(bytes: &[u8]) -> (String, Vec<u8>) {
    let newline = bytes.iter().position(|&b| b == b'\n').unwrap();
    (
        String::from_utf8(bytes[..newline].to_vec()).unwrap(),
        bytes[newline + 1..].to_vec(),
    )
}

// =============================================================================
// PPM Tests
// =============================================================================

#[test]
fn test_ppm_rows_are_reversed() {
    let (w, h) = (4, 5);
    let frame = encode_ppm(FrameKind::Image, "nv>image -type image -bytes", &row_indexed(w, h)).unwrap();
    let (line, body) = split_frame(&frame.to_bytes());

    let header = ppm_header(w, h);
    assert!(body.starts_with(header.as_bytes()));
    assert_eq!(line, format!("nv>image -type image -bytes {}", header.len() + w * h * 3));

    let pixels = &body[header.len()..];
    assert_eq!(pixels.len(), w * h * 3);
    for r in 0..h {
        let row = &pixels[r * w * 3..(r + 1) * w * 3];
        assert!(row.iter().all(|&b| b == (h - 1 - r) as u8), "row {}", r);
    }
}

#[test]
fn test_ppm_header_text() {
    assert_eq!(ppm_header(640, 480), "P6 640 480 255\n");
}

#[test]
fn test_ppm_segments_share_source_memory() {
    let image = row_indexed(3, 4);
    let frame = encode_ppm(FrameKind::Image, "nv>image -bytes", &image).unwrap();

    // header + one segment per row
    assert_eq!(frame.segments().len(), 1 + 4);
    let source = image.data.as_ptr() as usize..image.data.as_ptr() as usize + image.data.len();
    for segment in &frame.segments()[1..] {
        assert!(source.contains(&(segment.as_ptr() as usize)));
    }
}

#[test]
fn test_ppm_from_bgra_source() {
    let image = solid(2, 2, PixelOrder::Bgr, &[10, 20, 30, 255]);
    let frame = encode_ppm(FrameKind::Image, "nv>image -bytes", &image).unwrap();
    let body = frame.payload_bytes();
    let pixels = &body[ppm_header(2, 2).len()..];

    assert_eq!(pixels.len(), 2 * 2 * 3);
    assert_eq!(&pixels[..3], &[30, 20, 10]);
}

// =============================================================================
// TGA Tests
// =============================================================================

#[test]
fn test_tga_header_fields() {
    for (w, h, bpp) in [(300usize, 2usize, 3usize), (2, 513, 4)] {
        let image = solid(w, h, PixelOrder::Bgr, &vec![7; bpp]);
        let frame = encode_tga(FrameKind::Image, "nv>image -bytes", &image, bpp).unwrap();
        let body = frame.payload_bytes();

        assert_eq!(body.len(), TGA_HEADER_SIZE + w * h * bpp);
        assert_eq!(body[2], 2);
        assert_eq!(u16::from_le_bytes([body[12], body[13]]) as usize, w);
        assert_eq!(u16::from_le_bytes([body[14], body[15]]) as usize, h);
        assert_eq!(body[16] as usize, bpp * 8);
    }
}

#[test]
fn test_tga_swaps_rgb_sources() {
    let image = solid(2, 1, PixelOrder::Rgb, &[1, 2, 3]);
    let frame = encode_tga(FrameKind::Image, "nv>image -bytes", &image, 3).unwrap();
    let body = frame.payload_bytes();

    assert_eq!(&body[TGA_HEADER_SIZE..], &[3, 2, 1, 3, 2, 1]);
}

#[test]
fn test_tga_rejects_bad_depth() {
    let image = solid(1, 1, PixelOrder::Bgr, &[0, 0, 0]);
    assert!(encode_tga(FrameKind::Image, "nv>image -bytes", &image, 2).is_err());
}

#[test]
fn test_hand_built_buffer_with_short_data_is_rejected() {
    let image = PixelBuffer {
        width: 4,
        height: 4,
        bytes_per_pixel: 3,
        order: PixelOrder::Rgb,
        data: Bytes::from_static(&[1, 2, 3]),
    };

    assert!(matches!(encode_ppm(FrameKind::Image, "t", &image), Err(VizError::Encode(_))));
    assert!(matches!(encode_tga(FrameKind::Image, "t", &image, 4), Err(VizError::Encode(_))));
    assert!(image.validate().is_err());
}

#[test]
fn test_hand_built_buffer_with_bad_depth_is_rejected() {
    let image = PixelBuffer {
        width: 1,
        height: 1,
        bytes_per_pixel: 0,
        order: PixelOrder::Bgr,
        data: Bytes::new(),
    };
    assert!(matches!(encode_ppm(FrameKind::Image, "t", &image), Err(VizError::Encode(_))));
}

#[test]
fn test_encode_image_dispatches_on_format() {
    let image = solid(2, 2, PixelOrder::Bgr, &[1, 2, 3]);

    let ppm = encode_image(ImageFormat::Ppm, FrameKind::Image, "t", &image, 3).unwrap();
    assert!(ppm.payload_bytes().starts_with(b"P6 2 2 255\n"));

    let tga = encode_image(ImageFormat::Tga, FrameKind::Image, "t", &image, 3).unwrap();
    assert_eq!(tga.payload_len(), TGA_HEADER_SIZE + 12);
}

#[test]
fn test_announced_length_parses_back() {
    let frame = encode_ppm(FrameKind::Image, "nv>image -type image -bytes", &row_indexed(5, 3)).unwrap();
    let (line, body) = split_frame(&frame.to_bytes());

    let parsed = ResponseLine::parse(&line).unwrap();
    assert_eq!(parsed.kind, FrameKind::Image);
    assert_eq!(parsed.byte_len, Some(body.len()));
}

// =============================================================================
// Error / Ack Tests
// =============================================================================

#[test]
fn test_error_frame_layout() {
    let frame = encode_error("VizServer", 4, "bad operation \"zap\"");
    let (line, body) = split_frame(&frame.to_bytes());

    let expected = "VizServer Server Error: bad operation \"zap\"\n";
    assert_eq!(line, format!("nv>viserror -type error -token 4 -bytes {}", expected.len()));
    assert_eq!(body, expected.as_bytes());
    assert_eq!(frame.kind(), FrameKind::Error);
}

#[test]
fn test_ack_is_single_line() {
    let frame = encode_ack(12);
    assert_eq!(frame.to_bytes(), b"nv>ok -token 12\n");
    assert_eq!(frame.payload_len(), 0);
}

// =============================================================================
// File Tests
// =============================================================================

#[test]
fn test_save_frame_files() {
    let dir = tempdir().unwrap();
    let image = row_indexed(4, 3);

    let ppm_path = dir.path().join("frame.ppm");
    save_ppm_file(&ppm_path, &image).unwrap();
    let ppm = fs::read(&ppm_path).unwrap();
    assert!(ppm.starts_with(b"P6 4 3 255\n"));
    assert_eq!(ppm.len(), ppm_header(4, 3).len() + 4 * 3 * 3);

    let tga_path = dir.path().join("frame.tga");
    save_tga_file(&tga_path, &image, 4).unwrap();
    let tga = fs::read(&tga_path).unwrap();
    assert_eq!(tga.len(), TGA_HEADER_SIZE + 4 * 3 * 4);
    assert_eq!(tga[16], 32);
}
