//! Engine Tests
//!
//! Tests for whole sessions driven over in-memory streams, in both
//! synchronous and threaded mode.

use std::io::{self, Cursor, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::tempdir;
use vizserver::engine::interpreter;
use vizserver::protocol::{FrameKind, ImageFormat, ReadBuffer, ReadOutcome, ResponseLine};
use vizserver::protocol::PixelBuffer;
use vizserver::renderer::Legend;
use vizserver::{Config, Renderer, ServerLoop, SessionStats, TestPatternRenderer, VizError};

// =============================================================================
// Helper Functions
// =============================================================================

/// Output sink the test can inspect after the session thread is gone
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().clone()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Output that refuses every write
struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::ErrorKind::BrokenPipe.into())
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::ErrorKind::BrokenPipe.into())
    }
}

/// Renderer whose frames lose all but their first pixel
struct TruncatingRenderer(TestPatternRenderer);

impl Renderer for TruncatingRenderer {
    fn render(&mut self) -> vizserver::Result<Option<PixelBuffer>> {
        Ok(self.0.render()?.map(|image| PixelBuffer {
            data: image.data.slice(..3),
            ..image
        }))
    }

    fn invalidate(&mut self) {
        self.0.invalidate()
    }

    fn set_window_size(&mut self, width: usize, height: usize) -> vizserver::Result<()> {
        self.0.set_window_size(width, height)
    }

    fn set_background(&mut self, rgb: [f32; 3]) -> vizserver::Result<()> {
        self.0.set_background(rgb)
    }

    fn add_dataset(&mut self, name: &str, data: bytes::Bytes) -> vizserver::Result<()> {
        self.0.add_dataset(name, data)
    }

    fn delete_dataset(&mut self, name: &str) -> vizserver::Result<()> {
        self.0.delete_dataset(name)
    }

    fn clear_datasets(&mut self) {
        self.0.clear_datasets()
    }

    fn dataset_names(&self) -> Vec<String> {
        self.0.dataset_names()
    }

    fn render_legend(&mut self, name: &str, width: usize, height: usize) -> vizserver::Result<Legend> {
        self.0.render_legend(name, width, height)
    }
}

fn config(threaded: bool) -> Config {
    Config::builder().threaded(threaded).send_greeting(false).build()
}

fn run_session(config: Config, input: &[u8]) -> (vizserver::Result<SessionStats>, Vec<u8>) {
    let output = SharedBuf::default();
    let result = ServerLoop::run(
        config,
        Box::new(Cursor::new(input.to_vec())),
        Box::new(output.clone()),
        Box::new(TestPatternRenderer::new(4, 3)),
        &interpreter(),
    );
    (result, output.contents())
}

/// Decode `<tag> <len>\n<payload>` responses
fn responses(bytes: &[u8]) -> Vec<(ResponseLine, Vec<u8>)> {
    let mut input = ReadBuffer::new(Cursor::new(bytes.to_vec()));
    let mut out = Vec::new();
    loop {
        let line = match input.next_line().unwrap() {
            ReadOutcome::Data(line) => line,
            ReadOutcome::Continue => continue,
            ReadOutcome::EndFile => break,
        };
        let parsed = ResponseLine::parse(&String::from_utf8_lossy(&line)).unwrap();
        let payload = match parsed.byte_len {
            Some(len) => match input.read_exact(len).unwrap() {
                ReadOutcome::Data(bytes) => bytes.to_vec(),
                other => panic!("Truncated payload: {:?}", other),
            },
            None => Vec::new(),
        };
        out.push((parsed, payload));
    }
    out
}

fn kinds(responses: &[(ResponseLine, Vec<u8>)]) -> Vec<FrameKind> {
    responses.iter().map(|(line, _)| line.kind).collect()
}

// =============================================================================
// Session Tests
// =============================================================================

#[test]
fn test_greeting_comes_first() {
    let config = Config::builder().threaded(false).build();
    let (result, output) = run_session(config, b"");

    assert!(result.is_ok());
    assert_eq!(output, format!("VizServer {}\n", vizserver::VERSION).into_bytes());
}

#[test]
fn test_render_then_ack() {
    for threaded in [false, true] {
        let (result, output) = run_session(config(threaded), b"screen size 4 3\nscreen size 4 3\n");
        let stats = result.unwrap();
        let responses = responses(&output);

        assert_eq!(kinds(&responses), vec![FrameKind::Image, FrameKind::Ok]);
        assert_eq!(responses[0].0.tag, "nv>image -type image -bytes");
        assert!(responses[0].1.starts_with(b"P6 4 3 255\n"));
        assert_eq!(responses[0].1.len(), 11 + 4 * 3 * 3);
        assert_eq!(responses[1].0.tag, "nv>ok -token 2");

        assert_eq!(stats.n_commands, 2);
        assert_eq!(stats.n_frames, 1);
        assert_eq!(stats.n_bytes_written as usize, output.len());
    }
}

#[test]
fn test_sync_and_threaded_produce_same_bytes() {
    let script = b"screen size 2 2\nscreen bgcolor 1 0 0\nbogus\nscreen s 3 3\n";
    let (sync_result, sync_output) = run_session(config(false), script);
    let (threaded_result, threaded_output) = run_session(config(true), script);

    assert!(sync_result.is_ok());
    assert!(threaded_result.is_ok());
    assert_eq!(sync_output, threaded_output);
}

#[test]
fn test_unknown_command_sends_error_and_continues() {
    let (result, output) = run_session(config(true), b"bogus\nscreen size 2 2\n");
    assert!(result.is_ok());

    let responses = responses(&output);
    assert_eq!(
        kinds(&responses),
        vec![FrameKind::Error, FrameKind::Image, FrameKind::Image]
    );

    let (line, payload) = &responses[0];
    assert!(line.tag.starts_with("nv>viserror -type error -token 1 -bytes"));
    let message = String::from_utf8_lossy(payload);
    assert!(message.starts_with("VizServer Server Error: bad operation \"bogus\": should be one of..."));
    assert!(message.contains("\n  screen oper ?args?"));
}

#[test]
fn test_wrong_args_reports_usage() {
    let (_, output) = run_session(config(false), b"screen size 2\n");
    let responses = responses(&output);

    assert_eq!(responses[0].0.kind, FrameKind::Error);
    assert_eq!(
        String::from_utf8_lossy(&responses[0].1),
        "VizServer Server Error: wrong # args: should be \"screen size width height\"\n"
    );
}

#[test]
fn test_multi_line_statement() {
    let (result, output) = run_session(config(false), b"clientinfo {name\nviewer} \"ver\n2\"\n");
    let stats = result.unwrap();

    assert_eq!(stats.n_commands, 1);
    assert_eq!(kinds(&responses(&output)), vec![FrameKind::Image]);
}

#[test]
fn test_incomplete_statement_at_eof_is_dropped() {
    let (result, output) = run_session(config(false), b"clientinfo {never closed\n");
    let stats = result.unwrap();

    assert_eq!(stats.n_commands, 0);
    assert!(output.is_empty());
}

// =============================================================================
// Payload Tests
// =============================================================================

#[test]
fn test_dataset_upload_and_names() {
    let (result, output) = run_session(
        config(true),
        b"dataset add vol data follows 5\nABCDEdataset names\n",
    );
    let stats = result.unwrap();
    let responses = responses(&output);

    assert_eq!(
        kinds(&responses),
        vec![FrameKind::Image, FrameKind::Data, FrameKind::Ok]
    );
    assert_eq!(responses[1].0.tag, "nv>dataset names {vol}");
    assert_eq!(stats.n_data_sets, 1);
    assert_eq!(stats.n_data_bytes, 5);
}

#[test]
fn test_dataset_delete_and_abbreviation() {
    let (_, output) = run_session(
        config(false),
        b"dataset add a data follows 1\nxdataset add b data follows 1\nydataset d a\ndataset n\n",
    );
    let responses = responses(&output);
    let names: Vec<&str> = responses
        .iter()
        .filter(|(line, _)| line.kind == FrameKind::Data)
        .map(|(line, _)| line.tag.as_str())
        .collect();

    assert_eq!(names, vec!["nv>dataset names {b}"]);
}

#[test]
fn test_short_payload_is_fatal() {
    for threaded in [false, true] {
        let (result, output) = run_session(config(threaded), b"dataset add vol data follows 100\nabc");
        match result {
            Err(VizError::ShortPayload { expected }) => assert_eq!(expected, 100),
            other => panic!("Expected short payload, got {:?}", other.map(|s| s.n_commands)),
        }
        assert!(output.is_empty());
    }
}

#[test]
fn test_malformed_length_is_fatal() {
    let (result, _) = run_session(config(false), b"dataset add vol data follows lots\nscreen size 2 2\n");
    assert!(matches!(result, Err(VizError::MalformedLength(_))));
}

#[test]
fn test_payload_over_limit_is_fatal() {
    let config = Config::builder()
        .threaded(false)
        .send_greeting(false)
        .max_payload_size(4)
        .build();
    let (result, _) = run_session(config, b"dataset add vol data follows 5\nABCDE");
    assert!(matches!(result, Err(VizError::PayloadTooLarge { size: 5, max: 4 })));
}

#[test]
fn test_bad_follows_keyword_is_not_fatal() {
    let (result, output) = run_session(config(false), b"dataset add vol data arrives 5\n");
    assert!(result.is_ok());
    assert_eq!(responses(&output)[0].0.kind, FrameKind::Error);
}

// =============================================================================
// Render Scheduling Tests
// =============================================================================

#[test]
fn test_every_statement_renders_without_coalescing() {
    let (_, output) = run_session(
        config(false),
        b"screen size 2 2\nscreen bgcolor 1 0 0\nscreen size 3 3\n",
    );
    assert_eq!(
        kinds(&responses(&output)),
        vec![FrameKind::Image, FrameKind::Image, FrameKind::Image]
    );
}

#[test]
fn test_coalescing_renders_once_per_burst() {
    let config = Config::builder()
        .threaded(false)
        .send_greeting(false)
        .coalesce_renders(true)
        .build();
    let (_, output) = run_session(
        config,
        b"screen size 2 2\nscreen bgcolor 1 0 0\nscreen size 3 3\n",
    );
    let responses = responses(&output);

    assert_eq!(kinds(&responses), vec![FrameKind::Image]);
    assert!(responses[0].1.starts_with(b"P6 3 3 255\n"));
}

#[test]
fn test_coalesced_render_survives_trailing_blank_line() {
    for threaded in [false, true] {
        let config = Config::builder()
            .threaded(threaded)
            .send_greeting(false)
            .coalesce_renders(true)
            .build();

        let (result, output) = run_session(config.clone(), b"screen size 2 2\n\n");
        assert!(result.is_ok());
        let frames = responses(&output);
        assert_eq!(kinds(&frames), vec![FrameKind::Image]);
        assert!(frames[0].1.starts_with(b"P6 2 2 255\n"));

        // A statement still open at end of input does not hold the frame back
        let (_, output) = run_session(config, b"screen size 2 2\nscreen {\n");
        assert_eq!(kinds(&responses(&output)), vec![FrameKind::Image]);
    }
}

#[test]
fn test_imgflush_forces_render_inside_burst() {
    let config = Config::builder()
        .threaded(false)
        .send_greeting(false)
        .coalesce_renders(true)
        .build();
    let (_, output) = run_session(config, b"screen size 2 2\nimgflush\nscreen size 3 3\n");
    let responses = responses(&output);

    assert_eq!(kinds(&responses), vec![FrameKind::Image, FrameKind::Image]);
    assert!(responses[0].1.starts_with(b"P6 2 2 255\n"));
    assert!(responses[1].1.starts_with(b"P6 3 3 255\n"));
}

// =============================================================================
// Frame Tests
// =============================================================================

#[test]
fn test_legend_frame() {
    let (_, output) = run_session(
        config(true),
        b"dataset add v data follows 3\n\x07\x03\xc8legend v 8 2\n",
    );
    let responses = responses(&output);

    assert_eq!(
        kinds(&responses),
        vec![FrameKind::Image, FrameKind::Legend, FrameKind::Ok]
    );
    assert_eq!(responses[1].0.tag, "nv>legend v 3 200");
    assert!(responses[1].1.starts_with(b"P6 8 2 255\n"));
}

#[test]
fn test_tga_frames() {
    let config = Config::builder()
        .threaded(false)
        .send_greeting(false)
        .image_format(ImageFormat::Tga)
        .tga_bytes_per_pixel(4)
        .build();
    let (_, output) = run_session(config, b"screen size 5 2\n");
    let responses = responses(&output);

    let payload = &responses[0].1;
    assert_eq!(payload.len(), 18 + 5 * 2 * 4);
    assert_eq!(payload[12], 5);
    assert_eq!(payload[14], 2);
    assert_eq!(payload[16], 32);
}

#[test]
fn test_frames_are_dumped_to_disk() {
    let dir = tempdir().unwrap();
    let config = Config::builder()
        .threaded(true)
        .send_greeting(false)
        .frame_dump_dir(dir.path())
        .build();
    let (result, _) = run_session(config, b"screen size 2 2\nscreen size 3 3\n");
    assert!(result.is_ok());

    let first = std::fs::read(dir.path().join("frame-00001.ppm")).unwrap();
    assert!(first.starts_with(b"P6 2 2 255\n"));
    assert!(dir.path().join("frame-00002.ppm").exists());
}

#[test]
fn test_missing_dump_dir_still_delivers_frames() {
    for threaded in [false, true] {
        let config = Config::builder()
            .threaded(threaded)
            .send_greeting(false)
            .frame_dump_dir("/nonexistent/vizserver/dumps")
            .build();
        let (result, output) = run_session(config, b"screen size 2 2\nscreen size 3 3\n");

        assert_eq!(result.unwrap().n_frames, 2);
        assert_eq!(kinds(&responses(&output)), vec![FrameKind::Image, FrameKind::Image]);
    }
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_encode_failure_sends_error_and_continues() {
    for threaded in [false, true] {
        let output = SharedBuf::default();
        let result = ServerLoop::run(
            config(threaded),
            Box::new(Cursor::new(b"screen size 2 2\nscreen size 3 3\n".to_vec())),
            Box::new(output.clone()),
            Box::new(TruncatingRenderer(TestPatternRenderer::new(4, 3))),
            &interpreter(),
        );
        assert_eq!(result.unwrap().n_commands, 2);

        let responses = responses(&output.contents());
        assert_eq!(kinds(&responses), vec![FrameKind::Error, FrameKind::Error]);
        assert!(responses[0].0.tag.contains("-token 1"));
        assert!(String::from_utf8_lossy(&responses[1].1).contains("pixel buffer is 3 bytes"));
    }
}

#[test]
fn test_broken_output_ends_session() {
    for threaded in [false, true] {
        let result = ServerLoop::run(
            Config::builder().threaded(threaded).build(),
            Box::new(Cursor::new(b"screen size 2 2\nscreen size 3 3\n".to_vec())),
            Box::new(BrokenPipe),
            Box::new(TestPatternRenderer::new(4, 3)),
            &interpreter(),
        );
        match result {
            Err(VizError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("Expected broken pipe, got {:?}", other.map(|s| s.n_commands)),
        }
    }
}
