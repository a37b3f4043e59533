//! vizserver CLI Client
//!
//! Sends a command script to a server and collects what comes back: images
//! and legends are saved to disk, acknowledgements and errors are printed.

use std::fs;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::{Path, PathBuf};
use std::thread;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use vizserver::protocol::{FrameKind, ReadBuffer, ReadOutcome, ResponseLine};
use vizserver::{Result, VizError};

/// vizserver CLI
#[derive(Parser, Debug)]
#[command(name = "vizserver-cli")]
#[command(about = "Send a command script to a vizserver and save the frames it returns")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:2000")]
    server: String,

    /// Command script (stdin when omitted)
    script: Option<PathBuf>,

    /// Upload a file as a data set before the script runs (NAME=PATH)
    #[arg(short, long, value_parser = parse_upload)]
    dataset: Vec<(String, PathBuf)>,

    /// Directory for received images
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,
}

fn parse_upload(arg: &str) -> std::result::Result<(String, PathBuf), String> {
    arg.split_once('=')
        .map(|(name, path)| (name.to_string(), PathBuf::from(path)))
        .ok_or_else(|| format!("expected NAME=PATH, got \"{}\"", arg))
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let mut request = Vec::new();
    for (name, path) in &args.dataset {
        let data = fs::read(path)?;
        request.extend_from_slice(
            format!("dataset add {} data follows {}\n", name, data.len()).as_bytes(),
        );
        request.extend_from_slice(&data);
    }
    match &args.script {
        Some(path) => request.extend_from_slice(&fs::read(path)?),
        None => {
            std::io::stdin().read_to_end(&mut request)?;
        }
    }

    fs::create_dir_all(&args.output_dir)?;

    let stream = TcpStream::connect(&args.server)?;
    tracing::debug!("Connected to {}", args.server);
    exchange(stream, request, &args.output_dir)?;
    Ok(())
}

/// Send the request from a separate thread while responses are read
///
/// A server in synchronous mode stops reading while it writes a frame, so
/// the request cannot be written up front. Returns the number of images
/// and legends saved.
fn exchange(stream: TcpStream, request: Vec<u8>, output_dir: &Path) -> Result<usize> {
    let mut upstream = stream.try_clone()?;
    let sender = thread::Builder::new()
        .name("vizserver-cli-sender".to_string())
        .spawn(move || -> std::io::Result<()> {
            upstream.write_all(&request)?;
            upstream.shutdown(Shutdown::Write)
        })?;

    let received = receive(ReadBuffer::new(stream), output_dir);
    let sent = sender
        .join()
        .map_err(|_| VizError::Protocol("sender thread panicked".to_string()))?;

    // The server hanging up early also breaks the send; report what it said
    let saved = received?;
    sent?;
    Ok(saved)
}

fn receive<R: Read>(mut input: ReadBuffer<R>, output_dir: &Path) -> Result<usize> {
    let mut saved = 0usize;

    loop {
        let line = match input.next_line()? {
            ReadOutcome::Data(line) => line,
            ReadOutcome::Continue => continue,
            ReadOutcome::EndFile => break,
        };
        let text = String::from_utf8_lossy(&line);
        let text = text.trim_end();

        if !text.starts_with("nv>") {
            println!("server: {}", text);
            continue;
        }

        let response = ResponseLine::parse(text)?;
        let payload = match response.byte_len {
            Some(len) => match input.read_exact(len)? {
                ReadOutcome::Data(bytes) => bytes.to_vec(),
                _ => return Err(VizError::ShortPayload { expected: len }),
            },
            None => Vec::new(),
        };

        match response.kind {
            FrameKind::Image | FrameKind::Legend => {
                saved += 1;
                let prefix = if response.kind == FrameKind::Image { "image" } else { "legend" };
                let path = image_path(output_dir, prefix, saved, &payload);
                fs::write(&path, &payload)?;
                println!("{} -> {}", response.tag, path.display());
            }
            FrameKind::Error => eprint!("{}", String::from_utf8_lossy(&payload)),
            FrameKind::Ok | FrameKind::Data => println!("{}", response.tag),
        }
    }

    Ok(saved)
}

/// `<prefix>-NNNN.ppm` or `.tga`, judged from the payload's magic
fn image_path(dir: &Path, prefix: &str, seq: usize, payload: &[u8]) -> PathBuf {
    let extension = if payload.starts_with(b"P6") { "ppm" } else { "tga" };
    dir.join(format!("{}-{:04}.{}", prefix, seq, extension))
}
