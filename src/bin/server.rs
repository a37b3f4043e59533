//! vizserver Binary
//!
//! Serves render sessions over TCP, or a single session on stdin/stdout.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use vizserver::engine::interpreter;
use vizserver::network::{RendererFactory, Server, SharedEvaluator};
use vizserver::protocol::ImageFormat;
use vizserver::{Config, Renderer, ServerLoop, TestPatternRenderer};

/// vizserver
#[derive(Parser, Debug)]
#[command(name = "vizserver")]
#[command(about = "Remote render server streaming images to a client")]
#[command(version)]
struct Args {
    /// Serve one session on stdin/stdout instead of listening
    #[arg(long)]
    stdio: bool,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:2000")]
    listen: String,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "64")]
    max_connections: usize,

    /// Image frame encoding (ppm or tga)
    #[arg(short, long, default_value = "ppm")]
    format: ImageFormat,

    /// Bytes per pixel for TGA frames (3 or 4)
    #[arg(long, default_value = "3")]
    tga_bpp: usize,

    /// Write frames on the command thread instead of a writer thread
    #[arg(long)]
    sync: bool,

    /// Render once per burst of buffered statements
    #[arg(long)]
    coalesce: bool,

    /// Name reported in the greeting and in error messages
    #[arg(long, default_value = "VizServer")]
    name: String,

    /// Also save every image frame into this directory
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Initial window width
    #[arg(long, default_value = "500")]
    width: usize,

    /// Initial window height
    #[arg(long, default_value = "500")]
    height: usize,

    /// Read timeout in milliseconds (0 = none)
    #[arg(long, default_value = "0")]
    read_timeout_ms: u64,
}

fn main() {
    // Logs go to stderr; stdout may be the protocol stream
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vizserver=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::info!("vizserver v{}", vizserver::VERSION);

    let mut builder = Config::builder()
        .server_name(&args.name)
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .image_format(args.format)
        .tga_bytes_per_pixel(args.tga_bpp)
        .threaded(!args.sync)
        .coalesce_renders(args.coalesce)
        .read_timeout_ms(args.read_timeout_ms);
    if let Some(dir) = &args.dump_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::error!("Cannot create dump directory {}: {}", dir.display(), e);
            std::process::exit(1);
        }
        builder = builder.frame_dump_dir(dir);
    }
    let config = builder.build();

    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        std::process::exit(1);
    }

    let (width, height) = (args.width, args.height);
    let renderers: RendererFactory =
        Arc::new(move || Box::new(TestPatternRenderer::new(width, height)) as Box<dyn Renderer>);

    if args.stdio {
        tracing::info!("Serving a single session on stdin/stdout");
        let evaluator = interpreter();
        let result = ServerLoop::run(
            config,
            Box::new(std::io::stdin()),
            Box::new(std::io::stdout()),
            renderers(),
            &evaluator,
        );
        if let Err(e) = result {
            tracing::error!("Session failed: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let evaluator: SharedEvaluator = Arc::new(interpreter());
    let server = match Server::bind(config, evaluator, renderers) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
