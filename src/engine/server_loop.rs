//! Server loop
//!
//! Drives one session: read a statement, dispatch it, render, encode and
//! hand the frames to the output. In threaded mode a writer thread owns the
//! output stream and drains the response channel; otherwise frames are
//! written on the calling thread.

use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;

use crate::channel::ResponseChannel;
use crate::command::{CommandEvaluator, Outcome, StatementBuffer};
use crate::config::Config;
use crate::error::{Result, VizError};
use crate::protocol::{encode_ack, encode_error, Frame, FrameKind, ReadOutcome};
use crate::renderer::Renderer;

use super::context::{
    Responder, ServerContext, SessionInput, SessionOutput, SessionStats, SharedStats,
};

/// Name of the writer thread in threaded mode
const WRITER_THREAD_NAME: &str = "vizserver-writer";

/// Session driver
pub struct ServerLoop;

impl ServerLoop {
    /// Serve one session until the input ends or a fatal error occurs
    ///
    /// Returns the session statistics; a fatal error is returned after the
    /// writer (if any) has drained and stopped.
    pub fn run<E>(
        config: Config,
        input: SessionInput,
        output: SessionOutput,
        renderer: Box<dyn Renderer>,
        evaluator: &E,
    ) -> Result<SessionStats>
    where
        E: CommandEvaluator<ServerContext> + ?Sized,
    {
        let server_name = config.server_name.clone();
        let stats: SharedStats = Arc::new(Mutex::new(SessionStats::new()));

        let result = if config.threaded {
            Self::run_threaded(config, input, output, renderer, evaluator, &stats)
        } else {
            Self::run_sync(config, input, output, renderer, evaluator, &stats)
        };

        let stats = stats.lock().clone();
        let status = if result.is_ok() { 0 } else { 1 };
        tracing::info!("{}", stats.summary(&server_name, status));

        result.map(|_| stats)
    }

    fn run_sync<E>(
        config: Config,
        input: SessionInput,
        output: SessionOutput,
        renderer: Box<dyn Renderer>,
        evaluator: &E,
        stats: &SharedStats,
    ) -> Result<()>
    where
        E: CommandEvaluator<ServerContext> + ?Sized,
    {
        tracing::debug!("Starting synchronous session");
        let responder = Responder::Direct(BufWriter::new(output));
        let mut ctx = ServerContext::new(config, input, renderer, responder, Arc::clone(stats));

        let result = drive(&mut ctx, evaluator);
        let flushed = ctx.flush();
        result.and(flushed)
    }

    fn run_threaded<E>(
        config: Config,
        input: SessionInput,
        output: SessionOutput,
        renderer: Box<dyn Renderer>,
        evaluator: &E,
        stats: &SharedStats,
    ) -> Result<()>
    where
        E: CommandEvaluator<ServerContext> + ?Sized,
    {
        tracing::debug!("Starting threaded session");
        let channel = ResponseChannel::new();

        let writer = {
            let channel = channel.clone();
            let stats = Arc::clone(stats);
            thread::Builder::new()
                .name(WRITER_THREAD_NAME.to_string())
                .spawn(move || writer_loop(channel, output, stats))?
        };

        let responder = Responder::Queued(channel.clone());
        let mut ctx = ServerContext::new(config, input, renderer, responder, Arc::clone(stats));
        let result = drive(&mut ctx, evaluator);

        channel.shutdown();
        let written = writer
            .join()
            .map_err(|_| VizError::Protocol("writer thread panicked".to_string()))?;

        // A failed write shuts the channel, which surfaces on the reader as
        // ChannelClosed; the write error is the one worth reporting.
        match (result, written) {
            (_, Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Ok(()), Ok(())) => Ok(()),
        }
    }
}

// =============================================================================
// Reader Side
// =============================================================================

/// Statement loop; returns on end of input or a fatal error
fn drive<E>(ctx: &mut ServerContext, evaluator: &E) -> Result<()>
where
    E: CommandEvaluator<ServerContext> + ?Sized,
{
    if ctx.config().send_greeting {
        let greeting = format!("{} {}", ctx.config().server_name, crate::VERSION);
        ctx.send(Frame::line(FrameKind::Data, greeting))?;
    }

    let mut statement = StatementBuffer::new();
    let mut render_pending = false;

    loop {
        match ctx.input().next_line()? {
            ReadOutcome::EndFile => {
                if statement.is_pending() {
                    tracing::debug!(
                        "Discarding incomplete statement at end of input: {:?}",
                        statement.pending()
                    );
                }
                if render_pending {
                    finish_batch(ctx)?;
                }
                break;
            }
            ReadOutcome::Continue => {
                // Input went quiet: deliver whatever a coalesced batch owes
                if render_pending {
                    finish_batch(ctx)?;
                    render_pending = false;
                }
            }
            ReadOutcome::Data(line) => {
                let mut flush = false;
                if let Some(text) = statement.push_line(&line, |s| evaluator.is_complete(s)) {
                    if !text.trim().is_empty() {
                        let outcome = execute(ctx, evaluator, &text)?;
                        render_pending = true;
                        flush = outcome == Some(Outcome::Flush);
                    }
                }

                // Blank lines and partial statements still settle a deferred batch
                if render_pending {
                    let defer = ctx.config().coalesce_renders
                        && !flush
                        && ctx.input().is_line_available();
                    if defer {
                        tracing::trace!("Deferring render, more lines buffered");
                    } else {
                        finish_batch(ctx)?;
                        render_pending = false;
                    }
                }
            }
        }
    }

    Ok(())
}

/// Evaluate one statement; per-statement failures become error frames
fn execute<E>(ctx: &mut ServerContext, evaluator: &E, text: &str) -> Result<Option<Outcome>>
where
    E: CommandEvaluator<ServerContext> + ?Sized,
{
    tracing::trace!("Executing statement {:?}", text.trim_end());
    let start = Instant::now();
    let result = evaluator.evaluate(ctx, text);
    ctx.record_command(start.elapsed());

    match result {
        Ok(outcome) => Ok(Some(outcome)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::debug!("Statement failed: {}", e);
            send_error(ctx, &e)?;
            Ok(None)
        }
    }
}

/// Render if the scene changed, otherwise acknowledge the batch
fn finish_batch(ctx: &mut ServerContext) -> Result<()> {
    match ctx.renderer_mut().render() {
        Ok(Some(image)) => {
            let tag = image_tag(ctx.renderer().zoom_region());
            match ctx.send_image(FrameKind::Image, &tag, &image) {
                Err(e) if !e.is_fatal() => {
                    tracing::warn!("Encoding failed: {}", e);
                    send_error(ctx, &e)
                }
                sent => sent,
            }
        }
        Ok(None) => {
            let token = ctx.token();
            ctx.send(encode_ack(token))
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            tracing::warn!("Render failed: {}", e);
            send_error(ctx, &e)
        }
    }
}

fn send_error(ctx: &mut ServerContext, error: &VizError) -> Result<()> {
    let frame = encode_error(&ctx.config().server_name, ctx.token(), &error.to_string());
    ctx.send(frame)
}

/// `nv>image -type image [-bbox {x y w h}] -bytes`
fn image_tag(zoom: Option<[f64; 4]>) -> String {
    match zoom {
        Some([x, y, w, h]) => format!("nv>image -type image -bbox {{{} {} {} {}}} -bytes", x, y, w, h),
        None => "nv>image -type image -bytes".to_string(),
    }
}

// =============================================================================
// Writer Side
// =============================================================================

/// Drain the channel onto the output until the poison pill arrives
///
/// A write failure shuts the channel so the reader stops at its next
/// enqueue.
fn writer_loop(channel: ResponseChannel, output: SessionOutput, stats: SharedStats) -> Result<()> {
    let mut writer = BufWriter::new(output);

    while let Some(frame) = channel.dequeue() {
        let written = frame.write_to(&mut writer).and_then(|_| writer.flush());
        if let Err(e) = written {
            tracing::warn!("Writer failed after {} queued frames: {}", channel.len(), e);
            channel.shutdown();
            return Err(e.into());
        }
        stats.lock().n_bytes_written += frame.len() as u64;
    }

    tracing::debug!("Writer drained, exiting");
    writer.flush()?;
    Ok(())
}
