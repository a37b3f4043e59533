//! Built-in command set
//!
//! ```text
//! clientinfo ?args?
//! dataset add <name> data follows <N>
//! dataset delete ?name...?
//! dataset names
//! imgflush
//! legend <name> <width> <height>
//! screen bgcolor <r> <g> <b>
//! screen size <width> <height>
//! ```

use crate::command::{Interpreter, OpSpec, OpTable, Outcome};
use crate::error::{Result, VizError};
use crate::protocol::{Frame, FrameKind};

use super::context::ServerContext;

/// Interpreter loaded with every built-in command
pub fn interpreter() -> Interpreter<ServerContext> {
    Interpreter::new(commands())
}

/// Top-level command table
///
/// Top-level names must be spelled out; sub-operations may be abbreviated.
pub fn commands() -> OpTable<ServerContext> {
    OpTable::new(
        0,
        vec![
            OpSpec::new("clientinfo", 10, 1, 0, "?args?", client_info),
            OpSpec::nested("dataset", 7, dataset_ops()),
            OpSpec::new("imgflush", 8, 1, 1, "", img_flush),
            OpSpec::new("legend", 6, 4, 4, "name width height", legend),
            OpSpec::nested("screen", 6, screen_ops()),
        ],
    )
}

fn dataset_ops() -> OpTable<ServerContext> {
    OpTable::new(
        1,
        vec![
            OpSpec::new("add", 1, 6, 6, "name data follows nBytes", dataset_add),
            OpSpec::new("delete", 1, 2, 0, "?name...?", dataset_delete),
            OpSpec::new("names", 1, 2, 2, "", dataset_names),
        ],
    )
}

fn screen_ops() -> OpTable<ServerContext> {
    OpTable::new(
        1,
        vec![
            OpSpec::new("bgcolor", 1, 5, 5, "r g b", screen_bgcolor),
            OpSpec::new("size", 1, 4, 4, "width height", screen_size),
        ],
    )
}

// =============================================================================
// Handlers
// =============================================================================

fn client_info(_ctx: &mut ServerContext, argv: &[String]) -> Result<Outcome> {
    tracing::info!("Client info: {}", argv[1..].join(" "));
    Ok(Outcome::ok())
}

fn dataset_add(ctx: &mut ServerContext, argv: &[String]) -> Result<Outcome> {
    let name = &argv[2];
    if argv[3] != "data" || argv[4] != "follows" {
        return Err(VizError::Command(format!(
            "bad dataset add \"{} {}\": should be \"data follows nBytes\"",
            argv[3], argv[4]
        )));
    }
    let len = argv[5]
        .parse::<usize>()
        .map_err(|_| VizError::MalformedLength(argv[5].clone()))?;

    let data = ctx.read_payload(len)?;
    ctx.renderer_mut().add_dataset(name, data)?;
    Ok(Outcome::ok())
}

fn dataset_delete(ctx: &mut ServerContext, argv: &[String]) -> Result<Outcome> {
    let names = &argv[2..];
    if names.is_empty() {
        ctx.renderer_mut().clear_datasets();
        return Ok(Outcome::ok());
    }
    for name in names {
        ctx.renderer_mut().delete_dataset(name)?;
    }
    Ok(Outcome::ok())
}

fn dataset_names(ctx: &mut ServerContext, _argv: &[String]) -> Result<Outcome> {
    let names = ctx.renderer().dataset_names().join(" ");
    ctx.send(Frame::line(FrameKind::Data, format!("nv>dataset names {{{}}}", names)))?;
    Ok(Outcome::Ok(names))
}

fn img_flush(ctx: &mut ServerContext, _argv: &[String]) -> Result<Outcome> {
    ctx.renderer_mut().invalidate();
    Ok(Outcome::Flush)
}

fn legend(ctx: &mut ServerContext, argv: &[String]) -> Result<Outcome> {
    let name = &argv[1];
    let width = parse_int(&argv[2])?;
    let height = parse_int(&argv[3])?;

    let legend = ctx.renderer_mut().render_legend(name, width, height)?;
    let tag = format!("nv>legend {} {} {}", name, legend.min, legend.max);
    ctx.send_image(FrameKind::Legend, &tag, &legend.image)?;
    Ok(Outcome::ok())
}

fn screen_bgcolor(ctx: &mut ServerContext, argv: &[String]) -> Result<Outcome> {
    let rgb = [
        parse_float(&argv[2])?,
        parse_float(&argv[3])?,
        parse_float(&argv[4])?,
    ];
    ctx.renderer_mut().set_background(rgb)?;
    Ok(Outcome::ok())
}

fn screen_size(ctx: &mut ServerContext, argv: &[String]) -> Result<Outcome> {
    let width = parse_int(&argv[2])?;
    let height = parse_int(&argv[3])?;
    ctx.renderer_mut().set_window_size(width, height)?;
    Ok(Outcome::ok())
}

// =============================================================================
// Argument Parsing
// =============================================================================

fn parse_int(word: &str) -> Result<usize> {
    word.parse()
        .map_err(|_| VizError::Command(format!("expected integer but got \"{}\"", word)))
}

fn parse_float(word: &str) -> Result<f32> {
    word.parse().map_err(|_| {
        VizError::Command(format!("expected floating-point number but got \"{}\"", word))
    })
}
