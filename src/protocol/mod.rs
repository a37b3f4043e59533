//! Protocol Module
//!
//! Defines the wire protocol between render client and server.
//!
//! ## Inbound (client → server)
//! ```text
//! screen size 640 480\n
//! dataset add vol1 data follows 5\n
//! <5 raw bytes>
//! legend vol1 256 20\n
//! ```
//! Statements are newline-terminated text and may span several lines while
//! quotes or braces are open. A statement ending in `follows <N>` is followed
//! by exactly N raw bytes.
//!
//! ## Outbound (server → client)
//! ```text
//! ┌────────────────────────────────┬───────────────────────────────┐
//! │ "<tag> <len>\n"                │ len bytes (header + payload)  │
//! └────────────────────────────────┴───────────────────────────────┘
//! ```
//!
//! ### Tags
//! - `nv>image -type image [-bbox {x y w h}] -bytes`
//! - `nv>legend <name> <min> <max>`
//! - `nv>viserror -type error -token <n> -bytes`
//! - `nv>ok -token <n>` (no payload)

mod read_buffer;
mod frame;
mod encoder;
mod response;

pub use read_buffer::{ReadBuffer, ReadOutcome, ReadStatus};
pub use frame::{Frame, FrameKind};
pub use encoder::{
    encode_ack, encode_error, encode_image, encode_ppm, encode_tga, ppm_header, save_ppm_file,
    save_tga_file, tga_header, ImageFormat, PixelBuffer, PixelOrder, PPM_MAXVAL, TGA_HEADER_SIZE,
};
pub use response::ResponseLine;
