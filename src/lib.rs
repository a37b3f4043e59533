//! # vizserver
//!
//! Command and streaming core of a remote render server:
//! - Incremental statement reader with raw payload support
//! - Abbreviation-aware command tables
//! - PPM/TGA frame encoding with zero-copy row segments
//! - Optional writer thread fed by a response channel
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │              TCP Server / stdio session                      │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ statements + raw payloads
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     ServerLoop                               │
//! │        ReadBuffer ─▶ Interpreter ─▶ OpTable handlers        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │  Renderer   │─────────▶│   Encoder   │
//!   │   (scene)   │  pixels  │  (PPM/TGA)  │
//!   └─────────────┘          └──────┬──────┘
//!                                   │ frames
//!                                   ▼
//!                     ┌───────────────────────────┐
//!                     │ ResponseChannel ─▶ writer │
//!                     └───────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod command;
pub mod channel;
pub mod renderer;
pub mod engine;
pub mod network;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{VizError, Result};
pub use config::Config;
pub use channel::ResponseChannel;
pub use engine::{ServerContext, ServerLoop, SessionStats};
pub use renderer::{Renderer, TestPatternRenderer};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of vizserver
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
