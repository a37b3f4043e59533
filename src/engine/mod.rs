//! Engine Module
//!
//! Runs one render session over an input and an output stream.
//!
//! ## Session State Machine
//! ```text
//!   ┌──────────────────┐  line   ┌────────────────────┐
//!   │ AWAIT_STATEMENT  │────────▶│ STATEMENT_COMPLETE │
//!   └──────────────────┘         └─────────┬──────────┘
//!            ▲                             │
//!            │                             ▼
//!   ┌────────┴─────────┐         ┌────────────────────┐
//!   │ ENQUEUE / WRITE  │◀────────│ DISPATCH ─▶ RENDER │
//!   └──────────────────┘ encode  └────────────────────┘
//!
//!   EndFile or fatal error ──▶ CLOSED
//! ```
//!
//! ## Threads
//! - Synchronous: one thread does everything
//! - Threaded: the caller reads, dispatches and renders; a writer thread
//!   drains the response channel onto the output

mod builtins;
mod context;
mod server_loop;

pub use builtins::{commands, interpreter};
pub use context::{
    Responder, ServerContext, SessionInput, SessionOutput, SessionStats, SharedStats,
};
pub use server_loop::ServerLoop;
