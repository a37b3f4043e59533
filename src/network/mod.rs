//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread polling a non-blocking listener
//! - One thread per connection, each with its own renderer
//! - Sessions run through `ServerLoop`

mod server;
mod connection;

pub use server::{RendererFactory, Server, SharedEvaluator};
pub use connection::Connection;
