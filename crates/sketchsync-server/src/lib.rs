//! SketchSync Relay Server
//!
//! Keeps one shared scene and relays canonical edits between participants
//! over a newline-delimited text protocol.
//!
//! ## Protocol
//!
//! One command per line, decoded by [`sketchsync_core::protocol`]:
//! ```text
//! add rectangle 10 10 50 50 16711680     request, server assigns the id
//! add rectangle 1 10 10 50 50 16711680   broadcast, id included
//! move 1 5 -5
//! recolor 1 255
//! delete 1
//! ```
//!
//! A new connection first receives one `add` per live shape, then every
//! broadcast from that point on.

pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod registry;
pub mod server;
pub mod state;

pub use client::SketchClient;
pub use config::ServerConfig;
pub use error::{ConfigError, ServerError, ServerResult};
pub use handler::ConnectionHandler;
pub use registry::{ConnId, ConnectionRegistry};
pub use server::SketchServer;
pub use state::AppState;
