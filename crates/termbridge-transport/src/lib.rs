//! Transport layer for the terminal bridge.
//!
//! Provides:
//! - Wire protocol (request bodies, NDJSON decoding)
//! - Console model shared by terminal front-ends
//! - HTTP server routes (feature: http)
//! - HTTP client (feature: client)
//! - crossterm key mapping (feature: tui)

pub mod console;
pub mod protocol;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "client")]
pub mod client;

#[cfg(feature = "tui")]
pub mod tui;

pub use console::{ConsoleAction, ConsoleKey, ConsoleState, LineEditor, Scrollback};
pub use protocol::{
    DecodeError, ExecRequest, InterruptRequest, NdjsonDecoder, SessionInfo, SessionQuery,
    StdinRequest, Success,
};
