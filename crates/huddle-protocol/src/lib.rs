//! huddle protocol - wire protocol for daemon communication
//!
//! This crate provides the message types exchanged between game clients and
//! the coordination daemon: inbound intents (`ClientMessage`) and outbound
//! notifications (`ServerMessage`), framed as newline-delimited JSON.

pub mod message;
pub mod version;

pub use message::{ClientMessage, MessageType, ServerMessage};
pub use version::ProtocolVersion;
