//! huddle daemon - matchmaking queue, match negotiation and broadcast server
//!
//! This crate provides the coordination layer between "I want to play" and
//! "the game starts":
//! - `lobby` - Connection registry, matchmaking queue and match formation
//! - `negotiation` - Per-match actors running color/ready negotiation
//! - `broadcast` - Fan-out of notifications to connection outboxes
//! - `server` - TCP server speaking newline-delimited JSON
//! - `config` - TOML configuration
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       huddled daemon                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  HuddleServer   │────▶│        LobbyActor           │   │
//! │  │     (TCP)       │     │ (registry, queue, matches)  │   │
//! │  └────────┬────────┘     └──────┬───────────────┬──────┘   │
//! │           │                     │ spawns        │ events   │
//! │           ▼                     ▼               ▼          │
//! │  ┌─────────────────┐     ┌─────────────┐ ┌──────────────┐  │
//! │  │ConnectionHandler│◀────│ MatchActor  │ │  broadcast   │  │
//! │  │ (outbox+writer) │     │ (per match) │ │  (handoff)   │  │
//! │  └─────────────────┘     └─────────────┘ └──────────────┘  │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod broadcast;
pub mod config;
pub mod lobby;
pub mod negotiation;
pub mod server;
