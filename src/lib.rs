//! # RPS Triad Game Server
//!
//! Authoritative simulation and wire protocol for a real-time, three-player
//! rock/paper/scissors territory contest. Each player forms a gesture with
//! each hand out of four finger buttons; the gestures fight the neighbouring
//! players' hands and push a shared score point around a triangle.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RPS TRIAD SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/             - Simulation (no I/O)                     │
//! │  ├── input.rs      - Buttons, controls, hand gestures        │
//! │  ├── state.rs      - Players and the game aggregate          │
//! │  ├── tick.rs       - Authoritative simulation step           │
//! │  └── events.rs     - Round events emitted by the tick        │
//! │                                                              │
//! │  network/          - Networking (non-deterministic)          │
//! │  ├── protocol.rs   - Framing, controls and state codecs      │
//! │  ├── connection.rs - Per-peer send/recv byte buffers         │
//! │  ├── transport.rs  - TCP hub/link with polled events         │
//! │  ├── server.rs     - Authoritative server loop               │
//! │  └── client.rs     - Mirroring client loop                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Message Flow
//!
//! Clients capture press edges into their local [`Controls`], encode a
//! controls message and ship it to the server. The server merges those into
//! each player's controls, runs [`Game::update`] once per tick and
//! broadcasts the complete game state back. Clients replace their mirrored
//! [`Game`] with every state message they receive.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::input::{Button, Controls, Hand, HandSide};
pub use game::state::{Game, GameError, Player, PlayerHandle};
pub use game::tick::TickResult;
pub use network::client::{ClientConfig, GameClient};
pub use network::connection::Connection;
pub use network::protocol::{MessageTag, ProtocolError};
pub use network::server::{GameServer, ServerConfig};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate on the server (Hz)
pub const TICK_RATE: u32 = 30;

/// Duration of one server tick in seconds.
pub const TICK_SECONDS: f32 = 1.0 / TICK_RATE as f32;
