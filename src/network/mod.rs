//! Network Layer
//!
//! Binary TCP protocol between the authoritative server and its clients.
//! This layer is **non-deterministic** - all game logic runs through `game/`.

pub mod client;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{ClientConfig, ClientError, GameClient};
pub use connection::{Connection, ConnectionId};
pub use protocol::{MessageTag, ProtocolError};
pub use server::{ConfigError, GameServer, GameServerError, ServerConfig};
pub use transport::{Event, Hub, Link};
