//! Game Client
//!
//! Mirrors the server's game. Every frame the local controls go out, the
//! press counters reset, and whatever state messages have arrived replace
//! the mirror.

use std::env;
use std::time::Duration;

use tokio::net::ToSocketAddrs;
use tracing::{debug, warn};

use crate::game::input::Controls;
use crate::game::state::{Game, Player};
use crate::network::protocol::{hex_preview, MessageTag, ProtocolError};
use crate::network::server::{env_parse, ConfigError, DEFAULT_PORT};
use crate::network::transport::{Event, Link};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server to connect to, as `host:port`.
    pub server_addr: String,
    /// Frames per second (one controls message each).
    pub send_rate: u32,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Seed for scripted input; random if unset.
    pub seed: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("127.0.0.1:{}", DEFAULT_PORT),
            send_rate: 60,
            log_level: "info".to_string(),
            seed: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from `RPS_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            server_addr: env::var("RPS_SERVER_ADDR").unwrap_or(defaults.server_addr),
            send_rate: env_parse("RPS_SEND_RATE")?.unwrap_or(defaults.send_rate),
            log_level: env::var("RPS_LOG_LEVEL").unwrap_or(defaults.log_level),
            seed: env_parse("RPS_SEED")?,
        };
        if config.send_rate == 0 {
            return Err(ConfigError::InvalidValue("RPS_SEND_RATE", "0".to_string()));
        }
        Ok(config)
    }

    /// Time between frames.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.send_rate.max(1)))
    }
}

/// Client errors. All of them end the session.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server sent something unparseable.
    #[error("Malformed message from server: {0}")]
    Protocol(#[from] ProtocolError),

    /// Server closed the connection.
    #[error("Lost connection to server")]
    ConnectionLost,
}

/// A connected client and its mirror of the game.
pub struct GameClient {
    link: Link,
    controls: Controls,
    game: Game,
}

impl GameClient {
    /// Connect to a server.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let link = Link::connect(addr).await?;
        Ok(Self {
            link,
            controls: Controls::default(),
            game: Game::new(),
        })
    }

    /// Run one frame: send controls, then apply every state message that
    /// arrives within `timeout`.
    ///
    /// Returns the number of state messages applied.
    pub async fn update(&mut self, timeout: Duration) -> Result<usize, ClientError> {
        self.controls.send_controls_message(self.link.connection_mut());
        self.controls.clear_downs();
        self.link.flush();

        let events = self.link.poll(timeout).await;

        let mut applied = 0;
        if events.contains(&Event::DataReceived) {
            applied = self.drain_state()?;
        }
        if events.contains(&Event::Closed) {
            warn!("Server closed the connection");
            return Err(ClientError::ConnectionLost);
        }
        Ok(applied)
    }

    fn drain_state(&mut self) -> Result<usize, ClientError> {
        let connection = self.link.connection_mut();

        let mut applied = 0;
        loop {
            match self.game.recv_state_message(connection) {
                Ok(true) => applied += 1,
                Ok(false) => break,
                Err(e) => {
                    warn!(buffer = %hex_preview(connection.recv_buffer()), "Malformed state: {}", e);
                    return Err(e.into());
                }
            }
        }

        // The server only ever sends state
        if let Some(&tag) = connection.recv_buffer().first() {
            if tag != MessageTag::State as u8 {
                warn!(buffer = %hex_preview(connection.recv_buffer()), "Unexpected message");
                return Err(ProtocolError::UnexpectedTag(tag).into());
            }
        }

        if applied > 1 {
            debug!(applied, "caught up on state messages");
        }
        Ok(applied)
    }

    /// Local controls, sent on the next update.
    pub fn controls(&self) -> &Controls {
        &self.controls
    }

    /// Mutable local controls.
    pub fn controls_mut(&mut self) -> &mut Controls {
        &mut self.controls
    }

    /// Latest mirrored game.
    pub fn game(&self) -> &Game {
        &self.game
    }

    /// This client's own player: the server always sends it first.
    pub fn me(&self) -> Option<&Player> {
        self.game.players().next().map(|(_, p)| p)
    }
}
