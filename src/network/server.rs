//! Authoritative Game Server
//!
//! Owns the one `Game` every client mirrors. Each accepted connection gets
//! a player; its controls messages are merged as they arrive, and every
//! tick the whole state goes back out to everyone.

use std::collections::BTreeMap;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::game::events::GameEvent;
use crate::game::state::{Game, PlayerHandle, PLAYER_COUNT};
use crate::network::connection::ConnectionId;
use crate::network::protocol::{hex_preview, MessageTag, ProtocolError};
use crate::network::transport::{Event, Hub};
use crate::TICK_RATE;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Default listening port.
pub const DEFAULT_PORT: u16 = 15466;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Connections accepted at once; never more than there are seats.
    pub max_connections: usize,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            tick_rate: TICK_RATE,
            max_connections: PLAYER_COUNT,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from `RPS_*` environment variables, falling back
    /// to the defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind_addr = match env::var("RPS_BIND_ADDR") {
            Ok(addr) => addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))?,
            Err(_) => defaults.bind_addr,
        };

        let config = Self {
            bind_addr,
            tick_rate: env_parse("RPS_TICK_RATE")?.unwrap_or(defaults.tick_rate),
            max_connections: env_parse("RPS_MAX_CONNECTIONS")?.unwrap_or(defaults.max_connections),
            log_level: env::var("RPS_LOG_LEVEL").unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    /// Same configuration on a different port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.bind_addr.set_port(port);
        self
    }

    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::ZeroTickRate);
        }
        Ok(())
    }

    /// Wall-clock time between ticks.
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }

    /// Simulated seconds per tick.
    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}

/// Read and parse an optional environment variable.
pub(crate) fn env_parse<T: FromStr>(key: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key, value)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Address did not parse.
    #[error("Invalid address format: {0}")]
    InvalidAddress(String),

    /// Value did not parse for its key.
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),

    /// Tick rate of zero.
    #[error("Tick rate must be positive")]
    ZeroTickRate,
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Unusable configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

// =============================================================================
// SERVER
// =============================================================================

/// The game server.
pub struct GameServer {
    /// Server configuration.
    config: ServerConfig,
    /// Authoritative game.
    game: Game,
    /// Listening socket and connections.
    hub: Hub,
    /// Player owned by each connection.
    players: BTreeMap<ConnectionId, PlayerHandle>,
    /// Shutdown signal.
    shutdown_tx: broadcast::Sender<()>,
    /// Subscribed at bind time so an early signal is not missed.
    shutdown_rx: broadcast::Receiver<()>,
}

impl GameServer {
    /// Bind the listening socket.
    pub async fn bind(config: ServerConfig) -> Result<Self, GameServerError> {
        config.validate()?;
        let hub = Hub::bind(config.bind_addr).await?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        Ok(Self {
            config,
            game: Game::new(),
            hub,
            players: BTreeMap::new(),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.hub.local_addr()
    }

    /// Get the authoritative game.
    pub fn game(&self) -> &Game {
        &self.game
    }

    /// Sender that stops `run` when signalled.
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.hub.connection_count()
    }

    /// Run the server until shut down.
    #[instrument(skip(self))]
    pub async fn run(&mut self) -> Result<(), GameServerError> {
        let mut ticker = interval(self.config.tick_duration());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let tick_seconds = self.config.tick_seconds();
        let wait = self.config.tick_duration();

        info!("Game server on {} running at {} Hz", self.local_addr(), self.config.tick_rate);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.step(tick_seconds);
                }
                events = self.hub.poll(wait) => {
                    self.handle_events(events);
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Apply transport events in arrival order.
    fn handle_events(&mut self, events: Vec<(ConnectionId, Event)>) {
        for (id, event) in events {
            match event {
                Event::Opened => self.on_opened(id),
                Event::Closed => self.on_closed(id),
                Event::DataReceived => {
                    if let Err(e) = self.drain_controls(id) {
                        let dump = self
                            .hub
                            .connection_mut(id)
                            .map(|c| hex_preview(c.recv_buffer()))
                            .unwrap_or_default();
                        warn!(id, buffer = %dump, "Malformed message, closing connection: {}", e);
                        self.drop_connection(id);
                    }
                }
            }
        }
    }

    fn on_opened(&mut self, id: ConnectionId) {
        let peer = self.hub.connection_mut(id).and_then(|c| c.peer());

        if self.players.len() >= self.config.max_connections {
            warn!(id, ?peer, "Connection limit reached, refusing");
            self.hub.close(id);
            return;
        }

        match self.game.spawn_player() {
            Ok(handle) => {
                let index = self.game.player(handle).map(|p| p.index);
                info!(id, ?peer, %handle, ?index, "Player joined");
                self.players.insert(id, handle);
            }
            Err(e) => {
                warn!(id, ?peer, "Refusing connection: {}", e);
                self.hub.close(id);
            }
        }
    }

    fn on_closed(&mut self, id: ConnectionId) {
        let Some(handle) = self.players.remove(&id) else {
            return;
        };
        match self.game.remove_player(handle) {
            Ok(player) => info!(id, %handle, index = player.index, "Player left"),
            Err(e) => error!(id, "Failed to remove player: {}", e),
        }
    }

    /// Remove the player and close its connection.
    fn drop_connection(&mut self, id: ConnectionId) {
        self.on_closed(id);
        self.hub.close(id);
    }

    /// Merge every complete controls message buffered for a connection.
    fn drain_controls(&mut self, id: ConnectionId) -> Result<usize, ProtocolError> {
        let Some(handle) = self.players.get(&id).copied() else {
            return Ok(0);
        };
        let (Some(connection), Some(player)) =
            (self.hub.connection_mut(id), self.game.player_mut(handle))
        else {
            return Ok(0);
        };

        let mut merged = 0;
        while player.controls.recv_controls_message(connection)? {
            merged += 1;
        }

        // Clients only ever send controls
        if let Some(&tag) = connection.recv_buffer().first() {
            if tag != MessageTag::Controls as u8 {
                return Err(ProtocolError::UnexpectedTag(tag));
            }
        }

        Ok(merged)
    }

    /// Advance the game one tick and send everyone the result.
    fn step(&mut self, elapsed: f32) {
        let result = self.game.update(elapsed);

        for event in &result.events {
            match event {
                GameEvent::RoundOver { winner_index, bary_score, .. } => {
                    info!(winner_index, ?bary_score, "Round over");
                }
                GameEvent::RoundRestarted => info!("New round"),
            }
        }

        if result.events.iter().any(GameEvent::ends_round) {
            match self.game.to_json() {
                Ok(snapshot) => debug!(%snapshot, "final state"),
                Err(e) => debug!("Failed to serialize game: {}", e),
            }
        }

        self.broadcast_state();
        self.hub.flush();
    }

    /// Queue the full state on every player's connection, that player first.
    fn broadcast_state(&mut self) {
        for (id, handle) in &self.players {
            let Some(connection) = self.hub.connection_mut(*id) else {
                continue;
            };
            if let Err(e) = self.game.send_state_message(connection, Some(*handle)) {
                error!(id, "Failed to encode state: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::input::{Hand, HandSide};
    use crate::game::state::START_SCORE;
    use crate::network::client::{ClientError, GameClient};

    const WAIT: Duration = Duration::from_millis(20);

    fn local_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..Default::default()
        }
    }

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.max_connections, 3);
        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.with_port(9000).bind_addr.port(), 9000);
    }

    #[test]
    fn test_tick_timing() {
        let config = ServerConfig::default();
        assert!((config.tick_seconds() - crate::TICK_SECONDS).abs() < 1e-9);
        assert_eq!(config.tick_duration().as_millis(), 33);

        let zero = ServerConfig { tick_rate: 0, ..Default::default() };
        assert_eq!(zero.validate(), Err(ConfigError::ZeroTickRate));
    }

    #[tokio::test]
    async fn test_server_bind_and_shutdown() {
        let mut server = GameServer::bind(local_config()).await.unwrap();
        assert_eq!(server.connection_count(), 0);
        assert_ne!(server.local_addr().port(), 0);

        let shutdown = server.shutdown_sender();
        let handle = tokio::spawn(async move { server.run().await });
        shutdown.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_step_ends_round_and_keeps_players() {
        let mut server = GameServer::bind(local_config()).await.unwrap();
        for _ in 0..3 {
            server.game.spawn_player().unwrap();
        }
        server.game.bary_score = [-0.1, 0.6, 0.5];

        server.step(crate::TICK_SECONDS);

        assert!(server.game().over);
        assert_eq!(server.game().winner().map(|p| p.index), Some(1));
        assert_eq!(server.game().player_count(), 3);
    }

    /// Update a client until `done` holds for its mirror.
    async fn until(client: &mut GameClient, done: impl Fn(&GameClient) -> bool) {
        for _ in 0..200 {
            client.update(WAIT).await.unwrap();
            if done(client) {
                return;
            }
        }
        panic!("client never reached the expected state");
    }

    #[tokio::test]
    async fn test_three_clients_play() {
        let mut server = GameServer::bind(local_config()).await.unwrap();
        let addr = server.local_addr();
        let shutdown = server.shutdown_sender();
        let handle = tokio::spawn(async move {
            server.run().await.unwrap();
            server
        });

        let mut clients = Vec::new();
        for _ in 0..3 {
            clients.push(GameClient::connect(addr).await.unwrap());
        }
        for client in clients.iter_mut() {
            until(client, |c| c.game().player_count() == 3).await;
        }

        // Each client finds itself first, in a distinct seat
        let mut seats: Vec<i8> = clients.iter().map(|c| c.me().unwrap().index).collect();
        seats.sort();
        assert_eq!(seats, vec![0, 1, 2]);

        // Whoever sits in seat 0 makes a fist with the left hand and loses
        // to seat 2's paper
        let rock = clients
            .iter_mut()
            .find(|c| c.me().map(|p| p.index) == Some(0))
            .unwrap();
        for finger in 0..4 {
            rock.controls_mut().press(HandSide::Left, finger);
        }
        until(rock, |c| c.me().map(|p| p.left_hand) == Some(Hand::Rock)).await;
        until(rock, |c| c.game().bary_score[0] < START_SCORE[0]).await;
        assert!(rock.game().bary_score[2] > START_SCORE[2]);

        // A fourth client is turned away
        let mut extra = GameClient::connect(addr).await.unwrap();
        let mut refused = false;
        for _ in 0..200 {
            match extra.update(WAIT).await {
                Err(ClientError::ConnectionLost) => {
                    refused = true;
                    break;
                }
                Err(e) => panic!("unexpected error: {}", e),
                Ok(_) => {}
            }
        }
        assert!(refused);

        shutdown.send(()).unwrap();
        let server = handle.await.unwrap();
        assert_eq!(server.game().player_count(), 3);
    }

    #[tokio::test]
    async fn test_malformed_controls_drop_player() {
        let mut server = GameServer::bind(local_config()).await.unwrap();
        let addr = server.local_addr();
        let shutdown = server.shutdown_sender();
        let handle = tokio::spawn(async move {
            server.run().await.unwrap();
            server
        });

        let mut bad = crate::network::transport::Link::connect(addr).await.unwrap();
        bad.connection_mut().send(&[MessageTag::Controls as u8, 9, 0, 0]);
        bad.flush();

        let mut closed = false;
        for _ in 0..200 {
            if bad.poll(WAIT).await.contains(&Event::Closed) {
                closed = true;
                break;
            }
        }
        assert!(closed);

        shutdown.send(()).unwrap();
        let server = handle.await.unwrap();
        assert_eq!(server.game().player_count(), 0);
    }
}
