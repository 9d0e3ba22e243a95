//! Game State Definitions
//!
//! Players and the authoritative game aggregate.
//! Players live in a `BTreeMap` keyed by a monotonic handle, so handles stay
//! valid while other players come and go and iteration follows spawn order.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::game::input::{Controls, Hand};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Players needed for a round to be played.
pub const PLAYER_COUNT: usize = 3;

/// Stamina cap (and value at round start).
pub const MAX_STAMINA: f32 = 16.0;

/// Stamina regained per second.
pub const STAMINA_RECOVERY: f32 = 4.0;

/// Barycentric score moved per second by each winning hand.
pub const SCORE_POINT_SPEED: f32 = 0.3;

/// Seconds between a round ending and the next one starting.
pub const RESTART_DURATION: f32 = 3.0;

/// Score point at round start: the centre of the triangle.
pub const START_SCORE: [f32; 3] = [1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0];

/// RGBA color for each player index.
pub const PLAYER_COLORS: [[u8; 4]; PLAYER_COUNT] = [
    [0xff, 0x00, 0x88, 0xff],
    [0x00, 0xff, 0xee, 0xff],
    [0xff, 0xbb, 0x00, 0xff],
];

// =============================================================================
// PLAYER HANDLE
// =============================================================================

/// Stable reference to a player slot.
///
/// Handles are never reused within one `Game`, and `Ord` follows spawn
/// order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayerHandle(pub u32);

impl std::fmt::Display for PlayerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "player#{}", self.0)
    }
}

// =============================================================================
// PLAYER STATE
// =============================================================================

/// State of a single player.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Inputs merged from the owning client (server side only)
    pub controls: Controls,

    /// RGBA color
    pub color: [u8; 4],

    /// Gesture of the left hand
    pub left_hand: Hand,

    /// Gesture of the right hand
    pub right_hand: Hand,

    /// Seat around the triangle (0..=2); also this player's score component
    pub index: i8,

    /// Current stamina; may dip below zero, never above `MAX_STAMINA`
    pub stamina: f32,

    /// Won the last finished round?
    pub win: bool,
}

impl Player {
    /// Create a new player in the given seat.
    pub fn new(index: i8) -> Self {
        let color = usize::try_from(index)
            .ok()
            .and_then(|i| PLAYER_COLORS.get(i))
            .copied()
            .unwrap_or([0x00, 0x00, 0x00, 0x00]);

        Self {
            controls: Controls::default(),
            color,
            left_hand: Hand::Paper,
            right_hand: Hand::Paper,
            index,
            stamina: MAX_STAMINA,
            win: false,
        }
    }

    /// Is this player too exhausted to form gestures?
    #[inline]
    pub fn exhausted(&self) -> bool {
        self.stamina <= 0.0
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new(0)
    }
}

// =============================================================================
// GAME
// =============================================================================

/// Errors from player lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// All seats are taken.
    #[error("Game is full")]
    Full,

    /// No player behind this handle.
    #[error("Unknown player {0}")]
    UnknownPlayer(PlayerHandle),
}

/// The authoritative game aggregate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Game {
    /// Players in spawn order
    pub(crate) players: BTreeMap<PlayerHandle, Player>,

    /// Next handle to hand out
    next_handle: u32,

    /// Score point in barycentric coordinates, one component per index
    pub bary_score: [f32; 3],

    /// Has the current round finished?
    pub over: bool,

    /// Seconds spent in the finished state
    pub restart_timer: f32,
}

impl Game {
    /// Create an empty game at round start.
    pub fn new() -> Self {
        Self {
            players: BTreeMap::new(),
            next_handle: 0,
            bary_score: START_SCORE,
            over: false,
            restart_timer: 0.0,
        }
    }

    /// Add a player in the lowest free seat.
    pub fn spawn_player(&mut self) -> Result<PlayerHandle, GameError> {
        let index = (0..PLAYER_COUNT as i8)
            .find(|i| self.players.values().all(|p| p.index != *i))
            .ok_or(GameError::Full)?;

        let handle = PlayerHandle(self.next_handle);
        self.next_handle += 1;
        self.players.insert(handle, Player::new(index));

        Ok(handle)
    }

    /// Remove a player. Other players keep their handles and seats.
    pub fn remove_player(&mut self, handle: PlayerHandle) -> Result<Player, GameError> {
        self.players
            .remove(&handle)
            .ok_or(GameError::UnknownPlayer(handle))
    }

    /// Get a player.
    pub fn player(&self, handle: PlayerHandle) -> Option<&Player> {
        self.players.get(&handle)
    }

    /// Get a player mutably.
    pub fn player_mut(&mut self, handle: PlayerHandle) -> Option<&mut Player> {
        self.players.get_mut(&handle)
    }

    /// Iterate players in storage (spawn) order.
    pub fn players(&self) -> impl Iterator<Item = (PlayerHandle, &Player)> {
        self.players.iter().map(|(h, p)| (*h, p))
    }

    /// Number of players present.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Find the player sitting in a seat.
    pub fn find_player_by_index(&self, index: i8) -> Option<(PlayerHandle, &Player)> {
        self.players().find(|(_, p)| p.index == index)
    }

    /// Winner of the last finished round, if one is marked.
    pub fn winner(&self) -> Option<&Player> {
        self.players.values().find(|p| p.win)
    }

    /// Replace every player with freshly decoded ones.
    ///
    /// Handles restart from zero in the order given.
    pub(crate) fn replace_players(&mut self, players: Vec<Player>) {
        self.players.clear();
        self.next_handle = 0;
        for player in players {
            let handle = PlayerHandle(self.next_handle);
            self.next_handle += 1;
            self.players.insert(handle, player);
        }
    }

    /// Put the score point back in the centre and refill stamina.
    pub fn restart_round(&mut self) {
        self.over = false;
        self.restart_timer = 0.0;
        self.bary_score = START_SCORE;
        for player in self.players.values_mut() {
            player.stamina = MAX_STAMINA;
        }
    }

    /// Serialize a snapshot for logs.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
