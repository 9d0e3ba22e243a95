//! Game Events
//!
//! Round transitions reported by the simulation tick.

use serde::{Serialize, Deserialize};
use crate::game::state::PlayerHandle;

/// Something notable that happened during a tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    /// The score point left the triangle and the round ended.
    RoundOver {
        /// Seat of the winning player
        winner_index: i8,
        /// Handle of the winning player, if that seat is occupied
        winner: Option<PlayerHandle>,
        /// Score point at the moment the round ended
        bary_score: [f32; 3],
    },

    /// The restart delay elapsed and a fresh round began.
    RoundRestarted,
}

impl GameEvent {
    /// Create round over event.
    pub fn round_over(winner_index: i8, winner: Option<PlayerHandle>, bary_score: [f32; 3]) -> Self {
        GameEvent::RoundOver {
            winner_index,
            winner,
            bary_score,
        }
    }

    /// Does this event end a round?
    pub fn ends_round(&self) -> bool {
        matches!(self, GameEvent::RoundOver { .. })
    }
}
