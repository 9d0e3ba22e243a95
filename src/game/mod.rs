//! Game Logic Module
//!
//! All simulation code. No I/O happens here.
//!
//! ## Module Structure
//!
//! - `input`: Buttons, controls, gesture classification
//! - `state`: Players and the game aggregate
//! - `tick`: Authoritative simulation step
//! - `events`: Round events for logging and clients

pub mod input;
pub mod state;
pub mod tick;
pub mod events;

// Re-export key types
pub use input::{Button, Controls, Hand, HandSide, FINGERS};
pub use state::{Game, GameError, Player, PlayerHandle};
pub use tick::TickResult;
pub use events::GameEvent;
