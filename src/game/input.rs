//! Input Capture and Gesture Classification
//!
//! Buttons count press edges between ticks; four buttons make a hand and
//! the pressed pattern of a hand decides its rock/paper/scissors gesture.

use serde::{Serialize, Deserialize};
use tracing::warn;

/// Number of finger buttons per hand.
pub const FINGERS: usize = 4;

// =============================================================================
// BUTTON
// =============================================================================

/// One tracked digital input.
///
/// `downs` counts press edges since the simulation last consumed them and
/// saturates at `u8::MAX` instead of wrapping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    /// Press edges since last consumed
    pub downs: u8,
    /// Is the button held right now
    pub pressed: bool,
}

impl Button {
    /// Wire bit carrying the held state.
    pub const PRESSED_BIT: u8 = 0x80;

    /// Wire bits carrying the press-edge count.
    pub const DOWNS_MASK: u8 = 0x7f;

    /// Register a press edge.
    pub fn press(&mut self) {
        self.pressed = true;
        self.add_downs(1);
    }

    /// Register a release edge.
    pub fn release(&mut self) {
        self.pressed = false;
    }

    /// Add press edges, saturating at 255.
    ///
    /// Returns `true` if the counter saturated.
    pub fn add_downs(&mut self, count: u8) -> bool {
        match self.downs.checked_add(count) {
            Some(total) => {
                self.downs = total;
                false
            }
            None => {
                warn!(downs = self.downs, added = count, "button press count saturated");
                self.downs = u8::MAX;
                true
            }
        }
    }

    /// Pack into one wire byte: bit 7 = pressed, bits 0-6 = downs.
    ///
    /// A count with bit 7 set cannot be represented; it is logged and the
    /// high bit is masked off.
    pub fn to_wire(self) -> u8 {
        if self.downs & Self::PRESSED_BIT != 0 {
            warn!(downs = self.downs, "unusually dense button presses, count truncated on the wire");
        }
        let pressed = if self.pressed { Self::PRESSED_BIT } else { 0 };
        pressed | (self.downs & Self::DOWNS_MASK)
    }

    /// Merge one wire byte: overwrite the held state and add its press
    /// edges to the ones not yet consumed.
    pub fn merge_wire(&mut self, byte: u8) {
        self.pressed = byte & Self::PRESSED_BIT != 0;
        self.add_downs(byte & Self::DOWNS_MASK);
    }
}

// =============================================================================
// HAND GESTURE
// =============================================================================

/// Gesture formed by one hand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
#[derive(Default)]
pub enum Hand {
    /// Not a gesture: beats nothing, loses to every real gesture
    None = 0,
    /// All four fingers down
    Rock = 1,
    /// All four fingers up
    #[default]
    Paper = 2,
    /// Inner two fingers down, outer two up
    Scissors = 3,
}

impl Hand {
    /// Classify the pressed pattern of one hand's buttons.
    pub fn classify(buttons: &[Button; FINGERS]) -> Hand {
        match (*buttons).map(|b| b.pressed) {
            [true, true, true, true] => Hand::Rock,
            [false, false, false, false] => Hand::Paper,
            [false, false, true, true] => Hand::Scissors,
            _ => Hand::None,
        }
    }

    /// Does `self` beat `other`?
    ///
    /// Any hand, `None` included, beats `None`.
    #[inline]
    pub fn beats(self, other: Hand) -> bool {
        matches!(
            (self, other),
            (_, Hand::None)
                | (Hand::Rock, Hand::Scissors)
                | (Hand::Paper, Hand::Rock)
                | (Hand::Scissors, Hand::Paper)
        )
    }

    /// Get hand from its wire value (0-3).
    pub fn from_u8(value: u8) -> Option<Hand> {
        match value {
            0 => Some(Hand::None),
            1 => Some(Hand::Rock),
            2 => Some(Hand::Paper),
            3 => Some(Hand::Scissors),
            _ => None,
        }
    }
}

// =============================================================================
// CONTROLS
// =============================================================================

/// Which hand a button belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandSide {
    /// Left hand
    Left,
    /// Right hand
    Right,
}

/// Both hands' buttons for one player.
///
/// Fixed arity: exactly four buttons per hand, never resized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controls {
    /// Left hand, finger 0 (outermost) to 3
    pub left_buttons: [Button; FINGERS],
    /// Right hand, finger 0 (outermost) to 3
    pub right_buttons: [Button; FINGERS],
}

impl Controls {
    /// Number of buttons on the wire.
    pub const BUTTON_COUNT: usize = 2 * FINGERS;

    /// Buttons of one hand.
    pub fn hand(&self, side: HandSide) -> &[Button; FINGERS] {
        match side {
            HandSide::Left => &self.left_buttons,
            HandSide::Right => &self.right_buttons,
        }
    }

    /// Mutable buttons of one hand.
    pub fn hand_mut(&mut self, side: HandSide) -> &mut [Button; FINGERS] {
        match side {
            HandSide::Left => &mut self.left_buttons,
            HandSide::Right => &mut self.right_buttons,
        }
    }

    /// Register a finger press. Out-of-range fingers are ignored.
    pub fn press(&mut self, side: HandSide, finger: usize) {
        if let Some(button) = self.hand_mut(side).get_mut(finger) {
            button.press();
        }
    }

    /// Register a finger release. Out-of-range fingers are ignored.
    pub fn release(&mut self, side: HandSide, finger: usize) {
        if let Some(button) = self.hand_mut(side).get_mut(finger) {
            button.release();
        }
    }

    /// All buttons in wire order: left 0..3, then right 0..3.
    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.left_buttons.iter().chain(self.right_buttons.iter())
    }

    /// Mutable buttons in wire order.
    pub fn buttons_mut(&mut self) -> impl Iterator<Item = &mut Button> {
        self.left_buttons.iter_mut().chain(self.right_buttons.iter_mut())
    }

    /// Sum of press edges across both hands.
    pub fn total_downs(&self) -> u32 {
        self.buttons().map(|b| u32::from(b.downs)).sum()
    }

    /// Forget all press edges (held state is kept).
    pub fn clear_downs(&mut self) {
        for button in self.buttons_mut() {
            button.downs = 0;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
