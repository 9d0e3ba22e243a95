//! Authoritative Simulation Tick
//!
//! Turns the press edges and held buttons accumulated since the previous
//! tick into gestures, score movement, stamina and round transitions.

use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::game::events::GameEvent;
use crate::game::input::{Hand, HandSide};
use crate::game::state::{
    Game, PlayerHandle,
    MAX_STAMINA, PLAYER_COUNT, RESTART_DURATION, SCORE_POINT_SPEED, STAMINA_RECOVERY,
};

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<GameEvent>,
    /// Whether the round ended this tick
    pub round_over: bool,
    /// Winner (if the round ended this tick)
    pub winner: Option<PlayerHandle>,
}

impl Game {
    /// Advance the simulation by `elapsed` seconds.
    pub fn update(&mut self, elapsed: f32) -> TickResult {
        tick(self, elapsed)
    }
}

/// Run one simulation tick.
///
/// Order of work:
/// 1. resolve both hands of every player
/// 2. with exactly three players in an unfinished round: move the score
///    point, spend and recover stamina, detect the end of the round
/// 3. otherwise, in a finished round: count down to the restart
/// 4. clear every press edge
pub fn tick(game: &mut Game, elapsed: f32) -> TickResult {
    let mut result = TickResult::default();

    // 1. Gestures
    resolve_hands(game);

    if game.player_count() == PLAYER_COUNT && !game.over {
        // 2. Score transfer between neighbours
        apply_scoring(game, elapsed);

        // 3. Stamina
        update_stamina(game, elapsed);

        // 4. Round end
        check_round_over(game, &mut result);
    } else if game.over {
        // 5. Restart countdown
        advance_restart(game, elapsed, &mut result);
    }

    // 6. Press edges are consumed
    for player in game.players.values_mut() {
        player.controls.clear_downs();
    }

    result
}

/// Recompute both gestures of every player from held buttons.
fn resolve_hands(game: &mut Game) {
    for player in game.players.values_mut() {
        if player.exhausted() {
            player.left_hand = Hand::None;
            player.right_hand = Hand::None;
        } else {
            player.left_hand = Hand::classify(player.controls.hand(HandSide::Left));
            player.right_hand = Hand::classify(player.controls.hand(HandSide::Right));
        }
    }
}

/// Seat index of the neighbour on one side, modulo the current player count.
fn neighbour_index(index: i8, side: HandSide, count: usize) -> i8 {
    let count = count as i32;
    let offset = match side {
        HandSide::Left => -1,
        HandSide::Right => 1,
    };
    (i32::from(index) + offset).rem_euclid(count) as i8
}

/// Move score from each losing hand's owner to the winner.
///
/// A left hand fights the left neighbour's right hand and a right hand
/// fights the right neighbour's left hand. Every transfer is zero-sum.
fn apply_scoring(game: &mut Game, elapsed: f32) {
    let count = game.player_count();

    // Neighbours are found by seat, not by storage position
    let hands_by_index: BTreeMap<i8, (Hand, Hand)> = game
        .players
        .values()
        .map(|p| (p.index, (p.left_hand, p.right_hand)))
        .collect();

    let mut transfers: Vec<(i8, i8)> = Vec::with_capacity(2 * count);

    for player in game.players.values() {
        let left_index = neighbour_index(player.index, HandSide::Left, count);
        let right_index = neighbour_index(player.index, HandSide::Right, count);

        let (Some(left), Some(right)) = (
            hands_by_index.get(&left_index),
            hands_by_index.get(&right_index),
        ) else {
            warn!(index = player.index, "missing neighbour, skipping score transfer");
            continue;
        };

        // left neighbour's right hand
        if player.left_hand.beats(left.1) {
            transfers.push((player.index, left_index));
        }
        // right neighbour's left hand
        if player.right_hand.beats(right.0) {
            transfers.push((player.index, right_index));
        }
    }

    let amount = elapsed * SCORE_POINT_SPEED;
    for (winner, loser) in transfers {
        let (Ok(w), Ok(l)) = (usize::try_from(winner), usize::try_from(loser)) else {
            continue;
        };
        if w >= game.bary_score.len() || l >= game.bary_score.len() {
            continue;
        }
        game.bary_score[w] += amount;
        game.bary_score[l] -= amount;
    }
}

/// Spend stamina on press edges, then recover over time.
fn update_stamina(game: &mut Game, elapsed: f32) {
    for player in game.players.values_mut() {
        if player.stamina > 0.0 {
            player.stamina -= player.controls.total_downs() as f32;
        }

        player.stamina = (player.stamina + STAMINA_RECOVERY * elapsed).min(MAX_STAMINA);
    }
}

/// End the round once the score point leaves the triangle.
fn check_round_over(game: &mut Game, result: &mut TickResult) {
    if !game.bary_score.iter().any(|s| *s < 0.0) {
        return;
    }

    // Strictly greater replaces the leader, so the lowest seat wins ties
    let mut max_score = 0.0f32;
    let mut winner_index: i8 = 0;
    for (i, score) in game.bary_score.iter().enumerate() {
        if *score > max_score {
            max_score = *score;
            winner_index = i as i8;
        }
    }

    let mut winner = None;
    for (handle, player) in game.players.iter_mut() {
        player.win = player.index == winner_index;
        if player.win {
            winner = Some(*handle);
        }
    }

    game.over = true;

    debug!(winner_index, bary_score = ?game.bary_score, "round over");

    result.round_over = true;
    result.winner = winner;
    result.events.push(GameEvent::round_over(winner_index, winner, game.bary_score));
}

/// Count down while the round is finished and restart once the delay passes.
fn advance_restart(game: &mut Game, elapsed: f32, result: &mut TickResult) {
    game.restart_timer += elapsed;
    // Strictly past the delay: a timer of exactly RESTART_DURATION waits one more tick
    if game.restart_timer > RESTART_DURATION {
        game.restart_round();
        debug!("round restarted");
        result.events.push(GameEvent::RoundRestarted);
    }
}

// =============================================================================
// TESTS
// =============================================================================
