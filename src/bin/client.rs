//! RPS Triad Headless Client
//!
//! Connects to a server and plays with a seeded random gesture script,
//! logging the mirrored game.
//!
//! ```text
//! rps-triad-client [host port]
//! ```

use anyhow::{bail, Context};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rps_triad::{
    game::input::{Controls, Hand, HandSide, FINGERS},
    network::client::{ClientConfig, GameClient},
    VERSION,
};

/// Frames a scripted gesture is held before picking the next one.
const HOLD_FRAMES: std::ops::RangeInclusive<u32> = 20..=90;

/// Frames between status lines.
const STATUS_FRAMES: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut config = ClientConfig::from_env()?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => {}
        [host, port] => {
            let port: u16 = port.parse().with_context(|| format!("Invalid port '{}'", port))?;
            config.server_addr = format!("{}:{}", host, port);
        }
        _ => bail!("Usage: rps-triad-client [host port]"),
    }

    init_tracing(&config.log_level);

    let seed = config.seed.unwrap_or_else(rand::random);
    info!("RPS Triad Client v{}", VERSION);
    info!("Connecting to {} (script seed {})", config.server_addr, seed);

    let mut client = GameClient::connect(config.server_addr.as_str())
        .await
        .with_context(|| format!("Failed to connect to {}", config.server_addr))?;

    let mut script = GestureScript::new(seed);
    let mut frames = interval(config.frame_duration());
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut frame: u64 = 0;
    let mut was_over = false;

    loop {
        tokio::select! {
            _ = frames.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
        }

        script.drive(client.controls_mut());
        client.update(std::time::Duration::ZERO).await?;

        let game = client.game();
        if game.over && !was_over {
            match game.winner() {
                Some(winner) => info!(index = winner.index, score = ?game.bary_score, "Round over"),
                None => warn!(score = ?game.bary_score, "Round over without a marked winner"),
            }
        }
        was_over = game.over;

        frame += 1;
        if frame % STATUS_FRAMES == 0 {
            match client.me() {
                Some(me) => info!(
                    players = game.player_count(),
                    index = me.index,
                    left = ?me.left_hand,
                    right = ?me.right_hand,
                    stamina = %format!("{:.1}", me.stamina),
                    score = ?game.bary_score,
                    "status"
                ),
                None => info!("Waiting for state"),
            }
        }
    }
}

/// Random gestures, each held for a random number of frames.
struct GestureScript {
    rng: StdRng,
    targets: [Hand; 2],
    frames_left: u32,
}

impl GestureScript {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            targets: [Hand::Paper, Hand::Paper],
            frames_left: 0,
        }
    }

    fn pick(&mut self) -> Hand {
        match self.rng.gen_range(0..3) {
            0 => Hand::Rock,
            1 => Hand::Paper,
            _ => Hand::Scissors,
        }
    }

    /// Move held buttons toward the current targets, pressing or releasing
    /// only the fingers that differ.
    fn drive(&mut self, controls: &mut Controls) {
        if self.frames_left == 0 {
            self.targets = [self.pick(), self.pick()];
            self.frames_left = self.rng.gen_range(HOLD_FRAMES);
        }
        self.frames_left -= 1;

        for (side, target) in [HandSide::Left, HandSide::Right].into_iter().zip(self.targets) {
            let pattern = finger_pattern(target);
            for (finger, want) in pattern.into_iter().enumerate() {
                let held = controls.hand(side)[finger].pressed;
                if want && !held {
                    controls.press(side, finger);
                } else if !want && held {
                    controls.release(side, finger);
                }
            }
        }
    }
}

/// Held fingers forming a gesture.
fn finger_pattern(hand: Hand) -> [bool; FINGERS] {
    match hand {
        Hand::Rock => [true; FINGERS],
        Hand::Scissors => [false, false, true, true],
        Hand::Paper | Hand::None => [false; FINGERS],
    }
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
