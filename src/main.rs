//! Headless demo: runs an auto-controlled game for a while and logs what
//! happened. Set RUST_LOG=info (or debug) to watch the event flow.

use peg_drop::sim::Phase;
use peg_drop::{AppMode, AppState, HighScores, LogSound, SimConfig};

/// Simulated frame length (60 Hz display)
const FRAME_MS: f64 = 1000.0 / 60.0;
/// Simulated run length
const DEMO_SECONDS: u32 = 120;

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    log::info!("Peg Drop (headless) starting...");

    if let Err(e) = run() {
        log::error!("Demo failed: {}", e);
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // The core is driven by the host page on wasm
}

#[cfg(not(target_arch = "wasm32"))]
fn run() -> peg_drop::error::Result<()> {
    let config = SimConfig {
        auto_control: true,
        ..SimConfig::interactive()
    };

    let mut app = AppState::new(config, Box::new(LogSound::new()), HighScores::for_levels())?;

    // A second of menu preview, then into the game
    for _ in 0..60 {
        app.update(FRAME_MS);
    }
    app.start_game();

    let frames = DEMO_SECONDS * 60;
    for frame in 0..frames {
        app.update(FRAME_MS);
        if app.mode() != AppMode::Game {
            log::info!("Left the game after {} frames", frame);
            break;
        }
        if frame % 600 == 0 {
            if let Some(game) = app.game() {
                log::info!(
                    "t={:.0}s level {} score {} orbs {} load {:.2}",
                    app.timing().elapsed() / 1000.0,
                    game.levels().level(),
                    game.levels().score(),
                    game.orb_count(),
                    app.timing().load()
                );
            }
        }
    }

    if let Some(game) = app.game() {
        if game.phase() != Phase::Running {
            log::info!("Finished waiting at a gate: {:?}", game.phase());
        }
        println!("{}", game.snapshot_json()?);
    }
    println!("{}", app.scores().to_json()?);
    Ok(())
}
