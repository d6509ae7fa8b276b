//! Peg Drop - simulation core for a physics-driven peg drop arcade game
//!
//! Core modules:
//! - `sim`: Fixed-timestep simulation (physics, events, scoring, upgrades)
//! - `app`: Host loop driving the interactive and preview instances
//! - `config`: Per-instance simulation configuration
//! - `input` / `sound` / `highscores` / `levels`: Collaborator interfaces

pub mod app;
pub mod config;
pub mod error;
pub mod highscores;
pub mod input;
pub mod levels;
pub mod sim;
pub mod sound;

pub use app::{AppMode, AppState, DIFFICULTIES};
pub use config::SimConfig;
pub use error::Error;
pub use highscores::{HighScoreStore, HighScores};
pub use input::{Action, InputSource, InputState};
pub use sound::{LogSound, Sound, SoundSink};

/// Game configuration constants
pub mod consts {
    /// Fixed simulation step in milliseconds (120 Hz)
    pub const STEP_MS: f64 = 1000.0 / 120.0;
    /// Maximum physics steps per frame, bounds worst-case work after a stall
    pub const MAX_STEPS: u32 = 8;
    /// Depth of the rolling frame/work windows used for the load figure
    pub const LOAD_WINDOW: usize = 20;

    /// Default playfield size (logical units, not pixels)
    pub const DEFAULT_WIDTH: f32 = 1000.0;
    pub const DEFAULT_HEIGHT: f32 = 1000.0;
    /// Default number of levels before a run is won
    pub const DEFAULT_LEVELS: u32 = 10;

    /// Gravity (units/s², +y is down)
    pub const GRAVITY: f32 = 1000.0;
    /// Orb speed cap (units/s)
    pub const ORB_MAX_SPEED: f32 = 1500.0;

    /// Orb defaults
    pub const ORB_RADIUS: f32 = 15.0;
    pub const ORB_RESTITUTION: f32 = 0.55;
    pub const ORB_FRICTION: f32 = 0.02;
    /// Peg / bouncer defaults
    pub const PEG_RADIUS: f32 = 5.0;
    pub const BOUNCER_RADIUS: f32 = 10.0;
    pub const PEG_RESTITUTION: f32 = 0.5;
    /// Bounce magnitude carried by every bouncer
    pub const BOUNCER_MAGNITUDE: f32 = 10.0;
    /// Scale from (orb - bouncer) offset * magnitude to a velocity kick (1/s)
    pub const BOUNCE_SCALE: f32 = 1.5;

    /// Spawner drop height
    pub const SPAWN_HEIGHT: f32 = 100.0;
    /// Spawner speed ceiling
    pub const MAX_SPEED: u32 = 10;
    /// Spawner starting speed
    pub const START_SPEED: u32 = 2;
    /// Spawner oscillation rate (radians/s before shaping)
    pub const SPAWNER_RATE: f32 = 3.0;
    /// Maximum horizontal launch speed imparted by spawner motion (units/s)
    pub const CURVE_MAX: f32 = 300.0;
    /// Softness of the launch saturation curve (units per 60 Hz frame)
    pub const CURVE_SOFTNESS: f32 = 10.0;
    /// Extra jitter at 0% accuracy (units)
    pub const MAX_JITTER: f32 = 20.0;
    /// Starting accuracy percentage
    pub const START_ACCURACY: u32 = 50;

    /// Ball allowance at level 1, and the raise applied on each level-up
    pub const START_BALLS: u32 = 10;
    pub const BALLS_PER_LEVEL: u32 = 1;

    /// Auto-control: spawn cadence, live orb cap and gate auto-resolve delay
    pub const AUTO_SPAWN_MS: f64 = 1000.0;
    pub const AUTO_ORB_CAP: usize = 15;
    pub const AUTO_DELAY_MS: f64 = 2000.0;

    /// Upgrade offers per level-up
    pub const OFFER_COUNT: usize = 3;

    /// Distance past the playfield edge at which an orb counts as escaped
    pub const OUT_OF_BOUNDS_MARGIN: f32 = 100.0;
}
