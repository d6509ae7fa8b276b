//! Host loop
//!
//! Owns the shared [`TimingController`] and the two simulation instances: the
//! interactive game and the menu's level preview. The host calls exactly one
//! of [`AppState::game_update`] or [`AppState::menu_update`] per frame.

use crate::config::SimConfig;
use crate::consts::{MAX_STEPS, STEP_MS};
use crate::error::Result;
use crate::highscores::HighScores;
use crate::input::{Action, InputSource, InputState};
use crate::levels::{self, LEVEL_LIST, LevelChoice};
use crate::sim::{DrainOutcome, FrameContext, GameState, TimingController};
use crate::sound::SoundSink;

/// Level counts offered by the menu's difficulty row
pub const DIFFICULTIES: [u32; 5] = [5, 10, 25, 50, 100];

/// Which instance the host is driving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    Game,
    Menu,
}

pub struct AppState {
    mode: AppMode,
    timing: TimingController,
    input: InputState,
    sound: Box<dyn SoundSink>,
    scores: HighScores,
    config: SimConfig,
    choice: &'static LevelChoice,
    /// Levels to clear before the win gate, for the next game
    difficulty: u32,
    game: Option<GameState>,
    preview: GameState,
}

impl AppState {
    /// Start in the menu with the first level previewing
    pub fn new(config: SimConfig, sound: Box<dyn SoundSink>, scores: HighScores) -> Result<Self> {
        config.validate()?;
        let choice = &LEVEL_LIST[0];
        let preview = GameState::with_level(preview_config(&config), choice);
        Ok(Self {
            difficulty: config.levels,
            mode: AppMode::Menu,
            timing: TimingController::new(),
            input: InputState::new(),
            sound,
            scores,
            config,
            choice,
            game: None,
            preview,
        })
    }

    /// Advance whichever instance the current mode drives
    pub fn update(&mut self, delta_ms: f64) {
        match self.mode {
            AppMode::Game => self.game_update(delta_ms),
            AppMode::Menu => self.menu_update(delta_ms),
        }
    }

    /// Clock a frame and run `f` with the clamped step count. The unclamped
    /// count is always committed so a stall doesn't carry over.
    fn timed<R>(&mut self, delta_ms: f64, f: impl FnOnce(&mut Self, u32) -> R) -> R {
        self.timing.begin_frame(delta_ms);
        self.timing.begin_work();
        let owed = self.timing.get_steps(STEP_MS);
        let steps = owed.min(MAX_STEPS);
        if steps < owed {
            log::debug!("Frame owed {} steps, running {}", owed, steps);
        }
        let result = f(self, steps);
        self.timing.step(owed, STEP_MS);
        self.timing.end_work();
        result
    }

    pub fn game_update(&mut self, delta_ms: f64) {
        let outcome = self.timed(delta_ms, |app, steps| {
            let Some(game) = app.game.as_mut() else {
                log::warn!("Game update without a running game");
                return DrainOutcome::Continue;
            };
            let mut ctx = FrameContext {
                timing: &mut app.timing,
                sound: &mut *app.sound,
                scores: &mut app.scores,
            };
            game.frame(&mut ctx, &mut app.input, steps)
        });

        match outcome {
            DrainOutcome::Continue => {}
            DrainOutcome::Restart => {
                log::info!("Restarting {}", self.choice.id);
                self.start_game();
            }
            DrainOutcome::Menu => self.set_mode(AppMode::Menu),
        }
    }

    /// Advance the preview and handle level selection
    pub fn menu_update(&mut self, delta_ms: f64) {
        self.parse_menu_input();
        if self.mode != AppMode::Menu {
            return;
        }

        let outcome = self.timed(delta_ms, |app, steps| {
            let mut ctx = FrameContext {
                timing: &mut app.timing,
                sound: &mut *app.sound,
                scores: &mut app.scores,
            };
            app.preview.frame(&mut ctx, &mut app.input, steps)
        });
        if outcome != DrainOutcome::Continue {
            log::warn!("Preview ended with {:?}, rebuilding", outcome);
            self.replace_preview();
        }
    }

    fn parse_menu_input(&mut self) {
        if self.input.poll(Action::Left) {
            self.input.reset(Some(Action::Left));
            self.cycle_level(-1);
        }
        if self.input.poll(Action::Right) {
            self.input.reset(Some(Action::Right));
            self.cycle_level(1);
        }
        if self.input.poll(Action::Up) {
            self.input.reset(Some(Action::Up));
            self.cycle_difficulty(-1);
        }
        if self.input.poll(Action::Down) {
            self.input.reset(Some(Action::Down));
            self.cycle_difficulty(1);
        }
        if self.input.poll(Action::Select) {
            self.input.reset(Some(Action::Select));
            self.start_game();
        }
    }

    /// Move to the next unlocked level in `dir`
    fn cycle_level(&mut self, dir: isize) {
        let count = LEVEL_LIST.len() as isize;
        let current = LEVEL_LIST
            .iter()
            .position(|l| l.id == self.choice.id)
            .unwrap_or(0) as isize;
        for offset in 1..count {
            let next = &LEVEL_LIST[(current + dir * offset).rem_euclid(count) as usize];
            if self.scores.is_unlocked(next.unlock) {
                self.select_level(next.id);
                return;
            }
        }
    }

    /// Step through [`DIFFICULTIES`], stopping at either end. A configured
    /// count that isn't on the list moves to its neighbour in `dir`.
    fn cycle_difficulty(&mut self, dir: isize) {
        let next = match DIFFICULTIES.iter().position(|&d| d == self.difficulty) {
            Some(i) => {
                let i = (i as isize + dir).clamp(0, DIFFICULTIES.len() as isize - 1);
                DIFFICULTIES[i as usize]
            }
            None if dir > 0 => DIFFICULTIES
                .iter()
                .copied()
                .find(|&d| d > self.difficulty)
                .unwrap_or(DIFFICULTIES[DIFFICULTIES.len() - 1]),
            None => DIFFICULTIES
                .iter()
                .rev()
                .copied()
                .find(|&d| d < self.difficulty)
                .unwrap_or(DIFFICULTIES[0]),
        };
        self.set_difficulty(next);
    }

    /// Set how many levels the next game runs to. Only [`DIFFICULTIES`]
    /// values are accepted.
    pub fn set_difficulty(&mut self, levels: u32) -> bool {
        if !DIFFICULTIES.contains(&levels) {
            log::warn!("Difficulty {} is not offered", levels);
            return false;
        }
        if levels != self.difficulty {
            log::info!("Difficulty {} -> {}", self.difficulty, levels);
        }
        self.difficulty = levels;
        true
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    /// Pick the level for the preview and the next game. Locked and unknown
    /// ids are refused.
    pub fn select_level(&mut self, id: &str) -> bool {
        let Some(choice) = levels::find(id) else {
            log::warn!("Unknown level {:?}", id);
            return false;
        };
        if !self.scores.is_unlocked(choice.unlock) {
            log::warn!("Level {} is locked", id);
            return false;
        }
        self.choice = choice;
        self.replace_preview();
        true
    }

    /// Rebuild the preview from the current level choice
    pub fn replace_preview(&mut self) {
        self.preview.destroy(&mut self.timing);
        self.preview = GameState::with_level(preview_config(&self.config), self.choice);
    }

    /// Tear down any running game and build a fresh one
    pub fn start_game(&mut self) {
        if let Some(mut old) = self.game.take() {
            old.destroy(&mut self.timing);
        }
        let config = SimConfig {
            levels: self.difficulty,
            ..self.config.clone()
        };
        self.game = Some(GameState::with_level(config, self.choice));
        if self.mode != AppMode::Game {
            self.set_mode(AppMode::Game);
        }
    }

    /// Switch modes. Pending timers never survive a transition.
    pub fn set_mode(&mut self, mode: AppMode) {
        log::info!("Mode {:?} -> {:?}", self.mode, mode);
        self.timing.clear_timers();
        self.input.reset(None);
        if mode == AppMode::Menu {
            if let Some(mut game) = self.game.take() {
                game.destroy(&mut self.timing);
            }
        }
        self.mode = mode;
    }

    pub fn mode(&self) -> AppMode {
        self.mode
    }

    pub fn choice(&self) -> &'static LevelChoice {
        self.choice
    }

    pub fn game(&self) -> Option<&GameState> {
        self.game.as_ref()
    }

    pub fn game_mut(&mut self) -> Option<&mut GameState> {
        self.game.as_mut()
    }

    pub fn preview(&self) -> &GameState {
        &self.preview
    }

    pub fn timing(&self) -> &TimingController {
        &self.timing
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    pub fn scores(&self) -> &HighScores {
        &self.scores
    }

    pub fn scores_mut(&mut self) -> &mut HighScores {
        &mut self.scores
    }
}

/// Preview shares the playfield shape but none of the game's switches
fn preview_config(config: &SimConfig) -> SimConfig {
    SimConfig {
        width: config.width,
        height: config.height,
        levels: config.levels,
        seed: config.seed.map(|s| s.wrapping_add(1)),
        ..SimConfig::preview()
    }
}
