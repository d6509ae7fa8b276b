//! Game state for one simulation instance
//!
//! Owns the scene, event queue, spawner, level manager and pending gate.
//! Everything that changes score, level or phase goes through the event
//! queue and is applied in [`GameState::parse_events`].

use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec2;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::Serialize;

use super::collision::classify;
use super::entity::{Entity, EntityId, EntityKind, EntityTag, Scene};
use super::events::{EventQueue, GameEvent};
use super::level::LevelManager;
use super::spawner::Spawner;
use super::timing::{InstanceId, TimerAction, TimerTarget, TimingController};
use super::upgrades::{UpgradeEffect, UpgradeManager, UpgradeOffer};
use crate::config::SimConfig;
use crate::consts::{
    AUTO_DELAY_MS, AUTO_ORB_CAP, BALLS_PER_LEVEL, BOUNCE_SCALE, OFFER_COUNT,
    OUT_OF_BOUNDS_MARGIN, STEP_MS,
};
use crate::error::Result;
use crate::highscores::HighScoreStore;
use crate::input::{Action, InputSource};
use crate::levels::LevelChoice;
use crate::sound::{Sound, SoundSink};

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Current phase of the instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Running,
    /// Waiting for an upgrade choice
    UpgradePending,
    /// Out of balls, waiting for restart or continue
    GameOverPending,
    /// Final level cleared, waiting for restart or endless
    WinPending,
    /// Torn down, never runs again
    Destroyed,
}

impl Phase {
    pub fn is_paused(&self) -> bool {
        !matches!(self, Phase::Running)
    }
}

/// Options offered by the game-over and win gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GateChoice {
    Restart,
    Continue,
    Endless,
}

/// How a drain pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Queue emptied, keep running
    Continue,
    /// Instance torn down, host should build a fresh one
    Restart,
    /// Instance torn down, host should return to the menu
    Menu,
}

/// Host collaborators handed to an instance for one frame
pub struct FrameContext<'a> {
    pub timing: &'a mut TimingController,
    pub sound: &'a mut dyn SoundSink,
    pub scores: &'a mut dyn HighScoreStore,
}

/// Serializable view for renderers and debugging
#[derive(Debug, Serialize)]
pub struct Snapshot<'a> {
    pub phase: Phase,
    pub level_id: &'a str,
    pub levels: &'a LevelManager,
    pub progress: f64,
    pub spawner: &'a Spawner,
    pub continues: u32,
    pub peg_value: i64,
    pub bouncer_value: i64,
    pub offers: &'a [UpgradeOffer],
    pub choices: &'a [GateChoice],
    pub highlight: usize,
    pub entities: Vec<&'a Entity>,
}

#[derive(Debug)]
pub struct GameState {
    id: InstanceId,
    config: SimConfig,
    level_id: String,
    scene: Scene,
    queue: EventQueue,
    spawner: Spawner,
    levels: LevelManager,
    upgrades: UpgradeManager,
    offers: Vec<UpgradeOffer>,
    choices: Vec<GateChoice>,
    highlight: usize,
    phase: Phase,
    continues: u32,
    peg_value: i64,
    bouncer_value: i64,
    /// Simulated time, advanced only by physics steps
    clock_ms: f64,
    rng: Pcg32,
}

impl GameState {
    /// Empty instance; populate it with a level builder
    pub fn new(config: SimConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        let id = InstanceId(NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed));
        log::debug!("Creating instance {:?} with seed {}", id, seed);
        Self {
            id,
            level_id: String::from("custom"),
            scene: Scene::new(),
            queue: EventQueue::new(),
            spawner: Spawner::new(config.width),
            levels: LevelManager::new(config.levels),
            upgrades: UpgradeManager::new(),
            offers: Vec::new(),
            choices: Vec::new(),
            highlight: 0,
            phase: Phase::Running,
            continues: 0,
            peg_value: 1,
            bouncer_value: 1,
            clock_ms: 0.0,
            rng: Pcg32::seed_from_u64(seed),
            config,
        }
    }

    /// Instance populated by `choice`'s builder
    pub fn with_level(config: SimConfig, choice: &LevelChoice) -> Self {
        let mut state = Self::new(config);
        state.level_id = choice.id.to_string();
        (choice.init)(&mut state);
        log::info!(
            "Built level {} ({} entities)",
            choice.id,
            state.scene.registry().len()
        );
        state
    }

    fn play(&self, sink: &mut dyn SoundSink, sound: Sound) {
        sink.play(sound, self.config.play_sound);
    }

    /// Run one frame in the fixed order: input, drain, timers, physics,
    /// out-of-bounds, game over, graphics sync
    pub fn frame(
        &mut self,
        ctx: &mut FrameContext<'_>,
        input: &mut dyn InputSource,
        steps: u32,
    ) -> DrainOutcome {
        if self.phase == Phase::Destroyed {
            log::warn!("Frame on destroyed instance {:?}", self.id);
            return DrainOutcome::Continue;
        }
        self.parse_input(input, ctx);
        let outcome = self.parse_events(ctx);
        if outcome != DrainOutcome::Continue {
            return outcome;
        }
        self.run_timers(ctx.timing);
        self.update_step(steps, STEP_MS);
        self.check_out_of_bounds();
        self.check_game_over();
        self.update_graphics();
        DrainOutcome::Continue
    }

    /// Translate polled actions into events or gate navigation
    pub fn parse_input(&mut self, input: &mut dyn InputSource, ctx: &mut FrameContext<'_>) {
        if !self.config.check_input || self.phase == Phase::Destroyed {
            return;
        }

        if input.poll(Action::Menu) {
            input.reset(Some(Action::Menu));
            self.queue.push(GameEvent::GotoMenu);
            return;
        }
        if input.poll(Action::Restart) {
            input.reset(Some(Action::Restart));
            self.queue.push(GameEvent::Restart);
            return;
        }

        let options = match self.phase {
            Phase::Running => {
                if input.poll(Action::Spawn) {
                    input.reset(Some(Action::Spawn));
                    self.spawn_orb();
                }
                return;
            }
            Phase::UpgradePending => self.offers.len(),
            Phase::GameOverPending | Phase::WinPending => self.choices.len(),
            Phase::Destroyed => return,
        };
        if options == 0 {
            return;
        }

        if input.poll(Action::Up) || input.poll(Action::Left) {
            input.reset(Some(Action::Up));
            input.reset(Some(Action::Left));
            self.highlight = (self.highlight + options - 1) % options;
        }
        if input.poll(Action::Down) || input.poll(Action::Right) {
            input.reset(Some(Action::Down));
            input.reset(Some(Action::Right));
            self.highlight = (self.highlight + 1) % options;
        }
        if input.poll(Action::Select) {
            input.reset(Some(Action::Select));
            self.play(ctx.sound, Sound::Select);
            match self.phase {
                Phase::UpgradePending => {
                    self.select_upgrade(self.highlight);
                }
                _ => self.choose_gate(self.highlight),
            }
        }
    }

    /// Drop orbs from the spawner. Unlimited when balls aren't counted.
    pub fn spawn_orb(&mut self) -> Vec<EntityId> {
        self.spawner
            .spawn_orb(!self.config.count_balls, &mut self.scene, &mut self.rng)
    }

    /// Queue the event for a game-over or win gate choice
    pub fn choose_gate(&mut self, index: usize) {
        let Some(choice) = self.choices.get(index).copied() else {
            log::warn!("No gate choice {} in {:?}", index, self.phase);
            return;
        };
        let event = match choice {
            GateChoice::Restart => GameEvent::Restart,
            GateChoice::Continue => GameEvent::Continue {
                continues: self.continues + 1,
            },
            GateChoice::Endless => GameEvent::Endless {
                level: self.levels.level(),
            },
        };
        self.queue.push(event);
    }

    /// Apply the chosen offer and resume. Re-checks the level target since
    /// an upgrade can push the score over it.
    pub fn select_upgrade(&mut self, index: usize) -> bool {
        if self.phase != Phase::UpgradePending {
            log::warn!("Upgrade selected while {:?}", self.phase);
            return false;
        }
        let Some(offer) = self.offers.get(index).cloned() else {
            log::warn!("No upgrade offer {}", index);
            return false;
        };
        log::info!("Selected upgrade: {}", offer.title);
        self.apply_upgrade(offer.effect);
        self.offers.clear();
        self.highlight = 0;
        self.phase = Phase::Running;
        self.levels.check(&mut self.queue);
        true
    }

    pub fn apply_upgrade(&mut self, effect: UpgradeEffect) {
        match effect {
            UpgradeEffect::AddBouncers(n) => {
                for _ in 0..n {
                    let pegs = self.scene.registry().ids_with(EntityTag::Peg);
                    if pegs.is_empty() {
                        log::error!("No pegs to replace!");
                        break;
                    }
                    let pick = pegs[self.rng.random_range(0..pegs.len())];
                    self.scene.convert_peg_to_bouncer(pick);
                }
            }
            UpgradeEffect::SpawnerSlower(n) => self.spawner.add_speed(-(n as i32)),
            UpgradeEffect::Accuracy(n) => self.spawner.add_accuracy(n as i32),
            UpgradeEffect::DropCount(n) => self.spawner.add_drop_count(n),
            UpgradeEffect::GoalFlat(n) => self.map_goals(|score| score + n as i64),
            UpgradeEffect::GoalMultiply(pct) => {
                self.map_goals(|score| (score as f64 * (100 + pct) as f64 / 100.0).round() as i64)
            }
            UpgradeEffect::GoalShuffle => {
                let goals = self.scene.registry().ids_with(EntityTag::Goal);
                let mut values: Vec<i64> = goals
                    .iter()
                    .filter_map(|id| self.scene.get(*id).and_then(|e| e.kind.score()))
                    .collect();
                values.shuffle(&mut self.rng);
                for (id, value) in goals.into_iter().zip(values) {
                    if let Some(entity) = self.scene.registry_mut().get_mut(id) {
                        entity.kind = EntityKind::Goal { score: value };
                    }
                }
            }
            UpgradeEffect::ExtraBalls(n) => self.spawner.add_balls(n),
            UpgradeEffect::BonusScore(n) => {
                if self.config.track_progress {
                    self.levels.add(n as i64, &mut self.queue);
                }
            }
            UpgradeEffect::PegValue(n) => self.peg_value += n as i64,
            UpgradeEffect::BouncerValue(n) => self.bouncer_value += n as i64,
        }
    }

    fn map_goals(&mut self, f: impl Fn(i64) -> i64) {
        for (_, entity) in self.scene.registry_mut().iter_mut() {
            if let EntityKind::Goal { score } = &mut entity.kind {
                *score = f(*score);
            }
        }
    }

    fn award(&mut self, points: i64) {
        if self.config.track_progress {
            self.levels.add(points, &mut self.queue);
            self.spawner.add_drop_score(points);
        }
    }

    /// Handle every queued event, including ones queued along the way.
    /// Restart and menu events tear the instance down and end the pass.
    pub fn parse_events(&mut self, ctx: &mut FrameContext<'_>) -> DrainOutcome {
        while let Some(event) = self.queue.pop() {
            match event {
                GameEvent::Score { orb, goal } => {
                    let Some(points) = self.scene.get(goal).and_then(|e| e.kind.score()) else {
                        log::error!("Score against missing goal {:?}", goal);
                        continue;
                    };
                    if !self.scene.despawn(orb) {
                        log::debug!("Orb {:?} already gone, skipping score", orb);
                        continue;
                    }
                    self.play(ctx.sound, Sound::Score);
                    self.award(points);
                }
                GameEvent::PegHit { .. } => {
                    self.play(ctx.sound, Sound::Peg);
                    self.award(self.peg_value);
                }
                GameEvent::BouncerHit { orb, bouncer } => {
                    self.play(ctx.sound, Sound::Bouncer);
                    self.award(self.bouncer_value);
                    self.bounce(orb, bouncer);
                }
                GameEvent::OrbHit { .. } | GameEvent::MiscHit { .. } => {}
                GameEvent::OutOfBounds { orb } => {
                    log::error!(
                        "Orb {:?} left the playfield at {:?}",
                        orb,
                        self.scene.position(orb)
                    );
                    if self.scene.despawn(orb) {
                        self.play(ctx.sound, Sound::Error);
                    }
                }
                GameEvent::LevelUp { level } => self.on_level_up(level, ctx),
                GameEvent::GameWin { level } => self.on_game_win(level, ctx),
                GameEvent::Endless { level } => {
                    if self.phase != Phase::WinPending
                        || level != self.levels.level()
                        || self.levels.endless()
                    {
                        log::warn!(
                            "Rejected Endless({}) at level {} in {:?} (endless: {})",
                            level,
                            self.levels.level(),
                            self.phase,
                            self.levels.endless()
                        );
                        continue;
                    }
                    log::info!("Entering endless mode at level {}", level);
                    self.levels.enter_endless();
                    self.offers.clear();
                    self.choices.clear();
                    self.highlight = 0;
                    self.phase = Phase::Running;
                    self.levels.check(&mut self.queue);
                }
                GameEvent::GameOver => self.on_game_over(ctx),
                GameEvent::Continue { continues } => {
                    if self.phase != Phase::GameOverPending || continues != self.continues + 1 {
                        log::warn!(
                            "Rejected Continue({}) with {} continues in {:?}",
                            continues,
                            self.continues,
                            self.phase
                        );
                        continue;
                    }
                    self.continues = continues;
                    self.spawner.reset_used();
                    self.choices.clear();
                    self.highlight = 0;
                    self.phase = Phase::Running;
                    log::info!("Continue #{}", continues);
                }
                GameEvent::Restart => {
                    self.destroy(ctx.timing);
                    return DrainOutcome::Restart;
                }
                GameEvent::GotoMenu => {
                    self.destroy(ctx.timing);
                    return DrainOutcome::Menu;
                }
            }
        }
        DrainOutcome::Continue
    }

    /// Kick the orb away from the bouncer, proportional to their offset
    fn bounce(&mut self, orb: EntityId, bouncer: EntityId) {
        let Some(magnitude) = self.scene.get(bouncer).and_then(|e| e.kind.bounce()) else {
            log::error!("Bouncer {:?} has no bounce", bouncer);
            return;
        };
        let (Some(orb_pos), Some(bouncer_pos), Some(vel)) = (
            self.scene.position(orb),
            self.scene.position(bouncer),
            self.scene.velocity(orb),
        ) else {
            log::debug!("Bounce on missing orb {:?}", orb);
            return;
        };
        let kick = (orb_pos - bouncer_pos) * magnitude * BOUNCE_SCALE;
        self.scene.set_velocity(orb, vel + kick);
    }

    fn on_level_up(&mut self, level: u32, ctx: &mut FrameContext<'_>) {
        if level != self.levels.level() + 1 {
            log::warn!(
                "Rejected LevelUp({}) at level {}",
                level,
                self.levels.level()
            );
            return;
        }
        if self.phase != Phase::Running {
            log::warn!("Rejected LevelUp({}) while {:?}", level, self.phase);
            return;
        }

        self.levels.level_up();
        self.spawner.reset_used();
        self.spawner.add_balls(BALLS_PER_LEVEL);
        self.spawner.add_speed(1);
        self.offers = self.upgrades.generate(OFFER_COUNT, &mut self.rng, level);
        self.highlight = 0;
        self.phase = Phase::UpgradePending;
        self.play(ctx.sound, Sound::LevelUp);

        if self.config.auto_control {
            ctx.timing
                .create_timer(self.id, TimerAction::AutoPickUpgrade { level }, AUTO_DELAY_MS);
        }
    }

    fn on_game_win(&mut self, level: u32, ctx: &mut FrameContext<'_>) {
        if self.levels.endless()
            || level != self.levels.level()
            || level < self.config.levels
            || self.phase != Phase::Running
        {
            log::warn!(
                "Rejected GameWin({}) at level {} in {:?}",
                level,
                self.levels.level(),
                self.phase
            );
            return;
        }

        log::info!("Won {} at level {}", self.level_id, level);
        ctx.scores.add_high_score(&self.level_id, level);
        self.choices = vec![GateChoice::Restart, GateChoice::Endless];
        self.highlight = 0;
        self.phase = Phase::WinPending;
        self.play(ctx.sound, Sound::LevelUp);

        if self.config.auto_control {
            ctx.timing
                .create_timer(self.id, TimerAction::AutoEndless { level }, AUTO_DELAY_MS);
        }
    }

    fn game_over_ready(&self) -> bool {
        self.config.count_balls
            && self.phase == Phase::Running
            && self.spawner.exhausted()
            && self.orb_count() == 0
    }

    fn on_game_over(&mut self, ctx: &mut FrameContext<'_>) {
        if !self.game_over_ready() || !self.queue.is_empty() {
            log::warn!("Rejected GameOver in {:?}", self.phase);
            return;
        }

        let level = self.levels.level();
        log::info!("Game over on {} at level {}", self.level_id, level);
        ctx.scores.add_high_score(&self.level_id, level);
        self.choices = vec![GateChoice::Restart, GateChoice::Continue];
        self.highlight = 0;
        self.phase = Phase::GameOverPending;
        self.play(ctx.sound, Sound::GameOver);

        if self.config.auto_control {
            let continues = self.continues + 1;
            ctx.timing
                .create_timer(self.id, TimerAction::AutoContinue { continues }, AUTO_DELAY_MS);
        }
    }

    /// Fire this instance's due timers
    pub fn run_timers(&mut self, timing: &mut TimingController) {
        timing.run_timers(self.id, self);
    }

    /// Advance spawner and physics by `steps` fixed steps. Skipped while a
    /// gate is pending or events are still queued.
    pub fn update_step(&mut self, steps: u32, step_ms: f64) -> bool {
        if self.phase != Phase::Running {
            return false;
        }
        if !self.queue.is_empty() {
            log::debug!("{} events pending, holding physics", self.queue.len());
            return false;
        }

        for _ in 0..steps {
            self.spawner.update(step_ms);
            if self.config.auto_control
                && self.spawner.auto_tick(step_ms)
                && self.orb_count() < AUTO_ORB_CAP
            {
                self.spawn_orb();
            }

            self.clock_ms += step_ms;
            self.scene.advance_paths(self.clock_ms);
            self.scene.step((step_ms / 1000.0) as f32);
            for (a, b) in self.scene.drain_contacts() {
                let (Some(ea), Some(eb)) = (self.scene.get(a), self.scene.get(b)) else {
                    continue;
                };
                if let Some(event) = classify((a, ea), (b, eb)) {
                    self.queue.push(event);
                }
            }
        }
        true
    }

    /// Queue removal of orbs that escaped the playfield
    pub fn check_out_of_bounds(&mut self) {
        let min = Vec2::splat(-OUT_OF_BOUNDS_MARGIN);
        let max = Vec2::new(self.config.width, self.config.height) + OUT_OF_BOUNDS_MARGIN;
        for orb in self.scene.registry().ids_with(EntityTag::Orb) {
            let Some(pos) = self.scene.position(orb) else {
                continue;
            };
            let escaped = pos.cmplt(min).any() || pos.cmpgt(max).any();
            if escaped && self.queue.count(|e| *e == GameEvent::OutOfBounds { orb }) == 0 {
                self.queue.push(GameEvent::OutOfBounds { orb });
            }
        }
    }

    /// Queue game over once balls and orbs are spent and nothing is pending
    pub fn check_game_over(&mut self) -> bool {
        if self.game_over_ready() && self.queue.is_empty() {
            self.queue.push(GameEvent::GameOver);
            return true;
        }
        false
    }

    /// Sync cached entity positions for the renderer
    pub fn update_graphics(&mut self) {
        self.scene.sync_positions();
    }

    /// Tear down: drop every entity, event, gate and timer
    pub fn destroy(&mut self, timing: &mut TimingController) {
        if self.phase == Phase::Destroyed {
            return;
        }
        log::info!("Destroying instance {:?} ({})", self.id, self.level_id);
        self.scene.clear();
        self.queue.clear();
        self.offers.clear();
        self.choices.clear();
        self.highlight = 0;
        timing.clear_timers_for(self.id);
        self.phase = Phase::Destroyed;
    }

    pub fn enqueue(&mut self, event: GameEvent) {
        self.queue.push(event);
    }

    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            phase: self.phase,
            level_id: &self.level_id,
            levels: &self.levels,
            progress: self.levels.progress(),
            spawner: &self.spawner,
            continues: self.continues,
            peg_value: self.peg_value,
            bouncer_value: self.bouncer_value,
            offers: &self.offers,
            choices: &self.choices,
            highlight: self.highlight,
            entities: self
                .scene
                .registry()
                .iter()
                .map(|(_, e)| e)
                .filter(|e| e.kind.is_visible())
                .collect(),
        }
    }

    pub fn snapshot_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    /// Live entities in stable order
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.scene.registry().iter()
    }

    pub fn orb_count(&self) -> usize {
        self.scene.registry().count(EntityTag::Orb)
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn level_id(&self) -> &str {
        &self.level_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Level builders populate the scene through this
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn levels(&self) -> &LevelManager {
        &self.levels
    }

    pub fn spawner(&self) -> &Spawner {
        &self.spawner
    }

    pub fn offers(&self) -> &[UpgradeOffer] {
        &self.offers
    }

    pub fn choices(&self) -> &[GateChoice] {
        &self.choices
    }

    pub fn highlight(&self) -> usize {
        self.highlight
    }

    pub fn continues(&self) -> u32 {
        self.continues
    }

    pub fn peg_value(&self) -> i64 {
        self.peg_value
    }

    pub fn bouncer_value(&self) -> i64 {
        self.bouncer_value
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }
}

impl TimerTarget for GameState {
    fn on_timer(&mut self, action: TimerAction) {
        match action {
            TimerAction::AutoPickUpgrade { level } => {
                if self.phase != Phase::UpgradePending || self.levels.level() != level {
                    log::debug!("Stale auto-pick for level {}", level);
                    return;
                }
                if self.offers.is_empty() {
                    return;
                }
                let pick = self.rng.random_range(0..self.offers.len());
                self.select_upgrade(pick);
            }
            TimerAction::AutoContinue { continues } => {
                if self.phase != Phase::GameOverPending || continues != self.continues + 1 {
                    log::debug!("Stale auto-continue {}", continues);
                    return;
                }
                self.queue.push(GameEvent::Continue { continues });
            }
            TimerAction::AutoEndless { level } => {
                if self.phase != Phase::WinPending || self.levels.level() != level {
                    log::debug!("Stale auto-endless for level {}", level);
                    return;
                }
                self.queue.push(GameEvent::Endless { level });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{MAX_STEPS, START_BALLS, START_SPEED};
    use crate::highscores::HighScores;
    use crate::input::InputState;
    use crate::levels::CLASSIC;
    use crate::sim::level::target;
    use crate::sound::LogSound;

    struct Harness {
        timing: TimingController,
        sound: LogSound,
        scores: HighScores,
        input: InputState,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                timing: TimingController::new(),
                sound: LogSound::new(),
                scores: HighScores::for_levels(),
                input: InputState::new(),
            }
        }

        fn drain(&mut self, state: &mut GameState) -> DrainOutcome {
            let mut ctx = FrameContext {
                timing: &mut self.timing,
                sound: &mut self.sound,
                scores: &mut self.scores,
            };
            state.parse_events(&mut ctx)
        }

        fn frame(&mut self, state: &mut GameState, delta_ms: f64) -> DrainOutcome {
            self.timing.begin_frame(delta_ms);
            let steps = self.timing.get_steps(STEP_MS);
            let outcome = {
                let mut ctx = FrameContext {
                    timing: &mut self.timing,
                    sound: &mut self.sound,
                    scores: &mut self.scores,
                };
                state.frame(&mut ctx, &mut self.input, steps.min(MAX_STEPS))
            };
            self.timing.step(steps, STEP_MS);
            outcome
        }
    }

    fn classic(config: SimConfig) -> GameState {
        GameState::with_level(config.with_seed(7), &CLASSIC)
    }

    fn bare(config: SimConfig) -> GameState {
        GameState::new(config.with_seed(7))
    }

    fn exhaust(state: &mut GameState) {
        while !state.spawner.exhausted() {
            for orb in state.spawn_orb() {
                state.scene.despawn(orb);
            }
        }
    }

    /// Goal far below the field plus an orb to score with it
    fn scoring_pair(state: &mut GameState, points: i64) -> (EntityId, EntityId) {
        let goal = state
            .scene
            .spawn_goal(Vec2::new(500.0, 5000.0), Vec2::new(40.0, 15.0), points);
        let orb = state.scene.spawn_orb(Vec2::new(500.0, 4000.0), Vec2::ZERO);
        (orb, goal)
    }

    #[test]
    fn test_empty_drain_is_noop() {
        let mut h = Harness::new();
        let mut state = classic(SimConfig::interactive());
        let before = state.snapshot_json().unwrap();
        assert_eq!(h.drain(&mut state), DrainOutcome::Continue);
        assert_eq!(state.snapshot_json().unwrap(), before);
        assert!(h.sound.played().is_empty());
    }

    #[test]
    fn test_level_up_guard() {
        let mut h = Harness::new();
        let mut state = bare(SimConfig::interactive());

        state.enqueue(GameEvent::LevelUp { level: 3 });
        h.drain(&mut state);
        assert_eq!(state.levels().level(), 1);
        assert_eq!(state.phase(), Phase::Running);
        assert!(state.offers().is_empty());

        state.enqueue(GameEvent::LevelUp { level: 2 });
        state.enqueue(GameEvent::LevelUp { level: 2 });
        h.drain(&mut state);
        assert_eq!(state.levels().level(), 2);
        assert_eq!(state.phase(), Phase::UpgradePending);
        assert_eq!(state.offers().len(), OFFER_COUNT);
        assert_eq!(state.spawner().balls(), START_BALLS + BALLS_PER_LEVEL);
        assert_eq!(state.spawner().balls_used(), 0);
        assert_eq!(state.spawner().speed(), START_SPEED + 1);
        assert_eq!(h.sound.played(), &[Sound::LevelUp]);
    }

    #[test]
    fn test_score_levels_up_once() {
        let mut h = Harness::new();
        let config = SimConfig {
            track_progress: true,
            width: 1000.0,
            ..SimConfig::interactive()
        };
        let mut state = bare(config);
        let (orb, goal) = scoring_pair(&mut state, 250);

        state.enqueue(GameEvent::Score { orb, goal });
        h.drain(&mut state);
        assert_eq!(state.levels().score(), 250);
        assert_eq!(state.levels().level(), 2);
        assert_eq!(state.phase(), Phase::UpgradePending);
        assert!(state.scene().get(orb).is_none());

        assert!(state.select_upgrade(0));
        h.drain(&mut state);
        assert_eq!(state.phase(), Phase::Running);

        let orb = state.scene.spawn_orb(Vec2::new(500.0, 4000.0), Vec2::ZERO);
        state.enqueue(GameEvent::Score { orb, goal });
        h.drain(&mut state);
        assert_eq!(state.levels().level(), 2);
        assert!(state.levels().score() < target(2));

        let missing = target(2) - state.levels().score();
        state.levels.add(missing, &mut state.queue);
        assert_eq!(state.pending_events(), 1);
        assert_eq!(state.queue.pop(), Some(GameEvent::LevelUp { level: 3 }));
    }

    #[test]
    fn test_double_score_on_same_orb() {
        let mut h = Harness::new();
        let mut state = bare(SimConfig::interactive());
        let (orb, goal) = scoring_pair(&mut state, 100);
        state.enqueue(GameEvent::Score { orb, goal });
        state.enqueue(GameEvent::Score { orb, goal });
        h.drain(&mut state);
        assert_eq!(state.levels().score(), 100);
    }

    #[test]
    fn test_bouncer_upgrade_converts_pegs() {
        let mut state = classic(SimConfig::interactive());
        let registry = state.scene().registry();
        let (pegs, bouncers, total) = (
            registry.count(EntityTag::Peg),
            registry.count(EntityTag::Bouncer),
            registry.len(),
        );

        state.apply_upgrade(UpgradeEffect::AddBouncers(3));
        let registry = state.scene().registry();
        assert_eq!(registry.count(EntityTag::Peg), pegs - 3);
        assert_eq!(registry.count(EntityTag::Bouncer), bouncers + 3);
        assert_eq!(registry.len(), total);
    }

    #[test]
    fn test_goal_upgrades() {
        let mut state = classic(SimConfig::interactive());
        let goal_values = |state: &GameState| -> Vec<i64> {
            state
                .entities()
                .filter_map(|(_, e)| e.kind.score())
                .collect()
        };
        let mut before = goal_values(&state);

        state.apply_upgrade(UpgradeEffect::GoalFlat(10));
        let flat: Vec<i64> = before.iter().map(|v| v + 10).collect();
        assert_eq!(goal_values(&state), flat);

        state.apply_upgrade(UpgradeEffect::GoalMultiply(50));
        let scaled: Vec<i64> = flat.iter().map(|v| v * 3 / 2).collect();
        assert_eq!(goal_values(&state), scaled);

        state.apply_upgrade(UpgradeEffect::GoalShuffle);
        let mut shuffled = goal_values(&state);
        shuffled.sort();
        before = scaled;
        before.sort();
        assert_eq!(shuffled, before);
    }

    #[test]
    fn test_game_over_enqueued_once() {
        let mut h = Harness::new();
        let mut state = classic(SimConfig::interactive());
        exhaust(&mut state);

        assert!(state.check_game_over());
        assert!(!state.check_game_over());
        assert_eq!(state.pending_events(), 1);

        h.drain(&mut state);
        assert_eq!(state.phase(), Phase::GameOverPending);
        assert_eq!(state.choices(), &[GateChoice::Restart, GateChoice::Continue]);
        assert_eq!(h.scores.high_score("classic"), 1);
        assert!(h.sound.played().contains(&Sound::GameOver));

        for _ in 0..100 {
            h.frame(&mut state, 16.0);
            assert_eq!(state.queue.count(|e| *e == GameEvent::GameOver), 0);
        }
        assert_eq!(state.phase(), Phase::GameOverPending);
    }

    #[test]
    fn test_game_over_needs_empty_field() {
        let mut state = classic(SimConfig::interactive());
        exhaust(&mut state);
        state.scene.spawn_orb(Vec2::new(500.0, 100.0), Vec2::ZERO);
        assert!(!state.check_game_over());

        let mut preview = classic(SimConfig::preview());
        for _ in 0..START_BALLS + 1 {
            for orb in preview.spawn_orb() {
                preview.scene.despawn(orb);
            }
        }
        assert!(!preview.spawner().exhausted());
        assert!(!preview.check_game_over());
    }

    #[test]
    fn test_manual_gate_never_auto_resolves() {
        let mut h = Harness::new();
        let mut state = classic(SimConfig::interactive());
        state.enqueue(GameEvent::LevelUp { level: 2 });
        for _ in 0..1000 {
            h.frame(&mut state, 16.0);
        }
        assert_eq!(state.phase(), Phase::UpgradePending);
        assert_eq!(h.timing.pending_timers(state.id()), 0);
    }

    #[test]
    fn test_auto_control_picks_upgrade() {
        let mut h = Harness::new();
        let config = SimConfig {
            auto_control: true,
            ..SimConfig::interactive()
        };
        let mut state = classic(config);
        state.enqueue(GameEvent::LevelUp { level: 2 });

        h.frame(&mut state, 16.0);
        assert_eq!(state.phase(), Phase::UpgradePending);
        assert_eq!(h.timing.pending_timers(state.id()), 1);

        for _ in 0..150 {
            h.frame(&mut state, 16.0);
        }
        assert_eq!(state.phase(), Phase::Running);
        assert!(state.offers().is_empty());
        assert_eq!(state.levels().level(), 2);
    }

    #[test]
    fn test_stale_auto_pick_is_ignored() {
        let mut h = Harness::new();
        let config = SimConfig {
            auto_control: true,
            ..SimConfig::interactive()
        };
        let mut state = bare(config);
        state.enqueue(GameEvent::LevelUp { level: 2 });
        h.frame(&mut state, 16.0);
        assert!(state.select_upgrade(0));

        for _ in 0..200 {
            h.frame(&mut state, 16.0);
        }
        assert_eq!(state.levels().level(), 2);
        assert_eq!(state.phase(), Phase::Running);
        assert_eq!(h.timing.pending_timers(state.id()), 0);
    }

    #[test]
    fn test_restart_truncates_drain() {
        let mut h = Harness::new();
        let mut state = classic(SimConfig::interactive());
        state.enqueue(GameEvent::Restart);
        state.enqueue(GameEvent::LevelUp { level: 2 });

        assert_eq!(h.drain(&mut state), DrainOutcome::Restart);
        assert_eq!(state.levels().level(), 1);
        assert_eq!(state.phase(), Phase::Destroyed);
        assert!(state.scene().registry().is_empty());
        assert_eq!(state.scene().body_count(), 0);
        assert_eq!(state.pending_events(), 0);
    }

    #[test]
    fn test_menu_key_leaves() {
        let mut h = Harness::new();
        let mut state = classic(SimConfig::interactive());
        h.input.press(Action::Menu);
        assert_eq!(h.frame(&mut state, 16.0), DrainOutcome::Menu);
        assert!(!h.input.poll(Action::Menu));
    }

    #[test]
    fn test_continue_guard_and_gate_input() {
        let mut h = Harness::new();
        let mut state = classic(SimConfig::interactive());
        exhaust(&mut state);
        state.check_game_over();
        h.drain(&mut state);
        assert_eq!(state.phase(), Phase::GameOverPending);

        state.enqueue(GameEvent::Continue { continues: 5 });
        h.drain(&mut state);
        assert_eq!(state.phase(), Phase::GameOverPending);
        assert_eq!(state.continues(), 0);

        h.input.press(Action::Down);
        h.input.press(Action::Select);
        h.frame(&mut state, 16.0);
        assert_eq!(state.phase(), Phase::Running);
        assert_eq!(state.continues(), 1);
        assert_eq!(state.spawner().balls_used(), 0);
    }

    #[test]
    fn test_out_of_bounds_removes_orb() {
        let mut h = Harness::new();
        let mut state = bare(SimConfig::interactive());
        state.scene.spawn_orb(Vec2::new(5000.0, 100.0), Vec2::ZERO);
        state.scene.spawn_orb(Vec2::new(500.0, 100.0), Vec2::ZERO);

        state.check_out_of_bounds();
        state.check_out_of_bounds();
        assert_eq!(state.pending_events(), 1);

        h.drain(&mut state);
        assert_eq!(state.orb_count(), 1);
        assert_eq!(h.sound.played(), &[Sound::Error]);
    }

    #[test]
    fn test_win_then_endless() {
        let mut h = Harness::new();
        let config = SimConfig {
            levels: 1,
            ..SimConfig::interactive()
        };
        let mut state = classic(config);
        let (orb, goal) = scoring_pair(&mut state, 250);
        state.enqueue(GameEvent::Score { orb, goal });
        h.drain(&mut state);

        assert_eq!(state.phase(), Phase::WinPending);
        assert_eq!(state.choices(), &[GateChoice::Restart, GateChoice::Endless]);
        assert_eq!(h.scores.high_score("classic"), 1);

        h.input.press(Action::Down);
        h.input.press(Action::Select);
        h.frame(&mut state, 16.0);
        assert!(state.levels().endless());
        assert_eq!(state.levels().level(), 2);
        assert_eq!(state.phase(), Phase::UpgradePending);

        // Stale endless request
        state.enqueue(GameEvent::Endless { level: 2 });
        h.drain(&mut state);
        assert_eq!(state.phase(), Phase::UpgradePending);
    }

    #[test]
    fn test_game_win_rejected_in_endless_or_early() {
        let mut h = Harness::new();
        let config = SimConfig {
            levels: 1,
            ..SimConfig::interactive()
        };
        let mut state = classic(config);
        state.levels.enter_endless();
        state.enqueue(GameEvent::GameWin { level: 1 });
        h.drain(&mut state);
        assert_eq!(state.phase(), Phase::Running);
        assert!(state.choices().is_empty());

        // Below the configured level count
        let mut state = classic(SimConfig::interactive());
        assert!(state.config.levels > 1);
        state.enqueue(GameEvent::GameWin { level: 1 });
        h.drain(&mut state);
        assert_eq!(state.phase(), Phase::Running);
        assert!(state.choices().is_empty());
        assert_eq!(h.scores.high_score("classic"), 0);
    }

    #[test]
    fn test_endless_needs_win_gate() {
        let mut h = Harness::new();
        let mut state = classic(SimConfig::interactive());
        state.enqueue(GameEvent::LevelUp { level: 2 });
        h.drain(&mut state);
        assert_eq!(state.phase(), Phase::UpgradePending);
        let offers = state.offers().len();
        assert!(offers > 0);

        state.enqueue(GameEvent::Endless { level: 2 });
        h.drain(&mut state);
        assert_eq!(state.phase(), Phase::UpgradePending);
        assert!(!state.levels().endless());
        assert_eq!(state.offers().len(), offers);
    }

    #[test]
    fn test_bouncer_kicks_outward() {
        let mut h = Harness::new();
        let mut state = bare(SimConfig::interactive());
        let bouncer = state.scene.spawn_bouncer(Vec2::new(500.0, 500.0));
        let orb = state.scene.spawn_orb(Vec2::new(520.0, 500.0), Vec2::ZERO);
        state.enqueue(GameEvent::BouncerHit { orb, bouncer });
        h.drain(&mut state);

        let vel = state.scene().velocity(orb).unwrap();
        assert!((vel.x - 20.0 * 10.0 * BOUNCE_SCALE).abs() < 1e-3);
        assert_eq!(vel.y, 0.0);
        assert_eq!(state.levels().score(), 1);
    }

    #[test]
    fn test_physics_held_while_events_pending() {
        let mut state = bare(SimConfig::interactive());
        let orb = state.scene.spawn_orb(Vec2::new(500.0, 100.0), Vec2::ZERO);
        state.enqueue(GameEvent::MiscHit { orb, other: orb });
        assert!(!state.update_step(2, STEP_MS));
        assert_eq!(state.scene().position(orb), Some(Vec2::new(500.0, 100.0)));
    }

    #[test]
    fn test_preview_is_silent_and_endless() {
        let mut h = Harness::new();
        let mut state = classic(SimConfig::preview());
        for _ in 0..600 {
            h.frame(&mut state, 1000.0 / 60.0);
        }
        assert!(h.sound.played().is_empty());
        assert_eq!(state.phase(), Phase::Running);
        assert_eq!(state.levels().score(), 0);
        assert_eq!(state.spawner().balls_used(), 0);
        assert!(state.orb_count() > 0);
    }

    #[test]
    fn test_orbs_reach_goals() {
        let mut h = Harness::new();
        let config = SimConfig {
            auto_control: true,
            ..SimConfig::interactive()
        };
        let mut state = classic(config);
        for _ in 0..1800 {
            h.frame(&mut state, 1000.0 / 60.0);
        }
        assert!(state.levels().score() > 0);
        assert!(h.sound.played().contains(&Sound::Score));
    }
}
