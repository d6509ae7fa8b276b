//! Score thresholds and level progression

use serde::Serialize;

use super::events::{EventQueue, GameEvent};

/// Score needed to finish `level`
pub fn target(level: u32) -> i64 {
    ((level as f64).powf(2.025) * 250.0).round() as i64
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelManager {
    score: i64,
    level: u32,
    last_target: i64,
    target: i64,
    endless: bool,
    end_level: u32,
}

impl LevelManager {
    pub fn new(end_level: u32) -> Self {
        Self {
            score: 0,
            level: 1,
            last_target: 0,
            target: target(1),
            endless: false,
            end_level,
        }
    }

    /// Event for having reached the current target
    fn crossing_event(&self) -> GameEvent {
        if !self.endless && self.level >= self.end_level {
            GameEvent::GameWin { level: self.level }
        } else {
            GameEvent::LevelUp {
                level: self.level + 1,
            }
        }
    }

    /// Add points. Queues a level-up (or win) only on the call that first
    /// reaches the target.
    pub fn add(&mut self, delta: i64, queue: &mut EventQueue) {
        if delta < 0 {
            log::warn!("Ignoring negative score delta {}", delta);
            return;
        }
        let before = self.score;
        self.score += delta;
        if before < self.target && self.score >= self.target {
            queue.push(self.crossing_event());
        }
    }

    /// Queue a level-up (or win) if the target is already reached
    pub fn check(&self, queue: &mut EventQueue) {
        if self.score >= self.target {
            queue.push(self.crossing_event());
        }
    }

    pub fn level_up(&mut self) {
        self.last_target = self.target;
        self.level += 1;
        self.target = target(self.level);
        log::info!("Level {} (target {})", self.level, self.target);
    }

    pub fn enter_endless(&mut self) {
        self.endless = true;
    }

    /// Fraction of the way from the last target to the next
    pub fn progress(&self) -> f64 {
        let span = (self.target - self.last_target).max(1);
        ((self.score - self.last_target) as f64 / span as f64).clamp(0.0, 1.0)
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn target(&self) -> i64 {
        self.target
    }

    pub fn last_target(&self) -> i64 {
        self.last_target
    }

    pub fn endless(&self) -> bool {
        self.endless
    }

    pub fn end_level(&self) -> u32 {
        self.end_level
    }
}
