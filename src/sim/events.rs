//! Domain events and the per-instance event queue

use std::collections::VecDeque;

use serde::Serialize;

use super::entity::EntityId;

/// Every state transition outside physics integration goes through one of these
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum GameEvent {
    /// Orb landed in a goal
    Score { orb: EntityId, goal: EntityId },
    PegHit { orb: EntityId, peg: EntityId },
    BouncerHit { orb: EntityId, bouncer: EntityId },
    /// Cosmetic only
    OrbHit { a: EntityId, b: EntityId },
    /// Orb touched a wall or boundary, cosmetic only
    MiscHit { orb: EntityId, other: EntityId },
    /// Orb escaped the playfield
    OutOfBounds { orb: EntityId },
    /// Advance to `level`
    LevelUp { level: u32 },
    /// Final level reached at `level`
    GameWin { level: u32 },
    /// Keep playing past the final level, entered from `level`
    Endless { level: u32 },
    GameOver,
    /// Resume after game over; `continues` is the expected new counter
    Continue { continues: u32 },
    Restart,
    GotoMenu,
}

/// FIFO queue drained once per frame
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<GameEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: GameEvent) {
        log::trace!("Queued {:?}", event);
        self.events.push_back(event);
    }

    pub fn pop(&mut self) -> Option<GameEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Count queued events matching `pred`
    pub fn count(&self, pred: impl Fn(&GameEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}
