//! Contact classification
//!
//! Turns a contact-begin pair into at most one domain event. Rules are tried
//! in order and the first match wins, so an orb touching a goal scores even
//! though it would also match the generic orb rule.

use super::entity::{Entity, EntityId, EntityKind};
use super::events::GameEvent;

/// Classify a contact between two resolved entities
pub fn classify(a: (EntityId, &Entity), b: (EntityId, &Entity)) -> Option<GameEvent> {
    let event = classify_ordered(a, b).or_else(|| classify_ordered(b, a));
    if event.is_none() {
        log::warn!(
            "Unknown collision between {:?} and {:?}",
            a.1.kind.tag(),
            b.1.kind.tag()
        );
    }
    event
}

/// Single-orientation rules, with `orb` as the candidate orb
fn classify_ordered(
    (orb, orb_entity): (EntityId, &Entity),
    (other, other_entity): (EntityId, &Entity),
) -> Option<GameEvent> {
    if !orb_entity.kind.is_orb() {
        return None;
    }
    let event = match other_entity.kind {
        EntityKind::Goal { .. } => GameEvent::Score { orb, goal: other },
        EntityKind::Peg => GameEvent::PegHit { orb, peg: other },
        EntityKind::Bouncer { .. } => GameEvent::BouncerHit {
            orb,
            bouncer: other,
        },
        EntityKind::Orb => GameEvent::OrbHit { a: orb, b: other },
        EntityKind::Wall | EntityKind::InvisibleBoundary => GameEvent::MiscHit { orb, other },
    };
    Some(event)
}
