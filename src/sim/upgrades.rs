//! Upgrade catalogue and offer generation
//!
//! Each generator draws a magnitude, then renders a title, description and
//! effect from it. The effect is plain data; the game state applies it.

use rand::Rng;
use rand_pcg::Pcg32;
use serde::Serialize;

/// What an upgrade does once chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpgradeEffect {
    /// Convert this many random pegs into bouncers
    AddBouncers(u32),
    /// Lower spawner speed
    SpawnerSlower(u32),
    /// Raise drop accuracy (percentage points)
    Accuracy(u32),
    /// Extra orbs per drop
    DropCount(u32),
    /// Add to every goal's value
    GoalFlat(u32),
    /// Scale every goal's value up by this percentage
    GoalMultiply(u32),
    /// Shuffle goal values between goals
    GoalShuffle,
    ExtraBalls(u32),
    BonusScore(u32),
    PegValue(u32),
    BouncerValue(u32),
}

/// One entry of the catalogue
pub struct UpgradeGenerator {
    pub id: &'static str,
    pub weight: u32,
    /// Draw a magnitude for the given level
    pub magnitude: fn(&mut Pcg32, u32) -> u32,
    pub title: fn(u32) -> String,
    pub description: fn(u32) -> String,
    pub effect: fn(u32) -> UpgradeEffect,
}

/// A concrete choice shown to the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeOffer {
    pub id: &'static str,
    pub title: String,
    pub description: String,
    pub effect: UpgradeEffect,
}

/// Discrete draw in `1..=levels`, each level `ratio` times as likely to stop
/// as to continue
pub fn upgrade_level(ratio: f64, levels: u32, rng: &mut Pcg32) -> u32 {
    let mut seed: f64 = rng.random();
    for level in 1..levels {
        if seed < ratio {
            return level;
        }
        seed = (seed - ratio) / (1.0 - ratio);
    }
    levels.max(1)
}

fn small_count(rng: &mut Pcg32, _level: u32) -> u32 {
    1 + upgrade_level(2.0 / 3.0, 3, rng)
}

fn single(_rng: &mut Pcg32, _level: u32) -> u32 {
    1
}

fn tens(rng: &mut Pcg32, _level: u32) -> u32 {
    10 * upgrade_level(0.5, 3, rng)
}

fn level_scaled(rng: &mut Pcg32, level: u32) -> u32 {
    50 * level.max(1) * upgrade_level(0.5, 3, rng)
}

fn no_magnitude(_rng: &mut Pcg32, _level: u32) -> u32 {
    0
}

pub static CATALOGUE: &[UpgradeGenerator] = &[
    UpgradeGenerator {
        id: "bouncers",
        weight: 4,
        magnitude: small_count,
        title: |n| format!("Bouncers +{n}"),
        description: |n| format!("Replace {n} pegs with bouncers"),
        effect: UpgradeEffect::AddBouncers,
    },
    UpgradeGenerator {
        id: "speed",
        weight: 3,
        magnitude: small_count,
        title: |n| format!("Speed -{n}"),
        description: |n| format!("Decrease the spawner's speed by {n}"),
        effect: UpgradeEffect::SpawnerSlower,
    },
    UpgradeGenerator {
        id: "accuracy",
        weight: 3,
        magnitude: tens,
        title: |n| format!("Accuracy +{n}%"),
        description: |n| format!("Drops land up to {n}% closer to the spawner"),
        effect: UpgradeEffect::Accuracy,
    },
    UpgradeGenerator {
        id: "multiball",
        weight: 1,
        magnitude: single,
        title: |n| format!("Multiball +{n}"),
        description: |n| format!("Each drop releases {n} more orb"),
        effect: UpgradeEffect::DropCount,
    },
    UpgradeGenerator {
        id: "goal_flat",
        weight: 3,
        magnitude: tens,
        title: |n| format!("Goals +{n}"),
        description: |n| format!("Every goal is worth {n} more points"),
        effect: UpgradeEffect::GoalFlat,
    },
    UpgradeGenerator {
        id: "goal_multiply",
        weight: 2,
        magnitude: tens,
        title: |n| format!("Goals +{n}%"),
        description: |n| format!("Every goal is worth {n}% more"),
        effect: UpgradeEffect::GoalMultiply,
    },
    UpgradeGenerator {
        id: "goal_shuffle",
        weight: 1,
        magnitude: no_magnitude,
        title: |_| "Shuffle".to_string(),
        description: |_| "Rearrange the goal values".to_string(),
        effect: |_| UpgradeEffect::GoalShuffle,
    },
    UpgradeGenerator {
        id: "balls",
        weight: 3,
        magnitude: small_count,
        title: |n| format!("Balls +{n}"),
        description: |n| format!("Gain {n} extra balls per level"),
        effect: UpgradeEffect::ExtraBalls,
    },
    UpgradeGenerator {
        id: "bonus",
        weight: 2,
        magnitude: level_scaled,
        title: |n| format!("Bonus {n}"),
        description: |n| format!("Gain {n} points right now"),
        effect: UpgradeEffect::BonusScore,
    },
    UpgradeGenerator {
        id: "peg_value",
        weight: 2,
        magnitude: small_count,
        title: |n| format!("Pegs +{n}"),
        description: |n| format!("Pegs award {n} more points per hit"),
        effect: UpgradeEffect::PegValue,
    },
    UpgradeGenerator {
        id: "bouncer_value",
        weight: 2,
        magnitude: small_count,
        title: |n| format!("Bouncer hits +{n}"),
        description: |n| format!("Bouncers award {n} more points per hit"),
        effect: UpgradeEffect::BouncerValue,
    },
];

/// Draws offers from a catalogue
pub struct UpgradeManager {
    catalogue: &'static [UpgradeGenerator],
}

impl Default for UpgradeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UpgradeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpgradeManager")
            .field("generators", &self.catalogue.len())
            .finish()
    }
}

impl UpgradeManager {
    pub fn new() -> Self {
        Self::with_catalogue(CATALOGUE)
    }

    pub fn with_catalogue(catalogue: &'static [UpgradeGenerator]) -> Self {
        Self { catalogue }
    }

    /// Draw up to `count` distinct offers, weighted, for a player at `level`
    pub fn generate(&self, count: usize, rng: &mut Pcg32, level: u32) -> Vec<UpgradeOffer> {
        let mut pool: Vec<&UpgradeGenerator> =
            self.catalogue.iter().filter(|g| g.weight > 0).collect();
        let mut offers = Vec::with_capacity(count);

        while offers.len() < count && !pool.is_empty() {
            let total: u32 = pool.iter().map(|g| g.weight).sum();
            let mut roll = rng.random_range(0..total);
            let mut pick = pool.len() - 1;
            for (i, generator) in pool.iter().enumerate() {
                if roll < generator.weight {
                    pick = i;
                    break;
                }
                roll -= generator.weight;
            }

            let generator = pool.remove(pick);
            let magnitude = (generator.magnitude)(rng, level);
            offers.push(UpgradeOffer {
                id: generator.id,
                title: (generator.title)(magnitude),
                description: (generator.description)(magnitude),
                effect: (generator.effect)(magnitude),
            });
        }
        offers
    }
}
