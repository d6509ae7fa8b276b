//! Best level reached per playfield
//!
//! Serialized to JSON by whoever owns the storage. Loading tolerates stale
//! data: unknown ids are dropped and missing ones start at zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What the simulation needs from score persistence
pub trait HighScoreStore {
    /// Record that a run on `id` reached `level`
    fn add_high_score(&mut self, id: &str, level: u32);
    /// Best level reached on `id`, zero if never played
    fn high_score(&self, id: &str) -> u32;
}

/// A playfield stays locked until `id` has been played to `level_max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockRequirement {
    pub id: &'static str,
    pub level_max: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HighScores {
    pub entries: BTreeMap<String, u32>,
}

impl HighScores {
    /// Fresh table with every id at zero
    pub fn new(ids: &[&str]) -> Self {
        Self {
            entries: ids.iter().map(|id| (id.to_string(), 0)).collect(),
        }
    }

    /// Table for the built-in playfields
    pub fn for_levels() -> Self {
        Self::new(&crate::levels::level_ids())
    }

    /// True when the table holds exactly `ids`
    pub fn validate(&self, ids: &[&str]) -> bool {
        self.entries.len() == ids.len() && ids.iter().all(|id| self.entries.contains_key(*id))
    }

    /// Reshape the table to exactly `ids`, keeping known scores
    pub fn cast(&mut self, ids: &[&str]) {
        self.entries.retain(|id, _| ids.contains(&id.as_str()));
        for id in ids {
            self.entries.entry(id.to_string()).or_insert(0);
        }
    }

    /// Parse saved scores, repairing them against `ids`
    pub fn from_json(json: &str, ids: &[&str]) -> Result<Self> {
        let mut scores: HighScores = serde_json::from_str(json)?;
        if !scores.validate(ids) {
            log::warn!("High scores don't match the level list, repairing");
            scores.cast(ids);
        } else {
            log::info!("Loaded {} high scores", scores.entries.len());
        }
        Ok(scores)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether every requirement is met
    pub fn is_unlocked(&self, requirements: &[UnlockRequirement]) -> bool {
        requirements
            .iter()
            .all(|req| self.high_score(req.id) >= req.level_max)
    }
}

impl HighScoreStore for HighScores {
    fn add_high_score(&mut self, id: &str, level: u32) {
        let Some(best) = self.entries.get_mut(id) else {
            log::error!("High score for unknown level id {:?}", id);
            return;
        };
        if level > *best {
            log::info!("New high score on {}: level {}", id, level);
            *best = level;
        }
    }

    fn high_score(&self, id: &str) -> u32 {
        self.entries.get(id).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDS: &[&str] = &["classic", "square"];

    #[test]
    fn test_keeps_best() {
        let mut scores = HighScores::new(IDS);
        scores.add_high_score("classic", 3);
        scores.add_high_score("classic", 2);
        assert_eq!(scores.high_score("classic"), 3);
        assert_eq!(scores.high_score("square"), 0);

        scores.add_high_score("nowhere", 9);
        assert_eq!(scores.high_score("nowhere"), 0);
    }

    #[test]
    fn test_json_repairs_against_ids() {
        let json = r#"{"entries":{"classic":4,"retired":7}}"#;
        let scores = HighScores::from_json(json, IDS).unwrap();
        assert!(scores.validate(IDS));
        assert_eq!(scores.high_score("classic"), 4);
        assert_eq!(scores.high_score("square"), 0);
        assert!(!scores.entries.contains_key("retired"));

        let back = HighScores::from_json(&scores.to_json().unwrap(), IDS).unwrap();
        assert_eq!(back, scores);
    }

    #[test]
    fn test_bad_json() {
        assert!(HighScores::from_json("not json", IDS).is_err());
    }

    #[test]
    fn test_unlock_requirements() {
        let mut scores = HighScores::new(IDS);
        let reqs = [UnlockRequirement {
            id: "classic",
            level_max: 5,
        }];
        assert!(!scores.is_unlocked(&reqs));
        scores.add_high_score("classic", 5);
        assert!(scores.is_unlocked(&reqs));
        assert!(scores.is_unlocked(&[]));
    }
}
