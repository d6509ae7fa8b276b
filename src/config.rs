//! Simulation configuration
//!
//! Resolved once per simulation instance and never mutated afterwards. The
//! interactive game and the passive level preview differ only in this record.

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_HEIGHT, DEFAULT_LEVELS, DEFAULT_WIDTH};
use crate::error::{Error, Result};

/// Per-instance simulation options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Self-drive spawning and resolve gates after a delay
    pub auto_control: bool,
    /// Poll player input at all
    pub check_input: bool,
    /// Ball exhaustion feeds the game-over check
    pub count_balls: bool,
    /// Scoring feeds the level manager
    pub track_progress: bool,
    /// Events produce audible feedback
    pub play_sound: bool,
    /// Logical playfield width
    pub width: f32,
    /// Logical playfield height
    pub height: f32,
    /// Level at which the run is won
    pub levels: u32,
    /// RNG seed (random when absent)
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::interactive()
    }
}

impl SimConfig {
    /// Player-driven game
    pub fn interactive() -> Self {
        Self {
            auto_control: false,
            check_input: true,
            count_balls: true,
            track_progress: true,
            play_sound: true,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            levels: DEFAULT_LEVELS,
            seed: None,
        }
    }

    /// Silent, endless, self-driving preview
    pub fn preview() -> Self {
        Self {
            auto_control: true,
            check_input: false,
            count_balls: false,
            track_progress: false,
            play_sound: false,
            ..Self::interactive()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Parse and validate a JSON config; missing fields take interactive defaults
    pub fn from_json(json: &str) -> Result<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(Error::InvalidConfig(format!("width must be positive, got {}", self.width)));
        }
        if !(self.height.is_finite() && self.height > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "height must be positive, got {}",
                self.height
            )));
        }
        if self.levels == 0 {
            return Err(Error::InvalidConfig("levels must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_is_silent_and_endless() {
        let config = SimConfig::preview();
        assert!(config.auto_control);
        assert!(!config.play_sound);
        assert!(!config.count_balls);
        assert!(!config.track_progress);
        assert!(!config.check_input);
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = SimConfig::from_json(r#"{"auto_control": true, "width": 800}"#).unwrap();
        assert!(config.auto_control);
        assert_eq!(config.width, 800.0);
        assert_eq!(config.height, DEFAULT_HEIGHT);
        assert_eq!(config.levels, DEFAULT_LEVELS);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            SimConfig::from_json(r#"{"width": -1}"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            SimConfig::from_json(r#"{"levels": 0}"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(SimConfig::from_json("{"), Err(Error::Json(_))));
    }
}
