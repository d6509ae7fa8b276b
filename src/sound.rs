//! Sound cues
//!
//! The simulation names the cue and says whether this instance may be heard.
//! Playback is the sink's business.

/// Sound effect types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sound {
    /// Orb landed in a goal
    Score,
    /// Orb hit a peg
    Peg,
    /// Orb hit a bouncer
    Bouncer,
    LevelUp,
    GameOver,
    /// Out-of-bounds or other anomaly
    Error,
    /// Menu or gate choice confirmed
    Select,
}

impl Sound {
    pub fn name(&self) -> &'static str {
        match self {
            Sound::Score => "score",
            Sound::Peg => "peghit",
            Sound::Bouncer => "bouncer",
            Sound::LevelUp => "levelup",
            Sound::GameOver => "gameover",
            Sound::Error => "error",
            Sound::Select => "select",
        }
    }
}

/// Receiver of sound cues
pub trait SoundSink {
    /// `enabled` is false for muted instances; sinks must stay silent then
    fn play(&mut self, sound: Sound, enabled: bool);
}

/// Sink that logs audible cues and counts them
#[derive(Debug, Default)]
pub struct LogSound {
    played: Vec<Sound>,
}

impl LogSound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cues played so far (muted calls excluded)
    pub fn played(&self) -> &[Sound] {
        &self.played
    }
}

impl SoundSink for LogSound {
    fn play(&mut self, sound: Sound, enabled: bool) {
        if !enabled {
            return;
        }
        log::trace!("Sound: {}", sound.name());
        self.played.push(sound);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_muted_calls_are_dropped() {
        let mut sink = LogSound::new();
        sink.play(Sound::Peg, false);
        sink.play(Sound::Score, true);
        assert_eq!(sink.played(), &[Sound::Score]);
    }
}
