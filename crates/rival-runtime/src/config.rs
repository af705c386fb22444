//! Engine tunables.  Every field has a default; a config file only needs
//! the values it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mood::MoodTuning;
use crate::scheduler::{CooldownConfig, secs};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Game poll period.
    pub poll_interval_ms: u64,
    /// Silence after which the robot gets bored.
    pub idle_timeout_secs: f64,
    /// How far the idle clock is pushed after an idle reaction.
    pub idle_interval_secs: f64,
    pub sound_cooldown_secs: f64,
    pub gesture_cooldown_secs: f64,
    pub stall_delay_min_secs: f64,
    pub stall_delay_max_secs: f64,
    /// Absolute lead at which the blowout interrupt may fire.
    pub blowout_lead: i64,
    /// Turns spoken over with `opening_speak_chance`.
    pub opening_turns: i64,
    pub opening_speak_chance: f64,
    /// Turns over which the opening chance fades back to the mood value.
    pub opening_fade_turns: i64,
    /// Upper bound on one wait for speech input.
    pub listen_timeout_ms: u64,
    /// Pause after speaking before the speech loop listens again.
    pub speech_hold_ms: u64,
    pub tag_gesture_delay_ms: u64,
    pub tag_gesture_max_chance: f64,
    pub rematch_prompt_pause_ms: u64,
    /// Bound on one awaited actuator call.
    pub actuator_timeout_secs: f64,
    /// Deadline after which the game link is reported as down.
    pub link_timeout_secs: f64,
    pub mood: MoodTuning,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            idle_timeout_secs: 20.0,
            idle_interval_secs: 15.0,
            sound_cooldown_secs: 10.0,
            gesture_cooldown_secs: 25.0,
            stall_delay_min_secs: 4.0,
            stall_delay_max_secs: 40.0,
            blowout_lead: 6,
            opening_turns: 4,
            opening_speak_chance: 0.95,
            opening_fade_turns: 6,
            listen_timeout_ms: 1000,
            speech_hold_ms: 1000,
            tag_gesture_delay_ms: 600,
            tag_gesture_max_chance: 0.12,
            rematch_prompt_pause_ms: 1000,
            actuator_timeout_secs: 20.0,
            link_timeout_secs: 5.0,
            mood: MoodTuning::default(),
        }
    }
}

impl EngineConfig {
    pub fn cooldowns(&self) -> CooldownConfig {
        CooldownConfig {
            sound_cooldown_secs: self.sound_cooldown_secs,
            gesture_cooldown_secs: self.gesture_cooldown_secs,
            stall_delay_min_secs: self.stall_delay_min_secs,
            stall_delay_max_secs: self.stall_delay_max_secs,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn idle_timeout(&self) -> Duration {
        secs(self.idle_timeout_secs)
    }

    pub fn idle_interval(&self) -> Duration {
        secs(self.idle_interval_secs)
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_millis(self.listen_timeout_ms)
    }

    pub fn speech_hold(&self) -> Duration {
        Duration::from_millis(self.speech_hold_ms)
    }

    pub fn tag_gesture_delay(&self) -> Duration {
        Duration::from_millis(self.tag_gesture_delay_ms)
    }

    pub fn rematch_prompt_pause(&self) -> Duration {
        Duration::from_millis(self.rematch_prompt_pause_ms)
    }

    pub fn actuator_timeout(&self) -> Duration {
        secs(self.actuator_timeout_secs)
    }

    pub fn link_timeout(&self) -> Duration {
        secs(self.link_timeout_secs)
    }

    /// Speak probability for a midgame move on `turn`.
    ///
    /// Flat `opening_speak_chance` through `opening_turns`, then a linear
    /// fade to `mood_value` across the next `opening_fade_turns` turns.
    /// `turn` counts from the start of the current game.
    pub fn opening_speak_probability(&self, turn: i64, mood_value: f64) -> f64 {
        if turn <= self.opening_turns {
            return self.opening_speak_chance.clamp(0.0, 1.0);
        }
        let into_fade = turn - self.opening_turns;
        if self.opening_fade_turns <= 0 || into_fade >= self.opening_fade_turns {
            return mood_value;
        }
        let t = into_fade as f64 / self.opening_fade_turns as f64;
        let p = self.opening_speak_chance + (mood_value - self.opening_speak_chance) * t;
        p.clamp(0.0, 1.0)
    }
}
