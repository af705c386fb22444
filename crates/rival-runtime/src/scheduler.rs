//! [`CooldownScheduler`] – rate limits for sounds and gestures, plus the
//! single deferred stall-sound timer.
//!
//! The scheduler only *decides*; it never talks to the robot.  Callers hold
//! the engine-state lock while asking, release it, then actuate.  All methods
//! take the current [`Instant`] explicitly.

use std::time::Duration;

use rival_types::{MoodCategory, SoundCategory};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use crate::catalog::{GestureSide, gesture_side, stall_category};
use crate::mood::MoodProfile;
use crate::random::Dice;

/// Cooldowns and stall-delay bounds, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    pub sound_cooldown_secs: f64,
    pub gesture_cooldown_secs: f64,
    pub stall_delay_min_secs: f64,
    pub stall_delay_max_secs: f64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            sound_cooldown_secs: 10.0,
            gesture_cooldown_secs: 25.0,
            stall_delay_min_secs: 4.0,
            stall_delay_max_secs: 40.0,
        }
    }
}

/// Convert a configured number of seconds into a [`Duration`], treating
/// negative, NaN or absurd values as zero.
pub fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.max(0.0)).unwrap_or(Duration::ZERO)
}

/// A pending "you're taking forever" sound for one specific turn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StallTimer {
    pub due_at: Instant,
    pub for_turn: i64,
    pub category: SoundCategory,
}

/// Ground truth the stall timer is checked against on every tick.
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    pub turn: i64,
    pub game_over: bool,
    pub in_rematch: bool,
    pub is_speaking: bool,
}

#[derive(Debug)]
pub struct CooldownScheduler {
    config: CooldownConfig,
    last_sound: Option<Instant>,
    last_gesture: Option<(Instant, String)>,
    stall: Option<StallTimer>,
}

impl CooldownScheduler {
    pub fn new(config: CooldownConfig) -> Self {
        Self {
            config,
            last_sound: None,
            last_gesture: None,
            stall: None,
        }
    }

    pub fn stall(&self) -> Option<&StallTimer> {
        self.stall.as_ref()
    }

    pub fn last_gesture(&self) -> Option<&str> {
        self.last_gesture.as_ref().map(|(_, name)| name.as_str())
    }

    /// Decide whether a sound effect may play now; records the firing time
    /// when it may.
    ///
    /// Never fires while speaking.  `force` skips both the cooldown and the
    /// probability draw.
    pub fn try_sound_effect(
        &mut self,
        now: Instant,
        is_speaking: bool,
        profile: &MoodProfile,
        force: bool,
        dice: &Dice,
    ) -> bool {
        if is_speaking {
            return false;
        }
        if !force {
            let cooling = self.last_sound.is_some_and(|last| {
                now.saturating_duration_since(last) < secs(self.config.sound_cooldown_secs)
            });
            if cooling || !dice.chance(profile.sound_probability) {
                return false;
            }
        }
        self.last_sound = Some(now);
        true
    }

    /// Replace any stall timer with a fresh draw for `turn`.
    pub fn schedule_stall(&mut self, now: Instant, turn: i64, profile: &MoodProfile, dice: &Dice) {
        if !dice.chance(profile.stall_sound_probability) {
            self.stall = None;
            return;
        }
        let delay = dice.uniform(
            self.config.stall_delay_min_secs,
            self.config.stall_delay_max_secs,
        );
        let timer = StallTimer {
            due_at: now + secs(delay),
            for_turn: turn,
            category: stall_category(profile.category, dice),
        };
        debug!(turn, delay_secs = delay, category = %timer.category, "stall sound scheduled");
        self.stall = Some(timer);
    }

    pub fn cancel_stall(&mut self) {
        self.stall = None;
    }

    /// Fire the stall timer if it is due; returns the category to play.
    ///
    /// A timer keyed to any turn other than `ctx.turn` is stale and dropped.
    pub fn tick(&mut self, now: Instant, ctx: TickContext) -> Option<SoundCategory> {
        let timer = self.stall?;
        if timer.for_turn != ctx.turn {
            debug!(
                timer_turn = timer.for_turn,
                live_turn = ctx.turn,
                "discarding stale stall timer"
            );
            self.stall = None;
            return None;
        }
        if ctx.game_over || ctx.in_rematch || ctx.is_speaking || now < timer.due_at {
            return None;
        }
        self.stall = None;
        Some(timer.category)
    }

    /// Gate a conversational gesture.  Records it on success.
    ///
    /// Rejected during the gesture cooldown, when it celebrates the wrong
    /// side of the board, or when it repeats the previous gesture.
    pub fn try_gesture(&mut self, now: Instant, name: &str, mood: MoodCategory) -> bool {
        if let Some((at, last)) = &self.last_gesture {
            if now.saturating_duration_since(*at) < secs(self.config.gesture_cooldown_secs) {
                return false;
            }
            if last == name {
                return false;
            }
        }
        match gesture_side(name) {
            GestureSide::Winning if !mood.agent_ahead() => return false,
            GestureSide::Losing if !mood.human_ahead() => return false,
            _ => {}
        }
        self.note_gesture(now, name);
        true
    }

    /// Record a gesture that was played without going through the gate.
    pub fn note_gesture(&mut self, now: Instant, name: &str) {
        self.last_gesture = Some((now, name.to_string()));
    }
}
