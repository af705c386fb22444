//! [`EngineState`] – the one struct both loops share.
//!
//! Lives behind a single [`std::sync::Mutex`] wrapped in [`SharedState`].
//! Access goes through [`SharedState::with`], which takes a closure, so the
//! lock can never be held across an `.await`.

use std::sync::{Arc, Mutex};

use rival_types::{GameSnapshot, Posture};
use tokio::time::Instant;
use tracing::info;

use crate::mood::{MoodProfile, MoodTuning};
use crate::scheduler::{CooldownConfig, CooldownScheduler};

// ─────────────────────────────────────────────────────────────────────────────
// Phases and per-game flags
// ─────────────────────────────────────────────────────────────────────────────

/// Where the poll loop is in the life of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    MidGame,
    /// The end-of-game script is running.
    GameOverPending,
    /// The rematch prompt has been spoken; waiting for a yes or a reset.
    RematchWindow,
}

/// Direction of a one-shot blowout interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blowout {
    /// The human is far ahead.
    LosingBig,
    /// The robot is far ahead.
    WinningBig,
}

#[derive(Debug, Default, Clone, Copy)]
struct BlowoutFlags {
    losing_used: bool,
    winning_used: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// EngineState
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct EngineState {
    pub phase: Phase,
    /// Highest turn the poll loop has reacted to; `-1` before the first.
    pub last_processed_turn: i64,
    /// Turn index of the most recent snapshot either loop has seen.
    pub live_turn: i64,
    pub is_speaking: bool,
    pub rematch_pending: bool,
    pub last_interaction: Instant,
    pub mood: MoodProfile,
    pub scheduler: CooldownScheduler,
    pub posture: Posture,
    pub user_name: Option<String>,
    /// Turn index of the snapshot that opened the current game.
    game_start_turn: i64,
    tuning: MoodTuning,
    speech_epoch: u64,
    blowout: BlowoutFlags,
    prev_game_over: Option<bool>,
}

impl EngineState {
    pub fn new(cooldowns: CooldownConfig, tuning: MoodTuning) -> Self {
        Self {
            phase: Phase::Idle,
            last_processed_turn: -1,
            live_turn: -1,
            is_speaking: false,
            rematch_pending: false,
            last_interaction: Instant::now(),
            mood: MoodProfile::compute_with(0, &tuning),
            scheduler: CooldownScheduler::new(cooldowns),
            posture: Posture::Standing,
            user_name: None,
            game_start_turn: 0,
            tuning,
            speech_epoch: 0,
            blowout: BlowoutFlags::default(),
            prev_game_over: None,
        }
    }

    /// Fold a fresh snapshot into the shared view: recompute the mood and
    /// watch for a finished game being reset.
    ///
    /// Returns `true` exactly once per `game_over: true → false` transition,
    /// at which point the per-game blowout flags are cleared.
    pub fn observe(&mut self, snap: &GameSnapshot) -> bool {
        self.mood = MoodProfile::compute_with(snap.score_lead, &self.tuning);
        self.live_turn = snap.turn_index;
        let restarted = self.prev_game_over == Some(true) && !snap.game_over;
        self.prev_game_over = Some(snap.game_over);
        if restarted || snap.turn_index < self.game_start_turn {
            self.game_start_turn = snap.turn_index;
        }
        if restarted {
            self.reset_game_flags();
            info!(turn = snap.turn_index, "new game observed; per-game flags cleared");
        }
        restarted
    }

    /// Moves played since the current game opened.  The game service never
    /// rewinds its counter on reset, so this is what the opening curve uses.
    pub fn turns_into_game(&self, turn: i64) -> i64 {
        (turn - self.game_start_turn).max(0)
    }

    pub fn reset_game_flags(&mut self) {
        self.blowout = BlowoutFlags::default();
    }

    /// Claim the one-time interrupt for `direction`.  Only the first claim
    /// per game succeeds.
    pub fn try_claim_blowout(&mut self, direction: Blowout) -> bool {
        let used = match direction {
            Blowout::LosingBig => &mut self.blowout.losing_used,
            Blowout::WinningBig => &mut self.blowout.winning_used,
        };
        if *used {
            return false;
        }
        *used = true;
        true
    }

    pub fn in_rematch(&self) -> bool {
        self.phase == Phase::RematchWindow
    }

    /// Leave the rematch window and forget the pending prompt.
    pub fn leave_rematch(&mut self) {
        if self.phase == Phase::RematchWindow {
            self.phase = Phase::Idle;
        }
        self.rematch_pending = false;
    }

    pub fn touch(&mut self, now: Instant) {
        self.last_interaction = now;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SharedState
// ─────────────────────────────────────────────────────────────────────────────

/// Cloneable handle to the shared [`EngineState`].
#[derive(Clone)]
pub struct SharedState(Arc<Mutex<EngineState>>);

impl SharedState {
    pub fn new(state: EngineState) -> Self {
        Self(Arc::new(Mutex::new(state)))
    }

    /// Run `f` with the state locked.  A poisoned lock is recovered.
    pub fn with<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        let mut guard = self.0.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut guard)
    }

    pub fn is_speaking(&self) -> bool {
        self.with(|s| s.is_speaking)
    }

    /// Mark the robot as speaking until the returned guard is dropped.
    pub fn speaking(&self) -> SpeakingGuard {
        let epoch = self.with(|s| {
            s.speech_epoch += 1;
            s.is_speaking = true;
            s.speech_epoch
        });
        SpeakingGuard {
            state: self.clone(),
            epoch,
        }
    }
}

/// Holds `is_speaking = true` for its lifetime.
///
/// A guard only clears the flag if no newer speaker has taken over since it
/// was created, so an interrupted line cannot silence its interrupter.
pub struct SpeakingGuard {
    state: SharedState,
    epoch: u64,
}

impl Drop for SpeakingGuard {
    fn drop(&mut self) {
        let epoch = self.epoch;
        self.state.with(|s| {
            if s.speech_epoch == epoch {
                s.is_speaking = false;
            }
        });
    }
}
