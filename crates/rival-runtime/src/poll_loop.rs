//! [`PollLoop`] – turn-driven and idle-driven reactions.
//!
//! Each tick:
//!
//! 1. **Fetch** the game snapshot; a failed fetch skips the tick.
//! 2. **Observe** it: the mood is recomputed and a `game_over: true → false`
//!    edge starts a new game (leave the rematch window, stand up, fresh
//!    stall timer).
//! 3. **Stall** – fire the deferred stall sound if it is due.
//! 4. **Idle** – a bored sound (and sometimes a gesture) after a long
//!    silence.
//! 5. **Turn** – on a new turn either run the end-of-game script or react
//!    to the move, then schedule the next stall timer.

use std::sync::Arc;

use rival_types::{GameSnapshot, Posture, SoundCategory, Winner};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, debug, info, info_span};

use crate::catalog::{self, idle_category, midgame_gesture};
use crate::config::EngineConfig;
use crate::game_client::GameStateService;
use crate::generator::sanitize_line;
use crate::health::LinkHealth;
use crate::reactions::Performer;
use crate::scheduler::TickContext;
use crate::shutdown::Shutdown;
use crate::state::Phase;

pub const REMATCH_PROMPT: &str = "Do you want a rematch? Say yes.";

pub struct PollLoop {
    performer: Performer,
    game: Arc<dyn GameStateService>,
    config: Arc<EngineConfig>,
    link: LinkHealth,
    prev_game_over: Option<bool>,
}

impl PollLoop {
    pub fn new(
        performer: Performer,
        game: Arc<dyn GameStateService>,
        config: Arc<EngineConfig>,
    ) -> Self {
        let link = LinkHealth::new("game_service", config.link_timeout());
        Self {
            performer,
            game,
            config,
            link,
            prev_game_over: None,
        }
    }

    /// Tick every poll interval until `shutdown` fires.
    pub async fn run(mut self, shutdown: Shutdown) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.config.poll_interval_ms, "game poll loop started");
        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = interval.tick() => {}
            }
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = self.tick() => {}
            }
        }
        info!("game poll loop stopped");
    }

    /// One poll.  Never fails; every problem is logged and skipped.
    pub async fn tick(&mut self) {
        let snap = match self.game.fetch().await {
            Ok(snap) => {
                self.link.heartbeat();
                snap
            }
            Err(e) => {
                self.link.failure(&e);
                debug!(error = %e, "game poll failed");
                return;
            }
        };
        let span = info_span!("poll", turn = snap.turn_index, lead = snap.score_lead);
        self.react(snap).instrument(span).await;
    }

    async fn react(&mut self, snap: GameSnapshot) {
        let now = Instant::now();
        let state = self.performer.state().clone();

        let new_game = self.prev_game_over == Some(true) && !snap.game_over;
        self.prev_game_over = Some(snap.game_over);
        state.with(|s| s.observe(&snap));

        if new_game {
            self.start_new_game(&snap, now);
        }

        let due = state.with(|s| {
            let ctx = TickContext {
                turn: snap.turn_index,
                game_over: snap.game_over,
                in_rematch: s.in_rematch(),
                is_speaking: s.is_speaking,
            };
            s.scheduler.tick(now, ctx)
        });
        if let Some(category) = due {
            debug!(%category, "stall timer fired");
            self.performer.try_sound(category, true);
        }

        self.idle_check(&snap, now);

        let fresh_turn = state.with(|s| {
            if snap.turn_index < s.last_processed_turn {
                info!(
                    turn = snap.turn_index,
                    last = s.last_processed_turn,
                    "turn counter restarted"
                );
                s.last_processed_turn = -1;
            }
            if snap.turn_index <= s.last_processed_turn {
                return None;
            }
            s.last_processed_turn = snap.turn_index;
            s.touch(now);
            s.scheduler.cancel_stall();
            Some(s.phase)
        });
        let Some(phase) = fresh_turn else {
            return;
        };

        if snap.game_over {
            if phase != Phase::RematchWindow {
                self.run_end_script(&snap).await;
            }
        } else if phase != Phase::RematchWindow {
            state.with(|s| s.phase = Phase::MidGame);
            self.react_to_move(&snap).await;
            let dice = self.performer.dice();
            state.with(|s| {
                let mood = s.mood;
                s.scheduler
                    .schedule_stall(Instant::now(), snap.turn_index, &mood, dice)
            });
        }
    }

    /// Leave the rematch window and stand up.  The reset snapshot itself is
    /// then handled as an ordinary new turn, so its opening line is spoken
    /// and a stall timer is scheduled for it.
    fn start_new_game(&self, snap: &GameSnapshot, now: Instant) {
        let was_crouched = self.performer.state().with(|s| {
            s.leave_rematch();
            s.phase = Phase::Idle;
            s.touch(now);
            s.scheduler.cancel_stall();
            std::mem::replace(&mut s.posture, Posture::Standing) == Posture::Crouched
        });
        info!(turn = snap.turn_index, "new game started");
        if was_crouched {
            self.performer.gesture(catalog::STAND);
        }
    }

    fn idle_check(&self, snap: &GameSnapshot, now: Instant) {
        if snap.game_over {
            return;
        }
        let timeout = self.config.idle_timeout();
        let push = self.config.idle_interval();
        let bored = self.performer.state().with(|s| {
            if s.is_speaking || now.saturating_duration_since(s.last_interaction) <= timeout {
                return None;
            }
            s.last_interaction = now + push;
            Some(s.mood)
        });
        let Some(mood) = bored else {
            return;
        };
        info!(mood = %mood.category, "robot is bored");
        self.performer.try_sound(idle_category(mood.category), true);
        let dice = self.performer.dice();
        if dice.chance(mood.idle_gesture_probability)
            && let Some(name) = dice.pick(catalog::IDLE).copied()
        {
            self.performer.gesture(name);
            self.performer
                .state()
                .with(|s| s.scheduler.note_gesture(now, name));
        }
    }

    async fn react_to_move(&self, snap: &GameSnapshot) {
        let state = self.performer.state();
        let (mood, user_name, speaking, into_game) = state.with(|s| {
            (
                s.mood,
                s.user_name.clone(),
                s.is_speaking,
                s.turns_into_game(snap.turn_index),
            )
        });
        if !snap.has_message() || speaking {
            return;
        }
        let dice = self.performer.dice();
        let gesture = midgame_gesture(mood.category, dice);
        let text = sanitize_line(&snap.last_message, user_name.as_deref());
        let speak_p = self
            .config
            .opening_speak_probability(into_game, mood.speak_probability);

        if !text.is_empty() && dice.chance(speak_p) {
            self.performer.say(&text).await;
        }
        if let Some(name) = gesture
            && dice.chance(mood.gesture_probability)
        {
            self.performer.gesture(name);
            state.with(|s| s.scheduler.note_gesture(Instant::now(), name));
        }
    }

    /// The scripted finale, then the rematch prompt.  Strictly sequential.
    async fn run_end_script(&self, snap: &GameSnapshot) {
        let p = &self.performer;
        p.state().with(|s| {
            s.phase = Phase::GameOverPending;
            s.scheduler.cancel_stall();
        });
        info!(winner = ?snap.winner, "game over");

        match snap.winner {
            Some(Winner::Agent) => {
                p.try_sound(SoundCategory::Win, true);
                p.say("Good game. Come on, let's shake hands.").await;
                p.gesture_blocking(catalog::DAB).await;
                p.say("Just kidding. I don't shake hands with losers.").await;
                p.gesture_blocking(catalog::GANGNAM).await;
                p.gesture_blocking(catalog::CROUCH).await;
                p.state().with(|s| s.posture = Posture::Crouched);
            }
            Some(Winner::Human) => {
                p.try_sound(SoundCategory::Lose, true);
                p.say("No way... I demand a recount.").await;
                p.gesture_blocking(catalog::CROUCH).await;
                p.state().with(|s| s.posture = Posture::Crouched);
            }
            Some(Winner::Draw) | None => {
                p.try_sound(SoundCategory::Annoy, true);
                p.say("Draw game.").await;
            }
        }

        tokio::time::sleep(self.config.rematch_prompt_pause()).await;
        p.say(REMATCH_PROMPT).await;
        p.state().with(|s| {
            s.phase = Phase::RematchWindow;
            s.rematch_pending = true;
            s.touch(Instant::now());
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Blowout;
    use crate::testkit::{Rig, ScriptedGame, snapshot};
    use rival_types::ActuatorCommand;

    fn poll_loop(rig: &Rig, game: Arc<ScriptedGame>) -> PollLoop {
        PollLoop::new(rig.performer.clone(), game, Arc::new(EngineConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn each_turn_keeps_one_stall_timer_keyed_to_itself() {
        // Every draw succeeds: stall timers are always scheduled.
        let rig = Rig::new(0.0);
        let game = ScriptedGame::new(snapshot(0, 0, false));
        let mut pl = poll_loop(&rig, game.clone());

        for turn in 0..3 {
            game.set(snapshot(turn, 0, false));
            pl.tick().await;
            let timer = rig.state().with(|s| s.scheduler.stall().copied());
            assert_eq!(timer.map(|t| t.for_turn), Some(turn));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn agent_win_runs_script_before_rematch_prompt() {
        let rig = Rig::new(0.999);
        let game = ScriptedGame::new(snapshot(4, 3, false));
        let mut pl = poll_loop(&rig, game.clone());
        pl.tick().await;

        let mut over = snapshot(5, 7, true);
        over.winner = Some(Winner::Agent);
        over.last_message = "should never be spoken".into();
        game.set(over);
        pl.tick().await;

        assert_eq!(
            rig.gateway.spoken(),
            vec![
                "Good game. Come on, let's shake hands.",
                "Just kidding. I don't shake hands with losers.",
                REMATCH_PROMPT,
            ]
        );
        let commands = rig.gateway.commands();
        assert!(matches!(commands[0], ActuatorCommand::StreamAudio { .. }));
        assert_eq!(
            rig.gateway.gestures(),
            vec![catalog::DAB, catalog::GANGNAM, catalog::CROUCH]
        );
        rig.state().with(|s| {
            assert_eq!(s.phase, Phase::RematchWindow);
            assert!(s.rematch_pending);
            assert_eq!(s.posture, Posture::Crouched);
            assert!(s.scheduler.stall().is_none());
        });
    }

    #[tokio::test(start_paused = true)]
    async fn draw_and_human_win_scripts() {
        let rig = Rig::new(0.999);
        let mut over = snapshot(9, -7, true);
        over.winner = Some(Winner::Human);
        let game = ScriptedGame::new(over);
        poll_loop(&rig, game).tick().await;
        assert_eq!(
            rig.gateway.spoken(),
            vec!["No way... I demand a recount.", REMATCH_PROMPT]
        );

        let rig = Rig::new(0.999);
        let mut draw = snapshot(42, 0, true);
        draw.winner = Some(Winner::Draw);
        poll_loop(&rig, ScriptedGame::new(draw)).tick().await;
        assert_eq!(rig.gateway.spoken(), vec!["Draw game.", REMATCH_PROMPT]);
        assert!(rig.gateway.gestures().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reset_leaves_rematch_window_and_stands_up() {
        let rig = Rig::new(0.0);
        let mut over = snapshot(7, -8, true);
        over.winner = Some(Winner::Human);
        let game = ScriptedGame::new(over);
        let mut pl = poll_loop(&rig, game.clone());
        pl.tick().await;
        rig.state().with(|s| assert!(s.try_claim_blowout(Blowout::LosingBig)));

        game.set(snapshot(0, 0, false));
        pl.tick().await;
        rig.settle().await;

        rig.state().with(|s| {
            assert_eq!(s.phase, Phase::MidGame);
            assert!(!s.rematch_pending);
            assert_eq!(s.posture, Posture::Standing);
            assert_eq!(s.last_processed_turn, 0);
            assert_eq!(s.scheduler.stall().map(|t| t.for_turn), Some(0));
            assert!(s.try_claim_blowout(Blowout::LosingBig));
        });
        let gestures = rig.gateway.gestures();
        assert_eq!(gestures.last().map(String::as_str), Some(catalog::STAND));
    }

    #[tokio::test(start_paused = true)]
    async fn rematch_game_gets_opening_lines_again() {
        // 0.5 loses against the close-game speak chance but wins the opening one.
        let rig = Rig::new(0.5);
        let mut over = snapshot(20, -7, true);
        over.winner = Some(Winner::Human);
        let game = ScriptedGame::new(over);
        let mut pl = poll_loop(&rig, game.clone());
        pl.tick().await;

        let mut reset = snapshot(21, 0, false);
        reset.last_message = "New game, same robot. Drop your first chip.".into();
        game.set(reset);
        pl.tick().await;

        let mut first_move = snapshot(22, 0, false);
        first_move.last_message = "Your move.".into();
        game.set(first_move);
        pl.tick().await;
        rig.settle().await;

        let spoken = rig.gateway.spoken();
        assert_eq!(
            &spoken[spoken.len() - 2..],
            ["New game, same robot. Drop your first chip.", "Your move."]
        );
        let gestures = rig.gateway.gestures();
        let stand = gestures.iter().rposition(|g| g == catalog::STAND);
        assert!(stand.is_some());
        assert_eq!(rig.state().with(|s| s.last_processed_turn), 22);
    }

    #[tokio::test(start_paused = true)]
    async fn late_turns_fall_back_to_the_mood_chance() {
        let rig = Rig::new(0.5);
        let game = ScriptedGame::new(snapshot(0, 0, false));
        let mut pl = poll_loop(&rig, game.clone());
        pl.tick().await;

        let mut late = snapshot(22, 0, false);
        late.last_message = "Your move.".into();
        game.set(late);
        pl.tick().await;
        assert!(rig.gateway.spoken().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn opening_move_is_spoken_with_name_filled_in() {
        let rig = Rig::new(0.5);
        rig.state().with(|s| s.user_name = Some("Sam".into()));
        let mut snap = snapshot(1, 0, false);
        snap.last_message = "Your move, [player name].".into();
        poll_loop(&rig, ScriptedGame::new(snap)).tick().await;
        assert_eq!(rig.gateway.spoken(), vec!["Your move, Sam."]);
        assert!(!rig.state().is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn same_turn_is_not_reacted_to_twice() {
        let rig = Rig::new(0.0);
        let mut snap = snapshot(2, 0, false);
        snap.last_message = "Hmm.".into();
        let mut pl = poll_loop(&rig, ScriptedGame::new(snap));
        pl.tick().await;
        pl.tick().await;
        assert_eq!(rig.gateway.spoken(), vec!["Hmm."]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_skips_reactions() {
        let rig = Rig::new(0.0);
        let game = ScriptedGame::new(snapshot(1, 0, false));
        game.fail(true);
        let mut pl = poll_loop(&rig, game);
        pl.tick().await;
        assert_eq!(rig.state().with(|s| s.last_processed_turn), -1);
        assert!(rig.gateway.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_reaction_pushes_clock_forward() {
        let rig = Rig::new(0.0);
        let game = ScriptedGame::new(snapshot(3, 0, false));
        let mut pl = poll_loop(&rig, game);
        pl.tick().await;

        tokio::time::advance(std::time::Duration::from_secs(21)).await;
        pl.tick().await;
        rig.settle().await;
        let pushed = rig.state().with(|s| s.last_interaction);
        assert!(pushed > Instant::now());
        // The bored sound fired; nothing more until the clock catches up.
        let streamed = rig.gateway.streamed().len();
        assert!(streamed >= 1);
        tokio::time::advance(std::time::Duration::from_secs(5)).await;
        pl.tick().await;
        rig.settle().await;
        assert_eq!(rig.gateway.streamed().len(), streamed);
    }

    #[tokio::test(start_paused = true)]
    async fn run_exits_on_shutdown() {
        let rig = Rig::new(0.999);
        let pl = poll_loop(&rig, ScriptedGame::new(snapshot(0, 0, false)));
        let shutdown = Shutdown::new();
        let task = tokio::spawn(pl.run(shutdown.clone()));
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
        shutdown.trigger();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
