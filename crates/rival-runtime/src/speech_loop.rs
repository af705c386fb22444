//! [`SpeechLoop`] – reactions to what the player says.
//!
//! Per utterance, in order:
//!
//! 1. Re-fetch the game state.  Decisions below never trust a cached view.
//! 2. Game over → fixed-pattern rematch answer (no language model).
//! 3. Big lead, first time this game in that direction → canned interrupt,
//!    utterance dropped.
//! 4. Otherwise generate a reply, strip its action tag, gate the tag's
//!    gesture, speak, then gesture.
//!
//! The speaking flag is held by a [`SpeakingGuard`](crate::state::SpeakingGuard)
//! so an early return or a shutdown mid-utterance always clears it.

use std::sync::Arc;
use std::time::Duration;

use rival_perception::UtteranceSource;
use rival_types::{GameSnapshot, GestureTag, MoodCategory, Posture, RivalError};
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::catalog::{self, gesture_for_tag};
use crate::config::EngineConfig;
use crate::game_client::GameStateService;
use crate::generator::{GenerationContext, GenerationMode, ResponseGenerator, sanitize_line};
use crate::intent::{RematchIntent, classify_rematch, extract_name};
use crate::mood::MoodProfile;
use crate::reactions::Performer;
use crate::shutdown::Shutdown;
use crate::state::Blowout;
use crate::tags::parse_reply;

pub const REMATCH_ACCEPTED: &str = "Here we go again!";
pub const REMATCH_DECLINED: &str = "Fine, bye.";
pub const REMATCH_REPROMPT: &str = "Yes or no: do you want a rematch?";

pub const LOSING_BIG_LINES: &[&str] = &[
    "Shh, I'm trying to focus.",
    "Wait wait wait, I'm thinking.",
    "S-s-s-stop, I'm trying to focus.",
];

pub const WINNING_BIG_LINES: &[&str] = &[
    "You talk a lot for someone getting cooked.",
    "Less talking, more moves.",
    "Focus on the board, you're spiraling.",
];

/// Pause before retrying after an input error.
const INPUT_BACKOFF: Duration = Duration::from_millis(500);
/// Ceiling on the tag-gesture chance when the robot is dominating.
const DOMINATING_TAG_CAP: f64 = 0.18;

pub struct SpeechLoop {
    responder: Responder,
    input: Box<dyn UtteranceSource>,
}

/// Everything but the input; shared by reference while an utterance is
/// being handled.
struct Responder {
    performer: Performer,
    game: Arc<dyn GameStateService>,
    generator: Arc<dyn ResponseGenerator>,
    config: Arc<EngineConfig>,
}

impl SpeechLoop {
    pub fn new(
        performer: Performer,
        game: Arc<dyn GameStateService>,
        generator: Arc<dyn ResponseGenerator>,
        input: Box<dyn UtteranceSource>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            responder: Responder {
                performer,
                game,
                generator,
                config,
            },
            input,
        }
    }

    /// Listen until `shutdown` fires or the input closes.
    pub async fn run(mut self, shutdown: Shutdown) {
        let listen = self.responder.config.listen_timeout();
        info!(listen_timeout_ms = self.responder.config.listen_timeout_ms, "speech loop started");
        loop {
            let next = tokio::select! {
                _ = shutdown.wait() => break,
                next = self.input.next_utterance(listen) => next,
            };
            match next {
                Ok(Some(text)) => {
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = self.responder.handle_utterance(&text) => {}
                    }
                }
                Ok(None) => {}
                Err(RivalError::Channel(reason)) => {
                    info!(%reason, "speech input closed");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "speech input failed");
                    tokio::select! {
                        _ = shutdown.wait() => break,
                        _ = tokio::time::sleep(INPUT_BACKOFF) => {}
                    }
                }
            }
        }
        info!("speech loop stopped");
    }

    /// React to one transcript.  Never fails.
    pub async fn handle_utterance(&self, text: &str) {
        self.responder.handle_utterance(text).await;
    }
}

impl Responder {
    async fn handle_utterance(&self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        let span = info_span!("utterance", utterance_id = %Uuid::new_v4());
        self.respond(text).instrument(span).await;
    }

    async fn respond(&self, text: &str) {
        info!(text, "heard");
        let state = self.performer.state();
        state.with(|s| s.touch(Instant::now()));

        let snap = match self.game.fetch().await {
            Ok(snap) => snap,
            Err(e) => {
                warn!(error = %e, "fresh game state unavailable; utterance skipped");
                return;
            }
        };

        let (mood, user_name) = state.with(|s| {
            s.observe(&snap);
            if s.user_name.is_none()
                && let Some(name) = extract_name(text)
            {
                info!(%name, "learned player name");
                s.user_name = Some(name);
            }
            (s.mood, s.user_name.clone())
        });

        if snap.game_over {
            self.answer_rematch(text).await;
            return;
        }

        if let Some(direction) = self.blowout_direction(&snap) {
            let claimed = state.with(|s| !s.rematch_pending && s.try_claim_blowout(direction));
            if claimed {
                self.interrupt(direction).await;
                return;
            }
        }

        self.converse(&snap, text, mood, user_name).await;
    }

    fn blowout_direction(&self, snap: &GameSnapshot) -> Option<Blowout> {
        let threshold = self.config.blowout_lead.max(1);
        if snap.score_lead <= -threshold {
            Some(Blowout::LosingBig)
        } else if snap.score_lead >= threshold {
            Some(Blowout::WinningBig)
        } else {
            None
        }
    }

    fn cut_in(&self) {
        if self.performer.state().is_speaking() {
            self.performer.stop_speech();
        }
    }

    async fn answer_rematch(&self, text: &str) {
        let intent = classify_rematch(text);
        info!(?intent, "rematch answer");
        self.cut_in();
        match intent {
            RematchIntent::Affirmative => {
                self.performer.say(REMATCH_ACCEPTED).await;
                if let Err(e) = self.game.reset().await {
                    warn!(error = %e, "reset request failed; next poll will show the old game");
                }
                self.performer.state().with(|s| {
                    s.leave_rematch();
                    s.reset_game_flags();
                    s.scheduler.cancel_stall();
                });
            }
            RematchIntent::Negative => {
                self.performer.say(REMATCH_DECLINED).await;
                self.performer.gesture(catalog::CROUCH);
                self.performer.state().with(|s| s.posture = Posture::Crouched);
            }
            RematchIntent::Ambiguous => {
                self.performer.say(REMATCH_REPROMPT).await;
            }
        }
    }

    async fn interrupt(&self, direction: Blowout) {
        let lines = match direction {
            Blowout::LosingBig => LOSING_BIG_LINES,
            Blowout::WinningBig => WINNING_BIG_LINES,
        };
        let line = self
            .performer
            .dice()
            .pick(lines)
            .copied()
            .unwrap_or("Less talking, more moves.");
        info!(?direction, "blowout interrupt");
        self.cut_in();
        let _speaking = self.performer.state().speaking();
        self.performer.speak(line).await;
        tokio::time::sleep(self.config.speech_hold()).await;
    }

    async fn converse(
        &self,
        snap: &GameSnapshot,
        text: &str,
        mood: MoodProfile,
        user_name: Option<String>,
    ) {
        self.cut_in();
        let _speaking = self.performer.state().speaking();

        let ctx = GenerationContext::from_snapshot(snap, text, user_name.clone());
        let raw = self.generator.generate(&ctx, GenerationMode::Gameplay).await;
        let reply = parse_reply(&raw);
        let speech = sanitize_line(&reply.speech, user_name.as_deref());
        let gesture = reply.tag.and_then(|tag| self.gate_tag_gesture(tag, &mood));
        debug!(raw = %raw, tag = ?reply.tag, gesture = ?gesture, "reply parsed");

        if !speech.is_empty() {
            self.performer.speak(&speech).await;
        }
        let hold = self.config.speech_hold();
        match gesture {
            Some(name) => {
                let delay = self.config.tag_gesture_delay();
                tokio::time::sleep(delay).await;
                self.performer.gesture(name);
                tokio::time::sleep(hold.saturating_sub(delay)).await;
            }
            None => tokio::time::sleep(hold).await,
        }
    }

    /// A well-formed tag becomes a gesture only after a low-probability draw
    /// and the cooldown gate.
    fn gate_tag_gesture(
        &self,
        tag: GestureTag,
        mood: &MoodProfile,
    ) -> Option<&'static str> {
        let base = self.config.tag_gesture_max_chance;
        let cap = if mood.category == MoodCategory::DominatingAgent {
            (base + 0.06).min(DOMINATING_TAG_CAP).max(base)
        } else {
            base
        };
        let dice = self.performer.dice();
        if !dice.chance(cap.min(mood.gesture_probability * 0.5)) {
            return None;
        }
        let name = gesture_for_tag(tag, dice);
        let allowed = self
            .performer
            .state()
            .with(|s| s.scheduler.try_gesture(Instant::now(), name, mood.category));
        allowed.then_some(name)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::state::Phase;
    use crate::testkit::{Rig, ScriptedGame, snapshot};

    struct CountingGenerator {
        reply: &'static str,
        seen: Mutex<Vec<GenerationContext>>,
    }

    impl CountingGenerator {
        fn new(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ResponseGenerator for CountingGenerator {
        async fn generate(&self, ctx: &GenerationContext, _: GenerationMode) -> String {
            self.seen.lock().unwrap().push(ctx.clone());
            self.reply.to_string()
        }
    }

    struct ScriptedInput(VecDeque<Result<Option<String>, RivalError>>);

    #[async_trait]
    impl UtteranceSource for ScriptedInput {
        async fn next_utterance(
            &mut self,
            _: Duration,
        ) -> Result<Option<String>, RivalError> {
            self.0
                .pop_front()
                .unwrap_or_else(|| Err(RivalError::Channel("script finished".into())))
        }
    }

    fn speech_loop(
        rig: &Rig,
        game: Arc<ScriptedGame>,
        generator: Arc<CountingGenerator>,
    ) -> SpeechLoop {
        SpeechLoop::new(
            rig.performer.clone(),
            game,
            generator,
            Box::new(ScriptedInput(VecDeque::new())),
            Arc::new(EngineConfig::default()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn yes_after_game_over_resets_once_without_pending_flag() {
        let rig = Rig::new(0.999);
        let game = ScriptedGame::new(snapshot(12, 3, true));
        let generator = CountingGenerator::new("unused");
        rig.state().with(|s| {
            s.phase = Phase::RematchWindow;
            s.rematch_pending = false;
        });
        let sl = speech_loop(&rig, game.clone(), generator.clone());

        sl.handle_utterance("yeah let's go").await;

        assert_eq!(game.resets(), 1);
        assert_eq!(rig.gateway.spoken(), vec![REMATCH_ACCEPTED]);
        assert_eq!(generator.calls(), 0);
        rig.state().with(|s| {
            assert_ne!(s.phase, Phase::RematchWindow);
            assert!(!s.rematch_pending);
            assert!(!s.is_speaking);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn failed_reset_is_only_logged() {
        let rig = Rig::new(0.999);
        let game = ScriptedGame::new(snapshot(12, 3, true));
        game.fail_reset(true);
        rig.state().with(|s| {
            s.phase = Phase::RematchWindow;
            s.rematch_pending = true;
        });
        let sl = speech_loop(&rig, game.clone(), CountingGenerator::new("x"));
        sl.handle_utterance("yes").await;
        assert_eq!(game.resets(), 1);
        assert_eq!(rig.gateway.spoken(), vec![REMATCH_ACCEPTED]);
        assert!(!rig.state().with(|s| s.rematch_pending));
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_game_during_rematch_sends_no_reset() {
        let rig = Rig::new(0.999);
        let game = ScriptedGame::new(snapshot(12, 3, true));
        game.fail(true);
        let sl = speech_loop(&rig, game.clone(), CountingGenerator::new("x"));
        sl.handle_utterance("yes").await;
        assert_eq!(game.resets(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn no_and_unclear_answers() {
        let rig = Rig::new(0.999);
        let game = ScriptedGame::new(snapshot(12, 3, true));
        let generator = CountingGenerator::new("unused");
        let sl = speech_loop(&rig, game.clone(), generator.clone());

        sl.handle_utterance("what's the weather").await;
        sl.handle_utterance("nah").await;
        rig.settle().await;

        assert_eq!(rig.gateway.spoken(), vec![REMATCH_REPROMPT, REMATCH_DECLINED]);
        assert_eq!(rig.gateway.gestures(), vec![catalog::CROUCH]);
        assert_eq!(rig.state().with(|s| s.posture), Posture::Crouched);
        assert_eq!(game.resets(), 0);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn blowout_interrupts_once_per_game() {
        let rig = Rig::new(0.0);
        let game = ScriptedGame::new(snapshot(10, -7, false));
        let generator = CountingGenerator::new("Whatever.");
        let sl = speech_loop(&rig, game.clone(), generator.clone());

        sl.handle_utterance("haha you're losing").await;
        assert_eq!(rig.gateway.spoken(), vec![LOSING_BIG_LINES[0]]);
        assert_eq!(generator.calls(), 0);

        sl.handle_utterance("still losing").await;
        assert_eq!(generator.calls(), 1);
        assert_eq!(rig.gateway.spoken().last().map(String::as_str), Some("Whatever."));

        // The other direction has its own flag.
        game.set(snapshot(11, 9, false));
        sl.handle_utterance("lucky").await;
        assert_eq!(
            rig.gateway.spoken().last().map(String::as_str),
            Some(WINNING_BIG_LINES[0])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn blowout_waits_while_rematch_is_pending() {
        let rig = Rig::new(0.0);
        rig.state().with(|s| s.rematch_pending = true);
        let game = ScriptedGame::new(snapshot(10, -7, false));
        let generator = CountingGenerator::new("Fine.");
        let sl = speech_loop(&rig, game, generator.clone());
        sl.handle_utterance("hello").await;
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tagged_reply_is_spoken_clean_then_gestured() {
        let rig = Rig::new(0.0);
        let game = ScriptedGame::new(snapshot(4, 0, false));
        let sl = speech_loop(&rig, game, CountingGenerator::new("Nice one. [CLAP]"));
        sl.handle_utterance("did you see that").await;
        rig.settle().await;
        assert_eq!(rig.gateway.spoken(), vec!["Nice one."]);
        assert_eq!(rig.gateway.gestures(), vec![catalog::APPLAUSE]);
        assert!(!rig.state().is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_tag_draw_speaks_without_gesture() {
        let rig = Rig::new(0.999);
        let game = ScriptedGame::new(snapshot(4, 0, false));
        let sl = speech_loop(&rig, game, CountingGenerator::new("[DANCE] Easy."));
        sl.handle_utterance("hm").await;
        rig.settle().await;
        assert_eq!(rig.gateway.spoken(), vec!["Easy."]);
        assert!(rig.gateway.gestures().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_game_skips_utterance() {
        let rig = Rig::new(0.0);
        let game = ScriptedGame::new(snapshot(4, 0, false));
        game.fail(true);
        let generator = CountingGenerator::new("x");
        let sl = speech_loop(&rig, game, generator.clone());
        sl.handle_utterance("hello?").await;
        assert_eq!(generator.calls(), 0);
        assert!(rig.gateway.spoken().is_empty());
        assert!(!rig.state().is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn introductions_are_remembered_and_passed_on() {
        let rig = Rig::new(0.999);
        let game = ScriptedGame::new(snapshot(2, 0, false));
        let generator = CountingGenerator::new("Hey.");
        let sl = speech_loop(&rig, game, generator.clone());
        sl.handle_utterance("hi, my name is Sam").await;
        sl.handle_utterance("I'm Alex actually").await;
        assert_eq!(rig.state().with(|s| s.user_name.clone()), Some("Sam".into()));
        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen[0].user_name.as_deref(), Some("Sam"));
        assert_eq!(seen[1].user_name.as_deref(), Some("Sam"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_when_input_closes() {
        let rig = Rig::new(0.999);
        let game = ScriptedGame::new(snapshot(2, 0, false));
        let generator = CountingGenerator::new("Sure.");
        let input = ScriptedInput(VecDeque::from([
            Ok(None),
            Err(RivalError::Transcription("503".into())),
            Ok(Some("talk to me".into())),
        ]));
        let sl = SpeechLoop::new(
            rig.performer.clone(),
            game,
            generator.clone(),
            Box::new(input),
            Arc::new(EngineConfig::default()),
        );
        tokio::time::timeout(Duration::from_secs(30), sl.run(Shutdown::new()))
            .await
            .unwrap();
        assert_eq!(generator.calls(), 1);
    }
}
