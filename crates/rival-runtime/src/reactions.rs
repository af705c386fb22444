//! [`Performer`] – the actuation helpers both loops share.
//!
//! Decisions are made under the state lock; commands are sent after it has
//! been released.  Every failure is logged and swallowed: a lost gesture or
//! line never stops a loop.

use std::sync::Arc;
use std::time::Duration;

use rival_middleware::ActuatorHandle;
use rival_types::{ActuatorCommand, SoundCategory};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::catalog::SoundCatalog;
use crate::random::Dice;
use crate::state::SharedState;

#[derive(Clone)]
pub struct Performer {
    handle: ActuatorHandle,
    state: SharedState,
    dice: Arc<Dice>,
    sounds: Arc<SoundCatalog>,
    actuator_timeout: Duration,
}

impl Performer {
    pub fn new(
        handle: ActuatorHandle,
        state: SharedState,
        dice: Arc<Dice>,
        sounds: Arc<SoundCatalog>,
        actuator_timeout: Duration,
    ) -> Self {
        Self {
            handle,
            state,
            dice,
            sounds,
            actuator_timeout,
        }
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn dice(&self) -> &Dice {
        &self.dice
    }

    pub fn handle(&self) -> &ActuatorHandle {
        &self.handle
    }

    /// Stream a sound from `category` if the scheduler allows it.
    ///
    /// Returns `true` when a stream command was sent.
    pub fn try_sound(&self, category: SoundCategory, force: bool) -> bool {
        let now = Instant::now();
        let dice = &self.dice;
        let allowed = self.state.with(|s| {
            let speaking = s.is_speaking;
            s.scheduler
                .try_sound_effect(now, speaking, &s.mood, force, dice)
        });
        if !allowed {
            return false;
        }
        match self.sounds.url_for(category, dice) {
            Some(url) => {
                info!(%category, %url, force, "sound effect");
                self.handle.stream_audio(url);
                true
            }
            None => {
                warn!(%category, "sound pool is empty");
                false
            }
        }
    }

    /// Speak `text` and wait for the robot to finish the call.  The caller
    /// is responsible for the speaking flag.
    pub async fn speak(&self, text: &str) -> bool {
        info!(text, "speak");
        self.await_call(ActuatorCommand::Speak {
            text: text.to_string(),
        })
        .await
    }

    /// [`speak`](Self::speak) with the speaking flag held for the duration.
    pub async fn say(&self, text: &str) -> bool {
        let _speaking = self.state.speaking();
        self.speak(text).await
    }

    pub async fn gesture_blocking(&self, name: &str) -> bool {
        debug!(gesture = name, "blocking gesture");
        self.await_call(ActuatorCommand::PlayGesture {
            name: name.to_string(),
            blocking: true,
        })
        .await
    }

    pub fn gesture(&self, name: &str) {
        debug!(gesture = name, "gesture");
        self.handle.play_gesture(name);
    }

    pub fn stop_speech(&self) {
        self.handle.stop_speech();
    }

    async fn await_call(&self, command: ActuatorCommand) -> bool {
        let kind = command.kind();
        match tokio::time::timeout(self.actuator_timeout, self.handle.call(command)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!(command = kind, error = %e, "actuator call failed");
                false
            }
            Err(_) => {
                warn!(
                    command = kind,
                    timeout_ms = self.actuator_timeout.as_millis() as u64,
                    "actuator call timed out"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mood::MoodTuning;
    use crate::scheduler::CooldownConfig;
    use crate::state::EngineState;
    use rival_middleware::{ActuatorDispatcher, RecordingGateway};

    fn performer(dice: Dice) -> (Arc<RecordingGateway>, Performer) {
        let gw = Arc::new(RecordingGateway::new());
        let (dispatcher, handle) = ActuatorDispatcher::new(gw.clone());
        tokio::spawn(dispatcher.run());
        let state = SharedState::new(EngineState::new(
            CooldownConfig::default(),
            MoodTuning::default(),
        ));
        let p = Performer::new(
            handle,
            state,
            Arc::new(dice),
            Arc::new(SoundCatalog::default()),
            Duration::from_secs(1),
        );
        (gw, p)
    }

    #[tokio::test]
    async fn forced_sound_streams_a_url_from_the_pool() {
        let (gw, p) = performer(Dice::fixed(0.999));
        assert!(p.try_sound(SoundCategory::Lose, true));
        // Flush the queue behind the fire-and-forget stream.
        p.speak("done").await;
        let urls = gw.streamed();
        assert_eq!(urls.len(), 1);
        assert!(urls[0].ends_with(".mp3"));
    }

    #[tokio::test]
    async fn no_sound_while_speaking() {
        let (gw, p) = performer(Dice::fixed(0.0));
        let guard = p.state().speaking();
        assert!(!p.try_sound(SoundCategory::Win, true));
        drop(guard);
        p.speak("flush").await;
        assert!(gw.streamed().is_empty());
    }

    #[tokio::test]
    async fn say_clears_speaking_flag_even_on_failure() {
        let (gw, p) = performer(Dice::fixed(0.0));
        gw.fail_on("speak");
        assert!(!p.say("hello").await);
        assert!(!p.state().is_speaking());
    }
}
