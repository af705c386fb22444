//! [`Engine`] – wires the two loops to one dispatcher and one state.
//!
//! The poll loop and the speech loop run concurrently on the same
//! [`SharedState`].  Both send actuator commands through handles of a single
//! [`ActuatorDispatcher`], so the robot sees commands in the order they were
//! issued.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rival_middleware::RecordingGateway;
//! use rival_perception::ConsoleInput;
//! use rival_runtime::{Collaborators, Engine, EngineConfig, HttpGameClient, Shutdown};
//! use rival_runtime::generator::ScriptedGenerator;
//!
//! # async fn demo() {
//! let engine = Engine::new(EngineConfig::default());
//! let collaborators = Collaborators {
//!     game: Arc::new(HttpGameClient::new("http://localhost:5000")),
//!     generator: Arc::new(ScriptedGenerator),
//!     input: Box::new(ConsoleInput::stdin()),
//!     gateway: Arc::new(RecordingGateway::new()),
//! };
//! engine.run(collaborators, Shutdown::new()).await;
//! # }
//! ```

use std::sync::Arc;

use rival_middleware::{ActuatorDispatcher, ActuatorGateway};
use rival_perception::UtteranceSource;
use tracing::{info, warn};

use crate::catalog::{self, SoundCatalog};
use crate::config::EngineConfig;
use crate::game_client::GameStateService;
use crate::generator::ResponseGenerator;
use crate::poll_loop::PollLoop;
use crate::random::Dice;
use crate::reactions::Performer;
use crate::shutdown::Shutdown;
use crate::speech_loop::SpeechLoop;
use crate::state::{EngineState, SharedState};

/// The external systems the engine talks to.
pub struct Collaborators {
    pub game: Arc<dyn GameStateService>,
    pub generator: Arc<dyn ResponseGenerator>,
    pub input: Box<dyn UtteranceSource>,
    pub gateway: Arc<dyn ActuatorGateway>,
}

pub struct Engine {
    config: Arc<EngineConfig>,
    sounds: Arc<SoundCatalog>,
    dice: Arc<Dice>,
}

impl Engine {
    /// Engine with the built-in sound catalog and entropy-seeded dice.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            sounds: Arc::new(SoundCatalog::default()),
            dice: Arc::new(Dice::from_entropy()),
        }
    }

    pub fn with_sounds(mut self, sounds: SoundCatalog) -> Self {
        self.sounds = Arc::new(sounds);
        self
    }

    pub fn with_dice(mut self, dice: Dice) -> Self {
        self.dice = Arc::new(dice);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run both loops until `shutdown` fires.
    ///
    /// The speech loop may stop early when its input closes; the engine keeps
    /// reacting to the game until shutdown.  Returns once every pending
    /// actuator command has been handed to the gateway.
    pub async fn run(self, collaborators: Collaborators, shutdown: Shutdown) {
        let Collaborators {
            game,
            generator,
            input,
            gateway,
        } = collaborators;

        let state = SharedState::new(EngineState::new(
            self.config.cooldowns(),
            self.config.mood,
        ));
        let (dispatcher, handle) = ActuatorDispatcher::new(gateway);
        let dispatcher = tokio::spawn(dispatcher.run());

        let performer = Performer::new(
            handle,
            state,
            self.dice.clone(),
            self.sounds.clone(),
            self.config.actuator_timeout(),
        );
        performer.gesture(catalog::STAND);
        info!("engine started");

        let poll = PollLoop::new(performer.clone(), game.clone(), self.config.clone());
        let speech = SpeechLoop::new(
            performer.clone(),
            game,
            generator,
            input,
            self.config.clone(),
        );
        tokio::join!(poll.run(shutdown.clone()), speech.run(shutdown));

        performer.stop_speech();
        drop(performer);
        if let Err(e) = dispatcher.await {
            warn!(error = %e, "actuator dispatcher task failed");
        }
        info!("engine stopped");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
