//! `rival-runtime` – The reactive behavior engine
//!
//! Turns game-state changes and player speech into sounds, gestures and
//! spoken taunts for a Connect-4 playing robot.  Two loops share one
//! [`EngineState`][state::EngineState]: a fixed-rate game poll loop and a
//! speech loop that blocks on the microphone.
//!
//! # Modules
//!
//! - [`mood`] – [`MoodProfile`][mood::MoodProfile]: score lead → mood
//!   category and action probabilities.
//! - [`random`] – [`Dice`][random::Dice]: seeded or fixed random draws.
//! - [`scheduler`] – [`CooldownScheduler`][scheduler::CooldownScheduler]:
//!   sound and gesture cooldowns plus the single stall-sound timer.
//! - [`state`] – [`EngineState`][state::EngineState] behind
//!   [`SharedState`][state::SharedState], with the game phase, the speaking
//!   flag and the per-game blowout flags.
//! - [`catalog`] – gesture names, sound pools, and the mood-driven picks
//!   between them.
//! - [`tags`] – splits `[DAB]`-style action tags out of generated text.
//! - [`intent`] – fixed-pattern rematch answers and name introductions.
//! - [`game_client`] – [`GameStateService`][game_client::GameStateService]
//!   and its HTTP client.
//! - [`generator`] – [`ResponseGenerator`][generator::ResponseGenerator]:
//!   an OpenAI-compatible model chain with a scripted fallback.
//!   [`STYLE_RULES`][generator::STYLE_RULES] are injected into every
//!   system-role message.
//! - [`reactions`] – [`Performer`][reactions::Performer]: sound, speech and
//!   gesture helpers shared by both loops.
//! - [`poll_loop`] – [`PollLoop`][poll_loop::PollLoop]: per-move reactions,
//!   stall and idle sounds, the end-of-game script.
//! - [`speech_loop`] – [`SpeechLoop`][speech_loop::SpeechLoop]: rematch
//!   answers, the blowout interrupt and conversation.
//! - [`engine`] – [`Engine`][engine::Engine]: runs both loops over one
//!   actuator dispatcher.
//! - [`health`] – [`LinkHealth`][health::LinkHealth]: game link heartbeat.
//! - [`shutdown`] – [`Shutdown`][shutdown::Shutdown]: process-wide stop
//!   signal.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: the global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod game_client;
pub mod generator;
pub mod health;
pub mod intent;
pub mod mood;
pub mod poll_loop;
pub mod random;
pub mod reactions;
pub mod scheduler;
pub mod shutdown;
pub mod speech_loop;
pub mod state;
pub mod tags;
pub mod telemetry;

#[cfg(test)]
mod testkit;

pub use config::EngineConfig;
pub use engine::{Collaborators, Engine};
pub use game_client::{GameStateService, HttpGameClient};
pub use generator::{
    ChatCompletion, LlmResponseGenerator, OpenAiChat, ResponseGenerator, STYLE_RULES,
    ScriptedGenerator,
};
pub use mood::{MoodProfile, MoodTuning};
pub use random::Dice;
pub use shutdown::Shutdown;
pub use telemetry::{TracerProviderGuard, init_tracing};
