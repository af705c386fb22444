//! Client for the external game-state service.
//!
//! ```text
//! GET  /state  -> {"turn_index", "game_over", "winner", "ai_lead", "last_taunt"}
//! POST /reset
//! ```
//!
//! `winner` arrives as `-1` (robot), `1` (human), `"draw"` or `null`.

use std::time::Duration;

use async_trait::async_trait;
use rival_types::{GameSnapshot, RivalError, Winner};
use serde::Deserialize;
use serde_json::Value;

const STATE_TIMEOUT: Duration = Duration::from_millis(500);
const RESET_TIMEOUT: Duration = Duration::from_secs(1);

/// Read and reset access to the game being played.
#[async_trait]
pub trait GameStateService: Send + Sync {
    async fn fetch(&self) -> Result<GameSnapshot, RivalError>;
    async fn reset(&self) -> Result<(), RivalError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire format
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireState {
    #[serde(default = "no_turn")]
    turn_index: i64,
    #[serde(default)]
    game_over: bool,
    #[serde(default)]
    winner: Value,
    #[serde(default)]
    ai_lead: Option<f64>,
    #[serde(default)]
    last_taunt: Option<String>,
}

fn no_turn() -> i64 {
    -1
}

fn parse_winner(value: &Value) -> Option<Winner> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(-1) => Some(Winner::Agent),
            Some(1) => Some(Winner::Human),
            _ => None,
        },
        Value::String(s) if s.eq_ignore_ascii_case("draw") => Some(Winner::Draw),
        _ => None,
    }
}

impl From<WireState> for GameSnapshot {
    fn from(w: WireState) -> Self {
        GameSnapshot {
            turn_index: w.turn_index,
            score_lead: w.ai_lead.map(|l| l.round() as i64).unwrap_or(0),
            game_over: w.game_over,
            winner: parse_winner(&w.winner),
            last_message: w.last_taunt.unwrap_or_default(),
        }
    }
}

/// Decode a `/state` body.
pub fn parse_state(body: &str) -> Result<GameSnapshot, RivalError> {
    let wire: WireState = serde_json::from_str(body)
        .map_err(|e| RivalError::Serialization(format!("game state: {e}")))?;
    Ok(wire.into())
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP client
// ─────────────────────────────────────────────────────────────────────────────

pub struct HttpGameClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpGameClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl GameStateService for HttpGameClient {
    async fn fetch(&self) -> Result<GameSnapshot, RivalError> {
        let body = self
            .client
            .get(format!("{}/state", self.base_url))
            .timeout(STATE_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RivalError::GameService(e.to_string()))?
            .text()
            .await
            .map_err(|e| RivalError::GameService(e.to_string()))?;
        parse_state(&body)
    }

    async fn reset(&self) -> Result<(), RivalError> {
        self.client
            .post(format!("{}/reset", self.base_url))
            .timeout(RESET_TIMEOUT)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RivalError::GameService(format!("reset: {e}")))?;
        Ok(())
    }
}
