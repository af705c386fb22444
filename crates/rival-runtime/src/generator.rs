//! Response generation – one short spoken line per utterance.
//!
//! [`LlmResponseGenerator`] walks a chain of model names against an
//! OpenAI-compatible `/chat/completions` endpoint and falls back to
//! [`ScriptedGenerator`] when every model fails.  Callers never see an
//! error: [`ResponseGenerator::generate`] always returns a line.
//!
//! # Example
//!
//! ```rust,no_run
//! use rival_runtime::generator::{
//!     GenerationContext, GenerationMode, LlmResponseGenerator, OpenAiChat, ResponseGenerator,
//! };
//!
//! # async fn demo() {
//! let chat = OpenAiChat::new("https://api.openai.com/v1", Some("sk-...".into()), 60);
//! let generator = LlmResponseGenerator::new(chat, vec!["gpt-4o-mini".into()]);
//! let ctx = GenerationContext::gameplay(4, "nice move huh", None);
//! let line = generator.generate(&ctx, GenerationMode::Gameplay).await;
//! # }
//! ```

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use rival_types::{GameSnapshot, MoodCategory, Winner};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::mood::{category_for, prompt_suffix};

// ─────────────────────────────────────────────────────────────────────────────
// Style rules
// ─────────────────────────────────────────────────────────────────────────────

/// Rules appended to every system-role message sent to the model.
pub const STYLE_RULES: &str = "\
Keep responses SHORT: one sentence.
Use Gen Z slang lightly. No emojis.
Never mention being an AI.
Stay classroom-safe: no swearing, slurs, politics or sex.";

/// Longest line handed to text-to-speech.
pub const MAX_LINE_CHARS: usize = 180;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected response format: {0}")]
    BadResponse(String),
    #[error("Generator not configured: {0}")]
    NotConfigured(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// Message types (OpenAI-compatible)
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Append [`STYLE_RULES`] to every system message, prepending one if none
/// exists.
pub fn with_style_rules(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut out: Vec<ChatMessage> = messages
        .iter()
        .map(|m| match m.role {
            Role::System => ChatMessage::system(format!("{}\n\n{}", m.content, STYLE_RULES)),
            _ => m.clone(),
        })
        .collect();
    if !out.iter().any(|m| m.role == Role::System) {
        out.insert(0, ChatMessage::system(STYLE_RULES));
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat transport
// ─────────────────────────────────────────────────────────────────────────────

/// One chat-completion round trip against a named model.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct OpenAiChat {
    base_url: String,
    api_key: Option<String>,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiChat {
    /// `base_url` includes the API version segment, e.g.
    /// `https://api.openai.com/v1` or `http://localhost:11434/v1`.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, max_tokens: u32) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            max_tokens,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatCompletion for OpenAiChat {
    async fn complete(&self, model: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let augmented = with_style_rules(messages);
        let body = ChatRequest {
            model,
            messages: &augmented,
            max_tokens: self.max_tokens,
            stream: false,
        };
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response: ChatResponse = request.send().await?.error_for_status()?.json().await?;
        response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::BadResponse("empty choices array".into()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generation context
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    Gameplay,
    Rematch,
}

/// Everything a generator may condition on.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationContext {
    pub score_lead: i64,
    pub game_over: bool,
    pub winner: Option<Winner>,
    pub user_text: String,
    pub user_name: Option<String>,
}

impl GenerationContext {
    pub fn gameplay(
        score_lead: i64,
        user_text: impl Into<String>,
        user_name: Option<String>,
    ) -> Self {
        Self {
            score_lead,
            game_over: false,
            winner: None,
            user_text: user_text.into(),
            user_name,
        }
    }

    pub fn from_snapshot(
        snap: &GameSnapshot,
        user_text: impl Into<String>,
        user_name: Option<String>,
    ) -> Self {
        Self {
            score_lead: snap.score_lead,
            game_over: snap.game_over,
            winner: snap.winner,
            user_text: user_text.into(),
            user_name,
        }
    }

    pub fn mood(&self) -> MoodCategory {
        category_for(self.score_lead)
    }
}

/// System prompt for `mode`, including the mood attitude and what is known
/// about the player's name.
pub fn system_prompt(ctx: &GenerationContext, mode: GenerationMode) -> String {
    match mode {
        GenerationMode::Rematch => "The game is over. In one short sentence, ask the player \
             whether they want a rematch. They must answer yes or no."
            .to_string(),
        GenerationMode::Gameplay => {
            let mut prompt = String::from(
                "You are 'Robo', a cocky, competitive Connect 4 robot. \
                 You can perform actions by ending your sentence with tags: \
                 [DANCE], [DAB], [SNEEZE], [CLAP], [SAD]. \
                 Tags are RARE: use a tag in at most 1 out of 10 replies, otherwise no tag. \
                 Only use tags if the situation is extreme. ",
            );
            prompt.push_str(prompt_suffix(ctx.mood()));
            match &ctx.user_name {
                Some(name) => prompt.push_str(&format!(
                    " The user's name is {name}. Never ask for their name. Always address them by name."
                )),
                None => prompt.push_str(
                    " If you don't know the user's name yet, ask once, then stop asking.",
                ),
            }
            prompt
        }
    }
}

pub fn user_message(ctx: &GenerationContext) -> String {
    format!("Score Lead: {}. User said: {}", ctx.score_lead, ctx.user_text)
}

// ─────────────────────────────────────────────────────────────────────────────
// Generators
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// One line to speak.  Never fails; may carry inline action tags.
    async fn generate(&self, ctx: &GenerationContext, mode: GenerationMode) -> String;
}

/// Deterministic lines keyed on the game situation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptedGenerator;

impl ScriptedGenerator {
    pub fn line(&self, ctx: &GenerationContext, mode: GenerationMode) -> &'static str {
        if mode == GenerationMode::Rematch {
            return "Yes or no: do you want a rematch?";
        }
        if ctx.game_over {
            return match ctx.winner {
                Some(Winner::Agent) => "GG, I told you I was built different.",
                Some(Winner::Human) => "Alright, you got me this time, respect.",
                _ => "Draw game, kinda mid for both of us.",
            };
        }
        match ctx.score_lead {
            l if l > 10 => "I'm lowkey speedrunning you right now.",
            l if l > 4 => "I'm kinda ahead, you sure about that strategy?",
            l if l < -10 => "Okay, chill, you're actually stomping me.",
            l if l < -4 => "You're up right now, but don't get comfy.",
            _ => "Close game so far, one bad move and you're cooked.",
        }
    }
}

#[async_trait]
impl ResponseGenerator for ScriptedGenerator {
    async fn generate(&self, ctx: &GenerationContext, mode: GenerationMode) -> String {
        self.line(ctx, mode).to_string()
    }
}

/// Model fallback chain in front of [`ScriptedGenerator`].
pub struct LlmResponseGenerator<C> {
    chat: C,
    models: Vec<String>,
    fallback: ScriptedGenerator,
}

impl<C: ChatCompletion> LlmResponseGenerator<C> {
    pub fn new(chat: C, models: Vec<String>) -> Self {
        Self {
            chat,
            models,
            fallback: ScriptedGenerator,
        }
    }

    /// First non-empty reply along the model chain.
    ///
    /// # Errors
    ///
    /// The last model's error, or [`LlmError::NotConfigured`] for an empty
    /// chain, or [`LlmError::BadResponse`] if every model answered blank.
    pub async fn try_generate(
        &self,
        ctx: &GenerationContext,
        mode: GenerationMode,
    ) -> Result<String, LlmError> {
        let messages = [
            ChatMessage::system(system_prompt(ctx, mode)),
            ChatMessage::user(user_message(ctx)),
        ];
        let mut last_err = LlmError::NotConfigured("no models in the fallback chain".into());
        for model in &self.models {
            match self.chat.complete(model, &messages).await {
                Ok(text) if !text.trim().is_empty() => {
                    debug!(model = %model, "generated reply");
                    return Ok(text);
                }
                Ok(_) => {
                    warn!(model = %model, "model returned an empty reply; trying next");
                    last_err = LlmError::BadResponse(format!("{model}: empty reply"));
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "model failed; trying next");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

#[async_trait]
impl<C: ChatCompletion> ResponseGenerator for LlmResponseGenerator<C> {
    async fn generate(&self, ctx: &GenerationContext, mode: GenerationMode) -> String {
        match self.try_generate(ctx, mode).await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "all models failed; using scripted line");
                self.fallback.line(ctx, mode).to_string()
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sanitisation
// ─────────────────────────────────────────────────────────────────────────────

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[player name\]|\[player_name\]|\{player_name\}|\{player name\}")
        .expect("static regex")
});

static NAME_ASK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(what'?s|what is)\s+your\s+name\b|\bdrop\s+your\s+name\b")
        .expect("static regex")
});

/// Make a line safe to speak: fill in the player's name, stop asking for a
/// name that is already known, flatten to one line and cap the length.
pub fn sanitize_line(text: &str, user_name: Option<&str>) -> String {
    let mut line = text.trim().to_string();
    if line.is_empty() {
        return line;
    }
    if let Some(name) = user_name {
        line = PLACEHOLDER.replace_all(&line, name).into_owned();
        if NAME_ASK.is_match(&line) {
            return format!("{name}, stop stalling and play.");
        }
    }
    let flat = line.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(MAX_LINE_CHARS) {
        Some((cut, _)) => flat[..cut].trim_end().to_string(),
        None => flat,
    }
}
