//! Configuration vault: reads and writes `~/.rivalbot/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use rival_perception::{QualityGate, SegmenterConfig};
use rival_runtime::EngineConfig;
use rival_runtime::catalog::SoundCatalog;
use rival_types::{RivalError, SoundCategory};
use serde::{Deserialize, Serialize};

/// Persisted settings.  Every field has a default, so a file only needs the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the game-state service (`/state`, `/reset`).
    pub game_url: String,
    /// WAMP router of the robot.
    pub wamp_url: String,
    /// Robot realm, e.g. `rie.0123456789abcdef`.
    pub realm: String,
    pub llm: LlmSection,
    pub stt: SttSection,
    pub input: InputSection,
    pub engine: EngineConfig,
    pub sounds: SoundsSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            game_url: "http://127.0.0.1:8000".to_string(),
            wamp_url: "ws://wamp.robotsindeklas.nl".to_string(),
            realm: String::new(),
            llm: LlmSection::default(),
            stt: SttSection::default(),
            input: InputSection::default(),
            engine: EngineConfig::default(),
            sounds: SoundsSection::default(),
        }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// OpenAI-compatible API root, including the version segment.
    pub base_url: String,
    /// Tried in order until one answers.
    pub models: Vec<String>,
    /// Stored as plain text; the file is written owner-only.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    pub max_tokens: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            models: vec!["gpt-4o-mini".to_string()],
            api_key: String::new(),
            max_tokens: 60,
        }
    }
}

impl LlmSection {
    pub fn api_key(&self) -> Option<String> {
        (!self.api_key.is_empty()).then(|| self.api_key.clone())
    }
}

impl std::fmt::Debug for LlmSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmSection")
            .field("base_url", &self.base_url)
            .field("models", &self.models)
            .field(
                "api_key",
                if self.api_key.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SttSection {
    /// Defaults to the LLM base URL when empty.
    pub base_url: String,
    pub model: String,
}

impl Default for SttSection {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model: "whisper-1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    /// Typed lines on stdin stand in for transcripts.
    #[default]
    Console,
    Microphone,
}

impl std::str::FromStr for InputMode {
    type Err = RivalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "console" => Ok(InputMode::Console),
            "microphone" | "mic" => Ok(InputMode::Microphone),
            other => Err(RivalError::Config(format!("unknown input mode `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputSection {
    pub mode: InputMode,
    pub gate: QualityGate,
    pub segmenter: SegmenterConfig,
}

/// `[sounds]`: a base URL plus one file list per category.  An omitted list
/// keeps the built-in pool.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundsSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lose: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annoy: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait: Option<Vec<String>>,
}

impl SoundsSection {
    pub fn catalog(&self) -> SoundCatalog {
        let mut catalog = SoundCatalog::default();
        if let Some(base) = &self.base_url {
            catalog.base_url = base.clone();
        }
        let lists = [
            (SoundCategory::Win, &self.win),
            (SoundCategory::Lose, &self.lose),
            (SoundCategory::Annoy, &self.annoy),
            (SoundCategory::Wait, &self.wait),
        ];
        for (category, files) in lists {
            if let Some(files) = files {
                catalog.pools.insert(category, files.clone());
            }
        }
        catalog
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Paths
// ─────────────────────────────────────────────────────────────────────────────

/// `~/.rivalbot/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rivalbot").join("config.toml")
}

// ─────────────────────────────────────────────────────────────────────────────
// Load / save
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of [`load_or_init`].
#[derive(Debug)]
pub enum Loaded {
    Existing(Config),
    /// No file was found; defaults were written to the path.
    Created(Config),
}

/// Load `path`, or write the defaults there on first run.  Env overrides are
/// applied either way.
pub fn load_or_init(path: &Path) -> Result<Loaded, RivalError> {
    match load_from(path)? {
        Some(cfg) => Ok(Loaded::Existing(with_env(cfg))),
        None => {
            let cfg = Config::default();
            save_to(&cfg, path)?;
            Ok(Loaded::Created(with_env(cfg)))
        }
    }
}

fn with_env(mut cfg: Config) -> Config {
    apply_env_overrides(&mut cfg);
    cfg
}

/// `None` when the file does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, RivalError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        RivalError::Config(format!("failed to read {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw).map_err(|e| {
        RivalError::Config(format!("failed to parse {}: {e}", path.display()))
    })?;
    Ok(Some(cfg))
}

/// Apply `RIVAL_*` environment overrides.
///
/// | Variable | Config field |
/// |---|---|
/// | `RIVAL_GAME_URL` | `game_url` |
/// | `RIVAL_WAMP_URL` | `wamp_url` |
/// | `RIVAL_REALM` | `realm` |
/// | `RIVAL_LLM_URL` | `llm.base_url` |
/// | `RIVAL_MODEL` | `llm.models` (comma-separated chain) |
/// | `RIVAL_API_KEY` | `llm.api_key` |
/// | `OPENAI_API_KEY` | `llm.api_key`, only when nothing else set it |
/// | `RIVAL_INPUT` | `input.mode` (`console` or `microphone`) |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("RIVAL_GAME_URL") {
        cfg.game_url = v;
    }
    if let Ok(v) = std::env::var("RIVAL_WAMP_URL") {
        cfg.wamp_url = v;
    }
    if let Ok(v) = std::env::var("RIVAL_REALM") {
        cfg.realm = v;
    }
    if let Ok(v) = std::env::var("RIVAL_LLM_URL") {
        cfg.llm.base_url = v;
    }
    if let Ok(v) = std::env::var("RIVAL_MODEL") {
        let models: Vec<String> = v
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
        if !models.is_empty() {
            cfg.llm.models = models;
        }
    }
    if let Ok(v) = std::env::var("RIVAL_API_KEY") {
        cfg.llm.api_key = v;
    }
    if cfg.llm.api_key.is_empty()
        && let Ok(v) = std::env::var("OPENAI_API_KEY")
    {
        cfg.llm.api_key = v;
    }
    if let Ok(v) = std::env::var("RIVAL_INPUT")
        && let Ok(mode) = v.parse()
    {
        cfg.input.mode = mode;
    }
}

/// Write `cfg` to `path`, creating the directory if necessary.  On Unix the
/// directory is `0o700` and the file `0o600`.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), RivalError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            RivalError::Config(format!("failed to create {}: {e}", parent.display()))
        })?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                RivalError::Config(format!("failed to restrict {}: {e}", parent.display()))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| RivalError::Config(format!("failed to serialize config: {e}")))?;
    write_owner_only(path, &raw)
        .map_err(|e| RivalError::Config(format!("failed to write {}: {e}", path.display())))
}

#[cfg(unix)]
fn write_owner_only(path: &Path, raw: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .and_then(|mut f| f.write_all(raw.as_bytes()))
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, raw: &str) -> std::io::Result<()> {
    fs::write(path, raw)
}
