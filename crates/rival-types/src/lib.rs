use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Who won a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    /// The robot (the side the engine plays for).
    Agent,
    /// The person sitting across the board.
    Human,
    Draw,
}

/// One observation of the external game, as returned by a single poll.
///
/// Snapshots are immutable and fully superseded by the next poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Change counter: grows by one on every move and on every reset.
    pub turn_index: i64,
    /// Heuristic score difference, positive when the robot is ahead.
    pub score_lead: i64,
    pub game_over: bool,
    pub winner: Option<Winner>,
    /// Taunt produced by the game service for the latest move (may be empty).
    pub last_message: String,
}

impl GameSnapshot {
    /// A fresh board: turn zero, no lead, game running.
    pub fn fresh() -> Self {
        Self {
            turn_index: 0,
            score_lead: 0,
            game_over: false,
            winner: None,
            last_message: String::new(),
        }
    }

    /// `true` when the snapshot carries a non-blank message to speak.
    pub fn has_message(&self) -> bool {
        !self.last_message.trim().is_empty()
    }
}

/// Coarse classification of the score lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoodCategory {
    DominatingAgent,
    LeadingAgent,
    Close,
    LeadingHuman,
    DominatingHuman,
}

impl MoodCategory {
    /// `true` for both agent-ahead categories.
    pub fn agent_ahead(self) -> bool {
        matches!(self, Self::DominatingAgent | Self::LeadingAgent)
    }

    /// `true` for both human-ahead categories.
    pub fn human_ahead(self) -> bool {
        matches!(self, Self::DominatingHuman | Self::LeadingHuman)
    }

    /// Short label used in logs and prompts.
    pub fn label(self) -> &'static str {
        match self {
            Self::DominatingAgent => "winning_big",
            Self::LeadingAgent => "winning",
            Self::Close => "close",
            Self::LeadingHuman => "losing",
            Self::DominatingHuman => "losing_big",
        }
    }
}

impl std::fmt::Display for MoodCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Pools of short sound effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundCategory {
    Win,
    Lose,
    Annoy,
    Wait,
}

impl std::fmt::Display for SoundCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Win => "win",
            Self::Lose => "lose",
            Self::Annoy => "annoy",
            Self::Wait => "wait",
        };
        f.write_str(s)
    }
}

/// Closed set of action tags a generated line may carry (`[DANCE]`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GestureTag {
    Dance,
    Dab,
    Sneeze,
    Clap,
    Sad,
}

impl GestureTag {
    pub const ALL: [GestureTag; 5] = [
        GestureTag::Dance,
        GestureTag::Dab,
        GestureTag::Sneeze,
        GestureTag::Clap,
        GestureTag::Sad,
    ];

    /// The bracketed marker as it appears in generated text.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Dance => "[DANCE]",
            Self::Dab => "[DAB]",
            Self::Sneeze => "[SNEEZE]",
            Self::Clap => "[CLAP]",
            Self::Sad => "[SAD]",
        }
    }
}

/// Estimated body posture, tracked so a crouched robot stands up again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Posture {
    #[default]
    Standing,
    Crouched,
}

/// Strict definition of what the engine may ask the robot to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload")]
pub enum ActuatorCommand {
    /// Say a line through the text-to-speech channel.
    Speak { text: String },
    /// Cut off any line currently being spoken.
    StopSpeech,
    /// Play a named gesture.  `blocking` asks the robot to finish it before
    /// acknowledging the call.
    PlayGesture { name: String, blocking: bool },
    /// Stream a remote audio file through the speaker.
    StreamAudio { url: String },
    StopAudio,
}

impl ActuatorCommand {
    /// Short name used in logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Speak { .. } => "speak",
            Self::StopSpeech => "stop_speech",
            Self::PlayGesture { .. } => "play_gesture",
            Self::StreamAudio { .. } => "stream_audio",
            Self::StopAudio => "stop_audio",
        }
    }
}

/// A command stamped with an id and issue time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    pub id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub command: ActuatorCommand,
}

impl CommandRecord {
    pub fn new(command: ActuatorCommand) -> Self {
        Self {
            id: Uuid::new_v4(),
            issued_at: Utc::now(),
            command,
        }
    }
}

/// Global error type spanning game-service, actuator, generator and audio failures.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RivalError {
    #[error("Game Service Error: {0}")]
    GameService(String),

    #[error("Actuator Failure on {command}: {details}")]
    Actuator { command: String, details: String },

    #[error("Response Generator Error: {0}")]
    Generator(String),

    #[error("Transcription Error: {0}")]
    Transcription(String),

    #[error("Audio Capture Error: {0}")]
    Audio(String),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Channel Closed: {0}")]
    Channel(String),

    #[error("Serialization Error: {0}")]
    Serialization(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actuator_command_is_tagged() {
        let cmd = ActuatorCommand::PlayGesture {
            name: "BlocklyDab".into(),
            blocking: true,
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert!(json.contains("\"command\":\"PlayGesture\""));
        assert!(json.contains("BlocklyDab"));
        let back: ActuatorCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn mood_category_sides() {
        assert!(MoodCategory::DominatingAgent.agent_ahead());
        assert!(MoodCategory::LeadingAgent.agent_ahead());
        assert!(!MoodCategory::Close.agent_ahead());
        assert!(!MoodCategory::Close.human_ahead());
        assert!(MoodCategory::LeadingHuman.human_ahead());
        assert!(MoodCategory::DominatingHuman.human_ahead());
    }

    #[test]
    fn snapshot_message_must_be_non_blank() {
        let mut snap = GameSnapshot::fresh();
        assert!(!snap.has_message());
        snap.last_message = "   ".into();
        assert!(!snap.has_message());
        snap.last_message = "Nice try.".into();
        assert!(snap.has_message());
    }

    #[test]
    fn gesture_markers_are_bracketed() {
        for tag in GestureTag::ALL {
            let m = tag.marker();
            assert!(m.starts_with('[') && m.ends_with(']'));
        }
    }

    #[test]
    fn command_record_gets_unique_ids() {
        let a = CommandRecord::new(ActuatorCommand::StopAudio);
        let b = CommandRecord::new(ActuatorCommand::StopAudio);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn rival_error_display() {
        let err = RivalError::Actuator {
            command: "speak".into(),
            details: "socket closed".into(),
        };
        assert!(err.to_string().contains("Actuator Failure on speak"));
    }
}
