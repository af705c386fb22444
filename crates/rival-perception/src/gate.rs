//! Loudness/duration quality gate applied before any transcription call.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::segment::AudioSegment;

/// Outcome of [`QualityGate::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateVerdict {
    Accepted,
    TooShort,
    TooQuiet,
}

/// Rejects clips that are too short or too quiet to be speech.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGate {
    /// Minimum clip length, in seconds.
    pub min_duration_secs: f32,
    /// Minimum whole-clip RMS.
    pub min_rms: f32,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_duration_secs: 0.3,
            min_rms: 0.01,
        }
    }
}

impl QualityGate {
    pub fn check(&self, segment: &AudioSegment) -> GateVerdict {
        if segment.duration() < Duration::from_secs_f32(self.min_duration_secs.max(0.0)) {
            GateVerdict::TooShort
        } else if segment.rms() < self.min_rms {
            GateVerdict::TooQuiet
        } else {
            GateVerdict::Accepted
        }
    }
}
