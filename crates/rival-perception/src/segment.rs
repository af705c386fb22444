//! Captured audio segments and the energy-based segmenter that cuts them.

use std::io::Cursor;
use std::time::Duration;

use rival_types::RivalError;
use serde::{Deserialize, Serialize};

/// Sample rate every segment is normalised to.
pub const SAMPLE_RATE: u32 = 16_000;

/// A stretch of mono PCM in `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSegment {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// Root-mean-square loudness; `0.0` for an empty segment.
    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }

    /// Encode as a 16-bit mono WAV file.
    pub fn to_wav(&self) -> Result<Vec<u8>, RivalError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| RivalError::Audio(format!("wav header: {e}")))?;
            for &s in &self.samples {
                let sample = (s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
                writer
                    .write_sample(sample)
                    .map_err(|e| RivalError::Audio(format!("wav sample: {e}")))?;
            }
            writer
                .finalize()
                .map_err(|e| RivalError::Audio(format!("wav finalize: {e}")))?;
        }
        Ok(cursor.into_inner())
    }
}

pub(crate) fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

// ─────────────────────────────────────────────────────────────────────────────
// Segmenter
// ─────────────────────────────────────────────────────────────────────────────

/// Thresholds for cutting utterances out of a continuous stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Chunk RMS above which a chunk counts as speech.
    pub rms_threshold: f32,
    /// Trailing quiet time that closes an utterance, in seconds.
    pub silence_secs: f32,
    /// Hard cap on one utterance, in seconds.
    pub phrase_limit_secs: f32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            rms_threshold: 0.05,
            silence_secs: 1.0,
            phrase_limit_secs: 5.0,
        }
    }
}

/// Incremental RMS segmenter.
///
/// Feed it chunks with [`UtteranceSegmenter::push`]; it returns a segment
/// once speech has been followed by enough silence, or once the phrase limit
/// is hit.  Chunks before the first loud chunk are dropped.
#[derive(Debug)]
pub struct UtteranceSegmenter {
    config: SegmenterConfig,
    sample_rate: u32,
    buffer: Vec<f32>,
    silent_samples: usize,
    in_speech: bool,
}

impl UtteranceSegmenter {
    pub fn new(config: SegmenterConfig, sample_rate: u32) -> Self {
        Self {
            config,
            sample_rate,
            buffer: Vec::new(),
            silent_samples: 0,
            in_speech: false,
        }
    }

    /// `true` once a loud chunk has opened an utterance.
    pub fn in_speech(&self) -> bool {
        self.in_speech
    }

    fn secs_to_samples(&self, secs: f32) -> usize {
        (secs.max(0.0) * self.sample_rate as f32) as usize
    }

    pub fn push(&mut self, chunk: &[f32]) -> Option<AudioSegment> {
        let loud = rms(chunk) > self.config.rms_threshold;
        if !self.in_speech {
            if !loud {
                return None;
            }
            self.in_speech = true;
        }

        self.buffer.extend_from_slice(chunk);
        if loud {
            self.silent_samples = 0;
        } else {
            self.silent_samples += chunk.len();
        }

        let closed_by_silence =
            self.silent_samples >= self.secs_to_samples(self.config.silence_secs);
        let hit_limit = self.buffer.len() >= self.secs_to_samples(self.config.phrase_limit_secs);
        if closed_by_silence || hit_limit {
            return Some(self.take());
        }
        None
    }

    /// Close and return whatever has been collected, if speech started.
    pub fn flush(&mut self) -> Option<AudioSegment> {
        self.in_speech.then(|| self.take())
    }

    fn take(&mut self) -> AudioSegment {
        self.in_speech = false;
        self.silent_samples = 0;
        AudioSegment::new(std::mem::take(&mut self.buffer), self.sample_rate)
    }
}
