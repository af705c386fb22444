//! `rival-perception` – Speech input
//!
//! Turns a live audio stream into short transcripts for the speech loop.
//!
//! # Modules
//!
//! - [`segment`] – [`AudioSegment`] (duration, RMS, WAV encoding) and the
//!   RMS-based [`UtteranceSegmenter`].
//! - [`gate`] – [`QualityGate`]: drops clips that are too short or too quiet
//!   before any transcription call.
//! - [`source`] – the [`AudioSource`] trait and [`ChannelAudioSource`].
//! - [`microphone`] – `cpal` capture of the default input device (feature
//!   `microphone`).
//! - [`transcriber`] – the [`Transcriber`] trait and the OpenAI-compatible
//!   [`WhisperHttpTranscriber`].
//! - [`listener`] – the [`UtteranceSource`] trait, the gated [`Listener`] and
//!   the stdin-backed [`ConsoleInput`].

pub mod gate;
pub mod listener;
#[cfg(feature = "microphone")]
pub mod microphone;
pub mod segment;
pub mod source;
pub mod transcriber;

pub use gate::{GateVerdict, QualityGate};
pub use listener::{ConsoleInput, Listener, UtteranceSource};
#[cfg(feature = "microphone")]
pub use microphone::MicrophoneCapture;
pub use segment::{AudioSegment, SAMPLE_RATE, SegmenterConfig, UtteranceSegmenter};
pub use source::{AudioSource, ChannelAudioSource};
pub use transcriber::{Transcriber, WhisperHttpTranscriber};
