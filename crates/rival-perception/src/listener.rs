//! Utterance sources: what the speech loop actually reads from.
//!
//! - [`Listener`] – audio source + [`QualityGate`] + [`Transcriber`].  Clips
//!   that fail the gate never reach the transcriber.
//! - [`ConsoleInput`] – typed lines from stdin stand in for transcripts.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rival_types::RivalError;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tracing::debug;

use crate::gate::{GateVerdict, QualityGate};
use crate::source::AudioSource;
use crate::transcriber::Transcriber;

/// Yields transcribed user text.
#[async_trait]
pub trait UtteranceSource: Send {
    /// Wait up to `timeout` for someone to start talking.
    ///
    /// `Ok(None)` means nothing usable was heard.  [`RivalError::Channel`]
    /// means the source is closed for good.
    async fn next_utterance(&mut self, timeout: Duration) -> Result<Option<String>, RivalError>;
}

/// Gated speech-to-text over a live [`AudioSource`].
pub struct Listener {
    source: Box<dyn AudioSource>,
    gate: QualityGate,
    transcriber: Arc<dyn Transcriber>,
}

impl Listener {
    pub fn new(
        source: Box<dyn AudioSource>,
        gate: QualityGate,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        Self {
            source,
            gate,
            transcriber,
        }
    }
}

#[async_trait]
impl UtteranceSource for Listener {
    async fn next_utterance(&mut self, timeout: Duration) -> Result<Option<String>, RivalError> {
        let Some(segment) = self.source.next_segment(timeout).await? else {
            return Ok(None);
        };
        match self.gate.check(&segment) {
            GateVerdict::Accepted => {}
            verdict => {
                debug!(
                    ?verdict,
                    duration_ms = segment.duration().as_millis() as u64,
                    rms = segment.rms(),
                    "clip rejected by quality gate"
                );
                return Ok(None);
            }
        }
        let text = self.transcriber.transcribe(&segment).await?;
        Ok((!text.is_empty()).then_some(text))
    }
}

/// Reads one utterance per line from any async reader (stdin by default).
pub struct ConsoleInput<R> {
    lines: Lines<BufReader<R>>,
}

impl ConsoleInput<tokio::io::Stdin> {
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }
}

impl<R: AsyncRead + Unpin + Send> ConsoleInput<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> UtteranceSource for ConsoleInput<R> {
    async fn next_utterance(&mut self, timeout: Duration) -> Result<Option<String>, RivalError> {
        match tokio::time::timeout(timeout, self.lines.next_line()).await {
            Err(_) => Ok(None),
            Ok(Ok(Some(line))) => {
                let line = line.trim();
                Ok((!line.is_empty()).then(|| line.to_string()))
            }
            Ok(Ok(None)) => Err(RivalError::Channel("console input closed".into())),
            Ok(Err(e)) => Err(RivalError::Channel(format!("console input: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{AudioSegment, SAMPLE_RATE};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted(VecDeque<AudioSegment>);

    #[async_trait]
    impl AudioSource for Scripted {
        async fn next_segment(
            &mut self,
            _timeout: Duration,
        ) -> Result<Option<AudioSegment>, RivalError> {
            Ok(self.0.pop_front())
        }
    }

    #[derive(Default)]
    struct CountingTranscriber {
        calls: AtomicUsize,
        reply: String,
    }

    #[async_trait]
    impl Transcriber for CountingTranscriber {
        async fn transcribe(&self, _segment: &AudioSegment) -> Result<String, RivalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.reply.clone())
        }
    }

    fn clip(secs: f32, amp: f32) -> AudioSegment {
        AudioSegment::new(vec![amp; (secs * SAMPLE_RATE as f32) as usize], SAMPLE_RATE)
    }

    #[tokio::test]
    async fn quiet_short_clip_never_reaches_transcriber() {
        let stt = Arc::new(CountingTranscriber {
            reply: "hello".into(),
            ..Default::default()
        });
        let mut listener = Listener::new(
            Box::new(Scripted(VecDeque::from([clip(0.1, 0.001)]))),
            QualityGate::default(),
            stt.clone(),
        );
        let heard = listener.next_utterance(Duration::from_secs(1)).await.unwrap();
        assert!(heard.is_none());
        assert_eq!(stt.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn accepted_clip_is_transcribed() {
        let stt = Arc::new(CountingTranscriber {
            reply: "yes".into(),
            ..Default::default()
        });
        let mut listener = Listener::new(
            Box::new(Scripted(VecDeque::from([clip(1.0, 0.2)]))),
            QualityGate::default(),
            stt.clone(),
        );
        let heard = listener.next_utterance(Duration::from_secs(1)).await.unwrap();
        assert_eq!(heard.as_deref(), Some("yes"));
        assert_eq!(stt.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_transcript_is_discarded() {
        let stt = Arc::new(CountingTranscriber::default());
        let mut listener = Listener::new(
            Box::new(Scripted(VecDeque::from([clip(1.0, 0.2)]))),
            QualityGate::default(),
            stt,
        );
        assert!(listener.next_utterance(Duration::from_secs(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn console_reads_lines_then_closes() {
        let mut input = ConsoleInput::new(&b"  rematch?  \n\nyes\n"[..]);
        let t = Duration::from_secs(1);
        assert_eq!(input.next_utterance(t).await.unwrap().as_deref(), Some("rematch?"));
        assert_eq!(input.next_utterance(t).await.unwrap(), None);
        assert_eq!(input.next_utterance(t).await.unwrap().as_deref(), Some("yes"));
        assert!(matches!(
            input.next_utterance(t).await,
            Err(RivalError::Channel(_))
        ));
    }
}
