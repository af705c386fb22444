//! Audio sources: anything that yields whole utterance segments.

use std::time::Duration;

use async_trait::async_trait;
use rival_types::RivalError;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use crate::segment::{AudioSegment, SegmenterConfig, UtteranceSegmenter};

/// A live stream of captured utterances.
#[async_trait]
pub trait AudioSource: Send {
    /// Wait for the next utterance.
    ///
    /// `timeout` bounds the wait for speech to *start*; once an utterance has
    /// begun it is collected until silence or the phrase limit.  Returns
    /// `Ok(None)` when nobody spoke within `timeout`.
    async fn next_segment(&mut self, timeout: Duration)
    -> Result<Option<AudioSegment>, RivalError>;
}

/// Segments mono PCM chunks arriving on a channel.
///
/// The capture side (a microphone callback, a robot audio stream, a test)
/// pushes chunks at the segment sample rate.  Capture never pauses, so audio
/// queued while the consumer was busy with the previous segment (its own
/// reply included) is dropped when it asks for the next one.
pub struct ChannelAudioSource {
    rx: mpsc::UnboundedReceiver<Vec<f32>>,
    segmenter: UtteranceSegmenter,
    /// A segment went out; whatever is queued now predates the next request.
    handed_out: bool,
}

impl ChannelAudioSource {
    pub fn new(
        rx: mpsc::UnboundedReceiver<Vec<f32>>,
        config: SegmenterConfig,
        sample_rate: u32,
    ) -> Self {
        Self {
            rx,
            segmenter: UtteranceSegmenter::new(config, sample_rate),
            handed_out: false,
        }
    }

    fn discard_backlog(&mut self) {
        let mut samples = 0usize;
        while let Ok(chunk) = self.rx.try_recv() {
            samples += chunk.len();
        }
        if samples > 0 {
            debug!(samples, "discarded audio captured while busy");
        }
    }
}

#[async_trait]
impl AudioSource for ChannelAudioSource {
    async fn next_segment(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<AudioSegment>, RivalError> {
        if std::mem::take(&mut self.handed_out) && !self.segmenter.in_speech() {
            self.discard_backlog();
        }
        let deadline = Instant::now() + timeout;
        loop {
            let chunk = if self.segmenter.in_speech() {
                self.rx.recv().await
            } else {
                match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                    Ok(chunk) => chunk,
                    Err(_) => return Ok(None),
                }
            };
            let Some(chunk) = chunk else {
                if let Some(segment) = self.segmenter.flush() {
                    self.handed_out = true;
                    return Ok(Some(segment));
                }
                return Err(RivalError::Channel("audio capture stream ended".into()));
            };
            if let Some(segment) = self.segmenter.push(&chunk) {
                self.handed_out = true;
                return Ok(Some(segment));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SAMPLE_RATE;

    fn chunk(secs: f32, amp: f32) -> Vec<f32> {
        vec![amp; (secs * SAMPLE_RATE as f32) as usize]
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_nobody_speaks() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut source = ChannelAudioSource::new(rx, SegmenterConfig::default(), SAMPLE_RATE);
        tx.send(chunk(0.5, 0.0)).unwrap();
        let got = source.next_segment(Duration::from_secs(1)).await.unwrap();
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn yields_segment_after_trailing_silence() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut source = ChannelAudioSource::new(rx, SegmenterConfig::default(), SAMPLE_RATE);
        tx.send(chunk(0.5, 0.3)).unwrap();
        tx.send(chunk(1.0, 0.0)).unwrap();
        let seg = source
            .next_segment(Duration::from_secs(1))
            .await
            .unwrap()
            .expect("segment");
        assert_eq!(seg.samples.len(), chunk(0.5, 0.3).len() + chunk(1.0, 0.0).len());
    }

    #[tokio::test(start_paused = true)]
    async fn audio_queued_while_busy_is_not_a_new_utterance() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut source = ChannelAudioSource::new(rx, SegmenterConfig::default(), SAMPLE_RATE);
        tx.send(chunk(0.5, 0.3)).unwrap();
        tx.send(chunk(1.0, 0.0)).unwrap();
        assert!(source.next_segment(Duration::from_secs(1)).await.unwrap().is_some());

        // The consumer is busy answering: three seconds of its own voice pile up.
        for _ in 0..30 {
            tx.send(chunk(0.1, 0.3)).unwrap();
        }
        tx.send(chunk(1.0, 0.0)).unwrap();
        let stale = source.next_segment(Duration::from_millis(100)).await.unwrap();
        assert!(stale.is_none());

        // Speech arriving after the request is still heard.
        tx.send(chunk(0.5, 0.3)).unwrap();
        tx.send(chunk(1.0, 0.0)).unwrap();
        let fresh = source.next_segment(Duration::from_secs(1)).await.unwrap();
        assert_eq!(
            fresh.map(|s| s.samples.len()),
            Some(chunk(0.5, 0.3).len() + chunk(1.0, 0.0).len())
        );
    }

    #[tokio::test]
    async fn closed_stream_flushes_then_errors() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut source = ChannelAudioSource::new(rx, SegmenterConfig::default(), SAMPLE_RATE);
        tx.send(chunk(0.5, 0.3)).unwrap();
        drop(tx);
        let seg = source.next_segment(Duration::from_secs(1)).await.unwrap();
        assert!(seg.is_some());
        assert!(matches!(
            source.next_segment(Duration::from_secs(1)).await,
            Err(RivalError::Channel(_))
        ));
    }
}
