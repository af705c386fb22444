//! Default-input-device capture via `cpal` (feature `microphone`).
//!
//! The `cpal` stream is not `Send`, so it lives on a dedicated thread for
//! its whole life.  The input callback downmixes to mono, resamples to
//! [`SAMPLE_RATE`] and pushes each chunk onto an unbounded channel that a
//! [`ChannelAudioSource`] consumes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use rival_types::RivalError;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::segment::{SAMPLE_RATE, SegmenterConfig};
use crate::source::ChannelAudioSource;

/// Keeps the capture thread alive; stops it on drop.
pub struct MicrophoneCapture {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneCapture {
    /// Start capturing from the default input device.
    ///
    /// Returns the capture guard together with a segmenting source fed by it.
    pub fn start(config: SegmenterConfig) -> Result<(Self, ChannelAudioSource), RivalError> {
        let (chunk_tx, chunk_rx) = mpsc::unbounded_channel::<Vec<f32>>();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<Result<String, RivalError>>();
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let thread = std::thread::Builder::new()
            .name("rival-microphone".into())
            .spawn(move || {
                let stream = match open_default_input(chunk_tx) {
                    Ok((stream, name)) => {
                        let _ = ready_tx.send(Ok(name));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                while !thread_stop.load(Ordering::Relaxed) {
                    std::thread::park_timeout(Duration::from_millis(200));
                }
                drop(stream);
            })
            .map_err(|e| RivalError::Audio(format!("spawning capture thread: {e}")))?;

        let device = ready_rx
            .recv()
            .map_err(|_| RivalError::Audio("capture thread exited during setup".into()))??;
        info!(device = %device, sample_rate = SAMPLE_RATE, "microphone capture started");

        Ok((
            Self {
                stop,
                thread: Some(thread),
            },
            ChannelAudioSource::new(chunk_rx, config, SAMPLE_RATE),
        ))
    }
}

impl Drop for MicrophoneCapture {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}

fn open_default_input(
    tx: mpsc::UnboundedSender<Vec<f32>>,
) -> Result<(Stream, String), RivalError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| RivalError::Audio("no default input device".into()))?;
    let name = device.name().unwrap_or_else(|_| "default input".to_string());
    let config = device
        .default_input_config()
        .map_err(|e| RivalError::Audio(format!("input config: {e}")))?;
    let from_rate = config.sample_rate().0;
    let channels = config.channels() as usize;
    let stream_config: StreamConfig = config.clone().into();
    let on_error = |err: cpal::StreamError| warn!(error = %err, "microphone stream error");

    let stream = match config.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let _ = tx.send(to_mono_16k(data, channels, from_rate));
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let floats: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                let _ = tx.send(to_mono_16k(&floats, channels, from_rate));
            },
            on_error,
            None,
        ),
        other => {
            return Err(RivalError::Audio(format!(
                "unsupported sample format {other:?} (need F32 or I16)"
            )));
        }
    }
    .map_err(|e| RivalError::Audio(format!("building input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| RivalError::Audio(format!("starting input stream: {e}")))?;
    Ok((stream, name))
}

/// Downmix interleaved frames to mono and resample by nearest index.
fn to_mono_16k(samples: &[f32], channels: usize, from_rate: u32) -> Vec<f32> {
    if channels == 0 || samples.is_empty() || from_rate == 0 {
        return Vec::new();
    }
    let mono: Vec<f32> = if channels == 1 {
        samples.to_vec()
    } else {
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };
    if from_rate == SAMPLE_RATE {
        return mono;
    }
    let out_len = (mono.len() as u64 * SAMPLE_RATE as u64 / from_rate as u64) as usize;
    (0..out_len)
        .map(|i| (i as u64 * from_rate as u64 / SAMPLE_RATE as u64) as usize)
        .filter_map(|src| mono.get(src).copied())
        .collect()
}
