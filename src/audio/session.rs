//! Microphone capture session.
//!
//! Opens the selected (or default) input device, queues incoming frames
//! while the recording flag is set, and on stop drains the queue into one
//! contiguous peak-normalized buffer. Multi-channel input is downmixed to
//! mono and resampled to 16 kHz inside the callback, so the queue always
//! holds pipeline-rate samples regardless of hardware.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::queue::{capture_queue, CaptureConsumer, CaptureProducer};
use super::state::RecordingFlag;

/// Fixed pipeline sample rate. Whisper expects 16 kHz mono input.
pub const SAMPLE_RATE: u32 = 16_000;

/// Capture-layer failures. Fatal to the current session, never to the
/// process; a new `start` must succeed after any of these.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("a recording session is already active")]
    AlreadyRecording,
    #[error("input device not found: {0}")]
    DeviceNotFound(String),
    #[error("no default input device available")]
    NoDefaultDevice,
    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),
    #[error("failed to read input device config: {0}")]
    DeviceConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("failed to open input stream: {0}")]
    StreamBuild(#[from] cpal::BuildStreamError),
    #[error("failed to start input stream: {0}")]
    StreamStart(#[from] cpal::PlayStreamError),
    #[error("input stream failed: {0}")]
    StreamFailed(String),
}

/// Resolved info about the input device we will capture from.
struct ResolvedInput {
    device: cpal::Device,
    stream_config: StreamConfig,
    native_rate: u32,
    channels: u16,
}

/// Find and configure the input device. `None` selects the system default.
fn resolve_device(device_name: Option<&str>) -> Result<ResolvedInput, CaptureError> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.input_devices()?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceNotFound(name.to_string()))?
    } else {
        host.default_input_device()
            .ok_or(CaptureError::NoDefaultDevice)?
    };

    let dev_name = device.name().unwrap_or_else(|_| "unknown".into());

    // Capture at the device's native config and convert in the callback.
    let default_config = device.default_input_config()?;
    let native_rate = default_config.sample_rate().0;
    let channels = default_config.channels();

    let stream_config = StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(native_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    info!(
        device = %dev_name,
        native_rate,
        channels,
        "Selected input device (will convert to {}Hz mono if needed)",
        SAMPLE_RATE,
    );

    Ok(ResolvedInput {
        device,
        stream_config,
        native_rate,
        channels,
    })
}

/// Simple linear resampler from `from_rate` to `to_rate`.
/// Operates on mono f32 samples.
fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate {
        return input.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((input.len() as f64) / ratio).floor() as usize;
    let mut output = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_idx = i as f64 * ratio;
        let idx0 = src_idx.floor() as usize;
        let frac = (src_idx - idx0 as f64) as f32;
        let s0 = input.get(idx0).copied().unwrap_or(0.0);
        let s1 = input.get(idx0 + 1).copied().unwrap_or(s0);
        output.push(s0 + frac * (s1 - s0));
    }
    output
}

/// Down-mix multi-channel audio to mono by averaging channels.
fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    let ch = channels as usize;
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / ch as f32)
        .collect()
}

/// Build the input stream. The frame callback converts and enqueues only;
/// it takes no locks and must never block or panic.
fn build_stream(
    input: &ResolvedInput,
    mut producer: CaptureProducer,
    flag: Arc<RecordingFlag>,
    failure_tx: mpsc::UnboundedSender<CaptureError>,
) -> Result<Stream, CaptureError> {
    let native_rate = input.native_rate;
    let channels = input.channels;
    let needs_resample = native_rate != SAMPLE_RATE;
    let needs_downmix = channels > 1;
    let error_flag = Arc::clone(&flag);

    let stream = input.device.build_input_stream(
        &input.stream_config,
        move |data: &[f32], _info: &cpal::InputCallbackInfo| {
            // Frames delivered after the flag flips to false are discarded.
            if !flag.is_set() {
                return;
            }
            let mono = if needs_downmix {
                to_mono(data, channels)
            } else {
                data.to_vec()
            };
            let frame = if needs_resample {
                resample_linear(&mono, native_rate, SAMPLE_RATE)
            } else {
                mono
            };
            producer.push_frame(&frame);
        },
        move |err| {
            // Device gone or backend failure: stop queueing immediately and
            // tell the control loop so the session is torn down instead of
            // hanging.
            error!("Input stream failed: {err}");
            error_flag.end();
            let _ = failure_tx.send(CaptureError::StreamFailed(err.to_string()));
        },
        None,
    )?;

    Ok(stream)
}

/// Peak-normalize a drained capture into [-1, 1].
///
/// Returns `None` for an empty capture or pure digital silence; a zero peak
/// short-circuits before the division.
fn normalize_peak(mut samples: Vec<f32>) -> Option<Vec<f32>> {
    if samples.is_empty() {
        return None;
    }
    let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    if peak == 0.0 {
        return None;
    }
    for s in &mut samples {
        *s /= peak;
    }
    Some(samples)
}

/// Stream and queue of the in-flight recording.
struct ActiveCapture {
    stream: Stream,
    consumer: CaptureConsumer,
}

/// One microphone capture session at a time.
///
/// The cpal `Stream` stays alive inside the session and is halted and
/// dropped on stop, before the queue is drained, so at most one in-flight
/// frame can race the flag flip.
pub struct CaptureSession {
    flag: Arc<RecordingFlag>,
    active: Option<ActiveCapture>,
    failure_tx: mpsc::UnboundedSender<CaptureError>,
}

impl CaptureSession {
    /// `failure_tx` receives mid-recording stream failures (e.g. the device
    /// disconnecting) so the control loop can surface them.
    pub fn new(failure_tx: mpsc::UnboundedSender<CaptureError>) -> Self {
        Self {
            flag: RecordingFlag::new(),
            active: None,
            failure_tx,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Open the input stream and begin queueing frames into a fresh queue.
    ///
    /// On any failure the recording flag is left (or forced back) unset and
    /// the session stays idle.
    pub fn start(&mut self, device_name: Option<&str>) -> Result<(), CaptureError> {
        if self.active.is_some() || !self.flag.begin() {
            return Err(CaptureError::AlreadyRecording);
        }

        let result = (|| -> Result<ActiveCapture, CaptureError> {
            let input = resolve_device(device_name)?;
            let (producer, consumer) = capture_queue(None);
            let stream = build_stream(
                &input,
                producer,
                Arc::clone(&self.flag),
                self.failure_tx.clone(),
            )?;
            stream.play()?;
            Ok(ActiveCapture { stream, consumer })
        })();

        match result {
            Ok(active) => {
                self.active = Some(active);
                info!("Recording started");
                Ok(())
            }
            Err(e) => {
                self.flag.end();
                Err(e)
            }
        }
    }

    /// Stop recording and return the normalized buffer.
    ///
    /// Returns `None` when there is no active session, no frames were
    /// captured, or the capture was pure silence. Always leaves the session
    /// idle and ready for a new `start`.
    pub fn stop(&mut self) -> Option<Vec<f32>> {
        self.flag.end();
        let ActiveCapture {
            stream,
            mut consumer,
        } = self.active.take()?;

        // Halt the stream before draining; bounds the race at the stop
        // boundary to at most one in-flight frame.
        if let Err(e) = stream.pause() {
            warn!("Failed to pause input stream: {e}");
        }
        drop(stream);

        let dropped = consumer.dropped();
        if dropped > 0 {
            warn!(dropped, "Capture queue overflowed; recording was truncated");
        }

        let samples = consumer.drain_all();
        info!(samples = samples.len(), "Recording stopped");
        normalize_peak(samples)
    }

    /// Tear down after a stream failure. Queued audio is discarded.
    pub fn abort(&mut self) {
        self.flag.end();
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_scales_peak_to_one() {
        // Three 512-sample frames, as delivered by the callback.
        let mut samples = vec![0.1f32; 512];
        samples.extend(vec![-0.5f32; 512]);
        samples.extend(vec![0.25f32; 512]);

        let normalized = normalize_peak(samples).expect("non-silent capture");
        assert_eq!(normalized.len(), 1536);

        let peak = normalized.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert_eq!(peak, 1.0);
        assert_eq!(normalized[512], -1.0);
        assert_eq!(normalized[0], 0.1 / 0.5);
    }

    #[test]
    fn test_normalize_empty_capture_is_none() {
        assert!(normalize_peak(Vec::new()).is_none());
    }

    #[test]
    fn test_normalize_silence_short_circuits() {
        // An all-zero frame must yield None, not a division by zero.
        let silent = vec![0.0f32; 512];
        assert!(normalize_peak(silent).is_none());
    }

    #[test]
    fn test_stop_without_start_returns_none() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = CaptureSession::new(tx);
        assert!(session.stop().is_none());
        assert!(!session.is_recording());
    }

    #[test]
    fn test_failed_start_leaves_session_idle() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = CaptureSession::new(tx);
        // No such device regardless of host; enumeration failure is also an
        // error on hosts with no audio backend at all.
        assert!(session.start(Some("definitely-not-a-device")).is_err());
        assert!(!session.is_recording());
        assert!(session.stop().is_none());
        // Session must remain usable: the flag was released.
        assert!(session.start(Some("definitely-not-a-device")).is_err());
    }

    #[test]
    fn test_queued_frames_drain_into_normalized_buffer() {
        // start -> deliver 3 frames of 512 samples -> stop.
        let (mut producer, mut consumer) = capture_queue(None);
        producer.push_frame(&vec![0.2f32; 512]);
        producer.push_frame(&vec![-0.4f32; 512]);
        producer.push_frame(&vec![0.1f32; 512]);

        let buffer = normalize_peak(consumer.drain_all()).unwrap();
        assert_eq!(buffer.len(), 1536);
        let peak = buffer.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert_eq!(peak, 1.0);
    }

    #[test]
    fn test_to_mono_averages_channels() {
        let interleaved = [1.0f32, 3.0, -1.0, 1.0];
        assert_eq!(to_mono(&interleaved, 2), vec![2.0, 0.0]);
        assert_eq!(to_mono(&interleaved, 1), interleaved.to_vec());
    }

    #[test]
    fn test_resample_identity_and_downsample() {
        let input = [0.0f32, 1.0, 2.0, 3.0];
        assert_eq!(resample_linear(&input, 16_000, 16_000), input.to_vec());
        let half = resample_linear(&input, 32_000, 16_000);
        assert_eq!(half.len(), 2);
        assert_eq!(half[0], 0.0);
        assert_eq!(half[1], 2.0);
    }
}
