//! Speech-to-text engine interface and the transcription adapter.
//!
//! The engine is an injected dependency behind the `SttEngine` trait so
//! tests can substitute a stub; the process constructs one engine at start
//! and reuses it for every session (model load is expensive relative to a
//! single transcription).

pub mod whisper;

use tracing::error;

/// Common trait for transcription engines.
#[allow(async_fn_in_trait)]
pub trait SttEngine: Send + Sync {
    /// Transcribe 16 kHz mono f32 audio to text.
    async fn transcribe(&self, audio: &[f32]) -> anyhow::Result<String>;
}

/// Wraps an engine with the error policy the host expects: the adapter
/// always yields a string. Empty or absent buffers skip the engine
/// entirely; engine failures are logged and absorbed into `""`.
///
/// Known limitation: the host cannot distinguish "no speech" from "engine
/// failed" without a richer result type.
pub struct TranscriptionAdapter<E: SttEngine> {
    engine: E,
}

impl<E: SttEngine> TranscriptionAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self { engine }
    }

    /// Transcribe a normalized capture, trimmed of surrounding whitespace.
    pub async fn transcribe(&self, buffer: Option<Vec<f32>>) -> String {
        let samples = match buffer {
            Some(s) if !s.is_empty() => s,
            _ => return String::new(),
        };

        match self.engine.transcribe(&samples).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                error!("Transcription failed: {e:#}");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubEngine {
        calls: AtomicUsize,
        response: anyhow::Result<String>,
    }

    impl StubEngine {
        fn returning(text: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response: Ok(text.to_string()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                response: Err(anyhow::anyhow!(message.to_string())),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SttEngine for StubEngine {
        async fn transcribe(&self, _audio: &[f32]) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(anyhow::anyhow!(e.to_string())),
            }
        }
    }

    #[tokio::test]
    async fn test_none_buffer_skips_engine() {
        let adapter = TranscriptionAdapter::new(StubEngine::returning("hello"));
        assert_eq!(adapter.transcribe(None).await, "");
        assert_eq!(adapter.engine.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_buffer_skips_engine() {
        let adapter = TranscriptionAdapter::new(StubEngine::returning("hello"));
        assert_eq!(adapter.transcribe(Some(Vec::new())).await, "");
        assert_eq!(adapter.engine.calls(), 0);
    }

    #[tokio::test]
    async fn test_text_is_trimmed() {
        let adapter = TranscriptionAdapter::new(StubEngine::returning("  Guten Tag \n"));
        let text = adapter.transcribe(Some(vec![0.5f32; 1024])).await;
        assert_eq!(text, "Guten Tag");
        assert_eq!(adapter.engine.calls(), 1);
    }

    #[tokio::test]
    async fn test_engine_failure_becomes_empty_string() {
        let adapter = TranscriptionAdapter::new(StubEngine::failing("inference blew up"));
        let text = adapter.transcribe(Some(vec![0.5f32; 1024])).await;
        assert_eq!(text, "");
        assert_eq!(adapter.engine.calls(), 1);
    }
}
