//! Local whisper.cpp STT via whisper-rs.
//!
//! The real implementation is gated behind `#[cfg(feature = "whisper")]`.
//! When the feature is disabled, a stub is provided that always returns an
//! error at construction.
//!
//! Includes model auto-download from HuggingFace when models are missing.

use std::path::{Path, PathBuf};

use crate::ipc::bridge::emit_event;
use crate::ipc::HostEvent;

/// Return the cached GGML model path, downloading it on first use.
///
/// The multilingual models are used (no `.en` suffix) since the language
/// hint is configurable.
pub async fn ensure_model(data_dir: &Path, size: &str) -> anyhow::Result<PathBuf> {
    let models_dir = data_dir.join("models");
    let model_path = models_dir.join(format!("ggml-{size}.bin"));

    if model_path.exists() {
        tracing::info!(path = %model_path.display(), "Whisper model already present");
        return Ok(model_path);
    }

    tokio::fs::create_dir_all(&models_dir).await?;
    let url =
        format!("https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-{size}.bin");
    download_model(&url, &model_path, size).await?;

    Ok(model_path)
}

/// Stream the model to a temp file and rename on completion, so an
/// interrupted download never leaves a corrupt model behind. Progress goes
/// out as `loading` events for the host's indicator.
async fn download_model(url: &str, dest: &Path, size: &str) -> anyhow::Result<()> {
    use futures_util::StreamExt;
    use tokio::io::AsyncWriteExt;

    tracing::info!(url, dest = %dest.display(), "Downloading whisper model");
    emit_event(&HostEvent::Loading {
        step: format!("Downloading whisper {size} model..."),
    });

    let resp = reqwest::Client::new().get(url).send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("Failed to download whisper model: HTTP {}", resp.status());
    }
    let total = resp.content_length();

    let tmp_path = dest.with_extension("bin.tmp");
    let mut file = tokio::fs::File::create(&tmp_path).await?;
    let mut stream = resp.bytes_stream();
    let mut downloaded: u64 = 0;
    let mut last_pct: u8 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        downloaded += chunk.len() as u64;

        if let Some(total) = total {
            let pct = ((downloaded as f64 / total as f64) * 100.0) as u8;
            if pct >= last_pct + 10 {
                last_pct = pct;
                emit_event(&HostEvent::Loading {
                    step: format!("Downloading whisper {size} model... {pct}%"),
                });
            }
        }
    }

    file.flush().await?;
    drop(file);
    tokio::fs::rename(&tmp_path, dest).await?;

    tracing::info!(dest = %dest.display(), "Whisper model downloaded");
    emit_event(&HostEvent::Loading {
        step: format!("Whisper {size} model ready"),
    });

    Ok(())
}

// ── whisper enabled ────────────────────────────────────────────────
#[cfg(feature = "whisper")]
mod inner {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use tracing::info;
    use whisper_rs::{
        FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, WhisperState,
    };

    use crate::stt::SttEngine;

    /// Minimum audio duration in samples at 16 kHz (0.4 s = 6400 samples).
    /// whisper.cpp misbehaves on shorter input.
    const MIN_SAMPLES: usize = 6_400;

    /// Number of threads for whisper.cpp inference.
    /// Uses half the available cores (capped 1..=8) to leave headroom for
    /// the capture callback and the control loop.
    fn inference_threads() -> i32 {
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (cores / 2).clamp(1, 8) as i32
    }

    /// The loaded context plus a lazily created, reused inference state.
    ///
    /// `WhisperState` holds an `Arc` clone of the context's inner data, so
    /// storing both together raises no lifetime issues. Reusing the state
    /// skips the large `whisper_init_state` buffer allocation on every
    /// dictation after the first.
    struct LoadedModel {
        ctx: WhisperContext,
        state: Option<WhisperState>,
    }

    // SAFETY: WhisperContext and WhisperState are safe to send between threads
    // when access is serialized via a Mutex (no interior mutability without the lock).
    unsafe impl Send for LoadedModel {}
    unsafe impl Sync for LoadedModel {}

    /// Local whisper.cpp engine. Loaded once per process and shared across
    /// all capture sessions.
    pub struct WhisperStt {
        model: Arc<Mutex<LoadedModel>>,
        language: String,
        n_threads: i32,
    }

    impl WhisperStt {
        /// Load a GGML whisper model from disk with a fixed language hint.
        pub fn new(model_path: &Path, language: &str) -> anyhow::Result<Self> {
            if !model_path.exists() {
                anyhow::bail!("Whisper model not found: {}", model_path.display());
            }
            // CPU-only inference: identical output across machines, no
            // half-precision GPU path.
            let mut ctx_params = WhisperContextParameters::default();
            ctx_params.use_gpu(false);
            let ctx = WhisperContext::new_with_params(
                model_path.to_str().unwrap_or_default(),
                ctx_params,
            )
            .map_err(|e| anyhow::anyhow!("Failed to load whisper model: {}", e))?;

            let n_threads = inference_threads();
            info!(
                model = %model_path.display(),
                language,
                threads = n_threads,
                "Whisper model loaded"
            );
            Ok(Self {
                model: Arc::new(Mutex::new(LoadedModel { ctx, state: None })),
                language: language.to_string(),
                n_threads,
            })
        }
    }

    impl SttEngine for WhisperStt {
        async fn transcribe(&self, audio: &[f32]) -> anyhow::Result<String> {
            if audio.len() < MIN_SAMPLES {
                return Ok(String::new());
            }

            let audio = audio.to_vec();
            let model = Arc::clone(&self.model);
            let language = self.language.clone();
            let n_threads = self.n_threads;

            // Run whisper inference on a blocking thread to avoid stalling
            // the tokio runtime.
            let result = tokio::task::spawn_blocking(move || -> anyhow::Result<String> {
                let mut guard = model.lock().unwrap();

                if guard.state.is_none() {
                    info!("Creating whisper state (first transcription)");
                    let state = guard
                        .ctx
                        .create_state()
                        .map_err(|e| anyhow::anyhow!("Failed to create whisper state: {}", e))?;
                    guard.state = Some(state);
                }
                let state = guard.state.as_mut().unwrap();

                let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
                params.set_language(Some(&language));
                params.set_n_threads(n_threads);
                params.set_print_special(false);
                params.set_print_progress(false);
                params.set_print_realtime(false);
                params.set_print_timestamps(false);
                params.set_no_timestamps(true);
                // Suppress non-speech tokens (reduces hallucination on silence)
                params.set_suppress_non_speech_tokens(true);

                state
                    .full(params, &audio)
                    .map_err(|e| anyhow::anyhow!("Whisper inference failed: {}", e))?;

                let num_segments = state
                    .full_n_segments()
                    .map_err(|e| anyhow::anyhow!("Failed to get segment count: {}", e))?;
                let mut segments = Vec::with_capacity(num_segments as usize);
                for i in 0..num_segments {
                    if let Ok(seg) = state.full_get_segment_text(i) {
                        segments.push(seg.trim().to_string());
                    }
                }

                Ok(segments.join(" "))
            })
            .await
            .map_err(|e| anyhow::anyhow!("Whisper task panicked: {}", e))??;

            Ok(result)
        }
    }
}

// ── whisper disabled (stub) ────────────────────────────────────────
#[cfg(not(feature = "whisper"))]
mod inner {
    use std::path::Path;

    use tracing::warn;

    use crate::stt::SttEngine;

    pub struct WhisperStt;

    impl WhisperStt {
        pub fn new(model_path: &Path, _language: &str) -> anyhow::Result<Self> {
            warn!(
                model = %model_path.display(),
                "Whisper STT requested but whisper feature is disabled"
            );
            anyhow::bail!("Local whisper STT is not available (compile with --features whisper)")
        }
    }

    impl SttEngine for WhisperStt {
        async fn transcribe(&self, _audio: &[f32]) -> anyhow::Result<String> {
            anyhow::bail!("Local whisper STT is not available (compile with --features whisper)")
        }
    }
}

pub use inner::WhisperStt;
