//! Settings file reading.
//!
//! The host writes `settings.json` into the data directory; every field is
//! optional and a missing or malformed file falls back to defaults with a
//! logged warning, never an error.

pub mod paths;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::warn;

use paths::data_dir;

/// settings.json shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Input device name (None = system default).
    pub input_device: Option<String>,
    /// Language hint passed to the transcription engine.
    pub language: String,
    /// Whisper model size: tiny, base, small, medium, large.
    pub model_size: String,
    /// Dump each stopped recording as a WAV file for debugging.
    pub keep_last_recording: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_device: None,
            language: "de".to_string(),
            model_size: "base".to_string(),
            keep_last_recording: false,
        }
    }
}

/// Path to settings.json.
pub fn settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

/// Read settings from the data directory, falling back to defaults.
pub fn read_settings() -> Settings {
    let path = settings_path();
    match std::fs::read_to_string(&path) {
        Ok(contents) => parse_settings(&contents).unwrap_or_else(|| {
            warn!("Failed to parse {}, using defaults", path.display());
            Settings::default()
        }),
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            Settings::default()
        }
    }
}

fn parse_settings(contents: &str) -> Option<Settings> {
    serde_json::from_str(contents).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_yields_defaults() {
        let settings = parse_settings("{}").unwrap();
        assert_eq!(settings.language, "de");
        assert_eq!(settings.model_size, "base");
        assert!(settings.input_device.is_none());
        assert!(!settings.keep_last_recording);
    }

    #[test]
    fn test_partial_settings_keep_other_defaults() {
        let settings =
            parse_settings(r#"{"language": "en", "input_device": "USB Interface"}"#).unwrap();
        assert_eq!(settings.language, "en");
        assert_eq!(settings.input_device.as_deref(), Some("USB Interface"));
        assert_eq!(settings.model_size, "base");
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        assert!(parse_settings("not json at all").is_none());
    }
}
