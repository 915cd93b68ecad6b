//! IPC protocol types for communication with the host UI.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (core -> host).
//! Commands use `{"command": "<name>", ...}` format (host -> core).

pub mod bridge;

use serde::{Deserialize, Serialize};

use crate::audio::InputDevice;

// ---------------------------------------------------------------------------
// Events: core -> host (stdout)
// ---------------------------------------------------------------------------

/// All events emitted to the host via stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum HostEvent {
    Starting {},
    Loading { step: String },
    Ready {},
    AudioDevices { input: Vec<InputDevice> },
    RecordingStart {},
    RecordingStop {},
    Transcription { text: String },
    Error { message: String },
    Pong {},
    Stopping {},
}

// ---------------------------------------------------------------------------
// Commands: host -> core (stdin)
// ---------------------------------------------------------------------------

/// All commands received from the host via stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum HostCommand {
    ListAudioDevices {},
    StartRecording {
        /// Overrides the configured input device for this session.
        #[serde(default)]
        device: Option<String>,
    },
    StopRecording {},
    Ping {},
    Stop {},
}
