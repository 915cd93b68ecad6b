//! Input device enumeration.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;
use thiserror::Error;

/// The audio backend could not enumerate input devices.
#[derive(Debug, Error)]
pub enum DeviceQueryError {
    #[error("failed to enumerate input devices: {0}")]
    Backend(#[from] cpal::DevicesError),
}

/// An input device as reported to the host.
#[derive(Debug, Clone, Serialize)]
pub struct InputDevice {
    pub name: String,
    pub channels: u16,
}

/// List the input devices that can actually capture audio.
///
/// Devices whose name or input config cannot be read are skipped, so every
/// returned entry has at least one input channel.
pub fn list_input_devices() -> Result<Vec<InputDevice>, DeviceQueryError> {
    let host = cpal::default_host();
    let found = host.input_devices()?.filter_map(|dev| {
        let name = dev.name().ok()?;
        let channels = dev.default_input_config().ok()?.channels();
        Some((name, channels))
    });
    Ok(collect_capturable(found))
}

/// Keep only devices with at least one input channel.
fn collect_capturable(devices: impl Iterator<Item = (String, u16)>) -> Vec<InputDevice> {
    devices
        .filter(|(_, channels)| *channels > 0)
        .map(|(name, channels)| InputDevice { name, channels })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_channel_devices_are_filtered() {
        let raw = vec![
            ("Internal Microphone".to_string(), 1u16),
            ("HDMI Output".to_string(), 0u16),
            ("USB Interface".to_string(), 2u16),
        ];
        let devices = collect_capturable(raw.into_iter());
        assert_eq!(devices.len(), 2);
        assert!(devices.iter().all(|d| d.channels > 0));
        assert_eq!(devices[0].name, "Internal Microphone");
        assert_eq!(devices[1].name, "USB Interface");
    }
}
