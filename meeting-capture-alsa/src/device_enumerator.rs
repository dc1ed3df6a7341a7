//! ALSA capture device enumeration via the device-name hints API.

use alsa::device_name::HintIter;
use alsa::Direction;

use meeting_capture_core::models::error::CaptureError;

/// A PCM endpoint that can be opened for capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlsaDeviceInfo {
    /// Name accepted by `snd_pcm_open`, e.g. `plughw:CARD=PCH,DEV=0`.
    pub name: String,
    /// First line of the ALSA description.
    pub description: String,
    pub is_default: bool,
}

/// List PCM endpoints that support capture.
///
/// Hints without a direction are bidirectional and are included.
pub fn list_capture_devices() -> Result<Vec<AlsaDeviceInfo>, CaptureError> {
    let hints = HintIter::new_str(None, "pcm")
        .map_err(|e| CaptureError::Io(format!("failed to enumerate ALSA devices: {}", e)))?;

    let devices = hints
        .filter(|hint| !matches!(hint.direction, Some(Direction::Playback)))
        .filter_map(|hint| {
            let name = hint.name?;
            if name == "null" || name.contains("surround") {
                return None;
            }
            let description = hint
                .desc
                .as_deref()
                .and_then(|d| d.lines().next())
                .unwrap_or(&name)
                .to_string();
            let is_default = is_default_name(&name);
            Some(AlsaDeviceInfo {
                name,
                description,
                is_default,
            })
        })
        .collect();
    Ok(devices)
}

fn is_default_name(name: &str) -> bool {
    name == "default" || name == "pulse" || name == "pipewire"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sound_server_names_count_as_default() {
        assert!(is_default_name("default"));
        assert!(is_default_name("pulse"));
        assert!(!is_default_name("hw:Loopback,1"));
    }

    #[test]
    fn enumeration_never_lists_null() {
        // machines without ALSA configuration report an error instead
        if let Ok(devices) = list_capture_devices() {
            assert!(devices.iter().all(|d| d.name != "null"));
        }
    }
}
