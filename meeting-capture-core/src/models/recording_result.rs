use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::audio_frame::BackendKind;

/// Result returned when a capture session stops.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingResult {
    pub file_path: PathBuf,
    pub backend: BackendKind,
    /// Samples written by this process (0 when an external tool wrote the file).
    pub samples_written: u64,
    /// Size of the PCM payload in bytes, as recorded in the header.
    pub data_size: u64,
    pub duration_secs: f64,
    /// SHA-256 of the finished file; empty if the file could not be read back.
    pub checksum: String,
    /// The header could not be patched; the PCM data is intact but the sizes are stale.
    pub degraded: bool,
    pub metadata: RecordingMetadata,
}

/// Metadata stored alongside a recording.
///
/// Serializable for the JSON sidecar handed back to the bot host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    pub id: String,
    pub session_id: Option<String>,
    pub file_path: String,
    pub backend: BackendKind,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_secs: f64,
    pub checksum: String,
    pub degraded: bool,
    pub created_at: String,
}

impl RecordingMetadata {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: Option<String>,
        file_path: &str,
        backend: BackendKind,
        sample_rate: u32,
        channels: u16,
        duration_secs: f64,
        checksum: &str,
        degraded: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id,
            file_path: file_path.to_string(),
            backend,
            sample_rate,
            channels,
            duration_secs,
            checksum: checksum.to_string(),
            degraded,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
