use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::audio_frame::BackendKind;
use super::error::CaptureError;
use crate::supervisor::command::CaptureTool;

/// Configuration for a capture session.
///
/// Deserializes from the camelCase JSON the bot host writes; every field has a
/// default so partial documents are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConfiguration {
    /// Output sample rate in Hz (default: 16000).
    pub sample_rate: u32,

    /// Output channel count (default: 1). Valid values: 1, 2.
    pub channels: u16,

    /// Path of the WAV file produced by the session.
    pub output_path: PathBuf,

    /// Identifier of the meeting session, copied into the metadata sidecar.
    pub session_id: Option<String>,

    /// Order in which backend kinds are tried. Kinds not listed are tried last.
    pub backend_priority: Vec<BackendKind>,

    /// Append a synthetic backend when none was registered (default: true).
    pub synthetic_fallback: bool,

    /// Capture device names tried in order by the device backend.
    pub device_candidates: Vec<String>,

    /// External capture tool used by the external-process backend.
    pub capture_tool: CaptureTool,

    /// Source name handed to the external capture tool.
    pub capture_source: String,

    /// How long a freshly spawned capture process must survive to count as opened.
    pub spawn_grace_ms: u64,

    /// Upper bound on waiting for a signaled capture process before it is killed.
    pub terminate_timeout_ms: u64,

    /// Let the capture tool write to this process's stdout/stderr instead of
    /// discarding its output (default: false).
    pub forward_tool_output: bool,

    /// Minimum spacing between heartbeats reported to the observer.
    pub heartbeat_interval_secs: u64,

    /// Writer-thread wait on an empty queue; also the synthetic chunk period.
    pub poll_interval_ms: u64,

    /// Maximum recording duration in seconds (None = unlimited).
    pub max_duration_secs: Option<f64>,

    /// Allow switching to the next backend if the active one fails before
    /// any audio was committed to the output file.
    pub escalate_before_first_sample: bool,

    /// Write `<recording>.metadata.json` next to the finished file.
    pub write_metadata_sidecar: bool,
}

impl CaptureConfiguration {
    pub fn from_json_str(json: &str) -> Result<Self, CaptureError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| CaptureError::ConfigurationFailed(format!("invalid configuration: {}", e)))?;
        config.validate().map_err(CaptureError::ConfigurationFailed)?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CaptureError> {
        let json = fs::read_to_string(path).map_err(|e| {
            CaptureError::ConfigurationFailed(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 || self.sample_rate > 192_000 {
            return Err(format!("unsupported sample rate: {}", self.sample_rate));
        }
        if ![1, 2].contains(&self.channels) {
            return Err(format!("unsupported channel count: {}", self.channels));
        }
        if self.output_path.file_name().is_none() {
            return Err(format!("output path has no file name: {}", self.output_path.display()));
        }
        if self.poll_interval_ms == 0 {
            return Err("poll interval must be positive".into());
        }
        if let Some(max) = self.max_duration_secs {
            if max.is_nan() || max <= 0.0 {
                return Err(format!("max duration must be positive: {}", max));
            }
        }
        let mut seen = HashSet::new();
        for kind in &self.backend_priority {
            if !seen.insert(kind) {
                return Err(format!("backend listed twice in priority: {}", kind));
            }
        }
        Ok(())
    }

    /// Sample budget implied by `max_duration_secs`, if any.
    pub fn max_samples(&self) -> Option<u64> {
        self.max_duration_secs
            .map(|secs| (secs * self.sample_rate as f64).round() as u64 * self.channels as u64)
    }

    /// Position of `kind` in the configured priority order.
    pub fn priority_of(&self, kind: BackendKind) -> usize {
        self.backend_priority
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(self.backend_priority.len())
    }

    pub fn spawn_grace(&self) -> Duration {
        Duration::from_millis(self.spawn_grace_ms)
    }

    pub fn terminate_timeout(&self) -> Duration {
        Duration::from_millis(self.terminate_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            output_path: PathBuf::from("recordings/recording.wav"),
            session_id: None,
            backend_priority: BackendKind::ALL.to_vec(),
            synthetic_fallback: true,
            device_candidates: vec![
                "default".into(),
                "pulse".into(),
                "hw:Loopback,1".into(),
                "plughw:0,0".into(),
            ],
            capture_tool: CaptureTool::Parecord,
            capture_source: "@DEFAULT_MONITOR@".into(),
            spawn_grace_ms: 1000,
            terminate_timeout_ms: 5000,
            forward_tool_output: false,
            heartbeat_interval_secs: 10,
            poll_interval_ms: 100,
            max_duration_secs: None,
            escalate_before_first_sample: true,
            write_metadata_sidecar: false,
        }
    }
}
