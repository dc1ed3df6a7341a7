use thiserror::Error;

/// Errors that can occur while selecting, running, or finalizing a capture.
///
/// Open-time failures (`BackendOpenFailure`, `Spawn`) are handled by the session by
/// moving on to the next backend; only `NoBackendAvailable` reaches the caller of
/// `start()` in that case.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("backend '{backend}' failed to open: {reason}")]
    BackendOpenFailure { backend: String, reason: String },

    #[error("backend '{backend}' failed while recording: {reason}")]
    BackendRuntimeFailure { backend: String, reason: String },

    #[error("i/o error: {0}")]
    Io(String),

    #[error("failed to spawn capture process: {0}")]
    Spawn(String),

    #[error("no capture backend available (attempted: {})", .attempted.join(", "))]
    NoBackendAvailable { attempted: Vec<String> },

    #[error("configuration failed: {0}")]
    ConfigurationFailed(String),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl CaptureError {
    pub fn open_failure(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendOpenFailure {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    pub fn runtime_failure(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::BackendRuntimeFailure {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Whether the session may move on to the next backend after this error.
    pub fn is_open_failure(&self) -> bool {
        matches!(self, Self::BackendOpenFailure { .. } | Self::Spawn(_))
    }
}

impl From<std::io::Error> for CaptureError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Error returned by a capture device's blocking read.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceReadError {
    /// Overrun or similar condition the device can usually recover from.
    #[error("transient read error: {0}")]
    Transient(String),

    #[error("device disconnected: {0}")]
    Disconnected(String),
}
