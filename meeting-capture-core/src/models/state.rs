use std::time::Duration;

use super::audio_frame::BackendKind;
use super::error::CaptureError;
use super::recording_result::RecordingResult;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → starting → recording → stopping → stopped
///            ↓                      ↓
///          failed                 failed
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Starting,
    Recording { backend: BackendKind },
    Stopping,
    Stopped(Box<RecordingResult>),
    Failed(CaptureError),
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped(_) | Self::Failed(_))
    }

    /// Whether `start()` may be called from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Stopped(_) | Self::Failed(_))
    }

    pub fn backend(&self) -> Option<BackendKind> {
        match self {
            Self::Recording { backend } => Some(*backend),
            Self::Stopped(result) => Some(result.backend),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Recording { .. } => "recording",
            Self::Stopping => "stopping",
            Self::Stopped(_) => "stopped",
            Self::Failed(_) => "failed",
        }
    }
}

/// Snapshot reported by `CaptureSession::heartbeat()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Heartbeat {
    pub state: &'static str,
    pub backend: Option<BackendKind>,
    pub samples_written: u64,
    pub elapsed: Duration,
}

impl Heartbeat {
    pub fn is_recording(&self) -> bool {
        self.state == "recording"
    }
}
