use std::path::Path;

use crate::models::audio_frame::BackendKind;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::{Heartbeat, SessionState};

/// Event observer for capture session notifications.
///
/// Called from the thread driving the session (`start`, `stop`, `heartbeat`),
/// never from capture or writer threads.
pub trait SessionObserver: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: &SessionState);

    /// Called once a backend has opened and recording has begun.
    fn on_backend_selected(&self, _backend: BackendKind, _output: &Path) {}

    /// Called on every `heartbeat()` while recording.
    fn on_heartbeat(&self, heartbeat: &Heartbeat);

    /// Called when a runtime failure or finalize error occurs.
    fn on_error(&self, error: &CaptureError);

    /// Called when the recording is finalized.
    fn on_recording_finished(&self, result: &RecordingResult);
}
