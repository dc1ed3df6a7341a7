//! Line protocol reported to the meeting-bot host on stdout.
//!
//! The host process parses these prefixes to follow the recording:
//! ```text
//! AUDIO_BACKEND: device
//! AUDIO_FILE_CREATED: /recordings/meeting.wav
//! RECORDING_STARTED
//! RECORDING_HEARTBEAT
//! RECORDING_STOPPED
//! RECORDING_FAILED: backend 'device' failed while recording: unplugged
//! ```

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::models::audio_frame::BackendKind;
use crate::models::error::CaptureError;
use crate::models::recording_result::RecordingResult;
use crate::models::state::{Heartbeat, SessionState};
use crate::traits::session_observer::SessionObserver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine {
    Backend(BackendKind),
    FileCreated(PathBuf),
    Started,
    Heartbeat,
    Stopped,
    Failed(String),
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backend(kind) => write!(f, "AUDIO_BACKEND: {}", kind),
            Self::FileCreated(path) => write!(f, "AUDIO_FILE_CREATED: {}", path.display()),
            Self::Started => f.write_str("RECORDING_STARTED"),
            Self::Heartbeat => f.write_str("RECORDING_HEARTBEAT"),
            Self::Stopped => f.write_str("RECORDING_STOPPED"),
            // the host reads one line per status
            Self::Failed(reason) => write!(f, "RECORDING_FAILED: {}", reason.replace('\n', " ")),
        }
    }
}

/// `SessionObserver` that writes the status-line protocol to `W`, typically stdout.
pub struct StatusLineObserver<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> StatusLineObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn emit(&self, line: StatusLine) {
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            log::warn!("status line '{}' not delivered: {}", line, e);
        }
    }
}

impl StatusLineObserver<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> SessionObserver for StatusLineObserver<W> {
    fn on_state_changed(&self, state: &SessionState) {
        if let SessionState::Failed(error) = state {
            self.emit(StatusLine::Failed(error.to_string()));
        }
    }

    fn on_backend_selected(&self, backend: BackendKind, output: &Path) {
        self.emit(StatusLine::Backend(backend));
        self.emit(StatusLine::FileCreated(output.to_path_buf()));
        self.emit(StatusLine::Started);
    }

    fn on_heartbeat(&self, _heartbeat: &Heartbeat) {
        self.emit(StatusLine::Heartbeat);
    }

    fn on_error(&self, error: &CaptureError) {
        log::debug!("capture error reported: {}", error);
    }

    fn on_recording_finished(&self, _result: &RecordingResult) {
        self.emit(StatusLine::Stopped);
    }
}
