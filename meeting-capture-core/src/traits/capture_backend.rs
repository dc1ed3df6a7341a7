use std::fmt;
use std::path::PathBuf;

use crate::models::audio_frame::{AudioFrame, BackendKind};
use crate::models::error::CaptureError;
use crate::processing::frame_queue::FrameSink;
use crate::session::event::EventSender;

/// Everything a backend needs when it is opened by the session.
#[derive(Debug, Clone)]
pub struct CaptureTarget {
    /// Where pushed frames go.
    pub sink: FrameSink,
    /// Channel for failures detected on threads the backend owns.
    pub events: EventSender,
    /// Recording path; only backends that write their own output use it.
    pub output_path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
}

/// How audio from an opened backend reaches the output file.
pub enum FrameFeed {
    /// The backend pushes frames into the sink from a context it controls.
    Pushed,
    /// The writer thread pulls a chunk whenever the queue is idle for one poll period.
    Pulled(Box<dyn FrameSource>),
    /// The backend writes the output file itself; queue and muxer are not used.
    External,
}

impl FrameFeed {
    pub fn is_external(&self) -> bool {
        matches!(self, Self::External)
    }
}

impl fmt::Debug for FrameFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pushed => f.write_str("Pushed"),
            Self::Pulled(_) => f.write_str("Pulled(..)"),
            Self::External => f.write_str("External"),
        }
    }
}

/// Source the writer thread pulls filler audio from.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> AudioFrame;
}

/// A concrete source of meeting audio.
///
/// Implemented by:
/// - `SdkCallbackBackend`: frames pushed from the audio subsystem's callback thread
/// - `DeviceCaptureBackend`: frames pushed from a blocking device read loop
/// - `ExternalProcessBackend`: a supervised tool writes the file itself
/// - `SyntheticBackend`: generated audio pulled by the writer thread
pub trait CaptureBackend: Send {
    fn kind(&self) -> BackendKind;

    /// Human-readable name used in logs and errors.
    fn name(&self) -> String {
        self.kind().to_string()
    }

    /// Cheap check made while the priority list is built.
    fn is_available(&self) -> bool {
        true
    }

    /// Start producing audio for `target`.
    fn open(&mut self, target: &CaptureTarget) -> Result<FrameFeed, CaptureError>;

    /// Non-blocking liveness check, polled by the session's heartbeat.
    fn check_alive(&mut self) -> Result<(), CaptureError> {
        Ok(())
    }

    /// For backends that write their own output: whether audio has reached it.
    fn has_committed_output(&self) -> bool {
        false
    }

    /// Stop producing audio and release resources. Must be safe to call twice.
    fn close(&mut self) -> Result<(), CaptureError>;
}
