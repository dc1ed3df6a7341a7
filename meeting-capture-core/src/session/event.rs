use std::sync::mpsc;

use crate::models::audio_frame::BackendKind;
use crate::models::error::CaptureError;

/// Notifications sent to the session from threads it does not drive.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A producer thread gave up (e.g. the device stopped delivering audio).
    BackendFailed { backend: BackendKind, error: CaptureError },
    /// The writer hit the sample budget and stopped accepting audio.
    MaxDurationReached { samples_written: u64 },
    /// A write to the output file failed; the writer thread has exited.
    WriterFailed(CaptureError),
}

pub type EventSender = mpsc::Sender<SessionEvent>;
pub type EventReceiver = mpsc::Receiver<SessionEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::channel()
}

/// Send an event, ignoring a session that has already gone away.
pub fn notify(events: &EventSender, event: SessionEvent) {
    if let Err(mpsc::SendError(event)) = events.send(event) {
        log::debug!("session gone, dropped event {:?}", event);
    }
}
