use crate::models::audio_frame::{AudioFrame, BackendKind};
use crate::models::error::CaptureError;
use crate::processing::synthetic::SyntheticSignalGenerator;
use crate::traits::capture_backend::{CaptureBackend, CaptureTarget, FrameFeed, FrameSource};

impl FrameSource for SyntheticSignalGenerator {
    fn next_frame(&mut self) -> AudioFrame {
        self.next_chunk()
    }
}

/// Last-resort backend: always opens and feeds generated audio.
///
/// The writer thread pulls one chunk per idle poll, so no producer thread exists.
#[derive(Debug, Default)]
pub struct SyntheticBackend {
    opened: bool,
}

impl SyntheticBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureBackend for SyntheticBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Synthetic
    }

    fn open(&mut self, target: &CaptureTarget) -> Result<FrameFeed, CaptureError> {
        log::warn!(
            "no real audio source engaged, generating synthetic audio at {} Hz",
            target.sample_rate
        );
        self.opened = true;
        Ok(FrameFeed::Pulled(Box::new(SyntheticSignalGenerator::new(
            target.sample_rate,
            target.channels,
        ))))
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        self.opened = false;
        Ok(())
    }
}
