use std::fmt;

use serde::{Deserialize, Serialize};

/// One chunk of interleaved 16-bit PCM audio.
///
/// Frames are immutable once built: a backend creates one, moves it into the
/// frame queue, and the writer thread consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Vec<i16>,
    sample_rate: u32,
    channels: u16,
    timestamp_ms: u64,
}

impl AudioFrame {
    pub fn new(samples: Vec<i16>, sample_rate: u32, channels: u16, timestamp_ms: u64) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
            timestamp_ms,
        }
    }

    /// Copy a borrowed little-endian PCM buffer into an owned frame.
    ///
    /// A trailing odd byte is ignored.
    pub fn from_le_bytes(data: &[u8], sample_rate: u32, channels: u16, timestamp_ms: u64) -> Self {
        let samples = data
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::new(samples, sample_rate, channels, timestamp_ms)
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Number of sample frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of this chunk in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frame_count() as u64 * 1000 / self.sample_rate as u64
    }
}

/// The kind of audio source behind a capture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendKind {
    SdkCallback,
    Device,
    ExternalProcess,
    Synthetic,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::SdkCallback,
        BackendKind::Device,
        BackendKind::ExternalProcess,
        BackendKind::Synthetic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SdkCallback => "sdk-callback",
            Self::Device => "device",
            Self::ExternalProcess => "external-process",
            Self::Synthetic => "synthetic",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entry in the priority list built when a session starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub kind: BackendKind,
    pub name: String,
    pub priority: usize,
    pub available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_le_bytes_copies_samples() {
        let data = [0x01, 0x00, 0xFF, 0xFF, 0x00, 0x80];
        let frame = AudioFrame::from_le_bytes(&data, 16000, 1, 42);
        assert_eq!(frame.samples(), &[1, -1, i16::MIN]);
        assert_eq!(frame.timestamp_ms(), 42);
    }

    #[test]
    fn from_le_bytes_ignores_odd_byte() {
        let frame = AudioFrame::from_le_bytes(&[0x10, 0x00, 0x7F], 16000, 1, 0);
        assert_eq!(frame.samples(), &[16]);
    }

    #[test]
    fn duration_of_100ms_chunk() {
        let frame = AudioFrame::new(vec![0; 1600], 16000, 1, 0);
        assert_eq!(frame.duration_ms(), 100);

        let stereo = AudioFrame::new(vec![0; 3200], 16000, 2, 0);
        assert_eq!(stereo.frame_count(), 1600);
        assert_eq!(stereo.duration_ms(), 100);
    }

    #[test]
    fn zero_channels_clamped_to_mono() {
        let frame = AudioFrame::new(vec![0; 4], 16000, 0, 0);
        assert_eq!(frame.channels(), 1);
    }

    #[test]
    fn backend_kind_serde_names() {
        let json = serde_json::to_string(&BackendKind::ExternalProcess).unwrap();
        assert_eq!(json, "\"externalProcess\"");
        let kind: BackendKind = serde_json::from_str("\"sdkCallback\"").unwrap();
        assert_eq!(kind, BackendKind::SdkCallback);
    }
}
