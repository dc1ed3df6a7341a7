//! # meeting-capture-core
//!
//! Platform-agnostic meeting audio capture library.
//!
//! A `CaptureSession` tries a prioritized list of backends (meeting SDK callback,
//! capture device, external recording tool, synthetic signal) and records the first
//! one that opens into a 16-bit PCM WAV file. Device access lives in platform crates
//! (`meeting-capture-alsa`) that implement the `DeviceOpener` trait.
//!
//! ## Architecture
//!
//! ```text
//! meeting-capture-core (this crate)
//! ├── traits/       ← CaptureBackend, AudioSubsystem, DeviceOpener, SessionObserver
//! ├── backends/     ← SDK callback, device, external process, synthetic
//! ├── models/       ← CaptureError, SessionState, CaptureConfiguration, AudioFrame, etc.
//! ├── processing/   ← FrameQueue, SyntheticSignalGenerator, WAV header layout
//! ├── supervisor/   ← CaptureToolCommand, ProcessSupervisor
//! ├── session/      ← CaptureSession (orchestrator), session events
//! ├── storage/      ← WavMuxer, metadata sidecar
//! └── status        ← status-line protocol for the bot host
//! ```

pub mod backends;
pub mod models;
pub mod processing;
pub mod session;
pub mod status;
pub mod storage;
pub mod supervisor;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use backends::device::DeviceCaptureBackend;
pub use backends::external_process::ExternalProcessBackend;
pub use backends::sdk_callback::{SdkCallbackBackend, SimulatedAudioSubsystem};
pub use backends::synthetic::SyntheticBackend;
pub use models::audio_frame::{AudioFrame, BackendDescriptor, BackendKind};
pub use models::config::CaptureConfiguration;
pub use models::error::{CaptureError, DeviceReadError};
pub use models::recording_result::{RecordingMetadata, RecordingResult};
pub use models::state::{Heartbeat, SessionState};
pub use processing::frame_queue::{FrameQueue, FrameSink, Pop};
pub use processing::synthetic::SyntheticSignalGenerator;
pub use session::capture_session::CaptureSession;
pub use session::event::SessionEvent;
pub use status::{StatusLine, StatusLineObserver};
pub use storage::wav_muxer::{FinalizedWav, WavMuxer};
pub use supervisor::command::{CaptureTool, CaptureToolCommand};
pub use supervisor::process_supervisor::ProcessSupervisor;
pub use traits::audio_subsystem::{AudioSubsystem, RawAudioCallback};
pub use traits::capture_backend::{CaptureBackend, CaptureTarget, FrameFeed, FrameSource};
pub use traits::capture_device::{CaptureDevice, DeviceOpener};
pub use traits::session_observer::SessionObserver;
