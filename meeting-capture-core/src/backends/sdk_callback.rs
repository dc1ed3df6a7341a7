//! Meeting SDK audio delivered through a registered callback.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::models::audio_frame::{AudioFrame, BackendKind};
use crate::models::error::CaptureError;
use crate::processing::synthetic::SyntheticSignalGenerator;
use crate::traits::audio_subsystem::{AudioSubsystem, RawAudioCallback};
use crate::traits::capture_backend::{CaptureBackend, CaptureTarget, FrameFeed};

/// Forwards every SDK callback invocation into the frame queue.
///
/// The buffer handed to the callback is borrowed for the duration of the call,
/// so each invocation is copied into one owned `AudioFrame` before it is queued.
pub struct SdkCallbackBackend {
    subsystem: Arc<dyn AudioSubsystem>,
    registered: bool,
    frames_delivered: Arc<AtomicU64>,
}

impl SdkCallbackBackend {
    pub fn new(subsystem: Arc<dyn AudioSubsystem>) -> Self {
        Self {
            subsystem,
            registered: false,
            frames_delivered: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Frames accepted by the queue since the backend was created.
    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::Relaxed)
    }
}

impl CaptureBackend for SdkCallbackBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::SdkCallback
    }

    fn name(&self) -> String {
        format!("{} ({})", self.kind(), self.subsystem.name())
    }

    fn is_available(&self) -> bool {
        self.subsystem.is_available()
    }

    fn open(&mut self, target: &CaptureTarget) -> Result<FrameFeed, CaptureError> {
        if self.registered {
            return Err(CaptureError::InvalidState("sdk callback already registered".into()));
        }

        let sink = target.sink.clone();
        let delivered = Arc::clone(&self.frames_delivered);
        let opened_at = Instant::now();

        let callback: RawAudioCallback = Arc::new(move |data: &[u8], sample_rate: u32, channels: u16| {
            let frame = AudioFrame::from_le_bytes(data, sample_rate, channels, opened_at.elapsed().as_millis() as u64);
            if frame.is_empty() {
                return;
            }
            if sink.push(frame) {
                delivered.fetch_add(1, Ordering::Relaxed);
            }
        });

        self.subsystem
            .register(callback)
            .map_err(|e| CaptureError::open_failure(self.name(), e.to_string()))?;
        self.registered = true;
        log::info!("registered audio callback with {}", self.subsystem.name());
        Ok(FrameFeed::Pushed)
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        if self.registered {
            self.subsystem.unregister();
            self.registered = false;
            log::info!(
                "unregistered audio callback from {} after {} frames",
                self.subsystem.name(),
                self.frames_delivered()
            );
        }
        Ok(())
    }
}

impl Drop for SdkCallbackBackend {
    fn drop(&mut self) {
        if self.registered {
            self.subsystem.unregister();
        }
    }
}

struct SimulatedStream {
    running: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

/// Audio subsystem used when the meeting SDK is not part of the build.
///
/// Invokes the registered callback from its own thread once per period with
/// generated speech-like PCM, the way the SDK delivers mixed meeting audio.
pub struct SimulatedAudioSubsystem {
    sample_rate: u32,
    channels: u16,
    period: Duration,
    available: bool,
    stream: Mutex<Option<SimulatedStream>>,
}

impl SimulatedAudioSubsystem {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            period: Duration::from_millis(100),
            available: true,
            stream: Mutex::new(None),
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// A subsystem that reports itself as not joined to a meeting.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn is_registered(&self) -> bool {
        self.stream.lock().is_some()
    }
}

impl AudioSubsystem for SimulatedAudioSubsystem {
    fn name(&self) -> &str {
        "simulated"
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn register(&self, callback: RawAudioCallback) -> Result<(), CaptureError> {
        if !self.available {
            return Err(CaptureError::InvalidState("not joined to a meeting".into()));
        }
        let mut stream = self.stream.lock();
        if stream.is_some() {
            return Err(CaptureError::InvalidState("a callback is already registered".into()));
        }

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let mut generator = SyntheticSignalGenerator::new(self.sample_rate, self.channels);
        let (sample_rate, channels, period) = (self.sample_rate, self.channels, self.period);

        let handle = thread::Builder::new()
            .name("simulated-sdk-audio".into())
            .spawn(move || {
                while thread_running.load(Ordering::SeqCst) {
                    let frame = generator.next_chunk();
                    let bytes: Vec<u8> = frame.samples().iter().flat_map(|s| s.to_le_bytes()).collect();
                    callback(&bytes, sample_rate, channels);
                    thread::park_timeout(period);
                }
            })
            .map_err(|e| CaptureError::Io(format!("failed to spawn simulated audio thread: {}", e)))?;

        *stream = Some(SimulatedStream { running, handle });
        Ok(())
    }

    fn unregister(&self) {
        let Some(stream) = self.stream.lock().take() else {
            return;
        };
        stream.running.store(false, Ordering::SeqCst);
        stream.handle.thread().unpark();
        if stream.handle.join().is_err() {
            log::error!("simulated audio thread panicked");
        }
    }
}

impl Drop for SimulatedAudioSubsystem {
    fn drop(&mut self) {
        self.unregister();
    }
}
