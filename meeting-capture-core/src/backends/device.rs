//! Capture from a named device endpoint with a blocking read loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::models::audio_frame::{AudioFrame, BackendKind};
use crate::models::error::{CaptureError, DeviceReadError};
use crate::processing::frame_queue::FrameSink;
use crate::session::event::{notify, EventSender, SessionEvent};
use crate::traits::capture_backend::{CaptureBackend, CaptureTarget, FrameFeed};
use crate::traits::capture_device::{CaptureDevice, DeviceOpener};

/// Tries each candidate device in order and reads 100 ms chunks from the
/// first one that opens on a dedicated `device-capture` thread.
pub struct DeviceCaptureBackend {
    opener: Arc<dyn DeviceOpener>,
    candidates: Vec<String>,
    running: Arc<AtomicBool>,
    capture_handle: Option<thread::JoinHandle<()>>,
    opened_device: Option<String>,
}

impl DeviceCaptureBackend {
    pub fn new(opener: Arc<dyn DeviceOpener>, candidates: Vec<String>) -> Self {
        Self {
            opener,
            candidates,
            running: Arc::new(AtomicBool::new(false)),
            capture_handle: None,
            opened_device: None,
        }
    }

    /// Name of the device currently being read, if any.
    pub fn opened_device(&self) -> Option<&str> {
        self.opened_device.as_deref()
    }
}

impl CaptureBackend for DeviceCaptureBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Device
    }

    fn is_available(&self) -> bool {
        !self.candidates.is_empty()
    }

    fn open(&mut self, target: &CaptureTarget) -> Result<FrameFeed, CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::InvalidState("device capture already running".into()));
        }

        let mut failures = Vec::new();
        let mut opened = None;
        for name in &self.candidates {
            match self.opener.open(name, target.sample_rate, target.channels) {
                Ok(device) => {
                    opened = Some(device);
                    break;
                }
                Err(e) => {
                    log::warn!("capture device {} unavailable: {}", name, e);
                    failures.push(format!("{}: {}", name, e));
                }
            }
        }
        let Some(device) = opened else {
            let reason = if failures.is_empty() {
                "no device candidates configured".to_string()
            } else {
                failures.join("; ")
            };
            return Err(CaptureError::open_failure(self.name(), reason));
        };

        let device_name = device.name().to_string();
        log::info!("capturing from device {}", device_name);

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let sink = target.sink.clone();
        let events = target.events.clone();
        let (sample_rate, channels) = (target.sample_rate, target.channels);

        let handle = thread::Builder::new()
            .name("device-capture".into())
            .spawn(move || {
                capture_loop(device, &sink, &events, &running, sample_rate, channels);
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                CaptureError::open_failure(BackendKind::Device.as_str(), format!("failed to spawn capture thread: {}", e))
            })?;

        self.capture_handle = Some(handle);
        self.opened_device = Some(device_name);
        Ok(FrameFeed::Pushed)
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.capture_handle.take() {
            if handle.join().is_err() {
                log::error!("device capture thread panicked");
            }
        }
        self.opened_device = None;
        Ok(())
    }
}

impl Drop for DeviceCaptureBackend {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn capture_loop(
    mut device: Box<dyn CaptureDevice>,
    sink: &FrameSink,
    events: &EventSender,
    running: &AtomicBool,
    sample_rate: u32,
    channels: u16,
) {
    let chunk = (sample_rate / 10).max(1) as usize * channels as usize;
    let mut buffer = vec![0i16; chunk];
    let mut frames_read: u64 = 0;

    while running.load(Ordering::SeqCst) {
        let read = match read_with_recovery(device.as_mut(), &mut buffer) {
            Ok(read) => read,
            Err(e) => {
                if running.load(Ordering::SeqCst) {
                    log::error!("device {} failed: {}", device.name(), e);
                    let error = CaptureError::runtime_failure(device.name(), e.to_string());
                    notify(events, SessionEvent::BackendFailed { backend: BackendKind::Device, error });
                }
                break;
            }
        };
        if read == 0 {
            continue;
        }

        let read = read.min(buffer.len());
        let timestamp_ms = frames_read * 1000 / sample_rate.max(1) as u64;
        frames_read += (read / channels.max(1) as usize) as u64;
        if !sink.push(AudioFrame::new(buffer[..read].to_vec(), sample_rate, channels, timestamp_ms)) {
            break;
        }
    }
    log::debug!("device capture loop for {} stopped", device.name());
}

/// One read; on error, one recovery and one retry.
fn read_with_recovery(device: &mut dyn CaptureDevice, buffer: &mut [i16]) -> Result<usize, DeviceReadError> {
    match device.read(buffer) {
        Ok(read) => Ok(read),
        Err(e) => {
            log::warn!("read from {} failed ({}), recovering", device.name(), e);
            device.recover()?;
            device.read(buffer)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::processing::frame_queue::{FrameQueue, Pop};
    use crate::session::event::{event_channel, EventReceiver};

    type Script = Arc<Mutex<VecDeque<Result<usize, DeviceReadError>>>>;

    /// Plays back scripted read results, then keeps returning silence.
    struct ScriptedDevice {
        name: String,
        script: Script,
        recoveries: Arc<Mutex<u32>>,
    }

    impl CaptureDevice for ScriptedDevice {
        fn name(&self) -> &str {
            &self.name
        }

        fn read(&mut self, buffer: &mut [i16]) -> Result<usize, DeviceReadError> {
            thread::sleep(Duration::from_millis(5));
            match self.script.lock().pop_front() {
                Some(Ok(n)) => {
                    buffer[..n].iter_mut().enumerate().for_each(|(i, s)| *s = i as i16);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Ok(0),
            }
        }

        fn recover(&mut self) -> Result<(), DeviceReadError> {
            *self.recoveries.lock() += 1;
            Ok(())
        }
    }

    struct ScriptedOpener {
        openable: Vec<String>,
        script: Script,
        recoveries: Arc<Mutex<u32>>,
        attempts: Mutex<Vec<String>>,
    }

    impl ScriptedOpener {
        fn new(openable: &[&str], script: Vec<Result<usize, DeviceReadError>>) -> Arc<Self> {
            Arc::new(Self {
                openable: openable.iter().map(|s| s.to_string()).collect(),
                script: Arc::new(Mutex::new(script.into())),
                recoveries: Arc::new(Mutex::new(0)),
                attempts: Mutex::new(Vec::new()),
            })
        }
    }

    impl DeviceOpener for ScriptedOpener {
        fn open(&self, name: &str, _rate: u32, _channels: u16) -> Result<Box<dyn CaptureDevice>, CaptureError> {
            self.attempts.lock().push(name.to_string());
            if !self.openable.iter().any(|n| n == name) {
                return Err(CaptureError::open_failure(name, "no such device"));
            }
            Ok(Box::new(ScriptedDevice {
                name: name.to_string(),
                script: Arc::clone(&self.script),
                recoveries: Arc::clone(&self.recoveries),
            }))
        }
    }

    fn candidates() -> Vec<String> {
        ["default", "pulse", "hw:Loopback,1"].iter().map(|s| s.to_string()).collect()
    }

    fn target(queue: &Arc<FrameQueue>) -> (CaptureTarget, EventReceiver) {
        let (events, rx) = event_channel();
        let target = CaptureTarget {
            sink: FrameSink::new(Arc::clone(queue)),
            events,
            output_path: "unused.wav".into(),
            sample_rate: 16000,
            channels: 1,
        };
        (target, rx)
    }

    #[test]
    fn first_openable_candidate_is_used() {
        let opener = ScriptedOpener::new(&["pulse", "hw:Loopback,1"], vec![Ok(1600), Ok(0), Ok(800)]);
        let queue = Arc::new(FrameQueue::new());
        let (target, _rx) = target(&queue);
        let mut backend = DeviceCaptureBackend::new(opener.clone(), candidates());

        assert!(matches!(backend.open(&target).unwrap(), FrameFeed::Pushed));
        assert_eq!(backend.opened_device(), Some("pulse"));
        assert_eq!(*opener.attempts.lock(), vec!["default", "pulse"]);

        let first = match queue.pop_timeout(Duration::from_secs(2)) {
            Pop::Frame(frame) => frame,
            other => panic!("expected frame, got {:?}", other),
        };
        let second = match queue.pop_timeout(Duration::from_secs(2)) {
            Pop::Frame(frame) => frame,
            other => panic!("expected frame, got {:?}", other),
        };
        assert_eq!(first.samples().len(), 1600);
        assert_eq!(second.samples().len(), 800);
        assert_eq!(second.timestamp_ms(), 100);

        backend.close().unwrap();
        assert_eq!(backend.opened_device(), None);
    }

    #[test]
    fn no_openable_candidate_is_open_failure() {
        let opener = ScriptedOpener::new(&[], vec![]);
        let queue = Arc::new(FrameQueue::new());
        let (target, _rx) = target(&queue);
        let mut backend = DeviceCaptureBackend::new(opener.clone(), candidates());

        let err = backend.open(&target).unwrap_err();
        assert!(err.is_open_failure());
        assert_eq!(opener.attempts.lock().len(), 3);
    }

    #[test]
    fn single_read_error_is_recovered() {
        let opener = ScriptedOpener::new(
            &["default"],
            vec![Err(DeviceReadError::Transient("overrun".into())), Ok(1600)],
        );
        let queue = Arc::new(FrameQueue::new());
        let (target, rx) = target(&queue);
        let mut backend = DeviceCaptureBackend::new(opener.clone(), candidates());
        backend.open(&target).unwrap();

        assert!(matches!(queue.pop_timeout(Duration::from_secs(2)), Pop::Frame(_)));
        assert_eq!(*opener.recoveries.lock(), 1);
        backend.close().unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn repeated_read_error_reports_backend_failure() {
        let opener = ScriptedOpener::new(
            &["default"],
            vec![
                Err(DeviceReadError::Transient("overrun".into())),
                Err(DeviceReadError::Disconnected("unplugged".into())),
            ],
        );
        let queue = Arc::new(FrameQueue::new());
        let (target, rx) = target(&queue);
        let mut backend = DeviceCaptureBackend::new(opener, candidates());
        backend.open(&target).unwrap();

        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            SessionEvent::BackendFailed { backend: kind, error } => {
                assert_eq!(kind, BackendKind::Device);
                assert!(matches!(error, CaptureError::BackendRuntimeFailure { .. }));
            }
            other => panic!("unexpected event {:?}", other),
        }
        backend.close().unwrap();
        assert!(queue.is_empty());
    }
}
