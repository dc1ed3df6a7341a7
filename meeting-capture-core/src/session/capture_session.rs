use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::event::{event_channel, notify, EventReceiver, EventSender, SessionEvent};
use crate::backends::synthetic::SyntheticBackend;
use crate::models::audio_frame::{AudioFrame, BackendDescriptor, BackendKind};
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::recording_result::{RecordingMetadata, RecordingResult};
use crate::models::state::{Heartbeat, SessionState};
use crate::processing::frame_queue::{FrameQueue, FrameSink, Pop};
use crate::storage::metadata::write_metadata;
use crate::storage::wav_muxer::{reconcile_header, sha256_file, FinalizeError, FinalizedWav, WavMuxer};
use crate::traits::capture_backend::{CaptureBackend, CaptureTarget, FrameFeed, FrameSource};
use crate::traits::session_observer::SessionObserver;

type WriterHandle = thread::JoinHandle<Result<FinalizedWav, FinalizeError>>;

/// The backend currently producing audio and everything tied to its lifetime.
struct ActiveRecording {
    /// Position in the priority order; escalation resumes after it.
    position: usize,
    /// Index into `CaptureSession::backends`.
    index: usize,
    kind: BackendKind,
    queue: Arc<FrameQueue>,
    writer: Option<WriterHandle>,
    samples_written: Arc<AtomicU64>,
    started_at: Instant,
    /// When the observer last got a heartbeat.
    last_reported: Option<Instant>,
}

/// Why the running recording has to change course.
#[derive(Debug)]
enum Interruption {
    LimitReached,
    Backend(CaptureError),
    Writer(CaptureError),
}

/// Capture session orchestrator.
///
/// Owns the registered backends and tries them in priority order until one
/// opens. Audio from pushed or pulled feeds flows through a single writer thread:
/// ```text
/// [SDK callback / device thread] → [FrameQueue] → [capture-writer] → [WavMuxer]
///                                                      ↑
///                                      [synthetic filler on idle poll]
/// ```
/// An external tool writes its own file and bypasses both.
///
/// `heartbeat()` is the session's only periodic hook, where producer failures
/// and the duration limit are acted on. It may be called more often than
/// `heartbeat_interval_secs`; the observer hears at most one heartbeat per interval.
pub struct CaptureSession {
    config: CaptureConfiguration,
    backends: Vec<Box<dyn CaptureBackend>>,
    order: Vec<usize>,
    state: SessionState,
    observer: Option<Arc<dyn SessionObserver>>,
    events_tx: EventSender,
    events_rx: EventReceiver,
    active: Option<ActiveRecording>,
    last_result: Option<RecordingResult>,
}

impl CaptureSession {
    pub fn new(config: CaptureConfiguration) -> Self {
        let (events_tx, events_rx) = event_channel();
        Self {
            config,
            backends: Vec::new(),
            order: Vec::new(),
            state: SessionState::Idle,
            observer: None,
            events_tx,
            events_rx,
            active: None,
            last_result: None,
        }
    }

    /// Register a backend. Among backends of the same kind, earlier ones are tried first.
    pub fn add_backend(&mut self, backend: Box<dyn CaptureBackend>) {
        log::debug!("registered backend {}", backend.name());
        self.backends.push(backend);
    }

    pub fn set_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observer = Some(observer);
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state.clone()
    }

    pub fn is_recording(&self) -> bool {
        self.state.is_recording()
    }

    pub fn active_backend(&self) -> Option<BackendKind> {
        self.active.as_ref().map(|a| a.kind)
    }

    /// Samples committed to the output file by this process so far.
    pub fn samples_written(&self) -> u64 {
        match &self.active {
            Some(active) => active.samples_written.load(Ordering::Relaxed),
            None => self.last_result.as_ref().map_or(0, |r| r.samples_written),
        }
    }

    /// Registered backends in the order `start()` will try them.
    pub fn backends(&self) -> Vec<BackendDescriptor> {
        self.priority_order()
            .into_iter()
            .map(|i| {
                let backend = &self.backends[i];
                BackendDescriptor {
                    kind: backend.kind(),
                    name: backend.name(),
                    priority: self.config.priority_of(backend.kind()),
                    available: backend.is_available(),
                }
            })
            .collect()
    }

    /// Result of the most recent finalized recording, including one that ended in failure.
    pub fn last_result(&self) -> Option<&RecordingResult> {
        self.last_result.as_ref()
    }

    /// Validate the configuration and create the output directory.
    pub fn initialize(&mut self) -> Result<(), CaptureError> {
        self.config.validate().map_err(CaptureError::ConfigurationFailed)?;
        if let Some(dir) = self.config.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .map_err(|e| CaptureError::Io(format!("failed to create {}: {}", dir.display(), e)))?;
        }
        Ok(())
    }

    /// Engage the highest-priority backend that opens. Transitions: idle → starting → recording.
    pub fn start(&mut self) -> Result<BackendKind, CaptureError> {
        if !self.state.can_start() {
            return Err(CaptureError::InvalidState(format!(
                "cannot start while {}",
                self.state.name()
            )));
        }
        self.initialize()?;

        self.set_state(SessionState::Starting);
        self.discard_events();
        self.add_synthetic_fallback();
        self.order = self.priority_order();

        match self.engage(0) {
            Ok(kind) => Ok(kind),
            Err(e) => {
                log::error!("capture could not start: {}", e);
                self.report_error(&e);
                self.set_state(SessionState::Failed(e.clone()));
                Err(e)
            }
        }
    }

    /// Stop capture, drain queued audio, and finalize the file.
    /// Transitions: recording → stopping → stopped.
    ///
    /// Returns `Ok(None)` when nothing is recording.
    pub fn stop(&mut self) -> Result<Option<RecordingResult>, CaptureError> {
        if !self.state.is_recording() {
            return Ok(None);
        }
        let Some(active) = self.active.take() else {
            return Ok(None);
        };

        self.set_state(SessionState::Stopping);
        match self.finish(active) {
            Ok(result) => {
                self.last_result = Some(result.clone());
                self.set_state(SessionState::Stopped(Box::new(result.clone())));
                if let Some(ref observer) = self.observer {
                    observer.on_recording_finished(&result);
                }
                Ok(Some(result))
            }
            Err(e) => {
                self.report_error(&e);
                self.set_state(SessionState::Failed(e.clone()));
                Err(e)
            }
        }
    }

    /// Periodic liveness check. Never blocks on audio.
    pub fn heartbeat(&mut self) -> Heartbeat {
        if self.state.is_recording() {
            if let Some(interruption) = self.poll_interruption() {
                self.handle_interruption(interruption);
            }
        }

        let heartbeat = Heartbeat {
            state: self.state.name(),
            backend: self.active_backend(),
            samples_written: self.samples_written(),
            elapsed: self.active.as_ref().map_or(Duration::ZERO, |a| a.started_at.elapsed()),
        };
        if heartbeat.is_recording() && self.heartbeat_due() {
            log::debug!(
                "heartbeat: {:?} {} samples after {:?}",
                heartbeat.backend,
                heartbeat.samples_written,
                heartbeat.elapsed
            );
            if let Some(ref observer) = self.observer {
                observer.on_heartbeat(&heartbeat);
            }
        }
        heartbeat
    }

    // --- Internal helpers ---

    fn heartbeat_due(&mut self) -> bool {
        let interval = self.config.heartbeat_interval();
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let due = active.last_reported.map_or(true, |at| at.elapsed() >= interval);
        if due {
            active.last_reported = Some(Instant::now());
        }
        due
    }

    fn set_state(&mut self, new_state: SessionState) {
        log::debug!("session state {} -> {}", self.state.name(), new_state.name());
        self.state = new_state.clone();
        if let Some(ref observer) = self.observer {
            observer.on_state_changed(&new_state);
        }
    }

    fn report_error(&self, error: &CaptureError) {
        if let Some(ref observer) = self.observer {
            observer.on_error(error);
        }
    }

    fn add_synthetic_fallback(&mut self) {
        if self.config.synthetic_fallback && !self.backends.iter().any(|b| b.kind() == BackendKind::Synthetic) {
            self.add_backend(Box::new(SyntheticBackend::new()));
        }
    }

    /// Backend indices by configured priority; the sort is stable, so
    /// registration order breaks ties.
    fn priority_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.backends.len()).collect();
        order.sort_by_key(|&i| self.config.priority_of(self.backends[i].kind()));
        order
    }

    fn discard_events(&self) {
        for event in self.events_rx.try_iter() {
            log::debug!("discarding stale session event {:?}", event);
        }
    }

    /// Try backends from `from` onwards in priority order.
    fn engage(&mut self, from: usize) -> Result<BackendKind, CaptureError> {
        let mut attempted = Vec::new();

        for position in from..self.order.len() {
            let index = self.order[position];
            let queue = Arc::new(FrameQueue::new());
            let target = CaptureTarget {
                sink: FrameSink::new(Arc::clone(&queue)),
                events: self.events_tx.clone(),
                output_path: self.config.output_path.clone(),
                sample_rate: self.config.sample_rate,
                channels: self.config.channels,
            };

            let backend = &mut self.backends[index];
            let name = backend.name();
            if !backend.is_available() {
                log::info!("backend {} not available, skipping", name);
                attempted.push(name);
                continue;
            }

            log::info!("opening backend {}", name);
            let feed = match backend.open(&target) {
                Ok(feed) => feed,
                Err(e) if e.is_open_failure() => {
                    log::warn!("{}", e);
                    if let Err(close_err) = backend.close() {
                        log::debug!("cleanup after failed open of {}: {}", name, close_err);
                    }
                    attempted.push(name);
                    continue;
                }
                Err(e) => {
                    if let Err(close_err) = backend.close() {
                        log::debug!("cleanup after failed open of {}: {}", name, close_err);
                    }
                    return Err(e);
                }
            };

            let kind = backend.kind();
            self.begin_recording(position, index, kind, queue, feed)?;
            return Ok(kind);
        }

        Err(CaptureError::NoBackendAvailable { attempted })
    }

    fn begin_recording(
        &mut self,
        position: usize,
        index: usize,
        kind: BackendKind,
        queue: Arc<FrameQueue>,
        feed: FrameFeed,
    ) -> Result<(), CaptureError> {
        let samples_written = Arc::new(AtomicU64::new(0));

        let writer = match feed {
            FrameFeed::External => None,
            FrameFeed::Pushed => Some(self.spawn_writer(&queue, None, &samples_written)),
            FrameFeed::Pulled(source) => Some(self.spawn_writer(&queue, Some(source), &samples_written)),
        };
        let writer = match writer.transpose() {
            Ok(writer) => writer,
            Err(e) => {
                queue.close();
                let backend = &mut self.backends[index];
                if let Err(close_err) = backend.close() {
                    log::debug!("cleanup after failed start of {}: {}", backend.name(), close_err);
                }
                return Err(e);
            }
        };

        let backend_name = self.backends[index].name();
        log::info!(
            "recording from {} into {}",
            backend_name,
            self.config.output_path.display()
        );

        self.active = Some(ActiveRecording {
            position,
            index,
            kind,
            queue,
            writer,
            samples_written,
            started_at: Instant::now(),
            last_reported: None,
        });
        self.set_state(SessionState::Recording { backend: kind });
        if let Some(ref observer) = self.observer {
            observer.on_backend_selected(kind, &self.config.output_path);
        }
        Ok(())
    }

    fn spawn_writer(
        &self,
        queue: &Arc<FrameQueue>,
        filler: Option<Box<dyn FrameSource>>,
        samples_written: &Arc<AtomicU64>,
    ) -> Result<WriterHandle, CaptureError> {
        let muxer = WavMuxer::open_stream(&self.config.output_path, self.config.sample_rate, self.config.channels)?;
        let context = WriterContext {
            queue: Arc::clone(queue),
            muxer,
            filler,
            samples_written: Arc::clone(samples_written),
            events: self.events_tx.clone(),
            poll_interval: self.config.poll_interval(),
            max_samples: self.config.max_samples(),
        };

        thread::Builder::new()
            .name("capture-writer".into())
            .spawn(move || run_writer(context))
            .map_err(|e| CaptureError::Io(format!("failed to spawn writer thread: {}", e)))
    }

    /// Close the backend, drain the queue into the file, and build the result.
    fn finish(&mut self, mut active: ActiveRecording) -> Result<RecordingResult, CaptureError> {
        let backend = &mut self.backends[active.index];
        let name = backend.name();
        if let Err(e) = backend.close() {
            log::warn!("closing backend {} failed: {}", name, e);
        }

        active.queue.close();
        let finalized = match active.writer.take() {
            Some(handle) => match handle.join() {
                Ok(Ok(finalized)) => finalized,
                Ok(Err(e)) => {
                    log::error!("{}", e);
                    self.report_error(&e.source);
                    e.partial
                }
                Err(_) => return Err(CaptureError::Io("writer thread panicked".into())),
            },
            None => collect_external_output(&self.config.output_path)?,
        };
        active.samples_written.store(finalized.samples_written, Ordering::Relaxed);

        let result = self.build_result(active.kind, finalized);
        if self.config.write_metadata_sidecar {
            match write_metadata(&result.metadata, &result.file_path) {
                Ok(path) => log::info!("wrote recording metadata to {}", path.display()),
                Err(e) => log::warn!("recording metadata not written: {}", e),
            }
        }
        Ok(result)
    }

    fn build_result(&self, backend: BackendKind, finalized: FinalizedWav) -> RecordingResult {
        let bytes_per_second = self.config.sample_rate as f64 * self.config.channels as f64 * 2.0;
        let duration_secs = if bytes_per_second > 0.0 {
            finalized.data_size as f64 / bytes_per_second
        } else {
            0.0
        };
        let metadata = RecordingMetadata::new(
            self.config.session_id.clone(),
            &finalized.file_path.to_string_lossy(),
            backend,
            self.config.sample_rate,
            self.config.channels,
            duration_secs,
            &finalized.checksum,
            finalized.degraded,
        );
        RecordingResult {
            file_path: finalized.file_path,
            backend,
            samples_written: finalized.samples_written,
            data_size: finalized.data_size,
            duration_secs,
            checksum: finalized.checksum,
            degraded: finalized.degraded,
            metadata,
        }
    }

    /// Collect the most significant pending problem: writer failures over
    /// backend failures over the duration limit.
    fn poll_interruption(&mut self) -> Option<Interruption> {
        let mut found: Option<Interruption> = None;
        for event in self.events_rx.try_iter() {
            let next = match event {
                SessionEvent::WriterFailed(e) => Interruption::Writer(e),
                SessionEvent::BackendFailed { error, .. } => Interruption::Backend(error),
                SessionEvent::MaxDurationReached { samples_written } => {
                    log::info!("duration limit reached after {} samples", samples_written);
                    Interruption::LimitReached
                }
            };
            found = Some(match (found, next) {
                (Some(Interruption::Writer(e)), _) => Interruption::Writer(e),
                (Some(Interruption::Backend(e)), Interruption::LimitReached) => Interruption::Backend(e),
                (_, next) => next,
            });
        }
        if found.is_some() {
            return found;
        }

        let active = self.active.as_ref()?;
        self.backends[active.index].check_alive().err().map(Interruption::Backend)
    }

    fn handle_interruption(&mut self, interruption: Interruption) {
        match interruption {
            Interruption::LimitReached => {
                if let Err(e) = self.stop() {
                    log::error!("stopping at the duration limit failed: {}", e);
                }
            }
            Interruption::Writer(e) => self.abort(e),
            Interruption::Backend(e) => {
                if self.config.escalate_before_first_sample && !self.has_committed_audio() {
                    self.escalate(e);
                } else {
                    self.abort(e);
                }
            }
        }
    }

    /// Audio counts as committed once the queue has accepted a frame, even if the
    /// writer has not reached it yet: escalation reopens the output file.
    fn has_committed_audio(&self) -> bool {
        self.active.as_ref().map_or(false, |active| {
            active.queue.pushed_count() > 0
                || active.samples_written.load(Ordering::Relaxed) > 0
                || self.backends[active.index].has_committed_output()
        })
    }

    /// Replace a backend that failed before any audio reached the file.
    fn escalate(&mut self, error: CaptureError) {
        let Some(active) = self.active.take() else {
            return;
        };
        log::warn!("{}, trying the next backend", error);
        self.report_error(&error);

        let position = active.position;
        if let Err(e) = self.finish(active) {
            log::warn!("discarding failed recording: {}", e);
        }
        self.discard_events();

        self.set_state(SessionState::Starting);
        if let Err(e) = self.engage(position + 1) {
            log::error!("no backend left after runtime failure: {}", e);
            self.report_error(&e);
            self.set_state(SessionState::Failed(e));
        }
    }

    /// Stop after a failure that cannot be escalated, keeping the audio written so far.
    fn abort(&mut self, error: CaptureError) {
        let Some(active) = self.active.take() else {
            return;
        };
        log::error!("capture failed while recording: {}", error);
        self.set_state(SessionState::Stopping);
        match self.finish(active) {
            Ok(result) => self.last_result = Some(result),
            Err(e) => log::error!("finalizing after failure: {}", e),
        }
        self.report_error(&error);
        self.set_state(SessionState::Failed(error));
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.state.is_recording() {
            if let Err(e) = self.stop() {
                log::error!("failed to stop capture session on drop: {}", e);
            }
        }
    }
}

struct WriterContext {
    queue: Arc<FrameQueue>,
    muxer: WavMuxer,
    filler: Option<Box<dyn FrameSource>>,
    samples_written: Arc<AtomicU64>,
    events: EventSender,
    poll_interval: Duration,
    max_samples: Option<u64>,
}

/// Writer-thread body. Exits once the queue is closed and empty, then finalizes.
fn run_writer(context: WriterContext) -> Result<FinalizedWav, FinalizeError> {
    let WriterContext {
        queue,
        mut muxer,
        mut filler,
        samples_written,
        events,
        poll_interval,
        max_samples,
    } = context;
    let out_channels = muxer.channels();
    let mut limit_reached = false;

    loop {
        let frame = match queue.pop_timeout(poll_interval) {
            Pop::Frame(frame) => frame,
            Pop::TimedOut => match filler.as_mut() {
                Some(source) if !limit_reached => source.next_frame(),
                _ => continue,
            },
            Pop::Drained => break,
        };
        if limit_reached {
            continue;
        }

        let frame = match max_samples {
            Some(max) => truncate_to_budget(frame, max.saturating_sub(muxer.samples_written()), out_channels),
            None => frame,
        };
        if let Err(e) = muxer.write_frame(&frame) {
            log::error!("writing {} failed: {}", muxer.file_path().display(), e);
            notify(&events, SessionEvent::WriterFailed(e));
            break;
        }
        samples_written.store(muxer.samples_written(), Ordering::Relaxed);

        if max_samples.map_or(false, |max| muxer.samples_written() >= max) {
            limit_reached = true;
            notify(
                &events,
                SessionEvent::MaxDurationReached {
                    samples_written: muxer.samples_written(),
                },
            );
        }
    }

    muxer.finalize()
}

/// Cut `frame` so it yields at most `budget` samples once converted to `out_channels`.
fn truncate_to_budget(frame: AudioFrame, budget: u64, out_channels: u16) -> AudioFrame {
    let frames_allowed = (budget / out_channels.max(1) as u64) as usize;
    if frame.frame_count() <= frames_allowed {
        return frame;
    }
    let keep = frames_allowed * frame.channels() as usize;
    AudioFrame::new(
        frame.samples()[..keep].to_vec(),
        frame.sample_rate(),
        frame.channels(),
        frame.timestamp_ms(),
    )
}

/// Summarize a file written by an external tool, fixing stale header sizes.
fn collect_external_output(path: &Path) -> Result<FinalizedWav, CaptureError> {
    if !path.is_file() {
        return Err(CaptureError::Io(format!(
            "capture tool produced no file at {}",
            path.display()
        )));
    }

    let (data_size, degraded) = match reconcile_header(path) {
        Ok(size) => (size, false),
        Err(e) => {
            log::error!("leaving {} with unverified header: {}", path.display(), e);
            let len = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            (len.saturating_sub(crate::processing::wav_format::WAV_HEADER_SIZE as u64), true)
        }
    };
    let checksum = sha256_file(path).unwrap_or_else(|e| {
        log::warn!("checksum of {} failed: {}", path.display(), e);
        String::new()
    });

    Ok(FinalizedWav {
        file_path: PathBuf::from(path),
        samples_written: 0,
        data_size,
        checksum,
        degraded,
    })
}
