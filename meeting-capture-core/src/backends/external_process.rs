//! Capture delegated to an external recording tool.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::audio_frame::BackendKind;
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::processing::wav_format::WAV_HEADER_SIZE;
use crate::supervisor::command::{resolve_on_path, CaptureTool, CaptureToolCommand};
use crate::supervisor::process_supervisor::ProcessSupervisor;
use crate::traits::capture_backend::{CaptureBackend, CaptureTarget, FrameFeed};

/// Runs `parecord`, `ffmpeg` or a custom tool that writes the WAV file itself.
///
/// The frame queue and muxer are bypassed. A process that exits within the
/// spawn grace period counts as an open failure; an exit after that is a
/// runtime failure reported through `check_alive()`.
pub struct ExternalProcessBackend {
    tool: CaptureTool,
    source: String,
    spawn_grace: Duration,
    supervisor: ProcessSupervisor,
    output_path: Option<PathBuf>,
}

impl ExternalProcessBackend {
    pub fn new(tool: CaptureTool, source: impl Into<String>, spawn_grace: Duration, terminate_timeout: Duration) -> Self {
        Self {
            tool,
            source: source.into(),
            spawn_grace,
            supervisor: ProcessSupervisor::new(terminate_timeout),
            output_path: None,
        }
    }

    pub fn from_config(config: &CaptureConfiguration) -> Self {
        let mut backend = Self::new(
            config.capture_tool.clone(),
            config.capture_source.clone(),
            config.spawn_grace(),
            config.terminate_timeout(),
        );
        backend.supervisor = ProcessSupervisor::new(config.terminate_timeout())
            .with_forwarded_output(config.forward_tool_output);
        backend
    }

    pub fn pid(&self) -> Option<u32> {
        self.supervisor.process().map(|p| p.pid)
    }
}

impl CaptureBackend for ExternalProcessBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::ExternalProcess
    }

    fn name(&self) -> String {
        format!("{} ({})", self.kind(), self.tool.program())
    }

    fn is_available(&self) -> bool {
        resolve_on_path(self.tool.program()).is_some()
    }

    fn open(&mut self, target: &CaptureTarget) -> Result<FrameFeed, CaptureError> {
        let command = CaptureToolCommand::for_tool(
            &self.tool,
            &self.source,
            target.sample_rate,
            target.channels,
            &target.output_path,
        );
        if let Some(parent) = target.output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        self.supervisor
            .spawn(&command)
            .map_err(|e| CaptureError::open_failure(self.name(), e.to_string()))?;

        if let Some(status) = self.supervisor.wait_exit(self.spawn_grace) {
            return Err(CaptureError::open_failure(
                self.name(),
                format!("exited during startup ({})", status),
            ));
        }

        log::info!("external capture running: {}", command);
        self.output_path = Some(target.output_path.clone());
        Ok(FrameFeed::External)
    }

    fn check_alive(&mut self) -> Result<(), CaptureError> {
        if self.output_path.is_none() || self.supervisor.poll_alive() {
            return Ok(());
        }
        let status = self
            .supervisor
            .exit_status()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown status".into());
        Err(CaptureError::runtime_failure(
            self.name(),
            format!("capture process exited prematurely ({})", status),
        ))
    }

    fn has_committed_output(&self) -> bool {
        self.output_path
            .as_ref()
            .and_then(|path| fs::metadata(path).ok())
            .map(|meta| meta.len() > WAV_HEADER_SIZE as u64)
            .unwrap_or(false)
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        let status = self.supervisor.terminate()?;
        if let Some(status) = status {
            log::debug!("external capture tool finished: {}", status);
        }
        self.output_path = None;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::processing::frame_queue::{FrameQueue, FrameSink};
    use crate::session::event::event_channel;

    fn target(dir: &tempfile::TempDir) -> CaptureTarget {
        let (events, _rx) = event_channel();
        CaptureTarget {
            sink: FrameSink::new(Arc::new(FrameQueue::new())),
            events,
            output_path: dir.path().join("nested").join("meeting.wav"),
            sample_rate: 16000,
            channels: 1,
        }
    }

    fn custom(script: &str) -> CaptureTool {
        CaptureTool::Custom {
            program: "sh".into(),
            args: vec!["-c".into(), script.into()],
        }
    }

    fn backend(tool: CaptureTool) -> ExternalProcessBackend {
        ExternalProcessBackend::new(tool, "monitor", Duration::from_millis(200), Duration::from_secs(2))
    }

    #[test]
    fn immediate_exit_is_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(custom("exit 1"));
        assert!(backend.is_available());
        let err = backend.open(&target(&dir)).unwrap_err();
        assert!(err.is_open_failure());
        backend.close().unwrap();
    }

    #[test]
    fn missing_tool_is_unavailable() {
        let tool = CaptureTool::Custom {
            program: "definitely-not-a-capture-tool-4821".into(),
            args: vec![],
        };
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(tool);
        assert!(!backend.is_available());
        assert!(backend.open(&target(&dir)).unwrap_err().is_open_failure());
    }

    #[test]
    fn tool_writes_output_and_is_terminated() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(CaptureTool::Custom {
            program: "sh".into(),
            args: vec![
                "-c".into(),
                "head -c 100 /dev/zero > \"$0\"; exec sleep 30".into(),
                "{output}".into(),
            ],
        });
        let target = target(&dir);
        assert!(backend.open(&target).unwrap().is_external());
        assert!(backend.pid().is_some());
        assert!(backend.check_alive().is_ok());
        assert!(backend.has_committed_output());

        backend.close().unwrap();
        assert!(target.output_path.exists());
        assert!(!backend.has_committed_output());
    }

    #[test]
    fn exit_after_grace_is_runtime_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = backend(custom("sleep 0.4"));
        backend.open(&target(&dir)).unwrap();
        assert!(!backend.has_committed_output());

        std::thread::sleep(Duration::from_millis(700));
        let err = backend.check_alive().unwrap_err();
        assert!(matches!(err, CaptureError::BackendRuntimeFailure { .. }));
        backend.close().unwrap();
    }
}
