//! Blocking ALSA capture handed to the core's device backend.

use alsa::pcm::{Access, Format, HwParams, PCM};
use alsa::{Direction, ValueOr};

use meeting_capture_core::models::error::{CaptureError, DeviceReadError};
use meeting_capture_core::traits::capture_device::{CaptureDevice, DeviceOpener};

use crate::device_enumerator::list_capture_devices;

// Linux errno values reported by alsa-lib.
const ENODEV: i32 = 19;
const EPIPE: i32 = 32;
const EBADFD: i32 = 77;
const ESTRPIPE: i32 = 86;

/// Opens ALSA PCM endpoints (hardware, `plughw`, `pulse`, loopback) for capture.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlsaDeviceOpener;

impl AlsaDeviceOpener {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceOpener for AlsaDeviceOpener {
    fn list_devices(&self) -> Vec<String> {
        match list_capture_devices() {
            Ok(devices) => devices.into_iter().map(|d| d.name).collect(),
            Err(e) => {
                log::warn!("{}", e);
                Vec::new()
            }
        }
    }

    fn open(&self, name: &str, sample_rate: u32, channels: u16) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        let device = AlsaCaptureDevice::open(name, sample_rate, channels)?;
        Ok(Box::new(device))
    }
}

/// An opened PCM in interleaved signed 16-bit capture mode.
pub struct AlsaCaptureDevice {
    name: String,
    pcm: PCM,
    channels: u16,
    last_errno: Option<i32>,
}

impl AlsaCaptureDevice {
    /// Open `name` at exactly `sample_rate`.
    ///
    /// Hardware that cannot run at the requested rate is rejected so a
    /// resampling endpoint later in the candidate list gets its turn.
    pub fn open(name: &str, sample_rate: u32, channels: u16) -> Result<Self, CaptureError> {
        let fail = |what: &str, e: alsa::Error| CaptureError::open_failure(name, format!("{}: {}", what, e));

        let pcm = PCM::new(name, Direction::Capture, false).map_err(|e| fail("open", e))?;
        {
            let hwp = HwParams::any(&pcm).map_err(|e| fail("hw params", e))?;
            hwp.set_access(Access::RWInterleaved).map_err(|e| fail("access", e))?;
            hwp.set_format(Format::s16()).map_err(|e| fail("format", e))?;
            hwp.set_rate(sample_rate, ValueOr::Nearest).map_err(|e| fail("rate", e))?;
            hwp.set_channels(u32::from(channels)).map_err(|e| fail("channels", e))?;
            pcm.hw_params(&hwp).map_err(|e| fail("apply hw params", e))?;
        }

        let actual_rate = pcm
            .hw_params_current()
            .and_then(|hwp| hwp.get_rate())
            .map_err(|e| fail("query rate", e))?;
        if actual_rate != sample_rate {
            return Err(CaptureError::open_failure(
                name,
                format!("runs at {} Hz, {} Hz requested", actual_rate, sample_rate),
            ));
        }

        pcm.prepare().map_err(|e| fail("prepare", e))?;
        log::info!("opened ALSA device {} ({} Hz, {} ch)", name, sample_rate, channels);

        Ok(Self {
            name: name.to_string(),
            pcm,
            channels: channels.max(1),
            last_errno: None,
        })
    }
}

impl CaptureDevice for AlsaCaptureDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, buffer: &mut [i16]) -> Result<usize, DeviceReadError> {
        let channels = self.channels as usize;
        let usable = buffer.len() / channels * channels;
        let io = self
            .pcm
            .io_i16()
            .map_err(|e| classify(e.errno(), e.to_string()))?;
        match io.readi(&mut buffer[..usable]) {
            Ok(frames) => Ok(frames * channels),
            Err(e) => {
                self.last_errno = Some(e.errno());
                Err(classify(e.errno(), e.to_string()))
            }
        }
    }

    fn recover(&mut self) -> Result<(), DeviceReadError> {
        let result = match self.last_errno.take() {
            Some(errno) => self.pcm.recover(errno, true),
            None => self.pcm.prepare(),
        };
        result.map_err(|e| DeviceReadError::Disconnected(e.to_string()))
    }
}

/// Map an alsa-lib errno to how the capture loop should treat it.
fn classify(errno: i32, message: String) -> DeviceReadError {
    match errno.abs() {
        EPIPE | ESTRPIPE => DeviceReadError::Transient(message),
        ENODEV | EBADFD => DeviceReadError::Disconnected(message),
        _ => DeviceReadError::Transient(message),
    }
}
