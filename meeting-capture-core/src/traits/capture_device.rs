use crate::models::error::{CaptureError, DeviceReadError};

/// Opens named capture endpoints (hardware, loopback, or virtual).
pub trait DeviceOpener: Send + Sync {
    /// Names of the endpoints the platform reports, for diagnostics.
    fn list_devices(&self) -> Vec<String> {
        Vec::new()
    }

    /// Open `name` for 16-bit capture at the given format.
    fn open(&self, name: &str, sample_rate: u32, channels: u16) -> Result<Box<dyn CaptureDevice>, CaptureError>;
}

/// An opened capture endpoint with a blocking read.
pub trait CaptureDevice: Send {
    fn name(&self) -> &str;

    /// Block until samples are available and copy up to `buffer.len()` interleaved
    /// samples into it. Returns the number of samples read.
    fn read(&mut self, buffer: &mut [i16]) -> Result<usize, DeviceReadError>;

    /// Bring the device back to a readable state after a read error.
    fn recover(&mut self) -> Result<(), DeviceReadError>;
}
