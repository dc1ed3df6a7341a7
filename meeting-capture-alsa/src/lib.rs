//! # meeting-capture-alsa
//!
//! Linux ALSA capture devices for meeting-capture.
//!
//! Provides:
//! - `AlsaDeviceOpener`: implements `DeviceOpener` for the core's `DeviceCaptureBackend`
//! - `AlsaCaptureDevice`: interleaved 16-bit blocking reads with xrun recovery
//! - `list_capture_devices`: capture endpoints from the ALSA hint API
//!
//! ## Platform Requirements
//! - Linux with the `alsa` feature enabled
//! - `libasound2-dev` (Debian/Ubuntu) or `alsa-lib-devel` (Fedora) for linking
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use meeting_capture_alsa::AlsaDeviceOpener;
//! use meeting_capture_core::{CaptureConfiguration, CaptureSession, DeviceCaptureBackend};
//!
//! let config = CaptureConfiguration::default();
//! let mut session = CaptureSession::new(config.clone());
//! session.add_backend(Box::new(DeviceCaptureBackend::new(
//!     Arc::new(AlsaDeviceOpener::new()),
//!     config.device_candidates.clone(),
//! )));
//! session.start()?;
//! ```

#[cfg(all(target_os = "linux", feature = "alsa"))]
pub mod alsa_device;
#[cfg(all(target_os = "linux", feature = "alsa"))]
pub mod device_enumerator;

#[cfg(all(target_os = "linux", feature = "alsa"))]
pub use alsa_device::{AlsaCaptureDevice, AlsaDeviceOpener};
#[cfg(all(target_os = "linux", feature = "alsa"))]
pub use device_enumerator::{list_capture_devices, AlsaDeviceInfo};
