pub mod audio_subsystem;
pub mod capture_backend;
pub mod capture_device;
pub mod session_observer;
