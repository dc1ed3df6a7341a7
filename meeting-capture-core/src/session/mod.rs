pub mod capture_session;
pub mod event;
