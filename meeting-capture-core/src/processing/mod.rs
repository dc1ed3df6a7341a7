pub mod frame_queue;
pub mod synthetic;
pub mod wav_format;
