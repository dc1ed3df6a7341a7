use std::sync::Arc;

use crate::models::error::CaptureError;

/// Callback invoked by an audio subsystem for each chunk of mixed meeting audio.
///
/// Parameters:
/// - `data`: little-endian 16-bit PCM, only valid for the duration of the call.
/// - `sample_rate`: rate of the delivered audio.
/// - `channels`: interleaved channel count.
///
/// Invoked on a thread owned by the subsystem; possibly from several at once.
pub type RawAudioCallback = Arc<dyn Fn(&[u8], u32, u16) + Send + Sync + 'static>;

/// Meeting SDK audio stream, as seen by the capture pipeline.
///
/// Two implementations are expected: the live SDK binding, supplied by the bot
/// host, and `SimulatedAudioSubsystem` when the SDK is not part of the build.
/// Which one a session gets is decided when it is composed.
pub trait AudioSubsystem: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the subsystem is joined to a meeting and can deliver audio.
    fn is_available(&self) -> bool;

    /// Start delivering audio to `callback`. At most one callback is registered.
    fn register(&self, callback: RawAudioCallback) -> Result<(), CaptureError>;

    /// Stop delivering audio. After this returns the callback is never invoked again.
    fn unregister(&self);
}
