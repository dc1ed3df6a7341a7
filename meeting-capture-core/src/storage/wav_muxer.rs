use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::models::audio_frame::AudioFrame;
use crate::models::error::CaptureError;
use crate::processing::wav_format;

/// Summary of a closed WAV stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedWav {
    pub file_path: PathBuf,
    pub samples_written: u64,
    pub data_size: u64,
    /// SHA-256 hex digest of the file; empty if it could not be read back.
    pub checksum: String,
    /// The header still holds the provisional sizes.
    pub degraded: bool,
}

/// The header fix-up failed. The PCM data already on disk is left in place.
#[derive(Debug, Error)]
#[error("failed to finalize {}: {source}", .partial.file_path.display())]
pub struct FinalizeError {
    pub source: CaptureError,
    pub partial: FinalizedWav,
}

/// Streaming WAV writer with deferred header sizes.
///
/// ## File Format
///
/// ```text
/// [44-byte header, sizes zero until finalize]
/// [raw 16-bit little-endian PCM...]
/// ```
///
/// Not synchronized: the writer thread owns the muxer and is the only caller.
/// The output must be seekable (a regular file), since `finalize` rewrites the
/// header in place.
pub struct WavMuxer {
    file_path: PathBuf,
    writer: BufWriter<File>,
    sample_rate: u32,
    channels: u16,
    samples_written: u64,
    rate_mismatch_logged: bool,
}

impl WavMuxer {
    /// Create (or truncate) `path` and write the provisional header.
    pub fn open_stream(path: &Path, sample_rate: u32, channels: u16) -> Result<Self, CaptureError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| CaptureError::Io(format!("failed to create {}: {}", parent.display(), e)))?;
        }

        let file = File::create(path)
            .map_err(|e| CaptureError::Io(format!("failed to create {}: {}", path.display(), e)))?;
        let mut writer = BufWriter::new(file);

        let header = wav_format::generate_wav_header(sample_rate, channels, 0);
        writer
            .write_all(&header)
            .map_err(|e| CaptureError::Io(format!("failed to write header: {}", e)))?;

        log::debug!("opened WAV stream {} ({} Hz, {} ch)", path.display(), sample_rate, channels);

        Ok(Self {
            file_path: path.to_path_buf(),
            writer,
            sample_rate,
            channels,
            samples_written: 0,
            rate_mismatch_logged: false,
        })
    }

    /// Append one frame of PCM.
    ///
    /// Frames with a different channel count are mixed to the stream layout.
    /// Frames at a different rate are written unchanged; the stream declares the
    /// configured rate, so this only logs once.
    pub fn write_frame(&mut self, frame: &AudioFrame) -> Result<(), CaptureError> {
        if frame.sample_rate() != self.sample_rate && !self.rate_mismatch_logged {
            log::warn!(
                "frame at {} Hz written into {} Hz stream {}",
                frame.sample_rate(),
                self.sample_rate,
                self.file_path.display()
            );
            self.rate_mismatch_logged = true;
        }

        if frame.channels() == self.channels {
            return self.write_samples(frame.samples());
        }

        let mono = wav_format::downmix_to_mono(frame.samples(), frame.channels() as usize);
        if self.channels == 1 {
            self.write_samples(&mono)
        } else {
            self.write_samples(&wav_format::mono_to_stereo(&mono))
        }
    }

    /// Append raw interleaved samples already in the stream layout.
    pub fn write_samples(&mut self, samples: &[i16]) -> Result<(), CaptureError> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        self.writer
            .write_all(&bytes)
            .map_err(|e| CaptureError::Io(format!("write failed: {}", e)))?;
        self.samples_written += samples.len() as u64;
        Ok(())
    }

    /// Patch the header sizes, flush, and close the file.
    ///
    /// On failure the returned error carries a degraded summary: the PCM data is
    /// on disk, but the header may still hold the provisional zero sizes.
    pub fn finalize(self) -> Result<FinalizedWav, FinalizeError> {
        let data_size = self.data_size();
        let mut summary = FinalizedWav {
            file_path: self.file_path.clone(),
            samples_written: self.samples_written,
            data_size,
            checksum: String::new(),
            degraded: false,
        };

        if let Err(source) = Self::patch_header(self.writer, data_size, &summary.file_path) {
            log::error!(
                "leaving {} with a stale header ({} bytes of PCM kept): {}",
                summary.file_path.display(),
                data_size,
                source
            );
            summary.degraded = true;
            summary.checksum = sha256_file(&summary.file_path).unwrap_or_default();
            return Err(FinalizeError { source, partial: summary });
        }

        summary.checksum = match sha256_file(&summary.file_path) {
            Ok(checksum) => checksum,
            Err(e) => {
                log::warn!("checksum of {} failed: {}", summary.file_path.display(), e);
                String::new()
            }
        };

        log::info!(
            "finalized {} ({} samples, {} bytes of PCM)",
            summary.file_path.display(),
            summary.samples_written,
            data_size
        );
        Ok(summary)
    }

    pub fn samples_written(&self) -> u64 {
        self.samples_written
    }

    /// PCM bytes written so far (header excluded).
    pub fn data_size(&self) -> u64 {
        self.samples_written * 2
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    fn patch_header(writer: BufWriter<File>, data_size: u64, path: &Path) -> Result<(), CaptureError> {
        let mut file = writer
            .into_inner()
            .map_err(|e| CaptureError::Io(format!("flush failed: {}", e.error())))?;
        check_header_write(path)?;

        let riff_size = wav_format::clamp_to_u32(data_size + 36);
        let data_size = wav_format::clamp_to_u32(data_size);

        file.seek(SeekFrom::Start(wav_format::RIFF_SIZE_OFFSET))?;
        file.write_all(&riff_size.to_le_bytes())?;
        file.seek(SeekFrom::Start(wav_format::DATA_SIZE_OFFSET))?;
        file.write_all(&data_size.to_le_bytes())?;

        file.flush()?;
        file.sync_all()?;
        Ok(())
    }
}

/// Compute the SHA-256 hex digest of a file.
pub fn sha256_file(path: &Path) -> Result<String, CaptureError> {
    let mut file = File::open(path)
        .map_err(|e| CaptureError::Io(format!("failed to read {} for checksum: {}", path.display(), e)))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex_encode(&hasher.finalize()))
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Bring the size fields of a WAV file written by another program in line with
/// the file length. Returns the PCM payload size.
///
/// Tools stopped by a signal may leave provisional sizes behind. Files that do
/// not start with a canonical header are left untouched.
pub fn reconcile_header(path: &Path) -> Result<u64, CaptureError> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| CaptureError::Io(format!("failed to open {}: {}", path.display(), e)))?;
    let len = file.metadata()?.len();
    if len < wav_format::WAV_HEADER_SIZE as u64 {
        return Ok(0);
    }
    let data_size = len - wav_format::WAV_HEADER_SIZE as u64;

    let mut header = [0u8; wav_format::WAV_HEADER_SIZE];
    file.read_exact(&mut header)?;
    let Some(parsed) = wav_format::parse_wav_header(&header) else {
        log::warn!("{} has no canonical WAV header, sizes not checked", path.display());
        return Ok(data_size);
    };
    if parsed.data_size as u64 == data_size && parsed.is_consistent() {
        return Ok(data_size);
    }

    check_header_write(path)?;
    wav_format::patch_riff_size(&mut header, data_size);
    wav_format::patch_data_size(&mut header, data_size);
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&header)?;
    file.sync_all()?;
    log::info!("repaired header of {} ({} bytes of PCM)", path.display(), data_size);
    Ok(data_size)
}

#[cfg(not(test))]
fn check_header_write(_path: &Path) -> Result<(), CaptureError> {
    Ok(())
}

#[cfg(test)]
fn check_header_write(path: &Path) -> Result<(), CaptureError> {
    if faults::header_write_fails(path) {
        return Err(CaptureError::Io(format!("header of {} is not writable", path.display())));
    }
    Ok(())
}

/// Per-path failure injection for header rewrites.
#[cfg(test)]
pub(crate) mod faults {
    use std::path::{Path, PathBuf};

    use parking_lot::Mutex;

    static FAILING_HEADERS: Mutex<Vec<PathBuf>> = parking_lot::const_mutex(Vec::new());

    /// Make every later header rewrite of `path` fail after the PCM is flushed.
    pub(crate) fn fail_header_writes(path: &Path) {
        FAILING_HEADERS.lock().push(path.to_path_buf());
    }

    pub(crate) fn header_write_fails(path: &Path) -> bool {
        FAILING_HEADERS.lock().iter().any(|p| p == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::wav_format::parse_wav_header;

    #[test]
    fn failed_header_rewrite_keeps_pcm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.wav");
        let mut muxer = WavMuxer::open_stream(&path, 16000, 1).unwrap();
        muxer.write_samples(&[7; 400]).unwrap();
        faults::fail_header_writes(&path);

        let err = muxer.finalize().unwrap_err();
        assert!(matches!(err.source, CaptureError::Io(_)));
        assert!(err.partial.degraded);
        assert_eq!(err.partial.samples_written, 400);
        assert_eq!(err.partial.data_size, 800);
        assert_eq!(err.partial.checksum.len(), 64);

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 44 + 800);
        assert_eq!(parse_wav_header(&bytes).unwrap().data_size, 0);
        assert_eq!(&bytes[44..46], &7i16.to_le_bytes());
    }

    #[test]
    fn provisional_header_has_zero_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("open.wav");
        let muxer = WavMuxer::open_stream(&path, 16000, 1).unwrap();
        drop(muxer);

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 44);
        let header = parse_wav_header(&bytes).unwrap();
        assert_eq!(header.data_size, 0);
        assert_eq!(header.riff_size, 36);
    }

    #[test]
    fn finalize_patches_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sizes.wav");
        let mut muxer = WavMuxer::open_stream(&path, 16000, 1).unwrap();

        for i in 0..7 {
            muxer
                .write_frame(&AudioFrame::new(vec![i; 1600], 16000, 1, i as u64 * 100))
                .unwrap();
        }
        muxer.write_samples(&[1, 2, 3]).unwrap();
        let n = 7 * 1600 + 3;

        let done = muxer.finalize().unwrap();
        assert_eq!(done.samples_written, n);
        assert_eq!(done.data_size, n * 2);
        assert!(!done.degraded);

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, 44 + n * 2);
        let header = parse_wav_header(&bytes).unwrap();
        assert_eq!(header.data_size as u64, n * 2);
        assert_eq!(header.riff_size as u64, 36 + n * 2);
        assert_eq!(&bytes[bytes.len() - 6..], &[1, 0, 2, 0, 3, 0]);
    }

    #[test]
    fn finalize_empty_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        let done = WavMuxer::open_stream(&path, 16000, 1).unwrap().finalize().unwrap();
        assert_eq!(done.samples_written, 0);
        let header = parse_wav_header(&fs::read(&path).unwrap()).unwrap();
        assert!(header.is_consistent());
        assert_eq!(header.data_size, 0);
    }

    #[test]
    fn creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("nested.wav");
        WavMuxer::open_stream(&path, 16000, 1).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn unwritable_location_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        let err = WavMuxer::open_stream(&blocker.join("out.wav"), 16000, 1).err().unwrap();
        assert!(matches!(err, CaptureError::Io(_)));
    }

    #[test]
    fn stereo_frames_downmixed_into_mono_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mix.wav");
        let mut muxer = WavMuxer::open_stream(&path, 16000, 1).unwrap();
        muxer
            .write_frame(&AudioFrame::new(vec![100, 300, -50, -150], 16000, 2, 0))
            .unwrap();
        assert_eq!(muxer.samples_written(), 2);
        muxer.finalize().unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[44..], &[200u8, 0, 0x9c, 0xff]);
    }

    #[test]
    fn checksum_matches_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sum.wav");
        let mut muxer = WavMuxer::open_stream(&path, 16000, 1).unwrap();
        muxer.write_samples(&[5; 100]).unwrap();
        let done = muxer.finalize().unwrap();

        let expected = hex_encode(&Sha256::digest(fs::read(&path).unwrap()));
        assert_eq!(done.checksum, expected);
        assert_eq!(done.checksum.len(), 64);
    }

    #[test]
    fn reconcile_patches_stale_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("external.wav");
        let mut bytes = wav_format::generate_wav_header(16000, 1, 0).to_vec();
        bytes.extend_from_slice(&[0u8; 640]);
        fs::write(&path, &bytes).unwrap();

        assert_eq!(reconcile_header(&path).unwrap(), 640);
        let header = parse_wav_header(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(header.data_size, 640);
        assert!(header.is_consistent());

        // already consistent: untouched
        assert_eq!(reconcile_header(&path).unwrap(), 640);
    }

    #[test]
    fn reconcile_leaves_foreign_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.pcm");
        fs::write(&path, vec![7u8; 100]).unwrap();
        assert_eq!(reconcile_header(&path).unwrap(), 56);
        assert_eq!(fs::read(&path).unwrap(), vec![7u8; 100]);
    }
}
