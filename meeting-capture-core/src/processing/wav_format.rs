//! Canonical 44-byte RIFF/WAVE header for 16-bit PCM.
//!
//! The header is written once with zero sizes when a stream opens and patched in
//! place once the final PCM length is known.

/// Size of the canonical WAV header in bytes.
pub const WAV_HEADER_SIZE: usize = 44;

/// Bits per sample of every stream this crate writes.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Offset of the RIFF chunk size field (`file size - 8`).
pub const RIFF_SIZE_OFFSET: u64 = 4;

/// Offset of the `data` sub-chunk size field.
pub const DATA_SIZE_OFFSET: u64 = 40;

/// Decoded view of a canonical header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub riff_size: u32,
    pub format_code: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavHeader {
    /// Number of samples (across all channels) in the data chunk.
    pub fn sample_count(&self) -> u64 {
        self.data_size as u64 / (self.bits_per_sample as u64 / 8).max(1)
    }

    /// Whether the RIFF size agrees with the data size for this fixed layout.
    pub fn is_consistent(&self) -> bool {
        self.riff_size as u64 == 36 + self.data_size as u64
    }
}

/// Generate a 44-byte PCM header.
///
/// Layout:
/// ```text
/// [0-3]    "RIFF"
/// [4-7]    36 + data_size
/// [8-11]   "WAVE"
/// [12-15]  "fmt "
/// [16-19]  16 (PCM format chunk size)
/// [20-21]  1 (PCM format code)
/// [22-23]  channels
/// [24-27]  sample_rate
/// [28-31]  byte_rate = sample_rate * channels * 2
/// [32-33]  block_align = channels * 2
/// [34-35]  16
/// [36-39]  "data"
/// [40-43]  data_size
/// ```
pub fn generate_wav_header(sample_rate: u32, channels: u16, data_size: u32) -> [u8; WAV_HEADER_SIZE] {
    let bytes_per_sample = BITS_PER_SAMPLE / 8;
    let byte_rate = sample_rate * channels as u32 * bytes_per_sample as u32;
    let block_align = channels * bytes_per_sample;
    let riff_size = 36u32.saturating_add(data_size);

    let mut header = [0u8; WAV_HEADER_SIZE];

    header[0..4].copy_from_slice(b"RIFF");
    header[4..8].copy_from_slice(&riff_size.to_le_bytes());
    header[8..12].copy_from_slice(b"WAVE");

    header[12..16].copy_from_slice(b"fmt ");
    header[16..20].copy_from_slice(&16u32.to_le_bytes());
    header[20..22].copy_from_slice(&1u16.to_le_bytes());
    header[22..24].copy_from_slice(&channels.to_le_bytes());
    header[24..28].copy_from_slice(&sample_rate.to_le_bytes());
    header[28..32].copy_from_slice(&byte_rate.to_le_bytes());
    header[32..34].copy_from_slice(&block_align.to_le_bytes());
    header[34..36].copy_from_slice(&BITS_PER_SAMPLE.to_le_bytes());

    header[36..40].copy_from_slice(b"data");
    header[40..44].copy_from_slice(&data_size.to_le_bytes());

    header
}

/// Parse a canonical header. Returns `None` if the tags are not where they belong.
pub fn parse_wav_header(bytes: &[u8]) -> Option<WavHeader> {
    if bytes.len() < WAV_HEADER_SIZE {
        return None;
    }
    if &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" || &bytes[12..16] != b"fmt " || &bytes[36..40] != b"data" {
        return None;
    }
    let u16_at = |i: usize| u16::from_le_bytes([bytes[i], bytes[i + 1]]);
    let u32_at = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);

    Some(WavHeader {
        riff_size: u32_at(4),
        format_code: u16_at(20),
        channels: u16_at(22),
        sample_rate: u32_at(24),
        byte_rate: u32_at(28),
        block_align: u16_at(32),
        bits_per_sample: u16_at(34),
        data_size: u32_at(40),
    })
}

/// Clamp a byte count to what the 32-bit size fields can hold.
pub fn clamp_to_u32(size: u64) -> u32 {
    if size > u32::MAX as u64 {
        log::warn!("WAV payload of {} bytes exceeds the 4 GiB header limit", size);
    }
    size.min(u32::MAX as u64) as u32
}

/// Patch the RIFF size field (offset 4) for `data_size` bytes of PCM.
pub fn patch_riff_size(header: &mut [u8], data_size: u64) {
    let riff_size = clamp_to_u32(data_size.saturating_add(36));
    header[4..8].copy_from_slice(&riff_size.to_le_bytes());
}

/// Patch the data-size field at offset 40.
pub fn patch_data_size(header: &mut [u8], data_size: u64) {
    header[40..44].copy_from_slice(&clamp_to_u32(data_size).to_le_bytes());
}

/// Average interleaved channels down to mono.
pub fn downmix_to_mono(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Duplicate a mono signal into interleaved stereo.
pub fn mono_to_stereo(samples: &[i16]) -> Vec<i16> {
    samples.iter().flat_map(|&s| [s, s]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_tags_and_size() {
        let header = generate_wav_header(16000, 1, 0);
        assert_eq!(header.len(), 44);
        assert_eq!(&header[0..4], b"RIFF");
        assert_eq!(&header[8..12], b"WAVE");
        assert_eq!(&header[12..16], b"fmt ");
        assert_eq!(&header[36..40], b"data");
    }

    #[test]
    fn header_16khz_mono_fields() {
        let header = parse_wav_header(&generate_wav_header(16000, 1, 32000)).unwrap();
        assert_eq!(header.format_code, 1);
        assert_eq!(header.channels, 1);
        assert_eq!(header.sample_rate, 16000);
        assert_eq!(header.byte_rate, 32000);
        assert_eq!(header.block_align, 2);
        assert_eq!(header.bits_per_sample, 16);
        assert_eq!(header.data_size, 32000);
        assert_eq!(header.riff_size, 36 + 32000);
        assert!(header.is_consistent());
        assert_eq!(header.sample_count(), 16000);
    }

    #[test]
    fn stereo_derived_fields() {
        let header = parse_wav_header(&generate_wav_header(48000, 2, 0)).unwrap();
        assert_eq!(header.byte_rate, 192000);
        assert_eq!(header.block_align, 4);
    }

    #[test]
    fn patch_sizes_keeps_invariant() {
        let mut bytes = generate_wav_header(16000, 1, 0);
        for n in [0u64, 1, 1600, 16000, 1_000_000] {
            patch_data_size(&mut bytes, n * 2);
            patch_riff_size(&mut bytes, n * 2);
            let header = parse_wav_header(&bytes).unwrap();
            assert_eq!(header.data_size as u64, n * 2);
            assert_eq!(header.riff_size as u64, 36 + n * 2);
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_wav_header(&[0u8; 10]).is_none());
        let mut bytes = generate_wav_header(16000, 1, 0);
        bytes[0] = b'X';
        assert!(parse_wav_header(&bytes).is_none());
    }

    #[test]
    fn downmix_averages_pairs() {
        assert_eq!(downmix_to_mono(&[100, 300, -200, 0], 2), vec![200, -100]);
        assert_eq!(downmix_to_mono(&[i16::MAX, i16::MAX], 2), vec![i16::MAX]);
        assert_eq!(downmix_to_mono(&[1, 2, 3], 1), vec![1, 2, 3]);
    }

    #[test]
    fn mono_duplicates_into_stereo() {
        assert_eq!(mono_to_stereo(&[1, -2]), vec![1, 1, -2, -2]);
    }
}
