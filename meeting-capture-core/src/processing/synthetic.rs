//! Deterministic stand-in for meeting audio.
//!
//! Used when no real source can be opened so that a session still yields a valid,
//! non-empty recording. Output depends only on the synthetic sample clock, never on
//! wall-clock time, so two generators started together produce identical chunks.

use std::f64::consts::PI;

use crate::models::audio_frame::AudioFrame;

/// Length of the repeating conversation pattern.
const CYCLE_SECS: f64 = 25.0;
/// Interval between notification chimes.
const CHIME_PERIOD_SECS: u64 = 15;
/// Samples the chime lasts at the start of each period.
const CHIME_SAMPLES: u64 = 200;
const CHIME_HZ: f64 = 800.0;
/// Keyboard-like bursts may start on every half-second boundary.
const CLICK_SAMPLES: u64 = 80;
const CLICK_PROBABILITY: f64 = 0.3;
const ROOM_NOISE: f64 = 0.015;
const LIMIT: f64 = 0.8;
const SATURATION: f64 = 0.7;
/// PCM scale after saturation; peak output stays well inside i16.
const HEADROOM: f64 = 28000.0;

/// Two-speaker conversational signal with room noise, keyboard clicks and chimes.
#[derive(Debug, Clone)]
pub struct SyntheticSignalGenerator {
    sample_rate: u32,
    channels: u16,
    position: u64,
    speaker1_phase: f64,
    speaker2_phase: f64,
}

impl SyntheticSignalGenerator {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            channels: channels.max(1),
            position: 0,
            speaker1_phase: 0.0,
            speaker2_phase: 0.0,
        }
    }

    /// Samples per channel in one 100 ms chunk.
    pub fn chunk_len(&self) -> usize {
        (self.sample_rate / 10).max(1) as usize
    }

    /// Synthetic time elapsed since the generator started, in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.position * 1000 / self.sample_rate as u64
    }

    /// Restart at t = 0.
    pub fn reset(&mut self) {
        self.position = 0;
        self.speaker1_phase = 0.0;
        self.speaker2_phase = 0.0;
    }

    /// Produce the next 100 ms chunk and advance the clock.
    pub fn next_chunk(&mut self) -> AudioFrame {
        let timestamp_ms = self.elapsed_ms();
        let frames = self.chunk_len();
        let channels = self.channels as usize;
        let mut samples = Vec::with_capacity(frames * channels);
        for _ in 0..frames {
            let sample = self.next_sample();
            samples.extend(std::iter::repeat(sample).take(channels));
        }
        AudioFrame::new(samples, self.sample_rate, self.channels, timestamp_ms)
    }

    fn next_sample(&mut self) -> i16 {
        let index = self.position;
        let rate = self.sample_rate as f64;
        let t = index as f64 / rate;
        let mut sample = self.voices(t, rate);

        let half_second = (self.sample_rate as u64 / 2).max(1);
        let burst_start = index - index % half_second;
        if index - burst_start < CLICK_SAMPLES && unit_noise(burst_start, 0x6b65_7973) < CLICK_PROBABILITY {
            let decay = 1.0 - (index - burst_start) as f64 / CLICK_SAMPLES as f64;
            sample += 0.15 * decay * (unit_noise(index, 0x636c_6963) - 0.5);
        }

        sample += ROOM_NOISE * (unit_noise(index, 0x726f_6f6d) - 0.5);

        if index % (self.sample_rate as u64 * CHIME_PERIOD_SECS) < CHIME_SAMPLES {
            sample += 0.1 * (2.0 * PI * CHIME_HZ * t).sin();
        }

        let limited = sample.clamp(-LIMIT, LIMIT);
        let saturated = (limited * SATURATION).tanh() / SATURATION;

        self.position += 1;
        (saturated * HEADROOM) as i16
    }

    fn voices(&mut self, t: f64, rate: f64) -> f64 {
        let segment = t % CYCLE_SECS;
        let mut sample = 0.0;

        if segment < 8.0 {
            let intensity = 0.4 + 0.3 * (2.0 * PI * 0.12 * t).sin();
            let fundamental = 150.0 + 30.0 * (2.0 * PI * 0.05 * t).sin();
            self.speaker1_phase = advance(self.speaker1_phase, fundamental, rate);
            let phase = self.speaker1_phase;
            sample += 0.4 * phase.sin() * intensity;
            sample += 0.2 * (phase * 2.0).sin() * intensity;
            sample += 0.15 * (phase * 3.0).sin() * intensity;
            sample += 0.1 * (phase * 5.0).sin() * intensity;
            sample += 0.05 * (2.0 * PI * 4.5 * t).sin() * intensity;
        } else if segment > 10.0 && segment < 18.0 {
            let intensity = 0.35 + 0.25 * (2.0 * PI * 0.15 * t).sin();
            let fundamental = 250.0 + 50.0 * (2.0 * PI * 0.07 * t).sin();
            self.speaker2_phase = advance(self.speaker2_phase, fundamental, rate);
            let phase = self.speaker2_phase;
            sample += 0.35 * phase.sin() * intensity;
            sample += 0.2 * (phase * 2.0).sin() * intensity;
            sample += 0.15 * (phase * 3.5).sin() * intensity;
            sample += 0.1 * (phase * 5.0).sin() * intensity;
            sample += 0.05 * (2.0 * PI * 5.5 * t).sin() * intensity;
        } else if segment > 20.0 && segment < 23.0 {
            self.speaker1_phase = advance(self.speaker1_phase, 160.0, rate);
            self.speaker2_phase = advance(self.speaker2_phase, 280.0, rate);
            let (p1, p2) = (self.speaker1_phase, self.speaker2_phase);
            sample += 0.3 * p1.sin() * 0.25;
            sample += 0.25 * p2.sin() * 0.2;
            sample += 0.1 * (p1 * 2.0).sin() * 0.25;
            sample += 0.1 * (p2 * 2.0).sin() * 0.2;
        }

        sample
    }
}

/// Advance a phase accumulator, wrapping at 4π so the 3.5× partial stays continuous.
fn advance(phase: f64, frequency: f64, rate: f64) -> f64 {
    (phase + 2.0 * PI * frequency / rate) % (4.0 * PI)
}

/// Uniform value in `[0, 1)` derived from a sample index (splitmix64).
fn unit_noise(index: u64, salt: u64) -> f64 {
    let mut z = index.wrapping_add(salt).wrapping_add(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^= z >> 31;
    (z >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rms(samples: &[i16]) -> f64 {
        let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / samples.len() as f64).sqrt()
    }

    #[test]
    fn chunk_is_100ms() {
        let mut gen = SyntheticSignalGenerator::new(16000, 1);
        let chunk = gen.next_chunk();
        assert_eq!(chunk.samples().len(), 1600);
        assert_eq!(chunk.sample_rate(), 16000);
        assert_eq!(chunk.timestamp_ms(), 0);
        assert_eq!(gen.next_chunk().timestamp_ms(), 100);
    }

    #[test]
    fn deterministic_and_restartable() {
        let mut a = SyntheticSignalGenerator::new(16000, 1);
        let mut b = SyntheticSignalGenerator::new(16000, 1);
        let first: Vec<_> = (0..30).map(|_| a.next_chunk()).collect();
        let second: Vec<_> = (0..30).map(|_| b.next_chunk()).collect();
        assert_eq!(first, second);

        a.reset();
        assert_eq!(a.next_chunk(), first[0]);
    }

    #[test]
    fn bounded_over_full_cycle() {
        let mut gen = SyntheticSignalGenerator::new(16000, 1);
        let limit = (HEADROOM * (LIMIT * SATURATION).tanh() / SATURATION).ceil() as i32;
        for _ in 0..260 {
            let chunk = gen.next_chunk();
            assert!(chunk.samples().iter().all(|&s| (s as i32).abs() <= limit));
        }
    }

    #[test]
    fn speech_louder_than_pause() {
        let mut gen = SyntheticSignalGenerator::new(16000, 1);
        // 2.0 s into the cycle: speaker one.
        for _ in 0..20 {
            gen.next_chunk();
        }
        let speech = rms(gen.next_chunk().samples());

        // 9.0 s: gap between speakers, only ambience.
        for _ in 21..90 {
            gen.next_chunk();
        }
        let pause = rms(gen.next_chunk().samples());

        assert!(speech > 1000.0, "speech rms {}", speech);
        assert!(pause < speech / 5.0, "pause rms {} vs speech {}", pause, speech);
        assert!(pause > 0.0);
    }

    #[test]
    fn stereo_duplicates_channels() {
        let mut gen = SyntheticSignalGenerator::new(8000, 2);
        let chunk = gen.next_chunk();
        assert_eq!(chunk.samples().len(), 1600);
        assert_eq!(chunk.frame_count(), 800);
        for pair in chunk.samples().chunks_exact(2) {
            assert_eq!(pair[0], pair[1]);
        }
    }

    #[test]
    fn unit_noise_in_range() {
        for i in 0..10_000 {
            let u = unit_noise(i, 7);
            assert!((0.0..1.0).contains(&u));
        }
        approx::assert_abs_diff_eq!(
            (0..10_000).map(|i| unit_noise(i, 7)).sum::<f64>() / 10_000.0,
            0.5,
            epsilon = 0.02
        );
    }
}
