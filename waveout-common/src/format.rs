//! PCM stream format and position conversions
//!
//! The playback engine counts everything in bytes. This module turns byte
//! counts into durations for the player's deadlines and into the time
//! formats a producer may ask a position in.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// SMPTE frame rate used for position reporting
pub const SMPTE_FPS: u8 = 30;

/// Interleaved PCM stream format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveFormat {
    /// Frames per second
    pub sample_rate: u32,
    /// Interleaved channel count
    pub channels: u16,
    /// Bits per sample (8, 16, 24 or 32)
    pub bits_per_sample: u16,
}

impl WaveFormat {
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// 44.1kHz, 16-bit, stereo
    pub fn cd_quality() -> Self {
        Self::new(44_100, 2, 16)
    }

    /// Check that the format is a PCM layout the engine can schedule.
    pub fn validate(&self) -> Result<()> {
        if !(1..=8).contains(&self.channels) {
            return Err(Error::BadFormat(format!(
                "unsupported channel count {}",
                self.channels
            )));
        }
        if !matches!(self.bits_per_sample, 8 | 16 | 24 | 32) {
            return Err(Error::BadFormat(format!(
                "unsupported bits per sample {}",
                self.bits_per_sample
            )));
        }
        if !(1_000..=384_000).contains(&self.sample_rate) {
            return Err(Error::BadFormat(format!(
                "unsupported sample rate {}",
                self.sample_rate
            )));
        }
        Ok(())
    }

    /// Bytes per interleaved frame
    pub fn block_align(&self) -> u32 {
        u32::from(self.channels) * u32::from(self.bits_per_sample) / 8
    }

    /// Byte rate of the stream
    pub fn avg_bytes_per_sec(&self) -> u64 {
        u64::from(self.sample_rate) * u64::from(self.block_align())
    }

    /// Wall-clock time it takes the device to play `bytes`.
    pub fn bytes_to_duration(&self, bytes: u64) -> Duration {
        let rate = self.avg_bytes_per_sec().max(1) as u128;
        let nanos = u128::from(bytes) * 1_000_000_000 / rate;
        Duration::from_nanos(nanos.min(u128::from(u64::MAX)) as u64)
    }

    /// Bytes played in `duration`, rounded down to a whole frame.
    pub fn duration_to_bytes(&self, duration: Duration) -> u64 {
        let raw = self.avg_bytes_per_sec() as u128 * duration.as_nanos() / 1_000_000_000;
        let align = u128::from(self.block_align().max(1));
        ((raw / align) * align) as u64
    }

    /// Convert a byte position into the requested time format.
    pub fn position(&self, bytes: u64, format: TimeFormat) -> MmTime {
        let align = u64::from(self.block_align().max(1));
        let rate = u64::from(self.sample_rate.max(1));
        match format {
            TimeFormat::Bytes => MmTime::Bytes(bytes),
            TimeFormat::Samples => MmTime::Samples(bytes / align),
            TimeFormat::Millis => {
                let avg = self.avg_bytes_per_sec().max(1) as u128;
                MmTime::Millis((u128::from(bytes) * 1000 / avg) as u64)
            }
            TimeFormat::Smpte => {
                let fps = u64::from(SMPTE_FPS);
                // round the frame up
                let mut samples = bytes / align + rate / fps - 1;
                let total_secs = samples / rate;
                samples -= total_secs * rate;
                let hour = total_secs / 3600;
                let min = (total_secs / 60) % 60;
                let sec = total_secs % 60;
                MmTime::Smpte(Smpte {
                    hour: hour.min(u64::from(u8::MAX)) as u8,
                    min: min as u8,
                    sec: sec as u8,
                    frame: (samples * fps / rate) as u8,
                    fps: SMPTE_FPS,
                })
            }
        }
    }
}

impl Default for WaveFormat {
    fn default() -> Self {
        Self::cd_quality()
    }
}

impl std::fmt::Display for WaveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{}bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

/// Unit a position is requested in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFormat {
    Bytes,
    Samples,
    Millis,
    Smpte,
}

/// SMPTE timecode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Smpte {
    pub hour: u8,
    pub min: u8,
    pub sec: u8,
    pub frame: u8,
    pub fps: u8,
}

/// A playback position in one of the supported time formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum MmTime {
    Bytes(u64),
    Samples(u64),
    Millis(u64),
    Smpte(Smpte),
}

impl std::fmt::Display for MmTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MmTime::Bytes(b) => write!(f, "{} bytes", b),
            MmTime::Samples(s) => write!(f, "{} samples", s),
            MmTime::Millis(ms) => write!(f, "{}ms", ms),
            MmTime::Smpte(t) => write!(f, "{:02}:{:02}:{:02}:{:02}", t.hour, t.min, t.sec, t.frame),
        }
    }
}
