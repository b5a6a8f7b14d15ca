//! Audio output using cpal
//!
//! The player thread pushes raw PCM bytes into a lock-free ring buffer; the
//! cpal output callback pops whole frames, converts them to the device's
//! sample type and counts how many bytes it has consumed.
//!
//! The cpal `Stream` is not `Send`, so opening returns two halves:
//! - [`CpalSink`]: the `Send` producer side, handed to the player thread
//! - [`CpalStream`]: the stream guard, kept alive on the opening thread

use super::{DeviceError, OutputDevice};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use waveout_common::{Error, Result, WaveFormat};

/// Extra time allowed for the device to drain beyond the nominal duration
const DRAIN_SLACK: Duration = Duration::from_secs(1);

/// Counters shared between the sink and the audio callback
#[derive(Debug, Default)]
struct CallbackShared {
    /// Bytes popped by the callback (played or discarded)
    consumed: AtomicU64,
    /// Bytes up to this write offset are skipped instead of played
    discard_until: AtomicU64,
    /// Set by the stream error callback
    stream_error: AtomicBool,
    /// Callbacks that ran out of data
    underruns: AtomicU64,
}

/// List available audio output devices.
pub fn list_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?
        .filter_map(|device| device.name().ok())
        .collect();

    debug!("Found {} output devices", devices.len());
    Ok(devices)
}

/// Producer half of a cpal-backed output device
pub struct CpalSink {
    producer: HeapProd<u8>,
    format: WaveFormat,
    /// Total bytes pushed into the ring
    written: u64,
    shared: Arc<CallbackShared>,
}

/// Running cpal stream. Dropping it stops playback.
pub struct CpalStream {
    stream: Stream,
    device_name: String,
    shared: Arc<CallbackShared>,
}

impl CpalStream {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Number of callbacks that found the ring empty
    pub fn underruns(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        if let Err(e) = self.stream.pause() {
            debug!("Failed to pause stream on drop: {}", e);
        }
    }
}

impl CpalSink {
    /// Open `device_name` (or the default device) for `format` and start it.
    ///
    /// `buffer_bytes` sizes the ring between the player thread and the
    /// audio callback, and so bounds how far ahead the engine can write.
    pub fn open(
        format: WaveFormat,
        device_name: Option<&str>,
        buffer_bytes: usize,
    ) -> Result<(CpalSink, CpalStream)> {
        format.validate()?;
        let frame = format.block_align() as usize;
        if buffer_bytes < frame {
            return Err(Error::InvalidParameter(format!(
                "output buffer of {} bytes cannot hold one {}-byte frame",
                buffer_bytes, frame
            )));
        }

        let host = cpal::default_host();
        let (device, name) = select_device(&host, device_name)?;
        let (config, sample_format) = matching_config(&device, &name, &format)?;

        debug!(
            "Audio config: sample_rate={}, channels={}, format={:?}, ring={} bytes",
            config.sample_rate.0, config.channels, sample_format, buffer_bytes
        );

        let (producer, consumer) = HeapRb::<u8>::new(buffer_bytes).split();
        let shared = Arc::new(CallbackShared::default());

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, consumer, format, &shared)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, consumer, format, &shared)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, consumer, format, &shared)?,
            other => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {:?}",
                    other
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {}", e)))?;

        info!("Audio stream started on {} ({})", name, format);

        Ok((
            CpalSink {
                producer,
                format,
                written: 0,
                shared: Arc::clone(&shared),
            },
            CpalStream {
                stream,
                device_name: name,
                shared,
            },
        ))
    }

    fn check_stream(&self) -> std::result::Result<(), DeviceError> {
        if self.shared.stream_error.load(Ordering::SeqCst) {
            return Err(DeviceError::Failed("audio stream reported an error".to_string()));
        }
        Ok(())
    }

    fn pending(&self) -> std::result::Result<u64, DeviceError> {
        let consumed = self.shared.consumed.load(Ordering::Acquire);
        if consumed > self.written {
            return Err(DeviceError::Desync(format!(
                "callback consumed {} bytes but only {} were written",
                consumed, self.written
            )));
        }
        let discarded = self.shared.discard_until.load(Ordering::Acquire);
        Ok(self.written - consumed.max(discarded).min(self.written))
    }
}

impl OutputDevice for CpalSink {
    fn write(&mut self, data: &[u8]) -> std::result::Result<usize, DeviceError> {
        self.check_stream()?;
        let accepted = self.producer.push_slice(data);
        if accepted == 0 && !data.is_empty() {
            return Err(DeviceError::WouldBlock);
        }
        self.written += accepted as u64;
        Ok(accepted)
    }

    fn capacity_available(&mut self) -> std::result::Result<usize, DeviceError> {
        self.check_stream()?;
        Ok(self.producer.vacant_len())
    }

    fn pending_bytes(&mut self) -> std::result::Result<usize, DeviceError> {
        self.check_stream()?;
        Ok(self.pending()? as usize)
    }

    fn flush_and_drain(&mut self) -> std::result::Result<(), DeviceError> {
        let deadline = Instant::now() + self.format.bytes_to_duration(self.pending()?) + DRAIN_SLACK;
        loop {
            self.check_stream()?;
            let pending = self.pending()?;
            if pending == 0 {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(DeviceError::Failed(format!(
                    "drain timed out with {} bytes still pending",
                    pending
                )));
            }
            let wait = self.format.bytes_to_duration(pending).min(Duration::from_millis(10));
            thread::sleep(wait.max(Duration::from_millis(1)));
        }
    }

    fn reset(&mut self) -> std::result::Result<(), DeviceError> {
        self.shared.discard_until.store(self.written, Ordering::Release);
        Ok(())
    }
}

fn select_device(host: &cpal::Host, device_name: Option<&str>) -> Result<(Device, String)> {
    if let Some(name) = device_name {
        let mut devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to enumerate devices: {}", e)))?;

        if let Some(dev) = devices.find(|d| d.name().ok().as_deref() == Some(name)) {
            info!("Found requested audio device: {}", name);
            return Ok((dev, name.to_string()));
        }
        warn!("Requested device '{}' not found, falling back to default device", name);
    }

    let dev = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No default output device found".to_string()))?;
    let name = dev.name().unwrap_or_else(|_| "Unknown".to_string());
    info!("Using default audio device: {}", name);
    Ok((dev, name))
}

/// Find a device configuration playing `format` natively.
///
/// Prefers f32, then i16, then u16 output.
fn matching_config(device: &Device, name: &str, format: &WaveFormat) -> Result<(StreamConfig, SampleFormat)> {
    let supported: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to get device configs: {}", e)))?
        .filter(|c| {
            c.channels() == format.channels
                && c.min_sample_rate().0 <= format.sample_rate
                && c.max_sample_rate().0 >= format.sample_rate
        })
        .collect();

    for preferred in [SampleFormat::F32, SampleFormat::I16, SampleFormat::U16] {
        if let Some(range) = supported.iter().find(|c| c.sample_format() == preferred) {
            let config = range
                .clone()
                .with_sample_rate(cpal::SampleRate(format.sample_rate))
                .config();
            return Ok((config, preferred));
        }
    }

    Err(Error::BadFormat(format!("device '{}' cannot play {}", name, format)))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut consumer: HeapCons<u8>,
    format: WaveFormat,
    shared: &Arc<CallbackShared>,
) -> Result<Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let bytes_per_sample = usize::from(format.bits_per_sample / 8);
    let channels = usize::from(format.channels);
    let callback_shared = Arc::clone(shared);
    let error_shared = Arc::clone(shared);
    let mut frame = vec![0u8; format.block_align() as usize];
    let mut skipped = [0u8; 256];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut consumed = callback_shared.consumed.load(Ordering::Relaxed);

                // Bytes discarded by a reset are dropped, not played
                let discard_until = callback_shared.discard_until.load(Ordering::Acquire);
                let behind = discard_until.saturating_sub(consumed);
                consumed += discard(&mut consumer, behind, frame.len(), &mut skipped);

                let (played, starved) =
                    fill_frames(&mut consumer, data, &mut frame, channels, bytes_per_sample);
                consumed += played;

                callback_shared.consumed.store(consumed, Ordering::Release);
                if starved {
                    callback_shared.underruns.fetch_add(1, Ordering::Relaxed);
                }
            },
            move |err| {
                error!("Audio stream error: {}", err);
                error_shared.stream_error.store(true, Ordering::SeqCst);
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {}", e)))
}

/// Drop up to `bytes` queued bytes. A shortfall is rounded down to whole
/// frames so playback resumes on a frame boundary.
fn discard<C>(consumer: &mut C, bytes: u64, frame: usize, scratch: &mut [u8]) -> u64
where
    C: Consumer<Item = u8>,
{
    let available = consumer.occupied_len() as u64;
    let mut remaining = if bytes <= available {
        bytes
    } else {
        available - available % frame as u64
    };

    let mut dropped = 0;
    while remaining > 0 {
        let want = (remaining as usize).min(scratch.len());
        let popped = consumer.pop_slice(&mut scratch[..want]);
        if popped == 0 {
            break;
        }
        remaining -= popped as u64;
        dropped += popped as u64;
    }
    dropped
}

/// Fill `data` frame by frame. Only whole frames are taken from the ring;
/// when one is not available the rest of the output is silence and the
/// partial frame waits for the next callback.
///
/// Returns the bytes consumed and whether the ring ran dry.
fn fill_frames<C, T>(
    consumer: &mut C,
    data: &mut [T],
    frame: &mut [u8],
    channels: usize,
    bytes_per_sample: usize,
) -> (u64, bool)
where
    C: Consumer<Item = u8>,
    T: SizedSample + FromSample<f32>,
{
    let mut consumed = 0;
    let mut starved = false;
    for out in data.chunks_mut(channels) {
        if !starved && consumer.occupied_len() >= frame.len() {
            consumer.pop_slice(frame);
            consumed += frame.len() as u64;
            for (sample, bytes) in out.iter_mut().zip(frame.chunks(bytes_per_sample)) {
                *sample = T::from_sample(decode_sample(bytes));
            }
        } else {
            starved = true;
            out.fill(<T as Sample>::EQUILIBRIUM);
        }
    }
    (consumed, starved)
}

/// Convert one little-endian PCM sample to f32 in [-1.0, 1.0).
///
/// 8-bit PCM is unsigned; wider samples are signed.
fn decode_sample(bytes: &[u8]) -> f32 {
    match bytes.len() {
        1 => (f32::from(bytes[0]) - 128.0) / 128.0,
        2 => f32::from(i16::from_le_bytes([bytes[0], bytes[1]])) / 32_768.0,
        3 => {
            let value = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
            value as f32 / 8_388_608.0
        }
        4 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / 2_147_483_648.0,
        _ => 0.0,
    }
}
