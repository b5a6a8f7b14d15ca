//! Command-line player (waveout-play)
//!
//! Plays a WAV file, or a generated test tone, through the buffered playback
//! engine. The audio is cut into fixed-length buffers that are all submitted
//! up front; the player exits once every buffer has been reported `Done`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use waveout_common::config::ConfigResolver;
use waveout_player::device::{list_devices, CpalSink};
use waveout_player::{NullSink, OutputEvent, TimeFormat, WaveBuffer, WaveFormat, WaveOutDevice};

/// Command-line arguments for waveout-play
#[derive(Parser, Debug)]
#[command(name = "waveout-play")]
#[command(about = "Buffered PCM player")]
#[command(version)]
struct Args {
    /// WAV file to play (a test tone is generated when omitted)
    input: Option<PathBuf>,

    /// Test tone frequency in Hz
    #[arg(long, default_value = "440")]
    tone_hz: f32,

    /// Test tone length in seconds
    #[arg(long, default_value = "2.0")]
    seconds: f32,

    /// Length of each submitted buffer in milliseconds
    #[arg(long, default_value = "100")]
    buffer_ms: u32,

    /// Play the whole input this many times as one loop region
    #[arg(long, default_value = "1")]
    loops: u32,

    /// Use the clocked null device instead of a sound card
    #[arg(long)]
    null: bool,

    /// Output device name (overrides the config file)
    #[arg(short, long)]
    device: Option<String>,

    /// Configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print events as JSON lines on stdout
    #[arg(long)]
    json_events: bool,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ConfigResolver::new(args.config.clone())
        .load()
        .context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "waveout_player={level},waveout_common={level}",
                    level = config.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if args.list_devices {
        for name in list_devices()? {
            println!("{}", name);
        }
        return Ok(());
    }

    let (format, pcm) = match &args.input {
        Some(path) => load_wav(path)?,
        None => {
            let format = WaveFormat::cd_quality();
            (format, tone(&format, args.tone_hz, args.seconds))
        }
    };
    if pcm.is_empty() {
        bail!("Nothing to play");
    }

    let buffers = split_into_buffers(&format, &pcm, args.buffer_ms, args.loops);
    info!(
        "Playing {} bytes of {} as {} buffers ({} passes)",
        pcm.len(),
        format,
        buffers.len(),
        args.loops.max(1)
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<OutputEvent>();
    let device_name = args.device.clone().or_else(|| config.device.clone());
    let buffer_bytes = config.device_buffer_bytes(&format);

    // Stream guard must stay on this thread for the lifetime of playback
    let (device, stream) = if args.null {
        let sink = NullSink::new(format, buffer_bytes);
        (WaveOutDevice::open(format, sink, tx, &config)?, None)
    } else {
        let (sink, stream) = CpalSink::open(format, device_name.as_deref(), buffer_bytes)?;
        info!("Output device: {}", stream.device_name());
        (WaveOutDevice::open(format, sink, tx, &config)?, Some(stream))
    };

    for buffer in &buffers {
        device.submit(buffer)?;
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut done = 0;
    let mut interrupted = false;
    while done < buffers.len() {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else { break };
                if matches!(event, OutputEvent::Done { .. }) {
                    done += 1;
                }
                report(&event, args.json_events)?;
            }
            _ = &mut shutdown => {
                interrupted = true;
                break;
            }
        }
    }

    if interrupted {
        warn!("Interrupted after {} of {} buffers", done, buffers.len());
        device.reset()?;
    }

    let position = device.position_in(TimeFormat::Millis)?;
    info!("Played {}", position);
    if let Some(stream) = &stream {
        let underruns = stream.underruns();
        if underruns > 0 {
            warn!("{} audio callbacks ran out of data", underruns);
        }
    }

    device.close()?;
    while let Ok(event) = rx.try_recv() {
        report(&event, args.json_events)?;
    }
    Ok(())
}

fn report(event: &OutputEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        info!("{} event on device {}", event.event_type(), event.device_id());
    }
    Ok(())
}

/// Read a PCM WAV file into little-endian interleaved bytes.
fn load_wav(path: &Path) -> Result<(WaveFormat, Vec<u8>)> {
    let mut reader = hound::WavReader::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int {
        bail!("Only integer PCM WAV files are supported");
    }

    let format = WaveFormat::new(spec.sample_rate, spec.channels, spec.bits_per_sample);
    format.validate()?;

    let mut pcm = Vec::with_capacity(reader.len() as usize * usize::from(spec.bits_per_sample / 8));
    match spec.bits_per_sample {
        8 => {
            // hound yields 8-bit samples as signed; PCM stores them unsigned
            for sample in reader.samples::<i8>() {
                pcm.push((i16::from(sample?) + 128) as u8);
            }
        }
        16 => {
            for sample in reader.samples::<i16>() {
                pcm.extend_from_slice(&sample?.to_le_bytes());
            }
        }
        24 => {
            for sample in reader.samples::<i32>() {
                pcm.extend_from_slice(&sample?.to_le_bytes()[..3]);
            }
        }
        32 => {
            for sample in reader.samples::<i32>() {
                pcm.extend_from_slice(&sample?.to_le_bytes());
            }
        }
        bits => bail!("Unsupported bits per sample: {}", bits),
    }

    Ok((format, pcm))
}

/// Generate a 16-bit sine tone at half amplitude.
fn tone(format: &WaveFormat, hz: f32, seconds: f32) -> Vec<u8> {
    let frames = (format.sample_rate as f32 * seconds.max(0.0)) as usize;
    let mut pcm = Vec::with_capacity(frames * format.block_align() as usize);
    for n in 0..frames {
        let phase = 2.0 * std::f32::consts::PI * hz * n as f32 / format.sample_rate as f32;
        let sample = (phase.sin() * 0.5 * f32::from(i16::MAX)) as i16;
        for _ in 0..format.channels {
            pcm.extend_from_slice(&sample.to_le_bytes());
        }
    }
    pcm
}

/// Cut `pcm` into frame-aligned buffers of `buffer_ms`. With more than one
/// pass the whole sequence becomes a single loop region.
fn split_into_buffers(format: &WaveFormat, pcm: &[u8], buffer_ms: u32, loops: u32) -> Vec<Arc<WaveBuffer>> {
    let chunk = format
        .duration_to_bytes(std::time::Duration::from_millis(u64::from(buffer_ms.max(1))))
        .max(u64::from(format.block_align())) as usize;

    let chunks: Vec<&[u8]> = pcm.chunks(chunk).collect();
    let last = chunks.len().saturating_sub(1);
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, data)| {
            let buffer = WaveBuffer::new(data.to_vec());
            let buffer = if loops > 1 {
                buffer.with_loop(i == 0, i == last, loops)
            } else {
                buffer
            };
            Arc::new(buffer)
        })
        .collect()
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping playback");
        },
        _ = terminate => {
            info!("Received terminate signal, stopping playback");
        },
    }
}
