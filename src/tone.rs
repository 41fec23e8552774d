use crate::config::Config;
use anyhow::{Context, Result, bail};
use asiosink_engine::hw::asio::DriverHost;
use asiosink_engine::{AsioSink, AudioFormat, DataFormat};
use std::f64::consts::TAU;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const STALL_TIMEOUT: Duration = Duration::from_secs(2);
const MIN_POLL: Duration = Duration::from_millis(1);

/// Append one sample of `value` (nominally in [-1, 1]) encoded as `format`.
pub fn encode(value: f64, format: DataFormat, out: &mut Vec<u8>) -> Result<()> {
    let value = value.clamp(-1.0, 1.0);
    let int = |bits: u32| (value * ((1i64 << (bits - 1)) - 1) as f64).round() as i32;
    match format {
        DataFormat::S16LE => out.extend_from_slice(&(int(16) as i16).to_le_bytes()),
        DataFormat::S16BE => out.extend_from_slice(&(int(16) as i16).to_be_bytes()),
        DataFormat::S24LE3 => out.extend_from_slice(&int(24).to_le_bytes()[..3]),
        DataFormat::S24BE3 => out.extend_from_slice(&int(24).to_be_bytes()[1..]),
        DataFormat::S32LE => out.extend_from_slice(&int(32).to_le_bytes()),
        DataFormat::S32BE => out.extend_from_slice(&int(32).to_be_bytes()),
        DataFormat::Float => out.extend_from_slice(&(value as f32).to_ne_bytes()),
        DataFormat::Double => out.extend_from_slice(&value.to_ne_bytes()),
        DataFormat::U8 | DataFormat::Raw => bail!("cannot synthesize a tone as {format:?}"),
    }
    Ok(())
}

/// Fill `out` with `frames` frames of a sine starting at sample `start`.
pub fn synthesize(
    out: &mut Vec<u8>,
    format: &AudioFormat,
    frequency: f64,
    amplitude: f64,
    start: usize,
    frames: usize,
) -> Result<()> {
    out.clear();
    let step = TAU * frequency / f64::from(format.sample_rate);
    for n in start..start + frames {
        let value = amplitude * (n as f64 * step).sin();
        for _ in 0..format.channels {
            encode(value, format.data_format, out)?;
        }
    }
    Ok(())
}

/// Play `config.seconds` of a sine through `config.device`, blocking while
/// the ring is full.
pub fn play(host: Arc<dyn DriverHost>, config: &Config) -> Result<()> {
    let mut sink = AsioSink::with_options(host, config.sink.with_env_overrides());
    let mut format = AudioFormat::new(config.sample_rate, config.channels, config.format);
    sink.initialize(&mut format, &config.device)
        .with_context(|| format!("opening '{}'", config.device))?;

    let total = (config.seconds.max(0.0) * f64::from(config.sample_rate)) as usize;
    let chunk = format.frames.max(1);
    let poll = (sink.cache_total() / 4).max(MIN_POLL);
    info!(
        "Playing {} Hz for {:.2} s: {} frames in chunks of {}",
        config.frequency, config.seconds, total, chunk
    );

    let mut packet = Vec::with_capacity(chunk * format.frame_size);
    let mut produced = 0;
    while produced < total {
        let frames = chunk.min(total - produced);
        synthesize(
            &mut packet,
            &format,
            config.frequency,
            config.amplitude,
            produced,
            frames,
        )?;
        let mut offset = 0;
        let mut progress = Instant::now();
        while offset < frames {
            let taken = sink.add_packets(&[&packet], frames - offset, offset);
            if taken > 0 {
                offset += taken;
                progress = Instant::now();
                continue;
            }
            if progress.elapsed() > STALL_TIMEOUT {
                bail!("driver stopped consuming audio");
            }
            thread::sleep(poll);
        }
        produced += frames;
        debug!("Queued {produced}/{total} frames, delay {:?}", sink.delay());
    }

    let deadline = Instant::now() + sink.delay() + STALL_TIMEOUT;
    while sink.delay() > Duration::ZERO && Instant::now() < deadline {
        thread::sleep(poll);
    }
    if sink.delay() > Duration::ZERO {
        warn!("Dropping {:?} of unplayed audio", sink.delay());
    }
    info!("Done, {} underrun periods", sink.underruns());
    sink.deinitialize();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use asiosink_engine::hw::asio::sim::SimHost;

    #[test]
    fn encodes_full_scale_per_format() {
        let mut out = Vec::new();
        encode(1.0, DataFormat::S16LE, &mut out).unwrap();
        encode(-1.0, DataFormat::S16BE, &mut out).unwrap();
        encode(1.0, DataFormat::S24LE3, &mut out).unwrap();
        encode(2.0, DataFormat::S24BE3, &mut out).unwrap();
        assert_eq!(
            out,
            [0xFF, 0x7F, 0x80, 0x01, 0xFF, 0xFF, 0x7F, 0x7F, 0xFF, 0xFF]
        );
        assert!(encode(0.0, DataFormat::U8, &mut out).is_err());
    }

    #[test]
    fn sine_repeats_across_channels() {
        let format = AudioFormat::new(48_000, 2, DataFormat::Float);
        let mut out = Vec::new();
        synthesize(&mut out, &format, 12_000.0, 1.0, 0, 4).unwrap();
        let samples: Vec<f32> = out
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(samples.len(), 8);
        assert_eq!(samples[0], samples[1]);
        assert!((samples[2] - 1.0).abs() < 1e-6);
        assert!((samples[6] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn plays_through_simulated_driver() {
        let config = Config {
            seconds: 0.05,
            drivers: vec![asiosink_engine::hw::asio::sim::SimDriverConfig {
                preferred_period: 64,
                ..Default::default()
            }],
            ..Config::default()
        };
        let host = Arc::new(SimHost::new(config.drivers.clone()));
        play(host.clone(), &config).unwrap();
        assert_eq!(host.held(), 0);
        assert_eq!(host.live_drivers(), 0);
    }
}
