use super::convert::{Codec, fill_silence};
use super::dispatch::{CALLBACKS, Dispatcher};
use super::error::SinkError;
use super::ring::{PlaneWriter, plane_ring};
use super::sample::{DataFormat, SampleType};
use super::slot::{self, SlotClaim};
use super::sys::{AsioDriver, AsioError, BufferInfo, DriverHost, IoFormat};
use crate::hw::error_fmt::asio_error;
use crate::hw::options::SinkOptions;
use std::ptr::NonNull;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: usize,
    pub data_format: DataFormat,
    /// Bytes per interleaved input frame. Written by `initialize`.
    pub frame_size: usize,
    /// Frames upstream should deliver per `add_packets` call. Written by
    /// `initialize`.
    pub frames: usize,
}

impl AudioFormat {
    pub fn new(sample_rate: u32, channels: usize, data_format: DataFormat) -> Self {
        Self {
            sample_rate,
            channels,
            data_format,
            frame_size: channels * data_format.bytes(),
            frames: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Uninitialized,
    Negotiating,
    Running,
    Stopped,
    Closed,
}

struct HostLease {
    host: Arc<dyn DriverHost>,
}

impl HostLease {
    fn acquire(host: &Arc<dyn DriverHost>) -> Result<Self, AsioError> {
        host.acquire()?;
        Ok(Self {
            host: Arc::clone(host),
        })
    }
}

impl Drop for HostLease {
    fn drop(&mut self) {
        self.host.release();
    }
}

/// Stops the clock and disposes buffers before the driver is released.
struct DriverGuard {
    driver: Box<dyn AsioDriver>,
    buffers: bool,
    running: bool,
}

impl DriverGuard {
    fn start(&mut self) -> Result<(), AsioError> {
        if !self.running {
            self.driver.start()?;
            self.running = true;
        }
        Ok(())
    }

    fn stop(&mut self) {
        if !self.running {
            return;
        }
        if let Err(code) = self.driver.stop() {
            warn!("{}", asio_error("stop", code.code()));
        }
        self.running = false;
    }
}

impl Drop for DriverGuard {
    fn drop(&mut self) {
        self.stop();
        if self.buffers {
            if let Err(code) = self.driver.dispose_buffers() {
                warn!("{}", asio_error("disposeBuffers", code.code()));
            }
            self.buffers = false;
        }
    }
}

// Field order is teardown order.
struct Session {
    driver: DriverGuard,
    _claim: SlotClaim,
    writer: PlaneWriter,
    _lease: HostLease,
    codec: Codec,
    scratch: Vec<u8>,
    input: AudioFormat,
    device: String,
    planes: usize,
    sample_type: SampleType,
    sample_size: usize,
    period_frames: usize,
    bytes_per_sec: usize,
    underruns: Arc<AtomicU64>,
}

impl Session {
    fn add_packets(&mut self, src: &[u8], frames: usize, offset: usize) -> usize {
        let channels = self.input.channels;
        let frame_bytes = channels * self.codec.src_bytes();
        if frame_bytes == 0 {
            return 0;
        }
        let Some(src) = src.get(offset.saturating_mul(frame_bytes)..) else {
            return 0;
        };
        let frames = frames
            .min(src.len() / frame_bytes)
            .min(self.writer.write_size() / self.sample_size);
        if frames == 0 {
            return 0;
        }
        self.scratch.resize(frames * self.sample_size, 0);
        for plane in 0..self.planes {
            if plane < channels {
                self.codec
                    .deinterleave(&mut self.scratch, src, plane, channels, frames);
            } else {
                fill_silence(&mut self.scratch, self.sample_type, frames);
            }
            self.writer.write(&self.scratch, plane);
        }
        frames
    }

    fn duration_of(&self, bytes: usize) -> Duration {
        if self.bytes_per_sec == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(bytes as f64 / self.bytes_per_sec as f64)
    }
}

/// Output sink bound to one driver.
///
/// Only one sink per process can be initialized at a time because the
/// driver callbacks carry no context pointer.
pub struct AsioSink {
    host: Arc<dyn DriverHost>,
    options: SinkOptions,
    state: SinkState,
    session: Option<Session>,
}

impl AsioSink {
    pub fn new(host: Arc<dyn DriverHost>) -> Self {
        Self::with_options(host, SinkOptions::default())
    }

    pub fn with_options(host: Arc<dyn DriverHost>, options: SinkOptions) -> Self {
        Self {
            host,
            options,
            state: SinkState::Uninitialized,
            session: None,
        }
    }

    /// Open `device`, negotiate `format` and start the driver clock.
    ///
    /// On success `format.frame_size` and `format.frames` are updated. On
    /// failure everything acquired so far is released again.
    pub fn initialize(&mut self, format: &mut AudioFormat, device: &str) -> Result<(), SinkError> {
        if self.session.is_some() {
            return Err(SinkError::AlreadyInitialized);
        }
        self.state = SinkState::Negotiating;
        match self.open_session(format, device) {
            Ok(session) => {
                info!(
                    "ASIO '{}' running: {} Hz, {} planes of {}, period {} frames, ring {} bytes per plane",
                    device,
                    format.sample_rate,
                    session.planes,
                    session.sample_type,
                    session.period_frames,
                    session.writer.max_size()
                );
                self.session = Some(session);
                self.state = SinkState::Running;
                Ok(())
            }
            Err(e) => {
                error!("ASIO initialize of '{device}' failed: {e}");
                self.state = SinkState::Uninitialized;
                Err(e)
            }
        }
    }

    fn open_session(&self, format: &mut AudioFormat, device: &str) -> Result<Session, SinkError> {
        let options = self.options.normalized();
        let open_error = |code| SinkError::DriverOpen {
            device: device.to_string(),
            code,
        };

        let lease = HostLease::acquire(&self.host).map_err(open_error)?;
        let mut claim = slot::claim().ok_or(SinkError::InstanceActive)?;
        let mut driver = DriverGuard {
            driver: self.host.open(device).map_err(open_error)?,
            buffers: false,
            running: false,
        };
        debug!("Opened ASIO driver '{}'", driver.driver.name());

        let dsd = format.sample_rate >= options.dsd_min_sample_rate;
        if dsd {
            driver
                .driver
                .set_io_format(IoFormat::Dsd)
                .map_err(SinkError::ModeUnsupported)?;
        }

        let requested = format.sample_rate;
        let unsupported_rate = |code| SinkError::UnsupportedRate {
            rate: requested,
            code,
        };
        let rate = f64::from(requested);
        driver.driver.can_sample_rate(rate).map_err(unsupported_rate)?;
        driver.driver.set_sample_rate(rate).map_err(unsupported_rate)?;

        let counts = driver
            .driver
            .channels()
            .map_err(SinkError::negotiation("getChannels"))?;
        if counts.outputs == 0 {
            return Err(SinkError::negotiation("getChannels")(AsioError::NOT_PRESENT));
        }
        let planes = counts.outputs;

        let sizes = driver
            .driver
            .buffer_sizes()
            .map_err(SinkError::negotiation("getBufferSize"))?;
        let period_frames = sizes.preferred;
        if period_frames == 0 {
            return Err(SinkError::negotiation("getBufferSize")(AsioError::INVALID_MODE));
        }
        debug!(
            "ASIO channels {} in / {} out, buffer sizes {}..{} preferred {}",
            counts.inputs, counts.outputs, sizes.min, sizes.max, sizes.preferred
        );

        let sample_type = driver
            .driver
            .channel_info(0, false)
            .map_err(SinkError::negotiation("getChannelInfo"))?
            .sample_type;
        let encoding_error = SinkError::UnsupportedEncoding {
            format: format.data_format,
            sample_type,
        };
        if sample_type.bits() == 0 {
            return Err(encoding_error);
        }
        let codec = Codec::new(format.data_format, sample_type).map_err(|_| encoding_error)?;

        let mut infos: Vec<BufferInfo> = (0..planes).map(BufferInfo::output).collect();
        driver
            .driver
            .create_buffers(&mut infos, period_frames, &CALLBACKS)
            .map_err(SinkError::BufferAlloc)?;
        driver.buffers = true;
        let buffers = infos
            .iter()
            .map(|info| {
                Some([
                    NonNull::new(info.buffers[0].cast::<u8>())?,
                    NonNull::new(info.buffers[1].cast::<u8>())?,
                ])
            })
            .collect::<Option<Vec<_>>>()
            .ok_or(SinkError::BufferAlloc(AsioError::NO_MEMORY))?;

        format.frame_size = format.channels * format.data_format.bits() as usize / 8;
        let dsd_packing = if dsd { 8 } else { 1 };
        format.frames = (requested / dsd_packing / options.chunks_per_second) as usize;

        let sample_size = sample_type.bytes();
        let bytes_per_sec = requested as usize * sample_type.bits() as usize / 8;
        let chunk_bytes = bytes_per_sec / options.chunks_per_second as usize;
        let period_bytes = period_frames * sample_size;
        let capacity = options
            .buffer_periods
            .saturating_mul(chunk_bytes.max(period_bytes));
        let capacity = capacity - capacity % sample_size;
        let (writer, reader) = plane_ring(capacity, planes).map_err(|_| SinkError::Allocation {
            bytes: capacity.saturating_mul(planes),
        })?;
        let mut scratch = Vec::new();
        scratch
            .try_reserve_exact(chunk_bytes.max(period_bytes))
            .map_err(|_| SinkError::Allocation {
                bytes: chunk_bytes.max(period_bytes),
            })?;

        let underruns = Arc::new(AtomicU64::new(0));
        // SAFETY: the driver keeps both halves alive until dispose_buffers,
        // which runs after the clock is stopped and before the dispatcher
        // is dropped.
        let dispatcher = unsafe {
            Dispatcher::new(
                reader,
                buffers,
                sample_type,
                period_frames,
                Arc::clone(&underruns),
            )
        };
        claim.install(Box::new(dispatcher));
        driver.start().map_err(SinkError::negotiation("start"))?;

        Ok(Session {
            driver,
            _claim: claim,
            writer,
            _lease: lease,
            codec,
            scratch,
            input: *format,
            device: device.to_string(),
            planes,
            sample_type,
            sample_size,
            period_frames,
            bytes_per_sec,
            underruns,
        })
    }

    /// Stop the clock and release the driver and host. Safe to call in any
    /// state and more than once.
    pub fn deinitialize(&mut self) {
        if let Some(session) = self.session.take() {
            debug!("ASIO deinitialize '{}'", session.device);
            drop(session);
            self.state = SinkState::Closed;
        }
    }

    pub fn stop(&mut self) {
        let Some(session) = self.session.as_mut() else {
            warn!("ASIO stop requested without an open driver");
            return;
        };
        session.driver.stop();
        self.state = SinkState::Stopped;
    }

    /// Restart the clock of a stopped or drained sink.
    pub fn start(&mut self) -> Result<(), SinkError> {
        let session = self.session.as_mut().ok_or(SinkError::NotInitialized)?;
        session
            .driver
            .start()
            .map_err(SinkError::negotiation("start"))?;
        self.state = SinkState::Running;
        Ok(())
    }

    /// Stop playback and discard everything queued.
    pub fn drain(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.driver.stop();
        session.writer.dump();
        self.state = SinkState::Stopped;
    }

    /// Queue up to `frames` interleaved frames from `data[0]`, starting
    /// `offset` frames in. Returns the number of frames taken, which is
    /// limited by free ring space.
    pub fn add_packets(&mut self, data: &[&[u8]], frames: usize, offset: usize) -> usize {
        let (Some(session), Some(src)) = (self.session.as_mut(), data.first()) else {
            return 0;
        };
        session.add_packets(src, frames, offset)
    }

    /// Playback time currently queued in the ring.
    pub fn delay(&self) -> Duration {
        self.session
            .as_ref()
            .map_or(Duration::ZERO, |s| s.duration_of(s.writer.read_size()))
    }

    /// Playback time the ring can hold.
    pub fn cache_total(&self) -> Duration {
        self.session
            .as_ref()
            .map_or(Duration::ZERO, |s| s.duration_of(s.writer.max_size()))
    }

    pub fn state(&self) -> SinkState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_running(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.driver.running)
    }

    pub fn plane_count(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.planes)
    }

    pub fn period_frames(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.period_frames)
    }

    pub fn sample_type(&self) -> Option<SampleType> {
        self.session.as_ref().map(|s| s.sample_type)
    }

    pub fn sample_size(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.sample_size)
    }

    /// Bytes per second per plane at the negotiated rate.
    pub fn bytes_per_second(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.bytes_per_sec)
    }

    /// Driver periods answered with silence because the ring ran short.
    pub fn underruns(&self) -> u64 {
        self.session
            .as_ref()
            .map_or(0, |s| s.underruns.load(Ordering::Relaxed))
    }

    pub fn options(&self) -> SinkOptions {
        self.options
    }
}

impl Drop for AsioSink {
    fn drop(&mut self) {
        self.deinitialize();
    }
}
