//! In-process driver and host.
//!
//! [`SimDriver`] owns real double buffers and either runs a clock thread that
//! calls back once per period or waits for [`SimHandle::tick`]. Every
//! negotiation step can be made to fail through
//! [`SimDriverConfig::fail_at`].

use super::sample::SampleType;
use super::sys::{
    AsioDriver, AsioError, AsioTime, BufferInfo, BufferSizes, Callbacks, ChannelCounts,
    ChannelInfo, DriverEntry, DriverHost, IoFormat,
};
use serde::{Deserialize, Serialize};
use std::os::raw::c_void;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimStep {
    Open,
    SetIoFormat,
    CanSampleRate,
    SetSampleRate,
    Channels,
    BufferSizes,
    ChannelInfo,
    CreateBuffers,
    Start,
    Stop,
    DisposeBuffers,
}

impl SimStep {
    fn error(self) -> AsioError {
        match self {
            SimStep::Open => AsioError::NOT_PRESENT,
            SimStep::SetIoFormat => AsioError::INVALID_MODE,
            SimStep::CanSampleRate | SimStep::SetSampleRate => AsioError::NO_CLOCK,
            SimStep::CreateBuffers => AsioError::NO_MEMORY,
            _ => AsioError::HW_MALFUNCTION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimDriverConfig {
    pub id: String,
    pub name: String,
    pub input_channels: usize,
    pub output_channels: usize,
    pub min_period: usize,
    pub max_period: usize,
    pub preferred_period: usize,
    pub sample_rates: Vec<u32>,
    pub sample_type: SampleType,
    /// Channel type while in DSD mode; `None` rejects the DSD io format.
    pub dsd_sample_type: Option<SampleType>,
    pub dsd_sample_rates: Vec<u32>,
    /// Call back from a clock thread once per period while started.
    pub clock: bool,
    /// Deliver periods through bufferSwitchTimeInfo.
    pub time_info: bool,
    pub fail_at: Option<SimStep>,
}

impl Default for SimDriverConfig {
    fn default() -> Self {
        Self {
            id: "sim".to_string(),
            name: "Simulated ASIO".to_string(),
            input_channels: 0,
            output_channels: 2,
            min_period: 32,
            max_period: 4096,
            preferred_period: 512,
            sample_rates: vec![44_100, 48_000, 88_200, 96_000, 176_400, 192_000],
            sample_type: SampleType::FLOAT32_LSB,
            dsd_sample_type: None,
            dsd_sample_rates: vec![2_822_400, 5_644_800],
            clock: true,
            time_info: false,
            fail_at: None,
        }
    }
}

struct SimState {
    io_format: IoFormat,
    sample_rate: f64,
    buffers: Vec<[Vec<u8>; 2]>,
    period: usize,
    callbacks: Option<&'static Callbacks>,
    running: bool,
    next_half: usize,
    switches: u64,
    time: AsioTime,
}

struct SimShared {
    config: SimDriverConfig,
    state: Mutex<SimState>,
}

impl SimShared {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sample_type(&self, state: &SimState) -> SampleType {
        match state.io_format {
            IoFormat::Dsd => self
                .config
                .dsd_sample_type
                .unwrap_or(self.config.sample_type),
            IoFormat::Pcm => self.config.sample_type,
        }
    }

    fn tick(&self) -> Option<usize> {
        let (callbacks, half, mut time) = {
            let mut state = self.lock();
            if !state.running {
                return None;
            }
            let callbacks = state.callbacks?;
            let half = state.next_half;
            state.next_half ^= 1;
            state.switches += 1;
            state.time.time_info.sample_rate = state.sample_rate;
            state.time.time_info.sample_position += state.period as u64;
            (callbacks, half, state.time)
        };
        // the lock is released so `stop` can wait for this callback
        unsafe {
            if self.config.time_info {
                (callbacks.buffer_switch_time_info)(&mut time, half as i32, 1);
            } else {
                (callbacks.buffer_switch)(half as i32, 1);
            }
        }
        Some(half)
    }
}

/// Test-side view of an opened [`SimDriver`].
#[derive(Clone)]
pub struct SimHandle {
    shared: Arc<SimShared>,
}

impl SimHandle {
    /// Deliver one period to the registered callbacks. Returns the buffer
    /// half that was switched, or `None` when the driver is not started.
    pub fn tick(&self) -> Option<usize> {
        self.shared.tick()
    }

    pub fn output(&self, plane: usize, half: usize) -> Vec<u8> {
        self.shared
            .lock()
            .buffers
            .get(plane)
            .and_then(|halves| halves.get(half))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().running
    }

    pub fn has_buffers(&self) -> bool {
        !self.shared.lock().buffers.is_empty()
    }

    pub fn switches(&self) -> u64 {
        self.shared.lock().switches
    }

    pub fn io_format(&self) -> IoFormat {
        self.shared.lock().io_format
    }

    pub fn sample_rate(&self) -> f64 {
        self.shared.lock().sample_rate
    }

    pub fn period(&self) -> usize {
        self.shared.lock().period
    }

    pub fn config(&self) -> &SimDriverConfig {
        &self.shared.config
    }
}

pub struct SimDriver {
    shared: Arc<SimShared>,
    clock: Option<JoinHandle<()>>,
    live: Arc<AtomicUsize>,
}

impl SimDriver {
    fn new(config: SimDriverConfig, live: Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        let sample_rate = config.sample_rates.first().copied().unwrap_or(48_000);
        let shared = Arc::new(SimShared {
            config,
            state: Mutex::new(SimState {
                io_format: IoFormat::Pcm,
                sample_rate: f64::from(sample_rate),
                buffers: Vec::new(),
                period: 0,
                callbacks: None,
                running: false,
                next_half: 0,
                switches: 0,
                time: AsioTime::zeroed(),
            }),
        });
        Self {
            shared,
            clock: None,
            live,
        }
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn check(&self, step: SimStep) -> Result<(), AsioError> {
        match self.shared.config.fail_at {
            Some(fail) if fail == step => Err(step.error()),
            _ => Ok(()),
        }
    }

    fn supports_rate(&self, state: &SimState, rate: f64) -> bool {
        let rates = match state.io_format {
            IoFormat::Pcm => &self.shared.config.sample_rates,
            IoFormat::Dsd => &self.shared.config.dsd_sample_rates,
        };
        rates.iter().any(|&r| f64::from(r) == rate)
    }

    fn halt_clock(&mut self) {
        self.shared.lock().running = false;
        if let Some(clock) = self.clock.take() {
            if clock.join().is_err() {
                tracing::warn!("Simulated ASIO clock thread panicked");
            }
        }
    }
}

fn period_duration(period: usize, sample_rate: f64) -> Duration {
    if sample_rate <= 0.0 {
        return Duration::from_millis(10);
    }
    Duration::from_secs_f64(period as f64 / sample_rate)
}

impl AsioDriver for SimDriver {
    fn name(&self) -> String {
        self.shared.config.name.clone()
    }

    fn can_sample_rate(&mut self, rate: f64) -> Result<(), AsioError> {
        self.check(SimStep::CanSampleRate)?;
        if self.supports_rate(&self.shared.lock(), rate) {
            Ok(())
        } else {
            Err(AsioError::NO_CLOCK)
        }
    }

    fn set_sample_rate(&mut self, rate: f64) -> Result<(), AsioError> {
        self.check(SimStep::SetSampleRate)?;
        let mut state = self.shared.lock();
        if !self.supports_rate(&state, rate) {
            return Err(AsioError::NO_CLOCK);
        }
        state.sample_rate = rate;
        Ok(())
    }

    fn sample_rate(&mut self) -> Result<f64, AsioError> {
        Ok(self.shared.lock().sample_rate)
    }

    fn channels(&mut self) -> Result<ChannelCounts, AsioError> {
        self.check(SimStep::Channels)?;
        Ok(ChannelCounts {
            inputs: self.shared.config.input_channels,
            outputs: self.shared.config.output_channels,
        })
    }

    fn buffer_sizes(&mut self) -> Result<BufferSizes, AsioError> {
        self.check(SimStep::BufferSizes)?;
        let config = &self.shared.config;
        Ok(BufferSizes {
            min: config.min_period,
            max: config.max_period,
            preferred: config.preferred_period,
            granularity: -1,
        })
    }

    fn channel_info(&mut self, channel: usize, is_input: bool) -> Result<ChannelInfo, AsioError> {
        self.check(SimStep::ChannelInfo)?;
        let config = &self.shared.config;
        let count = if is_input {
            config.input_channels
        } else {
            config.output_channels
        };
        if channel >= count {
            return Err(AsioError::INVALID_PARAMETER);
        }
        let state = self.shared.lock();
        Ok(ChannelInfo {
            channel,
            is_input,
            is_active: !state.buffers.is_empty(),
            group: 0,
            sample_type: self.shared.sample_type(&state),
            name: format!("{} {}", if is_input { "In" } else { "Out" }, channel + 1),
        })
    }

    fn set_io_format(&mut self, format: IoFormat) -> Result<(), AsioError> {
        self.check(SimStep::SetIoFormat)?;
        if format == IoFormat::Dsd && self.shared.config.dsd_sample_type.is_none() {
            return Err(AsioError::NOT_PRESENT);
        }
        let mut state = self.shared.lock();
        if !state.buffers.is_empty() {
            return Err(AsioError::INVALID_MODE);
        }
        state.io_format = format;
        Ok(())
    }

    fn create_buffers(
        &mut self,
        infos: &mut [BufferInfo],
        period: usize,
        callbacks: &'static Callbacks,
    ) -> Result<(), AsioError> {
        self.check(SimStep::CreateBuffers)?;
        let config = &self.shared.config;
        if period < config.min_period || period > config.max_period {
            return Err(AsioError::INVALID_MODE);
        }
        let valid = infos.iter().all(|info| {
            let count = if info.is_input != 0 {
                config.input_channels
            } else {
                config.output_channels
            };
            usize::try_from(info.channel_num).is_ok_and(|ch| ch < count)
        });
        if !valid {
            return Err(AsioError::INVALID_PARAMETER);
        }
        let mut state = self.shared.lock();
        if !state.buffers.is_empty() {
            return Err(AsioError::INVALID_MODE);
        }
        let bytes = period * self.shared.sample_type(&state).bytes();
        if bytes == 0 {
            return Err(AsioError::INVALID_MODE);
        }
        state.buffers = infos
            .iter()
            .map(|_| [vec![0u8; bytes], vec![0u8; bytes]])
            .collect();
        for (info, halves) in infos.iter_mut().zip(state.buffers.iter_mut()) {
            info.buffers = [
                halves[0].as_mut_ptr() as *mut c_void,
                halves[1].as_mut_ptr() as *mut c_void,
            ];
        }
        state.period = period;
        state.callbacks = Some(callbacks);
        state.next_half = 0;
        Ok(())
    }

    fn dispose_buffers(&mut self) -> Result<(), AsioError> {
        self.check(SimStep::DisposeBuffers)?;
        self.halt_clock();
        let mut state = self.shared.lock();
        if state.buffers.is_empty() {
            return Err(AsioError::INVALID_MODE);
        }
        state.buffers.clear();
        state.callbacks = None;
        Ok(())
    }

    fn start(&mut self) -> Result<(), AsioError> {
        self.check(SimStep::Start)?;
        let interval = {
            let mut state = self.shared.lock();
            if state.buffers.is_empty() {
                return Err(AsioError::INVALID_MODE);
            }
            if state.running {
                return Ok(());
            }
            state.running = true;
            state.next_half = 0;
            period_duration(state.period, state.sample_rate)
        };
        if self.shared.config.clock {
            let shared = Arc::clone(&self.shared);
            let spawned = thread::Builder::new()
                .name("sim-asio-clock".to_string())
                .spawn(move || {
                    loop {
                        thread::sleep(interval);
                        if shared.tick().is_none() {
                            break;
                        }
                    }
                });
            match spawned {
                Ok(clock) => self.clock = Some(clock),
                Err(e) => {
                    tracing::error!("Failed to spawn simulated ASIO clock: {e}");
                    self.shared.lock().running = false;
                    return Err(AsioError::NO_CLOCK);
                }
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AsioError> {
        self.check(SimStep::Stop)?;
        self.halt_clock();
        Ok(())
    }
}

impl Drop for SimDriver {
    fn drop(&mut self) {
        self.halt_clock();
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Driver host backed by a fixed list of [`SimDriverConfig`]s.
pub struct SimHost {
    drivers: Vec<SimDriverConfig>,
    held: AtomicUsize,
    releases: AtomicUsize,
    fail_acquire: AtomicBool,
    live: Arc<AtomicUsize>,
    opened: Mutex<Vec<SimHandle>>,
}

impl SimHost {
    pub fn new(drivers: Vec<SimDriverConfig>) -> Self {
        Self {
            drivers,
            held: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            fail_acquire: AtomicBool::new(false),
            live: Arc::new(AtomicUsize::new(0)),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub fn single(config: SimDriverConfig) -> Self {
        Self::new(vec![config])
    }

    pub fn set_fail_acquire(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::SeqCst);
    }

    /// Outstanding `acquire` calls not yet matched by `release`.
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Drivers opened and not yet dropped.
    pub fn live_drivers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn last_opened(&self) -> Option<SimHandle> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl DriverHost for SimHost {
    fn acquire(&self) -> Result<(), AsioError> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(AsioError::NOT_PRESENT);
        }
        self.held.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&self) {
        let _ = self
            .held
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        self.releases.fetch_add(1, Ordering::SeqCst);
    }

    fn driver_entries(&self) -> Vec<DriverEntry> {
        self.drivers
            .iter()
            .map(|d| DriverEntry {
                id: d.id.clone(),
                name: d.name.clone(),
            })
            .collect()
    }

    fn open(&self, id: &str) -> Result<Box<dyn AsioDriver>, AsioError> {
        let config = self
            .drivers
            .iter()
            .find(|d| d.id == id)
            .ok_or(AsioError::NOT_PRESENT)?;
        if config.fail_at == Some(SimStep::Open) {
            return Err(SimStep::Open.error());
        }
        let driver = SimDriver::new(config.clone(), Arc::clone(&self.live));
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(driver.handle());
        Ok(Box::new(driver))
    }
}
