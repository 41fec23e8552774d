//! Driver protocol seen by the sink.
//!
//! Mirrors the IASIO call surface closely enough that a COM-backed
//! implementation can sit behind [`AsioDriver`] without the sink noticing.

use super::sample::SampleType;
use crate::hw::error_fmt::ase_code;
use std::fmt;
use std::os::raw::c_void;

pub const ASE_OK: i32 = 0;
pub const ASE_SUCCESS: i32 = 0x3f48_47a0;

/// Non-success status returned by a driver call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsioError(pub i32);

impl AsioError {
    pub const NOT_PRESENT: Self = Self(-1000);
    pub const HW_MALFUNCTION: Self = Self(-999);
    pub const INVALID_PARAMETER: Self = Self(-998);
    pub const INVALID_MODE: Self = Self(-997);
    pub const SP_NOT_ADVANCING: Self = Self(-996);
    pub const NO_CLOCK: Self = Self(-995);
    pub const NO_MEMORY: Self = Self(-994);

    pub fn code(self) -> i32 {
        self.0
    }
}

impl fmt::Display for AsioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&ase_code(self.0))
    }
}

impl std::error::Error for AsioError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoFormat {
    Pcm,
    Dsd,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelCounts {
    pub inputs: usize,
    pub outputs: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizes {
    pub min: usize,
    pub max: usize,
    pub preferred: usize,
    /// -1 means powers of two between `min` and `max`.
    pub granularity: isize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub channel: usize,
    pub is_input: bool,
    pub is_active: bool,
    pub group: i32,
    pub sample_type: SampleType,
    pub name: String,
}

/// One channel's double buffer, filled in by [`AsioDriver::create_buffers`].
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BufferInfo {
    pub is_input: i32,
    pub channel_num: i32,
    pub buffers: [*mut c_void; 2],
}

impl BufferInfo {
    pub fn output(channel: usize) -> Self {
        Self {
            is_input: 0,
            channel_num: channel as i32,
            buffers: [std::ptr::null_mut(); 2],
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AsioTimeInfo {
    pub speed: f64,
    pub system_time: u64,
    pub sample_position: u64,
    pub sample_rate: f64,
    pub flags: u32,
    pub reserved: [i8; 12],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsioTimeCode {
    pub speed: f64,
    pub time_code_samples: u64,
    pub flags: u32,
    pub future: [i8; 64],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AsioTime {
    pub reserved: [i32; 4],
    pub time_info: AsioTimeInfo,
    pub time_code: AsioTimeCode,
}

impl AsioTime {
    pub const fn zeroed() -> Self {
        Self {
            reserved: [0; 4],
            time_info: AsioTimeInfo {
                speed: 0.0,
                system_time: 0,
                sample_position: 0,
                sample_rate: 0.0,
                flags: 0,
                reserved: [0; 12],
            },
            time_code: AsioTimeCode {
                speed: 0.0,
                time_code_samples: 0,
                flags: 0,
                future: [0; 64],
            },
        }
    }
}

impl Default for AsioTime {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Host entry points registered with `createBuffers`.
///
/// None of them carries a user pointer, so the receiving side has to find
/// its target through process-wide state (see [`super::slot`]).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Callbacks {
    pub buffer_switch: unsafe extern "C" fn(index: i32, direct_process: i32),
    pub sample_rate_did_change: unsafe extern "C" fn(rate: f64),
    pub asio_message:
        unsafe extern "C" fn(selector: i32, value: i32, message: *mut c_void, opt: *mut f64) -> i32,
    pub buffer_switch_time_info:
        unsafe extern "C" fn(params: *mut AsioTime, index: i32, direct_process: i32) -> *mut AsioTime,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks").finish_non_exhaustive()
    }
}

/// An opened driver instance.
///
/// Callbacks registered through [`create_buffers`](Self::create_buffers) must
/// be invoked from one thread at a time, and never after
/// [`stop`](Self::stop) has returned.
pub trait AsioDriver: Send {
    fn name(&self) -> String;
    fn can_sample_rate(&mut self, rate: f64) -> Result<(), AsioError>;
    fn set_sample_rate(&mut self, rate: f64) -> Result<(), AsioError>;
    fn sample_rate(&mut self) -> Result<f64, AsioError>;
    fn channels(&mut self) -> Result<ChannelCounts, AsioError>;
    fn buffer_sizes(&mut self) -> Result<BufferSizes, AsioError>;
    fn channel_info(&mut self, channel: usize, is_input: bool) -> Result<ChannelInfo, AsioError>;
    fn set_io_format(&mut self, format: IoFormat) -> Result<(), AsioError>;
    /// Allocates both halves of every listed channel and stores their
    /// addresses in `infos`. They stay valid until
    /// [`dispose_buffers`](Self::dispose_buffers).
    fn create_buffers(
        &mut self,
        infos: &mut [BufferInfo],
        period: usize,
        callbacks: &'static Callbacks,
    ) -> Result<(), AsioError>;
    fn dispose_buffers(&mut self) -> Result<(), AsioError>;
    fn start(&mut self) -> Result<(), AsioError>;
    fn stop(&mut self) -> Result<(), AsioError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverEntry {
    pub id: String,
    pub name: String,
}

/// Process-wide driver subsystem: the installed driver list and the loader.
pub trait DriverHost: Send + Sync {
    fn acquire(&self) -> Result<(), AsioError>;
    fn release(&self);
    fn driver_entries(&self) -> Vec<DriverEntry>;
    fn open(&self, id: &str) -> Result<Box<dyn AsioDriver>, AsioError>;
}
