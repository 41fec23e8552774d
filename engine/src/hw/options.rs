use super::config::{BUFFER_PERIODS_ENV, env_usize};
use serde::{Deserialize, Serialize};

pub const DSD_MIN_SAMPLE_RATE: u32 = 2_822_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkOptions {
    /// Ring capacity in units of max(one chunk, one driver period).
    pub buffer_periods: usize,
    /// Chunks the upstream delivers per second of audio.
    pub chunks_per_second: u32,
    /// Requested rates at or above this switch the driver into DSD mode.
    pub dsd_min_sample_rate: u32,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            buffer_periods: 3,
            chunks_per_second: 75,
            dsd_min_sample_rate: DSD_MIN_SAMPLE_RATE,
        }
    }
}

impl SinkOptions {
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(periods) = env_usize(BUFFER_PERIODS_ENV) {
            self.buffer_periods = periods;
        }
        self
    }

    pub(crate) fn normalized(self) -> Self {
        Self {
            buffer_periods: self.buffer_periods.max(2),
            chunks_per_second: self.chunks_per_second.max(1),
            dsd_min_sample_rate: self.dsd_min_sample_rate,
        }
    }
}
