use super::sample::{DataFormat, SampleType};
use super::sys::AsioError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sink is already initialized")]
    AlreadyInitialized,
    #[error("sink is not initialized")]
    NotInitialized,
    #[error("another sink in this process owns the driver callbacks")]
    InstanceActive,
    #[error("cannot open ASIO driver '{device}': {code}")]
    DriverOpen { device: String, code: AsioError },
    #[error("driver rejected DSD io format: {0}")]
    ModeUnsupported(AsioError),
    #[error("sample rate {rate} Hz not supported: {code}")]
    UnsupportedRate { rate: u32, code: AsioError },
    #[error("driver {operation} failed: {code}")]
    Negotiation {
        operation: &'static str,
        code: AsioError,
    },
    #[error("cannot feed {format:?} input to driver sample type {sample_type}")]
    UnsupportedEncoding {
        format: DataFormat,
        sample_type: SampleType,
    },
    #[error("driver buffer allocation failed: {0}")]
    BufferAlloc(AsioError),
    #[error("ring buffer allocation of {bytes} bytes failed")]
    Allocation { bytes: usize },
}

impl SinkError {
    pub(crate) fn negotiation(operation: &'static str) -> impl FnOnce(AsioError) -> Self {
        move |code| SinkError::Negotiation { operation, code }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_driver_codes() {
        let err = SinkError::negotiation("getBufferSize")(AsioError::NOT_PRESENT);
        assert_eq!(
            err.to_string(),
            "driver getBufferSize failed: ASE_NotPresent (-1000)"
        );
        let err = SinkError::UnsupportedEncoding {
            format: DataFormat::U8,
            sample_type: SampleType::INT16_LSB,
        };
        assert_eq!(
            err.to_string(),
            "cannot feed U8 input to driver sample type Int16LSB"
        );
    }
}
