//! ASIO-style output sink.
//!
//! The producer side ([`AsioSink::add_packets`]) converts interleaved input
//! into the driver's native sample type and queues it per channel in a
//! [`ring`]. The driver clock pulls one period per callback through the
//! [`dispatch::Dispatcher`], falling back to silence when the ring runs dry.

pub mod convert;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod ring;
pub mod sample;
pub mod sim;
pub mod sink;
pub mod slot;
pub mod sys;

pub use self::device::{Channel, DeviceInfo, DeviceType, enumerate_devices};
pub use self::error::SinkError;
pub use self::sample::{DataFormat, SampleKind, SampleType};
pub use self::sink::{AsioSink, AudioFormat, SinkState};
pub use self::sys::{AsioDriver, AsioError, DriverEntry, DriverHost};
