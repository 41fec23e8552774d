pub mod hw;

pub use hw::asio::{
    AsioSink, AudioFormat, DataFormat, DeviceInfo, SampleType, SinkError, SinkState,
    enumerate_devices,
};
pub use hw::options::SinkOptions;
