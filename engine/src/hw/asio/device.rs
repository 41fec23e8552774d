use super::sample::DataFormat;
use super::sys::{AsioDriver, DriverHost, IoFormat};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Channel {
    FrontLeft,
    FrontRight,
    FrontCenter,
    Lfe,
    BackLeft,
    BackRight,
    SideLeft,
    SideRight,
}

/// Speaker order used to label driver output channels.
pub const CHANNEL_ORDER: [Channel; 8] = [
    Channel::FrontLeft,
    Channel::FrontRight,
    Channel::FrontCenter,
    Channel::Lfe,
    Channel::BackLeft,
    Channel::BackRight,
    Channel::SideLeft,
    Channel::SideRight,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeviceType {
    Pcm,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub id: String,
    pub display_name: String,
    pub device_type: DeviceType,
    pub wants_iec_passthrough: bool,
    pub channels: Vec<Channel>,
    pub sample_rates: Vec<u32>,
    pub data_formats: Vec<DataFormat>,
}

const BASE_RATES: [u32; 2] = [44_100, 48_000];
const RATE_DOUBLINGS: u32 = 5;
const DSD_RATE_FACTOR: u32 = 64;

fn probe_rates(driver: &mut dyn AsioDriver, factor: u32, out: &mut Vec<u32>) {
    for base in BASE_RATES {
        for shift in 0..RATE_DOUBLINGS {
            let rate = base * factor << shift;
            if driver.can_sample_rate(f64::from(rate)).is_ok() && !out.contains(&rate) {
                out.push(rate);
            }
        }
    }
}

fn push_format(formats: &mut Vec<DataFormat>, format: Option<DataFormat>) {
    if let Some(format) = format {
        if !formats.contains(&format) {
            formats.push(format);
        }
    }
}

fn probe(driver: &mut dyn AsioDriver, info: &mut DeviceInfo) {
    if let Ok(counts) = driver.channels() {
        let count = counts.outputs.clamp(2, CHANNEL_ORDER.len());
        info.channels = CHANNEL_ORDER[..count].to_vec();
    }

    probe_rates(driver, 1, &mut info.sample_rates);
    if let Ok(channel) = driver.channel_info(0, false) {
        push_format(
            &mut info.data_formats,
            DataFormat::native_for(channel.sample_type),
        );
    }

    if driver.set_io_format(IoFormat::Dsd).is_ok() {
        probe_rates(driver, DSD_RATE_FACTOR, &mut info.sample_rates);
        if let Ok(channel) = driver.channel_info(0, false) {
            push_format(
                &mut info.data_formats,
                DataFormat::native_for(channel.sample_type),
            );
        }
        push_format(&mut info.data_formats, Some(DataFormat::U8));
        if let Err(code) = driver.set_io_format(IoFormat::Pcm) {
            warn!("ASIO '{}' did not return to PCM mode: {code}", info.id);
        }
    }
}

/// List installed drivers with the capabilities each one reports.
///
/// Drivers that fail to open are still listed, with empty capabilities.
pub fn enumerate_devices(host: &dyn DriverHost) -> Vec<DeviceInfo> {
    if let Err(code) = host.acquire() {
        warn!("ASIO driver subsystem unavailable: {code}");
        return Vec::new();
    }
    let devices = host
        .driver_entries()
        .into_iter()
        .map(|entry| {
            let mut info = DeviceInfo {
                id: entry.id,
                display_name: entry.name,
                device_type: DeviceType::Pcm,
                wants_iec_passthrough: true,
                channels: Vec::new(),
                sample_rates: Vec::new(),
                data_formats: Vec::new(),
            };
            match host.open(&info.id) {
                Ok(mut driver) => probe(driver.as_mut(), &mut info),
                Err(code) => debug!("Skipping probe of ASIO '{}': {code}", info.id),
            }
            info
        })
        .collect();
    host.release();
    devices
}
