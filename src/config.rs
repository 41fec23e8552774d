use anyhow::{Context, Result};
use asiosink_engine::hw::asio::sim::SimDriverConfig;
use asiosink_engine::hw::config::CONFIG_ENV;
use asiosink_engine::{DataFormat, SinkOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub device: String,
    pub sample_rate: u32,
    pub channels: usize,
    pub format: DataFormat,
    pub seconds: f64,
    pub frequency: f64,
    pub amplitude: f64,
    pub log_level: String,
    pub sink: SinkOptions,
    /// Drivers offered by the in-process host.
    pub drivers: Vec<SimDriverConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: "sim".to_string(),
            sample_rate: 48_000,
            channels: 2,
            format: DataFormat::Float,
            seconds: 2.0,
            frequency: 440.0,
            amplitude: 0.5,
            log_level: "info".to_string(),
            sink: SinkOptions::default(),
            drivers: vec![SimDriverConfig::default()],
        }
    }
}

impl Config {
    /// Read `path`, or the file named by `ASIOSINK_CONFIG`, or fall back to
    /// defaults when neither is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asiosink_engine::SampleType;

    #[test]
    fn empty_file_gives_defaults() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn nested_tables_are_read() {
        let config = Config::parse(
            r#"
            device = "rme"
            sample_rate = 2822400
            format = "U8"

            [sink]
            buffer_periods = 4

            [[drivers]]
            id = "rme"
            dsd_sample_type = "DSDInt8MSB1"
            "#,
        )
        .unwrap();
        assert_eq!(config.device, "rme");
        assert_eq!(config.format, DataFormat::U8);
        assert_eq!(config.channels, 2);
        assert_eq!(config.sink.buffer_periods, 4);
        assert_eq!(config.sink.chunks_per_second, 75);
        assert_eq!(config.drivers.len(), 1);
        assert_eq!(
            config.drivers[0].dsd_sample_type,
            Some(SampleType::DSD_INT8_MSB1)
        );
    }

    #[test]
    fn bad_values_are_errors() {
        assert!(Config::parse("format = \"S20\"").is_err());
        assert!(Config::parse("sample_rate = -1").is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = Config::load(Some(Path::new("/nonexistent/asiosink.toml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/asiosink.toml"));
    }
}
