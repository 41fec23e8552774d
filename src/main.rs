mod config;
mod logging;
mod tone;

use anyhow::Result;
use asiosink_engine::hw::asio::sim::SimHost;
use asiosink_engine::{DataFormat, DeviceInfo, enumerate_devices};
use clap::{Parser, Subcommand};
use config::Config;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "asiosink")]
#[command(about = "Probe ASIO-style drivers and play test tones", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file; defaults to $ASIOSINK_CONFIG
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List drivers with their channels, rates and formats
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Play a sine tone through a driver
    Tone {
        #[arg(short, long)]
        device: Option<String>,
        #[arg(short = 'r', long)]
        sample_rate: Option<u32>,
        #[arg(short = 'n', long)]
        channels: Option<usize>,
        /// Input encoding, e.g. Float, S16LE, S24BE3
        #[arg(short, long)]
        format: Option<DataFormat>,
        #[arg(short, long)]
        seconds: Option<f64>,
        #[arg(long)]
        frequency: Option<f64>,
    },
}

fn print_device(device: &DeviceInfo) {
    println!("{} ({})", device.display_name, device.id);
    println!("  channels: {:?}", device.channels);
    let rates: Vec<String> = device.sample_rates.iter().map(u32::to_string).collect();
    println!("  sample rates: {}", rates.join(", "));
    println!("  formats: {:?}", device.data_formats);
}

fn list(config: &Config, json: bool) -> Result<()> {
    let host = SimHost::new(config.drivers.clone());
    let devices = enumerate_devices(&host);
    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
    } else if devices.is_empty() {
        println!("No drivers found");
    } else {
        devices.iter().for_each(print_device);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    logging::init(&config.log_level);

    match cli.command {
        Commands::List { json } => list(&config, json),
        Commands::Tone {
            device,
            sample_rate,
            channels,
            format,
            seconds,
            frequency,
        } => {
            config.device = device.unwrap_or(config.device);
            config.sample_rate = sample_rate.unwrap_or(config.sample_rate);
            config.channels = channels.unwrap_or(config.channels);
            config.format = format.unwrap_or(config.format);
            config.seconds = seconds.unwrap_or(config.seconds);
            config.frequency = frequency.unwrap_or(config.frequency);
            let host = Arc::new(SimHost::new(config.drivers.clone()));
            tone::play(host, &config)
        }
    }
}
