use asiosink_engine::hw::config::{VERBOSE_ENV, env_flag};
use tracing::Level;

fn level(name: &str, verbose: bool) -> Level {
    if verbose {
        return Level::DEBUG;
    }
    name.trim().parse().unwrap_or(Level::INFO)
}

pub fn init(name: &str) {
    let result = tracing_subscriber::fmt()
        .with_max_level(level(name, env_flag(VERBOSE_ENV)))
        .with_writer(std::io::stderr)
        .try_init();
    if let Err(e) = result {
        tracing::debug!("Keeping the already installed subscriber: {e}");
    }
}
