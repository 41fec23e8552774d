pub const CONFIG_ENV: &str = "ASIOSINK_CONFIG";
pub const VERBOSE_ENV: &str = "ASIOSINK_VERBOSE";
pub const BUFFER_PERIODS_ENV: &str = "ASIOSINK_BUFFER_PERIODS";

pub fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| {
            let s = v.trim().to_ascii_lowercase();
            s == "1" || s == "true" || s == "yes" || s == "on"
        })
        .unwrap_or(false)
}

pub fn env_usize(key: &str) -> Option<usize> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
