pub mod asio;
pub mod config;
pub mod error_fmt;
pub mod options;
