pub mod channel;
pub mod config;
