//! Refresh pipeline for the thumbnail wall: playlist loading, frame capture, batched dispatch
//! and the cycle scheduler that publishes snapshots.

pub mod aggregator;
pub mod capture;
pub mod dispatcher;
pub mod playlist;
pub mod scheduler;
pub mod snapshot;

pub const USER_AGENT: &str = concat!("Mosaic/", env!("CARGO_PKG_VERSION"));
