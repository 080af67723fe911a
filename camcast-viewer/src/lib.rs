//! # camcast-viewer
//!
//! Subscribes to `count` consecutive ports on one host, waits for each
//! stream's first frame, and reports every live stream's latest frame and
//! throughput until interrupted or every stream has ended.
//!
//! The producer host can be given directly or found through the UDP
//! discovery beacon.

pub mod config;
pub mod display;
