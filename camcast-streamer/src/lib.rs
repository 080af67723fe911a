//! # camcast-streamer
//!
//! Publishes one JPEG frame stream per camera id on consecutive TCP ports
//! and optionally announces the first endpoint over UDP so viewers can find
//! it.

pub mod config;
pub mod source;
