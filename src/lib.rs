//! Real-time LiDAR sensor-fusion core for a multi-touch surface.
//!
//! Converts 2D polar range scans from one or more planar scanners into a
//! stream of tracked touch points, delivered as TUIO 1.1 `/tuio/2Dcur`
//! cursor messages over UDP.

pub mod background;
pub mod clustering;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod fusion;
pub mod geometry;
pub mod pipeline;
pub mod scanner;
pub mod screen;
pub mod tracker;
pub mod tuio;
pub mod types;

pub use error::CoreError;
pub use types::*;
