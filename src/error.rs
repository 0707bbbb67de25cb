//! Error kinds. No stage may poison the pipeline: every variant here is
//! either recovered locally by its stage or, for `ConfigInvalid`, fatal at
//! startup only.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("scanner \"{sensor_id}\" timed out waiting for a scan")]
    ScanTimeout { sensor_id: String },

    #[error(
        "background learning for \"{sensor_id}\" populated only {populated_fraction:.1}% of angles (need >= 50%)"
    )]
    InsufficientBackground {
        sensor_id: String,
        populated_fraction: f64,
    },

    #[error("failed to send TUIO bundle to {host}:{port}: {reason}")]
    UdpSendFailure {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("invalid configuration: {message}")]
    ConfigInvalid { message: String },

    #[error("queue \"{queue}\" overflowed; dropped oldest frame")]
    QueueOverflow { queue: String },
}
