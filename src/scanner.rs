//! Scan sources: a uniform interface over real hardware and a scripted
//! mock used in tests.

use std::collections::VecDeque;

use log::warn;

use crate::error::CoreError;
use crate::types::Scan;

/// Produces a sequence of `Scan`s for one sensor.
pub trait Scanner: Send {
    /// Block until the next scan is available, or return `ScanTimeout` if
    /// none arrives before the source gives up.
    fn next_scan(&mut self) -> Result<Scan, CoreError>;
}

/// A scripted `Scanner` that replays a fixed sequence of scans, for tests
/// and the integration scenarios. Exhausting the script yields
/// `ScanTimeout` on every subsequent call.
pub struct MockScanner {
    sensor_id: String,
    scans: VecDeque<Scan>,
}

impl MockScanner {
    pub fn new(sensor_id: impl Into<String>, scans: Vec<Scan>) -> Self {
        MockScanner {
            sensor_id: sensor_id.into(),
            scans: scans.into(),
        }
    }
}

impl Scanner for MockScanner {
    fn next_scan(&mut self) -> Result<Scan, CoreError> {
        self.scans.pop_front().ok_or_else(|| CoreError::ScanTimeout {
            sensor_id: self.sensor_id.clone(),
        })
    }
}

/// A real hardware scanner, addressed by URI (e.g. a serial device path or
/// network endpoint). The transport itself is out of scope for this crate's
/// Non-goals; this stub exists so `ScannerSource::Hardware` has a concrete
/// type to construct pipelines against in deployments with a driver crate
/// layered on top.
pub struct HardwareScanner {
    sensor_id: String,
    uri: String,
}

impl HardwareScanner {
    pub fn new(sensor_id: impl Into<String>, uri: impl Into<String>) -> Self {
        HardwareScanner {
            sensor_id: sensor_id.into(),
            uri: uri.into(),
        }
    }
}

impl Scanner for HardwareScanner {
    fn next_scan(&mut self) -> Result<Scan, CoreError> {
        warn!(
            "HardwareScanner for \"{}\" ({}) has no transport wired in this build",
            self.sensor_id, self.uri
        );
        Err(CoreError::ScanTimeout {
            sensor_id: self.sensor_id.clone(),
        })
    }
}
