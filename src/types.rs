//! Shared data types flowing through the pipeline.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A sample value of 0 (or non-finite) marks an out-of-range reading.
pub fn is_valid_sample(raw: f64) -> bool {
    raw.is_finite() && raw > 0.0
}

/// One timestamped polar scan: a monotonic nanosecond timestamp and one
/// range sample per angular step.
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    pub timestamp_ns: u64,
    pub ranges: Vec<f64>,
}

impl Scan {
    pub fn new(timestamp_ns: u64, ranges: Vec<f64>) -> Self {
        Scan {
            timestamp_ns,
            ranges,
        }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Position + heading of a sensor in world units (meters, radians), plus a
/// mounting angular offset applied before projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorPose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub mount_offset: f64,
}

/// How a `Scanner` is sourced: a real sensor, addressed by URI, or a
/// scripted mock used by tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ScannerSource {
    Hardware { uri: String },
    Mock,
}

/// Static, validated configuration for one sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorConfig {
    pub id: String,
    pub source: ScannerSource,
    pub pose: SensorPose,
    /// Background-learning window size, in frames (W).
    pub background_window: usize,
    /// Foreground threshold, in meters (t).
    pub foreground_threshold: f64,
    /// DBSCAN neighborhood radius, in meters (ε).
    pub cluster_eps: f64,
    /// DBSCAN minimum core-neighborhood size (minPts).
    pub cluster_min_pts: usize,
    pub min_range: f64,
    pub max_range: f64,
}

/// An axis-aligned-in-local-frame rectangle mapped to normalized [0,1]².
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenRect {
    pub id: u32,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub rotation: f64,
    pub allowed_sensors: HashSet<String>,
}

/// A UDP (host, port, screen) fan-out target for TUIO bundles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TuioEndpoint {
    pub host: String,
    pub port: u16,
    pub screen_id: u32,
}

/// Global tuning parameters shared by Fusion and the Tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalParams {
    /// Fraction of the screen diagonal below which two candidates merge.
    pub r_merge_fraction: f64,
    /// Fraction of the screen diagonal within which a candidate may match
    /// a predicted touch position.
    pub r_gate_fraction: f64,
    /// Position smoothing factor for the Tracker's EMA update.
    pub beta: f64,
    /// Velocity smoothing factor for the Tracker's EMA update.
    pub gamma: f64,
    pub death_threshold: u32,
    pub birth_grace: u32,
    pub heartbeat_interval_ms: u64,
}

impl Default for GlobalParams {
    fn default() -> Self {
        GlobalParams {
            r_merge_fraction: 0.02,
            r_gate_fraction: 0.08,
            beta: 0.5,
            gamma: 0.3,
            death_threshold: 3,
            birth_grace: 2,
            heartbeat_interval_ms: 1000,
        }
    }
}

/// A world-frame foreground point produced by Geometry, attributed to the
/// sensor and angular index it came from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FgPoint {
    pub x: f64,
    pub y: f64,
    pub angle_index: usize,
    pub raw_distance: f64,
}

/// An unnormalized world-frame candidate touch produced by the Cluster
/// Engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub x: f64,
    pub y: f64,
    pub count: usize,
    pub radius: f64,
    pub sensor_id: String,
    pub timestamp_ns: u64,
}

/// A `Candidate` that has been tested against a screen and normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedCandidate {
    pub candidate: Candidate,
    pub screen_id: u32,
    pub u: f64,
    pub v: f64,
}

impl MappedCandidate {
    pub fn weight(&self) -> f64 {
        self.candidate.count as f64
    }
}

/// A stably-identified, tracked touch on a screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Touch {
    pub session_id: u32,
    pub screen_id: u32,
    pub u: f64,
    pub v: f64,
    pub last_update_ns: u64,
    /// Frames since birth in which this Touch was matched.
    pub age: u32,
    /// Consecutive frames in which this Touch was not matched.
    pub missed: u32,
    pub du: f64,
    pub dv: f64,
    pub confirmed: bool,
}

impl Touch {
    pub fn predicted(&self, dt: f64) -> (f64, f64) {
        (self.u + self.du * dt, self.v + self.dv * dt)
    }
}

/// The three TUIO-aligned event categories a Tracker emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchEventKind {
    Add,
    Update,
    Remove,
}

/// A single lifecycle event for a tracked touch, observable by the GUI and
/// test harness.
#[derive(Debug, Clone, PartialEq)]
pub struct TouchEvent {
    pub kind: TouchEventKind,
    pub session_id: u32,
    pub screen_id: u32,
    pub u: f64,
    pub v: f64,
    pub du: f64,
    pub dv: f64,
    pub timestamp_ns: u64,
}

pub fn euclidean(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}
