mod cli;

use std::collections::HashMap;
use std::f64::consts::TAU;

use clap::Parser;
use cli::Cli;
use lidar_touch_core::config::ConfigSnapshot;
use lidar_touch_core::pipeline::spawn;
use lidar_touch_core::scanner::{HardwareScanner, MockScanner, Scanner};
use lidar_touch_core::tuio::UdpTuioSink;
use lidar_touch_core::types::{Scan, ScannerSource};
use log::{error, info, warn};

/// Most planar LiDAR units report one range sample per degree of a full
/// sweep; a mock scenario can override this by scripting scans of a
/// different length.
const DEFAULT_ANGULAR_COUNT: usize = 360;
const DEFAULT_ANGULAR_STEP: f64 = TAU / DEFAULT_ANGULAR_COUNT as f64;

fn init_logging(level: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn build_scanner(source: &ScannerSource, sensor_id: &str, mock_scenario: Option<&str>) -> Box<dyn Scanner> {
    match source {
        ScannerSource::Hardware { uri } => Box::new(HardwareScanner::new(sensor_id, uri.clone())),
        ScannerSource::Mock => {
            let scans = match mock_scenario {
                Some(path) => load_mock_scans(path, sensor_id),
                None => {
                    warn!("sensor \"{sensor_id}\" configured as mock with no --mock-scenario; it will never produce scans");
                    Vec::new()
                }
            };
            Box::new(MockScanner::new(sensor_id, scans))
        }
    }
}

fn load_mock_scans(path: &str, sensor_id: &str) -> Vec<Scan> {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            error!("failed to read mock scenario \"{path}\" for sensor \"{sensor_id}\": {e}");
            return Vec::new();
        }
    };
    #[derive(serde::Deserialize)]
    struct RawScan {
        timestamp_ns: u64,
        ranges: Vec<f64>,
    }
    #[derive(serde::Deserialize)]
    struct RawScenario {
        sensors: HashMap<String, Vec<RawScan>>,
    }
    match serde_json::from_str::<RawScenario>(&text) {
        Ok(scenario) => scenario
            .sensors
            .get(sensor_id)
            .map(|scans| scans.iter().map(|s| Scan::new(s.timestamp_ns, s.ranges.clone())).collect())
            .unwrap_or_default(),
        Err(e) => {
            error!("failed to parse mock scenario \"{path}\": {e}");
            Vec::new()
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level());

    let config = ConfigSnapshot::load_from_file(&cli.config)?;
    info!("starting lidar-touchd with {} sensor(s)", config.sensors.len());

    let scanners: HashMap<String, Box<dyn Scanner>> = config
        .sensors
        .iter()
        .map(|sensor| {
            (
                sensor.id.clone(),
                build_scanner(&sensor.source, &sensor.id, cli.mock_scenario.as_deref()),
            )
        })
        .collect();

    let angular_counts: HashMap<String, usize> = config
        .sensors
        .iter()
        .map(|s| (s.id.clone(), DEFAULT_ANGULAR_COUNT))
        .collect();
    let angular_steps: HashMap<String, f64> = config
        .sensors
        .iter()
        .map(|s| (s.id.clone(), DEFAULT_ANGULAR_STEP))
        .collect();

    let (_handle, event_bus, diagnostics) = spawn(
        config,
        scanners,
        angular_counts,
        angular_steps,
        |host, port| -> Box<dyn lidar_touch_core::tuio::TuioSink + Send> {
            match UdpTuioSink::new(host, port) {
                Ok(sink) => Box::new(sink),
                Err(e) => {
                    error!("failed to bind TUIO sink for {host}:{port}: {e}, using a no-op sink");
                    Box::new(lidar_touch_core::tuio::TestTuioSink::default())
                }
            }
        },
    );

    let _events = event_bus.subscribe();

    // Runs until the process is terminated by its supervisor; `handle`'s
    // worker threads drain and exit cleanly if `shutdown()` is ever called
    // from an embedder instead of from `main`.
    loop {
        std::thread::sleep(std::time::Duration::from_millis(200));
        let snapshot = diagnostics.snapshot();
        log::trace!("diagnostics: {snapshot:?}");
    }
}
