//! Thread and queue wiring: one worker per sensor, one fusion/tracker/
//! emitter worker per screen, bounded drop-oldest queues between them, and
//! a deterministic synchronous core shared with the tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Select, Sender};
use log::{debug, error, info, warn};

use crate::background::BackgroundModel;
use crate::clustering::cluster;
use crate::config::ConfigSnapshot;
use crate::diagnostics::Diagnostics;
use crate::error::CoreError;
use crate::events::EventBus;
use crate::fusion::fuse;
use crate::geometry::project;
use crate::scanner::Scanner;
use crate::screen::map_candidates;
use crate::tracker::Tracker;
use crate::tuio::{alive_set_changed, emit_frame, emit_heartbeat, TuioSink};
use crate::types::{Candidate, FgPoint, GlobalParams, Scan, ScreenRect, SensorConfig, TouchEvent};

/// Queue depth between pipeline stages; a full queue drops its oldest entry
/// rather than applying backpressure to the producer.
pub const QUEUE_DEPTH: usize = 4;

fn send_drop_oldest<T>(
    tx: &Sender<T>,
    drain: &Receiver<T>,
    value: T,
    queue_name: &str,
    diagnostics: &Diagnostics,
) {
    match tx.try_send(value) {
        Ok(()) => {}
        Err(crossbeam_channel::TrySendError::Full(value)) => {
            diagnostics.record_scan_dropped();
            warn!(
                "{}",
                CoreError::QueueOverflow {
                    queue: queue_name.to_string()
                }
            );
            // Best effort: drain one stale entry, then retry once.
            let _ = drain.try_recv();
            let _ = tx.try_send(value);
        }
        Err(crossbeam_channel::TrySendError::Disconnected(_)) => {}
    }
}

/// Per-sensor deterministic core: background learning, foreground
/// extraction, geometry projection, and clustering, in that order.
pub struct SensorPipeline {
    sensor_id: String,
    background: BackgroundModel,
    pose: crate::types::SensorPose,
    angular_step: f64,
    cluster_eps: f64,
    cluster_min_pts: usize,
}

impl SensorPipeline {
    pub fn new(config: &SensorConfig, angular_count: usize, angular_step: f64) -> Self {
        SensorPipeline {
            sensor_id: config.id.clone(),
            background: BackgroundModel::new(
                config.id.clone(),
                angular_count,
                config.background_window,
                config.min_range,
                config.max_range,
                config.foreground_threshold,
            ),
            pose: config.pose,
            angular_step,
            cluster_eps: config.cluster_eps,
            cluster_min_pts: config.cluster_min_pts,
        }
    }

    /// Feed one scan through the per-sensor stages. Returns an empty vector
    /// while the background model is still learning.
    pub fn process(&mut self, scan: &Scan) -> Result<Vec<Candidate>, CoreError> {
        if self.background.is_learning() {
            self.background.observe(scan)?;
            return Ok(Vec::new());
        }

        let mask = self.background.classify(scan);
        let points: Vec<FgPoint> = scan
            .ranges
            .iter()
            .enumerate()
            .filter_map(|(i, &range)| {
                if !mask[i] {
                    return None;
                }
                let (x, y) = project(&self.pose, self.angular_step, i, range);
                Some(FgPoint {
                    x,
                    y,
                    angle_index: i,
                    raw_distance: range,
                })
            })
            .collect();

        Ok(cluster(&points, self.cluster_eps, self.cluster_min_pts, &self.sensor_id, scan.timestamp_ns))
    }
}

/// Per-screen deterministic core: mapping, fusion, and tracking.
pub struct ScreenPipeline {
    screen: ScreenRect,
    tracker: Tracker,
    params: GlobalParams,
    last_timestamp_ns: Option<u64>,
    fseq: i32,
}

impl ScreenPipeline {
    pub fn new(screen: ScreenRect, params: GlobalParams) -> Self {
        let diagonal = (screen.w.powi(2) + screen.h.powi(2)).sqrt();
        let tracker = Tracker::new(screen.id, params, diagonal);
        ScreenPipeline {
            screen,
            tracker,
            params,
            last_timestamp_ns: None,
            fseq: 0,
        }
    }

    fn diagonal(&self) -> f64 {
        (self.screen.w.powi(2) + self.screen.h.powi(2)).sqrt()
    }

    /// Run one frame of candidates (from any number of sensors) through
    /// mapping, fusion, and tracking, returning the lifecycle events and the
    /// next outgoing `fseq`.
    pub fn process(&mut self, candidates: &[Candidate], timestamp_ns: u64) -> (Vec<TouchEvent>, i32) {
        let mapped = map_candidates(candidates, std::slice::from_ref(&self.screen));
        let fused = fuse(&mapped, self.params.r_merge_fraction * self.diagonal());

        let dt = match self.last_timestamp_ns {
            Some(prev) if timestamp_ns > prev => (timestamp_ns - prev) as f64 / 1e9,
            _ => 0.0,
        };
        self.last_timestamp_ns = Some(timestamp_ns);
        self.fseq += 1;

        let events = self.tracker.step(&fused, timestamp_ns, dt);
        (events, self.fseq)
    }

    pub fn touches(&self) -> &[crate::types::Touch] {
        self.tracker.touches()
    }

    /// Advance and return the next `fseq` for this screen, for a heartbeat
    /// bundle that carries no new frame of its own. Shares the same counter
    /// as `process()` so every bundle sent to an endpoint, frame or
    /// heartbeat, has a strictly higher `fseq` than the last.
    pub fn next_fseq(&mut self) -> i32 {
        self.fseq += 1;
        self.fseq
    }
}

/// Owns every worker thread the running pipeline spawned, plus the shutdown
/// flag they all poll.
pub struct PipelineHandle {
    shutdown: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl PipelineHandle {
    /// Signal every worker to stop and wait for them to drain and exit.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.handles {
            if let Err(e) = handle.join() {
                error!("pipeline worker panicked: {e:?}");
            }
        }
    }
}

/// Spawn the full worker topology: one thread per sensor polling its
/// `Scanner` and running `SensorPipeline::process`, and
/// one thread per screen fusing and tracking candidates from its allowed
/// sensors, emitting TUIO frames and a 1 Hz heartbeat to every configured
/// endpoint.
pub fn spawn(
    config: ConfigSnapshot,
    scanners: HashMap<String, Box<dyn Scanner>>,
    angular_counts: HashMap<String, usize>,
    angular_steps: HashMap<String, f64>,
    sink_factory: impl Fn(&str, u16) -> Box<dyn TuioSink + Send> + Send + Sync + 'static,
) -> (PipelineHandle, Arc<EventBus>, Diagnostics) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let mut handles = Vec::new();
    let event_bus = Arc::new(EventBus::new(QUEUE_DEPTH));
    let diagnostics = Diagnostics::new();
    let mut scanners = scanners;

    // One bounded channel of per-sensor candidate batches per screen.
    let mut screen_rxs: HashMap<u32, Vec<Receiver<Vec<Candidate>>>> = HashMap::new();
    for screen in &config.screens {
        screen_rxs.insert(screen.id, Vec::new());
    }

    for sensor in &config.sensors {
        let mut scanner = match scanners.remove(&sensor.id) {
            Some(s) => s,
            None => continue,
        };

        let angular_count = *angular_counts.get(&sensor.id).unwrap_or(&0);
        let angular_step = *angular_steps.get(&sensor.id).unwrap_or(&0.0);
        let mut sensor_pipeline = SensorPipeline::new(sensor, angular_count, angular_step);
        let sensor_id = sensor.id.clone();
        let diag = diagnostics.clone();
        let shutdown_flag = shutdown.clone();

        let targets: Vec<(Sender<Vec<Candidate>>, Receiver<Vec<Candidate>>)> = config
            .screens
            .iter()
            .filter(|s| s.allowed_sensors.contains(&sensor_id))
            .map(|s| {
                let (tx, rx) = bounded(QUEUE_DEPTH);
                screen_rxs.get_mut(&s.id).unwrap().push(rx.clone());
                (tx, rx)
            })
            .collect();

        let handle = std::thread::Builder::new()
            .name(format!("sensor-{sensor_id}"))
            .spawn(move || {
                info!("sensor worker for \"{sensor_id}\" started");
                while !shutdown_flag.load(Ordering::Relaxed) {
                    match scanner.next_scan() {
                        Ok(scan) => {
                            diag.record_scan_received();
                            match sensor_pipeline.process(&scan) {
                                Ok(candidates) => {
                                    diag.record_candidates_emitted(candidates.len() as u64);
                                    for (tx, rx) in &targets {
                                        send_drop_oldest(tx, rx, candidates.clone(), &sensor_id, &diag);
                                    }
                                }
                                Err(e) => error!("sensor \"{sensor_id}\" processing error: {e}"),
                            }
                        }
                        Err(CoreError::ScanTimeout { .. }) => {
                            std::thread::sleep(Duration::from_millis(10));
                        }
                        Err(e) => error!("sensor \"{sensor_id}\" scan error: {e}"),
                    }
                }
                debug!("sensor worker for \"{sensor_id}\" exiting");
            })
            .expect("failed to spawn sensor worker thread");

        handles.push(handle);
    }

    for screen in config.screens.clone() {
        let rxs = screen_rxs.remove(&screen.id).unwrap_or_default();
        if rxs.is_empty() {
            continue;
        }
        let mut screen_pipeline = ScreenPipeline::new(screen.clone(), config.params);
        let endpoints: Vec<(String, u16)> = config
            .endpoints
            .iter()
            .filter(|e| e.screen_id == screen.id)
            .map(|e| (e.host.clone(), e.port))
            .collect();
        let mut sinks: Vec<(String, Box<dyn TuioSink + Send>)> = endpoints
            .iter()
            .map(|(h, p)| (h.clone(), sink_factory(h, *p)))
            .collect();
        let app_name = config.app_name.clone();
        let heartbeat_interval = Duration::from_millis(config.params.heartbeat_interval_ms);
        let event_tx = event_bus.clone();
        let diag = diagnostics.clone();
        let shutdown_flag = shutdown.clone();

        let handle = std::thread::Builder::new()
            .name(format!("screen-{}", screen.id))
            .spawn(move || {
                info!("screen worker for screen {} started", screen.id);
                let mut last_heartbeat = Instant::now();
                let mut latest: HashMap<usize, Vec<Candidate>> = HashMap::new();
                // `source` is resent only when the alive set changes, so every
                // endpoint of this screen shares one comparison against the
                // last announced set (they all see the same touches).
                let mut last_alive: Option<std::collections::HashSet<u32>> = None;

                while !shutdown_flag.load(Ordering::Relaxed) {
                    let mut select = Select::new();
                    for rx in &rxs {
                        select.recv(rx);
                    }
                    let oper = select.select_timeout(Duration::from_millis(50));
                    match oper {
                        Ok(op) => {
                            let index = op.index();
                            if let Ok(batch) = op.recv(&rxs[index]) {
                                latest.insert(index, batch);
                                let merged: Vec<Candidate> = latest.values().flatten().cloned().collect();
                                let now_ns = now_nanos();
                                let (events, fseq) = screen_pipeline.process(&merged, now_ns);
                                for event in &events {
                                    match event.kind {
                                        crate::types::TouchEventKind::Add => diag.record_touch_added(),
                                        crate::types::TouchEventKind::Remove => diag.record_touch_removed(),
                                        crate::types::TouchEventKind::Update => {}
                                    }
                                }
                                if !events.is_empty() {
                                    let include_source = alive_set_changed(&last_alive, screen_pipeline.touches());
                                    for (host, sink) in sinks.iter_mut() {
                                        if let Err(e) = emit_frame(
                                            sink.as_mut(),
                                            &app_name,
                                            host,
                                            screen_pipeline.touches(),
                                            fseq,
                                            include_source,
                                        ) {
                                            error!("tuio emit failed for screen {}: {e}", screen.id);
                                            diag.record_tuio_send_failure();
                                        }
                                    }
                                    last_alive = Some(
                                        screen_pipeline
                                            .touches()
                                            .iter()
                                            .filter(|t| t.confirmed)
                                            .map(|t| t.session_id)
                                            .collect(),
                                    );
                                }
                                event_tx.publish_all(events);
                            }
                        }
                        Err(_) => { /* timeout, fall through to heartbeat check */ }
                    }

                    if last_heartbeat.elapsed() >= heartbeat_interval {
                        last_heartbeat = Instant::now();
                        let fseq = screen_pipeline.next_fseq();
                        let include_source = alive_set_changed(&last_alive, screen_pipeline.touches());
                        for (host, sink) in sinks.iter_mut() {
                            let _ = emit_heartbeat(sink.as_mut(), &app_name, host, screen_pipeline.touches(), fseq, include_source);
                        }
                        last_alive = Some(
                            screen_pipeline
                                .touches()
                                .iter()
                                .filter(|t| t.confirmed)
                                .map(|t| t.session_id)
                                .collect(),
                        );
                    }
                }
                debug!("screen worker for screen {} exiting", screen.id);
            })
            .expect("failed to spawn screen worker thread");

        handles.push(handle);
    }

    (
        PipelineHandle {
            shutdown,
            handles,
        },
        event_bus,
        diagnostics,
    )
}

fn now_nanos() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
