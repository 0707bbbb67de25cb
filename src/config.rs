//! Configuration snapshot loaded from JSON, validated eagerly so that
//! `ConfigInvalid` is fatal at startup rather than deferred into the
//! pipeline.

use std::collections::HashSet;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{GlobalParams, ScreenRect, SensorConfig, TuioEndpoint};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub sensors: Vec<SensorConfig>,
    pub screens: Vec<ScreenRect>,
    pub endpoints: Vec<TuioEndpoint>,
    #[serde(default)]
    pub params: GlobalParams,
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

fn default_app_name() -> String {
    String::from("lidar-touchd")
}

impl ConfigSnapshot {
    pub fn load_from_file(path: &str) -> anyhow::Result<ConfigSnapshot> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file \"{}\": {}", path, e))?;
        let snapshot: ConfigSnapshot = serde_json::from_str(&text)
            .map_err(|e| anyhow::anyhow!("failed to parse config file \"{}\": {}", path, e))?;
        snapshot.validate()?;
        info!(
            "Loaded config from \"{}\": {} sensor(s), {} screen(s), {} endpoint(s)",
            path,
            snapshot.sensors.len(),
            snapshot.screens.len(),
            snapshot.endpoints.len()
        );
        Ok(snapshot)
    }

    /// Validate every field; returns `ConfigInvalid` describing the first
    /// problem found.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |message: String| CoreError::ConfigInvalid { message };

        if self.sensors.is_empty() {
            return Err(invalid("at least one sensor must be configured".into()));
        }

        let mut seen_sensor_ids = HashSet::new();
        for sensor in &self.sensors {
            if sensor.id.is_empty() {
                return Err(invalid("sensor id must not be empty".into()));
            }
            if !seen_sensor_ids.insert(sensor.id.clone()) {
                return Err(invalid(format!("duplicate sensor id \"{}\"", sensor.id)));
            }
            if sensor.background_window == 0 {
                return Err(invalid(format!(
                    "sensor \"{}\": background_window must be > 0",
                    sensor.id
                )));
            }
            if sensor.foreground_threshold <= 0.0 {
                return Err(invalid(format!(
                    "sensor \"{}\": foreground_threshold must be > 0",
                    sensor.id
                )));
            }
            if sensor.cluster_eps <= 0.0 {
                return Err(invalid(format!(
                    "sensor \"{}\": cluster_eps must be > 0",
                    sensor.id
                )));
            }
            if sensor.cluster_min_pts == 0 {
                return Err(invalid(format!(
                    "sensor \"{}\": cluster_min_pts must be > 0",
                    sensor.id
                )));
            }
            if sensor.min_range < 0.0 || sensor.max_range <= sensor.min_range {
                return Err(invalid(format!(
                    "sensor \"{}\": min_range/max_range out of order",
                    sensor.id
                )));
            }
        }

        if self.screens.is_empty() {
            return Err(invalid("at least one screen must be configured".into()));
        }
        let mut seen_screen_ids = HashSet::new();
        for screen in &self.screens {
            if !seen_screen_ids.insert(screen.id) {
                return Err(invalid(format!("duplicate screen id {}", screen.id)));
            }
            if screen.w <= 0.0 || screen.h <= 0.0 {
                return Err(invalid(format!(
                    "screen {}: width/height must be > 0",
                    screen.id
                )));
            }
            for sensor_id in &screen.allowed_sensors {
                if !seen_sensor_ids.contains(sensor_id) {
                    return Err(invalid(format!(
                        "screen {}: allowed sensor \"{}\" is not configured",
                        screen.id, sensor_id
                    )));
                }
            }
        }

        for endpoint in &self.endpoints {
            if !seen_screen_ids.contains(&endpoint.screen_id) {
                return Err(invalid(format!(
                    "endpoint {}:{} references unknown screen {}",
                    endpoint.host, endpoint.port, endpoint.screen_id
                )));
            }
        }

        if self.params.r_merge_fraction <= 0.0 || self.params.r_gate_fraction <= 0.0 {
            return Err(invalid("r_merge_fraction/r_gate_fraction must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.params.beta) || !(0.0..=1.0).contains(&self.params.gamma) {
            return Err(invalid("beta/gamma must be in [0,1]".into()));
        }
        if self.params.birth_grace == 0 {
            return Err(invalid("birth_grace must be > 0".into()));
        }

        Ok(())
    }

    pub fn screen(&self, id: u32) -> Option<&ScreenRect> {
        self.screens.iter().find(|s| s.id == id)
    }

    pub fn sensor(&self, id: &str) -> Option<&SensorConfig> {
        self.sensors.iter().find(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ScannerSource, SensorPose};
    use std::collections::HashSet;

    fn sensor(id: &str) -> SensorConfig {
        SensorConfig {
            id: id.into(),
            source: ScannerSource::Mock,
            pose: SensorPose {
                x: 0.0,
                y: 0.0,
                heading: 0.0,
                mount_offset: 0.0,
            },
            background_window: 50,
            foreground_threshold: 0.05,
            cluster_eps: 0.05,
            cluster_min_pts: 3,
            min_range: 0.05,
            max_range: 5.0,
        }
    }

    fn screen(id: u32, allowed: &[&str]) -> ScreenRect {
        ScreenRect {
            id,
            x: 0.0,
            y: 0.0,
            w: 1.0,
            h: 1.0,
            rotation: 0.0,
            allowed_sensors: allowed.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn base_config() -> ConfigSnapshot {
        ConfigSnapshot {
            sensors: vec![sensor("s1")],
            screens: vec![screen(0, &["s1"])],
            endpoints: vec![],
            params: GlobalParams::default(),
            app_name: "test".into(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn rejects_duplicate_sensor_ids() {
        let mut cfg = base_config();
        cfg.sensors.push(sensor("s1"));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_screen_referencing_unknown_sensor() {
        let mut cfg = base_config();
        cfg.screens[0].allowed_sensors = HashSet::from(["ghost".to_string()]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_cluster_min_pts() {
        let mut cfg = base_config();
        cfg.sensors[0].cluster_min_pts = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_endpoint_with_unknown_screen() {
        let mut cfg = base_config();
        cfg.endpoints.push(TuioEndpoint {
            host: "127.0.0.1".into(),
            port: 3333,
            screen_id: 99,
        });
        assert!(cfg.validate().is_err());
    }
}
