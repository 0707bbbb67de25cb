//! Background learning and foreground classification.

use log::{info, warn};

use crate::error::CoreError;
use crate::types::{is_valid_sample, Scan};

/// Per-angle reference distance and foreground classification for one
/// sensor. Bound to a fixed angular count for its whole lifetime.
#[derive(Debug, Clone)]
pub struct BackgroundModel {
    sensor_id: String,
    angular_count: usize,
    reference: Vec<Option<f64>>,
    window: usize,
    frames_learned: usize,
    learning: bool,
    min_range: f64,
    max_range: f64,
    threshold: f64,
}

impl BackgroundModel {
    pub fn new(
        sensor_id: impl Into<String>,
        angular_count: usize,
        window: usize,
        min_range: f64,
        max_range: f64,
        threshold: f64,
    ) -> Self {
        BackgroundModel {
            sensor_id: sensor_id.into(),
            angular_count,
            reference: vec![None; angular_count],
            window,
            frames_learned: 0,
            learning: true,
            min_range,
            max_range,
            threshold,
        }
    }

    pub fn angular_count(&self) -> usize {
        self.angular_count
    }

    pub fn is_learning(&self) -> bool {
        self.learning
    }

    /// Explicitly re-trigger learning, discarding the current reference.
    pub fn reset_learning(&mut self) {
        self.reference = vec![None; self.angular_count];
        self.frames_learned = 0;
        self.learning = true;
    }

    /// Feed one scan into the learning phase. A no-op once learning has
    /// frozen. Returns `InsufficientBackground` if learning just completed
    /// with fewer than half the angles populated; the caller must then
    /// refuse to start (or re-learn).
    pub fn observe(&mut self, scan: &Scan) -> Result<(), CoreError> {
        debug_assert_eq!(
            scan.len(),
            self.angular_count,
            "scan length must match the BackgroundModel's bound sensor"
        );
        if !self.learning {
            return Ok(());
        }

        for (i, &sample) in scan.ranges.iter().enumerate().take(self.angular_count) {
            if !is_valid_sample(sample) {
                continue;
            }
            self.reference[i] = Some(match self.reference[i] {
                Some(current) => current.min(sample),
                None => sample,
            });
        }

        self.frames_learned += 1;
        if self.frames_learned >= self.window {
            self.learning = false;
            let populated = self.reference.iter().filter(|r| r.is_some()).count();
            let fraction = populated as f64 / self.angular_count.max(1) as f64;
            if fraction < 0.5 {
                warn!(
                    "background learning for \"{}\" only populated {:.1}% of angles",
                    self.sensor_id,
                    fraction * 100.0
                );
                return Err(CoreError::InsufficientBackground {
                    sensor_id: self.sensor_id.clone(),
                    populated_fraction: fraction * 100.0,
                });
            }
            info!(
                "background learning for \"{}\" complete: {:.1}% of angles populated",
                self.sensor_id,
                fraction * 100.0
            );
        }
        Ok(())
    }

    /// A sample at `angle_index` is foreground iff it is valid, within
    /// [min_range, max_range], and at least `threshold` closer than the
    /// learned reference. Ties are foreground.
    pub fn is_foreground(&self, angle_index: usize, sample: f64) -> bool {
        if !is_valid_sample(sample) {
            return false;
        }
        if sample < self.min_range || sample > self.max_range {
            return false;
        }
        match self.reference.get(angle_index).copied().flatten() {
            Some(reference) => (reference - sample) >= self.threshold,
            None => false,
        }
    }

    /// Foreground mask for a whole scan; re-running on the same scan with
    /// the same model is idempotent since this method only reads state.
    pub fn classify(&self, scan: &Scan) -> Vec<bool> {
        scan.ranges
            .iter()
            .enumerate()
            .map(|(i, &s)| self.is_foreground(i, s))
            .collect()
    }

    /// Tighten `max_range` per-angle to exclude a static occluder sampled
    /// over `n_frames`, without touching the learned background reference.
    pub fn sample_mask(&self, scans: &[Scan], margin: f64) -> Vec<Option<f64>> {
        let mut thresholds = vec![None; self.angular_count];
        for scan in scans {
            for (i, &sample) in scan.ranges.iter().enumerate().take(self.angular_count) {
                if !is_valid_sample(sample) {
                    continue;
                }
                let candidate = sample - margin;
                if candidate <= 0.0 {
                    continue;
                }
                thresholds[i] = Some(match thresholds[i] {
                    Some(current) => f64::min(current, candidate),
                    None => candidate,
                });
            }
        }
        thresholds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn far_scan(n: usize, timestamp: u64) -> Scan {
        Scan::new(timestamp, vec![3.0; n])
    }

    #[test]
    fn learns_minimum_over_window() {
        let mut model = BackgroundModel::new("s1", 5, 3, 0.05, 5.0, 0.1);
        model.observe(&Scan::new(0, vec![3.0, 3.0, 3.0, 3.0, 3.0])).unwrap();
        model.observe(&Scan::new(1, vec![2.5, 3.0, 3.0, 3.0, 3.0])).unwrap();
        model.observe(&Scan::new(2, vec![3.0, 3.0, 3.0, 3.0, 3.0])).unwrap();
        assert!(!model.is_learning());
        assert!(model.is_foreground(0, 2.0));
        assert!(!model.is_foreground(1, 2.9));
    }

    #[test]
    fn insufficient_background_when_under_half_populated() {
        let mut model = BackgroundModel::new("s1", 10, 2, 0.05, 5.0, 0.1);
        model.observe(&Scan::new(0, vec![0.0; 10])).unwrap();
        let result = model.observe(&Scan::new(1, vec![0.0; 10]));
        assert!(matches!(
            result,
            Err(CoreError::InsufficientBackground { .. })
        ));
    }

    #[test]
    fn ties_count_as_foreground() {
        let mut model = BackgroundModel::new("s1", 1, 1, 0.05, 5.0, 0.5);
        model.observe(&far_scan(1, 0)).unwrap();
        // reference = 3.0, threshold 0.5 -> sample 2.5 is exactly on the boundary
        assert!(model.is_foreground(0, 2.5));
        assert!(!model.is_foreground(0, 2.6));
    }

    #[test]
    fn invalid_samples_are_never_foreground() {
        let mut model = BackgroundModel::new("s1", 1, 1, 0.05, 5.0, 0.1);
        model.observe(&far_scan(1, 0)).unwrap();
        assert!(!model.is_foreground(0, 0.0));
        assert!(!model.is_foreground(0, f64::NAN));
    }

    #[test]
    fn classify_is_idempotent() {
        let mut model = BackgroundModel::new("s1", 5, 1, 0.05, 5.0, 0.2);
        model.observe(&far_scan(5, 0)).unwrap();
        let scan = Scan::new(1, vec![1.0, 3.0, 1.0, 3.0, 1.0]);
        assert_eq!(model.classify(&scan), model.classify(&scan));
    }
}
