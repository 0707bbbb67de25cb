//! Polar-to-Cartesian projection under a configurable sensor pose. Pure,
//! allocation-free per sample.

use nalgebra::{Rotation2, Vector2};

use crate::types::SensorPose;

/// Project a foreground angular sample `(angle_index, range)` for a sensor
/// with the given pose and angular step into a world-frame point.
pub fn project(pose: &SensorPose, angular_step: f64, angle_index: usize, range: f64) -> (f64, f64) {
    let local_angle = pose.mount_offset + angle_index as f64 * angular_step;
    let local = Vector2::new(range * local_angle.cos(), range * local_angle.sin());
    let rotated = Rotation2::new(pose.heading) * local;
    (pose.x + rotated.x, pose.y + rotated.y)
}
