// core/pose.rs

// Pose representation and the trigonometric building blocks the state
// machine and controllers share: yaw extraction, angle normalization, and
// point-to-point bearing. Kept deliberately free of ROS types so it can be
// unit tested without a running node.

use nalgebra::{UnitQuaternion, Vector3};
use std::f64::consts::PI;

/// Robot position and orientation in the metric map frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub orientation: UnitQuaternion<f64>,
}

impl Pose {
    pub fn new(x: f64, y: f64, z: f64, orientation: UnitQuaternion<f64>) -> Self {
        Pose { x, y, z, orientation }
    }

    /// Heading extracted from the orientation quaternion (ZYX Euler yaw).
    pub fn yaw(&self) -> f64 {
        yaw(&self.orientation)
    }
}

/// A bare 2D point, used where only `(x, y)` matters (waypoints, bearings).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl From<Pose> for Point2 {
    fn from(p: Pose) -> Self {
        Point2 { x: p.x, y: p.y }
    }
}

/// ZYX Euler yaw extraction from a unit quaternion.
pub fn yaw(q: &UnitQuaternion<f64>) -> f64 {
    let (_, _, yaw) = q.euler_angles();
    yaw
}

/// Builds a unit quaternion encoding only a yaw rotation, for tests and for
/// any caller that only tracks heading (no roll/pitch).
pub fn quat_from_yaw(yaw: f64) -> UnitQuaternion<f64> {
    UnitQuaternion::from_axis_angle(&Vector3::z_axis(), yaw)
}

/// Reduces an angle to `(-pi, pi]`.
pub fn normalize(theta: f64) -> f64 {
    let mut a = (theta + PI) % (2.0 * PI);
    if a <= 0.0 {
        a += 2.0 * PI;
    }
    a - PI
}

/// Bearing from `from` to `to`, in `(-pi, pi]`.
pub fn bearing(from: Point2, to: Point2) -> f64 {
    (to.y - from.y).atan2(to.x - from.x)
}
