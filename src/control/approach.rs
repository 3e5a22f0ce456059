// control/approach.rs

// Two-term proportional controller driving the final approach to a cone:
// maps (distance, heading) from the vision adapter into (speed, turning),
// clamped by the current cone waypoint's min/max speed factors and latched
// once the rover gets close. Stateless — `cone_is_close` is owned by the
// navigator context (core::state) and threaded through as a value.

use crate::vision::{self, CameraIntrinsics, ConeDetection};

/// Gains and global limits for the approach controller, loaded once from
/// `NavConfig` at startup.
#[derive(Clone, Copy, Debug)]
pub struct ApproachGains {
    pub k_speed: f64,
    pub k_turning: f64,
    pub max_turning: f64,
    pub cone_close_distance: f64,
}

/// Result of one approach-controller tick: the dimensionless `(speed,
/// turning)` pair plus the updated `cone_is_close` latch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ApproachCommand {
    pub speed: f64,
    pub turning: f64,
    pub cone_is_close: bool,
}

/// Final output, branched on `cone_approach_use_throttle`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ApproachOutput {
    /// Manual speed/turning in `[-1, 1]`, destined for servo override.
    Throttle { speed: f64, turning: f64 },
    /// Velocity setpoint for guided mode.
    Guided { linear_x: f64, angular_z: f64 },
}

/// One control tick. `min_speed_factor`/`max_speed_factor` are the current
/// cone waypoint's decoded `(cone_min_speed_factor, cruise_factor)`.
pub fn compute(
    detection: &ConeDetection,
    intrinsics: &CameraIntrinsics,
    min_speed_factor: f64,
    max_speed_factor: f64,
    cone_is_close: bool,
    gains: &ApproachGains,
) -> ApproachCommand {
    let d = vision::distance(detection);
    let h = vision::heading(detection, intrinsics);

    let cone_is_close = cone_is_close || d <= gains.cone_close_distance;
    // Cap to the minimum once the rover is close, per §4.D.
    let max_speed = if cone_is_close { min_speed_factor } else { max_speed_factor };
    // A waypoint's z-field can legally decode to a min-speed factor above
    // its cruise factor (e.g. z=1150); `f64::clamp` panics if its bounds
    // arrive inverted, so sort them instead of trusting encode order.
    let lo = min_speed_factor.min(max_speed);
    let hi = min_speed_factor.max(max_speed);

    let speed = (gains.k_speed * d).clamp(lo, hi);
    let turning = h.signum() * (gains.k_turning * h.abs()).min(gains.max_turning);

    ApproachCommand { speed, turning, cone_is_close }
}

/// Converts a computed command into the output the configured mode expects.
///
/// Guided mode multiplies `turning` by `max_turning` even though `turning`
/// is already clamped to `max_turning` above — this is the documented
/// double multiplication from the upstream source (see DESIGN.md); it is
/// preserved verbatim rather than "fixed".
pub fn realize(
    command: ApproachCommand,
    use_throttle: bool,
    normal_speed: f64,
    min_speed_abs: f64,
    max_turning: f64,
) -> ApproachOutput {
    if use_throttle {
        ApproachOutput::Throttle { speed: command.speed, turning: command.turning }
    } else {
        ApproachOutput::Guided {
            linear_x: (command.speed * normal_speed).max(min_speed_abs),
            angular_z: command.turning * max_turning,
        }
    }
}
