// control/search.rs

// Search (circling) controller: rotates the rover in place to reacquire a
// missed cone. Two back-to-back ~175 degree sweeps (back half, then
// forward half) cover roughly 350 degrees with a small overlap margin so a
// cone near the sweep boundary is not missed on either pass.

use crate::core::pose::normalize;

/// The sweep arc per phase. Not exposed as a runtime option (the external
/// interface table has no key for it); fixed at this constant, but every
/// target-heading update goes through `normalize` so repeated 175-degree
/// additions across a long search never drift outside `(-pi, pi]`.
pub const SWEEP_DEGREES: f64 = 175.0;

/// Gains and limits for the in-place sweep.
#[derive(Clone, Copy, Debug)]
pub struct SearchGains {
    pub max_turning: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub circling_relative_speed: f64,
    pub angle_tolerance: f64,
}

/// Speed/turning command for one sweep tick. Constant for the duration of a
/// phase; only the alignment check varies tick to tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchCommand {
    pub speed: f64,
    pub turning: f64,
}

/// The fixed-rate in-place turn command used for both sweep phases.
pub fn sweep_command(gains: &SearchGains) -> SearchCommand {
    SearchCommand {
        speed: (gains.min_speed * gains.circling_relative_speed).min(gains.max_speed),
        turning: gains.max_turning,
    }
}

/// True once the heading error to `target_heading` is within tolerance and
/// the current sweep phase is complete.
pub fn is_aligned(diff: f64, tolerance: f64) -> bool {
    diff.abs() <= tolerance
}

/// First sweep target: `yaw + 175 deg`, normalized.
pub fn initial_target_heading(yaw: f64) -> f64 {
    normalize(yaw + SWEEP_DEGREES.to_radians())
}

/// Second sweep target, relative to the first: `target + 175 deg`,
/// normalized to avoid drift accumulation across repeated searches.
pub fn advance_target_heading(target_heading: f64) -> f64 {
    normalize(target_heading + SWEEP_DEGREES.to_radians())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn gains() -> SearchGains {
        SearchGains {
            max_turning: 5.0,
            min_speed: 0.1,
            max_speed: 2.0,
            circling_relative_speed: 1.5,
            angle_tolerance: 0.15,
        }
    }

    #[test]
    fn sweep_speed_uses_relative_speed_factor() {
        let cmd = sweep_command(&gains());
        assert_relative_eq!(cmd.speed, 0.15, epsilon = 1e-9);
        assert_relative_eq!(cmd.turning, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn sweep_speed_caps_at_max_speed() {
        let gains = SearchGains { min_speed: 2.0, circling_relative_speed: 5.0, max_speed: 3.0, ..gains() };
        let cmd = sweep_command(&gains);
        assert_relative_eq!(cmd.speed, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn target_heading_sequence_stays_normalized() {
        let yaw = 3.0; // close to pi, so +175deg would overflow without wrapping
        let first = initial_target_heading(yaw);
        assert!((-PI..=PI).contains(&first));
        let second = advance_target_heading(first);
        assert!((-PI..=PI).contains(&second));
    }

    #[test]
    fn two_sweeps_cover_roughly_350_degrees() {
        let yaw = 0.0;
        let first = initial_target_heading(yaw);
        let second = advance_target_heading(first);
        // second should be close to yaw - 10 degrees (350 total from start).
        let total_swept = normalize(second - yaw).to_degrees();
        assert_relative_eq!(total_swept.abs(), 10.0, epsilon = 1e-6);
    }
}
