// control/escape.rs

// Post-touch escape maneuver. Two strategies, selected by configuration:
// a fixed-duration straight-line backup, or a heading-aligned backup that
// reverses while steering onto the bearing to the next waypoint. The timed
// phases (reverse, idle, backup duration) are sequenced by the navigator's
// `Limbo` timer (see core::state); this module only computes the per-tick
// speed/turning for the aligned strategy and the fixed command for the
// simple strategy.

/// Gains and limits for the heading-aligned backup.
///
/// `min_speed`/`max_speed` bound the reverse-speed magnitude. There is no
/// distinct `escape_max_speed` config key; this crate uses the global
/// `min_speed` as the floor and `escape_min_speed` as the ceiling, so the
/// aligned strategy saturates at the same reverse speed the simple
/// strategy drives at a fixed rate (see DESIGN.md).
#[derive(Clone, Copy, Debug)]
pub struct AlignedGains {
    pub k_speed: f64,
    pub k_turning: f64,
    pub max_turning: f64,
    pub min_speed: f64,
    pub max_speed: f64,
    pub angle_tolerance: f64,
}

/// Speed/turning command for one aligned-backup tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlignedCommand {
    pub speed: f64,
    pub turning: f64,
}

/// True once the heading error is within tolerance and the aligned backup
/// should stop driving and proceed to the idle/resume phase.
pub fn is_aligned(diff: f64, tolerance: f64) -> bool {
    diff.abs() <= tolerance
}

/// One aligned-backup tick given the current heading error
/// `diff = normalize(target_heading - yaw)`.
pub fn aligned_tick(diff: f64, gains: &AlignedGains) -> AlignedCommand {
    let magnitude = (gains.k_speed * diff.abs()).clamp(gains.min_speed, gains.max_speed);
    AlignedCommand {
        speed: -magnitude,
        turning: diff.signum() * (gains.k_turning * diff.abs()).min(gains.max_turning),
    }
}
