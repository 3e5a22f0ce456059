// core/state.rs

// The navigator state machine: nine states (including the transient
// `Limbo`), the events that drive it, and the transition table from the
// external interface. `NavigatorContext` is an explicit struct rather than
// a process-global; the event loop owns one `StateMachine` and feeds it
// events serially.

use crate::autopilot::{servo, AutopilotBridge, AutopilotMode, ParamValue};
use crate::config::{EscapeStrategy, NavConfig};
use crate::control::{approach, escape, search};
use crate::core::mission::{Mission, Waypoint};
use crate::core::pose::{bearing, normalize, Pose};
use crate::vision::{self, CameraIntrinsics, ConeDetection};
use std::time::{Duration, Instant};

/// The simple-backup escape strategy's idle phase has no corresponding
/// config key in the external interface table; the source hardcodes it.
const SIMPLE_BACKUP_IDLE_SECONDS: f64 = 2.0;

/// The deferred continuation a `Limbo` state resumes into once its timer
/// expires. Every blocking sleep the touch/escape sequence needs becomes
/// one of these instead of a real thread sleep, so the event loop never
/// blocks waiting on a mechanical settle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PendingAction {
    /// After the post-arm settle sleep: set the starting waypoint index and
    /// switch to AUTO.
    BeginFollowing { start_index: usize },
    /// After the initial touch-reverse phase: go idle, then dispatch the
    /// configured escape strategy.
    TouchIdle { cone_wp_index: usize },
    /// After the idle phase following a touch: pick simple vs. aligned
    /// backup.
    DispatchEscape { cone_wp_index: usize },
    /// After the simple-backup drive phase: go idle for the fixed 2s pause.
    SimpleBackupIdle { cone_wp_index: usize },
    /// After any escape's final idle: resume following at `cone_wp_index + 1`.
    ResumeFollowing { cone_wp_index: usize },
}

/// Navigator state. `Limbo` is transient and ignores every event except the
/// synthesized `TimerExpired` once its deadline has passed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NavigatorState {
    WaitingForStart,
    FollowingWaypoints,
    CirclingBack,
    CirclingForward,
    DrivingToCone,
    EscapingCone,
    Finished,
    Failed,
    Limbo { resume_at: Instant, pending: PendingAction },
}

impl NavigatorState {
    /// String form for the published status topic only; never matched on.
    pub fn as_str(&self) -> &'static str {
        match self {
            NavigatorState::WaitingForStart => "WAITING_FOR_START",
            NavigatorState::FollowingWaypoints => "FOLLOWING_WAYPOINTS",
            NavigatorState::CirclingBack => "CIRCLING_BACK",
            NavigatorState::CirclingForward => "CIRCLING_FORWARD",
            NavigatorState::DrivingToCone => "DRIVING_TO_CONE",
            NavigatorState::EscapingCone => "ESCAPING_CONE",
            NavigatorState::Finished => "FINISHED",
            NavigatorState::Failed => "FAILED",
            NavigatorState::Limbo { .. } => "LIMBO",
        }
    }
}

/// The exec command topic's three recognized values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecCommand {
    Start,
    Reset,
    AdjustWaypoints,
}

/// Every input the state machine reacts to.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    Exec(ExecCommand),
    AutopilotState(AutopilotMode),
    WaypointsChanged { waypoints: Vec<Waypoint>, current_seq: usize },
    RobotPose(Pose),
    ConeLocations(Vec<ConeDetection>),
    Touch(bool),
    MapWaypoints(Vec<Waypoint>),
    /// Synthesized by the event loop when a `Limbo` deadline has elapsed.
    TimerExpired,
}

/// Side effects a single `handle` call can produce besides autopilot
/// commands, which go straight through the bridge.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Effects {
    /// The rewritten map-frame waypoint list, ready to publish, produced by
    /// `ADJUST_WAYPOINTS`.
    pub adjusted_waypoints: Option<Vec<Waypoint>>,
}

/// Mutable fields the event loop owns uniquely and handlers borrow in
/// sequence. `cone_wp_index` is only defined while a cone episode is live
/// (`DRIVING_TO_CONE`/`CIRCLING_BACK`/`CIRCLING_FORWARD`/`ESCAPING_CONE`);
/// `cone_is_close` latches true for that episode and clears whenever the
/// current waypoint changes.
#[derive(Clone, Debug, Default)]
pub struct NavigatorContext {
    pub cone_wp_index: Option<usize>,
    pub cone_is_close: bool,
    pub target_heading: f64,
    pub last_cruise_speed: Option<f64>,
    pub cone_lost_count: u32,
    pub robot_pose: Option<Pose>,
    pub mission: Mission,
    pub map_waypoints: Vec<Waypoint>,
}

/// Owns the current state, the mutable context, the loaded configuration,
/// and the autopilot bridge; `handle` is the only entry point.
pub struct StateMachine<B: AutopilotBridge> {
    state: NavigatorState,
    ctx: NavigatorContext,
    cfg: NavConfig,
    bridge: B,
}

impl<B: AutopilotBridge> StateMachine<B> {
    pub fn new(cfg: NavConfig, bridge: B) -> Self {
        StateMachine { state: NavigatorState::WaitingForStart, ctx: NavigatorContext::default(), cfg, bridge }
    }

    pub fn state(&self) -> &NavigatorState {
        &self.state
    }

    pub fn context(&self) -> &NavigatorContext {
        &self.ctx
    }

    /// Processes one event. `now` is threaded in explicitly (rather than
    /// read from the clock here) so timer logic is deterministic in tests.
    pub fn handle(&mut self, event: Event, now: Instant) -> Effects {
        if let NavigatorState::Limbo { resume_at, pending } = self.state {
            if event == Event::TimerExpired && now >= resume_at {
                self.resolve_pending(pending, now);
            }
            return Effects::default();
        }

        match event {
            Event::RobotPose(pose) => {
                self.ctx.robot_pose = Some(pose);
                if self.state == NavigatorState::EscapingCone {
                    self.aligned_backup_tick(now);
                }
            }
            Event::MapWaypoints(waypoints) => self.ctx.map_waypoints = waypoints,
            Event::Exec(ExecCommand::Start) => self.handle_start(now),
            Event::Exec(ExecCommand::Reset) => self.handle_reset(),
            Event::Exec(ExecCommand::AdjustWaypoints) => return self.handle_adjust_waypoints(),
            Event::AutopilotState(mode) => {
                if self.state == NavigatorState::FollowingWaypoints && mode == AutopilotMode::Hold {
                    self.begin_circling_back();
                }
            }
            Event::WaypointsChanged { waypoints, current_seq } => {
                if self.state == NavigatorState::FollowingWaypoints {
                    self.handle_waypoints_changed(waypoints, current_seq);
                } else if self.state == NavigatorState::WaitingForStart {
                    // The transition table only defines this event while
                    // FOLLOWING_WAYPOINTS; before START there is no other
                    // input that loads the mission, so the initial list is
                    // accepted here without the cruise-speed/cone-index side
                    // effects rule 4 applies mid-mission.
                    self.ctx.mission.waypoints = waypoints;
                    self.ctx.mission.current_seq = current_seq;
                }
            }
            Event::ConeLocations(detections) => match self.state {
                NavigatorState::FollowingWaypoints => self.handle_cone_locations_while_following(&detections),
                NavigatorState::CirclingBack | NavigatorState::CirclingForward => {
                    self.handle_cone_locations_while_searching(&detections)
                }
                NavigatorState::DrivingToCone => self.handle_cone_locations_while_driving(&detections),
                _ => {}
            },
            Event::Touch(true) if self.state == NavigatorState::DrivingToCone => self.handle_touch(now),
            Event::Touch(_) | Event::TimerExpired => {}
        }

        Effects::default()
    }

    fn call(&mut self, result: Result<(), crate::autopilot::AutopilotError>) {
        if let Err(e) = result {
            log::error!("autopilot command failed: {}", e);
        }
    }

    fn handle_start(&mut self, now: Instant) {
        if self.state != NavigatorState::WaitingForStart {
            return;
        }
        if self.ctx.mission.len() < 2 {
            log::warn!("START requires at least 2 waypoints, got {}", self.ctx.mission.len());
            return;
        }
        if let Some(gcs_id) = self.cfg.gcs_id {
            let result = self.bridge.set_parameter("SYSID_MYGCS", ParamValue::Int(gcs_id));
            self.call(result);
        }
        let result = self.bridge.arm(true);
        self.call(result);
        self.state = NavigatorState::Limbo {
            resume_at: now + Duration::from_secs(1),
            pending: PendingAction::BeginFollowing { start_index: 1 },
        };
    }

    fn handle_reset(&mut self) {
        let zero = servo::encode(0.0, 0.0, &self.cfg);
        let result = self.bridge.override_rc(zero);
        self.call(result);
        self.ctx = NavigatorContext::default();
        self.state = NavigatorState::WaitingForStart;
    }

    fn handle_adjust_waypoints(&mut self) -> Effects {
        if self.ctx.map_waypoints.is_empty() {
            log::warn!("ADJUST_WAYPOINTS requested with no map waypoints available");
            return Effects::default();
        }
        let adjusted = Mission::adjust_relative_to_origin(&self.ctx.map_waypoints);
        Effects { adjusted_waypoints: Some(adjusted) }
    }

    fn handle_waypoints_changed(&mut self, waypoints: Vec<Waypoint>, current_seq: usize) {
        self.ctx.mission.waypoints = waypoints;
        self.ctx.mission.current_seq = current_seq;

        if let Some(cone_idx) = self.ctx.cone_wp_index {
            if current_seq > cone_idx {
                self.begin_circling_back();
                return;
            }
        }

        let Some(wp) = self.ctx.mission.get(current_seq).copied() else { return };
        let meta = wp.meta();
        let new_cruise = self.cfg.normal_speed * meta.cruise_factor;
        if self.ctx.last_cruise_speed != Some(new_cruise) {
            let result = self.bridge.set_mode(AutopilotMode::Hold);
            self.call(result);
            let result = self.bridge.set_parameter("CRUISE_SPEED", ParamValue::Real(new_cruise));
            self.call(result);
            let result = self.bridge.set_mode(AutopilotMode::Auto);
            self.call(result);
            self.ctx.last_cruise_speed = Some(new_cruise);
        }
        if meta.is_cone {
            self.ctx.cone_wp_index = Some(current_seq);
            self.ctx.cone_is_close = false;
        }
    }

    /// `FOLLOWING_WAYPOINTS` only reacts to a qualifying detection (rule 5);
    /// a sub-threshold tick has no listed rule in this state and must be a
    /// no-op, not a sweep-advance — the rover is still under the
    /// autopilot's own AUTO-mode navigation here, not searching.
    fn handle_cone_locations_while_following(&mut self, detections: &[ConeDetection]) {
        let Some(cone_wp_index) = self.ctx.cone_wp_index else { return };
        if vision::select(detections, self.cfg.cone_recovery_min_area).is_some() {
            self.begin_driving_to_cone(cone_wp_index);
        }
    }

    fn handle_cone_locations_while_searching(&mut self, detections: &[ConeDetection]) {
        let Some(cone_wp_index) = self.ctx.cone_wp_index else { return };
        if vision::select(detections, self.cfg.cone_recovery_min_area).is_some() {
            self.begin_driving_to_cone(cone_wp_index);
            return;
        }
        self.advance_sweep();
    }

    fn handle_cone_locations_while_driving(&mut self, detections: &[ConeDetection]) {
        let Some(cone_wp_index) = self.ctx.cone_wp_index else { return };
        match vision::select(detections, self.cfg.cone_normal_min_area) {
            Some(detection) => {
                self.ctx.cone_lost_count = 0;
                let Some(wp) = self.ctx.mission.get(cone_wp_index).copied() else { return };
                let meta = wp.meta();
                let gains = self.approach_gains();
                let intrinsics = self.camera_intrinsics();
                let command = approach::compute(
                    &detection,
                    &intrinsics,
                    meta.cone_min_speed_factor,
                    meta.cruise_factor,
                    self.ctx.cone_is_close,
                    &gains,
                );
                self.ctx.cone_is_close = command.cone_is_close;
                let output = approach::realize(
                    command,
                    self.cfg.cone_approach_use_throttle,
                    self.cfg.normal_speed,
                    self.cfg.min_speed,
                    self.cfg.max_turning,
                );
                let result = match output {
                    approach::ApproachOutput::Throttle { speed, turning } => {
                        self.bridge.override_rc(servo::encode(speed, turning, &self.cfg))
                    }
                    approach::ApproachOutput::Guided { linear_x, angular_z } => {
                        self.bridge.publish_velocity(linear_x, angular_z)
                    }
                };
                self.call(result);
            }
            None => {
                self.ctx.cone_lost_count += 1;
                if self.ctx.cone_lost_count > self.cfg.cone_lost_limit {
                    self.begin_circling_back();
                }
            }
        }
    }

    fn handle_touch(&mut self, now: Instant) {
        let Some(cone_wp_index) = self.ctx.cone_wp_index else { return };
        if Some(cone_wp_index) == self.ctx.mission.last_index() {
            let result = self.bridge.override_rc(servo::encode(0.0, 0.0, &self.cfg));
            self.call(result);
            let result = self.bridge.set_mode(AutopilotMode::Hold);
            self.call(result);
            self.state = NavigatorState::Finished;
            return;
        }

        let reverse = servo::encode(self.cfg.direction_change_reverse_speed, 0.0, &self.cfg);
        let result = self.bridge.override_rc(reverse);
        self.call(result);
        self.state = NavigatorState::Limbo {
            resume_at: now + Duration::from_secs_f64(self.cfg.direction_change_reverse_duration),
            pending: PendingAction::TouchIdle { cone_wp_index },
        };
    }

    fn begin_circling_back(&mut self) {
        let Some(cone_wp_index) = self.ctx.cone_wp_index else { return };
        let Some(yaw) = self.ctx.robot_pose.map(|p| p.yaw()) else { return };
        let result = self.bridge.set_mode(AutopilotMode::Manual);
        self.call(result);
        self.ctx.target_heading = search::initial_target_heading(yaw);
        self.ctx.cone_wp_index = Some(cone_wp_index);
        let sweep = search::sweep_command(&self.search_gains());
        let result = self.bridge.override_rc(servo::encode(sweep.speed, sweep.turning, &self.cfg));
        self.call(result);
        self.state = NavigatorState::CirclingBack;
    }

    fn begin_driving_to_cone(&mut self, cone_wp_index: usize) {
        self.ctx.cone_wp_index = Some(cone_wp_index);
        self.ctx.cone_lost_count = 0;
        let mode = if self.cfg.cone_approach_use_throttle { AutopilotMode::Manual } else { AutopilotMode::Guided };
        let result = self.bridge.set_mode(mode);
        self.call(result);
        self.state = NavigatorState::DrivingToCone;
    }

    fn advance_sweep(&mut self) {
        let Some(cone_wp_index) = self.ctx.cone_wp_index else { return };
        let Some(yaw) = self.ctx.robot_pose.map(|p| p.yaw()) else { return };
        let diff = normalize(self.ctx.target_heading - yaw);

        if !search::is_aligned(diff, self.cfg.circling_angle_tolerance) {
            let sweep = search::sweep_command(&self.search_gains());
            let result = self.bridge.override_rc(servo::encode(sweep.speed, sweep.turning, &self.cfg));
            self.call(result);
            return;
        }

        match self.state {
            NavigatorState::CirclingBack => {
                self.ctx.target_heading = search::advance_target_heading(self.ctx.target_heading);
                let sweep = search::sweep_command(&self.search_gains());
                let result = self.bridge.override_rc(servo::encode(sweep.speed, sweep.turning, &self.cfg));
                self.call(result);
                self.state = NavigatorState::CirclingForward;
            }
            NavigatorState::CirclingForward => {
                if cone_wp_index + 1 < self.ctx.mission.len() {
                    let result = self.bridge.set_current_waypoint((cone_wp_index + 1) as u16);
                    self.call(result);
                    self.ctx.mission.current_seq = cone_wp_index + 1;
                    self.ctx.cone_wp_index = None;
                    self.ctx.cone_is_close = false;
                    self.state = NavigatorState::FollowingWaypoints;
                } else {
                    let result = self.bridge.override_rc(servo::encode(0.0, 0.0, &self.cfg));
                    self.call(result);
                    let result = self.bridge.set_mode(AutopilotMode::Hold);
                    self.call(result);
                    self.state = NavigatorState::Failed;
                }
            }
            _ => {}
        }
    }

    fn aligned_backup_tick(&mut self, now: Instant) {
        let Some(yaw) = self.ctx.robot_pose.map(|p| p.yaw()) else { return };
        let Some(cone_wp_index) = self.ctx.cone_wp_index else { return };
        let diff = normalize(self.ctx.target_heading - yaw);
        let gains = self.escape_aligned_gains();

        if !escape::is_aligned(diff, gains.angle_tolerance) {
            let command = escape::aligned_tick(diff, &gains);
            let result = self.bridge.override_rc(servo::encode(command.speed, command.turning, &self.cfg));
            self.call(result);
            return;
        }

        let result = self.bridge.override_rc(servo::encode(0.0, 0.0, &self.cfg));
        self.call(result);
        self.state = NavigatorState::Limbo {
            resume_at: now + Duration::from_secs_f64(self.cfg.direction_change_idle_duration),
            pending: PendingAction::ResumeFollowing { cone_wp_index },
        };
    }

    fn resolve_pending(&mut self, pending: PendingAction, now: Instant) {
        match pending {
            PendingAction::BeginFollowing { start_index } => {
                let result = self.bridge.set_current_waypoint(start_index as u16);
                self.call(result);
                let result = self.bridge.set_mode(AutopilotMode::Auto);
                self.call(result);
                self.ctx.mission.current_seq = start_index;
                self.state = NavigatorState::FollowingWaypoints;
            }
            PendingAction::TouchIdle { cone_wp_index } => {
                let result = self.bridge.override_rc(servo::encode(0.0, 0.0, &self.cfg));
                self.call(result);
                self.state = NavigatorState::Limbo {
                    resume_at: now + Duration::from_secs_f64(self.cfg.direction_change_idle_duration),
                    pending: PendingAction::DispatchEscape { cone_wp_index },
                };
            }
            PendingAction::DispatchEscape { cone_wp_index } => match self.cfg.escape_strategy {
                EscapeStrategy::SimpleBackup => {
                    let reverse = servo::encode(-self.cfg.escape_min_speed, 0.0, &self.cfg);
                    let result = self.bridge.override_rc(reverse);
                    self.call(result);
                    self.state = NavigatorState::Limbo {
                        resume_at: now + Duration::from_secs_f64(self.cfg.escape_backup_duration),
                        pending: PendingAction::SimpleBackupIdle { cone_wp_index },
                    };
                }
                EscapeStrategy::AlignedBackup => {
                    let cone_point = self.ctx.mission.get(cone_wp_index).map(|wp| wp.point());
                    let next_point = self.ctx.mission.get(cone_wp_index + 1).map(|wp| wp.point());
                    if let (Some(from), Some(to)) = (cone_point, next_point) {
                        self.ctx.target_heading = bearing(from, to);
                    }
                    self.state = NavigatorState::EscapingCone;
                }
            },
            PendingAction::SimpleBackupIdle { cone_wp_index } => {
                let result = self.bridge.override_rc(servo::encode(0.0, 0.0, &self.cfg));
                self.call(result);
                self.state = NavigatorState::Limbo {
                    resume_at: now + Duration::from_secs_f64(SIMPLE_BACKUP_IDLE_SECONDS),
                    pending: PendingAction::ResumeFollowing { cone_wp_index },
                };
            }
            PendingAction::ResumeFollowing { cone_wp_index } => {
                let next = cone_wp_index + 1;
                let result = self.bridge.set_current_waypoint(next as u16);
                self.call(result);
                let result = self.bridge.set_mode(AutopilotMode::Auto);
                self.call(result);
                self.ctx.mission.current_seq = next;
                // `cone_wp_index` is only defined again once rule 4 finds the
                // new current waypoint is itself a cone (invariant 1); left
                // set here, the next `current_seq` update would read as
                // "advanced past an untouched cone" and misfire rule 3.
                self.ctx.cone_wp_index = None;
                self.ctx.cone_is_close = false;
                self.state = NavigatorState::FollowingWaypoints;
            }
        }
    }

    fn approach_gains(&self) -> approach::ApproachGains {
        approach::ApproachGains {
            k_speed: self.cfg.cone_approach_k_speed,
            k_turning: self.cfg.cone_approach_k_turning,
            max_turning: self.cfg.max_turning,
            cone_close_distance: self.cfg.cone_close_distance,
        }
    }

    fn camera_intrinsics(&self) -> CameraIntrinsics {
        CameraIntrinsics { horz_fov_rad: self.cfg.horz_fov_rad(), horz_pixels: self.cfg.horz_pixels as f64 }
    }

    /// `escape_max_speed` has no entry in the external interface table; see
    /// `control::escape::AlignedGains` for the Open Question this resolves.
    fn escape_aligned_gains(&self) -> escape::AlignedGains {
        escape::AlignedGains {
            k_speed: self.cfg.escape_k_speed,
            k_turning: self.cfg.escape_k_turning,
            max_turning: self.cfg.max_turning,
            min_speed: self.cfg.min_speed,
            max_speed: self.cfg.escape_min_speed,
            angle_tolerance: self.cfg.escape_angle_tolerance,
        }
    }

    /// Circling's sweep speed formula names a `max_speed` that has no
    /// matching config key either; `normal_speed` is the only other speed
    /// ceiling the interface table defines, so it plays that role here.
    fn search_gains(&self) -> search::SearchGains {
        search::SearchGains {
            max_turning: self.cfg.max_turning,
            min_speed: self.cfg.min_speed,
            max_speed: self.cfg.normal_speed,
            circling_relative_speed: self.cfg.circling_relative_speed,
            angle_tolerance: self.cfg.circling_angle_tolerance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autopilot::MockAutopilotBridge;
    use crate::core::pose::quat_from_yaw;

    fn pose(x: f64, y: f64, yaw: f64) -> Pose {
        Pose::new(x, y, 0.0, quat_from_yaw(yaw))
    }

    fn cone_detection(area: f64) -> ConeDetection {
        ConeDetection { x_pixel_offset: 0.0, area_pixels: area, y_pixel_offset: 0.0, depth: 0.0 }
    }

    fn permissive_mock() -> MockAutopilotBridge {
        let mut mock = MockAutopilotBridge::new();
        mock.expect_arm().returning(|_| Ok(()));
        mock.expect_set_mode().returning(|_| Ok(()));
        mock.expect_set_parameter().returning(|_, _| Ok(()));
        mock.expect_set_current_waypoint().returning(|_| Ok(()));
        mock.expect_push_waypoints().returning(|_| Ok(()));
        mock.expect_override_rc().returning(|_| Ok(()));
        mock.expect_publish_velocity().returning(|_, _| Ok(()));
        mock
    }

    #[test]
    fn start_requires_two_waypoints() {
        let mut sm = StateMachine::new(NavConfig::default(), permissive_mock());
        let now = Instant::now();
        sm.handle(Event::Exec(ExecCommand::Start), now);
        assert_eq!(*sm.state(), NavigatorState::WaitingForStart);
    }

    #[test]
    fn start_writes_sysid_mygcs_when_configured() {
        let mut mock = MockAutopilotBridge::new();
        mock.expect_set_parameter()
            .withf(|name, value| name == "SYSID_MYGCS" && matches!(value, ParamValue::Int(7)))
            .times(1)
            .returning(|_, _| Ok(()));
        mock.expect_arm().returning(|_| Ok(()));

        let mut cfg = NavConfig::default();
        cfg.gcs_id = Some(7);
        let mut sm = StateMachine::new(cfg, mock);
        let now = Instant::now();
        sm.handle(
            Event::WaypointsChanged {
                waypoints: vec![Waypoint::new(0.0, 0.0, 0.0), Waypoint::new(1.0, 0.0, 0.0)],
                current_seq: 0,
            },
            now,
        );
        sm.handle(Event::Exec(ExecCommand::Start), now);
    }

    #[test]
    fn start_enters_limbo_then_following_waypoints() {
        let mut sm = StateMachine::new(NavConfig::default(), permissive_mock());
        let now = Instant::now();
        sm.handle(
            Event::WaypointsChanged {
                waypoints: vec![Waypoint::new(0.0, 0.0, 0.0), Waypoint::new(1.0, 0.0, 0.0)],
                current_seq: 0,
            },
            now,
        );
        sm.handle(Event::Exec(ExecCommand::Start), now);
        assert!(matches!(sm.state(), NavigatorState::Limbo { .. }));

        sm.handle(Event::TimerExpired, now);
        assert!(matches!(sm.state(), NavigatorState::Limbo { .. }), "timer not yet due");

        sm.handle(Event::TimerExpired, now + Duration::from_secs(2));
        assert_eq!(*sm.state(), NavigatorState::FollowingWaypoints);
    }

    #[test]
    fn waypoints_changed_sets_cone_index_and_clears_close() {
        let mut sm = StateMachine::new(NavConfig::default(), permissive_mock());
        sm.state = NavigatorState::FollowingWaypoints;
        sm.ctx.cone_is_close = true;
        let now = Instant::now();
        sm.handle(
            Event::WaypointsChanged {
                waypoints: vec![
                    Waypoint::new(0.0, 0.0, 0.0),
                    Waypoint::new(1.0, 0.0, 1030.0),
                    Waypoint::new(2.0, 0.0, 2000.0),
                ],
                current_seq: 1,
            },
            now,
        );
        assert_eq!(sm.ctx.cone_wp_index, Some(1));
        assert!(!sm.ctx.cone_is_close);
    }

    #[test]
    fn current_seq_jump_past_cone_triggers_circling_back() {
        let mut sm = StateMachine::new(NavConfig::default(), permissive_mock());
        sm.state = NavigatorState::FollowingWaypoints;
        sm.ctx.cone_wp_index = Some(1);
        sm.ctx.robot_pose = Some(pose(0.0, 0.0, 0.0));
        sm.ctx.mission = Mission::new(vec![
            Waypoint::new(0.0, 0.0, 0.0),
            Waypoint::new(1.0, 0.0, 1030.0),
            Waypoint::new(2.0, 0.0, 0.0),
        ]);
        let now = Instant::now();
        let waypoints = sm.ctx.mission.waypoints.clone();
        sm.handle(Event::WaypointsChanged { waypoints, current_seq: 2 }, now);
        assert_eq!(*sm.state(), NavigatorState::CirclingBack);
        assert!((sm.ctx.target_heading - 175f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn cone_lost_for_16_ticks_triggers_circling_back() {
        let mut sm = StateMachine::new(NavConfig::default(), permissive_mock());
        sm.state = NavigatorState::DrivingToCone;
        sm.ctx.cone_wp_index = Some(0);
        sm.ctx.robot_pose = Some(pose(0.0, 0.0, 0.0));
        sm.ctx.mission = Mission::new(vec![Waypoint::new(0.0, 0.0, 1030.0), Waypoint::new(1.0, 0.0, 0.0)]);
        let now = Instant::now();
        for _ in 0..16 {
            sm.handle(Event::ConeLocations(vec![]), now);
        }
        assert_eq!(*sm.state(), NavigatorState::CirclingBack);
    }

    #[test]
    fn circling_forward_without_detection_at_last_waypoint_fails() {
        let mut sm = StateMachine::new(NavConfig::default(), permissive_mock());
        sm.state = NavigatorState::CirclingForward;
        sm.ctx.cone_wp_index = Some(1);
        sm.ctx.target_heading = 0.0;
        sm.ctx.robot_pose = Some(pose(0.0, 0.0, 0.0));
        sm.ctx.mission = Mission::new(vec![Waypoint::new(0.0, 0.0, 0.0), Waypoint::new(1.0, 0.0, 2000.0)]);
        let now = Instant::now();
        sm.handle(Event::ConeLocations(vec![]), now);
        assert_eq!(*sm.state(), NavigatorState::Failed);
    }

    #[test]
    fn reset_from_any_state_returns_to_waiting_with_zero_command() {
        let mut mock = permissive_mock();
        mock.expect_override_rc()
            .withf(|cmd| cmd.channels[servo::THROTTLE_CHANNEL] == 1500)
            .returning(|_| Ok(()));
        let mut sm = StateMachine::new(NavConfig::default(), mock);
        sm.state = NavigatorState::DrivingToCone;
        sm.ctx.cone_wp_index = Some(3);
        sm.handle(Event::Exec(ExecCommand::Reset), Instant::now());
        assert_eq!(*sm.state(), NavigatorState::WaitingForStart);
        assert!(sm.ctx.cone_wp_index.is_none());
    }

    #[test]
    fn adjust_waypoints_without_map_waypoints_logs_and_ignores() {
        let mut sm = StateMachine::new(NavConfig::default(), permissive_mock());
        let effects = sm.handle(Event::Exec(ExecCommand::AdjustWaypoints), Instant::now());
        assert_eq!(effects.adjusted_waypoints, None);
    }

    #[test]
    fn adjust_waypoints_rewrites_relative_to_origin() {
        let mut sm = StateMachine::new(NavConfig::default(), permissive_mock());
        sm.handle(
            Event::MapWaypoints(vec![Waypoint::new(10.0, 10.0, 0.0), Waypoint::new(12.0, 11.0, 0.0)]),
            Instant::now(),
        );
        let effects = sm.handle(Event::Exec(ExecCommand::AdjustWaypoints), Instant::now());
        let adjusted = effects.adjusted_waypoints.unwrap();
        assert_eq!(adjusted[0].x_lat, 0.0);
        assert_eq!(adjusted[1].x_lat, 2.0);
    }

    #[test]
    fn driving_to_cone_detection_produces_command() {
        let mut sm = StateMachine::new(NavConfig::default(), permissive_mock());
        sm.state = NavigatorState::DrivingToCone;
        sm.ctx.cone_wp_index = Some(0);
        sm.ctx.mission = Mission::new(vec![Waypoint::new(0.0, 0.0, 1030.0), Waypoint::new(1.0, 0.0, 0.0)]);
        sm.handle(Event::ConeLocations(vec![cone_detection(500.0)]), Instant::now());
        assert_eq!(*sm.state(), NavigatorState::DrivingToCone);
        assert_eq!(sm.ctx.cone_lost_count, 0);
    }

    #[test]
    fn touch_at_last_cone_finishes() {
        let mut sm = StateMachine::new(NavConfig::default(), permissive_mock());
        sm.state = NavigatorState::DrivingToCone;
        sm.ctx.cone_wp_index = Some(1);
        sm.ctx.mission = Mission::new(vec![Waypoint::new(0.0, 0.0, 0.0), Waypoint::new(1.0, 0.0, 2000.0)]);
        sm.handle(Event::Touch(true), Instant::now());
        assert_eq!(*sm.state(), NavigatorState::Finished);
    }

    #[test]
    fn touch_midmission_enters_limbo_and_resumes_following() {
        let mut sm = StateMachine::new(NavConfig::default(), permissive_mock());
        sm.state = NavigatorState::DrivingToCone;
        sm.ctx.cone_wp_index = Some(1);
        sm.ctx.mission = Mission::new(vec![
            Waypoint::new(0.0, 0.0, 0.0),
            Waypoint::new(1.0, 0.0, 1030.0),
            Waypoint::new(2.0, 0.0, 2000.0),
        ]);
        let mut now = Instant::now();
        sm.handle(Event::Touch(true), now);
        assert!(matches!(sm.state(), NavigatorState::Limbo { .. }));

        now += Duration::from_secs(2);
        sm.handle(Event::TimerExpired, now); // reverse -> idle
        now += Duration::from_secs(2);
        sm.handle(Event::TimerExpired, now); // idle -> dispatch escape (simple backup)
        now += Duration::from_secs(2);
        sm.handle(Event::TimerExpired, now); // backup drive -> idle
        now += Duration::from_secs(3);
        sm.handle(Event::TimerExpired, now); // idle -> resume following
        assert_eq!(*sm.state(), NavigatorState::FollowingWaypoints);
        assert_eq!(sm.ctx.mission.current_seq, 2);
    }
}
