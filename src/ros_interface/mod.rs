//! ROS 2 interface for the navigation core.
//!
//! Wires the external topics the navigator consumes and produces onto the
//! generic `Publisher<T>`/`Subscriber<T>` wrappers. Everything here is
//! plumbing: decoding wire messages into `core::Event`s and encoding core
//! outputs back into messages. The navigator's actual logic lives in
//! `core::state::StateMachine` and never sees an `r2r` type.

mod publisher;
mod subscriber;

pub use publisher::*;
pub use subscriber::*;

use crate::core::mission::Waypoint;
use crate::core::pose::Pose;
use crate::core::state::{Event, ExecCommand};
use crate::vision::ConeDetection;
use nalgebra::{Quaternion, UnitQuaternion};
use r2r::{Node, QosProfile};

/// All topics the navigator subscribes to.
pub struct NavSubscribers {
    mission_waypoints: Subscriber<r2r::std_msgs::msg::Float64MultiArray>,
    mission_current_seq: Subscriber<r2r::std_msgs::msg::UInt16>,
    robot_pose: Subscriber<r2r::nav_msgs::msg::Odometry>,
    cone_locations: Subscriber<r2r::std_msgs::msg::Float64MultiArray>,
    touch: Subscriber<r2r::std_msgs::msg::Bool>,
    map_waypoints: Subscriber<r2r::std_msgs::msg::Float64MultiArray>,
    exec_command: Subscriber<r2r::std_msgs::msg::String>,
    autopilot_state: Subscriber<r2r::std_msgs::msg::String>,
}

impl NavSubscribers {
    fn new(node: &mut Node, qos: &QosProfile) -> Result<Self, r2r::Error> {
        Ok(NavSubscribers {
            mission_waypoints: Subscriber::new(node, "/magellan/mission/waypoints", qos.clone())?,
            mission_current_seq: Subscriber::new(node, "/magellan/mission/current_seq", qos.clone())?,
            robot_pose: Subscriber::new(node, "/magellan/pose", qos.clone())?,
            cone_locations: Subscriber::new(node, "/magellan/vision/cones", qos.clone())?,
            touch: Subscriber::new(node, "/magellan/sensors/touch", qos.clone())?,
            map_waypoints: Subscriber::new(node, "/magellan/mission/map_waypoints", qos.clone())?,
            exec_command: Subscriber::new(node, "/magellan/cmd/exec", qos.clone())?,
            autopilot_state: Subscriber::new(node, "/mavros/state", qos.clone())?,
        })
    }
}

/// Topics the navigator publishes directly (outside the autopilot bridge,
/// which owns servo overrides and velocity setpoints).
pub struct NavPublishers {
    navigator_state: Publisher<r2r::std_msgs::msg::String>,
    adjusted_waypoints: Publisher<r2r::std_msgs::msg::Float64MultiArray>,
}

impl NavPublishers {
    fn new(node: &mut Node, qos: &QosProfile) -> Result<Self, r2r::Error> {
        let latched = qos.clone().durability(r2r::QosDurabilityPolicy::TransientLocal);
        Ok(NavPublishers {
            navigator_state: Publisher::new(node, "/magellan/navigator_state", latched.clone())?,
            adjusted_waypoints: Publisher::new(node, "/magellan/mission/adjusted_waypoints", latched)?,
        })
    }
}

/// Aggregates every navigator topic and turns new messages into `Event`s.
pub struct RosIo {
    subscribers: NavSubscribers,
    publishers: NavPublishers,
    last_seen: LastSeenSnapshot,
}

/// Plain-data snapshot of the last raw value seen on each edge-triggered
/// topic, compared by value instead of by message object identity.
#[derive(Default, Clone, PartialEq)]
struct LastSeenSnapshot {
    mission_waypoints: Option<Vec<f64>>,
    mission_current_seq: Option<u16>,
    exec_command: Option<String>,
    autopilot_state: Option<String>,
}

impl RosIo {
    pub fn new(node: &mut Node, qos_depth: usize) -> Result<Self, r2r::Error> {
        let qos = QosProfile::default().depth(qos_depth as i32);
        Ok(RosIo {
            subscribers: NavSubscribers::new(node, &qos)?,
            publishers: NavPublishers::new(node, &qos)?,
            last_seen: LastSeenSnapshot::default(),
        })
    }

    /// Polls every subscriber once and returns the `Event`s produced by
    /// whatever arrived since the last poll. There is no cross-topic
    /// ordering guarantee beyond subscriber declaration order, same as the
    /// live ROS graph.
    pub fn poll(&mut self) -> Vec<Event> {
        let mut events = Vec::new();

        if let Some(cmd) = self.subscribers.exec_command.get_latest() {
            if self.last_seen.exec_command.as_deref() != Some(cmd.data.as_str()) {
                if let Some(exec) = parse_exec_command(&cmd.data) {
                    events.push(Event::Exec(exec));
                }
                self.last_seen.exec_command = Some(cmd.data);
            }
        }

        if let Some(state) = self.subscribers.autopilot_state.get_latest() {
            if self.last_seen.autopilot_state.as_deref() != Some(state.data.as_str()) {
                if let Some(mode) = parse_autopilot_mode(&state.data) {
                    events.push(Event::AutopilotState(mode));
                }
                self.last_seen.autopilot_state = Some(state.data);
            }
        }

        let waypoints_msg = self.subscribers.mission_waypoints.get_latest();
        let seq_msg = self.subscribers.mission_current_seq.get_latest();
        if let (Some(wp_msg), Some(seq_msg)) = (&waypoints_msg, &seq_msg) {
            let changed = self.last_seen.mission_waypoints.as_deref() != Some(wp_msg.data.as_slice())
                || self.last_seen.mission_current_seq != Some(seq_msg.data);
            if changed {
                events.push(Event::WaypointsChanged {
                    waypoints: decode_waypoints(&wp_msg.data),
                    current_seq: seq_msg.data as usize,
                });
                self.last_seen.mission_waypoints = Some(wp_msg.data.clone());
                self.last_seen.mission_current_seq = Some(seq_msg.data);
            }
        }

        if let Some(pose_msg) = self.subscribers.robot_pose.get_latest() {
            events.push(Event::RobotPose(pose_from_odometry(&pose_msg)));
        }

        if let Some(cones_msg) = self.subscribers.cone_locations.get_latest() {
            events.push(Event::ConeLocations(decode_cones(&cones_msg.data)));
        }

        if let Some(touch_msg) = self.subscribers.touch.get_latest() {
            events.push(Event::Touch(touch_msg.data));
        }

        if let Some(map_msg) = self.subscribers.map_waypoints.get_latest() {
            events.push(Event::MapWaypoints(decode_waypoints(&map_msg.data)));
        }

        events
    }

    /// Publishes the latched navigator-state string.
    pub fn publish_navigator_state(&self, name: &str) -> Result<(), r2r::Error> {
        self.publishers
            .navigator_state
            .publish(r2r::std_msgs::msg::String { data: name.to_string() })
    }

    /// Publishes the rewritten `ADJUST_WAYPOINTS` map-frame list.
    pub fn publish_adjusted_waypoints(&self, waypoints: &[Waypoint]) -> Result<(), r2r::Error> {
        let msg = r2r::std_msgs::msg::Float64MultiArray {
            layout: r2r::std_msgs::msg::MultiArrayLayout { dim: vec![], data_offset: 0 },
            data: encode_waypoints(waypoints),
        };
        self.publishers.adjusted_waypoints.publish(msg)
    }
}

fn parse_exec_command(raw: &str) -> Option<ExecCommand> {
    match raw {
        "START" => Some(ExecCommand::Start),
        "RESET" => Some(ExecCommand::Reset),
        "ADJUST_WAYPOINTS" => Some(ExecCommand::AdjustWaypoints),
        _ => {
            log::warn!("unrecognized exec command: {}", raw);
            None
        }
    }
}

fn parse_autopilot_mode(raw: &str) -> Option<crate::autopilot::AutopilotMode> {
    use crate::autopilot::AutopilotMode;
    match raw {
        "MANUAL" => Some(AutopilotMode::Manual),
        "HOLD" => Some(AutopilotMode::Hold),
        "AUTO" => Some(AutopilotMode::Auto),
        "GUIDED" => Some(AutopilotMode::Guided),
        "RTL" => Some(AutopilotMode::Rtl),
        _ => {
            log::warn!("unrecognized autopilot mode: {}", raw);
            None
        }
    }
}

/// Decodes a flat `[x_lat, y_long, z_alt, ...]` array into waypoints.
fn decode_waypoints(data: &[f64]) -> Vec<Waypoint> {
    data.chunks_exact(3).map(|c| Waypoint::new(c[0], c[1], c[2])).collect()
}

/// Encodes waypoints back into the flat triple layout.
fn encode_waypoints(waypoints: &[Waypoint]) -> Vec<f64> {
    let mut data = Vec::with_capacity(waypoints.len() * 3);
    for wp in waypoints {
        data.push(wp.x_lat);
        data.push(wp.y_long);
        data.push(wp.z_alt);
    }
    data
}

/// Decodes a flat `[x, y, z, w, h, d, area, ...]` array into cone
/// detections. Only `x` and `area` are consumed downstream.
fn decode_cones(data: &[f64]) -> Vec<ConeDetection> {
    data.chunks_exact(7)
        .map(|c| ConeDetection { x_pixel_offset: c[0], y_pixel_offset: c[1], depth: c[2], area_pixels: c[6] })
        .collect()
}

fn pose_from_odometry(msg: &r2r::nav_msgs::msg::Odometry) -> Pose {
    let position = &msg.pose.pose.position;
    let q = &msg.pose.pose.orientation;
    let orientation = UnitQuaternion::from_quaternion(Quaternion::new(q.w, q.x, q.y, q.z));
    Pose::new(position.x, position.y, position.z, orientation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_waypoints_groups_triples() {
        let data = vec![1.0, 2.0, 1030.0, 3.0, 4.0, 0.0];
        let wps = decode_waypoints(&data);
        assert_eq!(wps.len(), 2);
        assert_eq!(wps[0], Waypoint::new(1.0, 2.0, 1030.0));
        assert_eq!(wps[1], Waypoint::new(3.0, 4.0, 0.0));
    }

    #[test]
    fn encode_decode_waypoints_round_trip() {
        let wps = vec![Waypoint::new(1.0, 2.0, 1030.0), Waypoint::new(-3.5, 4.25, 0.0)];
        let data = encode_waypoints(&wps);
        assert_eq!(decode_waypoints(&data), wps);
    }

    #[test]
    fn decode_cones_picks_x_offset_and_area() {
        let data = vec![64.0, 0.0, 0.0, 0.0, 0.0, 0.0, 400.0];
        let cones = decode_cones(&data);
        assert_eq!(cones.len(), 1);
        assert_eq!(cones[0].x_pixel_offset, 64.0);
        assert_eq!(cones[0].area_pixels, 400.0);
    }

    #[test]
    fn parse_exec_command_recognizes_all_three() {
        assert_eq!(parse_exec_command("START"), Some(ExecCommand::Start));
        assert_eq!(parse_exec_command("RESET"), Some(ExecCommand::Reset));
        assert_eq!(parse_exec_command("ADJUST_WAYPOINTS"), Some(ExecCommand::AdjustWaypoints));
        assert_eq!(parse_exec_command("NONSENSE"), None);
    }
}
