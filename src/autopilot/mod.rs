//! Autopilot bridge.
//!
//! Abstracts the handful of commands the navigator issues to the flight
//! controller: mode changes, arming, parameter writes, waypoint-index
//! jumps, waypoint uploads, servo overrides and velocity setpoints. The
//! trait lets the state machine and its tests run against a mock; the only
//! production implementation talks to a MAVROS-style autopilot over ROS 2.
//!
//! Real MAVROS exposes mode/arm/parameter/waypoint commands as ROS
//! services, which in r2r are `async` and would need a runtime the rest of
//! this crate deliberately does not carry (the whole navigator is a single
//! synchronous event loop — see core::state). Rather than pull in an async
//! runtime for five infrequent calls, this bridge models them the same way
//! it models servo overrides and velocity setpoints: synchronous publishes
//! on latched command topics, followed by the settle delay the vehicle
//! bridge needs to apply the change before the next tick reads state back.
//! See DESIGN.md for this decision.

pub mod servo;

use crate::core::mission::Waypoint;
use crate::ros_interface::Publisher;
use r2r::{Node, QosProfile};
use std::time::Duration;

/// Flight mode names, matching ArduPilot's custom-mode strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AutopilotMode {
    Manual,
    Hold,
    Auto,
    Guided,
    Rtl,
}

impl AutopilotMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AutopilotMode::Manual => "MANUAL",
            AutopilotMode::Hold => "HOLD",
            AutopilotMode::Auto => "AUTO",
            AutopilotMode::Guided => "GUIDED",
            AutopilotMode::Rtl => "RTL",
        }
    }
}

/// A parameter value, matching the two numeric variants MAVLink parameters
/// actually carry.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Real(f64),
}

/// Errors a bridge implementation can return.
#[derive(Debug)]
pub enum AutopilotError {
    Publish(String),
    NotReady(String),
}

impl std::fmt::Display for AutopilotError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AutopilotError::Publish(msg) => write!(f, "autopilot publish failed: {}", msg),
            AutopilotError::NotReady(msg) => write!(f, "autopilot not ready: {}", msg),
        }
    }
}

impl std::error::Error for AutopilotError {}

/// Everything the navigator can ask the flight controller to do.
#[cfg_attr(test, mockall::automock)]
pub trait AutopilotBridge {
    fn set_mode(&mut self, mode: AutopilotMode) -> Result<(), AutopilotError>;
    fn arm(&mut self, armed: bool) -> Result<(), AutopilotError>;
    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), AutopilotError>;
    fn set_current_waypoint(&mut self, seq: u16) -> Result<(), AutopilotError>;
    fn push_waypoints(&mut self, waypoints: &[Waypoint]) -> Result<(), AutopilotError>;
    fn override_rc(&mut self, command: servo::ServoOverride) -> Result<(), AutopilotError>;
    fn publish_velocity(&mut self, linear_x: f64, angular_z: f64) -> Result<(), AutopilotError>;
}

/// Production bridge, wired to a live ROS 2 / MAVROS graph.
pub struct R2rAutopilotBridge {
    mode_cmd: Publisher<r2r::std_msgs::msg::String>,
    arm_cmd: Publisher<r2r::std_msgs::msg::Bool>,
    param_cmd: Publisher<r2r::std_msgs::msg::String>,
    waypoint_seq_cmd: Publisher<r2r::std_msgs::msg::UInt16>,
    waypoint_push_cmd: Publisher<r2r::std_msgs::msg::Float64MultiArray>,
    rc_override: Publisher<r2r::std_msgs::msg::UInt16MultiArray>,
    velocity_setpoint: Publisher<r2r::geometry_msgs::msg::TwistStamped>,
    settle_delay: Duration,
}

impl R2rAutopilotBridge {
    /// `settle_delay` is the time the bridge blocks after a mode/arm/param/
    /// waypoint-index command before returning, so the caller can assume the
    /// change has propagated to the vehicle by the next tick (~200ms per the
    /// external interface contract).
    pub fn new(node: &mut Node, settle_delay: Duration) -> Result<Self, r2r::Error> {
        let qos = QosProfile::default();
        Ok(R2rAutopilotBridge {
            mode_cmd: Publisher::new(node, "/magellan/cmd/mode", qos.clone())?,
            arm_cmd: Publisher::new(node, "/magellan/cmd/arm", qos.clone())?,
            param_cmd: Publisher::new(node, "/magellan/cmd/param", qos.clone())?,
            waypoint_seq_cmd: Publisher::new(node, "/magellan/cmd/current_waypoint", qos.clone())?,
            waypoint_push_cmd: Publisher::new(node, "/magellan/cmd/waypoints", qos.clone())?,
            rc_override: Publisher::new(node, "/mavros/rc/override", qos.clone())?,
            velocity_setpoint: Publisher::new(node, "/mavros/setpoint_velocity/cmd_vel", qos)?,
            settle_delay,
        })
    }

    fn settle(&self) {
        std::thread::sleep(self.settle_delay);
    }
}

impl AutopilotBridge for R2rAutopilotBridge {
    fn set_mode(&mut self, mode: AutopilotMode) -> Result<(), AutopilotError> {
        let msg = r2r::std_msgs::msg::String { data: mode.as_str().to_string() };
        self.mode_cmd.publish(msg).map_err(|e| AutopilotError::Publish(e.to_string()))?;
        self.settle();
        Ok(())
    }

    fn arm(&mut self, armed: bool) -> Result<(), AutopilotError> {
        let msg = r2r::std_msgs::msg::Bool { data: armed };
        self.arm_cmd.publish(msg).map_err(|e| AutopilotError::Publish(e.to_string()))?;
        self.settle();
        Ok(())
    }

    fn set_parameter(&mut self, name: &str, value: ParamValue) -> Result<(), AutopilotError> {
        let encoded = match value {
            ParamValue::Int(v) => format!("{}=i:{}", name, v),
            ParamValue::Real(v) => format!("{}=f:{}", name, v),
        };
        let msg = r2r::std_msgs::msg::String { data: encoded };
        self.param_cmd.publish(msg).map_err(|e| AutopilotError::Publish(e.to_string()))?;
        self.settle();
        Ok(())
    }

    fn set_current_waypoint(&mut self, seq: u16) -> Result<(), AutopilotError> {
        let msg = r2r::std_msgs::msg::UInt16 { data: seq };
        self.waypoint_seq_cmd.publish(msg).map_err(|e| AutopilotError::Publish(e.to_string()))?;
        self.settle();
        Ok(())
    }

    fn push_waypoints(&mut self, waypoints: &[Waypoint]) -> Result<(), AutopilotError> {
        let mut data = Vec::with_capacity(waypoints.len() * 3);
        for wp in waypoints {
            data.push(wp.x_lat);
            data.push(wp.y_long);
            data.push(wp.z_alt);
        }
        let msg = r2r::std_msgs::msg::Float64MultiArray {
            layout: r2r::std_msgs::msg::MultiArrayLayout { dim: vec![], data_offset: 0 },
            data,
        };
        self.waypoint_push_cmd.publish(msg).map_err(|e| AutopilotError::Publish(e.to_string()))?;
        self.settle();
        Ok(())
    }

    fn override_rc(&mut self, command: servo::ServoOverride) -> Result<(), AutopilotError> {
        let msg = r2r::std_msgs::msg::UInt16MultiArray {
            layout: r2r::std_msgs::msg::MultiArrayLayout { dim: vec![], data_offset: 0 },
            data: command.channels.to_vec(),
        };
        self.rc_override.publish(msg).map_err(|e| AutopilotError::Publish(e.to_string()))
    }

    fn publish_velocity(&mut self, linear_x: f64, angular_z: f64) -> Result<(), AutopilotError> {
        let msg = r2r::geometry_msgs::msg::TwistStamped {
            header: r2r::std_msgs::msg::Header::default(),
            twist: r2r::geometry_msgs::msg::Twist {
                linear: r2r::geometry_msgs::msg::Vector3 { x: linear_x, y: 0.0, z: 0.0 },
                angular: r2r::geometry_msgs::msg::Vector3 { x: 0.0, y: 0.0, z: angular_z },
            },
        };
        self.velocity_setpoint.publish(msg).map_err(|e| AutopilotError::Publish(e.to_string()))
    }
}
