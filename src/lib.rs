//! Robo-Magellan navigation core.
//!
//! Event-driven navigation for an autonomous ground rover: follow a GPS
//! mission, and at marked waypoints locate, approach, and touch a traffic
//! cone before continuing. `core::state::StateMachine` is the navigator
//! itself; everything else here is the ambient engineering layer around it
//! (config, ROS plumbing, the binary entry point).

#![warn(missing_docs)]

pub mod autopilot;
pub mod config;
pub mod control;
pub mod core;
pub mod event_loop;
pub mod ros_interface;
pub mod vision;

pub use autopilot::{AutopilotBridge, AutopilotMode, R2rAutopilotBridge};
pub use config::NavConfig;
pub use core::{Event, NavigatorContext, NavigatorState, Pose, StateMachine};
pub use event_loop::Tick;
pub use ros_interface::RosIo;

use std::time::Duration;

/// ROS 2 node/QoS settings, loaded alongside `NavConfig`.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RosConfig {
    /// Node name registered with the ROS graph.
    pub node_name: String,
    /// QoS history depth used for every navigator topic.
    pub qos_depth: usize,
    /// Settle delay the autopilot bridge waits after mode/arm/param/
    /// waypoint-index commands.
    pub settle_delay_ms: u64,
}

impl Default for RosConfig {
    fn default() -> Self {
        RosConfig { node_name: "magellan_core".to_string(), qos_depth: 10, settle_delay_ms: 200 }
    }
}

/// Top-level navigator: a live ROS node, the autopilot bridge, and the
/// state machine, wired together and ready to tick.
pub struct NavCore {
    tick: Tick<R2rAutopilotBridge>,
}

impl NavCore {
    /// Builds the navigator against a live ROS 2 node. The node itself is
    /// owned by the caller (see `main.rs`) since it also drives spinning.
    pub fn new(node: &mut r2r::Node, nav_cfg: NavConfig, ros_cfg: &RosConfig) -> Result<Self, NavCoreError> {
        let io = RosIo::new(node, ros_cfg.qos_depth).map_err(NavCoreError::Ros)?;
        let bridge = R2rAutopilotBridge::new(node, Duration::from_millis(ros_cfg.settle_delay_ms))
            .map_err(NavCoreError::Ros)?;
        let rate = nav_cfg.clone();
        let sm = StateMachine::new(nav_cfg, bridge);
        Ok(NavCore { tick: Tick::new(io, sm, &rate) })
    }

    /// Runs the event loop until `should_stop` returns `true`.
    pub fn run(&mut self, should_stop: impl FnMut() -> bool) {
        self.tick.run(should_stop);
    }
}

/// Errors that can occur while building or running the navigator.
#[derive(Debug)]
pub enum NavCoreError {
    /// Failure creating a ROS publisher, subscriber, or node resource.
    Ros(r2r::Error),
    /// Failure loading configuration from disk.
    Config(config::ConfigError),
}

impl std::fmt::Display for NavCoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            NavCoreError::Ros(e) => write!(f, "ROS error: {}", e),
            NavCoreError::Config(e) => write!(f, "configuration error: {}", e),
        }
    }
}

impl std::error::Error for NavCoreError {}
