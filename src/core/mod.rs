// core/mod.rs

// The navigation core's domain types: pose math, the mission/waypoint
// model, and the event-driven state machine. No ROS types appear below
// this module boundary; `ros_interface` is what wires these to topics.

pub mod mission;
pub mod pose;
pub mod state;

pub use mission::{Mission, Waypoint, WaypointMeta};
pub use pose::Pose;
pub use state::{Effects, Event, ExecCommand, NavigatorContext, NavigatorState, PendingAction, StateMachine};
