//! Motion controllers: cone approach, post-touch escape, and search sweep.
//! Each submodule is a pure function of the current pose/detection plus
//! gains pulled from `NavConfig`; none of them touch ROS or the autopilot
//! bridge directly.

pub mod approach;
pub mod escape;
pub mod search;
