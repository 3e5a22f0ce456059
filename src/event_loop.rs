//! Event loop: ticks the navigator at a fixed rate, draining ROS input,
//! synthesizing the `TimerExpired` event that resolves `Limbo` states, and
//! publishing navigator output.
//!
//! Node spinning runs on its own thread (see `main.rs`); this loop is one
//! synchronous cycle driven by `std::thread::sleep` at `1 / rate`, reading
//! whatever the subscriber caches hold each tick.

use crate::autopilot::{AutopilotBridge, R2rAutopilotBridge};
use crate::config::NavConfig;
use crate::core::state::{Event, StateMachine};
use crate::ros_interface::RosIo;
use std::time::{Duration, Instant};

/// Drives one `StateMachine` against a live ROS graph until told to stop.
pub struct Tick<B: AutopilotBridge = R2rAutopilotBridge> {
    io: RosIo,
    sm: StateMachine<B>,
    period: Duration,
}

impl<B: AutopilotBridge> Tick<B> {
    pub fn new(io: RosIo, sm: StateMachine<B>, cfg: &NavConfig) -> Self {
        let period = Duration::from_secs_f64(1.0 / cfg.rate.max(1e-6));
        Tick { io, sm, period }
    }

    /// Runs the loop until `should_stop` returns `true`, checked once per
    /// tick. Node spinning (message delivery into the subscriber caches) is
    /// the caller's responsibility; this loop only reads whatever the
    /// subscribers have cached.
    pub fn run(&mut self, mut should_stop: impl FnMut() -> bool) {
        while !should_stop() {
            self.step(Instant::now());
            std::thread::sleep(self.period);
        }
        log::info!("event loop stopped, autopilot left at last commanded state");
    }

    /// Runs exactly one tick: drain pending ROS events, feed them to the
    /// state machine, synthesize the timer tick, then publish status.
    /// Exposed separately so tests can drive deterministic `Instant`s.
    pub fn step(&mut self, now: Instant) {
        let events = self.io.poll();
        for event in events {
            let effects = self.sm.handle(event, now);
            if let Some(adjusted) = effects.adjusted_waypoints {
                if let Err(e) = self.io.publish_adjusted_waypoints(&adjusted) {
                    log::error!("failed to publish adjusted waypoints: {}", e);
                }
            }
        }

        self.sm.handle(Event::TimerExpired, now);

        if let Err(e) = self.io.publish_navigator_state(self.sm.state().as_str()) {
            log::error!("failed to publish navigator state: {}", e);
        }
    }
}
