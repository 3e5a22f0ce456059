// src/main.rs
// Entry point for the navigation core: brings up a ROS 2 node, loads
// configuration, wires the autopilot bridge and topic plumbing, and runs
// the event loop until the process is interrupted.

use log::info;
use magellan_core::config::NavConfig;
use magellan_core::{NavCore, RosConfig};
use r2r::{Context, Node};
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    info!("starting magellan_core navigation node...");

    let config_path = std::env::args().nth(1);
    let nav_cfg = match &config_path {
        Some(path) => NavConfig::load_yaml(path)?,
        None => {
            info!("no config path given, using defaults");
            NavConfig::default()
        }
    };
    let ros_cfg = RosConfig::default();

    let ctx = Context::create()?;
    let mut node = Node::create(&ctx, &ros_cfg.node_name, "")?;
    info!("ROS 2 node '{}' initialized", ros_cfg.node_name);

    let mut nav_core = NavCore::new(&mut node, nav_cfg, &ros_cfg)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc_handler(move || shutdown_handler.store(true, Ordering::SeqCst));

    std::thread::spawn(move || {
        let mut node = node;
        loop {
            if let Err(e) = node.spin_once(std::time::Duration::from_millis(50)) {
                log::error!("ROS spin error: {}", e);
            }
        }
    });

    nav_core.run(|| shutdown.load(Ordering::SeqCst));

    info!("magellan_core shut down cleanly");
    Ok(())
}

/// Installs a best-effort Ctrl+C handler. Falls back to a no-op if the
/// process environment doesn't support signal handling (e.g. some CI
/// sandboxes), since the navigator still shuts down on process kill.
fn ctrlc_handler(on_signal: impl Fn() + Send + 'static) {
    if let Err(e) = ctrlc::set_handler(on_signal) {
        log::warn!("failed to install Ctrl+C handler: {}", e);
    }
}
