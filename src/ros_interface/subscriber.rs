// src/ros_interface/subscriber.rs
// Generic latest-value ROS 2 subscriber wrapper.

use r2r::{Node, QosProfile};
use std::sync::{Arc, Mutex};

/// Subscribes to a topic and caches the most recently received message.
/// Generalizes the original single-purpose `/scan` subscriber over any
/// message type, and uses `Arc<Mutex<_>>` for the cached value instead of
/// moving the subscriber into its own callback.
pub struct Subscriber<T> {
    latest: Arc<Mutex<Option<T>>>,
    // Kept alive for as long as the subscriber should keep receiving.
    _subscription: r2r::Subscriber<T>,
}

impl<T> Subscriber<T>
where
    T: r2r::Message + Clone + 'static,
{
    pub fn new(node: &mut Node, topic: &str, qos: QosProfile) -> Result<Self, r2r::Error> {
        let latest = Arc::new(Mutex::new(None));
        let latest_cb = latest.clone();
        let subscription = node.create_subscription::<T, _>(topic, qos, move |msg| {
            *latest_cb.lock().unwrap() = Some(msg);
        })?;
        Ok(Subscriber { latest, _subscription: subscription })
    }

    /// Returns the most recently received message, if any has arrived yet.
    pub fn get_latest(&self) -> Option<T> {
        self.latest.lock().unwrap().clone()
    }
}
