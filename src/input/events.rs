use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Input names the runtime reports under, appended to the map id
pub mod names {
    pub const FEATURE_CLICK: &str = "feature_click";
    pub const FEATURE_HOVER: &str = "feature_hover";
    pub const CLICK: &str = "click";
    pub const GEOLOCATE: &str = "geolocate";
    pub const GEOCODER: &str = "geocoder";
    pub const DRAWN_FEATURES: &str = "drawn_features";
    pub const QUERIED_FEATURES: &str = "queried_features";
    pub const TURF_RESULT: &str = "turf_result";
    pub const TURF_ERROR: &str = "turf_error";
    pub const STYLE_RESTORED: &str = "style_restored";
    pub const MARKER_PREFIX: &str = "marker_";
}

/// `<map_id>_<event>`
pub fn input_name(map_id: &str, event: &str) -> String {
    format!("{}_{}", map_id, event)
}

/// Milliseconds since the Unix epoch, as `Date.now()` reports
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One value reported to the host application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostEvent {
    pub name: String,
    pub value: Value,
}

/// Outbound channel to the host application
pub trait HostChannel {
    fn set_input_value(&mut self, name: &str, value: Value);
}

/// Keeps every reported value, for tests and replay
#[derive(Debug, Default, Clone)]
pub struct RecordingHost {
    pub events: Vec<HostEvent>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every value reported under `name`, oldest first
    pub fn values(&self, name: &str) -> Vec<&Value> {
        self.events
            .iter()
            .filter(|e| e.name == name)
            .map(|e| &e.value)
            .collect()
    }

    pub fn last(&self, name: &str) -> Option<&Value> {
        self.events.iter().rev().find(|e| e.name == name).map(|e| &e.value)
    }

    pub fn count(&self, name: &str) -> usize {
        self.events.iter().filter(|e| e.name == name).count()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl HostChannel for RecordingHost {
    fn set_input_value(&mut self, name: &str, value: Value) {
        self.events.push(HostEvent {
            name: name.to_string(),
            value,
        });
    }
}

/// Forwards reported values over a channel to another thread
#[derive(Debug, Clone)]
pub struct ChannelHost {
    sender: Sender<HostEvent>,
}

impl ChannelHost {
    pub fn new(sender: Sender<HostEvent>) -> Self {
        Self { sender }
    }

    /// Unbounded channel pair
    pub fn unbounded() -> (Self, Receiver<HostEvent>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (Self::new(sender), receiver)
    }
}

impl HostChannel for ChannelHost {
    fn set_input_value(&mut self, name: &str, value: Value) {
        let event = HostEvent {
            name: name.to_string(),
            value,
        };
        if self.sender.send(event).is_err() {
            log::warn!("host channel closed, dropping '{}'", name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_input_names() {
        assert_eq!(input_name("map", names::FEATURE_CLICK), "map_feature_click");
    }

    #[test]
    fn test_recording_host() {
        let mut host = RecordingHost::new();
        host.set_input_value("map_click", json!({"lng": 1.0}));
        host.set_input_value("map_click", json!({"lng": 2.0}));
        assert_eq!(host.count("map_click"), 2);
        assert_eq!(host.last("map_click"), Some(&json!({"lng": 2.0})));
        assert!(host.values("map_hover").is_empty());
    }

    #[test]
    fn test_channel_host_forwards() {
        let (mut host, receiver) = ChannelHost::unbounded();
        host.set_input_value("map_geolocate", json!({"coords": null}));
        let event = receiver.try_recv().unwrap();
        assert_eq!(event.name, "map_geolocate");

        drop(receiver);
        host.set_input_value("map_geolocate", Value::Null);
    }
}
