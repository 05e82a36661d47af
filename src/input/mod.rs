pub mod events;

// Re-export the essential types
pub use events::{input_name, now_millis, ChannelHost, HostChannel, HostEvent, RecordingHost};
