//! Async driver that feeds one widget from a message channel and pumps its
//! engine between messages.

use std::time::Duration;

use serde_json::Value;
use tokio::{
    sync::{mpsc, oneshot},
    time::MissedTickBehavior,
};

use crate::{core::bundle::RenderBundle, core::map::MapWidget, engine::MapEngine, input::events::HostChannel};

/// What a host can send to a running session
#[derive(Debug)]
pub enum SessionInput {
    Render(RenderBundle),
    Message(Value),
    /// Answered with the `forwardGeocode` body
    Geocode {
        query: String,
        reply: oneshot::Sender<Value>,
    },
    Close,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub messages: usize,
    pub failed: usize,
    pub events: usize,
}

/// Runs until the inbox closes or [`SessionInput::Close`] arrives.
///
/// Failed messages are counted and logged; they never end the session.
pub async fn run_session<E: MapEngine, H: HostChannel>(
    widget: &mut MapWidget<E, H>,
    mut inbox: mpsc::Receiver<SessionInput>,
    pump_every: Duration,
) -> SessionStats {
    let mut stats = SessionStats::default();
    let mut ticker = tokio::time::interval(pump_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            input = inbox.recv() => match input {
                None | Some(SessionInput::Close) => break,
                Some(SessionInput::Render(bundle)) => {
                    if let Err(e) = widget.render(bundle) {
                        log::error!("session for '{}' could not render: {}", widget.id(), e);
                        stats.failed += 1;
                    }
                }
                Some(SessionInput::Message(message)) => {
                    stats.messages += 1;
                    if widget.dispatch_value(message).is_err() {
                        stats.failed += 1;
                    }
                }
                Some(SessionInput::Geocode { query, reply }) => {
                    let answer = widget.forward_geocode(&query).await;
                    if reply.send(answer).is_err() {
                        log::debug!("geocode reply for '{}' dropped", query);
                    }
                }
            },
            _ = ticker.tick() => {}
        }
        stats.events += widget.pump();
    }
    stats.events += widget.pump();
    log::debug!(
        "session for '{}' ended: {} messages, {} failed",
        widget.id(),
        stats.messages,
        stats.failed
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{engine::memory::MemoryEngine, input::events::RecordingHost, LngLat};
    use serde_json::json;

    #[tokio::test]
    async fn test_session_applies_messages_in_order() {
        let mut widget = MapWidget::new("map", MemoryEngine::new(), RecordingHost::new());
        let (sender, inbox) = mpsc::channel(8);
        sender
            .send(SessionInput::Render(RenderBundle::new("streets", LngLat::new(0.0, 0.0), 3.0)))
            .await
            .unwrap();
        sender
            .send(SessionInput::Message(json!({"type": "add_legend", "html": "<b>a</b>"})))
            .await
            .unwrap();
        sender
            .send(SessionInput::Message(json!({"type": "not_a_message"})))
            .await
            .unwrap();
        let (reply, answer) = oneshot::channel();
        sender
            .send(SessionInput::Geocode {
                query: "Paris".to_string(),
                reply,
            })
            .await
            .unwrap();
        sender.send(SessionInput::Close).await.unwrap();

        let stats = run_session(&mut widget, inbox, Duration::from_millis(5)).await;
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.failed, 1);
        assert!(widget.is_ready());
        assert_eq!(widget.engine().legend_ids(), vec!["legend"]);
        assert_eq!(answer.await.unwrap(), json!({"features": []}));
    }
}
