//! Headless, topic-based notification bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood. `send` on a
//! broadcast channel never blocks and never waits for receivers, so the
//! capture thread can publish frames at full rate: a slow subscriber only
//! loses its oldest messages (it sees a `Lagged` error), it never slows the
//! publisher down.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::UserMessages`] | warnings, model-load progress, confirmations |
//! | [`Topic::Status`] | started flag, mode, speed mode, max speed, streaming |
//! | [`Topic::PictureStream`] | captured frames with their prediction |

use autocar_types::{Event, EventPayload};
use tokio::sync::broadcast;
use tracing::trace;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing lanes of the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Messages meant to be shown to the operator.
    UserMessages,
    /// State changes of the car.
    Status,
    /// Streamed frames. High rate, only while streaming is enabled.
    PictureStream,
}

impl Topic {
    /// The lane an event payload belongs on.
    pub fn for_payload(payload: &EventPayload) -> Topic {
        match payload {
            EventPayload::UserMessage { .. } | EventPayload::ModelLoaded { .. } => {
                Topic::UserMessages
            }
            EventPayload::PictureStream { .. } => Topic::PictureStream,
            EventPayload::StarterSwitch { .. }
            | EventPayload::ModeSwitched { .. }
            | EventPayload::SpeedModeChanged { .. }
            | EventPayload::MaxSpeedChanged { .. }
            | EventPayload::StreamingChanged { .. } => Topic::Status,
        }
    }
}

/// Shared notification bus. Clone it cheaply – all clones share the same
/// underlying broadcast channels.
#[derive(Clone, Debug)]
pub struct NotificationBus {
    user_messages: broadcast::Sender<Event>,
    status: broadcast::Sender<Event>,
    picture_stream: broadcast::Sender<Event>,
}

impl NotificationBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (user_messages, _) = broadcast::channel(capacity);
        let (status, _) = broadcast::channel(capacity);
        let (picture_stream, _) = broadcast::channel(capacity);
        Self {
            user_messages,
            status,
            picture_stream,
        }
    }

    /// Publish `event` on `topic`.
    ///
    /// Returns the number of receivers handed the event; `0` when nobody is
    /// listening, which is a normal condition for a fire-and-forget bus.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        match self.topic_sender(topic).send(event) {
            Ok(n) => n,
            Err(broadcast::error::SendError(event)) => {
                trace!(?topic, source = %event.source, "no subscribers; event dropped");
                0
            }
        }
    }

    /// Publish `event` on the lane matching its payload.
    pub fn publish(&self, event: Event) -> usize {
        let topic = Topic::for_payload(&event.payload);
        self.publish_to(topic, event)
    }

    /// Build an [`Event`] from `source` and `payload` and publish it.
    pub fn notify(&self, source: &str, payload: EventPayload) -> usize {
        self.publish(Event::new(source, payload))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::UserMessages => &self.user_messages,
            Topic::Status => &self.status,
            Topic::PictureStream => &self.picture_stream,
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// A receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`NotificationBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(broadcast::error::RecvError::Lagged(n))` – the subscriber fell
    ///   behind and `n` messages were dropped.
    /// * `Err(broadcast::error::RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking receive, for synchronous consumers such as the console.
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain every event currently buffered, skipping over lag gaps.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) => events.push(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
